//! 错误定义模块

use thiserror::Error;

/// 报告系统统一错误类型
#[derive(Error, Debug)]
pub enum IfrError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("唯一性冲突: {0}")]
    IntegrityConflict(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("归档连接错误: {0}")]
    ArchiveConnectivity(String),

    #[error("校验和不匹配: scan {scan} file {file} (source {source_digest}, destination {destination})")]
    ChecksumMismatch {
        scan: String,
        file: String,
        source_digest: String,
        destination: String,
    },

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 报告系统统一结果类型
pub type Result<T> = std::result::Result<T, IfrError>;
