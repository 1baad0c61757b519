//! 配置管理
//!
//! 支持配置文件与环境变量（`IFR_` 前缀）分层加载

use crate::error::{IfrError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 报告系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 两次报告之间的最短间隔天数
    #[serde(default = "default_report_interval")]
    pub report_interval_days: i64,
    /// 扫描类型确认页大小
    #[serde(default = "default_confirm_page_size")]
    pub confirm_page_size: usize,
    /// 导出用临时目录
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// 源归档（采集归档）
    pub source_archive: ArchiveEndpointConfig,
    /// 目标归档（临床归档）
    pub destination_archive: ArchiveEndpointConfig,
    /// 目标归档上的项目代码
    pub destination_project: String,
    /// 数据库配置
    pub database: Option<DatabaseConfig>,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 归档端点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEndpointConfig {
    /// 基础URL (如 https://xnat.example.org)
    pub url: String,
    pub user: String,
    pub password: String,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_report_interval() -> i64 {
    365
}

fn default_confirm_page_size() -> usize {
    25
}

fn default_scratch_dir() -> String {
    "./data/scratch".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl ReportingConfig {
    /// 从配置文件与环境变量加载
    pub fn load(config_path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("IFR").separator("__"))
            .build()
            .map_err(|e| IfrError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| IfrError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(default_report_interval(), 365);
        assert_eq!(default_confirm_page_size(), 25);
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = serde_json::json!({
            "source_archive": {"url": "http://src", "user": "u", "password": "p"},
            "destination_archive": {"url": "http://dst", "user": "u", "password": "p"},
            "destination_project": "IFR_CLINICAL"
        });
        let config: ReportingConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.report_interval_days, 365);
        assert_eq!(config.server.port, 8080);
        assert!(config.database.is_none());
    }
}
