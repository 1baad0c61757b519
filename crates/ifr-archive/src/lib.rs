//! # IFR归档集成模块
//!
//! 提供与两个外部影像归档的同步功能，包括：
//! - 归档客户端：XNAT风格REST接口的查询、下载、上传与校验
//! - 导入方向：旧系统候选记录 -> 本地实体模型
//! - 导出方向：临床确认扫描 -> 目标归档，带字节级完整性校验
//! - 同步协调器：持有显式运行锁，串行化并发触发的同步

pub mod client;
pub mod export;
pub mod import;
pub mod sync;

pub use client::{ArchiveClient, RemoteFile, RemoteScan, XnatClient};
pub use export::{ExportOutcome, ScanExporter};
pub use import::{BackfillReporters, FeedImporter, ImportSummary, SessionCandidate};
pub use sync::{ArchiveSynchronizer, SyncReport};

#[cfg(test)]
pub(crate) mod test_support;
