//! # IFR工作流模块
//!
//! 提供偶然发现报告的核心工作流管理功能，包括：
//! - 数据状态机：管理影像会话归档可用性状态的完整生命周期
//! - 资格查询引擎：从实体状态推导报告/导出/修复工作队列
//! - 临床相关性分类器：扫描序列名的启发式分类与人工确认流程
//! - 报告引擎：协调以上组件的审阅者操作入口

pub mod classifier;
pub mod confirmation;
pub mod eligibility;
pub mod engine;
pub mod repository;
pub mod state_machine;

// 重新导出主要类型
pub use classifier::ScanClassifier;
pub use confirmation::{ConfirmationPage, ScanTypeDecision};
pub use engine::{
    ArchiveLookup, ArchiveScanEntry, ArchiveSessionInfo, EngineSettings, ReportingEngine,
    SubmitReport,
};
pub use repository::ReportingRepository;
pub use state_machine::{DataStatusMachine, StatusEvent, FIX_OPTIONS, REPAIR_STATUSES, TERMINAL_STATUSES};
