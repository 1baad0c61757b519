//! # IFR数据库模块
//!
//! 负责报告域实体的持久化，提供PostgreSQL连接池、行模型与
//! CRUD操作，并支持把整个实体集合水合为内存仓库。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
