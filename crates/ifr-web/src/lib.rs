//! # IFR Web模块
//!
//! 面向审阅者的HTTP接口：工作队列查询、报告/修复提交、扫描类型
//! 确认与同步触发。渲染与登录会话由外部前端层负责。

pub mod handlers;
pub mod server;

pub use handlers::ApiState;
pub use server::WebServer;
