//! IFR服务器主程序

use clap::Parser;
use ifr_archive::ArchiveSynchronizer;
use ifr_core::ReportingConfig;
use ifr_database::{DatabasePool, DatabaseQueries};
use ifr_web::{ApiState, WebServer};
use ifr_workflow::{EngineSettings, ReportingEngine};
use std::net::SocketAddr;
use tracing::info;

/// IFR服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "ifr-server")]
#[command(about = "影像偶然发现报告 (Incidental Findings Reporting) 服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/ifr")]
    config: String,

    /// 覆盖配置中的监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动IFR服务器...");

    let mut config = ReportingConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("IFR服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  源归档: {}", config.source_archive.url);
    info!("  目标归档: {}", config.destination_archive.url);
    info!("  报告间隔: {} 天", config.report_interval_days);

    // 引擎：有数据库配置时从库中水合，否则从空仓库启动
    let settings = EngineSettings {
        report_interval_days: config.report_interval_days,
        confirm_page_size: config.confirm_page_size,
    };
    let mut engine = ReportingEngine::new(settings);
    if let Some(database) = &config.database {
        let pool = DatabasePool::connect(database).await?;
        let queries = DatabaseQueries::new(&pool);
        queries.create_tables().await?;
        *engine.repository_mut() = queries.load_repository().await?;
    }

    let synchronizer = ArchiveSynchronizer::from_config(&config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let server = WebServer::new(addr, ApiState::new(engine, synchronizer));
    server.run().await?;

    Ok(())
}
