//! 报告工作流演示程序
//!
//! 展示报告引擎的核心功能：状态机修复、扫描类型确认和工作队列

use async_trait::async_trait;
use chrono::NaiveDate;
use ifr_core::{
    ArchiveId, Conclusion, DataStatus, ImagingSession, Modality, Priority, Result, Subject, User,
    ADMIN_ROLE, REPORTER_ROLE,
};
use ifr_workflow::engine::{ArchiveLookup, ArchiveScanEntry, ArchiveSessionInfo};
use ifr_workflow::{ReportingEngine, ScanTypeDecision, SubmitReport};
use std::collections::HashMap;

/// 演示用的内存源归档
struct DemoArchive {
    sessions: HashMap<String, Vec<(String, String)>>,
}

#[async_trait]
impl ArchiveLookup for DemoArchive {
    async fn find_session(&self, archive_id: &ArchiveId) -> Result<Option<ArchiveSessionInfo>> {
        Ok(self.sessions.get(&archive_id.label()).map(|scans| {
            ArchiveSessionInfo {
                scans: scans
                    .iter()
                    .map(|(id, scan_type)| ArchiveScanEntry {
                        sequence_id: id.clone(),
                        scan_type: scan_type.clone(),
                    })
                    .collect(),
            }
        }))
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let mut engine = ReportingEngine::default();

    println!("🚀 IFR 报告工作流演示\n");

    // 1. 注册用户
    let repo = engine.repository_mut();
    let admin_id = repo.add_user(User::new(
        "Alex",
        "Admin",
        "admin@example.org",
        "hash",
        vec![ADMIN_ROLE, REPORTER_ROLE],
    ))?;
    let reporter_id = repo.add_user(User::new(
        "Riley",
        "Reporter",
        "reporter@example.org",
        "hash",
        vec![REPORTER_ROLE],
    ))?;
    println!("✅ 用户注册完成");

    // 2. 建立示例会话
    let project_id = repo.get_or_create_project("MRH100");
    let subject_id =
        repo.get_or_create_subject(Subject::new("MSH103138", "Bob", "Brown", date(1952, 3, 12)));
    repo.insert_session(ImagingSession::new(
        1231,
        project_id,
        subject_id,
        ArchiveId::new("MRH100", "124", "MR02"),
        date(2024, 4, 10),
        DataStatus::NotFound,
        Priority::High,
    ))?;
    println!("✅ 示例会话建立完成（初始状态: Not found）");

    // 3. 修复：指向正确的归档会话
    let archive = DemoArchive {
        sessions: HashMap::from([(
            "MRH100_124_MR03".to_string(),
            vec![
                ("1".to_string(), "t1_mprage_sag_p3_iso".to_string()),
                ("2".to_string(), "AAHead_Scout".to_string()),
            ],
        )]),
    };
    let admin = engine.repository().user_context(admin_id)?;
    let status = engine
        .submit_repair(
            &admin,
            1231,
            DataStatus::Present,
            Some(ArchiveId::new("MRH100", "124", "MR03")),
            &archive,
        )
        .await?;
    println!("🔧 修复完成，状态: {}", status);

    // 4. 确认扫描类型
    let page = engine.unconfirmed_scan_types_page(0);
    println!("\n📋 待确认扫描类型 ({}):", page.total_unconfirmed);
    for scan_type in &page.types {
        println!(
            "   - {} (启发式判定: {})",
            scan_type.name,
            if scan_type.clinical { "临床" } else { "非临床" }
        );
    }
    let decisions: Vec<ScanTypeDecision> = page
        .types
        .iter()
        .map(|t| ScanTypeDecision {
            type_id: t.id,
            clinical: t.clinical,
        })
        .collect();
    engine.confirm_scan_types(&admin, &decisions)?;
    println!("✅ 扫描类型确认完成");

    // 5. 工作队列
    println!("\n📊 工作队列:");
    println!("   待报告: {} 个会话", engine.reporting_queue().len());
    println!("   可导出: {} 个会话", engine.export_queue().len());
    println!("   待修复: {} 个会话", engine.repair_queue().len());

    // 6. 提交报告
    let reporter = engine.repository().user_context(reporter_id)?;
    let scan_ids: Vec<_> = engine
        .repository()
        .scans_for_session(1231)
        .iter()
        .map(|s| s.id)
        .collect();
    let report_id = engine.submit_report(
        &reporter,
        SubmitReport {
            session_id: 1231,
            findings: "No gross pathology identified.".to_string(),
            conclusion: Conclusion::NoPathology,
            used_scan_ids: scan_ids,
            modality: Modality::Mri,
            date: None,
        },
    )?;
    println!("\n📝 报告已提交: {}", report_id);

    // 报告后的同一受试者会话从队列中消失
    println!("   待报告队列现在: {} 个会话", engine.reporting_queue().len());

    println!("\n🎉 演示完成");
    Ok(())
}
