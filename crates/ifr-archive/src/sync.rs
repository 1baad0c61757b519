//! 同步协调器
//!
//! 持有源/目标归档客户端与显式运行锁。管理员触发的同步运行
//! 串行执行；归档连接失败使整个运行终止，单个会话的导出失败
//! 只记录并继续。

use crate::client::{ArchiveClient, XnatClient};
use crate::export::ScanExporter;
use crate::import::{BackfillReporters, FeedImporter, ImportSummary, SessionCandidate};
use async_trait::async_trait;
use ifr_core::{ArchiveId, IfrError, ReportingConfig, Result};
use ifr_workflow::engine::{ArchiveLookup, ArchiveScanEntry, ArchiveSessionInfo};
use ifr_workflow::ReportingEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// 一次导出运行的结果
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub exported_sessions: Vec<i64>,
    /// (会话, 错误描述)；连接错误不会出现在这里，它终止整个运行
    pub failed_sessions: Vec<(i64, String)>,
    pub uploaded_scans: usize,
}

/// 归档同步协调器
pub struct ArchiveSynchronizer {
    source: Arc<dyn ArchiveClient>,
    destination: Arc<dyn ArchiveClient>,
    destination_project: String,
    scratch_root: PathBuf,
    importer: FeedImporter,
    /// 显式运行锁：并发触发的同步串行执行
    run_lock: Mutex<()>,
}

impl ArchiveSynchronizer {
    pub fn new(
        source: Arc<dyn ArchiveClient>,
        destination: Arc<dyn ArchiveClient>,
        destination_project: impl Into<String>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            destination,
            destination_project: destination_project.into(),
            scratch_root: scratch_root.into(),
            importer: FeedImporter::new(),
            run_lock: Mutex::new(()),
        }
    }

    /// 按配置构造两个XNAT客户端
    pub fn from_config(config: &ReportingConfig) -> Self {
        Self::new(
            Arc::new(XnatClient::new("source", &config.source_archive)),
            Arc::new(XnatClient::new("destination", &config.destination_archive)),
            config.destination_project.clone(),
            config.scratch_dir.clone(),
        )
    }

    /// 两侧归档的可达性预检
    async fn preflight(&self, need_destination: bool) -> Result<()> {
        if !self.source.check_connection().await? {
            return Err(IfrError::ArchiveConnectivity(format!(
                "Source archive '{}' is unreachable",
                self.source.name()
            )));
        }
        if need_destination && !self.destination.check_connection().await? {
            return Err(IfrError::ArchiveConnectivity(format!(
                "Destination archive '{}' is unreachable",
                self.destination.name()
            )));
        }
        Ok(())
    }

    /// 导入一批候选会话记录
    pub async fn run_import(
        &self,
        engine: &mut ReportingEngine,
        candidates: &[SessionCandidate],
    ) -> Result<ImportSummary> {
        let _guard = self.run_lock.lock().await;
        self.preflight(false).await?;

        let backfill = BackfillReporters::seed(engine.repository_mut())?;
        info!("Import run started with {} candidates", candidates.len());
        self.importer
            .import(engine, self.source.as_ref(), &backfill, candidates)
            .await
    }

    /// 导出全部可导出会话的临床扫描
    pub async fn run_export(&self, engine: &mut ReportingEngine) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;
        self.preflight(true).await?;

        let queue: Vec<i64> = engine.export_queue().iter().map(|s| s.id).collect();
        info!("Export run started with {} sessions", queue.len());

        let exporter = ScanExporter::new(
            self.source.as_ref(),
            self.destination.as_ref(),
            self.destination_project.clone(),
            self.scratch_root.clone(),
        );

        let mut report = SyncReport::default();
        for session_id in queue {
            match exporter.export_session(engine, session_id).await {
                Ok(outcome) => {
                    report.uploaded_scans += outcome.uploaded_scans;
                    report.exported_sessions.push(session_id);
                }
                // 连接失败终止整个运行，不做静默的部分继续
                Err(err @ IfrError::ArchiveConnectivity(_)) => return Err(err),
                Err(err) => {
                    error!("Export of session {} failed: {}", session_id, err);
                    report.failed_sessions.push((session_id, err.to_string()));
                }
            }
        }

        info!(
            "Export run finished: {} sessions, {} scans uploaded, {} failed",
            report.exported_sessions.len(),
            report.uploaded_scans,
            report.failed_sessions.len()
        );
        Ok(report)
    }
}

#[async_trait]
impl ArchiveLookup for ArchiveSynchronizer {
    async fn find_session(&self, archive_id: &ArchiveId) -> Result<Option<ArchiveSessionInfo>> {
        if !self
            .source
            .find_experiment(&archive_id.project, &archive_id.label())
            .await?
        {
            return Ok(None);
        }
        let scans = self
            .source
            .list_scans(&archive_id.project, &archive_id.label())
            .await?;
        Ok(Some(ArchiveSessionInfo {
            scans: scans
                .into_iter()
                .map(|s| ArchiveScanEntry {
                    sequence_id: s.sequence_id,
                    scan_type: s.scan_type,
                })
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryArchive;
    use chrono::NaiveDate;
    use ifr_core::{DataStatus, ImagingSession, Priority, Scan, ScanType, Subject};
    use ifr_workflow::EngineSettings;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("ifr-sync-test-{}", uuid::Uuid::new_v4()))
    }

    fn add_exportable_session(
        engine: &mut ReportingEngine,
        session_id: i64,
        mbi_id: &str,
        subject_num: &str,
    ) {
        let repo = engine.repository_mut();
        let project_id = repo.get_or_create_project("MRH100");
        let subject_id = repo.get_or_create_subject(Subject::new(
            mbi_id,
            "Test",
            "Subject",
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        ));
        repo.insert_session(ImagingSession::new(
            session_id,
            project_id,
            subject_id,
            ArchiveId::new("MRH100", subject_num, "MR01"),
            NaiveDate::from_ymd_opt(2019, 1, 10).unwrap(),
            DataStatus::Present,
            Priority::Low,
        ))
        .unwrap();
        let type_id = repo.get_or_create_scan_type(ScanType::new("t1_mprage_sag", true));
        repo.bulk_confirm_scan_types(&[(type_id, true)]).unwrap();
        repo.add_scan(Scan::new(session_id, type_id, "1"));
    }

    #[tokio::test]
    async fn test_export_run_continues_past_single_session_failure() {
        let mut engine = ReportingEngine::new(EngineSettings::default());
        add_exportable_session(&mut engine, 1, "MSH000001", "001");
        add_exportable_session(&mut engine, 2, "MSH000002", "002");

        let source = MemoryArchive::new("source");
        // 只有会话2在源归档上有文件，会话1缺少预期扫描
        source.add_experiment("MRH100", "MRH100_002_MR01", &[("1", "t1_mprage_sag")]);
        source.add_file("MRH100", "MRH100_002_MR01", "1", "image.dcm", b"data");

        let sync = ArchiveSynchronizer::new(
            Arc::new(source),
            Arc::new(MemoryArchive::new("destination")),
            "IFR_CLINICAL",
            scratch_root(),
        );

        let report = sync.run_export(&mut engine).await.unwrap();
        assert_eq!(report.exported_sessions, [2]);
        assert_eq!(report.uploaded_scans, 1);
        assert_eq!(report.failed_sessions.len(), 1);
        assert_eq!(report.failed_sessions[0].0, 1);
    }

    #[tokio::test]
    async fn test_unreachable_archive_aborts_run() {
        let mut engine = ReportingEngine::new(EngineSettings::default());
        add_exportable_session(&mut engine, 1, "MSH000001", "001");

        let sync = ArchiveSynchronizer::new(
            Arc::new(MemoryArchive::offline("source")),
            Arc::new(MemoryArchive::new("destination")),
            "IFR_CLINICAL",
            scratch_root(),
        );
        let err = sync.run_export(&mut engine).await.unwrap_err();
        assert!(matches!(err, IfrError::ArchiveConnectivity(_)));
    }

    #[tokio::test]
    async fn test_find_session_lookup() {
        let source = MemoryArchive::new("source");
        source.add_experiment("MRH100", "MRH100_002_MR01", &[("1", "t2_space")]);

        let sync = ArchiveSynchronizer::new(
            Arc::new(source),
            Arc::new(MemoryArchive::new("destination")),
            "IFR_CLINICAL",
            scratch_root(),
        );

        let found = sync
            .find_session(&ArchiveId::new("MRH100", "002", "MR01"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.scans.len(), 1);
        assert_eq!(found.scans[0].scan_type, "t2_space");

        let missing = sync
            .find_session(&ArchiveId::new("MRH100", "099", "MR01"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
