//! 导入方向：旧系统候选记录 -> 本地实体模型
//!
//! 上游解析层（表格/XML）把每行归一化为SessionCandidate交给这里。
//! 按研究编号幂等：本地已有的会话计为previous，不再重新处理。

use crate::client::ArchiveClient;
use ifr_core::{
    utils, ArchiveId, Conclusion, DataStatus, IfrError, ImagingSession, Modality, Priority,
    Report, Result, Subject, User, REPORTER_ROLE, VALID_PROJECT_PREFIXES,
};
use ifr_workflow::{
    engine::{ArchiveScanEntry, ArchiveSessionInfo},
    ReportingEngine, ReportingRepository,
};
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

/// 归一化后的一条候选会话记录
///
/// 缺失字段以空字符串表示（旧系统导出中的None）。
#[derive(Debug, Clone, Default)]
pub struct SessionCandidate {
    pub study_id: i64,
    pub project_id: String,
    pub subject_id: String,
    pub first_name: String,
    pub last_name: String,
    /// 日/月/年，"."为备用分隔符
    pub dob: String,
    pub scan_date: String,
    /// 旧归档层级代码，形如 1008.2.<project>.<subject>.1.<visit>
    pub daris_id: String,
    pub xnat_subject_id: String,
    pub xnat_visit_id: String,
    /// 自由文本，非空表示MR报告已在旧系统提交
    pub mr_report: String,
    pub pet_report: String,
}

/// 一次导入运行的结果计数
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub imported: Vec<i64>,
    pub previous: Vec<i64>,
    pub skipped: Vec<i64>,
}

/// 回填占位报告使用的历史报告人
#[derive(Debug, Clone, Copy)]
pub struct BackfillReporters {
    pub mr_reporter: Uuid,
    pub pet_reporter: Uuid,
    pub axis: Uuid,
}

impl BackfillReporters {
    /// 预置三个非活跃的历史报告人账号
    pub fn seed(repo: &mut ReportingRepository) -> Result<Self> {
        let mut add = |first: &str, last: &str, email: &str| -> Result<Uuid> {
            match repo.find_user_by_email(email) {
                Some(user) => Ok(user.id),
                None => repo.add_user(User::new(
                    first,
                    last,
                    email,
                    String::new(),
                    vec![REPORTER_ROLE],
                )),
            }
        };
        Ok(Self {
            mr_reporter: add("Legacy", "MR Reporter", "legacy.mr@local")?,
            pet_reporter: add("Legacy", "PET Reporter", "legacy.pet@local")?,
            axis: add("AXIS", "Reporting", "axis.reporting@local")?,
        })
    }
}

/// 旧系统导出记录导入器
pub struct FeedImporter {
    daris_re: Regex,
}

impl FeedImporter {
    pub fn new() -> Self {
        Self {
            daris_re: Regex::new(r"^1008\.2\.(\d+)\.(\d+)(?:\.1\.(\d+))?.*")
                .expect("DARIS pattern is valid"),
        }
    }

    /// 导入一批候选记录
    ///
    /// 归档连接失败会使整个运行失败；单条记录的标签问题只影响
    /// 该记录的数据状态。
    pub async fn import(
        &self,
        engine: &mut ReportingEngine,
        source: &dyn ArchiveClient,
        backfill: &BackfillReporters,
        candidates: &[SessionCandidate],
    ) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        for candidate in candidates {
            let mut data_status = DataStatus::Present;

            let project_code = candidate.project_id.trim().to_string();
            if project_code.is_empty() {
                data_status = DataStatus::InvalidLabel;
            } else if !VALID_PROJECT_PREFIXES
                .iter()
                .any(|p| project_code.starts_with(p))
            {
                warn!(
                    "Skipping {} from unrecognised project '{}'",
                    candidate.study_id, project_code
                );
                summary.skipped.push(candidate.study_id);
                continue;
            }

            let dob = utils::parse_feed_date(&candidate.dob).map_err(|_| {
                IfrError::Validation(format!(
                    "Could not parse date of birth of {} ({})",
                    candidate.study_id, candidate.dob
                ))
            })?;

            let repo = engine.repository_mut();
            let project_id = repo.get_or_create_project(&project_code);
            let subject_id = repo.get_or_create_subject(Subject::new(
                candidate.subject_id.trim(),
                candidate.first_name.trim(),
                candidate.last_name.trim(),
                dob,
            ));

            if repo.session_exists(candidate.study_id) {
                summary.previous.push(candidate.study_id);
                continue;
            }

            let scan_date = utils::parse_feed_date(&candidate.scan_date).map_err(|_| {
                IfrError::Validation(format!(
                    "Could not parse scan date for {} ({})",
                    candidate.study_id, candidate.scan_date
                ))
            })?;

            // 受试者/访视编号：优先旧归档层级代码，其次显式字段
            let mut subject_num = String::new();
            let mut visit_num = String::new();
            let daris_code = candidate.daris_id.trim();
            if !daris_code.is_empty() {
                if let Some(caps) = self.daris_re.captures(daris_code) {
                    subject_num = caps[2].to_string();
                    visit_num = caps
                        .get(3)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| "1".to_string());
                } else if daris_code.starts_with("1.5.") {
                    data_status = DataStatus::ArchivedElsewhere;
                } else {
                    data_status = DataStatus::InvalidLabel;
                }
            } else {
                subject_num = candidate.xnat_subject_id.trim().to_string();
                visit_num = candidate.xnat_visit_id.trim().to_string();
                if subject_num.is_empty() || visit_num.is_empty() {
                    data_status = DataStatus::InvalidLabel;
                }
            }

            let subject_label = utils::normalize_subject_id(&subject_num);
            let pet_capable = project_code.starts_with("MMH");
            let visit_prefix = if pet_capable { "MRPT" } else { "MR" };

            // 旧系统是否已提交全部所需报告（PET兼容项目要求两份）
            let mut all_reports_submitted = !candidate.mr_report.trim().is_empty();
            if pet_capable {
                all_reports_submitted &= !candidate.pet_report.trim().is_empty();
            }

            let visit_label = match utils::normalize_visit_id(&visit_num, visit_prefix) {
                Some(label) => label,
                None => {
                    data_status = DataStatus::InvalidLabel;
                    String::new()
                }
            };
            let archive_id = ArchiveId::new(&project_code, &subject_label, &visit_label);

            let mut archive_info = None;
            if all_reports_submitted {
                data_status = DataStatus::NotChecked;
            } else if !matches!(
                data_status,
                DataStatus::InvalidLabel | DataStatus::ArchivedElsewhere
            ) {
                if source
                    .find_experiment(&project_code, &archive_id.label())
                    .await?
                {
                    let scans = source
                        .list_scans(&project_code, &archive_id.label())
                        .await?;
                    archive_info = Some(ArchiveSessionInfo {
                        scans: scans
                            .into_iter()
                            .map(|s| ArchiveScanEntry {
                                sequence_id: s.sequence_id,
                                scan_type: s.scan_type,
                            })
                            .collect(),
                    });
                } else {
                    data_status = DataStatus::NotFound;
                }
            }

            let mut session = ImagingSession::new(
                candidate.study_id,
                project_id,
                subject_id,
                archive_id,
                scan_date,
                data_status,
                Priority::Low,
            );
            if !daris_code.is_empty() {
                session.daris_code = Some(daris_code.to_string());
            }
            engine.repository_mut().insert_session(session)?;

            if let Some(info) = archive_info {
                engine.sync_archive_scans(candidate.study_id, &info);
            }

            // 旧系统已有报告时回填占位报告
            if !candidate.mr_report.trim().is_empty() {
                let reporter = if candidate.mr_report.contains("MSH") {
                    backfill.axis
                } else {
                    backfill.mr_reporter
                };
                self.add_dummy_report(engine, candidate.study_id, reporter, Modality::Mri, scan_date);
            }
            if !candidate.pet_report.trim().is_empty() {
                self.add_dummy_report(
                    engine,
                    candidate.study_id,
                    backfill.pet_reporter,
                    Modality::Pet,
                    scan_date,
                );
            }

            summary.imported.push(candidate.study_id);
        }

        info!(
            "Import finished: {} imported, {} previous, {} skipped",
            summary.imported.len(),
            summary.previous.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    fn add_dummy_report(
        &self,
        engine: &mut ReportingEngine,
        session_id: i64,
        reporter_id: Uuid,
        modality: Modality,
        date: chrono::NaiveDate,
    ) {
        let mut report = Report::new(
            session_id,
            reporter_id,
            "",
            Conclusion::NotRecorded,
            vec![],
            modality,
            date,
        );
        report.dummy = true;
        engine.repository_mut().add_report(report);
    }
}

impl Default for FeedImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryArchive;
    use ifr_workflow::EngineSettings;

    fn candidate(study_id: i64) -> SessionCandidate {
        SessionCandidate {
            study_id,
            project_id: "MRH100".to_string(),
            subject_id: "MSH103138".to_string(),
            first_name: "Bob".to_string(),
            last_name: "Brown".to_string(),
            dob: "12/03/1952".to_string(),
            scan_date: "10/04/2017".to_string(),
            xnat_subject_id: "124".to_string(),
            xnat_visit_id: "2".to_string(),
            ..Default::default()
        }
    }

    fn setup() -> (ReportingEngine, BackfillReporters, FeedImporter) {
        let mut engine = ReportingEngine::new(EngineSettings::default());
        let backfill = BackfillReporters::seed(engine.repository_mut()).unwrap();
        (engine, backfill, FeedImporter::new())
    }

    #[tokio::test]
    async fn test_import_found_session_with_scans() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");
        source.add_experiment(
            "MRH100",
            "MRH100_124_MR02",
            &[("1", "t1_mprage_sag"), ("2", "localizer_kspace")],
        );

        let summary = importer
            .import(&mut engine, &source, &backfill, &[candidate(1231)])
            .await
            .unwrap();
        assert_eq!(summary.imported, [1231]);

        let session = engine.repository().get_session(1231).unwrap();
        assert_eq!(session.data_status, DataStatus::Present);
        assert_eq!(session.archive_id.label(), "MRH100_124_MR02");

        // 扫描类型按首次见到分类
        let scans = engine.repository().scans_for_session(1231);
        assert_eq!(scans.len(), 2);
        let t1 = engine
            .repository()
            .find_scan_type_by_name("t1_mprage_sag")
            .unwrap();
        assert!(t1.clinical && !t1.confirmed);
        let kspace = engine
            .repository()
            .find_scan_type_by_name("localizer_kspace")
            .unwrap();
        assert!(!kspace.clinical);
    }

    #[tokio::test]
    async fn test_import_is_idempotent_per_study_id() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");
        source.add_experiment("MRH100", "MRH100_124_MR02", &[]);

        let record = candidate(1231);
        let first = importer
            .import(&mut engine, &source, &backfill, &[record.clone()])
            .await
            .unwrap();
        assert_eq!(first.imported, [1231]);

        let second = importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        assert!(second.imported.is_empty());
        assert_eq!(second.previous, [1231]);
        assert_eq!(
            engine
                .repository()
                .all_sessions()
                .filter(|s| s.id == 1231)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_import_not_found_on_archive() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        importer
            .import(&mut engine, &source, &backfill, &[candidate(1)])
            .await
            .unwrap();
        assert_eq!(
            engine.repository().get_session(1).unwrap().data_status,
            DataStatus::NotFound
        );
    }

    #[tokio::test]
    async fn test_daris_code_decomposition() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");
        source.add_experiment("MRH100", "MRH100_111_MR02", &[]);

        let mut record = candidate(2);
        record.xnat_subject_id.clear();
        record.xnat_visit_id.clear();
        record.daris_id = "1008.2.88.111.1.2".to_string();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        let session = engine.repository().get_session(2).unwrap();
        assert_eq!(session.archive_id.label(), "MRH100_111_MR02");
        assert_eq!(session.data_status, DataStatus::Present);
        assert_eq!(session.daris_code.as_deref(), Some("1008.2.88.111.1.2"));
    }

    #[tokio::test]
    async fn test_daris_visit_defaults_to_one() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        let mut record = candidate(3);
        record.xnat_subject_id.clear();
        record.xnat_visit_id.clear();
        record.daris_id = "1008.2.88.42".to_string();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        let session = engine.repository().get_session(3).unwrap();
        assert_eq!(session.archive_id.label(), "MRH100_042_MR01");
    }

    #[tokio::test]
    async fn test_legacy_archive_pattern() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        let mut record = candidate(4);
        record.xnat_subject_id.clear();
        record.xnat_visit_id.clear();
        record.daris_id = "1.5.208.1234".to_string();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        assert_eq!(
            engine.repository().get_session(4).unwrap().data_status,
            DataStatus::ArchivedElsewhere
        );
    }

    #[tokio::test]
    async fn test_missing_identifiers_invalid_label() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        let mut record = candidate(5);
        record.xnat_visit_id.clear();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        assert_eq!(
            engine.repository().get_session(5).unwrap().data_status,
            DataStatus::InvalidLabel
        );
    }

    #[tokio::test]
    async fn test_unknown_project_prefix_skipped() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        let mut record = candidate(6);
        record.project_id = "QNAP01".to_string();

        let summary = importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        assert_eq!(summary.skipped, [6]);
        assert!(!engine.repository().session_exists(6));
    }

    #[tokio::test]
    async fn test_already_reported_not_checked_with_dummy_reports() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        let mut record = candidate(7);
        record.mr_report = "Reported by Dr X".to_string();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        let session = engine.repository().get_session(7).unwrap();
        assert_eq!(session.data_status, DataStatus::NotChecked);

        let reports = engine.repository().reports_for_session(7);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].dummy);
        assert_eq!(reports[0].reporter_id, backfill.mr_reporter);
        assert_eq!(reports[0].conclusion, Conclusion::NotRecorded);
    }

    #[tokio::test]
    async fn test_axis_report_marker() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");

        let mut record = candidate(8);
        record.mr_report = "MSH outsourced".to_string();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        let reports = engine.repository().reports_for_session(8);
        assert_eq!(reports[0].reporter_id, backfill.axis);
    }

    #[tokio::test]
    async fn test_pet_capable_project_uses_mrpt_prefix() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::new("source");
        source.add_experiment("MMH002", "MMH002_124_MRPT02", &[]);

        let mut record = candidate(9);
        record.project_id = "MMH002".to_string();
        // MR报告已提交但PET未提交，仍需检查归档
        record.mr_report = "Reported".to_string();

        importer
            .import(&mut engine, &source, &backfill, &[record])
            .await
            .unwrap();
        let session = engine.repository().get_session(9).unwrap();
        assert_eq!(session.archive_id.label(), "MMH002_124_MRPT02");
        assert_eq!(session.data_status, DataStatus::Present);
    }

    #[tokio::test]
    async fn test_connectivity_failure_aborts_run() {
        let (mut engine, backfill, importer) = setup();
        let source = MemoryArchive::offline("source");

        let err = importer
            .import(&mut engine, &source, &backfill, &[candidate(10)])
            .await
            .unwrap_err();
        assert!(matches!(err, IfrError::ArchiveConnectivity(_)));
        assert!(!engine.repository().session_exists(10));
    }
}
