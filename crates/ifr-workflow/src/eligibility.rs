//! 资格查询引擎
//!
//! 从实体状态推导三类工作队列：待报告、可导出、待修复。
//! 过滤谓词以纯函数实现，直接作用于仓库的物化集合。

use crate::repository::ReportingRepository;
use crate::state_machine::DataStatusMachine;
use chrono::NaiveDate;
use ifr_core::{DataStatus, ImagingSession};

/// 两个日期是否在间隔窗口内（含边界）
pub fn within_interval(a: NaiveDate, b: NaiveDate, interval_days: i64) -> bool {
    (a - b).num_days().abs() <= interval_days
}

/// 状态是否可能需要报告（非终止状态）
pub fn is_reportable_status(status: DataStatus) -> bool {
    !DataStatusMachine::is_terminal(status)
}

/// 同一受试者是否存在扫描日期更晚的可报告会话
///
/// 只有每个受试者最近一次可报告会话会进入报告队列。
pub fn has_later_eligible_session(repo: &ReportingRepository, session: &ImagingSession) -> bool {
    repo.sessions_for_subject(session.subject_id)
        .iter()
        .any(|other| {
            other.id != session.id
                && other.scan_date > session.scan_date
                && is_reportable_status(other.data_status)
        })
}

/// 同一受试者是否已有落在报告间隔内的报告
///
/// 带报告的会话本身的扫描日期、或报告自身日期，任一落在本会话
/// 扫描日期的间隔窗口内即算命中（会话自己的报告自然命中）。
pub fn has_recent_report(
    repo: &ReportingRepository,
    session: &ImagingSession,
    interval_days: i64,
) -> bool {
    repo.sessions_for_subject(session.subject_id)
        .iter()
        .any(|reported| {
            let reports = repo.reports_for_session(reported.id);
            if reports.is_empty() {
                return false;
            }
            within_interval(reported.scan_date, session.scan_date, interval_days)
                || reports
                    .iter()
                    .any(|r| within_interval(r.date, session.scan_date, interval_days))
        })
}

/// 会话是否仍需报告
pub fn requires_report(
    repo: &ReportingRepository,
    session: &ImagingSession,
    interval_days: i64,
) -> bool {
    is_reportable_status(session.data_status)
        && !has_later_eligible_session(repo, session)
        && !has_recent_report(repo, session, interval_days)
}

/// 待报告会话队列
pub fn sessions_requiring_report(
    repo: &ReportingRepository,
    interval_days: i64,
) -> Vec<ImagingSession> {
    let mut sessions: Vec<ImagingSession> = repo
        .all_sessions()
        .filter(|s| requires_report(repo, s, interval_days))
        .cloned()
        .collect();
    sort_work_queue(&mut sessions);
    sessions
}

/// 会话的临床扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClinicalState {
    /// 存在未经人工确认的扫描类型，尚无法判定
    Unresolved,
    /// 所有类型已确认且没有临床相关扫描
    NoClinical,
    /// 存在已确认的临床相关扫描
    HasClinical,
}

/// 判定会话的临床扫描状态
pub fn session_clinical_state(repo: &ReportingRepository, session_id: i64) -> ClinicalState {
    let mut has_clinical = false;
    for scan in repo.scans_for_session(session_id) {
        match repo.get_scan_type(scan.type_id) {
            Ok(scan_type) if !scan_type.confirmed => return ClinicalState::Unresolved,
            Ok(scan_type) if scan_type.clinical => has_clinical = true,
            _ => {}
        }
    }
    if has_clinical {
        ClinicalState::HasClinical
    } else {
        ClinicalState::NoClinical
    }
}

/// 会话的临床扫描是否全部已导出
pub fn session_fully_exported(repo: &ReportingRepository, session_id: i64) -> bool {
    repo.scans_for_session(session_id).iter().all(|scan| {
        match repo.get_scan_type(scan.type_id) {
            Ok(scan_type) => !scan_type.clinical || scan.exported,
            Err(_) => false,
        }
    })
}

/// 可导出会话队列
///
/// 在待报告队列基础上进一步要求：数据在源归档上存在，且会话中
/// 不存在未确认的扫描类型。
pub fn sessions_ready_for_export(
    repo: &ReportingRepository,
    interval_days: i64,
) -> Vec<ImagingSession> {
    let mut sessions: Vec<ImagingSession> = repo
        .all_sessions()
        .filter(|s| s.data_status == DataStatus::Present)
        .filter(|s| requires_report(repo, s, interval_days))
        .filter(|s| session_clinical_state(repo, s.id) != ClinicalState::Unresolved)
        .cloned()
        .collect();
    sort_work_queue(&mut sessions);
    sessions
}

/// 待修复会话队列，按状态严重程度、扫描日期排序
pub fn sessions_needing_repair(repo: &ReportingRepository) -> Vec<ImagingSession> {
    let mut sessions: Vec<ImagingSession> = repo
        .all_sessions()
        .filter(|s| DataStatusMachine::needs_repair(s.data_status))
        .cloned()
        .collect();
    sessions.sort_by_key(|s| {
        (
            DataStatusMachine::repair_severity(s.data_status).unwrap_or(u8::MAX),
            s.scan_date,
        )
    });
    sessions
}

/// 工作队列排序：优先级降序，扫描日期升序（最久未处理优先）
pub fn sort_work_queue(sessions: &mut [ImagingSession]) {
    sessions.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.scan_date.cmp(&b.scan_date))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ReportingRepository;
    use ifr_core::{
        ArchiveId, Conclusion, ImagingSession, Modality, Priority, Report, Scan, ScanType,
        Subject, User, REPORTER_ROLE,
    };
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_subject(repo: &mut ReportingRepository, mbi_id: &str) -> Uuid {
        repo.get_or_create_subject(Subject::new(mbi_id, "Test", "Subject", date(1970, 1, 1)))
    }

    fn add_session(
        repo: &mut ReportingRepository,
        id: i64,
        subject_id: Uuid,
        scan_date: NaiveDate,
        status: DataStatus,
        priority: Priority,
    ) {
        let project_id = repo.get_or_create_project("MRH100");
        let session = ImagingSession::new(
            id,
            project_id,
            subject_id,
            ArchiveId::new("MRH100", "124", "MR01"),
            scan_date,
            status,
            priority,
        );
        repo.insert_session(session).unwrap();
    }

    fn add_report(repo: &mut ReportingRepository, session_id: i64, report_date: NaiveDate) {
        let email = format!("reporter{}@example.org", session_id);
        let user = User::new("R", "Eporter", email, "hash", vec![REPORTER_ROLE]);
        let reporter_id = repo.add_user(user).unwrap();
        repo.add_report(Report::new(
            session_id,
            reporter_id,
            "Nothing to report",
            Conclusion::NoPathology,
            vec![],
            Modality::Mri,
            report_date,
        ));
    }

    #[test]
    fn test_only_most_recent_eligible_session_per_subject() {
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH223132");
        add_session(&mut repo, 1244, subject, date(2018, 2, 11), DataStatus::Present, Priority::Low);
        add_session(&mut repo, 1254, subject, date(2018, 2, 12), DataStatus::Present, Priority::Low);
        // 更晚但终止状态的会话不抑制旧会话
        add_session(&mut repo, 1260, subject, date(2018, 3, 1), DataStatus::Excluded, Priority::Low);

        let queue = sessions_requiring_report(&repo, 365);
        let ids: Vec<i64> = queue.iter().map(|s| s.id).collect();
        assert_eq!(ids, [1254]);
    }

    #[test]
    fn test_terminal_statuses_never_require_report() {
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH892342");
        add_session(&mut repo, 1, subject, date(2019, 1, 1), DataStatus::NotScanned, Priority::Low);
        let subject2 = add_subject(&mut repo, "MSH234234");
        add_session(&mut repo, 2, subject2, date(2019, 1, 1), DataStatus::Excluded, Priority::Low);

        assert!(sessions_requiring_report(&repo, 365).is_empty());
    }

    #[test]
    fn test_recent_report_suppresses_session() {
        // 规格场景：扫描日期2024-01-10，已有2024-06-01的报告，
        // 间隔365天 -> 从报告队列中抑制（差143天）
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH623177");
        add_session(&mut repo, 10, subject, date(2024, 1, 10), DataStatus::Present, Priority::Low);
        add_report(&mut repo, 10, date(2024, 6, 1));

        assert!(sessions_requiring_report(&repo, 365).is_empty());
    }

    #[test]
    fn test_sibling_session_report_suppresses_within_interval() {
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH823056");
        // 旧会话已报告；新会话扫描日期在其365天窗口内
        add_session(&mut repo, 1366, subject, date(2017, 10, 11), DataStatus::Present, Priority::Low);
        add_report(&mut repo, 1366, date(2017, 10, 20));
        add_session(&mut repo, 1500, subject, date(2018, 5, 11), DataStatus::Present, Priority::Low);

        assert!(sessions_requiring_report(&repo, 365).is_empty());

        // 超出窗口的新会话不受影响
        let subject2 = add_subject(&mut repo, "MSH097334");
        add_session(&mut repo, 1600, subject2, date(2017, 1, 1), DataStatus::Present, Priority::Low);
        add_report(&mut repo, 1600, date(2017, 1, 5));
        add_session(&mut repo, 1601, subject2, date(2019, 1, 11), DataStatus::Present, Priority::Low);

        let ids: Vec<i64> = sessions_requiring_report(&repo, 365)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, [1601]);
    }

    #[test]
    fn test_unconfirmed_scan_type_blocks_export() {
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH097335");
        add_session(&mut repo, 20, subject, date(2018, 12, 10), DataStatus::Present, Priority::Low);

        let type_id = repo.get_or_create_scan_type(ScanType::new("t1_mprage", true));
        repo.add_scan(Scan::new(20, type_id, "1"));

        assert!(sessions_ready_for_export(&repo, 365).is_empty());

        repo.bulk_confirm_scan_types(&[(type_id, true)]).unwrap();
        let ids: Vec<i64> = sessions_ready_for_export(&repo, 365)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, [20]);
    }

    #[test]
    fn test_non_present_sessions_not_exportable() {
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH097336");
        add_session(&mut repo, 30, subject, date(2018, 10, 10), DataStatus::NotFound, Priority::Low);

        assert!(sessions_ready_for_export(&repo, 365).is_empty());
        // 但仍需要报告（非终止状态）
        assert_eq!(sessions_requiring_report(&repo, 365).len(), 1);
    }

    #[test]
    fn test_clinical_state() {
        let mut repo = ReportingRepository::new();
        let subject = add_subject(&mut repo, "MSH103138");
        add_session(&mut repo, 40, subject, date(2017, 4, 10), DataStatus::Present, Priority::Low);

        // 无扫描时视为无临床扫描
        assert_eq!(session_clinical_state(&repo, 40), ClinicalState::NoClinical);

        let scout = repo.get_or_create_scan_type(ScanType::new("AAHead_Scout", false));
        repo.add_scan(Scan::new(40, scout, "1"));
        assert_eq!(session_clinical_state(&repo, 40), ClinicalState::Unresolved);

        repo.bulk_confirm_scan_types(&[(scout, false)]).unwrap();
        assert_eq!(session_clinical_state(&repo, 40), ClinicalState::NoClinical);

        let t1 = repo.get_or_create_scan_type(ScanType::new("t1_mprage", true));
        repo.bulk_confirm_scan_types(&[(t1, true)]).unwrap();
        repo.add_scan(Scan::new(40, t1, "2"));
        assert_eq!(session_clinical_state(&repo, 40), ClinicalState::HasClinical);
    }

    #[test]
    fn test_work_queue_ordering() {
        let mut repo = ReportingRepository::new();
        let a = add_subject(&mut repo, "MSH000001");
        let b = add_subject(&mut repo, "MSH000002");
        let c = add_subject(&mut repo, "MSH000003");
        add_session(&mut repo, 1, a, date(2019, 1, 13), DataStatus::Present, Priority::Medium);
        add_session(&mut repo, 2, b, date(2019, 2, 11), DataStatus::Present, Priority::Low);
        add_session(&mut repo, 3, c, date(2019, 1, 11), DataStatus::Present, Priority::High);

        let ids: Vec<i64> = sessions_requiring_report(&repo, 365)
            .iter()
            .map(|s| s.id)
            .collect();
        // 优先级降序，同级按扫描日期升序
        assert_eq!(ids, [3, 1, 2]);
    }

    #[test]
    fn test_repair_queue_ordering() {
        let mut repo = ReportingRepository::new();
        let a = add_subject(&mut repo, "MSH000010");
        let b = add_subject(&mut repo, "MSH000011");
        let c = add_subject(&mut repo, "MSH000012");
        add_session(&mut repo, 1, a, date(2018, 1, 1), DataStatus::FoundNoClinical, Priority::Low);
        add_session(&mut repo, 2, b, date(2018, 6, 1), DataStatus::InvalidLabel, Priority::Low);
        add_session(&mut repo, 3, c, date(2018, 3, 1), DataStatus::InvalidLabel, Priority::Low);

        let ids: Vec<i64> = sessions_needing_repair(&repo)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, [3, 2, 1]);
    }
}
