//! 实体仓库
//!
//! 以物化集合形式保存全部报告域实体，提供显式的查询与
//! 集合式批量更新接口。资格谓词（eligibility模块）在这些
//! 集合之上以纯函数实现，无需数据库即可单元测试。

use ifr_core::{
    ContactDetails, IfrError, ImagingSession, Project, Report, Result, Role, Scan, ScanType,
    Subject, User, UserContext, ADMIN_ROLE, REPORTER_ROLE,
};
use std::collections::HashMap;
use uuid::Uuid;

/// 报告域实体仓库
#[derive(Debug, Default)]
pub struct ReportingRepository {
    projects: HashMap<Uuid, Project>,
    project_codes: HashMap<String, Uuid>, // code -> project_id
    subjects: HashMap<Uuid, Subject>,
    subject_mbi_ids: HashMap<String, Uuid>, // mbi_id -> subject_id
    contact_details: HashMap<Uuid, Vec<ContactDetails>>, // subject_id -> history
    sessions: HashMap<i64, ImagingSession>,
    subject_sessions: HashMap<Uuid, Vec<i64>>, // subject_id -> session ids
    scans: HashMap<Uuid, Scan>,
    session_scans: HashMap<i64, Vec<Uuid>>, // session_id -> scan ids
    scan_types: HashMap<Uuid, ScanType>,
    scan_type_names: HashMap<String, Uuid>, // name -> type_id
    reports: HashMap<Uuid, Report>,
    session_reports: HashMap<i64, Vec<Uuid>>, // session_id -> report ids
    users: HashMap<Uuid, User>,
    user_emails: HashMap<String, Uuid>, // email -> user_id
    roles: HashMap<i32, Role>,
}

impl ReportingRepository {
    /// 创建新仓库并预置固定角色
    pub fn new() -> Self {
        let mut repo = Self::default();
        repo.roles.insert(
            ADMIN_ROLE,
            Role {
                id: ADMIN_ROLE,
                name: "Administrator".to_string(),
            },
        );
        repo.roles.insert(
            REPORTER_ROLE,
            Role {
                id: REPORTER_ROLE,
                name: "Reporter".to_string(),
            },
        );
        repo
    }

    // ========== 用户与角色 ==========

    /// 注册新用户，邮箱重复返回唯一性冲突
    pub fn add_user(&mut self, user: User) -> Result<Uuid> {
        if self.user_emails.contains_key(&user.email) {
            return Err(IfrError::IntegrityConflict(format!(
                "The email address '{}' has already been registered",
                user.email
            )));
        }
        for role_id in &user.role_ids {
            if !self.roles.contains_key(role_id) {
                return Err(IfrError::Validation(format!("Unknown role id {}", role_id)));
            }
        }
        let user_id = user.id;
        self.user_emails.insert(user.email.clone(), user_id);
        self.users.insert(user_id, user);
        Ok(user_id)
    }

    pub fn get_user(&self, user_id: Uuid) -> Result<&User> {
        self.users
            .get(&user_id)
            .ok_or_else(|| IfrError::NotFound(format!("User {} not found", user_id)))
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<&User> {
        self.user_emails.get(email).and_then(|id| self.users.get(id))
    }

    /// 由用户构造显式请求上下文
    pub fn user_context(&self, user_id: Uuid) -> Result<UserContext> {
        let user = self.get_user(user_id)?;
        Ok(UserContext::new(user.id, user.role_ids.clone()))
    }

    pub fn get_role(&self, role_id: i32) -> Option<&Role> {
        self.roles.get(&role_id)
    }

    // ========== 项目与受试者 ==========

    pub fn get_or_create_project(&mut self, code: &str) -> Uuid {
        if let Some(id) = self.project_codes.get(code) {
            return *id;
        }
        self.add_project(Project::new(code))
    }

    /// 按代码查找项目，不存在则插入给定实体
    pub fn add_project(&mut self, project: Project) -> Uuid {
        if let Some(id) = self.project_codes.get(&project.code) {
            return *id;
        }
        let id = project.id;
        self.project_codes.insert(project.code.clone(), id);
        self.projects.insert(id, project);
        id
    }

    pub fn get_project(&self, project_id: Uuid) -> Result<&Project> {
        self.projects
            .get(&project_id)
            .ok_or_else(|| IfrError::NotFound(format!("Project {} not found", project_id)))
    }

    pub fn find_project_by_code(&self, code: &str) -> Option<&Project> {
        self.project_codes.get(code).and_then(|id| self.projects.get(id))
    }

    /// 按外部代码查找受试者，不存在则插入给定实体
    pub fn get_or_create_subject(&mut self, subject: Subject) -> Uuid {
        if let Some(id) = self.subject_mbi_ids.get(&subject.mbi_id) {
            return *id;
        }
        let id = subject.id;
        self.subject_mbi_ids.insert(subject.mbi_id.clone(), id);
        self.subjects.insert(id, subject);
        id
    }

    pub fn get_subject(&self, subject_id: Uuid) -> Result<&Subject> {
        self.subjects
            .get(&subject_id)
            .ok_or_else(|| IfrError::NotFound(format!("Subject {} not found", subject_id)))
    }

    pub fn add_contact_details(&mut self, details: ContactDetails) {
        self.contact_details
            .entry(details.subject_id)
            .or_default()
            .push(details);
    }

    pub fn contact_details_for_subject(&self, subject_id: Uuid) -> &[ContactDetails] {
        self.contact_details
            .get(&subject_id)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    // ========== 影像会话 ==========

    pub fn session_exists(&self, session_id: i64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// 插入新会话，研究编号重复返回唯一性冲突
    pub fn insert_session(&mut self, session: ImagingSession) -> Result<()> {
        if self.sessions.contains_key(&session.id) {
            return Err(IfrError::IntegrityConflict(format!(
                "Session {} already exists",
                session.id
            )));
        }
        self.subject_sessions
            .entry(session.subject_id)
            .or_default()
            .push(session.id);
        self.sessions.insert(session.id, session);
        Ok(())
    }

    pub fn get_session(&self, session_id: i64) -> Result<&ImagingSession> {
        self.sessions
            .get(&session_id)
            .ok_or_else(|| IfrError::NotFound(format!("Session {} not found", session_id)))
    }

    pub fn get_session_mut(&mut self, session_id: i64) -> Result<&mut ImagingSession> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| IfrError::NotFound(format!("Session {} not found", session_id)))
    }

    pub fn all_sessions(&self) -> impl Iterator<Item = &ImagingSession> {
        self.sessions.values()
    }

    pub fn sessions_for_subject(&self, subject_id: Uuid) -> Vec<&ImagingSession> {
        self.subject_sessions
            .get(&subject_id)
            .map(|ids| ids.iter().filter_map(|id| self.sessions.get(id)).collect())
            .unwrap_or_default()
    }

    // ========== 扫描与扫描类型 ==========

    pub fn add_scan(&mut self, scan: Scan) -> Uuid {
        let scan_id = scan.id;
        self.session_scans
            .entry(scan.session_id)
            .or_default()
            .push(scan_id);
        self.scans.insert(scan_id, scan);
        scan_id
    }

    pub fn get_scan(&self, scan_id: Uuid) -> Result<&Scan> {
        self.scans
            .get(&scan_id)
            .ok_or_else(|| IfrError::NotFound(format!("Scan {} not found", scan_id)))
    }

    pub fn scans_for_session(&self, session_id: i64) -> Vec<&Scan> {
        self.session_scans
            .get(&session_id)
            .map(|ids| ids.iter().filter_map(|id| self.scans.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn mark_scan_exported(&mut self, scan_id: Uuid) -> Result<()> {
        let scan = self
            .scans
            .get_mut(&scan_id)
            .ok_or_else(|| IfrError::NotFound(format!("Scan {} not found", scan_id)))?;
        scan.exported = true;
        Ok(())
    }

    pub fn get_scan_type(&self, type_id: Uuid) -> Result<&ScanType> {
        self.scan_types
            .get(&type_id)
            .ok_or_else(|| IfrError::NotFound(format!("Scan type {} not found", type_id)))
    }

    pub fn find_scan_type_by_name(&self, name: &str) -> Option<&ScanType> {
        self.scan_type_names
            .get(name)
            .and_then(|id| self.scan_types.get(id))
    }

    /// 按序列名查找扫描类型，首次见到时插入给定实体
    pub fn get_or_create_scan_type(&mut self, scan_type: ScanType) -> Uuid {
        if let Some(id) = self.scan_type_names.get(&scan_type.name) {
            return *id;
        }
        let id = scan_type.id;
        self.scan_type_names.insert(scan_type.name.clone(), id);
        self.scan_types.insert(id, scan_type);
        id
    }

    /// 未确认的扫描类型，按名称字母序
    pub fn unconfirmed_scan_types(&self) -> Vec<&ScanType> {
        let mut types: Vec<&ScanType> =
            self.scan_types.values().filter(|t| !t.confirmed).collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    /// 批量确认扫描类型
    ///
    /// 单次集合式更新：每个给定类型置confirmed并按决定设置clinical，
    /// 避免逐行竞争。返回实际更新的数量。
    pub fn bulk_confirm_scan_types(&mut self, decisions: &[(Uuid, bool)]) -> Result<usize> {
        // 先验证所有id，保证整批操作原子生效
        for (type_id, _) in decisions {
            if !self.scan_types.contains_key(type_id) {
                return Err(IfrError::NotFound(format!(
                    "Scan type {} not found",
                    type_id
                )));
            }
        }
        for (type_id, clinical) in decisions {
            if let Some(scan_type) = self.scan_types.get_mut(type_id) {
                scan_type.clinical = *clinical;
                scan_type.confirmed = true;
            }
        }
        tracing::info!("Confirmed {} scan types", decisions.len());
        Ok(decisions.len())
    }

    // ========== 报告 ==========

    pub fn add_report(&mut self, report: Report) -> Uuid {
        let report_id = report.id;
        self.session_reports
            .entry(report.session_id)
            .or_default()
            .push(report_id);
        self.reports.insert(report_id, report);
        report_id
    }

    pub fn get_report(&self, report_id: Uuid) -> Result<&Report> {
        self.reports
            .get(&report_id)
            .ok_or_else(|| IfrError::NotFound(format!("Report {} not found", report_id)))
    }

    pub fn reports_for_session(&self, session_id: i64) -> Vec<&Report> {
        self.session_reports
            .get(&session_id)
            .map(|ids| ids.iter().filter_map(|id| self.reports.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn session_has_report(&self, session_id: i64) -> bool {
        self.session_reports
            .get(&session_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn subject(mbi_id: &str) -> Subject {
        Subject::new(
            mbi_id,
            "Test",
            "Subject",
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        )
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let mut repo = ReportingRepository::new();
        let first = User::new("A", "B", "a@example.org", "hash", vec![REPORTER_ROLE]);
        repo.add_user(first).unwrap();

        let dup = User::new("C", "D", "a@example.org", "hash", vec![REPORTER_ROLE]);
        let err = repo.add_user(dup).unwrap_err();
        assert!(matches!(err, IfrError::IntegrityConflict(_)));
    }

    #[test]
    fn test_subject_interning() {
        let mut repo = ReportingRepository::new();
        let a = repo.get_or_create_subject(subject("MSH103138"));
        let b = repo.get_or_create_subject(subject("MSH103138"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_session_conflict() {
        let mut repo = ReportingRepository::new();
        let project_id = repo.get_or_create_project("MRH100");
        let subject_id = repo.get_or_create_subject(subject("MSH103138"));
        let session = ImagingSession::new(
            1231,
            project_id,
            subject_id,
            ifr_core::ArchiveId::new("MRH100", "124", "MR02"),
            NaiveDate::from_ymd_opt(2017, 4, 10).unwrap(),
            ifr_core::DataStatus::Present,
            ifr_core::Priority::Low,
        );
        repo.insert_session(session.clone()).unwrap();
        assert!(matches!(
            repo.insert_session(session),
            Err(IfrError::IntegrityConflict(_))
        ));
    }

    #[test]
    fn test_bulk_confirm_is_all_or_nothing() {
        let mut repo = ReportingRepository::new();
        let t1 = repo.get_or_create_scan_type(ScanType::new("t1_mprage", true));
        let bogus = Uuid::new_v4();

        let err = repo
            .bulk_confirm_scan_types(&[(t1, true), (bogus, false)])
            .unwrap_err();
        assert!(matches!(err, IfrError::NotFound(_)));
        // 失败的批次不应更新任何一行
        assert!(!repo.get_scan_type(t1).unwrap().confirmed);

        repo.bulk_confirm_scan_types(&[(t1, false)]).unwrap();
        let confirmed = repo.get_scan_type(t1).unwrap();
        assert!(confirmed.confirmed);
        assert!(!confirmed.clinical);
    }

    #[test]
    fn test_unconfirmed_scan_types_sorted() {
        let mut repo = ReportingRepository::new();
        repo.get_or_create_scan_type(ScanType::new("t2_space", true));
        repo.get_or_create_scan_type(ScanType::new("AAHead_Scout", false));
        let confirmed_id = repo.get_or_create_scan_type(ScanType::new("qsm_p2", true));
        repo.bulk_confirm_scan_types(&[(confirmed_id, true)]).unwrap();

        let names: Vec<&str> = repo
            .unconfirmed_scan_types()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, ["AAHead_Scout", "t2_space"]);
    }
}
