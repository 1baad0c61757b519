//! 报告引擎
//!
//! 协调仓库、状态机、分类器与确认流程的审阅者操作入口。
//! 每个操作显式接收调用者上下文并做角色检查。

use crate::{
    classifier::ScanClassifier,
    confirmation::{self, ConfirmationPage, ScanTypeDecision},
    eligibility::{self, ClinicalState},
    repository::ReportingRepository,
    state_machine::{DataStatusMachine, StatusEvent},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ifr_core::{
    ArchiveId, Conclusion, DataStatus, IfrError, ImagingSession, Modality, Report, Result, Scan,
    ScanType, User, UserContext, ADMIN_ROLE, REPORTER_ROLE,
};
use uuid::Uuid;

/// 源归档上的一条扫描记录
#[derive(Debug, Clone)]
pub struct ArchiveScanEntry {
    pub sequence_id: String,
    pub scan_type: String,
}

/// 源归档上查到的会话信息
#[derive(Debug, Clone, Default)]
pub struct ArchiveSessionInfo {
    pub scans: Vec<ArchiveScanEntry>,
}

/// 源归档查询接口
///
/// 修复与复查通过该接口访问源归档，归档实现位于集成层。
#[async_trait]
pub trait ArchiveLookup: Send + Sync {
    /// 按规范标签查找会话，未找到返回None，连接失败返回错误
    async fn find_session(&self, archive_id: &ArchiveId) -> Result<Option<ArchiveSessionInfo>>;
}

/// 引擎参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// 两次报告之间的最短间隔天数
    pub report_interval_days: i64,
    /// 扫描类型确认页大小
    pub confirm_page_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            report_interval_days: 365,
            confirm_page_size: 25,
        }
    }
}

/// 报告提交请求
#[derive(Debug, Clone)]
pub struct SubmitReport {
    pub session_id: i64,
    pub findings: String,
    pub conclusion: Conclusion,
    pub used_scan_ids: Vec<Uuid>,
    pub modality: Modality,
    /// 缺省为当天
    pub date: Option<NaiveDate>,
}

/// 报告引擎
#[derive(Debug)]
pub struct ReportingEngine {
    repository: ReportingRepository,
    state_machine: DataStatusMachine,
    classifier: ScanClassifier,
    settings: EngineSettings,
}

impl ReportingEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            repository: ReportingRepository::new(),
            state_machine: DataStatusMachine::new(),
            classifier: ScanClassifier::new(),
            settings,
        }
    }

    pub fn repository(&self) -> &ReportingRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut ReportingRepository {
        &mut self.repository
    }

    pub fn classifier(&self) -> &ScanClassifier {
        &self.classifier
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ========== 用户注册 ==========

    /// 注册用户（邮箱重复返回唯一性冲突，由外层转换为用户提示）
    pub fn register_user(&mut self, user: User) -> Result<Uuid> {
        let email = user.email.clone();
        let user_id = self.repository.add_user(user)?;
        tracing::info!("Registered user {} ({})", user_id, email);
        Ok(user_id)
    }

    // ========== 报告提交 ==========

    /// 提交放射科报告
    pub fn submit_report(&mut self, ctx: &UserContext, request: SubmitReport) -> Result<Uuid> {
        if !ctx.has_role(REPORTER_ROLE) {
            return Err(IfrError::Permission(
                "Submitting reports requires the reporter role".to_string(),
            ));
        }
        self.repository.get_session(request.session_id)?;

        if request.conclusion.is_pathological() && request.findings.trim().is_empty() {
            return Err(IfrError::Validation(
                "Findings are required when the conclusion indicates a pathology".to_string(),
            ));
        }

        // 报告依据的扫描必须属于该会话
        let session_scan_ids: Vec<Uuid> = self
            .repository
            .scans_for_session(request.session_id)
            .iter()
            .map(|s| s.id)
            .collect();
        for scan_id in &request.used_scan_ids {
            if !session_scan_ids.contains(scan_id) {
                return Err(IfrError::Validation(format!(
                    "Scan {} does not belong to session {}",
                    scan_id, request.session_id
                )));
            }
        }

        let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
        let report = Report::new(
            request.session_id,
            ctx.user_id,
            request.findings,
            request.conclusion,
            request.used_scan_ids,
            request.modality,
            date,
        );
        let report_id = self.repository.add_report(report);
        tracing::info!(
            "Report {} submitted for session {} by {}",
            report_id,
            request.session_id,
            ctx.user_id
        );
        Ok(report_id)
    }

    // ========== 修复与复查 ==========

    /// 提交管理员修复操作
    ///
    /// 目标状态限于修复目标集合；设置Present或FixRequired时必须
    /// 提供新的归档标识三元组，设置Present时还会在源归档上复查，
    /// 查不到则拒绝且不提交任何修改。
    pub async fn submit_repair(
        &mut self,
        ctx: &UserContext,
        session_id: i64,
        target: DataStatus,
        new_archive_id: Option<ArchiveId>,
        archive: &dyn ArchiveLookup,
    ) -> Result<DataStatus> {
        if !ctx.has_role(ADMIN_ROLE) {
            return Err(IfrError::Permission(
                "Repair actions require the administrator role".to_string(),
            ));
        }
        let current = self.repository.get_session(session_id)?.data_status;
        // 先验证目标在允许集合内
        let mut new_status = self
            .state_machine
            .transition(current, &StatusEvent::Repaired(target))?;

        if matches!(target, DataStatus::Present | DataStatus::FixRequired) {
            let archive_id = new_archive_id.ok_or_else(|| {
                IfrError::Validation(format!(
                    "A new archive identifier is required when setting status to {}",
                    target
                ))
            })?;
            if !archive_id.is_complete() {
                return Err(IfrError::Validation(format!(
                    "Incomplete archive identifier '{}'",
                    archive_id.label()
                )));
            }

            if target == DataStatus::Present {
                // 在提交任何修改之前确认标识可解析
                let info = archive.find_session(&archive_id).await?.ok_or_else(|| {
                    IfrError::Validation(format!(
                        "No session found on the source archive for '{}'",
                        archive_id.label()
                    ))
                })?;
                self.repository.get_session_mut(session_id)?.archive_id = archive_id;
                self.sync_archive_scans(session_id, &info);
                // 重新推导Present还是FoundNoClinical，而不是盲目接受
                new_status = self.derive_present_status(session_id);
            } else {
                self.repository.get_session_mut(session_id)?.archive_id = archive_id;
            }
        }

        self.set_session_status(session_id, new_status)?;
        tracing::info!(
            "Session {} repaired from {} to {}",
            session_id,
            current,
            new_status
        );
        Ok(new_status)
    }

    /// 归档坐标变化后的自动复查
    pub async fn recheck_session(
        &mut self,
        session_id: i64,
        archive: &dyn ArchiveLookup,
    ) -> Result<DataStatus> {
        let archive_id = self.repository.get_session(session_id)?.archive_id.clone();
        let found = archive.find_session(&archive_id).await?;

        let current = self.repository.get_session(session_id)?.data_status;
        let new_status = match found {
            Some(info) => {
                self.sync_archive_scans(session_id, &info);
                self.derive_present_status(session_id)
            }
            None => self
                .state_machine
                .transition(current, &StatusEvent::Rechecked { found: false })?,
        };
        self.set_session_status(session_id, new_status)?;
        tracing::info!("Session {} rechecked: {}", session_id, new_status);
        Ok(new_status)
    }

    /// 将无临床扫描的会话标记为不需要报告
    pub fn promote_not_required(&mut self, ctx: &UserContext, session_id: i64) -> Result<DataStatus> {
        if !ctx.has_role(ADMIN_ROLE) {
            return Err(IfrError::Permission(
                "Repair actions require the administrator role".to_string(),
            ));
        }
        let current = self.repository.get_session(session_id)?.data_status;
        let new_status = self
            .state_machine
            .transition(current, &StatusEvent::PromotedNotRequired)?;
        self.set_session_status(session_id, new_status)?;
        Ok(new_status)
    }

    /// 同步归档扫描列表：为新见到的序列建立Scan/ScanType行
    ///
    /// 全新的扫描类型用启发式分类作为clinical种子，confirmed保持false。
    pub fn sync_archive_scans(&mut self, session_id: i64, info: &ArchiveSessionInfo) {
        let existing: Vec<String> = self
            .repository
            .scans_for_session(session_id)
            .iter()
            .map(|s| s.sequence_id.clone())
            .collect();
        for entry in &info.scans {
            if existing.contains(&entry.sequence_id) {
                continue;
            }
            let clinical = self.classifier.is_likely_clinical(&entry.scan_type);
            let type_id = self
                .repository
                .get_or_create_scan_type(ScanType::new(&entry.scan_type, clinical));
            self.repository
                .add_scan(Scan::new(session_id, type_id, &entry.sequence_id));
        }
    }

    /// 会话数据在归档上存在时的状态推导
    fn derive_present_status(&self, session_id: i64) -> DataStatus {
        match eligibility::session_clinical_state(&self.repository, session_id) {
            ClinicalState::NoClinical => DataStatus::FoundNoClinical,
            _ => DataStatus::Present,
        }
    }

    /// 重新评估单个Present会话的临床扫描状态
    pub fn refresh_clinical_status(&mut self, session_id: i64) -> Result<DataStatus> {
        let current = self.repository.get_session(session_id)?.data_status;
        if current != DataStatus::Present {
            return Ok(current);
        }
        let derived = self.derive_present_status(session_id);
        if derived != current {
            self.set_session_status(session_id, derived)?;
            tracing::info!(
                "Session {} reclassified from {} to {}",
                session_id,
                current,
                derived
            );
        }
        Ok(derived)
    }

    fn set_session_status(&mut self, session_id: i64, status: DataStatus) -> Result<()> {
        let session = self.repository.get_session_mut(session_id)?;
        session.data_status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    // ========== 扫描类型确认 ==========

    /// 取一页待确认的扫描类型（字母序，页大小来自配置）
    pub fn unconfirmed_scan_types_page(&self, page: usize) -> ConfirmationPage {
        confirmation::unconfirmed_page(&self.repository, page, self.settings.confirm_page_size)
    }

    /// 提交一页确认结果，随后重新评估所有Present会话
    pub fn confirm_scan_types(
        &mut self,
        ctx: &UserContext,
        decisions: &[ScanTypeDecision],
    ) -> Result<usize> {
        if !ctx.has_role(ADMIN_ROLE) {
            return Err(IfrError::Permission(
                "Confirming scan types requires the administrator role".to_string(),
            ));
        }
        let updated = confirmation::apply_page(&mut self.repository, decisions)?;

        // 确认可能让某些会话变为"无临床扫描"
        let present_ids: Vec<i64> = self
            .repository
            .all_sessions()
            .filter(|s| s.data_status == DataStatus::Present)
            .map(|s| s.id)
            .collect();
        for session_id in present_ids {
            self.refresh_clinical_status(session_id)?;
        }
        Ok(updated)
    }

    // ========== 工作队列 ==========

    /// 待报告会话队列
    pub fn reporting_queue(&self) -> Vec<ImagingSession> {
        eligibility::sessions_requiring_report(&self.repository, self.settings.report_interval_days)
    }

    /// 可导出会话队列
    pub fn export_queue(&self) -> Vec<ImagingSession> {
        eligibility::sessions_ready_for_export(&self.repository, self.settings.report_interval_days)
    }

    /// 待修复会话队列
    pub fn repair_queue(&self) -> Vec<ImagingSession> {
        eligibility::sessions_needing_repair(&self.repository)
    }
}

impl Default for ReportingEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}
