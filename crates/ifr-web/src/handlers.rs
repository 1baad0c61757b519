//! HTTP处理器

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use ifr_archive::ArchiveSynchronizer;
use ifr_core::{
    ArchiveId, Conclusion, DataStatus, IfrError, ImagingSession, Modality, User, UserContext,
    REPORTER_ROLE,
};
use ifr_workflow::{ReportingEngine, ScanTypeDecision, SubmitReport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// API状态
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<RwLock<ReportingEngine>>,
    pub synchronizer: Arc<ArchiveSynchronizer>,
}

impl ApiState {
    pub fn new(engine: ReportingEngine, synchronizer: ArchiveSynchronizer) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            synchronizer: Arc::new(synchronizer),
        }
    }
}

/// 错误到HTTP状态码的映射
fn error_response(err: IfrError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        IfrError::Validation(_) | IfrError::InvalidStatusTransition { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        IfrError::NotFound(_) => StatusCode::NOT_FOUND,
        IfrError::Permission(_) => StatusCode::FORBIDDEN,
        IfrError::IntegrityConflict(_) => StatusCode::CONFLICT,
        IfrError::ArchiveConnectivity(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &err {
        // 唯一性冲突转换为面向用户的提示而非原始错误
        IfrError::IntegrityConflict(msg) => format!(
            "{}. Please try logging in or contact the administrator to reset.",
            msg
        ),
        other => other.to_string(),
    };
    (status, Json(json!({ "error": message })))
}

fn context(engine: &ReportingEngine, user_id: Uuid) -> Result<UserContext, IfrError> {
    engine.repository().user_context(user_id)
}

/// 会话在工作队列中的摘要表示
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub subject: String,
    pub archive_id: String,
    pub scan_date: chrono::NaiveDate,
    pub priority: &'static str,
    pub data_status: &'static str,
}

fn summarize(engine: &ReportingEngine, sessions: Vec<ImagingSession>) -> Vec<SessionSummary> {
    sessions
        .into_iter()
        .map(|s| {
            let subject = engine
                .repository()
                .get_subject(s.subject_id)
                .map(|subj| subj.mbi_id.clone())
                .unwrap_or_default();
            SessionSummary {
                id: s.id,
                subject,
                archive_id: s.archive_id.label(),
                scan_date: s.scan_date,
                priority: s.priority.label(),
                data_status: s.data_status.label(),
            }
        })
        .collect()
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "IFR Reporting API",
        "version": "0.1.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "0.1.0"
    }))
}

/// 待报告队列
pub async fn get_reporting_queue(State(state): State<ApiState>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    let sessions = engine.reporting_queue();
    Json(json!({
        "total": sessions.len(),
        "sessions": summarize(&engine, sessions)
    }))
}

/// 可导出队列
pub async fn get_export_queue(State(state): State<ApiState>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    let sessions = engine.export_queue();
    Json(json!({
        "total": sessions.len(),
        "sessions": summarize(&engine, sessions)
    }))
}

/// 待修复队列
pub async fn get_repair_queue(State(state): State<ApiState>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    let sessions = engine.repair_queue();
    Json(json!({
        "total": sessions.len(),
        "sessions": summarize(&engine, sessions)
    }))
}

/// 报告提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub user_id: Uuid,
    pub session_id: i64,
    pub findings: String,
    pub conclusion: Conclusion,
    #[serde(default)]
    pub used_scan_ids: Vec<Uuid>,
    pub modality: Modality,
}

/// 提交报告处理器
pub async fn post_report(
    State(state): State<ApiState>,
    Json(request): Json<SubmitReportRequest>,
) -> impl IntoResponse {
    info!(
        "Report submission for session {} by {}",
        request.session_id, request.user_id
    );
    let mut engine = state.engine.write().await;
    let ctx = match context(&engine, request.user_id) {
        Ok(ctx) => ctx,
        Err(err) => return error_response(err).into_response(),
    };
    let result = engine.submit_report(
        &ctx,
        SubmitReport {
            session_id: request.session_id,
            findings: request.findings,
            conclusion: request.conclusion,
            used_scan_ids: request.used_scan_ids,
            modality: request.modality,
            date: None,
        },
    );
    match result {
        Ok(report_id) => (
            StatusCode::CREATED,
            Json(json!({ "report_id": report_id })),
        )
            .into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// 修复提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitRepairRequest {
    pub user_id: Uuid,
    pub session_id: i64,
    pub new_status: DataStatus,
    /// 规范标签 PROJ_SUBJ_VISIT，目标为Present/FixRequired时必填
    pub new_archive_id: Option<String>,
}

/// 提交修复处理器
pub async fn post_repair(
    State(state): State<ApiState>,
    Json(request): Json<SubmitRepairRequest>,
) -> impl IntoResponse {
    info!(
        "Repair of session {} to {:?} by {}",
        request.session_id, request.new_status, request.user_id
    );
    let archive_id = match &request.new_archive_id {
        Some(label) => match ArchiveId::parse(label) {
            Some(id) => Some(id),
            None => {
                return error_response(IfrError::Validation(format!(
                    "Incomplete archive identifier '{}'",
                    label
                )))
                .into_response()
            }
        },
        None => None,
    };

    let mut engine = state.engine.write().await;
    let ctx = match context(&engine, request.user_id) {
        Ok(ctx) => ctx,
        Err(err) => return error_response(err).into_response(),
    };
    match engine
        .submit_repair(
            &ctx,
            request.session_id,
            request.new_status,
            archive_id,
            state.synchronizer.as_ref(),
        )
        .await
    {
        Ok(status) => Json(json!({
            "session_id": request.session_id,
            "data_status": status.label()
        }))
        .into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPageParams {
    #[serde(default)]
    pub page: usize,
}

/// 取一页待确认扫描类型
pub async fn get_confirm_page(
    State(state): State<ApiState>,
    Query(params): Query<ConfirmPageParams>,
) -> impl IntoResponse {
    let engine = state.engine.read().await;
    Json(engine.unconfirmed_scan_types_page(params.page))
}

/// 扫描类型确认请求
#[derive(Debug, Deserialize)]
pub struct ConfirmScanTypesRequest {
    pub user_id: Uuid,
    pub decisions: Vec<ScanTypeDecision>,
}

/// 提交扫描类型确认处理器
pub async fn post_confirm_scan_types(
    State(state): State<ApiState>,
    Json(request): Json<ConfirmScanTypesRequest>,
) -> impl IntoResponse {
    let mut engine = state.engine.write().await;
    let ctx = match context(&engine, request.user_id) {
        Ok(ctx) => ctx,
        Err(err) => return error_response(err).into_response(),
    };
    match engine.confirm_scan_types(&ctx, &request.decisions) {
        Ok(updated) => Json(json!({ "confirmed": updated })).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// 同步触发请求
#[derive(Debug, Deserialize)]
pub struct TriggerSyncRequest {
    pub user_id: Uuid,
}

/// 触发导出同步运行处理器
pub async fn post_trigger_sync(
    State(state): State<ApiState>,
    Json(request): Json<TriggerSyncRequest>,
) -> impl IntoResponse {
    let mut engine = state.engine.write().await;
    let ctx = match context(&engine, request.user_id) {
        Ok(ctx) => ctx,
        Err(err) => return error_response(err).into_response(),
    };
    if !ctx.has_role(ifr_core::ADMIN_ROLE) {
        return error_response(IfrError::Permission(
            "Triggering a sync run requires the administrator role".to_string(),
        ))
        .into_response();
    }

    match state.synchronizer.run_export(&mut engine).await {
        Ok(report) => Json(json!({
            "exported_sessions": report.exported_sessions,
            "uploaded_scans": report.uploaded_scans,
            "failed_sessions": report.failed_sessions,
        }))
        .into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// 用户注册请求
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role_ids: Vec<i32>,
}

/// 用户注册处理器
pub async fn post_register(
    State(state): State<ApiState>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    let role_ids = if request.role_ids.is_empty() {
        vec![REPORTER_ROLE]
    } else {
        request.role_ids
    };
    let user = User::new(
        request.first_name,
        request.last_name,
        request.email,
        request.password_hash,
        role_ids,
    );

    let mut engine = state.engine.write().await;
    match engine.register_user(user) {
        Ok(user_id) => (
            StatusCode::CREATED,
            Json(json!({
                "user_id": user_id,
                "message": "Registration successful, please wait to be activated"
            })),
        )
            .into_response(),
        Err(err) => error_response(err).into_response(),
    }
}
