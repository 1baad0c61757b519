//! 扫描类型确认流程
//!
//! 未确认的扫描类型按名称字母序分页呈现给审阅者；提交一页即
//! 确认该页所有类型，clinical按勾选结果设置。已确认的类型不会
//! 被隐式重新打开。

use crate::repository::ReportingRepository;
use ifr_core::{Result, ScanType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一页待确认的扫描类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationPage {
    pub page: usize,
    pub total_pages: usize,
    pub total_unconfirmed: usize,
    pub types: Vec<ScanType>,
}

/// 审阅者对单个扫描类型的判定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTypeDecision {
    pub type_id: Uuid,
    pub clinical: bool,
}

/// 取指定页的未确认扫描类型
pub fn unconfirmed_page(
    repo: &ReportingRepository,
    page: usize,
    page_size: usize,
) -> ConfirmationPage {
    let all = repo.unconfirmed_scan_types();
    let total_unconfirmed = all.len();
    let total_pages = total_unconfirmed.div_ceil(page_size);
    let start = (page * page_size).min(total_unconfirmed);
    let end = (start + page_size).min(total_unconfirmed);
    ConfirmationPage {
        page,
        total_pages,
        total_unconfirmed,
        types: all[start..end].iter().map(|t| (*t).clone()).collect(),
    }
}

/// 提交一页判定，整批集合式更新
pub fn apply_page(repo: &mut ReportingRepository, decisions: &[ScanTypeDecision]) -> Result<usize> {
    let updates: Vec<(Uuid, bool)> = decisions.iter().map(|d| (d.type_id, d.clinical)).collect();
    repo.bulk_confirm_scan_types(&updates)
}
