//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 管理员角色ID
pub const ADMIN_ROLE: i32 = 1;
/// 报告医生角色ID
pub const REPORTER_ROLE: i32 = 2;

/// 有效的项目代码前缀
pub const VALID_PROJECT_PREFIXES: [&str; 3] = ["MRH", "MMH", "CLF"];

/// 影像项目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub code: String,          // 外部归档项目代码 (如 MRH017)
    pub title: Option<String>, // 项目显示名称
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            title: None,
            created_at: Utc::now(),
        }
    }

    /// MMH项目同时采集PET，访视标签使用MRPT前缀
    pub fn is_pet_capable(&self) -> bool {
        self.code.starts_with("MMH")
    }
}

/// 性别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// 受试者基本信息
///
/// 与影像会话分离存储，便于按受试者聚合查询（同一受试者一年内
/// 多次扫描只报告最近一次）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub mbi_id: String, // 外部受试者代码，唯一
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub gender: Option<Gender>,
    pub dob: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Subject {
    pub fn new(
        mbi_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        dob: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mbi_id: mbi_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            middle_name: None,
            gender: None,
            dob,
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// 受试者联系方式（按获取日期保留历史）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDetails {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub date: NaiveDate, // 获取联系方式的日期
    pub street: String,
    pub suburb: String,
    pub postcode: String,
    pub country: Option<String>,
    pub mobile_phone: Option<String>,
    pub work_phone: Option<String>,
}

/// 会话优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// 工作队列中的显示名称
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "High",
            Priority::High => "Urgent",
        }
    }
}

/// 会话数据状态（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataStatus {
    Unknown,           // 未知状态
    Present,           // 在源归档上找到匹配会话
    NotFound,          // 源归档上无匹配会话
    NotScanned,        // 会话被取消/中断，从未扫描
    InvalidLabel,      // 受试者/访视标签无效，需要修正
    NotChecked,        // 旧系统中已有报告，导入时未检查
    ArchivedElsewhere, // 存储于无法访问的旧归档
    Excluded,          // 管理决定排除
    FixRequired,       // 归档侧会话需要重命名修复
    FoundNoClinical,   // 会话中没有临床相关扫描
    NotRequired,       // 不需要报告
}

impl DataStatus {
    /// 状态短标签
    pub fn label(&self) -> &'static str {
        match self {
            DataStatus::Unknown => "Unknown",
            DataStatus::Present => "Present",
            DataStatus::NotFound => "Not found in archive",
            DataStatus::NotScanned => "Cancelled/interrupted",
            DataStatus::InvalidLabel => "Invalid ID(s)",
            DataStatus::NotChecked => "Not checked",
            DataStatus::ArchivedElsewhere => "Legacy archive",
            DataStatus::Excluded => "Excluded",
            DataStatus::FixRequired => "Fix in archive",
            DataStatus::FoundNoClinical => "Found no clinical",
            DataStatus::NotRequired => "Not required",
        }
    }

    /// 状态说明文本
    pub fn description(&self) -> &'static str {
        match self {
            DataStatus::Unknown => "Unknown data status (run the data status check)",
            DataStatus::Present => "Updated to match valid archive session",
            DataStatus::NotFound => "Found no matching session on the source archive",
            DataStatus::NotScanned => "Cancelled/interrupted/not-uploaded session",
            DataStatus::InvalidLabel => "Invalid ID(s) imported from the legacy feed",
            DataStatus::NotChecked => "Already reported so not checked",
            DataStatus::ArchivedElsewhere => "Stored on an inaccessible legacy archive",
            DataStatus::Excluded => "Executive decision to exclude",
            DataStatus::FixRequired => "Archive session needs to be renamed to match this",
            DataStatus::FoundNoClinical => {
                "No clinically relevant scans found in the archive session"
            }
            DataStatus::NotRequired => {
                "Report is not required (no clinically relevant scans in project protocol)"
            }
        }
    }
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 归档会话标识三元组
///
/// 规范标签形如 `MRH017_100_MR01`（项目_受试者_访视），全大写。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveId {
    pub project: String,
    pub subject: String,
    pub visit: String,
}

impl ArchiveId {
    pub fn new(
        project: impl Into<String>,
        subject: impl Into<String>,
        visit: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            subject: subject.into(),
            visit: visit.into(),
        }
    }

    /// 三段是否都非空（可解析为归档会话标签）
    pub fn is_complete(&self) -> bool {
        !self.project.is_empty() && !self.subject.is_empty() && !self.visit.is_empty()
    }

    /// 规范归档会话标签
    pub fn label(&self) -> String {
        format!("{}_{}_{}", self.project, self.subject, self.visit).to_uppercase()
    }

    /// 从 `PROJ_SUBJ_VISIT` 标签解析
    pub fn parse(label: &str) -> Option<Self> {
        let mut parts = label.splitn(3, '_');
        let project = parts.next()?.to_string();
        let subject = parts.next()?.to_string();
        let visit = parts.next()?.to_string();
        let id = Self {
            project,
            subject,
            visit,
        };
        id.is_complete().then_some(id)
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// 影像会话
///
/// 主键为旧系统的研究编号。会话不会被物理删除，被取代的会话由
/// 资格查询抑制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingSession {
    pub id: i64, // 外部研究编号，主键
    pub project_id: Uuid,
    pub subject_id: Uuid,
    pub archive_id: ArchiveId,
    pub daris_code: Option<String>, // 旧归档层级代码
    pub scan_date: NaiveDate,
    pub priority: Priority,
    pub data_status: DataStatus,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImagingSession {
    pub fn new(
        id: i64,
        project_id: Uuid,
        subject_id: Uuid,
        archive_id: ArchiveId,
        scan_date: NaiveDate,
        data_status: DataStatus,
        priority: Priority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            subject_id,
            archive_id,
            daris_code: None,
            scan_date,
            priority,
            data_status,
            height: None,
            weight: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 会话中的一次扫描序列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub session_id: i64,
    pub type_id: Uuid,
    pub sequence_id: String, // 归档侧扫描序号
    pub exported: bool,      // 仅在成功传输到目标归档后置位
}

impl Scan {
    pub fn new(session_id: i64, type_id: Uuid, sequence_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            type_id,
            sequence_id: sequence_id.into(),
            exported: false,
        }
    }
}

/// 扫描序列类型目录项
///
/// 按序列名全局共享，clinical/confirmed 的修改影响引用该类型的
/// 所有扫描。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanType {
    pub id: Uuid,
    pub name: String,    // 序列协议名，唯一
    pub clinical: bool,  // 该序列类型是否临床相关
    pub confirmed: bool, // 是否经过人工确认
}

impl ScanType {
    pub fn new(name: impl Into<String>, clinical: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            clinical,
            confirmed: false,
        }
    }
}

/// 检查设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    Mri,
    Pet,
}

impl Modality {
    pub fn label(&self) -> &'static str {
        match self {
            Modality::Mri => "MRI",
            Modality::Pet => "PET",
        }
    }
}

/// 报告结论等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conclusion {
    NotRecorded, // 旧系统回填的占位报告，无结论记录
    NoPathology,
    NonUrgent,
    Critical,
}

impl Conclusion {
    /// 是否为病理结论（要求报告正文非空）
    pub fn is_pathological(&self) -> bool {
        matches!(self, Conclusion::NonUrgent | Conclusion::Critical)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Conclusion::NotRecorded => "Not recorded",
            Conclusion::NoPathology => "No pathology",
            Conclusion::NonUrgent => "Non-urgent pathology",
            Conclusion::Critical => "Critical pathology",
        }
    }

    /// 报告中的标准结论语句
    pub fn description(&self) -> &'static str {
        match self {
            Conclusion::NotRecorded => "Conclusion was not recorded in the legacy system",
            Conclusion::NoPathology => {
                "No gross pathology that would require clinical follow up has been identified"
            }
            Conclusion::NonUrgent => {
                "Pathology that requires non-urgent clinical follow up has been identified"
            }
            Conclusion::Critical => {
                "Pathology that requires urgent clinical follow up has been identified. \
                 The individual should be referred for follow up immediately."
            }
        }
    }
}

/// 放射科医生提交的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub session_id: i64,
    pub reporter_id: Uuid,
    pub date: NaiveDate,
    pub findings: String,
    pub conclusion: Conclusion,
    pub used_scan_ids: Vec<Uuid>, // 报告依据的扫描，显式关联集合
    pub modality: Modality,
    pub exported: bool,
    pub dummy: bool, // 由旧系统导入回填，无完整内容
}

impl Report {
    pub fn new(
        session_id: i64,
        reporter_id: Uuid,
        findings: impl Into<String>,
        conclusion: Conclusion,
        used_scan_ids: Vec<Uuid>,
        modality: Modality,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            reporter_id,
            date,
            findings: findings.into(),
            conclusion,
            used_scan_ids,
            modality,
            exported: false,
            dummy: false,
        }
    }
}

/// 系统用户（报告医生/管理员）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub suffixes: Option<String>,
    pub email: String, // 唯一
    pub password_hash: String,
    pub active: bool,
    pub signature: Option<String>, // 签名图片文件名（由外部上传层管理）
    pub role_ids: Vec<i32>,        // 显式角色关联集合
}

impl User {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role_ids: Vec<i32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            middle_name: None,
            suffixes: None,
            email: email.into(),
            password_hash: password_hash.into(),
            active: false,
            signature: None,
            role_ids,
        }
    }

    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_role(&self, role_id: i32) -> bool {
        self.role_ids.contains(&role_id)
    }
}

/// 用户角色
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i32,
    pub name: String,
}

/// 显式请求上下文
///
/// 每个核心操作都显式接收调用者身份，不依赖任何环境全局状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub role_ids: Vec<i32>,
}

impl UserContext {
    pub fn new(user_id: Uuid, role_ids: Vec<i32>) -> Self {
        Self { user_id, role_ids }
    }

    pub fn has_role(&self, role_id: i32) -> bool {
        self.role_ids.contains(&role_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_id_label() {
        let id = ArchiveId::new("mrh017", "100", "mr01");
        assert_eq!(id.label(), "MRH017_100_MR01");
        assert!(id.is_complete());
    }

    #[test]
    fn test_archive_id_parse() {
        let id = ArchiveId::parse("MRH017_100_MR01").unwrap();
        assert_eq!(id.project, "MRH017");
        assert_eq!(id.subject, "100");
        assert_eq!(id.visit, "MR01");

        assert!(ArchiveId::parse("MRH017_100").is_none());
        assert!(ArchiveId::parse("MRH017__MR01").is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(Priority::High.label(), "Urgent");
    }

    #[test]
    fn test_pathological_conclusions() {
        assert!(!Conclusion::NoPathology.is_pathological());
        assert!(!Conclusion::NotRecorded.is_pathological());
        assert!(Conclusion::NonUrgent.is_pathological());
        assert!(Conclusion::Critical.is_pathological());
    }
}
