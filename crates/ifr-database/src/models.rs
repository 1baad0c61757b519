//! 数据库行模型

use chrono::{DateTime, NaiveDate, Utc};
use ifr_core::{
    ArchiveId, Conclusion, ContactDetails, DataStatus, Gender, ImagingSession, Modality,
    Priority, Project, Report, Scan, ScanType, Subject, User,
};
use sqlx::FromRow;
use uuid::Uuid;

// 枚举在数据库中以短文本列存储，转换集中在这里

pub fn data_status_to_str(status: DataStatus) -> &'static str {
    match status {
        DataStatus::Unknown => "UNKNOWN",
        DataStatus::Present => "PRESENT",
        DataStatus::NotFound => "NOT_FOUND",
        DataStatus::NotScanned => "NOT_SCANNED",
        DataStatus::InvalidLabel => "INVALID_LABEL",
        DataStatus::NotChecked => "NOT_CHECKED",
        DataStatus::ArchivedElsewhere => "ARCHIVED_ELSEWHERE",
        DataStatus::Excluded => "EXCLUDED",
        DataStatus::FixRequired => "FIX_REQUIRED",
        DataStatus::FoundNoClinical => "FOUND_NO_CLINICAL",
        DataStatus::NotRequired => "NOT_REQUIRED",
    }
}

pub fn data_status_from_str(value: &str) -> DataStatus {
    match value {
        "PRESENT" => DataStatus::Present,
        "NOT_FOUND" => DataStatus::NotFound,
        "NOT_SCANNED" => DataStatus::NotScanned,
        "INVALID_LABEL" => DataStatus::InvalidLabel,
        "NOT_CHECKED" => DataStatus::NotChecked,
        "ARCHIVED_ELSEWHERE" => DataStatus::ArchivedElsewhere,
        "EXCLUDED" => DataStatus::Excluded,
        "FIX_REQUIRED" => DataStatus::FixRequired,
        "FOUND_NO_CLINICAL" => DataStatus::FoundNoClinical,
        "NOT_REQUIRED" => DataStatus::NotRequired,
        _ => DataStatus::Unknown,
    }
}

pub fn priority_to_i32(priority: Priority) -> i32 {
    match priority {
        Priority::Low => 1,
        Priority::Medium => 2,
        Priority::High => 3,
    }
}

pub fn priority_from_i32(value: i32) -> Priority {
    match value {
        3 => Priority::High,
        2 => Priority::Medium,
        _ => Priority::Low,
    }
}

pub fn conclusion_to_i32(conclusion: Conclusion) -> i32 {
    match conclusion {
        Conclusion::NotRecorded => -1,
        Conclusion::NoPathology => 0,
        Conclusion::NonUrgent => 1,
        Conclusion::Critical => 2,
    }
}

pub fn conclusion_from_i32(value: i32) -> Conclusion {
    match value {
        0 => Conclusion::NoPathology,
        1 => Conclusion::NonUrgent,
        2 => Conclusion::Critical,
        _ => Conclusion::NotRecorded,
    }
}

pub fn modality_to_str(modality: Modality) -> &'static str {
    match modality {
        Modality::Mri => "MRI",
        Modality::Pet => "PET",
    }
}

pub fn modality_from_str(value: &str) -> Modality {
    match value {
        "PET" => Modality::Pet,
        _ => Modality::Mri,
    }
}

pub fn gender_from_str(value: &str) -> Option<Gender> {
    match value {
        "F" => Some(Gender::Female),
        "M" => Some(Gender::Male),
        "O" => Some(Gender::Other),
        _ => None,
    }
}

pub fn gender_to_str(gender: Gender) -> &'static str {
    match gender {
        Gender::Female => "F",
        Gender::Male => "M",
        Gender::Other => "O",
    }
}

/// 数据库项目表
#[derive(Debug, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub code: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbProject> for Project {
    fn from(row: DbProject) -> Self {
        Project {
            id: row.id,
            code: row.code,
            title: row.title,
            created_at: row.created_at,
        }
    }
}

/// 数据库受试者表
#[derive(Debug, FromRow)]
pub struct DbSubject {
    pub id: Uuid,
    pub mbi_id: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub gender: Option<String>,
    pub dob: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<DbSubject> for Subject {
    fn from(row: DbSubject) -> Self {
        Subject {
            id: row.id,
            mbi_id: row.mbi_id,
            first_name: row.first_name,
            last_name: row.last_name,
            middle_name: row.middle_name,
            gender: row.gender.as_deref().and_then(gender_from_str),
            dob: row.dob,
            created_at: row.created_at,
        }
    }
}

/// 数据库联系方式表
#[derive(Debug, FromRow)]
pub struct DbContactDetails {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub acquired_on: NaiveDate,
    pub street: String,
    pub suburb: String,
    pub postcode: String,
    pub country: Option<String>,
    pub mobile_phone: Option<String>,
    pub work_phone: Option<String>,
}

impl From<DbContactDetails> for ContactDetails {
    fn from(row: DbContactDetails) -> Self {
        ContactDetails {
            id: row.id,
            subject_id: row.subject_id,
            date: row.acquired_on,
            street: row.street,
            suburb: row.suburb,
            postcode: row.postcode,
            country: row.country,
            mobile_phone: row.mobile_phone,
            work_phone: row.work_phone,
        }
    }
}

/// 数据库会话表
#[derive(Debug, FromRow)]
pub struct DbSession {
    pub id: i64,
    pub project_id: Uuid,
    pub subject_id: Uuid,
    pub archive_project: String,
    pub archive_subject: String,
    pub archive_visit: String,
    pub daris_code: Option<String>,
    pub scan_date: NaiveDate,
    pub priority: i32,
    pub data_status: String,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbSession> for ImagingSession {
    fn from(row: DbSession) -> Self {
        ImagingSession {
            id: row.id,
            project_id: row.project_id,
            subject_id: row.subject_id,
            archive_id: ArchiveId::new(row.archive_project, row.archive_subject, row.archive_visit),
            daris_code: row.daris_code,
            scan_date: row.scan_date,
            priority: priority_from_i32(row.priority),
            data_status: data_status_from_str(&row.data_status),
            height: row.height,
            weight: row.weight,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 数据库扫描表
#[derive(Debug, FromRow)]
pub struct DbScan {
    pub id: Uuid,
    pub session_id: i64,
    pub type_id: Uuid,
    pub sequence_id: String,
    pub exported: bool,
}

impl From<DbScan> for Scan {
    fn from(row: DbScan) -> Self {
        Scan {
            id: row.id,
            session_id: row.session_id,
            type_id: row.type_id,
            sequence_id: row.sequence_id,
            exported: row.exported,
        }
    }
}

/// 数据库扫描类型表
#[derive(Debug, FromRow)]
pub struct DbScanType {
    pub id: Uuid,
    pub name: String,
    pub clinical: bool,
    pub confirmed: bool,
}

impl From<DbScanType> for ScanType {
    fn from(row: DbScanType) -> Self {
        ScanType {
            id: row.id,
            name: row.name,
            clinical: row.clinical,
            confirmed: row.confirmed,
        }
    }
}

/// 数据库报告表（关联的扫描在report_scan_assoc中）
#[derive(Debug, FromRow)]
pub struct DbReport {
    pub id: Uuid,
    pub session_id: i64,
    pub reporter_id: Uuid,
    pub report_date: NaiveDate,
    pub findings: String,
    pub conclusion: i32,
    pub modality: String,
    pub exported: bool,
    pub dummy: bool,
}

impl DbReport {
    pub fn into_report(self, used_scan_ids: Vec<Uuid>) -> Report {
        Report {
            id: self.id,
            session_id: self.session_id,
            reporter_id: self.reporter_id,
            date: self.report_date,
            findings: self.findings,
            conclusion: conclusion_from_i32(self.conclusion),
            used_scan_ids,
            modality: modality_from_str(&self.modality),
            exported: self.exported,
            dummy: self.dummy,
        }
    }
}

/// 数据库用户表（角色在user_role_assoc中）
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub suffixes: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub signature: Option<String>,
}

impl DbUser {
    pub fn into_user(self, role_ids: Vec<i32>) -> User {
        User {
            id: self.id,
            title: self.title,
            first_name: self.first_name,
            last_name: self.last_name,
            middle_name: self.middle_name,
            suffixes: self.suffixes,
            email: self.email,
            password_hash: self.password_hash,
            active: self.active,
            signature: self.signature,
            role_ids,
        }
    }
}
