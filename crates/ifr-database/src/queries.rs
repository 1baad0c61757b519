//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use ifr_core::{
    IfrError, ImagingSession, Project, Report, Result, Scan, ScanType, Subject, User,
};
use ifr_workflow::ReportingRepository;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id UUID PRIMARY KEY,
                code VARCHAR(16) UNIQUE NOT NULL,
                title VARCHAR(128),
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id UUID PRIMARY KEY,
                mbi_id VARCHAR(16) UNIQUE NOT NULL,
                first_name VARCHAR(128) NOT NULL,
                last_name VARCHAR(128) NOT NULL,
                middle_name VARCHAR(128),
                gender CHAR(1),
                dob DATE NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS contact_details (
                id UUID PRIMARY KEY,
                subject_id UUID NOT NULL REFERENCES subjects(id),
                acquired_on DATE NOT NULL,
                street VARCHAR(128) NOT NULL,
                suburb VARCHAR(128) NOT NULL,
                postcode VARCHAR(16) NOT NULL,
                country VARCHAR(64),
                mobile_phone VARCHAR(32),
                work_phone VARCHAR(32)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGINT PRIMARY KEY,
                project_id UUID NOT NULL REFERENCES projects(id),
                subject_id UUID NOT NULL REFERENCES subjects(id),
                archive_project VARCHAR(32) NOT NULL,
                archive_subject VARCHAR(32) NOT NULL,
                archive_visit VARCHAR(32) NOT NULL,
                daris_code VARCHAR(64),
                scan_date DATE NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1,
                data_status VARCHAR(24) NOT NULL DEFAULT 'UNKNOWN',
                height DOUBLE PRECISION,
                weight DOUBLE PRECISION,
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS scan_types (
                id UUID PRIMARY KEY,
                name VARCHAR(192) UNIQUE NOT NULL,
                clinical BOOLEAN NOT NULL DEFAULT FALSE,
                confirmed BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS scans (
                id UUID PRIMARY KEY,
                session_id BIGINT NOT NULL REFERENCES sessions(id),
                type_id UUID NOT NULL REFERENCES scan_types(id),
                sequence_id VARCHAR(32) NOT NULL,
                exported BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                title VARCHAR(16),
                first_name VARCHAR(64) NOT NULL,
                last_name VARCHAR(64) NOT NULL,
                middle_name VARCHAR(64),
                suffixes VARCHAR(32),
                email VARCHAR(128) UNIQUE NOT NULL,
                password_hash VARCHAR(128) NOT NULL,
                active BOOLEAN NOT NULL DEFAULT FALSE,
                signature VARCHAR(256)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY,
                name VARCHAR(32) UNIQUE NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_role_assoc (
                user_id UUID NOT NULL REFERENCES users(id),
                role_id INTEGER NOT NULL REFERENCES roles(id),
                PRIMARY KEY (user_id, role_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id UUID PRIMARY KEY,
                session_id BIGINT NOT NULL REFERENCES sessions(id),
                reporter_id UUID NOT NULL REFERENCES users(id),
                report_date DATE NOT NULL,
                findings TEXT NOT NULL DEFAULT '',
                conclusion INTEGER NOT NULL,
                modality VARCHAR(8) NOT NULL,
                exported BOOLEAN NOT NULL DEFAULT FALSE,
                dummy BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS report_scan_assoc (
                report_id UUID NOT NULL REFERENCES reports(id),
                scan_id UUID NOT NULL REFERENCES scans(id),
                PRIMARY KEY (report_id, scan_id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| IfrError::Database(e.to_string()))?;
        }

        // 预置固定角色
        sqlx::query(
            r#"
            INSERT INTO roles (id, name)
            VALUES (1, 'Administrator'), (2, 'Reporter')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_subjects_mbi_id ON subjects(mbi_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_subject_id ON sessions(subject_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_project_id ON sessions(project_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_data_status ON sessions(data_status)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_scan_date ON sessions(scan_date)",
            "CREATE INDEX IF NOT EXISTS idx_scans_session_id ON scans(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_scans_type_id ON scans(type_id)",
            "CREATE INDEX IF NOT EXISTS idx_scan_types_name ON scan_types(name)",
            "CREATE INDEX IF NOT EXISTS idx_reports_session_id ON reports(session_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| IfrError::Database(e.to_string()))?;
        }

        Ok(())
    }

    // ========== 写入操作 ==========

    pub async fn upsert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, code, title, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(project.id)
        .bind(&project.code)
        .bind(&project.title)
        .bind(project.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subjects
                (id, mbi_id, first_name, last_name, middle_name, gender, dob, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (mbi_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                dob = EXCLUDED.dob
            "#,
        )
        .bind(subject.id)
        .bind(&subject.mbi_id)
        .bind(&subject.first_name)
        .bind(&subject.last_name)
        .bind(&subject.middle_name)
        .bind(subject.gender.map(gender_to_str))
        .bind(subject.dob)
        .bind(subject.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_contact_details(&self, details: &ifr_core::ContactDetails) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contact_details
                (id, subject_id, acquired_on, street, suburb, postcode, country,
                 mobile_phone, work_phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(details.id)
        .bind(details.subject_id)
        .bind(details.date)
        .bind(&details.street)
        .bind(&details.suburb)
        .bind(&details.postcode)
        .bind(&details.country)
        .bind(&details.mobile_phone)
        .bind(&details.work_phone)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_session(&self, session: &ImagingSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, project_id, subject_id, archive_project, archive_subject, archive_visit,
                 daris_code, scan_date, priority, data_status, height, weight, notes,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(session.id)
        .bind(session.project_id)
        .bind(session.subject_id)
        .bind(&session.archive_id.project)
        .bind(&session.archive_id.subject)
        .bind(&session.archive_id.visit)
        .bind(&session.daris_code)
        .bind(session.scan_date)
        .bind(priority_to_i32(session.priority))
        .bind(data_status_to_str(session.data_status))
        .bind(session.height)
        .bind(session.weight)
        .bind(&session.notes)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    /// 更新会话状态与归档坐标
    pub async fn update_session_status(&self, session: &ImagingSession) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions SET
                archive_project = $2,
                archive_subject = $3,
                archive_visit = $4,
                data_status = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(&session.archive_id.project)
        .bind(&session.archive_id.subject)
        .bind(&session.archive_id.visit)
        .bind(data_status_to_str(session.data_status))
        .bind(session.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_scan(&self, scan: &Scan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scans (id, session_id, type_id, sequence_id, exported)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(scan.id)
        .bind(scan.session_id)
        .bind(scan.type_id)
        .bind(&scan.sequence_id)
        .bind(scan.exported)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn mark_scan_exported(&self, scan_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE scans SET exported = TRUE WHERE id = $1")
            .bind(scan_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn upsert_scan_type(&self, scan_type: &ScanType) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_types (id, name, clinical, confirmed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(scan_type.id)
        .bind(&scan_type.name)
        .bind(scan_type.clinical)
        .bind(scan_type.confirmed)
        .execute(self.pool.pool())
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    /// 集合式批量确认扫描类型
    ///
    /// 同一事务内两条set-based UPDATE，避免逐行更新共享行。
    pub async fn bulk_confirm_scan_types(&self, decisions: &[(Uuid, bool)]) -> Result<u64> {
        let clinical_ids: Vec<Uuid> = decisions
            .iter()
            .filter(|(_, clinical)| *clinical)
            .map(|(id, _)| *id)
            .collect();
        let non_clinical_ids: Vec<Uuid> = decisions
            .iter()
            .filter(|(_, clinical)| !*clinical)
            .map(|(id, _)| *id)
            .collect();

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;

        let mut updated = 0;
        updated += sqlx::query(
            "UPDATE scan_types SET clinical = TRUE, confirmed = TRUE WHERE id = ANY($1)",
        )
        .bind(&clinical_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?
        .rows_affected();

        updated += sqlx::query(
            "UPDATE scan_types SET clinical = FALSE, confirmed = TRUE WHERE id = ANY($1)",
        )
        .bind(&non_clinical_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(updated)
    }

    pub async fn insert_report(&self, report: &Report) -> Result<()> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO reports
                (id, session_id, reporter_id, report_date, findings, conclusion,
                 modality, exported, dummy)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(report.id)
        .bind(report.session_id)
        .bind(report.reporter_id)
        .bind(report.date)
        .bind(&report.findings)
        .bind(conclusion_to_i32(report.conclusion))
        .bind(modality_to_str(report.modality))
        .bind(report.exported)
        .bind(report.dummy)
        .execute(&mut *tx)
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;

        for scan_id in &report.used_scan_ids {
            sqlx::query("INSERT INTO report_scan_assoc (report_id, scan_id) VALUES ($1, $2)")
                .bind(report.id)
                .bind(scan_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| IfrError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users
                (id, title, first_name, last_name, middle_name, suffixes, email,
                 password_hash, active, signature)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.title)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.middle_name)
        .bind(&user.suffixes)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(&user.signature)
        .execute(&mut *tx)
        .await
        .map_err(|e| IfrError::Database(e.to_string()))?;

        if inserted.rows_affected() == 0 {
            return Err(IfrError::IntegrityConflict(format!(
                "The email address '{}' has already been registered",
                user.email
            )));
        }

        for role_id in &user.role_ids {
            sqlx::query("INSERT INTO user_role_assoc (user_id, role_id) VALUES ($1, $2)")
                .bind(user.id)
                .bind(role_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| IfrError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(())
    }

    // ========== 读取操作 ==========

    /// 把全部实体水合为内存仓库
    ///
    /// 资格查询与引擎操作都在仓库的物化集合上进行，数据库只负责
    /// 持久化。
    pub async fn load_repository(&self) -> Result<ReportingRepository> {
        let pool = self.pool.pool();
        let mut repo = ReportingRepository::new();

        let users = sqlx::query_as::<_, DbUser>("SELECT * FROM users")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        let role_rows = sqlx::query("SELECT user_id, role_id FROM user_role_assoc")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        let mut roles_by_user: HashMap<Uuid, Vec<i32>> = HashMap::new();
        for row in role_rows {
            roles_by_user
                .entry(row.get("user_id"))
                .or_default()
                .push(row.get("role_id"));
        }
        for db_user in users {
            let role_ids = roles_by_user.remove(&db_user.id).unwrap_or_default();
            repo.add_user(db_user.into_user(role_ids))?;
        }

        let projects = sqlx::query_as::<_, DbProject>("SELECT * FROM projects")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        for row in projects {
            repo.add_project(row.into());
        }

        let subjects = sqlx::query_as::<_, DbSubject>("SELECT * FROM subjects")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        for row in subjects {
            repo.get_or_create_subject(row.into());
        }

        let contact_details =
            sqlx::query_as::<_, DbContactDetails>("SELECT * FROM contact_details")
                .fetch_all(pool)
                .await
                .map_err(|e| IfrError::Database(e.to_string()))?;
        for row in contact_details {
            repo.add_contact_details(row.into());
        }

        let scan_types = sqlx::query_as::<_, DbScanType>("SELECT * FROM scan_types")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        for row in scan_types {
            repo.get_or_create_scan_type(row.into());
        }

        let sessions = sqlx::query_as::<_, DbSession>("SELECT * FROM sessions")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        for row in sessions {
            repo.insert_session(row.into())?;
        }

        let scans = sqlx::query_as::<_, DbScan>("SELECT * FROM scans")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        for row in scans {
            repo.add_scan(row.into());
        }

        let reports = sqlx::query_as::<_, DbReport>("SELECT * FROM reports")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        let assoc_rows = sqlx::query("SELECT report_id, scan_id FROM report_scan_assoc")
            .fetch_all(pool)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        let mut scans_by_report: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in assoc_rows {
            scans_by_report
                .entry(row.get("report_id"))
                .or_default()
                .push(row.get("scan_id"));
        }
        for db_report in reports {
            let used = scans_by_report.remove(&db_report.id).unwrap_or_default();
            repo.add_report(db_report.into_report(used));
        }

        tracing::info!("Hydrated repository from database");
        Ok(repo)
    }

    pub async fn session_exists(&self, session_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        Ok(row.is_some())
    }
}
