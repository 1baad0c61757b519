//! 导出方向：临床确认扫描 -> 目标归档
//!
//! 每个扫描按"下载-本地校验-上传-两侧摘要比对"四步传输，
//! 校验通过才置exported并清理临时副本；任何一处摘要不一致都
//! 使该会话的导出以致命错误终止，临时文件保留以供排查。

use crate::client::ArchiveClient;
use ifr_core::{IfrError, Result};
use ifr_workflow::ReportingEngine;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{info, warn};

/// 计算SHA-256十六进制摘要
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// 单个会话的导出结果
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub session_id: i64,
    pub uploaded_scans: usize,
    pub skipped_scans: usize,
}

/// 扫描导出器
pub struct ScanExporter<'a> {
    source: &'a dyn ArchiveClient,
    destination: &'a dyn ArchiveClient,
    destination_project: String,
    scratch_root: PathBuf,
}

impl<'a> ScanExporter<'a> {
    pub fn new(
        source: &'a dyn ArchiveClient,
        destination: &'a dyn ArchiveClient,
        destination_project: impl Into<String>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            destination,
            destination_project: destination_project.into(),
            scratch_root: scratch_root.into(),
        }
    }

    /// 导出单个会话的全部临床扫描
    ///
    /// 每个扫描的exported标志独立提交，重试只会处理尚未导出的
    /// 扫描。全部传输完成后触发一次目标侧的头重提取。
    pub async fn export_session(
        &self,
        engine: &mut ReportingEngine,
        session_id: i64,
    ) -> Result<ExportOutcome> {
        let session = engine.repository().get_session(session_id)?.clone();
        let subject = engine.repository().get_subject(session.subject_id)?.clone();

        let source_project = session.archive_id.project.clone();
        let source_label = session.archive_id.label();
        let dest_label = session_id.to_string();

        self.destination
            .ensure_subject(&self.destination_project, &subject.mbi_id)
            .await?;
        self.destination
            .ensure_experiment(&self.destination_project, &subject.mbi_id, &dest_label)
            .await?;

        let scans: Vec<_> = engine
            .repository()
            .scans_for_session(session_id)
            .into_iter()
            .cloned()
            .collect();

        let mut uploaded_scans = 0;
        let mut skipped_scans = 0;
        for scan in scans {
            let scan_type = engine.repository().get_scan_type(scan.type_id)?.clone();
            if !scan_type.clinical || scan.exported {
                skipped_scans += 1;
                continue;
            }

            let files = self
                .source
                .list_files(&source_project, &source_label, &scan.sequence_id)
                .await?;
            if files.is_empty() {
                // 此前确认存在的会话缺少预期扫描，对该会话是致命错误
                return Err(IfrError::NotFound(format!(
                    "Scan {} of session {} is missing on the source archive",
                    scan.sequence_id, session_id
                )));
            }

            let scratch_dir = self
                .scratch_root
                .join(session_id.to_string())
                .join(&scan.sequence_id);
            tokio::fs::create_dir_all(&scratch_dir).await?;

            for file in &files {
                let local_path = scratch_dir.join(&file.name);
                self.source.download_file(file, &local_path).await?;

                // 上传前先核对下载副本与源侧摘要
                let data = tokio::fs::read(&local_path).await?;
                let local_digest = sha256_hex(&data);
                if !file.digest.is_empty() && local_digest != file.digest {
                    warn!(
                        "Downloaded copy of {} does not match the source digest",
                        file.name
                    );
                    return Err(IfrError::ChecksumMismatch {
                        scan: scan.sequence_id.clone(),
                        file: file.name.clone(),
                        source_digest: file.digest.clone(),
                        destination: local_digest,
                    });
                }

                self.destination
                    .upload_scan_file(
                        &self.destination_project,
                        &dest_label,
                        &scan.sequence_id,
                        &scan_type.name,
                        &local_path,
                    )
                    .await?;
            }

            // 两侧归档报告的摘要必须逐文件一致
            let dest_files = self
                .destination
                .list_files(&self.destination_project, &dest_label, &scan.sequence_id)
                .await?;
            for file in &files {
                let counterpart = dest_files
                    .iter()
                    .find(|f| f.name == file.name)
                    .ok_or_else(|| IfrError::ChecksumMismatch {
                        scan: scan.sequence_id.clone(),
                        file: file.name.clone(),
                        source_digest: file.digest.clone(),
                        destination: "missing".to_string(),
                    })?;
                if counterpart.digest != file.digest {
                    return Err(IfrError::ChecksumMismatch {
                        scan: scan.sequence_id.clone(),
                        file: file.name.clone(),
                        source_digest: file.digest.clone(),
                        destination: counterpart.digest.clone(),
                    });
                }
            }

            engine.repository_mut().mark_scan_exported(scan.id)?;
            uploaded_scans += 1;
            // 校验通过后删除临时副本
            tokio::fs::remove_dir_all(&scratch_dir).await?;
            info!(
                "Exported scan {} of session {} ({} files)",
                scan.sequence_id,
                session_id,
                files.len()
            );
        }

        if uploaded_scans > 0 {
            self.destination
                .refresh_headers(&self.destination_project, &dest_label)
                .await?;
        }

        Ok(ExportOutcome {
            session_id,
            uploaded_scans,
            skipped_scans,
        })
    }
}
