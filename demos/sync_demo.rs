//! 归档同步演示程序
//!
//! 展示导入/导出两个方向：候选记录分类入库，临床扫描带校验导出

use async_trait::async_trait;
use ifr_archive::{
    ArchiveClient, ArchiveSynchronizer, RemoteFile, RemoteScan, SessionCandidate,
};
use ifr_core::{IfrError, Result};
use ifr_workflow::{ReportingEngine, ScanTypeDecision};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// 演示用的内存归档
struct DemoArchive {
    name: String,
    experiments: Mutex<HashMap<String, Vec<RemoteScan>>>,
    files: Mutex<HashMap<String, Vec<(String, Vec<u8>)>>>, // "experiment/scan" -> 文件
    uploads: Mutex<usize>,
}

impl DemoArchive {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            experiments: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            uploads: Mutex::new(0),
        }
    }

    fn add_experiment(&self, label: &str, scans: &[(&str, &str)]) {
        self.experiments.lock().unwrap().insert(
            label.to_string(),
            scans
                .iter()
                .map(|(id, t)| RemoteScan {
                    sequence_id: id.to_string(),
                    scan_type: t.to_string(),
                })
                .collect(),
        );
    }

    fn add_file(&self, label: &str, scan: &str, name: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .entry(format!("{}/{}", label, scan))
            .or_default()
            .push((name.to_string(), data.to_vec()));
    }

    fn digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl ArchiveClient for DemoArchive {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_connection(&self) -> Result<bool> {
        Ok(true)
    }

    async fn find_experiment(&self, _project: &str, experiment: &str) -> Result<bool> {
        Ok(self.experiments.lock().unwrap().contains_key(experiment))
    }

    async fn list_scans(&self, _project: &str, experiment: &str) -> Result<Vec<RemoteScan>> {
        Ok(self
            .experiments
            .lock()
            .unwrap()
            .get(experiment)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_files(
        &self,
        _project: &str,
        experiment: &str,
        scan: &str,
    ) -> Result<Vec<RemoteFile>> {
        let key = format!("{}/{}", experiment, scan);
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&key)
            .map(|files| {
                files
                    .iter()
                    .map(|(name, data)| RemoteFile {
                        name: name.clone(),
                        digest: Self::digest(data),
                        size: data.len() as u64,
                        uri: format!("/{}/{}", key, name),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<u64> {
        let files = self.files.lock().unwrap();
        for (_, entries) in files.iter() {
            for (name, data) in entries {
                if file.uri.ends_with(&format!("/{}", name)) && file.name == *name {
                    std::fs::write(dest, data)?;
                    return Ok(data.len() as u64);
                }
            }
        }
        Err(IfrError::NotFound(format!("File {} not found", file.uri)))
    }

    async fn ensure_subject(&self, _project: &str, _subject: &str) -> Result<()> {
        Ok(())
    }

    async fn ensure_experiment(
        &self,
        _project: &str,
        _subject: &str,
        experiment: &str,
    ) -> Result<()> {
        self.experiments
            .lock()
            .unwrap()
            .entry(experiment.to_string())
            .or_default();
        Ok(())
    }

    async fn upload_scan_file(
        &self,
        _project: &str,
        experiment: &str,
        scan: &str,
        _scan_type: &str,
        path: &Path,
    ) -> Result<()> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        self.files
            .lock()
            .unwrap()
            .entry(format!("{}/{}", experiment, scan))
            .or_default()
            .push((name, data));
        *self.uploads.lock().unwrap() += 1;
        Ok(())
    }

    async fn refresh_headers(&self, _project: &str, experiment: &str) -> Result<()> {
        println!("   🔁 目标归档重提取DICOM头: {}", experiment);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("🚀 IFR 归档同步演示\n");

    // 源归档上的两个会话
    let source = Arc::new(DemoArchive::new("source"));
    source.add_experiment("MRH100_124_MR02", &[("1", "t1_mprage_sag"), ("2", "localizer")]);
    source.add_file("MRH100_124_MR02", "1", "image001.dcm", b"demo-dicom-bytes-1");
    source.add_file("MRH100_124_MR02", "1", "image002.dcm", b"demo-dicom-bytes-2");
    source.add_experiment("MRH100_125_MR01", &[("1", "t2_space_sag_p2_iso")]);
    source.add_file("MRH100_125_MR01", "1", "image001.dcm", b"demo-dicom-bytes-3");

    let destination = Arc::new(DemoArchive::new("destination"));
    let sync = ArchiveSynchronizer::new(
        source.clone(),
        destination.clone(),
        "IFR_CLINICAL",
        std::env::temp_dir().join("ifr-sync-demo"),
    );

    // 1. 导入候选记录
    let candidates = vec![
        SessionCandidate {
            study_id: 1231,
            project_id: "MRH100".to_string(),
            subject_id: "MSH103138".to_string(),
            first_name: "Bob".to_string(),
            last_name: "Brown".to_string(),
            dob: "12/03/1952".to_string(),
            scan_date: "10/04/2024".to_string(),
            xnat_subject_id: "124".to_string(),
            xnat_visit_id: "2".to_string(),
            ..Default::default()
        },
        SessionCandidate {
            study_id: 1244,
            project_id: "MRH100".to_string(),
            subject_id: "MSH223132".to_string(),
            first_name: "Sami".to_string(),
            last_name: "Shah".to_string(),
            dob: "05.12.1951".to_string(),
            scan_date: "11.02.2024".to_string(),
            xnat_subject_id: "125".to_string(),
            xnat_visit_id: "1".to_string(),
            ..Default::default()
        },
        SessionCandidate {
            study_id: 1366,
            project_id: "MRH999".to_string(),
            subject_id: "MSH892342".to_string(),
            first_name: "Bill".to_string(),
            last_name: "Bryson".to_string(),
            dob: "24/08/1980".to_string(),
            scan_date: "11/10/2024".to_string(),
            daris_id: "1.5.208.1234".to_string(),
            ..Default::default()
        },
    ];

    let mut engine = ReportingEngine::default();
    let summary = sync.run_import(&mut engine, &candidates).await?;
    println!("📥 导入完成: {} 新增, {} 已存在, {} 跳过", summary.imported.len(), summary.previous.len(), summary.skipped.len());
    for session in engine.repair_queue() {
        println!("   ⚠️ 待修复: {} ({})", session.id, session.data_status);
    }

    // 2. 确认扫描类型（全部接受启发式判定）
    let admin_id = {
        let repo = engine.repository_mut();
        repo.add_user(ifr_core::User::new(
            "Alex",
            "Admin",
            "admin@example.org",
            "hash",
            vec![ifr_core::ADMIN_ROLE],
        ))?
    };
    let admin = engine.repository().user_context(admin_id)?;
    let page = engine.unconfirmed_scan_types_page(0);
    let decisions: Vec<ScanTypeDecision> = page
        .types
        .iter()
        .map(|t| ScanTypeDecision {
            type_id: t.id,
            clinical: t.clinical,
        })
        .collect();
    engine.confirm_scan_types(&admin, &decisions)?;
    println!("✅ {} 个扫描类型已确认", decisions.len());

    // 3. 导出运行
    let report = sync.run_export(&mut engine).await?;
    println!(
        "📤 导出完成: {} 个会话, {} 个扫描上传",
        report.exported_sessions.len(),
        report.uploaded_scans
    );

    // 4. 重跑导出应为零上传（幂等）
    let rerun = sync.run_export(&mut engine).await?;
    println!("🔁 重跑导出: {} 个扫描上传", rerun.uploaded_scans);

    println!("\n🎉 演示完成");
    Ok(())
}
