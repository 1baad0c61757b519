//! 测试用内存归档

use crate::client::{ArchiveClient, RemoteFile, RemoteScan};
use crate::export::sha256_hex;
use async_trait::async_trait;
use ifr_core::{IfrError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct MemoryArchiveState {
    /// (project, experiment) -> 扫描列表
    experiments: HashMap<(String, String), Vec<RemoteScan>>,
    /// (project, experiment, scan) -> 文件名列表
    scan_files: HashMap<(String, String, String), Vec<String>>,
    /// uri -> 文件内容
    blobs: HashMap<String, Vec<u8>>,
    subjects: Vec<(String, String)>,
    uploads: usize,
    header_refreshes: usize,
}

/// 以内存映射模拟归档REST接口的测试客户端
pub struct MemoryArchive {
    name: String,
    state: Mutex<MemoryArchiveState>,
    /// 模拟归档侧报告损坏的摘要
    corrupt_digests: bool,
    /// 模拟归档不可达
    offline: bool,
}

impl MemoryArchive {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(MemoryArchiveState::default()),
            corrupt_digests: false,
            offline: false,
        }
    }

    pub fn corrupting_digests(name: &str) -> Self {
        Self {
            corrupt_digests: true,
            ..Self::new(name)
        }
    }

    pub fn offline(name: &str) -> Self {
        Self {
            offline: true,
            ..Self::new(name)
        }
    }

    fn uri(project: &str, experiment: &str, scan: &str, file_name: &str) -> String {
        format!("/{}/{}/{}/{}", project, experiment, scan, file_name)
    }

    pub fn add_experiment(&self, project: &str, experiment: &str, scans: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.experiments.insert(
            (project.to_string(), experiment.to_string()),
            scans
                .iter()
                .map(|(id, scan_type)| RemoteScan {
                    sequence_id: id.to_string(),
                    scan_type: scan_type.to_string(),
                })
                .collect(),
        );
    }

    pub fn add_file(&self, project: &str, experiment: &str, scan: &str, name: &str, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state
            .scan_files
            .entry((
                project.to_string(),
                experiment.to_string(),
                scan.to_string(),
            ))
            .or_default()
            .push(name.to_string());
        state
            .blobs
            .insert(Self::uri(project, experiment, scan, name), data.to_vec());
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn header_refresh_count(&self) -> usize {
        self.state.lock().unwrap().header_refreshes
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            Err(IfrError::ArchiveConnectivity(format!(
                "{}: archive unreachable",
                self.name
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArchiveClient for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_connection(&self) -> Result<bool> {
        Ok(!self.offline)
    }

    async fn find_experiment(&self, project: &str, experiment: &str) -> Result<bool> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .experiments
            .contains_key(&(project.to_string(), experiment.to_string())))
    }

    async fn list_scans(&self, project: &str, experiment: &str) -> Result<Vec<RemoteScan>> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .experiments
            .get(&(project.to_string(), experiment.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_files(
        &self,
        project: &str,
        experiment: &str,
        scan: &str,
    ) -> Result<Vec<RemoteFile>> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        let names = state
            .scan_files
            .get(&(
                project.to_string(),
                experiment.to_string(),
                scan.to_string(),
            ))
            .cloned()
            .unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| {
                let uri = Self::uri(project, experiment, scan, &name);
                let data = state.blobs.get(&uri).cloned().unwrap_or_default();
                let digest = if self.corrupt_digests {
                    "deadbeef".to_string()
                } else {
                    sha256_hex(&data)
                };
                RemoteFile {
                    name,
                    digest,
                    size: data.len() as u64,
                    uri,
                }
            })
            .collect())
    }

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<u64> {
        self.check_online()?;
        let data = {
            let state = self.state.lock().unwrap();
            state.blobs.get(&file.uri).cloned().ok_or_else(|| {
                IfrError::NotFound(format!("File {} not found on {}", file.uri, self.name))
            })?
        };
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }

    async fn ensure_subject(&self, project: &str, subject: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.subjects.push((project.to_string(), subject.to_string()));
        Ok(())
    }

    async fn ensure_experiment(
        &self,
        project: &str,
        _subject: &str,
        experiment: &str,
    ) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state
            .experiments
            .entry((project.to_string(), experiment.to_string()))
            .or_default();
        Ok(())
    }

    async fn upload_scan_file(
        &self,
        project: &str,
        experiment: &str,
        scan: &str,
        _scan_type: &str,
        path: &Path,
    ) -> Result<()> {
        self.check_online()?;
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let mut state = self.state.lock().unwrap();
        state
            .scan_files
            .entry((
                project.to_string(),
                experiment.to_string(),
                scan.to_string(),
            ))
            .or_default()
            .push(name.clone());
        state
            .blobs
            .insert(Self::uri(project, experiment, scan, &name), data);
        state.uploads += 1;
        Ok(())
    }

    async fn refresh_headers(&self, _project: &str, _experiment: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.header_refreshes += 1;
        Ok(())
    }
}
