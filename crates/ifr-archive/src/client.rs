//! 归档客户端
//!
//! 两个外部归档（源/目标）共用同一客户端接口：按规范标签查询
//! 会话、枚举扫描与文件（带摘要）、下载/上传文件、触发目标侧的
//! DICOM头重提取。

use async_trait::async_trait;
use ifr_core::{config::ArchiveEndpointConfig, IfrError, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// 归档中的一条扫描记录
#[derive(Debug, Clone)]
pub struct RemoteScan {
    pub sequence_id: String,
    pub scan_type: String,
}

/// 归档中的一个文件及其摘要
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub name: String,
    /// SHA-256十六进制摘要
    pub digest: String,
    pub size: u64,
    /// 归档相对下载路径
    pub uri: String,
}

/// 归档客户端接口
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// 客户端名称（日志用）
    fn name(&self) -> &str;

    /// 检查归档可达性
    async fn check_connection(&self) -> Result<bool>;

    /// 会话是否存在
    async fn find_experiment(&self, project: &str, experiment: &str) -> Result<bool>;

    /// 枚举会话的扫描列表
    async fn list_scans(&self, project: &str, experiment: &str) -> Result<Vec<RemoteScan>>;

    /// 枚举单个扫描的文件与摘要
    async fn list_files(
        &self,
        project: &str,
        experiment: &str,
        scan: &str,
    ) -> Result<Vec<RemoteFile>>;

    /// 下载单个文件到本地路径，返回字节数
    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<u64>;

    /// 创建受试者容器（已存在则为幂等空操作）
    async fn ensure_subject(&self, project: &str, subject: &str) -> Result<()>;

    /// 创建会话容器（已存在则为幂等空操作）
    async fn ensure_experiment(&self, project: &str, subject: &str, experiment: &str)
        -> Result<()>;

    /// 上传扫描文件
    async fn upload_scan_file(
        &self,
        project: &str,
        experiment: &str,
        scan: &str,
        scan_type: &str,
        path: &Path,
    ) -> Result<()>;

    /// 触发DICOM头元数据重提取（显式管理调用，失败不重试）
    async fn refresh_headers(&self, project: &str, experiment: &str) -> Result<()>;
}

/// XNAT风格REST归档客户端
pub struct XnatClient {
    name: String,
    base_url: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl XnatClient {
    pub fn new(name: impl Into<String>, config: &ArchiveEndpointConfig) -> Self {
        Self {
            name: name.into(),
            base_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.user, Some(&self.password))
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .basic_auth(&self.user, Some(&self.password))
    }

    fn connectivity(&self, err: reqwest::Error) -> IfrError {
        IfrError::ArchiveConnectivity(format!("{}: {}", self.name, err))
    }

    fn unexpected(&self, context: &str, status: reqwest::StatusCode) -> IfrError {
        IfrError::ArchiveConnectivity(format!("{}: {} returned {}", self.name, context, status))
    }

    /// 解析XNAT结果集 {"ResultSet": {"Result": [...]}}
    fn result_rows(payload: &Value) -> Vec<&Value> {
        payload["ResultSet"]["Result"]
            .as_array()
            .map(|rows| rows.iter().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ArchiveClient for XnatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_connection(&self) -> Result<bool> {
        let path = "/data/version".to_string();
        match self.get(&path).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Connection check failed for {}: {}", self.name, e);
                Ok(false)
            }
        }
    }

    async fn find_experiment(&self, project: &str, experiment: &str) -> Result<bool> {
        let path = format!("/data/projects/{}/experiments/{}", project, experiment);
        let response = self
            .get(&path)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(self.unexpected("experiment lookup", status)),
        }
    }

    async fn list_scans(&self, project: &str, experiment: &str) -> Result<Vec<RemoteScan>> {
        let path = format!(
            "/data/projects/{}/experiments/{}/scans?format=json",
            project, experiment
        );
        let response = self
            .get(&path)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        if !response.status().is_success() {
            return Err(self.unexpected("scan listing", response.status()));
        }
        let payload: Value = response.json().await.map_err(|e| self.connectivity(e))?;
        let scans = Self::result_rows(&payload)
            .into_iter()
            .map(|row| RemoteScan {
                sequence_id: row["ID"].as_str().unwrap_or_default().to_string(),
                scan_type: row["type"].as_str().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(scans)
    }

    async fn list_files(
        &self,
        project: &str,
        experiment: &str,
        scan: &str,
    ) -> Result<Vec<RemoteFile>> {
        let path = format!(
            "/data/projects/{}/experiments/{}/scans/{}/files?format=json",
            project, experiment, scan
        );
        let response = self
            .get(&path)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        if !response.status().is_success() {
            return Err(self.unexpected("file listing", response.status()));
        }
        let payload: Value = response.json().await.map_err(|e| self.connectivity(e))?;
        let files = Self::result_rows(&payload)
            .into_iter()
            .map(|row| RemoteFile {
                name: row["Name"].as_str().unwrap_or_default().to_string(),
                digest: row["digest"].as_str().unwrap_or_default().to_string(),
                size: row["Size"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .or_else(|| row["Size"].as_u64())
                    .unwrap_or(0),
                uri: row["URI"].as_str().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(files)
    }

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<u64> {
        debug!("Downloading {} from {}", file.name, self.name);
        let response = self
            .get(&file.uri)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        if !response.status().is_success() {
            return Err(self.unexpected("file download", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| self.connectivity(e))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn ensure_subject(&self, project: &str, subject: &str) -> Result<()> {
        let path = format!("/data/projects/{}/subjects/{}", project, subject);
        let response = self
            .put(&path)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::CONFLICT => Ok(()),
            status => Err(self.unexpected("subject creation", status)),
        }
    }

    async fn ensure_experiment(
        &self,
        project: &str,
        subject: &str,
        experiment: &str,
    ) -> Result<()> {
        let path = format!(
            "/data/projects/{}/subjects/{}/experiments/{}?xsiType=xnat:mrSessionData",
            project, subject, experiment
        );
        let response = self
            .put(&path)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::CONFLICT => Ok(()),
            status => Err(self.unexpected("experiment creation", status)),
        }
    }

    async fn upload_scan_file(
        &self,
        project: &str,
        experiment: &str,
        scan: &str,
        scan_type: &str,
        path: &Path,
    ) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IfrError::Validation(format!("Invalid file path {:?}", path)))?;
        let body = tokio::fs::read(path).await?;
        info!(
            "Uploading {} ({} bytes) to {} scan {}",
            file_name,
            body.len(),
            self.name,
            scan
        );
        let url_path = format!(
            "/data/projects/{}/experiments/{}/scans/{}/resources/DICOM/files/{}?inbody=true&type={}",
            project, experiment, scan, file_name, scan_type
        );
        let response = self
            .put(&url_path)
            .body(body)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        if !response.status().is_success() {
            return Err(self.unexpected("file upload", response.status()));
        }
        Ok(())
    }

    async fn refresh_headers(&self, project: &str, experiment: &str) -> Result<()> {
        info!(
            "Triggering DICOM header re-extraction for {}/{} on {}",
            project, experiment, self.name
        );
        let path = format!(
            "/data/projects/{}/experiments/{}?pullDataFromHeaders=true",
            project, experiment
        );
        let response = self
            .put(&path)
            .send()
            .await
            .map_err(|e| self.connectivity(e))?;
        if !response.status().is_success() {
            return Err(self.unexpected("header re-extraction", response.status()));
        }
        Ok(())
    }
}
