//! Object storage gateway: uploads return a public URL, and stored objects
//! are later addressed by the public id parsed back out of that URL.

use std::path::{Path, PathBuf};

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shared::UploadedFile;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file storage is not configured")]
    NotConfigured,

    #[error("not a stored file URL: {0}")]
    InvalidUrl(String),

    #[error("storage provider rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    pub fn for_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else if mime_type.starts_with("video/") {
            Self::Video
        } else {
            Self::Raw
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Raw => "raw",
        }
    }
}

/// File received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// CDN account configured in a user's settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

pub trait ObjectStorage: Send + Sync {
    fn upload<'a>(
        &'a self,
        file: FileUpload,
        account: Option<&'a CdnCredentials>,
    ) -> BoxFuture<'a, Result<UploadedFile, StorageError>>;

    fn destroy<'a>(
        &'a self,
        public_id: &'a str,
        resource_type: ResourceType,
        account: Option<&'a CdnCredentials>,
    ) -> BoxFuture<'a, Result<(), StorageError>>;
}

/// Public id of a stored object: the URL's last two path segments, folder
/// and file name, with the extension dropped.
pub fn public_id_from_url(url: &str) -> Result<String, StorageError> {
    let invalid = || StorageError::InvalidUrl(url.to_string());
    let parsed = reqwest::Url::parse(url).map_err(|_| invalid())?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|s| !s.is_empty())
        .collect();
    let [.., folder, file] = segments.as_slice() else {
        return Err(invalid());
    };
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => *file,
    };
    Ok(format!("{}/{}", folder, stem))
}

/// Removes stored objects one by one. Failures are logged and skipped.
pub async fn destroy_best_effort<'a, I>(
    storage: &dyn ObjectStorage,
    objects: I,
    account: Option<&CdnCredentials>,
) where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (url, mime_type) in objects {
        let public_id = match public_id_from_url(url) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Skipping cleanup of {}: {}", url, e);
                continue;
            }
        };
        if let Err(e) = storage
            .destroy(&public_id, ResourceType::for_mime(mime_type), account)
            .await
        {
            tracing::warn!("Failed to remove stored file {}: {}", public_id, e);
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Request signature: the parameters sorted by name, joined as a query
/// string, followed by the secret, hashed with SHA-256.
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    hex_encode(&Sha256::digest(format!("{}{}", joined, secret).as_bytes()))
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    bytes: i64,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Cloudinary over its REST upload API.
pub struct CloudinaryStorage {
    config: StorageConfig,
    http: reqwest::Client,
}

impl CloudinaryStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn account(&self, account: Option<&CdnCredentials>) -> Result<CdnCredentials, StorageError> {
        if let Some(account) = account {
            return Ok(account.clone());
        }
        if self.config.cloud_name.is_empty() || self.config.api_secret.is_empty() {
            return Err(StorageError::NotConfigured);
        }
        Ok(CdnCredentials {
            cloud_name: self.config.cloud_name.clone(),
            api_key: self.config.api_key.clone(),
            api_secret: self.config.api_secret.clone(),
        })
    }

    async fn upload_file(
        &self,
        file: FileUpload,
        account: Option<&CdnCredentials>,
    ) -> Result<UploadedFile, StorageError> {
        let account = self.account(account)?;
        let timestamp = Utc::now().timestamp().to_string();
        let params = [
            ("folder", self.config.folder.clone()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign(&params, &account.api_secret);

        let size = file.bytes.len() as i64;
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", account.api_key.clone())
            .text("folder", self.config.folder.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/auto/upload",
            account.cloud_name
        );
        let response = self.http.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected(body));
        }
        let uploaded: UploadResponse = response.json().await?;

        tracing::info!("Uploaded {} to {}", file.filename, uploaded.secure_url);
        Ok(UploadedFile {
            url: uploaded.secure_url,
            filename: file.filename,
            size: if uploaded.bytes > 0 { uploaded.bytes } else { size },
            mime_type: file.mime_type,
        })
    }

    async fn destroy_object(
        &self,
        public_id: &str,
        resource_type: ResourceType,
        account: Option<&CdnCredentials>,
    ) -> Result<(), StorageError> {
        let account = self.account(account)?;
        let timestamp = Utc::now().timestamp().to_string();
        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign(&params, &account.api_secret);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/{}/destroy",
            account.cloud_name,
            resource_type.as_str()
        );
        let form = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", account.api_key.clone()),
            ("signature_algorithm", "sha256".to_string()),
            ("signature", signature),
        ];
        let response = self.http.post(&url).form(&form).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected(body));
        }
        let outcome: DestroyResponse = response.json().await?;
        if outcome.result != "ok" && outcome.result != "not found" {
            return Err(StorageError::Rejected(outcome.result));
        }
        Ok(())
    }
}

impl ObjectStorage for CloudinaryStorage {
    fn upload<'a>(
        &'a self,
        file: FileUpload,
        account: Option<&'a CdnCredentials>,
    ) -> BoxFuture<'a, Result<UploadedFile, StorageError>> {
        Box::pin(self.upload_file(file, account))
    }

    fn destroy<'a>(
        &'a self,
        public_id: &'a str,
        resource_type: ResourceType,
        account: Option<&'a CdnCredentials>,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.destroy_object(public_id, resource_type, account))
    }
}

/// Files on local disk, served back under `{public_url}/uploads`.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    folder: String,
    public_url: String,
}

impl LocalStorage {
    pub fn new(base_path: impl AsRef<Path>, folder: &str, public_url: &str) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            folder: folder.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn write(&self, file: FileUpload) -> Result<UploadedFile, StorageError> {
        let dir = self.base_path.join(&self.folder);
        fs::create_dir_all(&dir).await?;

        let extension = Path::new(&file.filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let stored_name = format!("{}{}", Uuid::new_v4(), extension);
        fs::write(dir.join(&stored_name), &file.bytes).await?;

        Ok(UploadedFile {
            url: format!("{}/uploads/{}/{}", self.public_url, self.folder, stored_name),
            filename: file.filename,
            size: file.bytes.len() as i64,
            mime_type: file.mime_type,
        })
    }

    async fn remove(&self, public_id: &str) -> Result<(), StorageError> {
        let Some((folder, stem)) = public_id.split_once('/') else {
            return Err(StorageError::InvalidUrl(public_id.to_string()));
        };
        if [folder, stem].iter().any(|s| s.contains("..") || s.contains('/')) {
            return Err(StorageError::InvalidUrl(public_id.to_string()));
        }

        let dir = self.base_path.join(folder);
        if !dir.exists() {
            return Ok(());
        }
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

impl ObjectStorage for LocalStorage {
    fn upload<'a>(
        &'a self,
        file: FileUpload,
        _account: Option<&'a CdnCredentials>,
    ) -> BoxFuture<'a, Result<UploadedFile, StorageError>> {
        Box::pin(self.write(file))
    }

    fn destroy<'a>(
        &'a self,
        public_id: &'a str,
        _resource_type: ResourceType,
        _account: Option<&'a CdnCredentials>,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.remove(public_id))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Hands out fake CDN URLs and records destroyed public ids.
    #[derive(Default)]
    pub struct RecordingStorage {
        destroyed: Mutex<Vec<String>>,
        fail_destroy: Mutex<bool>,
    }

    impl RecordingStorage {
        pub fn destroyed(&self) -> Vec<String> {
            self.destroyed.lock().unwrap().clone()
        }

        pub fn fail_destroy(&self) {
            *self.fail_destroy.lock().unwrap() = true;
        }
    }

    impl ObjectStorage for RecordingStorage {
        fn upload<'a>(
            &'a self,
            file: FileUpload,
            _account: Option<&'a CdnCredentials>,
        ) -> BoxFuture<'a, Result<UploadedFile, StorageError>> {
            Box::pin(async move {
                Ok(UploadedFile {
                    url: format!("https://cdn.test/image/upload/v1/backoffice/{}", file.filename),
                    size: file.bytes.len() as i64,
                    filename: file.filename,
                    mime_type: file.mime_type,
                })
            })
        }

        fn destroy<'a>(
            &'a self,
            public_id: &'a str,
            _resource_type: ResourceType,
            _account: Option<&'a CdnCredentials>,
        ) -> BoxFuture<'a, Result<(), StorageError>> {
            Box::pin(async move {
                if *self.fail_destroy.lock().unwrap() {
                    return Err(StorageError::Rejected("cdn unavailable".into()));
                }
                self.destroyed.lock().unwrap().push(public_id.to_string());
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_id_from_url() {
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/image/upload/v1712/backoffice/ribeye.jpg")
                .unwrap(),
            "backoffice/ribeye"
        );
        assert_eq!(
            public_id_from_url("http://localhost:8080/uploads/backoffice/price.list.pdf").unwrap(),
            "backoffice/price.list"
        );
        assert_eq!(
            public_id_from_url("https://cdn.example.com/docs/README").unwrap(),
            "docs/README"
        );
        assert!(public_id_from_url("https://cdn.example.com/only").is_err());
        assert!(public_id_from_url("not a url").is_err());
    }

    #[test]
    fn test_signature_sorts_params() {
        let a = sign(&[("timestamp", "1".into()), ("folder", "f".into())], "s");
        let b = sign(&[("folder", "f".into()), ("timestamp", "1".into())], "s");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, hex_encode(&Sha256::digest(b"folder=f&timestamp=1s")));
    }

    #[test]
    fn test_resource_type_for_mime() {
        assert_eq!(ResourceType::for_mime("image/png"), ResourceType::Image);
        assert_eq!(ResourceType::for_mime("video/mp4"), ResourceType::Video);
        assert_eq!(ResourceType::for_mime("application/pdf"), ResourceType::Raw);
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let dir = std::env::temp_dir().join(format!("backoffice-storage-{}", Uuid::new_v4()));
        let storage = LocalStorage::new(&dir, "backoffice", "http://localhost:8080/");

        let uploaded = storage
            .upload(
                FileUpload {
                    filename: "Spec Sheet.PDF".into(),
                    mime_type: "application/pdf".into(),
                    bytes: b"%PDF-1.4".to_vec(),
                },
                None,
            )
            .await
            .unwrap();
        assert!(uploaded.url.starts_with("http://localhost:8080/uploads/backoffice/"));
        assert!(uploaded.url.ends_with(".pdf"));
        assert_eq!(uploaded.size, 8);
        assert_eq!(uploaded.filename, "Spec Sheet.PDF");

        let public_id = public_id_from_url(&uploaded.url).unwrap();
        storage.destroy(&public_id, ResourceType::Raw, None).await.unwrap();
        let remaining = std::fs::read_dir(dir.join("backoffice")).unwrap().count();
        assert_eq!(remaining, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_best_effort_cleanup_survives_failures() {
        let storage = testing::RecordingStorage::default();
        destroy_best_effort(
            &storage,
            [
                ("https://cdn.test/image/upload/v1/backoffice/a.png", "image/png"),
                ("garbage", "image/png"),
                ("https://cdn.test/raw/upload/v1/backoffice/b.pdf", "application/pdf"),
            ],
            None,
        )
        .await;
        assert_eq!(storage.destroyed(), vec!["backoffice/a", "backoffice/b"]);
    }
}
