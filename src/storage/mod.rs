//! Blob storage for chat images.
//!
//! Uploads arrive as `data:` URIs, are decoded and written under the blob
//! directory, and are served back from `/blobs/<path>`.

use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::AppError;

/// URL prefix blobs are served under.
pub const BLOB_ROUTE: &str = "/blobs";

/// Handle for a stored blob, relative to the blob directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub path: String,
    pub content_type: String,
    pub size: usize,
}

/// A decoded `data:` URI.
#[derive(Debug, PartialEq, Eq)]
pub struct DataUri {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Parse `data:<mime>;base64,<payload>`. Only base64 payloads are accepted.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let rest = raw
            .strip_prefix("data:")
            .ok_or_else(|| AppError::BadRequest("Expected a data: URI".to_string()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| AppError::BadRequest("Data URI has no payload".to_string()))?;
        let content_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| AppError::BadRequest("Data URI must be base64 encoded".to_string()))?;
        let content_type = if content_type.is_empty() {
            "application/octet-stream"
        } else {
            content_type
        };

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| AppError::BadRequest(format!("Invalid base64 payload: {}", e)))?;

        Ok(Self {
            content_type: content_type.to_string(),
            bytes,
        })
    }
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    /// Decode `data_uri` and write it to `path`. Returns once the bytes are
    /// synced to disk.
    pub async fn upload_data_uri(&self, path: &str, data_uri: &str) -> Result<BlobHandle, AppError> {
        let relative = sanitize_path(path)?;
        let decoded = DataUri::parse(data_uri)?;

        if decoded.bytes.is_empty() {
            return Err(AppError::Validation("Image is empty".to_string()));
        }
        if decoded.bytes.len() > self.max_bytes {
            return Err(AppError::QuotaExceeded(format!(
                "Upload of {} bytes exceeds the {} byte limit",
                decoded.bytes.len(),
                self.max_bytes
            )));
        }

        let full_path = self.root.join(&relative);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&full_path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &decoded.bytes).await?;
        file.sync_all().await?;

        tracing::debug!(path = %relative.display(), size = decoded.bytes.len(), "Blob stored");

        Ok(BlobHandle {
            path: relative.to_string_lossy().replace('\\', "/"),
            content_type: decoded.content_type,
            size: decoded.bytes.len(),
        })
    }

    /// Public URL for a stored blob.
    pub async fn download_url(&self, handle: &BlobHandle) -> Result<String, AppError> {
        let full_path = self.root.join(&handle.path);
        if !tokio::fs::try_exists(&full_path).await? {
            return Err(AppError::NotFound(format!("Blob {} not found", handle.path)));
        }
        Ok(format!("{}{}/{}", self.public_base_url, BLOB_ROUTE, handle.path))
    }
}

/// Reject absolute paths and parent-directory escapes.
fn sanitize_path(path: &str) -> Result<PathBuf, AppError> {
    let candidate = Path::new(path);
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(AppError::BadRequest(format!("Invalid blob path {:?}", path)));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(AppError::BadRequest("Blob path is empty".to_string()));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn test_parse_data_uri() {
        let uri = DataUri::parse(PIXEL).unwrap();
        assert_eq!(uri.content_type, "image/png");
        assert_eq!(uri.bytes, vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn test_parse_rejects_non_base64_uri() {
        assert!(DataUri::parse("data:text/plain,hello").is_err());
        assert!(DataUri::parse("https://example.org/cat.png").is_err());
        assert!(DataUri::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn test_sanitize_path_rejects_escape() {
        assert!(sanitize_path("../etc/passwd").is_err());
        assert!(sanitize_path("/etc/passwd").is_err());
        assert_eq!(
            sanitize_path("chat-images/1.png").unwrap(),
            PathBuf::from("chat-images/1.png")
        );
    }

    #[tokio::test]
    async fn test_upload_then_download_url() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost:8080/", 1024);

        let handle = store.upload_data_uri("chat-images/1", PIXEL).await.unwrap();
        assert_eq!(handle.size, 8);
        assert!(dir.path().join("chat-images/1").exists());

        let url = store.download_url(&handle).await.unwrap();
        assert_eq!(url, "http://localhost:8080/blobs/chat-images/1");
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_quota_error() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost", 4);

        let err = store.upload_data_uri("big", PIXEL).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(_)));
        assert!(!dir.path().join("big").exists());
    }
}
