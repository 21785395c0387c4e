//! Object storage access for uploaded documents.
//!
//! The analysis pipeline never writes: it fetches the raw bytes and content
//! type for a caller-supplied storage key. Storage failures are fatal for
//! the request and propagate to the caller; there are no retries here.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::sigv4::{self, Credentials};

/// Raw document bytes plus detected content type.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage request failed: {0}")]
    Request(String),
    #[error("storage returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Read-only access to uploaded document bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;
}

/// S3-compatible store using SigV4-signed GETs over HTTPS.
pub struct S3Store {
    client: reqwest::Client,
    bucket: String,
    region: String,
    /// Endpoint host override for S3-compatible services; the default is
    /// the virtual-hosted AWS endpoint for `bucket`/`region`.
    endpoint: Option<String>,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(
        client: reqwest::Client,
        bucket: impl Into<String>,
        region: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            credentials,
        }
    }

    /// Override the endpoint host (e.g. a MinIO or LocalStack deployment).
    pub fn with_endpoint(mut self, host: impl Into<String>) -> Self {
        self.endpoint = Some(host.into());
        self
    }

    fn host(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("{}.s3.{}.amazonaws.com", self.bucket, self.region))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let host = self.host();
        let path = format!("/{}", sigv4::uri_encode_path(key));
        let sig = sigv4::sign_request(
            "GET",
            &host,
            &path,
            "",
            &[(
                "x-amz-content-sha256".to_string(),
                // Empty body for GET; precomputed to keep signing one-pass.
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
            )],
            b"",
            &self.region,
            "s3",
            &self.credentials,
            chrono::Utc::now(),
        );

        let url = format!("https://{}{}", host, path);
        tracing::debug!("Fetching object: s3://{}/{}", self.bucket, key);

        let resp = self
            .client
            .get(&url)
            .header("authorization", &sig.authorization)
            .header("x-amz-date", &sig.amz_date)
            .header("x-amz-content-sha256", &sig.content_sha256)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let header_mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?
            .to_vec();

        let mime = detect_mime(&bytes, header_mime.as_deref());
        Ok(StoredObject { mime, bytes })
    }
}

/// Resolve a content type from the bytes themselves, preferring sniffed
/// types over generic or missing headers.
pub fn detect_mime(bytes: &[u8], header: Option<&str>) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    match header {
        Some(h) if !h.is_empty() && h != "application/octet-stream" => h.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// In-process store for tests and local one-off analysis.
#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<String, StoredObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) {
        self.objects.insert(
            key.into(),
            StoredObject {
                mime: mime.into(),
                bytes,
            },
        );
    }

    /// Insert bytes, sniffing the content type from the payload.
    pub fn insert_detected(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        let mime = detect_mime(&bytes, None);
        self.insert(key, mime, bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
