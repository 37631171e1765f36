//! Object storage interface and its HTTP implementation.

pub mod paths;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Timeout for media asset downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Object storage capability set.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload bytes to `path`. On a duplicate, the implementation attempts an
    /// update, then delete-and-reupload, before surfacing an error.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    /// Issue a signed URL for `path`.
    async fn create_signed_url(&self, path: &str, ttl_secs: u64) -> Result<String>;
    /// Best-effort removal of objects.
    async fn remove(&self, paths: &[String]) -> Result<()>;
}

/// Download a URL to a local file with the standard asset timeout.
pub async fn download_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| Error::storage(format!("Download failed for {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::storage(format!(
            "Download failed for {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::storage(format!("Download body failed for {}: {}", url, e)))?;

    tokio::fs::write(dest, &bytes).await?;
    debug!(url, bytes = bytes.len(), dest = %dest.display(), "Downloaded asset");
    Ok(())
}

/// Fetches remote assets to local files. The production binding is a plain
/// HTTP GET; tests substitute a writer of fixture bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP-backed [`AssetFetcher`].
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        download_to_file(&self.client, url, dest).await
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url_camel: Option<String>,
    #[serde(rename = "signed_url")]
    signed_url_snake: Option<String>,
    #[serde(rename = "signedUrl")]
    signed_url_mixed: Option<String>,
}

/// Extract the signed URL from a sign response, accepting the field spellings
/// different store versions emit, and absolutize it against the API base.
fn resolve_signed_url(body: &str, api_base: &str) -> Result<String> {
    let parsed: SignedUrlResponse = serde_json::from_str(body)?;
    let relative = parsed
        .signed_url_camel
        .or(parsed.signed_url_mixed)
        .or(parsed.signed_url_snake)
        .ok_or_else(|| Error::storage("Sign response carried no signed URL"))?;

    if relative.starts_with("http://") || relative.starts_with("https://") {
        return Ok(relative);
    }
    Ok(format!(
        "{}/{}",
        api_base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    ))
}

/// HTTP object store client (bucket REST API, privileged service credential).
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    credential: String,
}

impl HttpObjectStorage {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            credential: credential.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    fn sign_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    async fn put_object(
        &self,
        method: reqwest::Method,
        url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<reqwest::StatusCode> {
        let response = self
            .client
            .request(method, url)
            .bearer_auth(&self.credential)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::storage(format!("Upload failed for {}: {}", url, e)))?;
        Ok(response.status())
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_url(path);

        let status = self
            .put_object(reqwest::Method::POST, &url, bytes.clone(), content_type)
            .await?;
        if status.is_success() {
            return Ok(());
        }

        if status != reqwest::StatusCode::CONFLICT {
            return Err(Error::storage(format!(
                "Upload failed for {}: HTTP {}",
                path, status
            )));
        }

        // Duplicate object: try update, then delete-and-reupload.
        warn!(path, "Duplicate object on upload; attempting update");
        let status = self
            .put_object(reqwest::Method::PUT, &url, bytes.clone(), content_type)
            .await?;
        if status.is_success() {
            return Ok(());
        }

        self.remove(std::slice::from_ref(&path.to_string())).await?;
        let status = self
            .put_object(reqwest::Method::POST, &url, bytes, content_type)
            .await?;
        if status.is_success() {
            return Ok(());
        }

        Err(Error::storage(format!(
            "Upload failed for {} after delete-and-reupload: HTTP {}",
            path, status
        )))
    }

    async fn create_signed_url(&self, path: &str, ttl_secs: u64) -> Result<String> {
        let response = self
            .client
            .post(self.sign_url(path))
            .bearer_auth(&self.credential)
            .json(&serde_json::json!({ "expiresIn": ttl_secs }))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| Error::storage(format!("Sign request failed for {}: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "Sign request failed for {}: HTTP {}",
                path,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::storage(format!("Sign response read failed: {}", e)))?;

        resolve_signed_url(&body, &format!("{}/storage/v1", self.base_url))
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            let response = self
                .client
                .delete(self.object_url(path))
                .bearer_auth(&self.credential)
                .timeout(Duration::from_secs(30))
                .send()
                .await
                .map_err(|e| Error::storage(format!("Delete failed for {}: {}", path, e)))?;
            if !response.status().is_success()
                && response.status() != reqwest::StatusCode::NOT_FOUND
            {
                warn!(path, status = %response.status(), "Object delete returned non-success");
            }
        }
        Ok(())
    }
}
