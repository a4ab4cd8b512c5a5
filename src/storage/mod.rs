//! Document fetching: resolve a storage key to the uploaded file's bytes.


use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::http::{HttpClient, join_url};
use crate::{Result, StemError};

/// Source of previously uploaded documents, addressed by storage key.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Download the document stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Supabase Storage bucket accessed with a service-role key.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base_url: String,
    bucket: String,
    service_key: String,
    client: HttpClient,
}

impl SupabaseStorage {
    #[inline]
    pub fn new(base_url: &str, bucket: &str, service_key: &str, client: HttpClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
            client,
        }
    }

    fn object_url(&self, key: &str) -> String {
        join_url(
            &self.base_url,
            &["storage/v1/object", &self.bucket, key.trim_start_matches('/')],
        )
    }

    fn download_blocking(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(key);
        debug!("Downloading {} from bucket {}", key, self.bucket);

        let response = self
            .client
            .execute("supabase storage download", |agent| {
                agent
                    .get(url.as_str())
                    .header("Authorization", &format!("Bearer {}", self.service_key))
                    .header("apikey", &self.service_key)
                    .call()
            })
            .map_err(|e| StemError::Storage(e.upstream_message()))?;

        Ok(response.body)
    }
}

#[async_trait]
impl DocumentSource for SupabaseStorage {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let this = self.clone();
        let key = key.to_string();
        let bytes = tokio::task::spawn_blocking(move || this.download_blocking(&key))
            .await
            .map_err(|e| StemError::Storage(format!("Download task failed: {}", e)))??;

        info!("Downloaded {} bytes from Supabase Storage", bytes.len());
        Ok(bytes)
    }
}

/// Documents stored as files beneath a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage key to a path under the root, rejecting keys that escape it.
    #[inline]
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let mut resolved = self.root.clone();

        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StemError::InvalidInput(format!(
                        "Storage key '{}' must be a relative path inside the bucket",
                        key
                    )));
                }
            }
        }

        if resolved == self.root {
            return Err(StemError::InvalidInput(format!(
                "Storage key '{}' does not name a file",
                key
            )));
        }

        Ok(resolved)
    }

    /// Store `bytes` under `key`, creating parent directories.
    #[inline]
    pub async fn store(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

#[async_trait]
impl DocumentSource for LocalStorage {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        debug!("Reading document from {}", path.display());

        tokio::fs::read(&path).await.map_err(|e| {
            StemError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })
    }
}
