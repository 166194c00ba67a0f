//! File storage for rendered documents
//!
//! The core only ever deals in opaque URLs; where the bytes live is up to
//! the [`FileStore`] implementation.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use axum::async_trait;

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` under `key` and return the URL clients fetch it from
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn read(&self, key: &str) -> Result<Vec<u8>>;
}

/// Files under a local directory, served back from `/files/<key>`
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "/files".to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are relative paths; anything escaping the root is refused
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(anyhow!("invalid storage key '{}'", key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        tracing::debug!(key, content_type, size = bytes.len(), "File stored");
        Ok(format!("{}/{}", self.public_prefix, key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalFileStore {
        LocalFileStore::new(std::env::temp_dir().join(format!("talentdesk-{}", uuid::Uuid::new_v4())))
    }

    #[tokio::test]
    async fn test_put_then_read() {
        let store = temp_store();
        let url = store
            .put("documents/FACTURE-2025-0001.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(url, "/files/documents/FACTURE-2025-0001.pdf");
        assert_eq!(
            store.read("documents/FACTURE-2025-0001.pdf").await.unwrap(),
            b"%PDF".to_vec()
        );
        let _ = tokio::fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let store = temp_store();
        assert!(store.put("../etc/passwd", vec![], "text/plain").await.is_err());
        assert!(store.put("/abs", vec![], "text/plain").await.is_err());
        assert!(store.put("", vec![], "text/plain").await.is_err());
    }
}
