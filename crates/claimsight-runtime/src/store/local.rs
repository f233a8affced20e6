use async_trait::async_trait;
use claimsight_core::EvidenceRef;
use std::path::{Path, PathBuf};

use super::{EvidenceStore, Locator, StoreError};

/// Reads `file://` locators and bare paths, optionally relative to a root.
#[derive(Debug, Default, Clone)]
pub struct LocalStore {
    root: Option<PathBuf>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root` instead of the working directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl EvidenceStore for LocalStore {
    async fn fetch(&self, evidence: &EvidenceRef) -> Result<Vec<u8>, StoreError> {
        let uri = match evidence {
            EvidenceRef::Inline { data, .. } => return Ok(data.clone()),
            EvidenceRef::Uri { uri, .. } => uri,
        };
        let Locator::File(path) = Locator::parse(uri)? else {
            return Err(StoreError::Unsupported(uri.clone()));
        };

        let path = self.resolve(&path);
        tracing::debug!(path = %path.display(), "Reading local evidence");

        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(uri.clone())
            } else {
                StoreError::Io {
                    locator: uri.clone(),
                    source,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "claimsight-local-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_relative_to_root() {
        let dir = temp_dir("root");
        std::fs::write(dir.join("scene.jpg"), b"jpeg-bytes").unwrap();

        let store = LocalStore::with_root(&dir);
        let bytes = store.fetch(&EvidenceRef::uri("scene.jpg")).await.unwrap();
        assert_eq!(bytes, b"jpeg-bytes");

        let absolute = format!("file://{}", dir.join("scene.jpg").display());
        let bytes = LocalStore::new()
            .fetch(&EvidenceRef::uri(absolute))
            .await
            .unwrap();
        assert_eq!(bytes, b"jpeg-bytes");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = temp_dir("missing");
        let err = LocalStore::with_root(&dir)
            .fetch(&EvidenceRef::uri("nope.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_refuses_remote_locators() {
        let err = LocalStore::new()
            .fetch(&EvidenceRef::uri("https://example.com/a.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
