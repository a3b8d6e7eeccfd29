use log::{debug, info};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;

// Version part of the wallet file names
pub const STORAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("error while reading wallets from '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error while writing wallets to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("wallet blob #{0} contains a line break")]
    InvalidBlob(usize),
}

// Wallet blobs of a single worker, one per line
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new<P: AsRef<Path>>(dir: P, worker: usize) -> Self {
        let path = dir
            .as_ref()
            .join(format!("worker#{}-{}.bin", worker, STORAGE_VERSION));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Blobs previously saved, empty if the file doesn't exist
    pub async fn load(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No wallets saved in {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let blobs: Vec<Vec<u8>> = data
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(<[u8]>::to_vec)
            .collect();

        info!("{} wallets loaded from {}", blobs.len(), self.path.display());
        Ok(blobs)
    }

    // Replace the file content with these blobs
    pub async fn save(&self, blobs: &[Vec<u8>]) -> Result<(), StorageError> {
        let mut data = Vec::new();
        for (i, blob) in blobs.iter().enumerate() {
            if blob.contains(&b'\n') {
                return Err(StorageError::InvalidBlob(i));
            }
            data.extend_from_slice(blob);
            data.push(b'\n');
        }

        let write_error = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await.map_err(write_error)?;
        }
        fs::write(&self.path, data).await.map_err(write_error)?;

        info!("{} wallets saved in {}", blobs.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = WalletStore::new(dir.path(), 0);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = WalletStore::new(dir.path().join("wallets"), 2);
        assert!(store.path().ends_with(format!("worker#2-{}.bin", STORAGE_VERSION)));

        let blobs = vec![b"first".to_vec(), b"second".to_vec()];
        store.save(&blobs).await.unwrap();
        assert_eq!(store.load().await.unwrap(), blobs);

        // rewriting replaces the previous content
        store.save(&blobs[1..]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec![b"second".to_vec()]);
    }

    #[tokio::test]
    async fn test_reject_multiline_blob() {
        let dir = tempdir().unwrap();
        let store = WalletStore::new(dir.path(), 0);
        assert!(matches!(
            store.save(&[b"a\nb".to_vec()]).await,
            Err(StorageError::InvalidBlob(0))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_an_error() {
        let dir = tempdir().unwrap();
        // a directory where the file should be
        let store = WalletStore::new(dir.path(), 1);
        std::fs::create_dir_all(store.path()).unwrap();
        assert!(matches!(store.load().await, Err(StorageError::Read { .. })));
    }
}
