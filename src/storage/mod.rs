//! Attachment blob storage.
//!
//! One file per attachment under `{uploads_root}/{case_id}/{attachment_id}.{ext}`.
//! Metadata lives in the database; this module only moves bytes.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// File storage manager
pub struct Storage {
    base_path: PathBuf,
}

impl Storage {
    /// Create a new storage manager rooted at the uploads directory.
    pub fn new(base_path: PathBuf) -> Self {
        // Ensure base directory exists
        std::fs::create_dir_all(&base_path).ok();
        Self { base_path }
    }

    /// The path an attachment blob lives at.
    pub fn attachment_path(&self, case_id: &str, attachment_id: &str, ext: &str) -> PathBuf {
        self.base_path
            .join(case_id)
            .join(format!("{}.{}", attachment_id, ext))
    }

    /// Store an attachment blob and return its hash and storage path.
    pub fn store_attachment(
        &self,
        case_id: &str,
        attachment_id: &str,
        ext: &str,
        data: &[u8],
    ) -> StorageResult<(String, PathBuf)> {
        let hash = Self::calculate_hash(data);

        let case_dir = self.base_path.join(case_id);
        std::fs::create_dir_all(&case_dir)?;

        let file_path = self.attachment_path(case_id, attachment_id, ext);
        std::fs::write(&file_path, data)?;

        log::info!("Stored attachment: {} ({})", file_path.display(), hash);

        Ok((hash, file_path))
    }

    /// Read a blob from storage.
    pub fn read_file(&self, storage_path: &Path) -> StorageResult<Vec<u8>> {
        if !storage_path.exists() {
            return Err(StorageError::NotFound(
                storage_path.to_string_lossy().to_string(),
            ));
        }
        Ok(std::fs::read(storage_path)?)
    }

    /// Delete a blob from storage. Missing files are not an error: the
    /// retention sweep may run twice over the same window.
    pub fn delete_file(&self, storage_path: &str) -> StorageResult<()> {
        let path = PathBuf::from(storage_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Calculate SHA256 hash of data
    pub fn calculate_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}
