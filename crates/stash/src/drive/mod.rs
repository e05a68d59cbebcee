//! Google Drive object store integration
//!
//! Attachments are mirrored into a Drive folder tree and shared with a
//! public read-only link. The `ObjectStore` trait is the seam the
//! ingestion pipeline talks to; `DriveClient` is the Drive v3
//! implementation.

mod client;
mod folders;

pub use client::{DriveClient, UploadError};
pub use folders::{pick_target_folder, sanitize_folder_name};

use anyhow::Result;

/// A successfully uploaded object
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Store-assigned object locator
    pub id: String,
    /// Public read-only link
    pub link: String,
}

/// Remote store for attachment bytes
pub trait ObjectStore: Send + Sync {
    /// Find or create the well-known root folder
    ///
    /// Idempotent: an existing folder with the configured name is reused.
    /// Concurrent callers may race to create it; a duplicate folder is a
    /// tolerable degradation, not an error.
    fn ensure_root_folder(&self) -> Result<String>;

    /// Create a subfolder under `parent` and return its locator
    ///
    /// Implementations sanitize the name. The Drive implementation falls
    /// back to returning `parent` when creation fails, so a batch is never
    /// lost to a folder error.
    fn create_subfolder(&self, parent: &str, name: &str) -> Result<String>;

    /// Upload bytes into `folder` and grant public read access
    ///
    /// Fails with [`UploadError`] when the store rejects the write or the
    /// permission grant fails. Callers must not record an attachment on
    /// that path.
    fn upload(
        &self,
        folder: &str,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject>;
}
