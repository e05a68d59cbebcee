//! Google Drive v3 HTTP client
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Uploads go
//! through the multipart endpoint so metadata (name, parent folder) and
//! content land in one request.

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;

use super::folders::sanitize_folder_name;
use super::{ObjectStore, StoredObject};
use crate::gmail::GoogleAuth;

/// Upload failure; the caller must not record an attachment for it
#[derive(Debug, thiserror::Error)]
#[error("Upload of {filename} failed: {reason}")]
pub struct UploadError {
    pub filename: String,
    pub reason: String,
}

/// Drive API client for one account
pub struct DriveClient {
    auth: GoogleAuth,
    root_folder_name: String,
}

/// Response from a file listing
#[derive(Debug, Deserialize)]
struct FileList {
    files: Option<Vec<FileRef>>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

/// Response from a file create or upload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    id: String,
    web_view_link: Option<String>,
}

impl DriveClient {
    /// Drive API base URL
    const BASE_URL: &'static str = "https://www.googleapis.com/drive/v3";

    /// Multipart upload endpoint
    const UPLOAD_URL: &'static str =
        "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart&fields=id,webViewLink";

    /// MIME type marking a Drive file as a folder
    const FOLDER_MIME_TYPE: &'static str = "application/vnd.google-apps.folder";

    /// Create a new Drive client
    pub fn new(auth: GoogleAuth, root_folder_name: impl Into<String>) -> Self {
        Self {
            auth,
            root_folder_name: root_folder_name.into(),
        }
    }

    /// Search for a folder by exact name, returning its locator if present
    fn find_folder(&self, access_token: &str, name: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            name.replace('\'', "\\'"),
            Self::FOLDER_MIME_TYPE
        );
        let url = format!(
            "{}/files?q={}&fields=files(id)&pageSize=1",
            Self::BASE_URL,
            urlencoding::encode(&query)
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send folder search request")?;

        let list: FileList = response
            .body_mut()
            .read_json()
            .context("Failed to parse folder search response")?;

        Ok(list.files.unwrap_or_default().into_iter().next().map(|f| f.id))
    }

    /// Create a folder, optionally under a parent
    fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": Self::FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let url = format!("{}/files?fields=id", Self::BASE_URL);
        let mut response = ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_json(metadata)
            .context("Failed to send folder create request")?;

        let file: FileRef = response
            .body_mut()
            .read_json()
            .context("Failed to parse folder create response")?;

        Ok(file.id)
    }

    /// Grant world-readable access to an uploaded file
    fn grant_public_read(&self, access_token: &str, file_id: &str) -> Result<()> {
        let url = format!("{}/files/{}/permissions", Self::BASE_URL, file_id);

        ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_json(serde_json::json!({ "role": "reader", "type": "anyone" }))
            .context("Failed to send permission request")?;

        Ok(())
    }
}

impl ObjectStore for DriveClient {
    /// Find or create the configured root folder
    ///
    /// Concurrent callers can race past the search and both create; the
    /// next call finds one of them, and a duplicate folder is harmless.
    fn ensure_root_folder(&self) -> Result<String> {
        let access_token = self.auth.get_access_token()?;

        if let Some(existing) = self.find_folder(&access_token, &self.root_folder_name)? {
            return Ok(existing);
        }

        self.create_folder(&access_token, &self.root_folder_name, None)
    }

    /// Create a sanitized subfolder, falling back to the parent on failure
    fn create_subfolder(&self, parent: &str, name: &str) -> Result<String> {
        let access_token = self.auth.get_access_token()?;
        let sanitized = sanitize_folder_name(name);

        match self.create_folder(&access_token, &sanitized, Some(parent)) {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(
                    "Failed to create subfolder {:?}, falling back to parent: {}",
                    sanitized, e
                );
                Ok(parent.to_string())
            }
        }
    }

    fn upload(
        &self,
        folder: &str,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject> {
        let access_token = self.auth.get_access_token()?;

        let metadata = serde_json::json!({ "name": filename, "parents": [folder] });
        let boundary = make_boundary();
        let body = build_multipart_body(&metadata, content_type, bytes, &boundary);

        let response = ureq::post(Self::UPLOAD_URL)
            .header("Authorization", &format!("Bearer {}", access_token))
            .header(
                "Content-Type",
                &format!("multipart/related; boundary={}", boundary),
            )
            .send(&body[..]);

        let mut response = match response {
            Ok(resp) => resp,
            Err(e) => {
                return Err(UploadError {
                    filename: filename.to_string(),
                    reason: format!("store rejected the write: {}", e),
                }
                .into());
            }
        };

        let uploaded: UploadedFile = match response.body_mut().read_json() {
            Ok(file) => file,
            Err(e) => {
                return Err(UploadError {
                    filename: filename.to_string(),
                    reason: format!("unreadable upload response: {}", e),
                }
                .into());
            }
        };

        if let Err(e) = self.grant_public_read(&access_token, &uploaded.id) {
            return Err(UploadError {
                filename: filename.to_string(),
                reason: format!("permission grant failed: {}", e),
            }
            .into());
        }

        let link = uploaded
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", uploaded.id));

        Ok(StoredObject {
            id: uploaded.id,
            link,
        })
    }
}

/// Build a multipart/related request body for a metadata + content upload
fn build_multipart_body(
    metadata: &serde_json::Value,
    content_type: &str,
    bytes: &[u8],
    boundary: &str,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Generate a boundary unlikely to collide with part content
fn make_boundary() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    format!("mailstash-{:016x}", hasher.finish())
}
