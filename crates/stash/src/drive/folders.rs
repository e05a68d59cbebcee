//! Folder naming and placement policy for uploaded attachments

use anyhow::Result;
use super::ObjectStore;

/// Maximum folder name length in characters
const MAX_FOLDER_NAME_CHARS: usize = 100;

/// Folder name used when sanitization leaves nothing behind
const FALLBACK_FOLDER_NAME: &str = "attachments";

/// Sanitize a string for use as a folder name
///
/// Strips characters illegal in folder names plus non-whitespace control
/// characters, collapses runs of whitespace (tabs and newlines included)
/// to single spaces, and truncates to 100 characters. An empty result
/// becomes a fixed placeholder name.
pub fn sanitize_folder_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
                && (!c.is_control() || c.is_whitespace())
        })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_FOLDER_NAME_CHARS).collect();

    let trimmed = truncated.trim();
    if trimmed.is_empty() {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Choose the destination folder for one message's attachments
///
/// A single attachment goes straight into the root folder. Multiple
/// attachments get a subfolder named after the message subject, so the
/// root does not silt up with loose files. Subjects are not deduplicated;
/// two messages with the same subject get two subfolders.
pub fn pick_target_folder(
    objects: &dyn ObjectStore,
    subject: &str,
    attachment_count: usize,
) -> Result<String> {
    let root = objects.ensure_root_folder()?;

    if attachment_count <= 1 {
        return Ok(root);
    }

    objects.create_subfolder(&root, subject)
}
