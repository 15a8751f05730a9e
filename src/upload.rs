use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::UploadError;

/// True iff `filename` has a dot and its last suffix, lower-cased, is in
/// `allowed`. No content sniffing.
pub fn is_allowed(filename: &str, allowed: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            allowed.iter().any(|allowed| *allowed == ext)
        }
        None => false,
    }
}

/// Reduces an uploaded filename to a safe basename.
///
/// Non-ASCII characters and anything outside `[A-Za-z0-9._-]` are dropped,
/// path separators and whitespace become `_`, and leading or trailing `.`
/// and `_` are trimmed, so the result can never climb out of the upload
/// directory.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Presence, extension and sanitization checks for an uploaded file name.
/// Returns the name to store the file under.
pub fn validate_filename(filename: Option<&str>, allowed: &[String]) -> Result<String, UploadError> {
    let filename = match filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(UploadError::EmptyFilename),
    };

    if !is_allowed(filename, allowed) {
        return Err(UploadError::InvalidFormat);
    }

    let sanitized = sanitize_filename(filename);
    if !is_allowed(&sanitized, allowed) {
        return Err(UploadError::InvalidFormat);
    }

    Ok(sanitized)
}

/// The directory uploaded images are stored in.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
    allowed_extensions: Vec<String>,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>, allowed_extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            allowed_extensions,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Path of a stored upload. `name` must already be sanitized.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Stores `bytes` under a fresh name derived from the sanitized `name`.
    /// Existing files are never overwritten.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<StoredUpload, UploadError> {
        let stored_name = format!("{}_{name}", Uuid::new_v4().simple());
        let path = self.path_for(&stored_name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let stored = StoredUpload {
            name: stored_name,
            path,
        };

        if let Err(err) = file.write_all(bytes).await {
            drop(file);
            stored.discard().await;
            return Err(err.into());
        }
        file.flush().await?;

        info!("Saved upload {} ({} bytes)", stored.path.display(), bytes.len());
        Ok(stored)
    }
}

/// An upload written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub name: String,
    pub path: PathBuf,
}

impl StoredUpload {
    pub fn url(&self) -> String {
        format!("/uploads/{}", self.name)
    }

    /// Best-effort removal after a failed request.
    pub async fn discard(&self) {
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            warn!("Failed to remove {}: {err}", self.path.display());
        }
    }
}

pub async fn ensure_upload_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        info!("Creating upload directory {}", path.display());
    }
    tokio::fs::create_dir_all(path).await
}

/// Content type for a stored image, from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
