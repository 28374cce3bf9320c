//! HTTP upload endpoint.
//!
//! A multipart form carries the file plus the `sessionId` and `remotePath`
//! fields. The file is staged on local disk, relayed over the session's SFTP
//! channel, and the staged copy removed whatever the outcome.

use std::path::{Path, PathBuf};

use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webssh_core::SessionError;

use crate::websocket::AppState;

/// Content types accepted when none are configured.
pub const DEFAULT_ALLOWED_TYPES: [&str; 4] = [
    "text/plain",
    "text/html",
    "application/javascript",
    "application/json",
];

/// Limits applied to uploaded files.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Largest accepted file in bytes.
    pub max_size: u64,
    /// Accepted MIME types, compared without parameters.
    pub allowed_types: Vec<String>,
    /// Where files are staged before the relay.
    pub upload_dir: PathBuf,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(ToString::to_string).collect(),
            upload_dir: PathBuf::from("./uploads"),
        }
    }
}

impl UploadPolicy {
    /// Whether a declared content type may be uploaded.
    #[must_use]
    pub fn allows(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        self.allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    }
}

/// Upload endpoint error.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file provided")]
    MissingFile,
    #[error("Invalid request parameters")]
    InvalidRequest,
    #[error("Malformed upload: {0}")]
    Malformed(String),
    #[error("File exceeds the {0} byte limit")]
    TooLarge(u64),
    #[error("File type not allowed: {0}")]
    UnsupportedType(String),
    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
    #[error(transparent)]
    Relay(SessionError),
}

impl UploadError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile
            | Self::InvalidRequest
            | Self::Malformed(_)
            | Self::Relay(SessionError::Validation(_) | SessionError::NotConnected) => {
                StatusCode::BAD_REQUEST
            }
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Staging(_) | Self::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// A file written to the staging directory.
struct Staged {
    path: PathBuf,
    file_name: String,
}

/// `POST /upload` handler.
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, UploadError> {
    let mut session_id = None;
    let mut remote_path = None;
    let mut staged: Option<Staged> = None;

    let result = read_form(
        &state,
        multipart,
        &mut session_id,
        &mut remote_path,
        &mut staged,
    )
    .await;

    let outcome = match (result, &staged) {
        (Err(e), _) => Err(e),
        (Ok(()), None) => Err(UploadError::MissingFile),
        (Ok(()), Some(file)) => match (session_id.as_deref(), remote_path.as_deref()) {
            (Some(session_id), Some(remote_dir)) if !session_id.is_empty() => state
                .manager
                .upload_file(session_id, &file.path, remote_dir, &file.file_name)
                .await
                .map_err(UploadError::Relay),
            _ => Err(UploadError::InvalidRequest),
        },
    };

    if let Some(file) = &staged {
        if let Err(e) = fs::remove_file(&file.path).await {
            warn!(path = %file.path.display(), "Failed to remove staged upload: {e}");
        }
    }

    let remote = outcome?;
    info!(path = %remote, "Upload relayed");
    Ok(Json(json!({
        "success": true,
        "message": "File uploaded successfully",
    })))
}

async fn read_form(
    state: &AppState,
    mut multipart: Multipart,
    session_id: &mut Option<String>,
    remote_path: &mut Option<String>,
    staged: &mut Option<Staged>,
) -> Result<(), UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Malformed(e.to_string()))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("sessionId") => *session_id = Some(text(field).await?),
            Some("remotePath") => *remote_path = Some(text(field).await?),
            Some("file") if staged.is_none() => stage(&state.uploads, field, staged).await?,
            other => debug!(field = ?other, "Ignoring upload form field"),
        }
    }
    Ok(())
}

async fn text(field: Field<'_>) -> Result<String, UploadError> {
    field
        .text()
        .await
        .map_err(|e| UploadError::Malformed(e.to_string()))
}

/// Write the file field to the staging directory, enforcing the policy.
///
/// `slot` is filled as soon as the staging file exists so the caller can
/// remove it on failure.
async fn stage(
    policy: &UploadPolicy,
    mut field: Field<'_>,
    slot: &mut Option<Staged>,
) -> Result<(), UploadError> {
    let file_name = field
        .file_name()
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .ok_or(UploadError::MissingFile)?;

    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    if !policy.allows(&content_type) {
        return Err(UploadError::UnsupportedType(content_type));
    }

    fs::create_dir_all(&policy.upload_dir).await?;
    let path = policy.upload_dir.join(Uuid::new_v4().to_string());
    let mut file = fs::File::create(&path).await?;
    *slot = Some(Staged {
        path,
        file_name: file_name.clone(),
    });

    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| UploadError::Malformed(e.to_string()))?
    {
        written += chunk.len() as u64;
        if written > policy.max_size {
            return Err(UploadError::TooLarge(policy.max_size));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    debug!(file_name = %file_name, bytes = written, "Staged upload");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_types_ignore_parameters() {
        let policy = UploadPolicy::default();
        assert!(policy.allows("text/plain"));
        assert!(policy.allows("text/plain; charset=utf-8"));
        assert!(policy.allows("Application/JSON"));
        assert!(!policy.allows("application/x-executable"));
        assert!(!policy.allows(""));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(UploadError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(UploadError::TooLarge(1).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            UploadError::UnsupportedType("image/png".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            UploadError::Relay(SessionError::NotConnected).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::Relay(SessionError::Channel("gone".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
