use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use vault_router::NoteStoreError;

/// Error returned by a route: a status and a `detail` message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Invalid API key")
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl From<NoteStoreError> for ApiError {
    fn from(err: NoteStoreError) -> Self {
        match err {
            NoteStoreError::VaultMissing(_) => ApiError::internal("VAULT_ROOT not found"),
            NoteStoreError::PathTraversal(_) => ApiError::bad_request(err.to_string()),
            NoteStoreError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "Note not found"),
            NoteStoreError::SectionNotFound(section) => {
                ApiError::new(StatusCode::NOT_FOUND, format!("Section not found: {}", section))
            }
            NoteStoreError::Io { .. } => {
                tracing::error!(error = %err, "Vault read failed");
                ApiError::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
