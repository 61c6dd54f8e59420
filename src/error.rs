use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity sdk init rejected: {0}")]
    Init(String),
    #[error("viewer profile unavailable: {0}")]
    Profile(String),
    #[error("identity platform returned status {0}")]
    Status(StatusCode),
    #[error("identity platform request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<url::ParseError> for IdentityError {
    fn from(err: url::ParseError) -> Self {
        IdentityError::Init(format!("invalid identity api url: {err}"))
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("content endpoint returned status {0}")]
    Status(StatusCode),
    #[error("content endpoint rejected the request: {}", .0.as_deref().unwrap_or("no message"))]
    Rejected(Option<String>),
    #[error("content request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("content response is not a valid envelope: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Everything that can abort a consultation submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("consultation text is empty")]
    EmptyText,
    #[error("viewer identity is not available")]
    MissingViewer,
    #[error("submission endpoint returned status {status}{}", detail_suffix(.detail))]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("submission rejected: {}", .0.as_deref().unwrap_or("no message"))]
    Rejected(Option<String>),
    #[error("submission request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("submission payload could not be encoded or decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("external handoff failed: {0}")]
    Handoff(#[from] IdentityError),
}

impl SubmitError {
    /// Validation failures are reported to the viewer verbatim; everything else collapses.
    pub fn is_validation(&self) -> bool {
        matches!(self, SubmitError::EmptyText | SubmitError::MissingViewer)
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}
