use std::time::Duration;
use ig_core::{JobHandle, ValidationError};
use serde_json::Value;
use thiserror::Error;
use crate::config::ConfigError;
use crate::registry::SessionId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("push channel: {0}")]
    Push(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Message the backend put in an error body (`error` or FastAPI's `detail`).
    pub fn backend_message(&self) -> Option<String> {
        let Self::Status { body, .. } = self else {
            return None;
        };
        let value: Value = serde_json::from_str(body).ok()?;
        match value.get("error").or_else(|| value.get("detail"))? {
            Value::String(message) => Some(message.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported image content: {0}")]
    UnsupportedContent(String),
    #[error("backend rejected the upload: {0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("could not encode the request: {0}")]
    Encode(serde_json::Error),
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for SubmissionError {
    fn from(err: TransportError) -> Self {
        match err.backend_message() {
            Some(message) => Self::Rejected(message),
            None => Self::Transport(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum PollingError {
    #[error("polling of job {0} was cancelled")]
    Cancelled(JobHandle),
    #[error("status query for job {handle} failed: {source}")]
    Transport {
        handle: JobHandle,
        #[source]
        source: TransportError,
    },
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("backend could not report results: {0}")]
    Backend(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error("polling failed: {0}")]
    Polling(#[from] PollingError),
    #[error("could not fetch results: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("job {handle} failed: {message}")]
    JobFailed { handle: JobHandle, message: String },
    #[error("session {0} already has a job running")]
    Busy(SessionId),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up the HTTP client: {0}")]
    Client(TransportError),
    #[error("could not open the push channel: {0}")]
    PushChannel(TransportError),
    #[error("cancelled before submission")]
    Cancelled,
}

impl AppError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Polling(PollingError::Cancelled(_)))
    }
}
