use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-issued identifier (`prompt_id`) keying every status and history query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    Starting,
    Pending,
    Running,
    Completed,
    Error,
    /// The backend does not see the job in its queue or history yet.
    NotFound,
}

impl StatusTag {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status snapshot. Progress only exists while running, the queue
/// position only while pending and the error message only on `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub tag: StatusTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    /// Builds a snapshot from loosely-typed backend fields, dropping whatever
    /// does not belong to `tag` and clamping progress into `0..=1`.
    pub fn new(
        tag: StatusTag,
        progress: Option<f64>,
        queue_position: Option<i64>,
        error: Option<String>,
    ) -> Self {
        let progress = match tag {
            StatusTag::Running => progress
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 1.0) as f32),
            _ => None,
        };
        let queue_position = match tag {
            StatusTag::Pending => queue_position
                .filter(|p| *p >= 0)
                .map(|p| u32::try_from(p).unwrap_or(u32::MAX)),
            _ => None,
        };
        let error = match tag {
            StatusTag::Error => error,
            _ => None,
        };

        Self {
            tag,
            progress,
            queue_position,
            error,
        }
    }

    pub fn starting() -> Self {
        Self::new(StatusTag::Starting, None, None, None)
    }

    pub fn pending(queue_position: u32) -> Self {
        Self::new(StatusTag::Pending, None, Some(queue_position.into()), None)
    }

    pub fn running(progress: f32) -> Self {
        Self::new(StatusTag::Running, Some(progress.into()), None, None)
    }

    pub fn completed() -> Self {
        Self::new(StatusTag::Completed, None, None, None)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StatusTag::Error, None, None, Some(message.into()))
    }

    pub fn is_terminal(&self) -> bool {
        self.tag.is_terminal()
    }

    /// Human-readable one-liner for progress displays.
    pub fn describe(&self) -> String {
        match (self.tag, self.progress, self.queue_position, &self.error) {
            (StatusTag::Running, Some(p), _, _) => format!("running {:.0}%", p * 100.0),
            (StatusTag::Pending, _, Some(pos), _) => format!("pending (queue position {pos})"),
            (StatusTag::Error, _, _, Some(message)) => format!("error: {message}"),
            (tag, ..) => tag.to_string(),
        }
    }
}

/// A finished output, addressable through `reference`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub reference: String,
    pub filename: String,
    /// Everything else the backend reported for this output (subfolder, type, node id...).
    pub metadata: Map<String, Value>,
}
