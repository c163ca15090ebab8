use ig_core::{GeneratedImage, JobHandle, JobStatus, UploadedImage};

/// Milestones of one job's lifecycle, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum GenEvent {
    Uploaded(UploadedImage),
    Submitted(JobHandle),
    Status {
        handle: JobHandle,
        status: JobStatus,
    },
    Completed {
        handle: JobHandle,
        images: Vec<GeneratedImage>,
    },
    Failed {
        handle: Option<JobHandle>,
        error: String,
    },
}

impl GenEvent {
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Self::Uploaded(_) => None,
            Self::Submitted(handle) => Some(handle),
            Self::Status { handle, .. } | Self::Completed { handle, .. } => Some(handle),
            Self::Failed { handle, .. } => handle.as_ref(),
        }
    }
}
