use ig_core::{GenerationRequest, JobHandle};
use crate::error::{SubmissionError, TransportError};
use super::backend::schemas::JobCreateResponse;
use super::backend::Transport;

pub struct JobSubmitter<'a> {
    transport: &'a dyn Transport,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Enqueues `request` on the backend.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle, SubmissionError> {
        let body = serde_json::to_value(request).map_err(SubmissionError::Encode)?;
        log::info!(
            "Submitting {} job (model {}, {} steps)",
            request.mode(),
            request.model(),
            request.steps()
        );

        let value = self.transport.post_json("/generate", body).await?;
        let resp: JobCreateResponse = serde_json::from_value(value)
            .map_err(|e| SubmissionError::Transport(TransportError::Decode(e)))?;

        if !resp.success {
            return Err(SubmissionError::Rejected(
                resp.error
                    .or(resp.message)
                    .unwrap_or_else(|| "generation request was not accepted".into()),
            ));
        }

        let handle = resp
            .prompt_id
            .filter(|id| !id.is_empty())
            .map(JobHandle::new)
            .ok_or_else(|| SubmissionError::Rejected("response carries no prompt_id".into()))?;
        log::info!("Job {handle} queued");
        Ok(handle)
    }
}
