use std::time::Duration;
use ig_core::{JobHandle, JobStatus, StatusTag};
use tokio_util::sync::CancellationToken;
use crate::error::{PollingError, TransportError};
use super::backend::schemas::JobStatusResponse;
use super::backend::Transport;

/// Where a job stands from the poller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Starting,
    Pending,
    Running,
    Completed,
    Error,
}

impl PollState {
    /// The reported tag decides the next state; `not_found` leaves it unchanged.
    pub fn advance(self, tag: StatusTag) -> Self {
        if self.is_terminal() {
            return self;
        }
        match tag {
            StatusTag::Starting => Self::Starting,
            StatusTag::Pending => Self::Pending,
            StatusTag::Running => Self::Running,
            StatusTag::Completed => Self::Completed,
            StatusTag::Error => Self::Error,
            StatusTag::NotFound => self,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Queries job status on a fixed interval until the job finishes.
/// One query is in flight at a time and the interval starts once its
/// response is in.
pub struct StatusPoller<'a> {
    transport: &'a dyn Transport,
    interval: Duration,
}

impl<'a> StatusPoller<'a> {
    pub fn new(transport: &'a dyn Transport, interval: Duration) -> Self {
        Self {
            transport,
            interval,
        }
    }

    /// Polls until `completed` or `error` and returns that terminal snapshot.
    /// `observer` sees every snapshot in the order the queries were issued.
    pub async fn poll(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
        mut observer: impl FnMut(&JobStatus) + Send,
    ) -> Result<JobStatus, PollingError> {
        let path = format!("/status/{handle}");
        let mut state = PollState::Starting;
        let mut ticks: u64 = 0;

        loop {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollingError::Cancelled(handle.clone())),
                response = self.transport.get_json(&path) => response,
            };
            ticks += 1;

            let status = response
                .and_then(|value| Ok(serde_json::from_value::<JobStatusResponse>(value)?))
                .map(JobStatus::from)
                .map_err(|source: TransportError| {
                    log::error!("Status query {ticks} for job {handle} failed: {source}");
                    PollingError::Transport {
                        handle: handle.clone(),
                        source,
                    }
                })?;

            log::debug!("Job {handle} tick {ticks}: {}", status.describe());
            observer(&status);

            let next = state.advance(status.tag);
            if next != state {
                log::info!("Job {handle}: {state:?} -> {next:?}");
                state = next;
            }
            if state.is_terminal() {
                return Ok(status);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollingError::Cancelled(handle.clone())),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
