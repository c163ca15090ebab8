use std::sync::Arc;
use ig_core::{
    Catalog, GeneratedImage, GenerationRequest, GenerationSettings, JobStatus,
    MaskEncoder, StatusTag, UploadedImage,
};
use tokio_util::sync::CancellationToken;
use crate::config::ClientConfig;
use crate::error::{AppError, TransportError};
use crate::events::GenEvent;
use crate::registry::{JobGuard, JobRegistry, SessionId};
use backend::push::PushChannel;
use backend::schemas::HealthResponse;
use backend::{HttpTransport, Transport};
use poller::StatusPoller;
use resolver::ResultResolver;
use submit::JobSubmitter;
use upload::UploadGateway;

pub mod backend;
pub mod catalog;
pub mod poller;
pub mod resolver;
pub mod submit;
pub mod upload;
#[cfg(test)]
pub(crate) mod testing;

/// How a running job's status reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusSource {
    #[default]
    Polling,
    /// The `/ws` push channel, opened before submission so no update is missed.
    Push,
}

/// Drives jobs from validated settings to resolved images.
pub struct Generator {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    registry: JobRegistry,
    status_source: StatusSource,
}

impl Generator {
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let transport = HttpTransport::new(&config).map_err(AppError::Client)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            registry: JobRegistry::new(),
            status_source: StatusSource::default(),
        }
    }

    pub fn with_status_source(mut self, source: StatusSource) -> Self {
        self.status_source = source;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub async fn health(&self) -> Result<HealthResponse, TransportError> {
        let value = self.transport.get_json("/health").await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn load_catalog(&self) -> Catalog {
        catalog::load_catalog(self.transport.as_ref()).await
    }

    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedImage, AppError> {
        Ok(UploadGateway::new(self.transport.as_ref()).upload(file_name, bytes).await?)
    }

    pub async fn fetch_preview(&self, image: &GeneratedImage) -> Result<Vec<u8>, AppError> {
        Ok(ResultResolver::new(self.transport.as_ref()).fetch_preview(image).await?)
    }

    /// Validates, submits, follows and resolves one job for `session`.
    ///
    /// Validation happens before anything touches the network. The session
    /// counts as running from submission until this returns, whatever the
    /// outcome, and every outcome is also reported through `on_event`.
    #[tracing::instrument(skip_all, fields(session = %session, mode = %settings.mode))]
    pub async fn run(
        &self,
        session: SessionId,
        settings: &GenerationSettings,
        mask: Option<&MaskEncoder>,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(GenEvent) + Send,
    ) -> Result<Vec<GeneratedImage>, AppError> {
        let request = match GenerationRequest::build(settings, mask) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Request rejected before submission: {e}");
                on_event(GenEvent::Failed {
                    handle: None,
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let guard = self.registry.claim(session, request.mode())?;
        let result = self.drive(&guard, &request, cancel, &mut on_event).await;

        match &result {
            Ok(images) => {
                log::info!(
                    "Job finished in {}s with {} image(s)",
                    guard.elapsed_secs(),
                    images.len()
                );
            }
            Err(e) => {
                log::error!("Job abandoned after {}s: {e}", guard.elapsed_secs());
                on_event(GenEvent::Failed {
                    handle: guard.handle(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        guard: &JobGuard,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        on_event: &mut (dyn FnMut(GenEvent) + Send),
    ) -> Result<Vec<GeneratedImage>, AppError> {
        let mut channel = match self.status_source {
            StatusSource::Polling => None,
            StatusSource::Push => {
                let url = self.config.push_url();
                let connected = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    connected = PushChannel::connect(&url, self.config.timeout) => connected,
                };
                Some(connected.map_err(AppError::PushChannel)?)
            }
        };

        let handle = JobSubmitter::new(self.transport.as_ref()).submit(request).await?;
        guard.set_handle(handle.clone());
        on_event(GenEvent::Submitted(handle.clone()));

        let observer = |status: &JobStatus| {
            on_event(GenEvent::Status {
                handle: handle.clone(),
                status: status.clone(),
            })
        };
        let last = match channel.as_mut() {
            Some(channel) => channel.follow(&handle, cancel, observer).await?,
            None => {
                StatusPoller::new(self.transport.as_ref(), self.config.poll_interval)
                    .poll(&handle, cancel, observer)
                    .await?
            }
        };

        if last.tag == StatusTag::Error {
            return Err(AppError::JobFailed {
                handle,
                message: last.error.unwrap_or_else(|| "generation failed".into()),
            });
        }

        let images = ResultResolver::new(self.transport.as_ref())
            .resolve(&handle, &last)
            .await?;
        on_event(GenEvent::Completed {
            handle: handle.clone(),
            images: images.clone(),
        });
        Ok(images)
    }

    /// Whether `session` currently has a job in flight.
    pub fn is_running(&self, session: SessionId) -> bool {
        self.registry.is_running(session)
    }
}
