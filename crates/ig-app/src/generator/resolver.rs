use ig_core::{GeneratedImage, JobHandle, JobStatus, StatusTag};
use reqwest::Url;
use crate::error::{ResolutionError, TransportError};
use super::backend::schemas::HistoryResponse;
use super::backend::Transport;

pub struct ResultResolver<'a> {
    transport: &'a dyn Transport,
}

impl<'a> ResultResolver<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Maps the job's outputs to images, in the order the backend lists them.
    /// `last_status` must be the `completed` snapshot the poller ended on.
    pub async fn resolve(
        &self,
        handle: &JobHandle,
        last_status: &JobStatus,
    ) -> Result<Vec<GeneratedImage>, ResolutionError> {
        if last_status.tag != StatusTag::Completed {
            return Err(ResolutionError::Backend(format!(
                "job {handle} ended as {}, there is nothing to resolve",
                last_status.tag
            )));
        }

        let value = self.transport.get_json(&format!("/history/{handle}")).await?;
        let history: HistoryResponse = serde_json::from_value(value).map_err(TransportError::from)?;
        if let Some(error) = history.error {
            return Err(ResolutionError::Backend(error));
        }

        let images: Vec<GeneratedImage> = history
            .outputs
            .into_iter()
            .map(|entry| GeneratedImage {
                reference: self.transport.public_url(&preview_path(&entry.filename)),
                filename: entry.filename,
                metadata: entry.extra,
            })
            .collect();

        log::info!("Job {handle} produced {} image(s)", images.len());
        Ok(images)
    }

    /// Raw bytes of one generated image.
    pub async fn fetch_preview(&self, image: &GeneratedImage) -> Result<Vec<u8>, ResolutionError> {
        Ok(self.transport.get_bytes(&preview_path(&image.filename)).await?)
    }
}

/// `/preview/<filename>` with the filename percent-encoded as one path segment.
fn preview_path(filename: &str) -> String {
    match Url::parse("http://backend/preview") {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.push(filename);
            }
            url.path().to_string()
        }
        Err(_) => format!("/preview/{filename}"),
    }
}
