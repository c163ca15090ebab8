use ig_core::UploadedImage;
use image::ImageFormat;
use crate::error::UploadError;
use super::backend::schemas::UploadResponse;
use super::backend::{FilePart, Transport};

/// Sends a source image for img2img/inpainting to the backend.
pub struct UploadGateway<'a> {
    transport: &'a dyn Transport,
}

impl<'a> UploadGateway<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedImage, UploadError> {
        let mime = sniff_mime(&bytes)?;
        log::info!("Uploading {file_name} ({mime}, {} bytes)", bytes.len());

        let value = self
            .transport
            .post_file(
                "/upload",
                FilePart {
                    file_name: file_name.to_string(),
                    mime,
                    bytes,
                },
            )
            .await?;
        let resp: UploadResponse = serde_json::from_value(value).map_err(|e| {
            UploadError::Rejected(format!("unexpected upload response: {e}"))
        })?;

        if !resp.success {
            return Err(UploadError::Rejected(
                resp.error.unwrap_or_else(|| "upload was not accepted".into()),
            ));
        }

        match (resp.image, resp.width, resp.height) {
            (Some(reference), Some(width), Some(height)) => {
                log::info!("Upload accepted: {width}x{height}");
                Ok(UploadedImage {
                    reference,
                    width,
                    height,
                })
            }
            _ => Err(UploadError::Rejected(
                "response is missing the image reference or its size".into(),
            )),
        }
    }
}

/// Only PNG, JPEG and WEBP are accepted.
fn sniff_mime(bytes: &[u8]) -> Result<&'static str, UploadError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok("image/png"),
        Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(ImageFormat::WebP) => Ok("image/webp"),
        Ok(other) => Err(UploadError::UnsupportedContent(format!("{other:?}"))),
        Err(_) => Err(UploadError::UnsupportedContent("not a recognised image".into())),
    }
}
