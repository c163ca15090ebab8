pub mod push;
pub mod schemas;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use crate::config::ClientConfig;
use crate::error::TransportError;

/// A file sent as the `file` field of a multipart form.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// The only seam that reaches the network. Paths are relative to the
/// backend's `/api` base.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError>;

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, TransportError>;

    async fn post_file(&self, path: &str, file: FilePart) -> Result<Value, TransportError>;

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// Address of `path` as a display layer should reference it.
    fn public_url(&self, path: &str) -> String;
}

/// reqwest-backed transport with a fixed per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_base: String,
    public_base: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_base: config.api_base(),
            public_base: config.public_base(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn check(response: Response) -> Result<Response, TransportError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Ok(response)
    }

    async fn read_json(response: Response) -> Result<Value, TransportError> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        log::trace!("GET {path}");
        let response = self.client.get(self.url(path)).send().await?;
        Self::read_json(response).await
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        log::trace!("POST {path}");
        let response = self.client.post(self.url(path)).json(&body).send().await?;
        Self::read_json(response).await
    }

    async fn post_file(&self, path: &str, file: FilePart) -> Result<Value, TransportError> {
        log::trace!("POST {path} (multipart, {} bytes)", file.bytes.len());
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(file.mime)?;
        let form = Form::new().part("file", part);

        let response = self.client.post(self.url(path)).multipart(form).send().await?;
        Self::read_json(response).await
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        log::trace!("GET {path} (bytes)");
        let response = self.client.get(self.url(path)).send().await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base, path)
    }
}
