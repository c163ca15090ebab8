use ig_core::{JobStatus, ModelInfo, StatusTag};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCreateResponse {
    #[serde(default)]
    pub success: bool,
    pub prompt_id: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub status: StatusTag,
    /// Only numeric values count; the bridge may put the queued prompt graph here.
    #[serde(default, deserialize_with = "numeric_or_none")]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "integer_or_none")]
    pub queue_position: Option<i64>,
    pub error: Option<String>,
}

impl From<JobStatusResponse> for JobStatus {
    fn from(resp: JobStatusResponse) -> Self {
        JobStatus::new(resp.status, resp.progress, resp.queue_position, resp.error)
    }
}

fn numeric_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_f64())
}

fn integer_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_i64())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputEntry {
    pub filename: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryResponse {
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    pub image: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub api_version: Option<String>,
    pub comfyui_connected: Option<bool>,
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LorasResponse {
    pub loras: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplersResponse {
    pub samplers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulersResponse {
    pub schedulers: Vec<String>,
}
