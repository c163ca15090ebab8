use serde::{Deserialize, Serialize};
use crate::request::GenerationSettings;

/// Kind of weights file the backend reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Checkpoint,
    Lora,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ModelKind,
}

impl ModelInfo {
    pub fn checkpoint(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Checkpoint,
        }
    }

    /// Name without the weights extension, for display.
    pub fn display_name(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name)
    }
}

const DEFAULT_MODELS: [&str; 2] = [
    "v1-5-pruned-emaonly.safetensors",
    "flux_schnell.safetensors",
];

const DEFAULT_SAMPLERS: [&str; 15] = [
    "euler", "euler_ancestral", "euler_cfg_pp",
    "heun", "heunpp2",
    "dpm_2", "dpm_2_ancestral", "dpm_fast",
    "dpmpp_2s_ancestral", "dpmpp_2m", "dpmpp_2m_sde",
    "lms", "ddim", "ddpm", "uni_pc",
];

const DEFAULT_SCHEDULERS: [&str; 9] = [
    "normal", "karras", "exponential",
    "sgm_uniform", "simple", "ddim_uniform",
    "beta", "linear", "cosine",
];

/// Read-only lists the generation forms choose from. Built once and passed
/// by reference to whoever builds requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub models: Vec<ModelInfo>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
    pub loras: Vec<ModelInfo>,
}

impl Catalog {
    pub fn new(
        models: Vec<ModelInfo>,
        samplers: Vec<String>,
        schedulers: Vec<String>,
        loras: Vec<ModelInfo>,
    ) -> Self {
        Self {
            models,
            samplers,
            schedulers,
            loras,
        }
    }

    /// Lists used when the backend cannot be asked.
    pub fn builtin() -> Self {
        Self {
            models: Self::builtin_models(),
            samplers: Self::builtin_samplers(),
            schedulers: Self::builtin_schedulers(),
            loras: Vec::new(),
        }
    }

    pub fn builtin_models() -> Vec<ModelInfo> {
        DEFAULT_MODELS.iter().map(|m| ModelInfo::checkpoint(*m)).collect()
    }

    pub fn builtin_samplers() -> Vec<String> {
        DEFAULT_SAMPLERS.iter().map(|s| s.to_string()).collect()
    }

    pub fn builtin_schedulers() -> Vec<String> {
        DEFAULT_SCHEDULERS.iter().map(|s| s.to_string()).collect()
    }

    pub fn default_model(&self) -> Option<&str> {
        self.models.first().map(|m| m.name.as_str())
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name == name)
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.samplers.iter().any(|s| s == name)
    }

    pub fn has_scheduler(&self, name: &str) -> bool {
        self.schedulers.iter().any(|s| s == name)
    }

    /// Choices in `settings` this catalog does not list, as `(field, value)`.
    /// The backend may still accept them, so callers only warn.
    pub fn unlisted<'a>(&self, settings: &'a GenerationSettings) -> Vec<(&'static str, &'a str)> {
        let mut unlisted = Vec::new();
        if !settings.model.is_empty() && !self.has_model(&settings.model) {
            unlisted.push(("model", settings.model.as_str()));
        }
        if !self.has_sampler(&settings.sampler_name) {
            unlisted.push(("sampler_name", settings.sampler_name.as_str()));
        }
        if !self.has_scheduler(&settings.scheduler) {
            unlisted.push(("scheduler", settings.scheduler.as_str()));
        }
        unlisted
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
