use std::fmt;
use serde::{Deserialize, Serialize};
use crate::catalog::Catalog;
use crate::error::ValidationError;
use crate::mask::MaskEncoder;

pub const DIMENSION_MIN: u32 = 64;
pub const DIMENSION_MAX: u32 = 2048;
pub const DIMENSION_STEP: u32 = 64;
pub const STEPS_MIN: u32 = 1;
pub const STEPS_MAX: u32 = 150;
pub const CFG_SCALE_MIN: f32 = 1.0;
pub const CFG_SCALE_MAX: f32 = 30.0;
pub const BATCH_SIZE_MIN: u32 = 1;
pub const BATCH_SIZE_MAX: u32 = 8;
/// Seed value asking the backend to pick a random seed.
pub const RANDOM_SEED: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Txt2img,
    Img2img,
    Inpaint,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt2img => "txt2img",
            Self::Img2img => "img2img",
            Self::Inpaint => "inpaint",
        }
    }

    pub fn needs_init_image(&self) -> bool {
        matches!(self, Self::Img2img | Self::Inpaint)
    }

    pub fn needs_mask(&self) -> bool {
        matches!(self, Self::Inpaint)
    }

    /// Denoising strength the settings start from for this mode.
    pub fn default_denoising_strength(&self) -> f32 {
        match self {
            Self::Inpaint => 1.0,
            _ => 0.75,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lora {
    pub name: String,
    #[serde(default = "Lora::default_strength")]
    pub strength: f32,
}

impl Lora {
    fn default_strength() -> f32 {
        1.0
    }
}

/// Result of uploading a source image: the backend's reference for it and
/// its pixel size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedImage {
    pub reference: String,
    pub width: u32,
    pub height: u32,
}

/// Raw, unvalidated form state as a UI would hold it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub mode: Mode,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub scheduler: String,
    pub seed: i64,
    pub batch_size: u32,
    pub model: String,
    pub vae: Option<String>,
    pub loras: Vec<Lora>,
    pub denoising_strength: f32,
    pub init_image: Option<UploadedImage>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Txt2img,
            prompt: String::new(),
            negative_prompt: String::new(),
            width: 512,
            height: 512,
            steps: 20,
            cfg_scale: 7.0,
            sampler_name: "euler".into(),
            scheduler: "normal".into(),
            seed: RANDOM_SEED,
            batch_size: 1,
            model: String::new(),
            vae: None,
            loras: Vec::new(),
            denoising_strength: Mode::Txt2img.default_denoising_strength(),
            init_image: None,
        }
    }
}

impl GenerationSettings {
    /// Starting point for a form in `mode`, with the first catalog model selected.
    pub fn for_mode(mode: Mode, catalog: &Catalog) -> Self {
        Self {
            mode,
            model: catalog.default_model().unwrap_or_default().to_string(),
            denoising_strength: mode.default_denoising_strength(),
            ..Self::default()
        }
    }

    /// Adopts an uploaded image as the init image; the output size follows it.
    pub fn with_init_image(mut self, image: UploadedImage) -> Self {
        self.width = image.width;
        self.height = image.height;
        self.init_image = Some(image);
        self
    }
}

/// A validated request. There are no mutators: once built it is submitted as is.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    mode: Mode,
    prompt: String,
    negative_prompt: String,
    width: u32,
    height: u32,
    steps: u32,
    cfg_scale: f32,
    sampler_name: String,
    scheduler: String,
    seed: i64,
    batch_size: u32,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vae: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    loras: Vec<Lora>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denoising_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_image: Option<String>,
}

impl GenerationRequest {
    /// Validates `settings` (plus the mask for inpainting) and stops at the
    /// first violated invariant.
    pub fn build(
        settings: &GenerationSettings,
        mask: Option<&MaskEncoder>,
    ) -> Result<Self, ValidationError> {
        check_not_blank("prompt", &settings.prompt)?;
        check_not_blank("model", &settings.model)?;
        check_not_blank("sampler_name", &settings.sampler_name)?;
        check_not_blank("scheduler", &settings.scheduler)?;
        check_dimension("width", settings.width)?;
        check_dimension("height", settings.height)?;
        check_range("steps", settings.steps, STEPS_MIN, STEPS_MAX)?;
        check_float_range("cfg_scale", settings.cfg_scale, CFG_SCALE_MIN, CFG_SCALE_MAX)?;
        check_range("batch_size", settings.batch_size, BATCH_SIZE_MIN, BATCH_SIZE_MAX)?;
        for lora in &settings.loras {
            check_not_blank("loras", &lora.name)?;
            if !lora.strength.is_finite() {
                return Err(ValidationError::new(
                    "loras",
                    format!("strength of {} must be a finite number", lora.name),
                ));
            }
        }

        let mode = settings.mode;
        let mut denoising_strength = None;
        let mut init_image = None;
        let mut mask_image = None;

        if mode.needs_init_image() {
            check_float_range("denoising_strength", settings.denoising_strength, 0.0, 1.0)?;
            denoising_strength = Some(settings.denoising_strength);

            let image = settings
                .init_image
                .as_ref()
                .filter(|image| !image.reference.trim().is_empty())
                .ok_or_else(|| ValidationError::new("init_image", format!("required for {mode}")))?;
            init_image = Some(image.reference.clone());

            if mode.needs_mask() {
                mask_image = Some(encode_mask(mask, image)?);
            }
        }

        Ok(Self {
            mode,
            prompt: settings.prompt.clone(),
            negative_prompt: settings.negative_prompt.clone(),
            width: settings.width,
            height: settings.height,
            steps: settings.steps,
            cfg_scale: settings.cfg_scale,
            sampler_name: settings.sampler_name.clone(),
            scheduler: settings.scheduler.clone(),
            seed: settings.seed,
            batch_size: settings.batch_size,
            model: settings.model.clone(),
            vae: settings.vae.clone().filter(|v| !v.trim().is_empty()),
            loras: settings.loras.clone(),
            denoising_strength,
            init_image,
            mask_image,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn cfg_scale(&self) -> f32 {
        self.cfg_scale
    }

    pub fn sampler_name(&self) -> &str {
        &self.sampler_name
    }

    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn is_random_seed(&self) -> bool {
        self.seed == RANDOM_SEED
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn vae(&self) -> Option<&str> {
        self.vae.as_deref()
    }

    pub fn loras(&self) -> &[Lora] {
        &self.loras
    }

    pub fn denoising_strength(&self) -> Option<f32> {
        self.denoising_strength
    }

    pub fn init_image(&self) -> Option<&str> {
        self.init_image.as_deref()
    }

    pub fn mask_image(&self) -> Option<&str> {
        self.mask_image.as_deref()
    }
}

fn encode_mask(
    mask: Option<&MaskEncoder>,
    image: &UploadedImage,
) -> Result<String, ValidationError> {
    let mask = mask.ok_or_else(|| ValidationError::new("mask_image", "required for inpaint"))?;

    let expected = (image.width, image.height);
    if mask.dimensions() != expected {
        let (w, h) = mask.dimensions();
        return Err(ValidationError::new(
            "mask_image",
            format!("mask is {w}x{h} but the image is {}x{}", expected.0, expected.1),
        ));
    }

    // An untouched mask and one erased back to nothing both mean "no mask drawn".
    if mask.is_blank() {
        return Err(ValidationError::new("mask_image", "no masked region drawn"));
    }

    mask.export()
        .map_err(|e| ValidationError::new("mask_image", format!("could not be encoded: {e}")))
}

fn check_not_blank(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::new(
            field,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(())
}

fn check_float_range(
    field: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ValidationError> {
    if !value.is_finite() || !(min..=max).contains(&value) {
        return Err(ValidationError::new(
            field,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(())
}

fn check_dimension(field: &'static str, value: u32) -> Result<(), ValidationError> {
    check_range(field, value, DIMENSION_MIN, DIMENSION_MAX)?;
    if value % DIMENSION_STEP != 0 {
        return Err(ValidationError::new(
            field,
            format!("{value} is not a multiple of {DIMENSION_STEP}"),
        ));
    }
    Ok(())
}
