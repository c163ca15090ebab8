pub mod catalog;
pub mod error;
pub mod job;
pub mod mask;
pub mod request;

pub use catalog::{Catalog, ModelInfo, ModelKind};
pub use error::ValidationError;
pub use job::{GeneratedImage, JobHandle, JobStatus, StatusTag};
pub use mask::{BrushMode, MaskEncoder, MaskRaster};
pub use request::{GenerationRequest, GenerationSettings, Lora, Mode, UploadedImage};
