pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod registry;

pub use config::ClientConfig;
pub use error::AppError;
pub use events::GenEvent;
pub use generator::Generator;
pub use registry::{JobRegistry, SessionId};
