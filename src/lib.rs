pub mod config;
pub mod engine;
pub mod id_card_processor;
pub mod models;
pub mod processing;
pub mod utils;
pub mod validation;

pub use config::PipelineConfig;
pub use engine::{ModelSet, SharedModels};
pub use id_card_processor::{IdCardProcessor, RequestGuard};
pub use models::ExtractionResult;
pub use utils::{IdCardError, NationalIdError};
