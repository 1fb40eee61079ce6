// Library exports for hosts that drive OCR training loops

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod model;
pub mod training;

// Re-export commonly used types
pub use config::{CallbackConfig, DecoderKind, LossAccumulation, RunConfig};
pub use error::{Result, ValidationError};
pub use metrics::EpochMetrics;
pub use training::{AttentionEvaluator, CtcEvaluator, EpochObserver, ValidationCallback, ValidationEvaluator};
