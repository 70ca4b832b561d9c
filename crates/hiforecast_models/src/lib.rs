//! # hiforecast_models
//!
//! Multivariate forecasting architectures and the layers they are built from.
//!
//! ## Models
//! - [`HiTransformer`] - inverted-token Transformer with inverted, diff, EWMA
//!   or combined embeddings
//! - [`HSOFTS`] - STAD series mixing over frequency-normalized inputs with
//!   stacked projection heads
//! - [`SOFTS`] - a STAD encoder and projection per horizon segment
//!
//! ## Layers
//! Embeddings, full attention, STAD, encoder stacks, instance normalization,
//! temporal scalers and smoothing heuristics live in [`layers`].
//!
//! All models take `(B, V, L)` windows and return `(B, V, H)` forecasts
//! through [`hiforecast_core::TSForecastingModel`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod error;
pub mod forecast;
pub mod layers;
pub mod registry;

pub use checkpoint::{
    load_checkpoint, load_model, save_checkpoint, save_model, CheckpointError, CheckpointMetadata,
    ModelCheckpoint,
};
pub use error::{ModelError, Result};
pub use forecast::{
    segment_lengths, Architecture, EmbeddingType, HSOFTSConfig, HiTransformer,
    HiTransformerConfig, ModelConfig, SOFTSConfig, HSOFTS, SOFTS,
};
pub use layers::{ScalerStats, ScalerType};
pub use registry::{default_registry, ModelRegistry, RegistryError, TSModel};
