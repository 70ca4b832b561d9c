//! # hiforecast
//!
//! Hierarchical multivariate time series forecasting in Rust.
//!
//! hiforecast trains deep forecasters that map a look-back window of every
//! series in a panel to the next `h` steps:
//!
//! - **Data**: aligned panels, forecast windows, temporal splits, dataloaders
//! - **Models**: HiTransformer (inverted Transformer with diff / EWMA token
//!   embeddings), HSOFTS and SOFTS (STAD-based mixers with segmented heads)
//! - **Training**: step-based trainer with scalers, point losses, LR decay,
//!   early stopping and checkpoints
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hiforecast::prelude::*;
//!
//! let panel = read_npy("data/traffic.npy")?;
//! let split = temporal_split(&panel, TemporalSplitConfig::new(96, 96), 96, 24)?;
//!
//! let trainer = ForecastTrainer::<Autodiff<NdArray>>::new(
//!     ForecastTrainerConfig::new().with_max_steps(500).with_scaler_type(ScalerType::Standard),
//!     device,
//! )?;
//! trainer.seed_backend();
//!
//! let model = HSOFTSConfig::new(24, 96, panel.n_series()).init(&device)?;
//! let out = trainer.fit(model, &split.train, split.valid.as_ref())?;
//! let forecast = predict(&out.model.valid(), &panel, ScalerType::Standard, &device)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU
//! - `backend-tch`: PyTorch backend via tch-rs
//! - `polars-io`: long-format CSV input

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use hiforecast_core as core;
pub use hiforecast_data as data;
pub use hiforecast_models as models;
pub use hiforecast_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use hiforecast::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use hiforecast_core::{Seed, Split, TSBatch, TSForecastingModel, TSShape, TSTensor};

    // Data
    pub use hiforecast_data::{
        read_npy, temporal_split, write_forecast_npy, MultivariatePanel, TSDataLoader,
        TemporalSplit, TemporalSplitConfig, WindowDataset,
    };

    // Models
    pub use hiforecast_models::{
        default_registry, load_checkpoint, save_checkpoint, Architecture, CheckpointMetadata,
        EmbeddingType, HSOFTSConfig, HiTransformer, HiTransformerConfig, ModelConfig,
        SOFTSConfig, ScalerType, HSOFTS, SOFTS,
    };

    // Training
    pub use hiforecast_train::{
        evaluate, predict, FitOutput, ForecastMetrics, ForecastTrainer, ForecastTrainerConfig,
        PointLoss,
    };
}

/// Backend type aliases.
pub use hiforecast_core::backend;
