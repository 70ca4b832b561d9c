//! # hiforecast_train
//!
//! Training and evaluation for hiforecast models.
//!
//! This crate provides:
//! - [`ForecastTrainer`], a step-based trainer with validation checks,
//!   early stopping and best-model selection
//! - Point losses selected by name ([`PointLoss`])
//! - Forecast metrics (MAE, MSE, RMSE, MAPE, sMAPE)
//! - Step decay learning rate scheduling
//! - [`predict`] and [`evaluate`] for trained models
//!
//! ## Example
//!
//! ```rust,ignore
//! use hiforecast_train::{ForecastTrainer, ForecastTrainerConfig, PointLoss};
//! use hiforecast_models::{ScalerType, SOFTSConfig};
//!
//! let config = ForecastTrainerConfig::new()
//!     .with_max_steps(500)
//!     .with_scaler_type(ScalerType::Robust)
//!     .with_loss(PointLoss::Huber)
//!     .with_early_stop_patience_steps(3);
//! let trainer = ForecastTrainer::<Autodiff<NdArray>>::new(config, device)?;
//! trainer.seed_backend();
//!
//! let model = SOFTSConfig::new(24, 96, 7).init(&device)?;
//! let out = trainer.fit(model, &split.train, split.valid.as_ref())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod evaluation;
pub mod losses;
pub mod metrics;
pub mod scheduler;
pub mod training;

pub use error::{Result, TrainError};
pub use evaluation::{evaluate, predict, predict_windows, EvaluationResult};
pub use losses::PointLoss;
pub use metrics::{ForecastMetrics, Metric, MetricsAccumulator, MAE, MAPE, MSE, RMSE, SMAPE};
pub use scheduler::{decay_schedule, ConstantLR, Scheduler, StepLR};
// Re-export the model seam for convenience
pub use hiforecast_core::TSForecastingModel;
pub use training::{FitOutput, ForecastTrainer, ForecastTrainerConfig};
