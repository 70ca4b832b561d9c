//! # hiforecast_core
//!
//! Core types and traits for hiforecast multivariate forecasting.
//!
//! This crate provides:
//! - [`Seed`] for deterministic random number generation
//! - [`TSShape`] for time series tensor shape metadata
//! - [`TSTensor`] wrapper for Burn tensors with shape validation
//! - [`TSBatch`] pairing an input window with its forecast target
//! - [`TSForecastingModel`], the seam between models and the trainer
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Time series data follows the convention `(B, V, L)`:
//! - `B`: Batch size (number of windows)
//! - `V`: Variables/series
//! - `L`: Sequence length (time steps)
//!
//! Forecasts use the same layout with `L` replaced by the horizon `H`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hiforecast_core::{Seed, TSShape, TSTensor};
//!
//! let seed = Seed::new(42);
//! let shape = TSShape::new(32, 7, 96); // batch=32, series=7, len=96
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod model_trait;
mod seed;
mod shape;
mod split;
mod tensor;

pub use error::{CoreError, Result};
pub use model_trait::TSForecastingModel;
pub use seed::Seed;
pub use shape::TSShape;
pub use split::Split;
pub use tensor::{TSBatch, TSTensor};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;

    #[cfg(feature = "backend-tch")]
    pub use burn_tch::LibTorch;
}
