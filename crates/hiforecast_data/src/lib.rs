//! # hiforecast_data
//!
//! Panels, forecast windows and dataloaders for hiforecast.
//!
//! This crate provides:
//! - [`MultivariatePanel`], aligned series stored as `(V, T)`
//! - [`WindowDataset`], `(input, target)` window pairs cut from a panel
//! - [`temporal_split`] into train / validation / test panels
//! - [`TSDataLoader`] for seeded, batched iteration
//! - NPY and long-format CSV I/O
//!
//! ## Example
//!
//! ```rust,ignore
//! use hiforecast_data::{read_npy, temporal_split, TemporalSplitConfig, TSDataLoader};
//! use hiforecast_core::Seed;
//!
//! let panel = read_npy("traffic.npy")?;
//! let split = temporal_split(&panel, TemporalSplitConfig::new(96, 96), 96, 24)?;
//! let train = TSDataLoader::builder(split.train.windows(96, 24, 1)?)
//!     .batch_size(32)
//!     .shuffle(true)
//!     .seed(Seed::new(1).derive("train"))
//!     .build()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod io;
mod loader;
mod panel;
mod splits;

pub use dataset::WindowDataset;
pub use error::{DataError, Result};
#[cfg(feature = "polars-io")]
pub use io::read_long_csv;
pub use io::{read_npy, write_forecast_npy, write_npy};
pub use loader::{TSDataLoader, TSDataLoaderBuilder, TSDataLoaderIter};
pub use panel::MultivariatePanel;
pub use splits::{temporal_split, TemporalSplit, TemporalSplitConfig};
