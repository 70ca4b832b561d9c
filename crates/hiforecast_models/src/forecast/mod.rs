//! Multivariate forecasting architectures.
//!
//! - [`HiTransformer`] - inverted-token Transformer with selectable embeddings
//! - [`HSOFTS`] - STAD encoder with frequency-normalized input and stacked heads
//! - [`SOFTS`] - one STAD encoder and projection per horizon segment

mod hitransformer;
mod hsofts;
mod softs;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

pub use hitransformer::{EmbeddingType, HiTransformer, HiTransformerConfig};
pub use hsofts::{HSOFTSConfig, HSOFTS};
pub use softs::{SOFTSConfig, SOFTS};

/// Split a horizon of `h` steps into `n` consecutive segments.
///
/// All segments have `h / n` steps except the last, which absorbs the
/// remainder.
///
/// ```rust
/// use hiforecast_models::forecast::segment_lengths;
///
/// assert_eq!(segment_lengths(12, 4), vec![3, 3, 3, 3]);
/// assert_eq!(segment_lengths(10, 4), vec![2, 2, 2, 4]);
/// ```
#[must_use]
pub fn segment_lengths(h: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let base = h / n;
    let mut lengths = vec![base; n];
    lengths[n - 1] = h - base * (n - 1);
    lengths
}

/// Hyper-parameters every architecture shares, checked before building.
pub(crate) struct CommonParams {
    pub h: usize,
    pub input_size: usize,
    pub n_series: usize,
    pub hidden_size: usize,
    pub e_layers: usize,
    pub d_ff: usize,
    pub dropout: f64,
}

impl CommonParams {
    pub(crate) fn validate(&self) -> Result<()> {
        let positive = [
            ("h", self.h),
            ("input_size", self.input_size),
            ("n_series", self.n_series),
            ("hidden_size", self.hidden_size),
            ("e_layers", self.e_layers),
            ("d_ff", self.d_ff),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::InvalidConfig(format!("{name} must be positive")));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// The registered architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// [`HiTransformer`].
    HiTransformer,
    /// [`HSOFTS`].
    HSOFTS,
    /// [`SOFTS`].
    SOFTS,
}

impl Architecture {
    /// Every architecture.
    pub const ALL: [Architecture; 3] = [
        Architecture::HiTransformer,
        Architecture::HSOFTS,
        Architecture::SOFTS,
    ];

    /// Registered name.
    pub const fn name(&self) -> &'static str {
        match self {
            Architecture::HiTransformer => "HiTransformer",
            Architecture::HSOFTS => "HSOFTS",
            Architecture::SOFTS => "SOFTS",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Architecture::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::Unknown {
                kind: "architecture",
                name: s.to_string(),
            })
    }
}

/// A model configuration tagged with its architecture, as stored in config
/// files and checkpoint metadata.
///
/// ```json
/// { "architecture": "SOFTS", "h": 24, "input_size": 96, "n_series": 7 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "architecture")]
pub enum ModelConfig {
    /// [`HiTransformerConfig`].
    HiTransformer(HiTransformerConfig),
    /// [`HSOFTSConfig`].
    HSOFTS(HSOFTSConfig),
    /// [`SOFTSConfig`].
    SOFTS(SOFTSConfig),
}

impl ModelConfig {
    /// The architecture this config builds.
    pub const fn architecture(&self) -> Architecture {
        match self {
            ModelConfig::HiTransformer(_) => Architecture::HiTransformer,
            ModelConfig::HSOFTS(_) => Architecture::HSOFTS,
            ModelConfig::SOFTS(_) => Architecture::SOFTS,
        }
    }

    /// Check every hyper-parameter.
    pub fn validate(&self) -> Result<()> {
        match self {
            ModelConfig::HiTransformer(c) => c.validate(),
            ModelConfig::HSOFTS(c) => c.validate(),
            ModelConfig::SOFTS(c) => c.validate(),
        }
    }

    /// Forecast horizon.
    pub const fn horizon(&self) -> usize {
        match self {
            ModelConfig::HiTransformer(c) => c.h,
            ModelConfig::HSOFTS(c) => c.h,
            ModelConfig::SOFTS(c) => c.h,
        }
    }

    /// Look-back length.
    pub const fn input_size(&self) -> usize {
        match self {
            ModelConfig::HiTransformer(c) => c.input_size,
            ModelConfig::HSOFTS(c) => c.input_size,
            ModelConfig::SOFTS(c) => c.input_size,
        }
    }

    /// Number of series.
    pub const fn n_series(&self) -> usize {
        match self {
            ModelConfig::HiTransformer(c) => c.n_series,
            ModelConfig::HSOFTS(c) => c.n_series,
            ModelConfig::SOFTS(c) => c.n_series,
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModelError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_lengths_sum_to_horizon() {
        for h in 1..40 {
            for n in 1..=h.min(6) {
                let lengths = segment_lengths(h, n);
                assert_eq!(lengths.len(), n);
                assert_eq!(lengths.iter().sum::<usize>(), h);
            }
        }
        assert!(segment_lengths(5, 0).is_empty());
    }

    #[test]
    fn test_architecture_names() {
        assert_eq!("softs".parse::<Architecture>().unwrap(), Architecture::SOFTS);
        assert_eq!(Architecture::HSOFTS.to_string(), "HSOFTS");
        assert!("Informer".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_model_config_tagging() {
        let json = r#"{ "architecture": "SOFTS", "h": 24, "input_size": 96, "n_series": 7 }"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.architecture(), Architecture::SOFTS);
        assert_eq!(config.horizon(), 24);
        assert_eq!(config.n_series(), 7);
        assert!(config.validate().is_ok());

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["architecture"], "SOFTS");
        assert_eq!(back["segments"], 4);
    }

    #[test]
    fn test_common_validation() {
        let params = CommonParams {
            h: 0,
            input_size: 8,
            n_series: 2,
            hidden_size: 16,
            e_layers: 1,
            d_ff: 32,
            dropout: 0.1,
        };
        assert!(params.validate().is_err());

        let params = CommonParams {
            h: 4,
            dropout: 1.0,
            ..params
        };
        assert!(params.validate().is_err());
    }
}
