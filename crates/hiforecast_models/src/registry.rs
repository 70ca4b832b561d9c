//! Model registry for dynamic model creation.
//!
//! The registry builds forecasters by name from JSON configuration, so a
//! command line or a config file can pick the architecture at runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use hiforecast_models::registry::default_registry;
//! use serde_json::json;
//!
//! let registry = default_registry::<NdArray>();
//! let config = json!({ "h": 24, "input_size": 96, "n_series": 7 });
//! let model = registry.create("SOFTS", &config, &device)?;
//! let y = model.forecast(x); // (B, 7, 24)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use burn::prelude::*;
use hiforecast_core::TSForecastingModel;
use serde_json::Value;
use thiserror::Error;

use crate::error::ModelError;
use crate::forecast::{
    EmbeddingType, HSOFTSConfig, HiTransformerConfig, SOFTSConfig,
};

/// Error type for model registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Model not found in registry.
    #[error("Model '{0}' not found in registry")]
    ModelNotFound(String),

    /// Missing or malformed configuration field.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The config parsed but the model rejected it.
    #[error("Failed to create model: {0}")]
    CreationFailed(#[from] ModelError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Object-safe view of a built forecaster.
///
/// Note: We don't require Send + Sync here because Burn's Module types
/// use interior mutability (OnceCell) that doesn't implement Sync.
pub trait TSModel<B: Backend> {
    /// `(B, V, L)` to `(B, V, H)`.
    fn forecast(&self, x: Tensor<B, 3>) -> Tensor<B, 3>;

    /// The model name.
    fn name(&self) -> &str;

    /// Number of trainable scalars.
    fn num_params(&self) -> usize;
}

impl<B: Backend, M: TSForecastingModel<B>> TSModel<B> for M {
    fn forecast(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        TSForecastingModel::forecast(self, x)
    }

    fn name(&self) -> &str {
        TSForecastingModel::name(self)
    }

    fn num_params(&self) -> usize {
        Module::num_params(self)
    }
}

/// Type alias for model constructor.
pub type ModelConstructor<B> =
    Arc<dyn Fn(&Value, &<B as Backend>::Device) -> Result<Box<dyn TSModel<B>>> + Send + Sync>;

/// Registry for dynamically creating models by name.
pub struct ModelRegistry<B: Backend> {
    models: HashMap<String, ModelConstructor<B>>,
}

impl<B: Backend> Default for ModelRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ModelRegistry<B> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Register a model constructor under `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&Value, &<B as Backend>::Device) -> Result<Box<dyn TSModel<B>>> + Send + Sync + 'static,
    {
        self.models.insert(name.to_string(), Arc::new(constructor));
    }

    /// Create a model by its registered name.
    pub fn create(
        &self,
        name: &str,
        config: &Value,
        device: &<B as Backend>::Device,
    ) -> Result<Box<dyn TSModel<B>>> {
        let constructor = self
            .models
            .get(name)
            .ok_or_else(|| RegistryError::ModelNotFound(name.to_string()))?;
        constructor(config, device)
    }

    /// All registered model names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a model is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}

// ============================================================================
// Helper functions for parsing configs
// ============================================================================

fn get_usize(config: &Value, key: &str) -> Result<usize> {
    config
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| RegistryError::InvalidConfig(format!("Missing or invalid '{}'", key)))
}

fn get_usize_or(config: &Value, key: &str, default: usize) -> usize {
    config
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn get_f64_or(config: &Value, key: &str, default: f64) -> f64 {
    config
        .get(key)
        .and_then(|v| v.as_f64())
        .unwrap_or(default)
}

fn get_bool_or(config: &Value, key: &str, default: bool) -> bool {
    config
        .get(key)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

// ============================================================================
// Default registry with all models
// ============================================================================

/// Create a registry with every forecaster pre-registered.
///
/// # Available Models
///
/// - `HiTransformer` - inverted-token Transformer
/// - `HSOFTS` - STAD encoder with frequency normalization and stacked heads
/// - `SOFTS` - per-segment STAD encoders
///
/// # Required Config Fields
///
/// All models require `h`, `input_size` and `n_series`; every other field
/// falls back to the architecture's default.
pub fn default_registry<B: Backend>() -> ModelRegistry<B> {
    let mut registry = ModelRegistry::new();

    registry.register("HiTransformer", |config, device| {
        let h = get_usize(config, "h")?;
        let input_size = get_usize(config, "input_size")?;
        let n_series = get_usize(config, "n_series")?;
        let defaults = HiTransformerConfig::new(h, input_size, n_series);

        let embedding = match config.get("embedding").and_then(|v| v.as_str()) {
            Some(name) => name.parse()?,
            None => EmbeddingType::default(),
        };

        let model_config = defaults
            .clone()
            .with_hidden_size(get_usize_or(config, "hidden_size", defaults.hidden_size))
            .with_n_heads(get_usize_or(config, "n_heads", defaults.n_heads))
            .with_e_layers(get_usize_or(config, "e_layers", defaults.e_layers))
            .with_d_ff(get_usize_or(config, "d_ff", defaults.d_ff))
            .with_dropout(get_f64_or(config, "dropout", defaults.dropout))
            .with_use_norm(get_bool_or(config, "use_norm", defaults.use_norm))
            .with_embedding(embedding)
            .with_ewma_alpha(get_f64_or(config, "ewma_alpha", defaults.ewma_alpha));

        Ok(Box::new(model_config.init::<B>(device)?) as Box<dyn TSModel<B>>)
    });

    registry.register("HSOFTS", |config, device| {
        let h = get_usize(config, "h")?;
        let input_size = get_usize(config, "input_size")?;
        let n_series = get_usize(config, "n_series")?;
        let defaults = HSOFTSConfig::new(h, input_size, n_series);

        let model_config = defaults
            .clone()
            .with_hidden_size(get_usize_or(config, "hidden_size", defaults.hidden_size))
            .with_d_core(get_usize_or(config, "d_core", defaults.d_core))
            .with_e_layers(get_usize_or(config, "e_layers", defaults.e_layers))
            .with_d_ff(get_usize_or(config, "d_ff", defaults.d_ff))
            .with_dropout(get_f64_or(config, "dropout", defaults.dropout))
            .with_use_norm(get_bool_or(config, "use_norm", defaults.use_norm))
            .with_projectors(get_usize_or(config, "projectors", defaults.projectors))
            .with_target_frequency(get_f64_or(
                config,
                "target_frequency",
                defaults.target_frequency,
            ));

        Ok(Box::new(model_config.init::<B>(device)?) as Box<dyn TSModel<B>>)
    });

    registry.register("SOFTS", |config, device| {
        let h = get_usize(config, "h")?;
        let input_size = get_usize(config, "input_size")?;
        let n_series = get_usize(config, "n_series")?;
        let defaults = SOFTSConfig::new(h, input_size, n_series);

        let model_config = defaults
            .clone()
            .with_hidden_size(get_usize_or(config, "hidden_size", defaults.hidden_size))
            .with_d_core(get_usize_or(config, "d_core", defaults.d_core))
            .with_e_layers(get_usize_or(config, "e_layers", defaults.e_layers))
            .with_d_ff(get_usize_or(config, "d_ff", defaults.d_ff))
            .with_dropout(get_f64_or(config, "dropout", defaults.dropout))
            .with_use_norm(get_bool_or(config, "use_norm", defaults.use_norm))
            .with_segments(get_usize_or(config, "segments", defaults.segments));

        Ok(Box::new(model_config.init::<B>(device)?) as Box<dyn TSModel<B>>)
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;
    use serde_json::json;

    type TestBackend = NdArray;

    fn small(extra: Value) -> Value {
        let mut config = json!({
            "h": 6,
            "input_size": 16,
            "n_series": 3,
            "hidden_size": 16,
            "n_heads": 4,
            "d_core": 8,
            "d_ff": 32,
            "e_layers": 1
        });
        if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        config
    }

    #[test]
    fn test_registry_new() {
        let registry: ModelRegistry<TestBackend> = ModelRegistry::new();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_default_registry_contains_all_models() {
        let registry: ModelRegistry<TestBackend> = default_registry();
        assert_eq!(registry.list(), vec!["HSOFTS", "HiTransformer", "SOFTS"]);
    }

    #[test]
    fn test_create_every_model() {
        let registry: ModelRegistry<TestBackend> = default_registry();
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([2, 3, 16], Distribution::Default, &device);

        for name in ["HiTransformer", "HSOFTS", "SOFTS"] {
            let model = registry.create(name, &small(json!({})), &device).unwrap();
            assert_eq!(model.name(), name);
            assert!(model.num_params() > 0);
            assert_eq!(model.forecast(x.clone()).dims(), [2, 3, 6]);
        }
    }

    #[test]
    fn test_embedding_field() {
        let registry: ModelRegistry<TestBackend> = default_registry();
        let device = Default::default();
        let plain = registry
            .create("HiTransformer", &small(json!({})), &device)
            .unwrap();
        let both = registry
            .create("HiTransformer", &small(json!({ "embedding": "inverted_diff" })), &device)
            .unwrap();
        assert!(both.num_params() > plain.num_params());

        let result = registry.create("HiTransformer", &small(json!({ "embedding": "fft" })), &device);
        assert!(matches!(
            result,
            Err(RegistryError::CreationFailed(ModelError::Unknown { .. }))
        ));
    }

    #[test]
    fn test_model_not_found() {
        let registry: ModelRegistry<TestBackend> = default_registry();
        let device = Default::default();

        let result = registry.create("Informer", &json!({}), &device);
        match result {
            Err(RegistryError::ModelNotFound(name)) => assert_eq!(name, "Informer"),
            _ => panic!("Expected ModelNotFound error"),
        }
    }

    #[test]
    fn test_missing_field() {
        let registry: ModelRegistry<TestBackend> = default_registry();
        let device = Default::default();
        let config = json!({ "h": 12 });

        match registry.create("SOFTS", &config, &device) {
            Err(RegistryError::InvalidConfig(msg)) => assert!(msg.contains("input_size")),
            _ => panic!("Expected InvalidConfig error"),
        }
    }

    #[test]
    fn test_rejected_hyper_parameters() {
        let registry: ModelRegistry<TestBackend> = default_registry();
        let device = Default::default();
        let config = small(json!({ "segments": 10 }));

        assert!(matches!(
            registry.create("SOFTS", &config, &device),
            Err(RegistryError::CreationFailed(ModelError::InvalidConfig(_)))
        ));
    }
}
