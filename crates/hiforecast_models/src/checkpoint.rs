//! Model checkpointing and serialization utilities.
//!
//! A checkpoint is a directory holding the weights, written with Burn's
//! named MessagePack recorder at full precision, and a JSON
//! [`CheckpointMetadata`] describing how to rebuild the model.
//!
//! ```text
//! run/
//! ├── model.mpk
//! └── metadata.json
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use hiforecast_models::checkpoint::{load_checkpoint, save_checkpoint, CheckpointMetadata};
//!
//! let meta = CheckpointMetadata::for_config(&ModelConfig::SOFTS(config.clone()))?.with_step(500);
//! save_checkpoint(&model, &meta, "run")?;
//!
//! let (meta, loaded) = load_checkpoint::<NdArray, SOFTS<NdArray>>("run", &device, |meta, device| {
//!     match meta.model_config()? {
//!         ModelConfig::SOFTS(c) => Ok(c.init(device)?),
//!         other => Err(CheckpointError::InvalidFormat(other.architecture().to_string())),
//!     }
//! })?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::forecast::ModelConfig;
use crate::layers::ScalerType;

/// File name of the weights inside a checkpoint directory.
pub const MODEL_FILE: &str = "model.mpk";
/// File name of the metadata inside a checkpoint directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Metadata does not describe a buildable model.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),

    /// The stored config could not build a model.
    #[error("Model error: {0}")]
    Model(#[from] crate::error::ModelError),
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Save the weights of `model` to `path`.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    model
        .clone()
        .save_file(path.as_ref().to_path_buf(), &recorder())
        .map_err(|e| CheckpointError::Save(e.to_string()))
}

/// Load weights from `path` into `model`, whose architecture must match.
pub fn load_model<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    model
        .load_file(path.as_ref().to_path_buf(), &recorder(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Full model configuration.
    pub config: serde_json::Value,
    /// Training step the weights were taken at.
    pub step: Option<usize>,
    /// Validation loss at that step.
    pub val_loss: Option<f32>,
    /// Scaler the model was trained behind.
    pub scaler: Option<ScalerType>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl CheckpointMetadata {
    /// Create metadata with an empty config.
    pub fn new(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            config: serde_json::Value::Null,
            step: None,
            val_loss: None,
            scaler: None,
            extra: HashMap::new(),
        }
    }

    /// Metadata for a tagged model config.
    pub fn for_config(config: &ModelConfig) -> Result<Self> {
        let value = serde_json::to_value(config).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(Self {
            config: value,
            ..Self::new(config.architecture().name())
        })
    }

    /// The stored config as a [`ModelConfig`].
    pub fn model_config(&self) -> Result<ModelConfig> {
        let config: ModelConfig = serde_json::from_value(self.config.clone())
            .map_err(|e| CheckpointError::InvalidFormat(e.to_string()))?;
        if config.architecture().name() != self.arch {
            return Err(CheckpointError::InvalidFormat(format!(
                "metadata names '{}' but the config builds '{}'",
                self.arch,
                config.architecture()
            )));
        }
        Ok(config)
    }

    /// Set the training step.
    #[must_use]
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the validation loss.
    #[must_use]
    pub fn with_val_loss(mut self, loss: f32) -> Self {
        self.val_loss = Some(loss);
        self
    }

    /// Set the scaler.
    #[must_use]
    pub fn with_scaler(mut self, scaler: ScalerType) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::Load(e.to_string()))
    }
}

/// Paths of the files inside a checkpoint directory.
pub fn checkpoint_paths(dir: impl AsRef<Path>) -> (PathBuf, PathBuf) {
    let dir = dir.as_ref();
    (dir.join(MODEL_FILE), dir.join(METADATA_FILE))
}

/// Write `model` and `metadata` into `dir`, creating it if needed.
pub fn save_checkpoint<B, M>(model: &M, metadata: &CheckpointMetadata, dir: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| CheckpointError::Save(e.to_string()))?;
    let (model_path, meta_path) = checkpoint_paths(dir);
    save_model::<B, M>(model, &model_path)?;
    metadata.save(&meta_path)?;
    info!(path = %dir.display(), arch = %metadata.arch, step = ?metadata.step, "saved checkpoint");
    Ok(())
}

/// Read the metadata of the checkpoint in `dir`, build a model with `init`
/// and load the stored weights into it.
pub fn load_checkpoint<B, M>(
    dir: impl AsRef<Path>,
    device: &B::Device,
    init: impl FnOnce(&CheckpointMetadata, &B::Device) -> Result<M>,
) -> Result<(CheckpointMetadata, M)>
where
    B: Backend,
    M: Module<B>,
{
    let (model_path, meta_path) = checkpoint_paths(dir);
    let metadata = CheckpointMetadata::load(&meta_path)?;
    let model = init(&metadata, device)?;
    let model = load_model::<B, M>(model, &model_path, device)?;
    Ok((metadata, model))
}

/// Extension trait for models to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the weights to `path`.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load weights from `path` into a copy of this model.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        load_model::<B, Self>(self.clone(), path, device)
    }
}

// Implement for all modules
impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::SOFTSConfig;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;
    use hiforecast_core::TSForecastingModel;

    type TestBackend = NdArray;

    fn config() -> SOFTSConfig {
        SOFTSConfig::new(4, 8, 2)
            .with_hidden_size(8)
            .with_d_core(4)
            .with_d_ff(16)
            .with_e_layers(1)
    }

    #[test]
    fn test_checkpoint_metadata() {
        let meta = CheckpointMetadata::new("SOFTS")
            .with_step(500)
            .with_val_loss(0.25)
            .with_scaler(ScalerType::Robust)
            .with_extra("dataset", "ETTh1");

        assert_eq!(meta.arch, "SOFTS");
        assert_eq!(meta.step, Some(500));
        assert_eq!(meta.val_loss, Some(0.25));
        assert_eq!(meta.scaler, Some(ScalerType::Robust));
        assert_eq!(meta.extra.get("dataset"), Some(&"ETTh1".to_string()));
    }

    #[test]
    fn test_metadata_rebuilds_config() {
        let meta = CheckpointMetadata::for_config(&ModelConfig::SOFTS(config())).unwrap();
        assert_eq!(meta.arch, "SOFTS");
        let back = meta.model_config().unwrap();
        assert_eq!(back.horizon(), 4);
        assert_eq!(back.n_series(), 2);

        let mut wrong = meta.clone();
        wrong.arch = "HSOFTS".into();
        assert!(matches!(wrong.model_config(), Err(CheckpointError::InvalidFormat(_))));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = config().init::<TestBackend>(&device).unwrap();
        let meta = CheckpointMetadata::for_config(&ModelConfig::SOFTS(config()))
            .unwrap()
            .with_step(10);
        save_checkpoint(&model, &meta, dir.path()).unwrap();
        assert!(dir.path().join(MODEL_FILE).exists());
        assert!(dir.path().join(METADATA_FILE).exists());

        let (loaded_meta, loaded) = load_checkpoint::<TestBackend, _>(dir.path(), &device, |meta, device| {
            match meta.model_config()? {
                ModelConfig::SOFTS(c) => c
                    .init::<TestBackend>(device)
                    .map_err(|e| CheckpointError::InvalidFormat(e.to_string())),
                other => Err(CheckpointError::InvalidFormat(other.architecture().to_string())),
            }
        })
        .unwrap();
        assert_eq!(loaded_meta.step, Some(10));

        let x = Tensor::<TestBackend, 3>::random([2, 2, 8], Distribution::Default, &device);
        let diff: f32 = (model.forecast(x.clone()) - loaded.forecast(x))
            .abs()
            .max()
            .into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CheckpointMetadata::load(dir.path().join(METADATA_FILE)),
            Err(CheckpointError::Load(_))
        ));
    }
}
