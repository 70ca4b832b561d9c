//! Step-based training loop for forecasting models.
//!
//! Training runs for a fixed number of optimizer steps, cycling through the
//! shuffled training windows as often as needed. The validation loss is
//! checked every `val_check_steps` steps; early stopping counts checks
//! without improvement, and the weights of the best check are returned.

use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use hiforecast_core::{Seed, Split, TSForecastingModel};
use hiforecast_data::{MultivariatePanel, TSDataLoader, WindowDataset};
use hiforecast_models::ScalerType;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TrainError};
use crate::losses::PointLoss;
use crate::scheduler::decay_schedule;

/// Configuration for [`ForecastTrainer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastTrainerConfig {
    /// Number of optimizer steps.
    pub max_steps: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Number of halvings of the learning rate spread over `max_steps`;
    /// `-1` keeps it constant.
    pub num_lr_decays: i64,
    /// Validation checks without improvement before stopping; `-1` disables.
    pub early_stop_patience_steps: i64,
    /// Steps between validation checks.
    pub val_check_steps: usize,
    /// Windows per training batch.
    pub batch_size: usize,
    /// Windows per validation batch; `batch_size` when unset.
    pub valid_batch_size: Option<usize>,
    /// Steps between consecutive windows.
    pub step_size: usize,
    /// Scaler applied to every input window.
    pub scaler_type: ScalerType,
    /// Training loss.
    pub loss: PointLoss,
    /// Validation loss; the training loss when unset.
    pub valid_loss: Option<PointLoss>,
    /// Seed for shuffling, initialization and dropout.
    pub random_seed: u64,
    /// Drop the last incomplete training batch.
    pub drop_last_loader: bool,
    /// Clip the global gradient norm to this value.
    pub gradient_clip_val: Option<f64>,
    /// L2 penalty added by the optimizer.
    pub weight_decay: Option<f64>,
}

impl Default for ForecastTrainerConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            learning_rate: 1e-3,
            num_lr_decays: -1,
            early_stop_patience_steps: -1,
            val_check_steps: 100,
            batch_size: 32,
            valid_batch_size: None,
            step_size: 1,
            scaler_type: ScalerType::Identity,
            loss: PointLoss::Mae,
            valid_loss: None,
            random_seed: 1,
            drop_last_loader: false,
            gradient_clip_val: None,
            weight_decay: None,
        }
    }
}

impl ForecastTrainerConfig {
    /// Create a config with the default hyper-parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of optimizer steps.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the number of learning rate decays.
    #[must_use]
    pub fn with_num_lr_decays(mut self, num_lr_decays: i64) -> Self {
        self.num_lr_decays = num_lr_decays;
        self
    }

    /// Set the early stopping patience, in validation checks.
    #[must_use]
    pub fn with_early_stop_patience_steps(mut self, patience: i64) -> Self {
        self.early_stop_patience_steps = patience;
        self
    }

    /// Set the steps between validation checks.
    #[must_use]
    pub fn with_val_check_steps(mut self, val_check_steps: usize) -> Self {
        self.val_check_steps = val_check_steps;
        self
    }

    /// Set the training batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the window step size.
    #[must_use]
    pub fn with_step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    /// Set the scaler.
    #[must_use]
    pub fn with_scaler_type(mut self, scaler_type: ScalerType) -> Self {
        self.scaler_type = scaler_type;
        self
    }

    /// Set the training loss.
    #[must_use]
    pub fn with_loss(mut self, loss: PointLoss) -> Self {
        self.loss = loss;
        self
    }

    /// Set the validation loss.
    #[must_use]
    pub fn with_valid_loss(mut self, valid_loss: PointLoss) -> Self {
        self.valid_loss = Some(valid_loss);
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn with_random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    /// Drop the last incomplete training batch.
    #[must_use]
    pub fn with_drop_last_loader(mut self, drop_last: bool) -> Self {
        self.drop_last_loader = drop_last;
        self
    }

    /// Clip gradients by global norm.
    #[must_use]
    pub fn with_gradient_clip_val(mut self, clip: f64) -> Self {
        self.gradient_clip_val = Some(clip);
        self
    }

    /// Set the weight decay.
    #[must_use]
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = Some(weight_decay);
        self
    }

    /// The loss used for validation.
    pub fn validation_loss(&self) -> PointLoss {
        self.valid_loss.unwrap_or(self.loss)
    }

    /// Check every hyper-parameter.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_steps", self.max_steps),
            ("val_check_steps", self.val_check_steps),
            ("batch_size", self.batch_size),
            ("step_size", self.step_size),
            ("valid_batch_size", self.valid_batch_size.unwrap_or(1)),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(TrainError::InvalidConfig(format!("{name} must be positive")));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate < 1.0) {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate must be in (0, 1), got {}",
                self.learning_rate
            )));
        }
        if self.num_lr_decays == 0 || self.num_lr_decays < -1 {
            return Err(TrainError::InvalidConfig(
                "num_lr_decays must be positive or -1".into(),
            ));
        }
        if self.early_stop_patience_steps == 0 || self.early_stop_patience_steps < -1 {
            return Err(TrainError::InvalidConfig(
                "early_stop_patience_steps must be positive or -1".into(),
            ));
        }
        if let Some(clip) = self.gradient_clip_val {
            if !(clip > 0.0) {
                return Err(TrainError::InvalidConfig(format!(
                    "gradient_clip_val must be positive, got {clip}"
                )));
            }
        }
        if let Some(decay) = self.weight_decay {
            if decay < 0.0 {
                return Err(TrainError::InvalidConfig(format!(
                    "weight_decay must be non-negative, got {decay}"
                )));
            }
        }
        Ok(())
    }

    fn patience(&self) -> Option<usize> {
        (self.early_stop_patience_steps > 0).then_some(self.early_stop_patience_steps as usize)
    }
}

/// Training output with history and the selected model.
#[derive(Debug)]
pub struct FitOutput<M> {
    /// Model at the best validation check, or after the last step when
    /// there was no validation data.
    pub model: M,
    /// Training loss of every step.
    pub train_losses: Vec<f32>,
    /// `(step, loss)` of every validation check.
    pub valid_losses: Vec<(usize, f32)>,
    /// Best validation loss.
    pub best_valid_loss: Option<f32>,
    /// Step of the best validation loss.
    pub best_step: Option<usize>,
    /// Optimizer steps taken.
    pub steps: usize,
    /// Whether early stopping ended the run.
    pub stopped_early: bool,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

/// Step-based trainer for [`TSForecastingModel`]s.
pub struct ForecastTrainer<B: AutodiffBackend> {
    config: ForecastTrainerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> ForecastTrainer<B> {
    /// Create a new trainer after validating `config`.
    pub fn new(config: ForecastTrainerConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, device })
    }

    /// The trainer configuration.
    pub fn config(&self) -> &ForecastTrainerConfig {
        &self.config
    }

    /// Seed the backend with the configured seed.
    ///
    /// Call before building the model to make initialization reproducible.
    pub fn seed_backend(&self) {
        Seed::new(self.config.random_seed).seed_backend::<B>();
    }

    fn loader(&self, dataset: WindowDataset, split: Split) -> Result<TSDataLoader> {
        let seed = Seed::new(self.config.random_seed);
        let loader = match split {
            Split::Train => TSDataLoader::builder(dataset)
                .batch_size(self.config.batch_size)
                .shuffle(true)
                .drop_last(self.config.drop_last_loader)
                .seed(seed.derive("train")),
            _ => TSDataLoader::builder(dataset)
                .batch_size(self.config.valid_batch_size.unwrap_or(self.config.batch_size)),
        };
        Ok(loader.split(split).build()?)
    }

    /// Train `model` on the windows of `train`, validating on `valid`.
    ///
    /// `valid` must carry `input_size` steps of look-back before its first
    /// target, as produced by [`hiforecast_data::temporal_split`].
    pub fn fit<M>(
        &self,
        model: M,
        train: &MultivariatePanel,
        valid: Option<&MultivariatePanel>,
    ) -> Result<FitOutput<M>>
    where
        M: AutodiffModule<B> + TSForecastingModel<B>,
        M::InnerModule: TSForecastingModel<B::InnerBackend>,
    {
        let start_time = Instant::now();
        let cfg = &self.config;
        let (input_size, h) = (model.input_size(), model.horizon());
        if train.n_series() != model.n_series() {
            return Err(TrainError::InsufficientData(format!(
                "panel has {} series, model expects {}",
                train.n_series(),
                model.n_series()
            )));
        }

        Seed::new(cfg.random_seed).seed_backend::<B>();
        let train_loader = self.loader(train.windows(input_size, h, cfg.step_size)?, Split::Train)?;
        if train_loader.n_batches() == 0 {
            return Err(TrainError::InsufficientData(format!(
                "{} training windows fill no batch of {}",
                train_loader.len(),
                cfg.batch_size
            )));
        }
        let valid_loader = valid
            .map(|panel| {
                let windows = panel.windows(input_size, h, cfg.step_size)?;
                self.loader(windows, Split::Valid)
            })
            .transpose()?;

        let patience = cfg.patience();
        if patience.is_some() && valid_loader.is_none() {
            warn!("early stopping requested without validation data; it is disabled");
        }

        let mut optim = AdamConfig::new()
            .with_weight_decay(cfg.weight_decay.map(|w| WeightDecayConfig::new(w as f32)))
            .with_grad_clipping(cfg.gradient_clip_val.map(|v| GradientClippingConfig::Norm(v as f32)))
            .init::<B, M>();
        let scheduler = decay_schedule(cfg.learning_rate, cfg.max_steps, cfg.num_lr_decays);

        info!(
            model = model.name(),
            windows = train_loader.len(),
            batches = train_loader.n_batches(),
            max_steps = cfg.max_steps,
            scheduler = scheduler.name(),
            "starting training"
        );

        let mut model = model;
        let mut best_model: Option<M> = None;
        let mut best_valid_loss: Option<f32> = None;
        let mut best_step = None;
        let mut train_losses = Vec::with_capacity(cfg.max_steps);
        let mut valid_losses = Vec::new();
        let mut checks_without_improvement = 0;
        let mut stopped_early = false;

        let mut step = 0;
        let mut epoch = 0;
        'training: while step < cfg.max_steps {
            for batch in train_loader.iter::<B>(&self.device, epoch) {
                let batch = batch?;
                let y = batch
                    .y
                    .ok_or_else(|| TrainError::InsufficientData("training batch without targets".into()))?;
                let x = batch.x.into_inner();

                let (z, stats) = cfg.scaler_type.fit_transform(x);
                let y_hat = stats.inverse_transform(model.forecast(z));
                let loss = cfg.loss.forward(y_hat, y);
                let loss_value: f32 = loss.clone().into_scalar().elem();
                if !loss_value.is_finite() {
                    return Err(TrainError::Diverged {
                        step,
                        value: loss_value,
                    });
                }

                let lr = scheduler.get_lr(step);
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);

                train_losses.push(loss_value);
                step += 1;
                debug!(step, loss = loss_value, lr, "train step");

                let check_due = step % cfg.val_check_steps == 0 || step == cfg.max_steps;
                if let (true, Some(loader)) = (check_due, &valid_loader) {
                    let valid_loss = self.validate(&model, loader)?;
                    valid_losses.push((step, valid_loss));

                    let improved = best_valid_loss.map_or(true, |best| valid_loss < best);
                    if improved {
                        best_valid_loss = Some(valid_loss);
                        best_step = Some(step);
                        best_model = Some(model.clone());
                        checks_without_improvement = 0;
                    } else {
                        checks_without_improvement += 1;
                    }
                    info!(
                        step,
                        train_loss = loss_value,
                        valid_loss,
                        best = improved,
                        "validation"
                    );

                    if patience.is_some_and(|p| checks_without_improvement >= p) {
                        info!(
                            step,
                            checks = checks_without_improvement,
                            "early stopping"
                        );
                        stopped_early = true;
                        break 'training;
                    }
                }

                if step >= cfg.max_steps {
                    break 'training;
                }
            }
            epoch += 1;
        }

        let training_time_secs = start_time.elapsed().as_secs_f64();
        info!(
            steps = step,
            best_valid_loss = ?best_valid_loss,
            best_step = ?best_step,
            secs = training_time_secs,
            "training complete"
        );

        Ok(FitOutput {
            model: best_model.unwrap_or(model),
            train_losses,
            valid_losses,
            best_valid_loss,
            best_step,
            steps: step,
            stopped_early,
            training_time_secs,
        })
    }

    /// Mean validation loss over all windows of `loader`, computed without
    /// gradients.
    fn validate<M>(&self, model: &M, loader: &TSDataLoader) -> Result<f32>
    where
        M: AutodiffModule<B>,
        M::InnerModule: TSForecastingModel<B::InnerBackend>,
    {
        let inner_model = model.clone().valid();
        let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone().into();
        let loss_fn = self.config.validation_loss();

        let mut total = 0.0f64;
        let mut count = 0usize;
        for batch in loader.iter::<B::InnerBackend>(&inner_device, 0) {
            let batch = batch?;
            let n = batch.batch_size();
            let y = batch
                .y
                .ok_or_else(|| TrainError::InsufficientData("validation batch without targets".into()))?;

            let (z, stats) = self.config.scaler_type.fit_transform(batch.x.into_inner());
            let y_hat = stats.inverse_transform(inner_model.forecast(z));
            let loss: f32 = loss_fn.forward(y_hat, y).into_scalar().elem();
            total += f64::from(loss) * n as f64;
            count += n;
        }

        Ok(if count > 0 {
            (total / count as f64) as f32
        } else {
            0.0
        })
    }
}
