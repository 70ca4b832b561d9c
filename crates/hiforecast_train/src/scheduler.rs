//! Learning rate schedulers.
//!
//! The trainer steps the scheduler once per optimizer step. With
//! `num_lr_decays = n > 0` the rate is halved every `max_steps / n` steps;
//! `-1` keeps it constant.

/// Factor applied at every decay boundary.
pub const DECAY_GAMMA: f64 = 0.5;

/// Trait for learning rate schedulers.
pub trait Scheduler: Send + Sync {
    /// Get the learning rate for the current step.
    fn get_lr(&self, step: usize) -> f64;

    /// Get the scheduler name.
    fn name(&self) -> &str;
}

/// Step decay scheduler.
#[derive(Debug, Clone)]
pub struct StepLR {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
}

impl StepLR {
    /// Create a new step decay scheduler. A zero `step_size` is treated as one.
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }

    /// Steps between two decays.
    pub fn step_size(&self) -> usize {
        self.step_size
    }
}

impl Scheduler for StepLR {
    fn get_lr(&self, step: usize) -> f64 {
        let n_decays = step / self.step_size;
        self.initial_lr * self.gamma.powi(n_decays.min(i32::MAX as usize) as i32)
    }

    fn name(&self) -> &str {
        "StepLR"
    }
}

/// Constant learning rate (no scheduling).
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    /// Create a new constant LR scheduler.
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Scheduler for ConstantLR {
    fn get_lr(&self, _step: usize) -> f64 {
        self.lr
    }

    fn name(&self) -> &str {
        "ConstantLR"
    }
}

/// Scheduler for a run of `max_steps` with `num_lr_decays` halvings.
///
/// Non-positive `num_lr_decays` gives a [`ConstantLR`].
pub fn decay_schedule(lr: f64, max_steps: usize, num_lr_decays: i64) -> Box<dyn Scheduler> {
    if num_lr_decays <= 0 {
        return Box::new(ConstantLR::new(lr));
    }
    let step_size = (max_steps / num_lr_decays as usize).max(1);
    Box::new(StepLR::new(lr, step_size, DECAY_GAMMA))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lr() {
        let scheduler = StepLR::new(1e-3, 10, 0.1);

        assert!((scheduler.get_lr(0) - 1e-3).abs() < 1e-8);
        assert!((scheduler.get_lr(9) - 1e-3).abs() < 1e-8);
        assert!((scheduler.get_lr(10) - 1e-4).abs() < 1e-9);
        assert!((scheduler.get_lr(20) - 1e-5).abs() < 1e-10);
    }

    #[test]
    fn test_constant_lr() {
        let scheduler = ConstantLR::new(3e-4);
        assert_eq!(scheduler.get_lr(0), 3e-4);
        assert_eq!(scheduler.get_lr(100_000), 3e-4);
    }

    #[test]
    fn test_decay_schedule_halves_evenly() {
        let scheduler = decay_schedule(1e-3, 1000, 4);
        assert_eq!(scheduler.name(), "StepLR");
        assert!((scheduler.get_lr(249) - 1e-3).abs() < 1e-12);
        assert!((scheduler.get_lr(250) - 5e-4).abs() < 1e-12);
        assert!((scheduler.get_lr(999) - 1.25e-4).abs() < 1e-12);
    }

    #[test]
    fn test_decay_schedule_disabled() {
        let scheduler = decay_schedule(1e-3, 1000, -1);
        assert_eq!(scheduler.name(), "ConstantLR");
        assert_eq!(scheduler.get_lr(999), 1e-3);
    }

    #[test]
    fn test_more_decays_than_steps() {
        let scheduler = decay_schedule(1.0, 3, 10);
        assert_eq!(scheduler.get_lr(1), 0.5);
    }
}
