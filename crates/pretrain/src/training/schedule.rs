//! Epoch-level learning-rate schedules.
//!
//! The schedule advances once per epoch, never per batch. All three policies
//! are pure functions of the epoch counter, so the current rate can be
//! recomputed at any time.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::config::TrainConfig;
use crate::error::TrainError;

/// Supported learning-rate schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LrSchedulerKind {
    /// Cosine-annealed one-cycle: ramp from `lr / div_factor` up to `lr`,
    /// then anneal down to `lr / div_factor / final_div_factor`.
    OneCycle,
    /// Linear warmup followed by cosine decay to zero.
    Cosine,
    /// Fixed learning rate.
    Constant,
}

impl FromStr for LrSchedulerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().rsplit('.').next().unwrap_or_default();
        match name.to_ascii_lowercase().as_str() {
            "onecycle" | "onecyclelr" | "one_cycle" => Ok(Self::OneCycle),
            "cosine" | "cosineannealinglr" => Ok(Self::Cosine),
            "constant" | "constantlr" | "none" => Ok(Self::Constant),
            _ => Err(TrainError::UnknownScheduler(s.to_string())),
        }
    }
}

impl TryFrom<String> for LrSchedulerKind {
    type Error = TrainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for LrSchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneCycle => write!(f, "OneCycle"),
            Self::Cosine => write!(f, "Cosine"),
            Self::Constant => write!(f, "Constant"),
        }
    }
}

/// Cosine interpolation from `start` (at `pct = 0`) to `end` (at `pct = 1`).
fn cosine_anneal(start: f64, end: f64, pct: f64) -> f64 {
    end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0)
}

/// Learning rate of the cosine one-cycle policy at `step`.
///
/// The warm phase ends at `pct_start * total_steps - 1` and the cycle at
/// `total_steps - 1`. Past the end of the cycle the rate stays at the minimum.
pub fn one_cycle_lr(
    max_lr: f64,
    total_steps: usize,
    pct_start: f64,
    div_factor: f64,
    final_div_factor: f64,
    step: usize,
) -> f64 {
    let initial_lr = max_lr / div_factor;
    let min_lr = initial_lr / final_div_factor;
    let warm_end = pct_start * total_steps as f64 - 1.0;
    let last = total_steps as f64 - 1.0;
    let step = step as f64;

    let (start_step, end_step, start_lr, end_lr) = if step <= warm_end {
        (0.0, warm_end, initial_lr, max_lr)
    } else {
        (warm_end, last, max_lr, min_lr)
    };

    let span = end_step - start_step;
    let pct = if span > 0.0 {
        ((step - start_step) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    cosine_anneal(start_lr, end_lr, pct)
}

/// Linear warmup to `base_lr` over `warmup_epochs`, then cosine decay that
/// reaches zero at `total_epochs` and stays there.
pub fn warmup_cosine_lr(
    base_lr: f64,
    warmup_epochs: usize,
    total_epochs: usize,
    epoch: usize,
) -> f64 {
    if epoch < warmup_epochs {
        return base_lr * (epoch + 1) as f64 / warmup_epochs as f64;
    }
    let decay_epochs = total_epochs.saturating_sub(warmup_epochs).max(1) as f64;
    let pct = ((epoch - warmup_epochs) as f64 / decay_epochs).min(1.0);
    cosine_anneal(base_lr, 0.0, pct)
}

/// Stateful epoch scheduler.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    kind: LrSchedulerKind,
    base_lr: f64,
    total_epochs: usize,
    warmup_epochs: usize,
    pct_start: f64,
    div_factor: f64,
    final_div_factor: f64,
    epoch: usize,
}

impl LrScheduler {
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            kind: config.lr_sched,
            base_lr: config.lr,
            total_epochs: config.n_epochs,
            warmup_epochs: config.warmup_epochs,
            pct_start: config.pct_start,
            div_factor: config.div_factor,
            final_div_factor: config.final_div_factor,
            epoch: 0,
        }
    }

    pub fn kind(&self) -> LrSchedulerKind {
        self.kind
    }

    /// Number of times [`step`](Self::step) has been called.
    pub fn steps_taken(&self) -> usize {
        self.epoch
    }

    /// Learning rate for the current epoch.
    pub fn current_lr(&self) -> f64 {
        match self.kind {
            LrSchedulerKind::OneCycle => one_cycle_lr(
                self.base_lr,
                self.total_epochs,
                self.pct_start,
                self.div_factor,
                self.final_div_factor,
                self.epoch,
            ),
            LrSchedulerKind::Cosine => warmup_cosine_lr(
                self.base_lr,
                self.warmup_epochs,
                self.total_epochs,
                self.epoch,
            ),
            LrSchedulerKind::Constant => self.base_lr,
        }
    }

    /// Advance one epoch and return the new learning rate.
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.current_lr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 + 1e-9 * b.abs()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "torch.optim.lr_scheduler.OneCycleLR".parse::<LrSchedulerKind>().unwrap(),
            LrSchedulerKind::OneCycle
        );
        assert_eq!("cosine".parse::<LrSchedulerKind>().unwrap(), LrSchedulerKind::Cosine);
        assert_eq!("Constant".parse::<LrSchedulerKind>().unwrap(), LrSchedulerKind::Constant);
        assert!(matches!(
            "StepLR".parse::<LrSchedulerKind>(),
            Err(TrainError::UnknownScheduler(_))
        ));
    }

    #[test]
    fn test_one_cycle_shape() {
        let max_lr = 1e-3;
        let total = 100;
        // pct_start = 0.02 → warm phase ends at step 1.
        let lr0 = one_cycle_lr(max_lr, total, 0.02, 25.0, 1e4, 0);
        assert!(approx(lr0, max_lr / 25.0), "Step 0: got {lr0}");

        let lr1 = one_cycle_lr(max_lr, total, 0.02, 25.0, 1e4, 1);
        assert!(approx(lr1, max_lr), "Step 1 should be the peak, got {lr1}");

        // Annealing midpoint: (50 - 1) / (99 - 1) = 0.5
        let min_lr = max_lr / 25.0 / 1e4;
        let lr50 = one_cycle_lr(max_lr, total, 0.02, 25.0, 1e4, 50);
        assert!(approx(lr50, (max_lr + min_lr) / 2.0), "Step 50: got {lr50}");

        let lr99 = one_cycle_lr(max_lr, total, 0.02, 25.0, 1e4, 99);
        assert!(approx(lr99, min_lr), "Step 99: got {lr99}");

        // Past the end of the cycle the rate is held at the minimum.
        let lr100 = one_cycle_lr(max_lr, total, 0.02, 25.0, 1e4, 100);
        assert!(approx(lr100, min_lr), "Step 100: got {lr100}");
    }

    #[test]
    fn test_one_cycle_short_run_is_finite() {
        // 0.02 * 3 - 1 < 0: the warm phase is empty and annealing starts at once.
        for step in 0..=3 {
            let lr = one_cycle_lr(1e-3, 3, 0.02, 25.0, 1e7, step);
            assert!(lr.is_finite() && lr > 0.0, "Step {step}: got {lr}");
            assert!(lr <= 1e-3);
        }
        // Single-epoch cycle.
        let lr = one_cycle_lr(1e-3, 1, 0.02, 25.0, 1e7, 0);
        assert!(lr.is_finite());
    }

    #[test]
    fn test_warmup_cosine() {
        let base_lr = 1e-4;
        let lr0 = warmup_cosine_lr(base_lr, 10, 100, 0);
        assert!(approx(lr0, base_lr / 10.0), "Step 0: got {lr0}");

        let lr10 = warmup_cosine_lr(base_lr, 10, 100, 10);
        assert!(approx(lr10, base_lr), "Step 10: got {lr10}");

        let lr55 = warmup_cosine_lr(base_lr, 10, 100, 55);
        assert!(approx(lr55, base_lr * 0.5), "Step 55: got {lr55}");

        let lr_no_warmup = warmup_cosine_lr(base_lr, 0, 100, 0);
        assert!(approx(lr_no_warmup, base_lr));
    }

    #[test]
    fn test_warmup_cosine_past_end_is_zero() {
        assert!(approx(warmup_cosine_lr(1e-4, 2, 10, 10), 0.0));
        assert!(approx(warmup_cosine_lr(1e-4, 2, 10, 25), 0.0));
        // Warmup longer than the run: the decay span is clamped to one epoch.
        assert!(approx(warmup_cosine_lr(1e-4, 5, 3, 5), 1e-4));
    }

    #[test]
    fn test_scheduler_steps_once_per_call() {
        let config = TrainConfig {
            n_epochs: 4,
            lr: 0.5,
            lr_sched: LrSchedulerKind::Constant,
            ..TrainConfig::default()
        };
        let mut sched = LrScheduler::from_config(&config);
        assert_eq!(sched.steps_taken(), 0);
        assert!(approx(sched.current_lr(), 0.5));
        for i in 1..=4 {
            let lr = sched.step();
            assert_eq!(sched.steps_taken(), i);
            assert!(approx(lr, 0.5));
        }
    }

    #[test]
    fn test_scheduler_matches_pure_function() {
        let config = TrainConfig {
            n_epochs: 20,
            lr: 1e-3,
            lr_sched: LrSchedulerKind::OneCycle,
            pct_start: 0.25,
            ..TrainConfig::default()
        };
        let mut sched = LrScheduler::from_config(&config);
        for epoch in 0..20 {
            let expected = one_cycle_lr(1e-3, 20, 0.25, 25.0, 1e7, epoch);
            assert!(approx(sched.current_lr(), expected), "epoch {epoch}");
            sched.step();
        }
    }
}
