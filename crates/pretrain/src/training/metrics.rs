//! Running loss averages and the per-run training history.

/// Running sums of the two loss terms and their combination over an epoch.
#[derive(Debug, Clone, Default)]
pub struct RunningLosses {
    mim: f64,
    nce: f64,
    total: f64,
    count: usize,
}

impl RunningLosses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, mim: f64, nce: f64, total: f64) {
        self.mim += mim;
        self.nce += nce;
        self.total += total;
        self.count += 1;
    }

    /// Number of steps accumulated so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Averages as `(mim, nce, total)`, or `None` before the first update.
    pub fn averages(&self) -> Option<(f64, f64, f64)> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some((self.mim / n, self.nce / n, self.total / n))
    }
}

/// One progress line: running averages at a logged step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLog {
    pub epoch: usize,
    /// 1-based step within the epoch.
    pub step: usize,
    pub steps_per_epoch: usize,
    pub mim_loss: f64,
    pub nce_loss: f64,
    pub total_loss: f64,
}

impl StepLog {
    /// Console form of the progress line.
    pub fn display(&self) -> String {
        format!(
            "| {} / {} | loss : '{:.3}' | MIMLoss : '{:.3}' | NCELoss : '{:.3}' |",
            self.step, self.steps_per_epoch, self.total_loss, self.mim_loss, self.nce_loss
        )
    }
}

/// End-of-epoch summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_mim_loss: f64,
    pub train_nce_loss: f64,
    pub train_total_loss: f64,
    pub val_loss: f64,
    /// Learning rate after this epoch's scheduler step.
    pub lr: f64,
}

/// Everything the trainer logged during a run.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub steps: Vec<StepLog>,
    pub epochs: Vec<EpochSummary>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress lines logged during `epoch`.
    pub fn steps_in_epoch(&self, epoch: usize) -> impl Iterator<Item = &StepLog> {
        self.steps.iter().filter(move |s| s.epoch == epoch)
    }

    pub fn last_epoch(&self) -> Option<&EpochSummary> {
        self.epochs.last()
    }
}
