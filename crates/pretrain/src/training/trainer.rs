//! Dual-loss training loop.
//!
//! Ties together the data loaders, the model's two loss terms, the optimizer
//! and the epoch scheduler: every batch is a forward/backward/update step on
//! `mim + gamma * nce`, every epoch ends with one scheduler step and a
//! gradient-free validation pass.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::config::{PretrainConfig, TrainConfig};
use crate::error::TrainError;
use crate::model::DualLossModel;
use crate::training::data::{num_batches, FeatureBatch, FeatureBatcher, FeatureSample};
use crate::training::metrics::{EpochSummary, RunningLosses, StepLog, TrainingHistory};
use crate::training::schedule::LrScheduler;

/// Trained model plus everything logged while training it.
#[derive(Debug)]
pub struct TrainOutcome<M> {
    pub model: M,
    pub history: TrainingHistory,
}

/// Owns the model and the loop context for one training run.
pub struct Trainer<B: AutodiffBackend, M> {
    model: M,
    ctx: LoopContext<B>,
}

/// Everything the loop needs besides the model itself.
struct LoopContext<B: AutodiffBackend> {
    config: TrainConfig,
    device: B::Device,
    train_loader: Arc<dyn DataLoader<FeatureBatch<B>>>,
    val_loader: Arc<dyn DataLoader<FeatureBatch<B::InnerBackend>>>,
    train_batches: usize,
    val_batches: usize,
    out: Box<dyn Write + Send>,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: DualLossModel<B> + AutodiffModule<B> + 'static,
    M::InnerModule: DualLossModel<B::InnerBackend>,
{
    /// Build a trainer from datasets, a model and the run config.
    ///
    /// Only the `train` section of `config` is retained. The training loader
    /// uses `batch_size`, the validation loader twice that. Batches are
    /// created directly on `device`.
    pub fn new<DT, DV>(
        train_dataset: DT,
        val_dataset: DV,
        model: M,
        config: &PretrainConfig,
        device: B::Device,
    ) -> Result<Self, TrainError>
    where
        DT: Dataset<FeatureSample> + 'static,
        DV: Dataset<FeatureSample> + 'static,
    {
        let config = config.train.clone();
        config.validate()?;

        if train_dataset.len() == 0 {
            return Err(TrainError::EmptyDataset { split: "training" });
        }
        if val_dataset.len() == 0 {
            return Err(TrainError::EmptyDataset { split: "validation" });
        }
        let train_batches = num_batches(train_dataset.len(), config.batch_size);
        let val_batches = num_batches(val_dataset.len(), config.val_batch_size());

        let mut train_builder = DataLoaderBuilder::new(FeatureBatcher::<B>::new(device.clone()))
            .batch_size(config.batch_size);
        if let Some(seed) = config.shuffle_seed {
            train_builder = train_builder.shuffle(seed);
        }
        let train_loader = train_builder.build(train_dataset);

        let val_loader =
            DataLoaderBuilder::new(FeatureBatcher::<B::InnerBackend>::new(device.clone()))
                .batch_size(config.val_batch_size())
                .build(val_dataset);

        Ok(Self {
            model,
            ctx: LoopContext {
                config,
                device,
                train_loader,
                val_loader,
                train_batches,
                val_batches,
                out: Box::new(std::io::stdout()),
            },
        })
    }

    /// Send console output to `out` instead of stdout.
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.ctx.out = Box::new(out);
        self
    }

    /// Training batches per epoch.
    pub fn train_batches(&self) -> usize {
        self.ctx.train_batches
    }

    /// Validation batches per evaluation pass.
    pub fn val_batches(&self) -> usize {
        self.ctx.val_batches
    }

    /// The `train` section this run was built with.
    pub fn config(&self) -> &TrainConfig {
        &self.ctx.config
    }

    /// Run all epochs and return the trained model.
    pub fn train(self) -> Result<TrainOutcome<M>, TrainError> {
        let Self { model, mut ctx } = self;
        ctx.run(model)
    }

    /// Run one validation pass on the current model, reporting `lr` alongside.
    pub fn evaluate(&mut self, lr: f64) -> Result<f64, TrainError> {
        let model = self.model.valid();
        self.ctx.evaluate(&model, lr)
    }
}

/// Read a one-element loss tensor back to the host.
fn scalar_to_f64<B: Backend>(loss: Tensor<B, 1>) -> f64 {
    loss.into_scalar().elem::<f64>()
}

impl<B: AutodiffBackend> LoopContext<B> {
    fn run<M>(&mut self, model: M) -> Result<TrainOutcome<M>, TrainError>
    where
        M: DualLossModel<B> + AutodiffModule<B> + 'static,
        M::InnerModule: DualLossModel<B::InnerBackend>,
    {
        let config = self.config.clone();
        let mut optimizer = config.optimizer.init::<B, M>(&config);
        let mut scheduler = LrScheduler::from_config(&config);
        let mut model = model.fork(&self.device);
        let mut history = TrainingHistory::new();
        let train_start = Instant::now();

        tracing::info!(
            optimizer = %optimizer.kind(),
            lr_sched = %scheduler.kind(),
            epochs = config.n_epochs,
            batch_size = config.batch_size,
            train_batches = self.train_batches,
            val_batches = self.val_batches,
            gamma = config.gamma,
            "Starting training"
        );

        for epoch in 0..config.n_epochs {
            writeln!(self.out, "{}{epoch}th epoch{}", "-".repeat(30), "-".repeat(30))?;
            let lr = scheduler.current_lr();
            let mut running = RunningLosses::new();

            for batch in self.train_loader.iter() {
                let losses = model.forward_losses(batch);
                let mim = scalar_to_f64(losses.mim.clone());
                let nce = scalar_to_f64(losses.nce.clone());
                let loss = losses.combined(config.gamma);
                let total = scalar_to_f64(loss.clone());

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);

                running.update(mim, nce, total);
                let step = running.count();
                if !total.is_finite() {
                    tracing::warn!(epoch, step, mim, nce, "Non-finite training loss");
                }

                if step % config.log_interval == 0 {
                    if let Some((mim_loss, nce_loss, total_loss)) = running.averages() {
                        let log = StepLog {
                            epoch,
                            step,
                            steps_per_epoch: self.train_batches,
                            mim_loss,
                            nce_loss,
                            total_loss,
                        };
                        writeln!(self.out, "{}", log.display())?;
                        tracing::debug!(epoch, step, mim_loss, nce_loss, total_loss, "Progress");
                        history.steps.push(log);
                    }
                }
            }

            let lr = scheduler.step();
            let val_loss = self.evaluate(&model.valid(), lr)?;

            let (train_mim_loss, train_nce_loss, train_total_loss) =
                running.averages().unwrap_or_default();
            tracing::info!(
                epoch,
                steps = running.count(),
                train_loss = format!("{train_total_loss:.4}"),
                val_loss = format!("{val_loss:.4}"),
                lr = format!("{lr:.2e}"),
                "Epoch complete"
            );
            history.epochs.push(EpochSummary {
                epoch,
                train_mim_loss,
                train_nce_loss,
                train_total_loss,
                val_loss,
                lr,
            });
        }

        tracing::info!(
            epochs = config.n_epochs,
            scheduler_steps = scheduler.steps_taken(),
            elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
            "Training loop finished"
        );

        Ok(TrainOutcome { model, history })
    }

    /// Average validation loss over all validation batches.
    ///
    /// Runs on the inner (non-autodiff) module, so no graph is recorded.
    fn evaluate<IM>(&mut self, model: &IM, lr: f64) -> Result<f64, TrainError>
    where
        IM: DualLossModel<B::InnerBackend>,
    {
        writeln!(self.out, "{}", "-".repeat(60))?;

        let mut total = 0.0;
        let mut batches = 0usize;
        for batch in self.val_loader.iter() {
            total += scalar_to_f64(model.forward_eval_loss(batch));
            batches += 1;
        }
        if batches == 0 {
            return Err(TrainError::EmptyDataset { split: "validation" });
        }

        let val_loss = total / batches as f64;
        writeln!(self.out, "| validation loss : {val_loss} | lr : {lr} |")?;
        self.out.flush()?;
        Ok(val_loss)
    }
}
