// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and AdamW.
//
//   - Training runs on an AutodiffBackend (Autodiff<Wgpu> in
//     production, Autodiff<NdArray> in tests)
//   - Gradients of `grad_accumulation_steps` batches are summed
//     before one optimizer step; each batch loss is divided by
//     the number of accumulated batches
//   - The learning rate decays linearly to 0 over all steps
//   - model.valid() returns the model on the inner backend,
//     so the validation batcher uses B::InnerBackend
//   - Weights are saved every `save_steps` optimizer steps and
//     at the end of every epoch
//
// Each epoch produces an EpochSummary that is handed to every
// EpochSubscriber (metrics CSV, model card, ...).

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::{batcher::ClassificationBatcher, dataset::ClassificationDataset};
use crate::domain::{epoch::EpochSummary, traits::EpochSubscriber};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::TransformerClassifier;
use crate::ml::objective::{correct_predictions, Objective};
use crate::ml::wrapper::KnowledgeContinuousWrapper;

pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Optimizer and schedule settings shared by every training workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSettings {
    pub learning_rate:           f64,
    pub weight_decay:            f64,
    pub epochs:                  usize,
    pub batch_size:              usize,
    pub grad_accumulation_steps: usize,
    pub save_steps:              usize,
    pub seed:                    u64,
    pub num_workers:             usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            learning_rate:           5e-5,
            weight_decay:            0.0,
            epochs:                  20,
            batch_size:              8,
            grad_accumulation_steps: 2,
            save_steps:              2000,
            seed:                    42,
            num_workers:             1,
        }
    }
}

/// Learning rate after `step` of `total_steps` optimizer steps.
pub fn linear_decay(initial: f64, step: usize, total_steps: usize) -> f64 {
    if total_steps == 0 {
        return initial;
    }
    initial * (1.0 - step.min(total_steps) as f64 / total_steps as f64)
}

/// Optimizer steps in one epoch: one per `accumulation` batches,
/// plus one for a trailing partial group.
pub fn steps_per_epoch(num_samples: usize, batch_size: usize, accumulation: usize) -> usize {
    let batches = num_samples.div_ceil(batch_size.max(1));
    batches.div_ceil(accumulation.max(1))
}

pub struct Trainer<'a> {
    pub settings:    &'a TrainerSettings,
    pub objective:   &'a Objective,
    pub checkpoints: &'a CheckpointManager,
}

impl<'a> Trainer<'a> {
    pub fn new(
        settings:    &'a TrainerSettings,
        objective:   &'a Objective,
        checkpoints: &'a CheckpointManager,
    ) -> Self {
        Self { settings, objective, checkpoints }
    }

    /// Run the full schedule and return the per-epoch history.
    pub fn fit<B: AutodiffBackend>(
        &self,
        mut model:   TransformerClassifier<B>,
        mut wrapper: KnowledgeContinuousWrapper,
        train:       ClassificationDataset,
        valid:       ClassificationDataset,
        subscribers: &mut [Box<dyn EpochSubscriber>],
        device:      &B::Device,
    ) -> Result<(TransformerClassifier<B>, Vec<EpochSummary>)> {
        let cfg = self.settings;
        anyhow::ensure!(train.len() > 0, "Training set is empty");
        anyhow::ensure!(valid.len() > 0, "Validation set is empty");

        B::seed(cfg.seed);

        // ── AdamW optimiser ───────────────────────────────────────────────────
        let mut optim = AdamWConfig::new()
            .with_weight_decay(cfg.weight_decay as f32)
            .init();

        let accumulation = cfg.grad_accumulation_steps.max(1);
        let per_epoch    = steps_per_epoch(train.len(), cfg.batch_size, accumulation);
        let total_steps  = per_epoch * cfg.epochs;
        let num_batches  = train.len().div_ceil(cfg.batch_size.max(1));
        tracing::info!(
            "Training with '{}' objective: {} examples, {} optimizer steps/epoch, {} epochs",
            self.objective.name(), train.len(), per_epoch, cfg.epochs
        );

        // ── Training data loader (AutodiffBackend) ────────────────────────────
        let train_batcher = ClassificationBatcher::<B>::new(device.clone());
        let train_loader  = DataLoaderBuilder::new(train_batcher)
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(cfg.num_workers)
            .build(train);

        // ── Validation data loader (InnerBackend — no autodiff overhead) ──────
        let val_batcher = ClassificationBatcher::<B::InnerBackend>::new(device.clone());
        let val_loader  = DataLoaderBuilder::new(val_batcher)
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(valid);

        let mut history = Vec::with_capacity(cfg.epochs);
        let mut step    = 0usize;
        let mut best    = f64::INFINITY;

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in 1..=cfg.epochs {

            // ── Training phase ────────────────────────────────────────────────
            let mut train_loss_sum = 0.0f64;
            let mut train_batches  = 0usize;
            let mut accumulator    = GradientsAccumulator::new();
            let mut pending        = 0usize;

            for batch in train_loader.iter() {
                let output = self.objective.train_loss(&model, &mut wrapper, &batch);

                let loss_val: f64 = output.loss.clone().into_scalar().elem::<f64>();
                train_loss_sum += loss_val;
                train_batches  += 1;

                let grads = output.loss.div_scalar(accumulation as f64).backward();
                let grads = GradientsParams::from_grads(grads, &model);
                accumulator.accumulate(&model, grads);
                pending += 1;

                if pending == accumulation || train_batches == num_batches {
                    let lr = linear_decay(cfg.learning_rate, step, total_steps);
                    model   = optim.step(lr, model, accumulator.grads());
                    step   += 1;
                    pending = 0;

                    if cfg.save_steps > 0 && step % cfg.save_steps == 0 {
                        self.checkpoints.save_step(&model, step)?;
                        tracing::info!("Checkpoint saved at step {}", step);
                    }
                }
            }

            let avg_train_loss = if train_batches > 0 {
                train_loss_sum / train_batches as f64
            } else { f64::NAN };

            // ── Validation phase ──────────────────────────────────────────────
            // dropout disabled for deterministic evaluation
            let model_valid = model.valid();

            let mut val_loss_sum  = 0.0f64;
            let mut val_batches   = 0usize;
            let mut correct       = 0usize;
            let mut total_samples = 0usize;

            for batch in val_loader.iter() {
                let output = self.objective.eval_loss(&model_valid, &mut wrapper, &batch);

                val_loss_sum  += output.loss.into_scalar().elem::<f64>();
                val_batches   += 1;
                total_samples += batch.labels.dims()[0];
                correct       += correct_predictions(output.logits, batch.labels);
            }

            let avg_val_loss = if val_batches   > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
            let accuracy     = if total_samples > 0 { correct as f64 / total_samples as f64 } else { 0.0 };

            println!(
                "Epoch {:>3}/{} | step {:>6} | train_loss={:.4} | eval_loss={:.4} | eval_accuracy={:.1}%",
                epoch, cfg.epochs, step, avg_train_loss, avg_val_loss, accuracy * 100.0,
            );

            self.checkpoints.save_epoch(&model, epoch)?;
            tracing::info!("Checkpoint saved for epoch {}", epoch);

            let summary = EpochSummary {
                epoch,
                step,
                train_loss:    avg_train_loss,
                eval_loss:     avg_val_loss,
                eval_accuracy: accuracy,
            };
            if summary.is_improvement(best) {
                best = summary.eval_loss;
                tracing::info!("New best eval_loss {:.4} at epoch {}", best, epoch);
            }
            history.push(summary.clone());
            for subscriber in subscribers.iter_mut() {
                subscriber.on_epoch_end(&summary, &history)?;
            }
        }

        for subscriber in subscribers.iter_mut() {
            subscriber.on_train_end(&history, self.checkpoints.dir())?;
        }

        tracing::info!("Training complete!");
        Ok((model, history))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, path::Path, rc::Rc};

    use crate::data::dataset::ClassificationSample;
    use crate::ml::test_support::{tiny_config, TestAutodiffBackend};
    use crate::ml::wrapper::LayerSampler;

    #[test]
    fn test_linear_decay_reaches_zero() {
        assert_eq!(linear_decay(1e-3, 0, 10), 1e-3);
        assert!((linear_decay(1e-3, 5, 10) - 5e-4).abs() < 1e-12);
        assert_eq!(linear_decay(1e-3, 10, 10), 0.0);
        assert_eq!(linear_decay(1e-3, 15, 10), 0.0);
    }

    #[test]
    fn test_steps_per_epoch_counts_partial_groups() {
        // 20 samples / batch 8 → 3 batches → 2 steps with accumulation 2
        assert_eq!(steps_per_epoch(20, 8, 2), 2);
        assert_eq!(steps_per_epoch(16, 8, 2), 1);
        assert_eq!(steps_per_epoch(1, 8, 1), 1);
    }

    fn samples(n: usize) -> Vec<ClassificationSample> {
        (0..n)
            .map(|i| ClassificationSample {
                input_ids:      vec![2 + (i % 7) as u32, 10 + (i % 3) as u32, 0, 0],
                attention_mask: vec![1, 1, 0, 0],
                label:          i % 2,
            })
            .collect()
    }

    struct Recorder {
        epochs:   Rc<RefCell<Vec<usize>>>,
        finished: Rc<RefCell<bool>>,
    }

    impl EpochSubscriber for Recorder {
        fn on_epoch_end(&mut self, summary: &EpochSummary, history: &[EpochSummary]) -> Result<()> {
            assert_eq!(history.last(), Some(summary));
            self.epochs.borrow_mut().push(summary.epoch);
            Ok(())
        }

        fn on_train_end(&mut self, history: &[EpochSummary], _dir: &Path) -> Result<()> {
            assert_eq!(history.len(), 2);
            *self.finished.borrow_mut() = true;
            Ok(())
        }
    }

    #[test]
    fn test_fit_reports_every_epoch_and_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(tmp.path()).unwrap();
        let settings = TrainerSettings {
            learning_rate: 1e-3,
            epochs:        2,
            batch_size:    4,
            save_steps:    2,
            num_workers:   1,
            ..Default::default()
        };
        let objective = Objective::knowledge_continuity(0.1, 1e-2);

        let device = Default::default();
        let model: TransformerClassifier<TestAutodiffBackend> = tiny_config().init(&device);
        let wrapper = KnowledgeContinuousWrapper::new(LayerSampler::new(2.0, 1.0, 42).unwrap());

        let epochs = Rc::new(RefCell::new(Vec::new()));
        let finished = Rc::new(RefCell::new(false));
        let mut subscribers: Vec<Box<dyn EpochSubscriber>> = vec![Box::new(Recorder {
            epochs:   epochs.clone(),
            finished: finished.clone(),
        })];

        let (_, history) = Trainer::new(&settings, &objective, &checkpoints)
            .fit(
                model,
                wrapper,
                ClassificationDataset::new(samples(12)),
                ClassificationDataset::new(samples(4)),
                &mut subscribers,
                &device,
            )
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(*epochs.borrow(), vec![1, 2]);
        assert!(*finished.borrow());
        // 12 samples / batch 4 = 3 batches → 2 optimizer steps per epoch
        assert_eq!(history[1].step, 4);
        assert!(history.iter().all(|h| h.eval_loss.is_finite()));
        assert!(history.iter().all(|h| (0.0..=1.0).contains(&h.eval_accuracy)));
        let saved: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(saved.iter().any(|f| f.starts_with("model_step_2.")));
        assert!(saved.iter().any(|f| f.starts_with("model_step_4.")));
        assert!(saved.iter().any(|f| f.starts_with("model_epoch_2.")));
    }

    #[test]
    fn test_fit_rejects_empty_training_set() {
        let tmp = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(tmp.path()).unwrap();
        let settings = TrainerSettings::default();
        let objective = Objective::cross_entropy();
        let device = Default::default();
        let model: TransformerClassifier<TestAutodiffBackend> = tiny_config().init(&device);
        let wrapper = KnowledgeContinuousWrapper::new(LayerSampler::new(1.0, 1.0, 0).unwrap());

        let result = Trainer::new(&settings, &objective, &checkpoints).fit(
            model,
            wrapper,
            ClassificationDataset::new(Vec::new()),
            ClassificationDataset::new(samples(2)),
            &mut [],
            &device,
        );
        assert!(result.is_err());
    }
}
