//! 训练循环：划分 → 每轮训练 + 验证 → 保存最佳模型

use super::checkpoint::BestCheckpoint;
use super::config::TrainingConfig;
use super::grad_scaler::{GradScaler, StepOutcome};
use super::loss::bce_with_logits;
use super::metrics::{PhaseMetrics, PhaseSummary};
use crate::core::dataset::loader::Batch;
use crate::core::dataset::{BatchLoader, FolderDataset, SequenceSource};
use crate::core::device::select_device;
use crate::core::error::{DetectorError, Result};
use crate::core::model::DeepFakeDetector;
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train: PhaseSummary,
    pub val: PhaseSummary,
    pub skipped_steps: usize,
    pub loss_scale: f64,
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    pub best_val_loss: f64,
    pub checkpoint_path: PathBuf,
    pub train_size: usize,
    pub val_size: usize,
}

/// Seeded shuffle of `0..len`, cut at `floor(len * train_split)`.
pub fn split_indices(len: usize, train_split: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if len == 0 {
        return Err(DetectorError::Configuration("dataset contains no videos".into()));
    }
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let train_len = (len as f64 * train_split).floor() as usize;
    if train_len == 0 || train_len == len {
        return Err(DetectorError::Configuration(format!(
            "{} videos with train_split {} leaves an empty subset",
            len, train_split
        )));
    }
    let val = indices.split_off(train_len);
    Ok((indices, val))
}

/// `(B, T, C, H, W)` inputs and `(B, 1)` targets.
fn stack_batch(batch: &Batch, device: &Device) -> Result<(Tensor, Tensor, Vec<f32>)> {
    let first = batch.first().ok_or(DetectorError::EmptySequence)?;
    let t = first.sequence.len();
    let (c, h, w) = first.sequence.frame_shape().ok_or(DetectorError::EmptySequence)?;

    let mut flat = Vec::with_capacity(batch.len() * t * c * h * w);
    let mut labels = Vec::with_capacity(batch.len());
    for example in batch {
        if example.sequence.len() != t || example.sequence.frame_shape() != Some((c, h, w)) {
            return Err(DetectorError::MalformedFrame(
                "sequences in a batch differ in shape".into(),
            ));
        }
        flat.extend(example.sequence.to_flat());
        labels.push(example.label);
    }

    let xs = Tensor::from_vec(flat, (batch.len(), t, c, h, w), device)?;
    let ys = Tensor::from_vec(labels.clone(), (batch.len(), 1), device)?;
    Ok((xs, ys, labels))
}

pub struct Trainer {
    config: TrainingConfig,
    model: DeepFakeDetector,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let device = select_device(config.device)?;
        let model = DeepFakeDetector::new(&config.model, &device)?;

        if let Some(path) = config.pretrained.resolve()? {
            model.load_backbone_weights(&path)?;
        }

        info!("🧠 Model ready: {:?}", model);
        Ok(Self { config, model })
    }

    pub fn model(&self) -> &DeepFakeDetector {
        &self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn fit(&mut self, source: Arc<dyn SequenceSource>) -> Result<TrainingReport> {
        let cfg = &self.config;
        let (train_idx, val_idx) = split_indices(source.len(), cfg.train_split, cfg.seed)?;
        let (train_size, val_size) = (train_idx.len(), val_idx.len());
        info!("📊 Split: {} train / {} val", train_size, val_size);

        let train_loader = BatchLoader::new(Arc::clone(&source), train_idx, cfg.batch_size, cfg.num_workers)?
            .prefetch(cfg.prefetch_batches)
            .augment(cfg.augment)
            .shuffle(cfg.seed);
        let val_loader = BatchLoader::new(source, val_idx, cfg.batch_size, cfg.num_workers)?
            .prefetch(cfg.prefetch_batches);

        let vars = self.model.vars();
        let mut optimizer = AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr: cfg.learning_rate,
                weight_decay: cfg.weight_decay,
                ..Default::default()
            },
        )?;
        let mut scaler = GradScaler::new(cfg.grad_scaler);
        let mut best = BestCheckpoint::new();
        let device = self.model.device().clone();

        let mut epochs = Vec::with_capacity(cfg.num_epochs);
        for epoch in 0..cfg.num_epochs {
            let started = Instant::now();
            info!("🚀 Epoch {}/{}", epoch + 1, cfg.num_epochs);

            // train
            let mut train_metrics = PhaseMetrics::default();
            let mut skipped_steps = 0;
            for batch in train_loader.epoch(epoch) {
                let (xs, ys, labels) = stack_batch(&batch?, &device)?;
                let logits = self.model.forward_logits(&xs, true)?;
                let loss = bce_with_logits(&logits, &ys)?;

                if scaler.step(&mut optimizer, &loss, &vars)? == StepOutcome::Skipped {
                    skipped_steps += 1;
                }

                let probs = candle_nn::ops::sigmoid(&logits.detach())?;
                let probs: Vec<f32> = probs.flatten_all()?.to_vec1()?;
                train_metrics.record(loss.to_scalar::<f32>()?, &probs, &labels);
            }
            let train = train_metrics.finish(train_size);

            // validate
            let mut val_metrics = PhaseMetrics::default();
            for batch in val_loader.epoch(epoch) {
                let (xs, ys, labels) = stack_batch(&batch?, &device)?;
                let logits = self.model.forward_logits(&xs, false)?.detach();
                let loss = bce_with_logits(&logits, &ys)?;
                let probs: Vec<f32> = candle_nn::ops::sigmoid(&logits)?.flatten_all()?.to_vec1()?;
                val_metrics.record(loss.to_scalar::<f32>()?, &probs, &labels);
            }
            let val = val_metrics.finish(val_size);

            info!(
                "Train Loss: {:.4} Acc: {:.4} | Val Loss: {:.4} Acc: {:.4} ({:.1}s)",
                train.loss,
                train.accuracy,
                val.loss,
                val.accuracy,
                started.elapsed().as_secs_f64()
            );
            if skipped_steps > 0 {
                warn!("⚠️ {} steps skipped on gradient overflow", skipped_steps);
            }

            let saved = best.observe(val.loss);
            if saved {
                self.model.save(&cfg.checkpoint_path)?;
                info!("💾 Saved best model to {}", cfg.checkpoint_path.display());
            }

            epochs.push(EpochSummary {
                epoch: epoch + 1,
                train,
                val,
                skipped_steps,
                loss_scale: scaler.scale(),
                saved,
            });
        }

        info!("✅ Training complete, best val loss {:.4}", best.best());
        Ok(TrainingReport {
            epochs,
            best_val_loss: best.best(),
            checkpoint_path: cfg.checkpoint_path.clone(),
            train_size,
            val_size,
        })
    }
}

/// Trains on the folder dataset under `config.data_dir`.
/// An empty or unsplittable dataset fails before any device or model setup.
pub fn train(config: TrainingConfig) -> Result<TrainingReport> {
    config.validate()?;
    let dataset = FolderDataset::open(&config.data_dir, config.seq_len)?
        .with_image_size(config.image_size)
        .with_augmentation(config.augmentation);
    split_indices(dataset.len(), config.train_split, config.seed)?;

    let mut trainer = Trainer::new(config)?;
    trainer.fit(Arc::new(dataset))
}
