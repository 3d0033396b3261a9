//! 后台预取批次：rayon 并行加载 + 有界通道

use super::{LabeledExample, SequenceSource};
use crate::core::error::{DetectorError, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub type Batch = Vec<LabeledExample>;

pub struct BatchLoader {
    source: Arc<dyn SequenceSource>,
    indices: Vec<usize>,
    batch_size: usize,
    prefetch: usize,
    augment: bool,
    shuffle_seed: Option<u64>,
    pool: Arc<ThreadPool>,
}

impl BatchLoader {
    pub fn new(
        source: Arc<dyn SequenceSource>,
        indices: Vec<usize>,
        batch_size: usize,
        num_workers: usize,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .thread_name(|i| format!("loader-{}", i))
            .build()
            .map_err(|e| DetectorError::Configuration(format!("loader pool: {}", e)))?;

        Ok(Self {
            source,
            indices,
            batch_size: batch_size.max(1),
            prefetch: 2,
            augment: false,
            shuffle_seed: None,
            pool: Arc::new(pool),
        })
    }

    /// Bounded queue depth; at least one batch.
    pub fn prefetch(mut self, depth: usize) -> Self {
        self.prefetch = depth.max(1);
        self
    }

    pub fn augment(mut self, augment: bool) -> Self {
        self.augment = augment;
        self
    }

    /// Reshuffle every epoch from `seed + epoch`.
    pub fn shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order = self.indices.clone();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Starts the producer thread for one pass over the data.
    pub fn epoch(&self, epoch: usize) -> EpochBatches {
        let order = self.epoch_order(epoch);
        let (tx, rx) = mpsc::sync_channel(self.prefetch);
        let source = Arc::clone(&self.source);
        let pool = Arc::clone(&self.pool);
        let batch_size = self.batch_size;
        let augment = self.augment;

        let handle = thread::spawn(move || {
            for chunk in order.chunks(batch_size) {
                let batch: Result<Batch> = pool.install(|| {
                    chunk
                        .par_iter()
                        .map(|&i| source.load(i, augment))
                        .collect()
                });
                if tx.send(batch).is_err() {
                    debug!("loader consumer hung up at epoch {}", epoch);
                    return;
                }
            }
        });

        EpochBatches {
            rx: Some(rx),
            handle: Some(handle),
        }
    }
}

/// Batches of one epoch in order. Dropping it stops the producer.
pub struct EpochBatches {
    rx: Option<Receiver<Result<Batch>>>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for EpochBatches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for EpochBatches {
    fn drop(&mut self) {
        // 先关闭接收端，阻塞在 send 上的生产者才会退出
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
