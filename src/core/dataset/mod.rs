//! 训练数据：按视频文件夹组织的帧序列

pub mod augment;
pub mod folder;
pub mod loader;

pub use augment::Augmentation;
pub use folder::FolderDataset;
pub use loader::BatchLoader;

use crate::core::error::Result;
use crate::core::video::FrameSequence;

pub const LABEL_REAL: f32 = 0.0;
pub const LABEL_FAKE: f32 = 1.0;

/// One training item.
#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub sequence: FrameSequence,
    /// 0.0 = real, 1.0 = fake
    pub label: f32,
}

/// Indexable source of labeled sequences, shared with loader threads.
pub trait SequenceSource: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads item `index`; `augment` is true only for training-subset items.
    fn load(&self, index: usize, augment: bool) -> Result<LabeledExample>;
}
