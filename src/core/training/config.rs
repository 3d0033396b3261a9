use super::grad_scaler::GradScalerConfig;
use crate::core::dataset::Augmentation;
use crate::core::device::DeviceChoice;
use crate::core::error::{DetectorError, Result};
use crate::core::model::{DetectorConfig, PretrainedSource};
use crate::core::video::IMAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_workers() -> usize {
    num_cpus::get().clamp(1, 4)
}

/// 训练配置，可从 json5 文件加载，缺省字段取默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub num_workers: usize,
    pub seq_len: usize,
    pub image_size: u32,
    pub checkpoint_path: PathBuf,
    pub device: DeviceChoice,
    /// Fraction of videos used for training, the rest validates.
    pub train_split: f64,
    pub seed: u64,
    /// Random flip and color jitter on the training subset only.
    pub augment: bool,
    pub augmentation: Augmentation,
    pub prefetch_batches: usize,
    pub pretrained: PretrainedSource,
    pub grad_scaler: GradScalerConfig,
    pub model: DetectorConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            batch_size: 4,
            num_epochs: 10,
            learning_rate: 1e-4,
            weight_decay: 0.0,
            num_workers: default_workers(),
            seq_len: 20,
            image_size: IMAGE_SIZE,
            checkpoint_path: PathBuf::from("best_model.safetensors"),
            device: DeviceChoice::Auto,
            train_split: 0.8,
            seed: 42,
            augment: true,
            augmentation: Augmentation::default(),
            prefetch_batches: 2,
            pretrained: PretrainedSource::None,
            grad_scaler: GradScalerConfig::default(),
            model: DetectorConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(DetectorError::Configuration(msg.to_string()));
        if self.batch_size == 0 {
            return bad("batch_size must be positive");
        }
        if self.seq_len == 0 {
            return bad("seq_len must be positive");
        }
        if self.image_size == 0 {
            return bad("image_size must be positive");
        }
        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            return bad("train_split must be in (0, 1)");
        }
        if !(self.learning_rate > 0.0) {
            return bad("learning_rate must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub data_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub batch_size: usize,
    pub num_workers: usize,
    pub seq_len: usize,
    pub image_size: u32,
    pub device: DeviceChoice,
    pub model: DetectorConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            checkpoint_path: PathBuf::from("best_model.safetensors"),
            batch_size: 4,
            num_workers: default_workers(),
            seq_len: 20,
            image_size: IMAGE_SIZE,
            device: DeviceChoice::Auto,
            model: DetectorConfig::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.num_epochs, 10);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.seq_len, 20);
        assert_eq!(config.train_split, 0.8);
        assert!(config.num_workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json5");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                data_dir: "/data/faces",
                num_epochs: 3,
                device: "cpu",
                pretrained: { path: "/weights/b0.safetensors" },
            }"#,
        )
        .unwrap();

        let config = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data/faces"));
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.device, DeviceChoice::Cpu);
        assert_eq!(
            config.pretrained,
            PretrainedSource::Path(PathBuf::from("/weights/b0.safetensors"))
        );
        assert_eq!(config.batch_size, 4);
    }

    #[test]
    fn test_invalid_split_rejected() {
        let config = TrainingConfig {
            train_split: 1.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(config.validate(), Err(DetectorError::Configuration(_))));
    }
}
