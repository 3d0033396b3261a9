//! 完整检测模型：空间编码 → 双向 LSTM → 分类头

use super::backbone::SpatialEncoder;
use super::config::DetectorConfig;
use super::head::ClassifierHead;
use super::temporal::TemporalAggregator;
use crate::core::error::{DetectorError, Result};
use crate::core::video::FrameSequence;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use log::{error, info, warn};
use std::path::Path;

/// 权重加载结果，供健康检查使用
#[derive(Debug, Clone, PartialEq)]
pub enum WeightsStatus {
    Loaded,
    RandomInit { reason: String },
}

impl WeightsStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, WeightsStatus::Loaded)
    }
}

pub struct DeepFakeDetector {
    encoder: SpatialEncoder,
    aggregator: TemporalAggregator,
    head: ClassifierHead,
    var_map: VarMap,
    config: DetectorConfig,
    device: Device,
}

impl std::fmt::Debug for DeepFakeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DeepFakeDetector(features={}, lstm={}x2, fc={}, device={:?})",
            self.encoder.feature_dim(),
            self.config.lstm_hidden,
            self.config.fc_hidden,
            self.device
        )
    }
}

impl DeepFakeDetector {
    /// Freshly initialized, trainable model backed by its own `VarMap`.
    pub fn new(config: &DetectorConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);

        let encoder = SpatialEncoder::new(vb.pp("backbone"), &config.backbone)?;
        let aggregator =
            TemporalAggregator::new(vb.pp("lstm"), encoder.feature_dim(), config.lstm_hidden)?;
        let head = ClassifierHead::new(
            vb.pp("fc"),
            aggregator.output_dim(),
            config.fc_hidden,
            config.dropout,
        )?;

        Ok(Self {
            encoder,
            aggregator,
            head,
            var_map,
            config: config.clone(),
            device: device.clone(),
        })
    }

    /// Loads a checkpoint, failing with `WeightsLoad` when it is missing or
    /// does not fit this architecture.
    pub fn load(config: &DetectorConfig, path: &Path, device: &Device) -> Result<Self> {
        if !path.is_file() {
            return Err(DetectorError::WeightsLoad {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        let mut model = Self::new(config, device)?;
        model
            .var_map
            .load(path)
            .map_err(|e| DetectorError::WeightsLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        info!("✅ Successfully loaded weights from {}", path.display());
        Ok(model)
    }

    /// Loads the checkpoint if possible, otherwise falls back to random
    /// initialization with a loud warning.
    pub fn load_or_init(
        config: &DetectorConfig,
        path: &Path,
        device: &Device,
    ) -> Result<(Self, WeightsStatus)> {
        match Self::load(config, path, device) {
            Ok(model) => Ok((model, WeightsStatus::Loaded)),
            Err(DetectorError::WeightsLoad { reason, .. }) => {
                error!("❌ Failed to load weights from {}: {}", path.display(), reason);
                warn!("⚠️  Using random initialization. Predictions will be random!");
                let model = Self::new(config, device)?;
                Ok((model, WeightsStatus::RandomInit { reason }))
            }
            Err(e) => Err(e),
        }
    }

    /// Writes every parameter (and batch-norm statistics) to one safetensors file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.var_map
            .save(path)
            .map_err(|e| DetectorError::Checkpoint(format!("{}: {}", path.display(), e)))
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    pub fn vars(&self) -> Vec<Var> {
        self.var_map.all_vars()
    }

    /// `(B, T, 3, H, W)` → pre-sigmoid scores `(B, 1)`.
    pub fn forward_logits(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let features = self.encoder.encode_sequences(xs, train)?;
        let aggregated = self.aggregator.aggregate(&features)?;
        Ok(self.head.logits(&aggregated, train)?)
    }

    /// `(B, T, 3, H, W)` → fake-probability `(B, 1)`.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let features = self.encoder.encode_sequences(xs, train)?;
        let aggregated = self.aggregator.aggregate(&features)?;
        Ok(self.head.probability(&aggregated, train)?)
    }

    /// Evaluation-mode probability for one sequence.
    pub fn predict(&self, sequence: &FrameSequence) -> Result<f32> {
        let xs = sequence.to_tensor(&self.device)?;
        let probs = self.forward_t(&xs, false)?;
        let probs: Vec<f32> = probs.flatten_all()?.to_vec1()?;
        probs.first().copied().ok_or(DetectorError::EmptySequence)
    }

    /// Copies ImageNet backbone weights (torchvision names, classifier
    /// ignored) into the spatial encoder. Returns the number of tensors set.
    pub fn load_backbone_weights(&self, path: &Path) -> Result<usize> {
        let weights_err = |reason: String| DetectorError::WeightsLoad {
            path: path.to_path_buf(),
            reason,
        };
        let tensors = candle_core::safetensors::load(path, &self.device)
            .map_err(|e| weights_err(e.to_string()))?;

        let data = self
            .var_map
            .data()
            .lock()
            .map_err(|e| weights_err(format!("parameter lock poisoned: {}", e)))?;

        let mut loaded = 0;
        for (name, var) in data.iter() {
            let Some(key) = name.strip_prefix("backbone.") else {
                continue;
            };
            let Some(tensor) = tensors.get(key) else {
                continue;
            };
            let tensor = tensor.to_dtype(DType::F32)?;
            var.set(&tensor)
                .map_err(|e| weights_err(format!("{}: {}", key, e)))?;
            loaded += 1;
        }

        if loaded == 0 {
            return Err(weights_err("no backbone tensors matched".into()));
        }
        info!("✅ Loaded {} pretrained backbone tensors from {}", loaded, path.display());
        Ok(loaded)
    }
}
