use serde::{Deserialize, Serialize};

/// EfficientNet 缩放系数；B0 为 (1.0, 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackboneConfig {
    pub width_mult: f64,
    pub depth_mult: f64,
    /// BatchNorm epsilon; torchvision B0 checkpoints are trained with 1e-5.
    pub bn_eps: f64,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self::b0()
    }
}

impl BackboneConfig {
    pub fn b0() -> Self {
        Self {
            width_mult: 1.0,
            depth_mult: 1.0,
            bn_eps: 1e-5,
        }
    }

    /// Stage table, one entry per MBConv stage.
    pub fn stages(&self) -> Vec<MBConvConfig> {
        let stage = |e: f64, k, s, i: usize, o: usize, n: usize| MBConvConfig {
            expand_ratio: e,
            kernel: k,
            stride: s,
            input_channels: make_divisible(i as f64 * self.width_mult, 8),
            out_channels: make_divisible(o as f64 * self.width_mult, 8),
            num_layers: (n as f64 * self.depth_mult).ceil().max(1.0) as usize,
        };
        vec![
            stage(1., 3, 1, 32, 16, 1),
            stage(6., 3, 2, 16, 24, 2),
            stage(6., 5, 2, 24, 40, 2),
            stage(6., 3, 2, 40, 80, 3),
            stage(6., 5, 1, 80, 112, 3),
            stage(6., 5, 2, 112, 192, 4),
            stage(6., 3, 1, 192, 320, 1),
        ]
    }

    /// Width of the pooled feature vector (1280 for B0).
    pub fn feature_dim(&self) -> usize {
        4 * self.stages().last().map(|s| s.out_channels).unwrap_or(320)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MBConvConfig {
    pub expand_ratio: f64,
    pub kernel: usize,
    pub stride: usize,
    pub input_channels: usize,
    pub out_channels: usize,
    pub num_layers: usize,
}

pub fn make_divisible(v: f64, divisor: usize) -> usize {
    let min_value = divisor;
    let new_v = usize::max(
        min_value,
        (v + divisor as f64 * 0.5) as usize / divisor * divisor,
    );
    if (new_v as f64) < 0.9 * v {
        new_v + divisor
    } else {
        new_v
    }
}

/// 检测模型整体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backbone: BackboneConfig,
    /// Hidden units per LSTM direction.
    pub lstm_hidden: usize,
    pub fc_hidden: usize,
    pub dropout: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backbone: BackboneConfig::b0(),
            lstm_hidden: 128,
            fc_hidden: 64,
            dropout: 0.5,
        }
    }
}

impl DetectorConfig {
    /// Narrow, shallow variant for smoke runs and tests.
    pub fn compact() -> Self {
        Self {
            backbone: BackboneConfig {
                width_mult: 0.25,
                depth_mult: 0.34,
                ..BackboneConfig::b0()
            },
            lstm_hidden: 16,
            fc_hidden: 8,
            dropout: 0.5,
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.backbone.feature_dim()
    }

    pub fn aggregated_dim(&self) -> usize {
        2 * self.lstm_hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b0_dimensions() {
        let config = DetectorConfig::default();
        assert_eq!(config.feature_dim(), 1280);
        assert_eq!(config.aggregated_dim(), 256);

        let stages = config.backbone.stages();
        let blocks: usize = stages.iter().map(|s| s.num_layers).sum();
        assert_eq!(blocks, 16);
        assert_eq!(stages[0].input_channels, 32);
    }

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(8.0, 8), 8);
        assert_eq!(make_divisible(4.0, 8), 8);
        assert_eq!(make_divisible(96.0, 8), 96);
    }

    #[test]
    fn test_compact_is_smaller() {
        let compact = DetectorConfig::compact();
        assert!(compact.feature_dim() < 1280);
        assert!(compact.backbone.stages().iter().all(|s| s.num_layers >= 1));
    }
}
