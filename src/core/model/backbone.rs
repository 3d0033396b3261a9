//! Spatial encoder: EfficientNet feature trunk with the classifier removed.
//!
//! Parameter names follow the torchvision layout (`features.{stage}.{layer}.block.{k}`)
//! so ImageNet weights exported from torchvision load without renaming.

use super::config::{make_divisible, BackboneConfig, MBConvConfig};
use candle_core::{Result, Tensor, D};
use candle_nn::{batch_norm, conv2d, conv2d_no_bias, BatchNorm, Conv2d, Conv2dConfig};
use candle_nn::{Module, ModuleT, VarBuilder};

#[derive(Debug)]
struct ConvNormActivation {
    conv: Conv2d,
    bn: BatchNorm,
    activation: bool,
}

impl ConvNormActivation {
    fn new(
        vb: VarBuilder,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        eps: f64,
    ) -> Result<Self> {
        let config = Conv2dConfig {
            padding: (kernel - 1) / 2,
            stride,
            groups,
            ..Default::default()
        };
        let conv = conv2d_no_bias(in_channels, out_channels, kernel, config, vb.pp("0"))?;
        let bn = batch_norm(out_channels, eps, vb.pp("1"))?;
        Ok(Self {
            conv,
            bn,
            activation: true,
        })
    }

    fn no_activation(self) -> Self {
        Self {
            activation: false,
            ..self
        }
    }
}

impl ModuleT for ConvNormActivation {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?.apply_t(&self.bn, train)?;
        if self.activation {
            xs.silu()
        } else {
            Ok(xs)
        }
    }
}

#[derive(Debug)]
struct SqueezeExcitation {
    fc1: Conv2d,
    fc2: Conv2d,
}

impl SqueezeExcitation {
    fn new(vb: VarBuilder, in_channels: usize, squeeze_channels: usize) -> Result<Self> {
        let fc1 = conv2d(
            in_channels,
            squeeze_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("fc1"),
        )?;
        let fc2 = conv2d(
            squeeze_channels,
            in_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("fc2"),
        )?;
        Ok(Self { fc1, fc2 })
    }
}

impl Module for SqueezeExcitation {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // adaptive_avg_pool2d([1, 1])
        let scale = xs.mean_keepdim(D::Minus2)?.mean_keepdim(D::Minus1)?;
        let scale = self.fc1.forward(&scale)?.silu()?;
        let scale = candle_nn::ops::sigmoid(&self.fc2.forward(&scale)?)?;
        xs.broadcast_mul(&scale)
    }
}

#[derive(Debug)]
struct MBConv {
    expand: Option<ConvNormActivation>,
    depthwise: ConvNormActivation,
    squeeze_excitation: SqueezeExcitation,
    project: ConvNormActivation,
    use_residual: bool,
}

impl MBConv {
    fn new(vb: VarBuilder, c: MBConvConfig, eps: f64) -> Result<Self> {
        let vb = vb.pp("block");
        let expanded = make_divisible(c.input_channels as f64 * c.expand_ratio, 8);
        let expand = if expanded != c.input_channels {
            Some(ConvNormActivation::new(
                vb.pp("0"),
                c.input_channels,
                expanded,
                1,
                1,
                1,
                eps,
            )?)
        } else {
            None
        };
        let start = if expand.is_some() { 1 } else { 0 };
        let depthwise = ConvNormActivation::new(
            vb.pp(start),
            expanded,
            expanded,
            c.kernel,
            c.stride,
            expanded,
            eps,
        )?;
        let squeeze_channels = usize::max(1, c.input_channels / 4);
        let squeeze_excitation =
            SqueezeExcitation::new(vb.pp(start + 1), expanded, squeeze_channels)?;
        let project =
            ConvNormActivation::new(vb.pp(start + 2), expanded, c.out_channels, 1, 1, 1, eps)?
                .no_activation();

        Ok(Self {
            expand,
            depthwise,
            squeeze_excitation,
            project,
            use_residual: c.stride == 1 && c.input_channels == c.out_channels,
        })
    }
}

impl ModuleT for MBConv {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let ys = match &self.expand {
            Some(expand) => expand.forward_t(xs, train)?,
            None => xs.clone(),
        };
        let ys = self.depthwise.forward_t(&ys, train)?;
        let ys = self.squeeze_excitation.forward(&ys)?;
        let ys = self.project.forward_t(&ys, train)?;
        if self.use_residual {
            ys + xs
        } else {
            Ok(ys)
        }
    }
}

/// 逐帧空间编码器，输出池化后的特征向量
#[derive(Debug)]
pub struct SpatialEncoder {
    stem: ConvNormActivation,
    blocks: Vec<MBConv>,
    head: ConvNormActivation,
    feature_dim: usize,
}

impl SpatialEncoder {
    pub fn new(vb: VarBuilder, config: &BackboneConfig) -> Result<Self> {
        let vb = vb.pp("features");
        let stages = config.stages();
        let first_in = stages[0].input_channels;
        let last_out = stages[stages.len() - 1].out_channels;
        let feature_dim = config.feature_dim();

        let eps = config.bn_eps;
        let stem = ConvNormActivation::new(vb.pp(0), 3, first_in, 3, 2, 1, eps)?;
        let mut blocks = Vec::new();
        for (index, stage) in stages.iter().enumerate() {
            let vb = vb.pp(index + 1);
            for layer in 0..stage.num_layers {
                let c = if layer == 0 {
                    *stage
                } else {
                    MBConvConfig {
                        input_channels: stage.out_channels,
                        stride: 1,
                        ..*stage
                    }
                };
                blocks.push(MBConv::new(vb.pp(layer), c, eps)?);
            }
        }
        let head = ConvNormActivation::new(vb.pp(stages.len() + 1), last_out, feature_dim, 1, 1, 1, eps)?;

        Ok(Self {
            stem,
            blocks,
            head,
            feature_dim,
        })
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Encodes a sequence batch frame by frame: `(B, T, C, H, W)` → `(B, T, F)`.
    pub fn encode_sequences(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (b, t, c, h, w) = xs.dims5()?;
        let folded = xs.reshape((b * t, c, h, w))?;
        let features = self.forward_t(&folded, train)?;
        features.reshape((b, t, self.feature_dim))
    }
}

impl ModuleT for SpatialEncoder {
    /// `(N, 3, H, W)` → `(N, F)`.
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut xs = self.stem.forward_t(xs, train)?;
        for block in &self.blocks {
            xs = block.forward_t(&xs, train)?;
        }
        let xs = self.head.forward_t(&xs, train)?;
        xs.mean(D::Minus1)?.mean(D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use crate::core::model::DetectorConfig;
    use candle_nn::VarMap;

    #[test]
    fn test_encode_sequences_folds_and_unfolds() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        let config = DetectorConfig::compact().backbone;
        let encoder = SpatialEncoder::new(vb, &config).unwrap();

        let xs = Tensor::randn(0f32, 1.0, (2, 3, 3, 32, 32), &device).unwrap();
        let features = encoder.encode_sequences(&xs, false).unwrap();
        assert_eq!(features.dims(), &[2, 3, config.feature_dim()]);
    }

    #[test]
    fn test_frames_are_encoded_independently() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        let config = DetectorConfig::compact().backbone;
        let encoder = SpatialEncoder::new(vb, &config).unwrap();

        let xs = Tensor::randn(0f32, 1.0, (1, 2, 3, 32, 32), &device).unwrap();
        let together = encoder.encode_sequences(&xs, false).unwrap();
        let alone = encoder
            .forward_t(&xs.get(0).unwrap().get(1).unwrap().unsqueeze(0).unwrap(), false)
            .unwrap();

        let a: Vec<f32> = together.get(0).unwrap().get(1).unwrap().to_vec1().unwrap();
        let b: Vec<f32> = alone.get(0).unwrap().to_vec1().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_eval_norm_uses_configured_eps() {
        let device = Device::Cpu;
        for eps in [1e-5, 1e-3] {
            let mut var_map = VarMap::new();
            let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
            let layer = ConvNormActivation::new(vb, 1, 1, 1, 1, 1, eps).unwrap().no_activation();
            var_map
                .set_one("0.weight", Tensor::ones((1, 1, 1, 1), DType::F32, &device).unwrap())
                .unwrap();

            // 初始 running_mean=0, running_var=1：输出 = 1 / sqrt(1 + eps)
            let xs = Tensor::ones((1, 1, 2, 2), DType::F32, &device).unwrap();
            let ys: Vec<f32> = layer
                .forward_t(&xs, false)
                .unwrap()
                .flatten_all()
                .unwrap()
                .to_vec1()
                .unwrap();
            let expected = (1.0 / (1.0 + eps).sqrt()) as f32;
            assert!(ys.iter().all(|y| (y - expected).abs() < 1e-6), "{:?} vs {}", ys, expected);
        }
        assert_eq!(BackboneConfig::default().bn_eps, 1e-5);
    }

    #[test]
    fn test_b0_parameter_names_match_torchvision() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        SpatialEncoder::new(vb.pp("backbone"), &BackboneConfig::b0()).unwrap();

        let data = var_map.data().lock().unwrap();
        assert!(data.contains_key("backbone.features.0.0.weight"));
        assert!(data.contains_key("backbone.features.1.0.block.0.0.weight"));
        assert!(data.contains_key("backbone.features.2.0.block.2.fc1.weight"));
        assert!(data.contains_key("backbone.features.6.3.block.3.1.running_var"));
        assert!(data.contains_key("backbone.features.8.0.weight"));
        assert_eq!(data["backbone.features.8.0.weight"].dims(), &[1280, 320, 1, 1]);
    }
}
