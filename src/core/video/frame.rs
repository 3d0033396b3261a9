use crate::core::error::{DetectorError, Result};
use candle_core::{Device, Tensor};
use image::RgbImage;
use std::time::Duration;

/// 原始帧的像素排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb8,
    Bgr8,
    Rgba8,
}

impl PixelLayout {
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Rgba8 => 4,
        }
    }
}

/// 解码后的原始帧（原生分辨率、原生通道顺序）
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl RawFrame {
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            layout,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn expected_len(&self) -> usize {
        self.pixel_count() * self.layout.channels()
    }

    /// Reorders channels into packed RGB, dropping alpha.
    pub fn to_rgb(&self) -> Result<Vec<u8>> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::MalformedFrame(format!(
                "frame #{} has zero extent {}x{}",
                self.frame_number, self.width, self.height
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(DetectorError::MalformedFrame(format!(
                "frame #{} is {}x{} {:?} but carries {} bytes (expected {})",
                self.frame_number,
                self.width,
                self.height,
                self.layout,
                self.data.len(),
                self.expected_len()
            )));
        }

        let rgb = match self.layout {
            PixelLayout::Rgb8 => self.data.clone(),
            PixelLayout::Bgr8 => {
                let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
                for chunk in self.data.chunks_exact(3) {
                    rgb.push(chunk[2]);
                    rgb.push(chunk[1]);
                    rgb.push(chunk[0]);
                }
                rgb
            }
            PixelLayout::Rgba8 => {
                let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
                for chunk in self.data.chunks_exact(4) {
                    rgb.push(chunk[0]); // R
                    rgb.push(chunk[1]); // G
                    rgb.push(chunk[2]); // B
                }
                rgb
            }
        };
        Ok(rgb)
    }

    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let rgb = self.to_rgb()?;
        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| {
            DetectorError::MalformedFrame(format!("frame #{} buffer mismatch", self.frame_number))
        })
    }
}

/// 模型输入帧：3 x H x W，CHW 排列，已按 ImageNet 统计量标准化
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl NormalizedFrame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<f32>, height: usize, width: usize) -> Result<Self> {
        if data.len() != Self::CHANNELS * height * width {
            return Err(DetectorError::MalformedFrame(format!(
                "normalized frame needs {} values for 3x{}x{}, got {}",
                Self::CHANNELS * height * width,
                height,
                width,
                data.len()
            )));
        }
        Ok(Self { height, width, data })
    }

    /// Zero-filled stand-in for a frame that failed to load.
    pub fn placeholder(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            data: vec![0.0; Self::CHANNELS * height * width],
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (Self::CHANNELS, self.height, self.width)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// 一个视频的有序帧序列
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<NormalizedFrame>,
}

impl FrameSequence {
    pub fn new(frames: Vec<NormalizedFrame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(DetectorError::EmptySequence);
        }
        let shape = frames[0].shape();
        if let Some(bad) = frames.iter().position(|f| f.shape() != shape) {
            return Err(DetectorError::MalformedFrame(format!(
                "frame {} has shape {:?}, sequence uses {:?}",
                bad,
                frames[bad].shape(),
                shape
            )));
        }
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[NormalizedFrame] {
        &self.frames
    }

    /// (C, H, W) shared by every frame.
    pub fn frame_shape(&self) -> Option<(usize, usize, usize)> {
        self.frames.first().map(|f| f.shape())
    }

    /// Flattens to contiguous `T x C x H x W` values.
    pub fn to_flat(&self) -> Vec<f32> {
        let per_frame = self.frames.first().map(|f| f.data.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(per_frame * self.frames.len());
        for frame in &self.frames {
            flat.extend_from_slice(&frame.data);
        }
        flat
    }

    /// `(1, T, 3, H, W)` tensor on `device`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let (c, h, w) = self.frame_shape().ok_or(DetectorError::EmptySequence)?;
        let tensor = Tensor::from_vec(self.to_flat(), (1, self.frames.len(), c, h, w), device)?;
        Ok(tensor)
    }
}
