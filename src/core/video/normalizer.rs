//! 帧标准化 - 统一缩放到 224x224 并按 ImageNet 统计量归一化

use super::frame::{NormalizedFrame, RawFrame};
use crate::core::error::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;

pub const IMAGE_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize + channel reorder + standardization. Aspect ratio is not preserved.
#[derive(Debug, Clone, Copy)]
pub struct FrameNormalizer {
    size: u32,
}

impl FrameNormalizer {
    pub fn new() -> Self {
        Self { size: IMAGE_SIZE }
    }

    /// Square output of `size` pixels; training on small frames uses this.
    pub fn with_size(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn normalize(&self, frame: &RawFrame) -> Result<NormalizedFrame> {
        let img = frame.to_rgb_image()?;
        self.normalize_image(&img)
    }

    pub fn normalize_image(&self, img: &RgbImage) -> Result<NormalizedFrame> {
        let resized = if img.dimensions() == (self.size, self.size) {
            img.clone()
        } else {
            imageops::resize(img, self.size, self.size, FilterType::Triangle)
        };

        let plane = (self.size * self.size) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                let v = pixel[c] as f32 / 255.0;
                data[c * plane + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        NormalizedFrame::new(data, self.size as usize, self.size as usize)
    }
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DetectorError;
    use crate::core::video::frame::PixelLayout;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3], layout: PixelLayout) -> RawFrame {
        let px: Vec<u8> = match layout {
            PixelLayout::Rgb8 => rgb.to_vec(),
            PixelLayout::Bgr8 => vec![rgb[2], rgb[1], rgb[0]],
            PixelLayout::Rgba8 => vec![rgb[0], rgb[1], rgb[2], 255],
        };
        let data = px.repeat((width * height) as usize);
        RawFrame::new(width, height, layout, data, 0, 0)
    }

    #[test]
    fn test_output_shape_independent_of_input_resolution() {
        let normalizer = FrameNormalizer::new();
        for (w, h) in [(640, 480), (224, 224), (31, 997), (1, 1)] {
            let frame = solid_frame(w, h, [10, 20, 30], PixelLayout::Rgb8);
            let out = normalizer.normalize(&frame).unwrap();
            assert_eq!(out.shape(), (3, 224, 224));
            assert_eq!(out.data().len(), 3 * 224 * 224);
        }
    }

    #[test]
    fn test_imagenet_standardization() {
        let normalizer = FrameNormalizer::new();
        let frame = solid_frame(50, 40, [255, 0, 128], PixelLayout::Rgb8);
        let out = normalizer.normalize(&frame).unwrap();
        let plane = 224 * 224;

        let r = out.data()[0];
        let g = out.data()[plane];
        let b = out.data()[2 * plane];
        assert!((r - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert!((g - (0.0 - 0.456) / 0.224).abs() < 1e-4);
        assert!((b - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-4);
    }

    #[test]
    fn test_bgr_input_matches_rgb_input() {
        let normalizer = FrameNormalizer::new();
        let rgb = normalizer
            .normalize(&solid_frame(16, 16, [200, 100, 50], PixelLayout::Rgb8))
            .unwrap();
        let bgr = normalizer
            .normalize(&solid_frame(16, 16, [200, 100, 50], PixelLayout::Bgr8))
            .unwrap();
        assert_eq!(rgb, bgr);
    }

    #[test]
    fn test_unexpected_channel_count_fails() {
        let normalizer = FrameNormalizer::new();
        // 声明 RGB 但数据是单通道
        let frame = RawFrame::new(10, 10, PixelLayout::Rgb8, vec![0u8; 100], 0, 3);
        assert!(matches!(
            normalizer.normalize(&frame),
            Err(DetectorError::MalformedFrame(_))
        ));
    }
}
