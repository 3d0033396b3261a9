use image::imageops;
use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 训练增强：水平翻转 + 亮度/对比度抖动
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Augmentation {
    pub flip_probability: f64,
    pub brightness: f32,
    pub contrast: f32,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            flip_probability: 0.5,
            brightness: 0.1,
            contrast: 0.1,
        }
    }
}

/// Parameters drawn once per sequence so every frame gets the same transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    pub flip: bool,
    pub brightness_factor: f32,
    pub contrast_factor: f32,
}

impl AugmentParams {
    pub fn identity() -> Self {
        Self {
            flip: false,
            brightness_factor: 1.0,
            contrast_factor: 1.0,
        }
    }

    pub fn apply(&self, img: &mut RgbImage) {
        if self.flip {
            imageops::flip_horizontal_in_place(img);
        }
        if self.brightness_factor != 1.0 {
            for pixel in img.pixels_mut() {
                for c in pixel.0.iter_mut() {
                    *c = clamp_u8(*c as f32 * self.brightness_factor);
                }
            }
        }
        if self.contrast_factor != 1.0 {
            // 以灰度均值为中心拉伸
            let mean = grayscale_mean(img);
            for pixel in img.pixels_mut() {
                for c in pixel.0.iter_mut() {
                    *c = clamp_u8(mean + (*c as f32 - mean) * self.contrast_factor);
                }
            }
        }
    }
}

impl Augmentation {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> AugmentParams {
        AugmentParams {
            flip: rng.gen_bool(self.flip_probability.clamp(0.0, 1.0)),
            brightness_factor: jitter_factor(rng, self.brightness),
            contrast_factor: jitter_factor(rng, self.contrast),
        }
    }
}

fn jitter_factor<R: Rng + ?Sized>(rng: &mut R, amount: f32) -> f32 {
    if amount <= 0.0 {
        return 1.0;
    }
    let low = (1.0 - amount).max(0.0);
    rng.gen_range(low..=1.0 + amount)
}

fn grayscale_mean(img: &RgbImage) -> f32 {
    let count = (img.width() * img.height()) as f32;
    if count == 0.0 {
        return 0.0;
    }
    let sum: f32 = img
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .sum();
    sum / count
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
