//! 时间均匀抽帧

use super::ffmpeg::FfmpegSource;
use super::frame::RawFrame;
use crate::core::error::{DetectorError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Assumed when the container does not report a usable frame rate.
pub const FALLBACK_FPS: f64 = 30.0;

/// 按顺序产出解码帧的数据源
pub trait FrameSource {
    /// Native frame rate, `None` when unknown.
    fn native_fps(&self) -> Option<f64>;

    /// Next decoded frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_duration_secs: u32,
    pub fps_sample: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30,
            fps_sample: 3,
        }
    }
}

impl SamplingConfig {
    pub fn max_frames(&self) -> usize {
        self.max_duration_secs as usize * self.fps_sample as usize
    }

    /// Every `interval`-th source frame is kept.
    pub fn frame_interval(&self, native_fps: Option<f64>) -> u64 {
        let fps = native_fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(FALLBACK_FPS);
        let target = self.fps_sample.max(1) as f64;
        (fps / target).max(1.0).floor() as u64
    }
}

/// Pulls frames from `source` and keeps the time-uniform subset.
pub fn sample_frames<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &SamplingConfig,
) -> Result<Vec<RawFrame>> {
    let interval = config.frame_interval(source.native_fps());
    let max_frames = config.max_frames();
    debug!(
        "🎯 Sampling every {} frames, at most {} frames",
        interval, max_frames
    );

    let mut frames = Vec::new();
    let mut index: u64 = 0;
    while frames.len() < max_frames {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        if index % interval == 0 {
            frames.push(frame);
        }
        index += 1;
    }

    if frames.is_empty() {
        return Err(DetectorError::EmptySequence);
    }
    Ok(frames)
}

/// 打开视频文件并抽帧；解码器在返回前释放
pub fn sample_video(path: &Path, config: &SamplingConfig) -> Result<Vec<RawFrame>> {
    let mut source = FfmpegSource::open(path)?;
    let frames = sample_frames(&mut source, config)?;
    info!(
        "✓ Sampled {} frames from {}",
        frames.len(),
        path.display()
    );
    Ok(frames)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::video::frame::PixelLayout;

    /// 合成数据源：固定帧数，记录是否被读到末尾
    pub(crate) struct SyntheticSource {
        pub fps: Option<f64>,
        pub total: u64,
        pub produced: u64,
        pub fail_at: Option<u64>,
    }

    impl SyntheticSource {
        pub fn new(fps: Option<f64>, total: u64) -> Self {
            Self {
                fps,
                total,
                produced: 0,
                fail_at: None,
            }
        }
    }

    impl FrameSource for SyntheticSource {
        fn native_fps(&self) -> Option<f64> {
            self.fps
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            if Some(self.produced) == self.fail_at {
                return Err(DetectorError::Decode("synthetic failure".into()));
            }
            if self.produced >= self.total {
                return Ok(None);
            }
            let n = self.produced;
            self.produced += 1;
            Ok(Some(RawFrame::new(
                4,
                4,
                PixelLayout::Rgb8,
                vec![(n % 256) as u8; 48],
                n * 33,
                n,
            )))
        }
    }

    #[test]
    fn test_interval_from_native_fps() {
        let config = SamplingConfig::default();
        assert_eq!(config.frame_interval(Some(30.0)), 10);
        assert_eq!(config.frame_interval(Some(29.97)), 9);
        assert_eq!(config.frame_interval(Some(2.0)), 1);
        assert_eq!(config.frame_interval(None), 10);
        assert_eq!(config.frame_interval(Some(0.0)), 10);
        assert_eq!(config.frame_interval(Some(-12.0)), 10);
    }

    #[test]
    fn test_keeps_multiples_of_interval_in_order() {
        let mut source = SyntheticSource::new(Some(30.0), 60);
        let frames = sample_frames(&mut source, &SamplingConfig::default()).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_stops_at_max_frames() {
        let config = SamplingConfig {
            max_duration_secs: 2,
            fps_sample: 3,
        };
        let mut source = SyntheticSource::new(Some(30.0), 10_000);
        let frames = sample_frames(&mut source, &config).unwrap();
        assert_eq!(frames.len(), 6);
        // 提前停止，不再继续读取
        assert_eq!(source.produced, 51);
    }

    #[test]
    fn test_length_bounds_for_various_durations() {
        let config = SamplingConfig::default();
        for total in [30u64, 45, 300, 900, 5000] {
            let mut source = SyntheticSource::new(Some(30.0), total);
            let frames = sample_frames(&mut source, &config).unwrap();
            assert!(!frames.is_empty());
            assert!(frames.len() <= config.max_frames());
        }
    }

    #[test]
    fn test_empty_source_is_empty_sequence() {
        let mut source = SyntheticSource::new(Some(30.0), 0);
        assert!(matches!(
            sample_frames(&mut source, &SamplingConfig::default()),
            Err(DetectorError::EmptySequence)
        ));
    }

    #[test]
    fn test_decode_error_propagates() {
        let mut source = SyntheticSource::new(Some(30.0), 100);
        source.fail_at = Some(15);
        assert!(matches!(
            sample_frames(&mut source, &SamplingConfig::default()),
            Err(DetectorError::Decode(_))
        ));
    }
}
