//! 视频鉴伪入口：抽帧 → 标准化 → 模型推理 → 判定

use super::models::AnalysisResponse;
use crate::core::device::{select_device, DeviceChoice};
use crate::core::error::Result;
use crate::core::model::{DeepFakeDetector, DetectorConfig, WeightsStatus};
use crate::core::verdict::{ConfidenceThresholds, Verdict};
use crate::core::video::{sample_video, FrameNormalizer, FrameSequence, SamplingConfig};
use log::{error, info};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const WEIGHTS_ENV: &str = "DEEPFAKE_WEIGHTS";
pub const DEVICE_ENV: &str = "DEEPFAKE_DEVICE";
pub const DEFAULT_WEIGHTS: &str = "best_model.safetensors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub checkpoint_path: PathBuf,
    pub device: DeviceChoice,
    pub sampling: SamplingConfig,
    pub thresholds: ConfidenceThresholds,
    pub model: DetectorConfig,
    pub image_size: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_WEIGHTS),
            device: DeviceChoice::Auto,
            sampling: SamplingConfig::default(),
            thresholds: ConfidenceThresholds::default(),
            model: DetectorConfig::default(),
            image_size: crate::core::video::IMAGE_SIZE,
        }
    }
}

impl AnalyzerConfig {
    /// Defaults overridden by `DEEPFAKE_WEIGHTS` and `DEEPFAKE_DEVICE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(WEIGHTS_ENV) {
            if !path.trim().is_empty() {
                config.checkpoint_path = PathBuf::from(path);
            }
        }
        if let Ok(device) = std::env::var(DEVICE_ENV) {
            config.device = device.parse()?;
        }
        Ok(config)
    }
}

/// 持有已加载模型的分析器，推理期间只读共享
pub struct VideoAnalyzer {
    model: DeepFakeDetector,
    normalizer: FrameNormalizer,
    config: AnalyzerConfig,
    weights: WeightsStatus,
}

impl VideoAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let device = select_device(config.device)?;
        let (model, weights) =
            DeepFakeDetector::load_or_init(&config.model, &config.checkpoint_path, &device)?;
        info!("🎬 VideoAnalyzer: created ({:?})", model);

        Ok(Self {
            model,
            normalizer: FrameNormalizer::with_size(config.image_size),
            config,
            weights,
        })
    }

    /// `false` means predictions come from random weights.
    pub fn weights_loaded(&self) -> bool {
        self.weights.is_loaded()
    }

    pub fn weights_status(&self) -> &WeightsStatus {
        &self.weights
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn predict(&self, path: &Path) -> Result<Verdict> {
        let raw = sample_video(path, &self.config.sampling)?;
        let frames = raw
            .iter()
            .map(|f| self.normalizer.normalize(f))
            .collect::<Result<Vec<_>>>()?;
        let sequence = FrameSequence::new(frames)?;

        let probability = self.model.predict(&sequence)?;
        let verdict = Verdict::from_probability(probability as f64, &self.config.thresholds);
        info!(
            "✅ {}: {:?} p={:.4} ({:?}, {} frames)",
            path.display(),
            verdict.label,
            verdict.probability,
            verdict.confidence,
            sequence.len()
        );
        Ok(verdict)
    }

    /// Never fails: every error, including a panic, becomes a failed response.
    pub fn analyze(&self, path: &Path) -> AnalysisResponse {
        match panic::catch_unwind(AssertUnwindSafe(|| self.predict(path))) {
            Ok(Ok(result)) => AnalysisResponse::Completed { result },
            Ok(Err(e)) => {
                error!("❌ Analysis of {} failed: {}", path.display(), e);
                AnalysisResponse::failed(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("❌ Analysis of {} panicked: {}", path.display(), message);
                AnalysisResponse::failed(format!("internal error: {}", message))
            }
        }
    }
}

impl Drop for VideoAnalyzer {
    fn drop(&mut self) {
        info!("🗑️ VideoAnalyzer: released");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 惰性构造、只构造一次的缓存；并发首次访问时其余调用方等待
pub struct ModelCache<T> {
    cell: OnceCell<T>,
    constructions: AtomicUsize,
}

impl<T> ModelCache<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            constructions: AtomicUsize::new(0),
        }
    }

    /// A failed construction is not cached; the next call retries.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.cell.get_or_try_init(|| {
            self.constructions.fetch_add(1, Ordering::SeqCst);
            init()
        })
    }

    /// Number of times the initializer ran.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

static ANALYZER: ModelCache<VideoAnalyzer> = ModelCache::new();

/// Process-wide analyzer, configured from the environment on first use.
pub fn shared_analyzer() -> Result<&'static VideoAnalyzer> {
    ANALYZER.get_or_try_init(|| VideoAnalyzer::new(AnalyzerConfig::from_env()?))
}

pub fn analyze_video(path: &Path) -> AnalysisResponse {
    match shared_analyzer() {
        Ok(analyzer) => analyzer.analyze(path),
        Err(e) => {
            error!("❌ Analyzer unavailable: {}", e);
            AnalysisResponse::failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DetectorError;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn compact_config() -> AnalyzerConfig {
        AnalyzerConfig {
            checkpoint_path: PathBuf::from("/nonexistent/best_model.safetensors"),
            device: DeviceChoice::Cpu,
            model: DetectorConfig::compact(),
            image_size: 32,
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn test_cache_constructs_once_under_concurrency() {
        let cache: Arc<ModelCache<usize>> = Arc::new(ModelCache::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    *cache
                        .get_or_try_init(|| {
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok(i)
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.constructions(), 1);
        assert!(values.iter().all(|v| *v == values[0]));
    }

    #[test]
    fn test_failed_init_is_retried() {
        let cache: ModelCache<u8> = ModelCache::new();
        assert!(cache
            .get_or_try_init(|| Err(DetectorError::Configuration("boom".into())))
            .is_err());
        assert_eq!(*cache.get_or_try_init(|| Ok(3)).unwrap(), 3);
        assert_eq!(cache.constructions(), 2);
    }

    #[test]
    fn test_random_init_reported_in_health() {
        let analyzer = VideoAnalyzer::new(compact_config()).unwrap();
        assert!(!analyzer.weights_loaded());
    }

    #[test]
    fn test_missing_file_is_failed_response() {
        let analyzer = VideoAnalyzer::new(compact_config()).unwrap();
        let response = analyzer.analyze(Path::new("/nonexistent/clip.mp4"));
        match response {
            AnalysisResponse::Failed { error } => assert!(error.contains("Could not open video file")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
