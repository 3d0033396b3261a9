//! ImageNet 预训练骨干权重：本地文件或按 URL 下载并缓存

use crate::core::error::{DetectorError, Result};
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PRETRAINED_URL: &str =
    "https://huggingface.co/lmz/candle-efficientnet/resolve/main/efficientnet-b0.safetensors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PretrainedSource {
    /// Random initialization of the backbone.
    None,
    Path(PathBuf),
    Url { url: String, cache_dir: PathBuf },
}

impl Default for PretrainedSource {
    fn default() -> Self {
        PretrainedSource::None
    }
}

impl PretrainedSource {
    pub fn default_url() -> Self {
        PretrainedSource::Url {
            url: DEFAULT_PRETRAINED_URL.to_string(),
            cache_dir: PathBuf::from(".cache/pretrained"),
        }
    }

    /// Local path of the weights, downloading them first if needed.
    pub fn resolve(&self) -> Result<Option<PathBuf>> {
        match self {
            PretrainedSource::None => Ok(None),
            PretrainedSource::Path(path) => {
                if path.is_file() {
                    Ok(Some(path.clone()))
                } else {
                    Err(DetectorError::Configuration(format!(
                        "pretrained weights not found at {}",
                        path.display()
                    )))
                }
            }
            PretrainedSource::Url { url, cache_dir } => fetch_cached(url, cache_dir).map(Some),
        }
    }
}

fn cache_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("pretrained.safetensors")
        .to_string()
}

/// Downloads `url` into `cache_dir` once; later calls reuse the file.
pub fn fetch_cached(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let target = cache_dir.join(cache_file_name(url));
    if target.is_file() {
        info!("📦 Using cached pretrained weights: {}", target.display());
        return Ok(target);
    }

    fs::create_dir_all(cache_dir)?;
    info!("⬇️ Downloading pretrained weights from {}", url);

    let client = Client::builder()
        .timeout(Duration::from_secs(600))
        .build()?;
    let bytes = client.get(url).send()?.error_for_status()?.bytes()?;

    // 先写临时文件再重命名，避免中断留下半个文件
    let partial = target.with_extension("partial");
    let mut file = fs::File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&partial, &target)?;

    info!("✓ Saved {} bytes to {}", bytes.len(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_file_name() {
        assert_eq!(cache_file_name(DEFAULT_PRETRAINED_URL), "efficientnet-b0.safetensors");
        assert_eq!(cache_file_name("https://host/dir/"), "pretrained.safetensors");
    }

    #[test]
    fn test_cached_file_is_reused_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("weights.safetensors");
        fs::write(&cached, b"stub").unwrap();

        let path = fetch_cached("http://127.0.0.1:9/weights.safetensors", dir.path()).unwrap();
        assert_eq!(path, cached);
    }

    #[test]
    fn test_missing_local_path_is_configuration_error() {
        let source = PretrainedSource::Path(PathBuf::from("/nope/b0.safetensors"));
        assert!(matches!(source.resolve(), Err(DetectorError::Configuration(_))));
        assert_eq!(PretrainedSource::None.resolve().unwrap(), None);
    }
}
