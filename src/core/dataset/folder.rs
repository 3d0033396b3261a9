//! 文件夹数据集：`root/real/<video>/*.jpg` 标签 0，`root/fake/<video>/*.jpg` 标签 1

use super::augment::{AugmentParams, Augmentation};
use super::{LabeledExample, SequenceSource, LABEL_FAKE, LABEL_REAL};
use crate::core::error::{DetectorError, Result};
use crate::core::video::{FrameNormalizer, FrameSequence, NormalizedFrame};
use log::{debug, info, warn};
use regex::Regex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone)]
struct VideoEntry {
    frames: Vec<PathBuf>,
    label: f32,
}

#[derive(Debug, Clone)]
pub struct FolderDataset {
    entries: Vec<VideoEntry>,
    seq_len: usize,
    normalizer: FrameNormalizer,
    augmentation: Augmentation,
}

impl FolderDataset {
    /// Scans `root` once. Videos with fewer than `seq_len` frames are skipped.
    pub fn open(root: &Path, seq_len: usize) -> Result<Self> {
        if seq_len == 0 {
            return Err(DetectorError::Configuration("seq_len must be positive".into()));
        }
        if !root.is_dir() {
            return Err(DetectorError::Configuration(format!(
                "dataset root {} is not a directory",
                root.display()
            )));
        }

        let frame_number = Regex::new(r"(\d+)\D*$")
            .map_err(|e| DetectorError::Configuration(e.to_string()))?;

        let mut entries = Vec::new();
        for (class, label) in [("real", LABEL_REAL), ("fake", LABEL_FAKE)] {
            let class_dir = root.join(class);
            if !class_dir.is_dir() {
                warn!("⚠️ Missing class folder: {}", class_dir.display());
                continue;
            }

            let mut videos: Vec<PathBuf> = fs::read_dir(&class_dir)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_dir())
                .collect();
            videos.sort();

            let mut skipped = 0;
            for dir in videos {
                let frames = list_frames(&dir, &frame_number)?;
                if frames.len() < seq_len {
                    skipped += 1;
                    continue;
                }
                entries.push(VideoEntry { frames, label });
            }
            debug!("{}: skipped {} short videos", class, skipped);
        }

        let fakes = entries.iter().filter(|e| e.label == LABEL_FAKE).count();
        info!(
            "📂 Dataset {}: {} videos ({} real, {} fake)",
            root.display(),
            entries.len(),
            entries.len() - fakes,
            fakes
        );

        Ok(Self {
            entries,
            seq_len,
            normalizer: FrameNormalizer::new(),
            augmentation: Augmentation::default(),
        })
    }

    pub fn with_image_size(mut self, size: u32) -> Self {
        self.normalizer = FrameNormalizer::with_size(size);
        self
    }

    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = augmentation;
        self
    }

    fn load_frame(&self, path: &Path, params: &AugmentParams) -> Result<NormalizedFrame> {
        let mut img = image::open(path)?.to_rgb8();
        params.apply(&mut img);
        self.normalizer.normalize_image(&img)
    }
}

impl SequenceSource for FolderDataset {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn load(&self, index: usize, augment: bool) -> Result<LabeledExample> {
        let entry = self.entries.get(index).ok_or_else(|| {
            DetectorError::Configuration(format!(
                "index {} out of range for {} videos",
                index,
                self.entries.len()
            ))
        })?;

        let params = if augment {
            self.augmentation.sample(&mut rand::thread_rng())
        } else {
            AugmentParams::identity()
        };

        let size = self.normalizer.size() as usize;
        let frames = select_indices(entry.frames.len(), self.seq_len)
            .into_iter()
            .map(|i| {
                let path = &entry.frames[i];
                self.load_frame(path, &params).unwrap_or_else(|e| {
                    warn!("⚠️ Failed to load frame {}: {}", path.display(), e);
                    NormalizedFrame::placeholder(size, size)
                })
            })
            .collect();

        Ok(LabeledExample {
            sequence: FrameSequence::new(frames)?,
            label: entry.label,
        })
    }
}

/// `seq_len` evenly strided indices when there are more frames than needed.
pub fn select_indices(total: usize, seq_len: usize) -> Vec<usize> {
    if total > seq_len && seq_len > 0 {
        let step = total / seq_len;
        (0..total).step_by(step).take(seq_len).collect()
    } else {
        (0..total).collect()
    }
}

fn list_frames(dir: &Path, frame_number: &Regex) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<(Option<u64>, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_frame_extension(p))
        .map(|p| {
            let number = p
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| frame_number.captures(s))
                .and_then(|c| c[1].parse().ok());
            (number, p)
        })
        .collect();

    frames.sort_by(|(na, pa), (nb, pb)| match (na, nb) {
        (Some(a), Some(b)) => a.cmp(b).then_with(|| pa.cmp(pb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => pa.cmp(pb),
    });
    Ok(frames.into_iter().map(|(_, p)| p).collect())
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn write_video(dir: &Path, frames: usize, shade: u8) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..frames {
            let img = RgbImage::from_pixel(8, 8, Rgb([shade, (i * 10) as u8, 0]));
            img.save(dir.join(format!("frame_{}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_select_indices() {
        assert_eq!(select_indices(20, 20), (0..20).collect::<Vec<_>>());
        assert_eq!(select_indices(45, 20), (0..40).step_by(2).collect::<Vec<_>>());
        assert_eq!(select_indices(10, 4), vec![0, 2, 4, 6]);
        assert_eq!(select_indices(3, 5), vec![0, 1, 2]);
    }

    #[test]
    fn test_numeric_frame_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_10.jpg", "frame_2.jpg", "frame_1.jpg", "cover.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let re = Regex::new(r"(\d+)\D*$").unwrap();
        let names: Vec<String> = list_frames(dir.path(), &re)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame_1.jpg", "frame_2.jpg", "frame_10.jpg", "cover.png"]);
    }

    #[test]
    fn test_scan_labels_and_skips_short_videos() {
        let root = tempfile::tempdir().unwrap();
        write_video(&root.path().join("real/a"), 4, 10);
        write_video(&root.path().join("real/short"), 2, 10);
        write_video(&root.path().join("fake/b"), 6, 200);

        let ds = FolderDataset::open(root.path(), 4).unwrap().with_image_size(16);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.load(0, false).unwrap().label, LABEL_REAL);

        let example = ds.load(1, false).unwrap();
        assert_eq!(example.label, LABEL_FAKE);
        assert_eq!(example.sequence.len(), 4);
        assert_eq!(example.sequence.frame_shape(), Some((3, 16, 16)));

        let augmented = ds.load(0, true).unwrap();
        assert_eq!(augmented.sequence.len(), 4);
    }

    #[test]
    fn test_corrupt_frame_becomes_placeholder() {
        let root = tempfile::tempdir().unwrap();
        let video = root.path().join("real/a");
        write_video(&video, 3, 10);
        fs::write(video.join("frame_1.png"), b"not an image").unwrap();

        let ds = FolderDataset::open(root.path(), 3).unwrap().with_image_size(8);
        let example = ds.load(0, false).unwrap();
        assert_eq!(example.sequence.len(), 3);
        assert!(example.sequence.frames()[1].data().iter().all(|v| *v == 0.0));
        assert!(example.sequence.frames()[0].data().iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_missing_root_is_configuration_error() {
        assert!(matches!(
            FolderDataset::open(Path::new("/nonexistent/dataset"), 20),
            Err(DetectorError::Configuration(_))
        ));
    }
}
