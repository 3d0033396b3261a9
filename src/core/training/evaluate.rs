use super::config::EvaluationConfig;
use super::metrics::EvaluationReport;
use crate::core::dataset::{BatchLoader, FolderDataset, SequenceSource};
use crate::core::device::select_device;
use crate::core::error::{DetectorError, Result};
use crate::core::model::DeepFakeDetector;
use log::info;
use std::sync::Arc;

/// Eval-mode pass over every item of `source`.
pub fn evaluate_source(
    model: &DeepFakeDetector,
    source: Arc<dyn SequenceSource>,
    batch_size: usize,
    num_workers: usize,
) -> Result<EvaluationReport> {
    if source.is_empty() {
        return Err(DetectorError::Configuration("dataset contains no videos".into()));
    }
    let indices: Vec<usize> = (0..source.len()).collect();
    let loader = BatchLoader::new(source, indices, batch_size, num_workers)?;

    let mut probabilities = Vec::new();
    let mut labels = Vec::new();
    for batch in loader.epoch(0) {
        for example in batch? {
            probabilities.push(model.predict(&example.sequence)?);
            labels.push(example.label);
        }
    }
    Ok(EvaluationReport::from_predictions(&probabilities, &labels))
}

/// Strictly loads the checkpoint and scores the folder dataset.
pub fn evaluate(config: &EvaluationConfig) -> Result<EvaluationReport> {
    if !config.checkpoint_path.is_file() {
        return Err(DetectorError::Configuration(format!(
            "checkpoint {} does not exist",
            config.checkpoint_path.display()
        )));
    }
    let device = select_device(config.device)?;
    let model = DeepFakeDetector::load(&config.model, &config.checkpoint_path, &device)?;
    let dataset = FolderDataset::open(&config.data_dir, config.seq_len)?.with_image_size(config.image_size);

    info!("🔍 Evaluating {} videos", dataset.len());
    let report = evaluate_source(&model, Arc::new(dataset), config.batch_size, config.num_workers)?;
    info!("Accuracy: {:.4}", report.accuracy);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::folder::tests::write_video;
    use crate::core::device::DeviceChoice;
    use crate::core::model::DetectorConfig;
    use candle_core::Device;

    #[test]
    fn test_missing_checkpoint_is_configuration_error() {
        let config = EvaluationConfig {
            checkpoint_path: "/nonexistent/best_model.safetensors".into(),
            device: DeviceChoice::Cpu,
            ..EvaluationConfig::default()
        };
        assert!(matches!(evaluate(&config), Err(DetectorError::Configuration(_))));
    }

    #[test]
    fn test_evaluate_folder_dataset() {
        let root = tempfile::tempdir().unwrap();
        write_video(&root.path().join("real/a"), 3, 20);
        write_video(&root.path().join("real/b"), 3, 40);
        write_video(&root.path().join("fake/c"), 4, 220);

        let checkpoint = root.path().join("model.safetensors");
        DeepFakeDetector::new(&DetectorConfig::compact(), &Device::Cpu)
            .unwrap()
            .save(&checkpoint)
            .unwrap();

        let config = EvaluationConfig {
            data_dir: root.path().to_path_buf(),
            checkpoint_path: checkpoint,
            batch_size: 2,
            num_workers: 1,
            seq_len: 3,
            image_size: 32,
            device: DeviceChoice::Cpu,
            model: DetectorConfig::compact(),
        };
        let report = evaluate(&config).unwrap();
        assert_eq!(report.total(), 3);
        assert_eq!(report.real.support, 2);
        assert_eq!(report.fake.support, 1);
    }
}
