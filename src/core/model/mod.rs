pub mod backbone;
pub mod config;
pub mod detector;
pub mod head;
pub mod pretrained;
pub mod temporal;

pub use backbone::SpatialEncoder;
pub use config::{BackboneConfig, DetectorConfig};
pub use detector::{DeepFakeDetector, WeightsStatus};
pub use head::ClassifierHead;
pub use pretrained::PretrainedSource;
pub use temporal::TemporalAggregator;
