pub mod analyzer;
pub mod models;

pub use analyzer::{analyze_video, shared_analyzer, AnalyzerConfig, ModelCache, VideoAnalyzer};
pub use models::AnalysisResponse;
