pub mod checkpoint;
pub mod config;
pub mod evaluate;
pub mod grad_scaler;
pub mod loss;
pub mod metrics;
pub mod trainer;

pub use checkpoint::BestCheckpoint;
pub use config::{EvaluationConfig, TrainingConfig};
pub use evaluate::{evaluate, evaluate_source};
pub use grad_scaler::{GradScaler, GradScalerConfig, StepOutcome};
pub use metrics::{EvaluationReport, PhaseSummary};
pub use trainer::{train, EpochSummary, Trainer, TrainingReport};
