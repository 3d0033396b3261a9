use crate::core::verdict::Verdict;
use serde::{Deserialize, Serialize};

/// 分析结果，序列化为 `{"status": "completed", "result": {...}}`
/// 或 `{"status": "failed", "error": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResponse {
    Completed { result: Verdict },
    Failed { error: String },
}

impl AnalysisResponse {
    pub fn failed(error: impl ToString) -> Self {
        AnalysisResponse::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisResponse::Completed { .. })
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            AnalysisResponse::Completed { result } => Some(result),
            AnalysisResponse::Failed { .. } => None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"failed","error":"serialization failed: {}"}}"#, e)
        })
    }
}
