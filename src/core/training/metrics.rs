use serde::Serialize;
use std::fmt;

fn is_fake(value: f32) -> bool {
    value > 0.5
}

/// Running loss and accuracy of one train or validation pass.
#[derive(Debug, Clone, Default)]
pub struct PhaseMetrics {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

impl PhaseMetrics {
    /// `batch_loss` is the batch mean; it is weighted by the batch length.
    pub fn record(&mut self, batch_loss: f32, probabilities: &[f32], labels: &[f32]) {
        self.loss_sum += batch_loss as f64 * labels.len() as f64;
        self.correct += probabilities
            .iter()
            .zip(labels)
            .filter(|(p, l)| is_fake(**p) == is_fake(**l))
            .count();
        self.seen += labels.len();
    }

    /// Divides by the subset size, not by the number of batches.
    pub fn finish(&self, subset_size: usize) -> PhaseSummary {
        let n = subset_size.max(1) as f64;
        PhaseSummary {
            loss: self.loss_sum / n,
            accuracy: self.correct as f64 / n,
            samples: self.seen,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn new(tp: usize, fp: usize, fn_: usize) -> Self {
        let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

/// 评估报告：准确率、混淆矩阵、分类指标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// `[[tn, fp], [fn, tp]]`, rows are true labels.
    pub confusion: [[usize; 2]; 2],
    pub real: ClassMetrics,
    pub fake: ClassMetrics,
}

impl EvaluationReport {
    pub fn from_predictions(probabilities: &[f32], labels: &[f32]) -> Self {
        let mut confusion = [[0usize; 2]; 2];
        for (p, l) in probabilities.iter().zip(labels) {
            confusion[is_fake(*l) as usize][is_fake(*p) as usize] += 1;
        }
        let [[tn, fp], [fn_, tp]] = confusion;
        let total = tn + fp + fn_ + tp;

        Self {
            accuracy: if total == 0 {
                0.0
            } else {
                (tn + tp) as f64 / total as f64
            },
            confusion,
            real: ClassMetrics::new(tn, fn_, fp),
            fake: ClassMetrics::new(tp, fp, fn_),
        }
    }

    pub fn total(&self) -> usize {
        self.confusion.iter().flatten().sum()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(f)?;
        writeln!(f, "{:>8} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        for (name, m) in [("real", &self.real), ("fake", &self.fake)] {
            writeln!(
                f,
                "{:>8} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows: true, cols: predicted)")?;
        writeln!(f, "{:>8} {:>6} {:>6}", "", "real", "fake")?;
        writeln!(f, "{:>8} {:>6} {:>6}", "real", self.confusion[0][0], self.confusion[0][1])?;
        write!(f, "{:>8} {:>6} {:>6}", "fake", self.confusion[1][0], self.confusion[1][1])
    }
}
