/// 最佳模型保存策略：仅当验证损失严格低于此前所有值时保存
#[derive(Debug, Clone, Copy)]
pub struct BestCheckpoint {
    best: f64,
}

impl BestCheckpoint {
    pub fn new() -> Self {
        Self { best: f64::INFINITY }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Records `val_loss`; `true` means a new best that should be saved.
    pub fn observe(&mut self, val_loss: f64) -> bool {
        if val_loss < self.best {
            self.best = val_loss;
            true
        } else {
            false
        }
    }
}

impl Default for BestCheckpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saves_only_on_strict_improvement() {
        let mut policy = BestCheckpoint::new();
        let decisions: Vec<bool> = [0.7, 0.6, 0.6, 0.65, 0.5, f64::NAN, 0.49]
            .iter()
            .map(|l| policy.observe(*l))
            .collect();
        assert_eq!(decisions, vec![true, true, false, false, true, false, true]);
        assert_eq!(policy.best(), 0.49);
    }
}
