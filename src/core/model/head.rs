use candle_core::{Result, Tensor};
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder};

/// Linear → ReLU → Dropout → Linear. `fc.0` / `fc.3` mirror the PyTorch
/// `Sequential` indices.
#[derive(Debug)]
pub struct ClassifierHead {
    fc1: Linear,
    dropout: Dropout,
    fc2: Linear,
}

impl ClassifierHead {
    pub fn new(vb: VarBuilder, input_dim: usize, hidden: usize, dropout: f32) -> Result<Self> {
        let fc1 = linear(input_dim, hidden, vb.pp("0"))?;
        let fc2 = linear(hidden, 1, vb.pp("3"))?;
        Ok(Self {
            fc1,
            dropout: Dropout::new(dropout),
            fc2,
        })
    }

    /// Pre-sigmoid scores, `(B, D)` → `(B, 1)`. Dropout only when `train`.
    pub fn logits(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.fc1.forward(xs)?.relu()?;
        let xs = self.dropout.forward(&xs, train)?;
        self.fc2.forward(&xs)
    }

    /// Fake-probability in (0, 1).
    pub fn probability(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        candle_nn::ops::sigmoid(&self.logits(xs, train)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_probability_in_unit_interval_and_eval_is_deterministic() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
        let head = ClassifierHead::new(vb, 256, 64, 0.5).unwrap();

        let xs = Tensor::randn(0f32, 3.0, (4, 256), &device).unwrap();
        let p1: Vec<f32> = head.probability(&xs, false).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        let p2: Vec<f32> = head.probability(&xs, false).unwrap().flatten_all().unwrap().to_vec1().unwrap();

        assert_eq!(p1.len(), 4);
        assert_eq!(p1, p2);
        assert!(p1.iter().all(|p| *p > 0.0 && *p < 1.0));
    }
}
