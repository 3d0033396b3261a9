//! 双向 LSTM 时序聚合

use candle_core::{IndexOp, Result, Tensor};
use candle_nn::rnn::{lstm, Direction, LSTMConfig, LSTM, RNN};
use candle_nn::VarBuilder;

/// Single-layer bidirectional LSTM. Weight names match PyTorch
/// (`weight_ih_l0`, `weight_ih_l0_reverse`, ...).
#[derive(Debug)]
pub struct TemporalAggregator {
    forward: LSTM,
    backward: LSTM,
    hidden: usize,
}

impl TemporalAggregator {
    pub fn new(vb: VarBuilder, input_dim: usize, hidden: usize) -> Result<Self> {
        let forward = lstm(input_dim, hidden, LSTMConfig::default(), vb.clone())?;
        let backward = lstm(
            input_dim,
            hidden,
            LSTMConfig {
                direction: Direction::Backward,
                ..Default::default()
            },
            vb,
        )?;
        Ok(Self {
            forward,
            backward,
            hidden,
        })
    }

    pub fn output_dim(&self) -> usize {
        2 * self.hidden
    }

    /// Per-position outputs of both directions: `(B, T, F)` → `(B, T, 2H)`.
    pub fn outputs(&self, xs: &Tensor) -> Result<Tensor> {
        let (_b, t, _f) = xs.dims3()?;
        let reverse: Vec<u32> = (0..t as u32).rev().collect();
        let reverse = Tensor::new(reverse.as_slice(), xs.device())?;

        let forward_states = self.forward.seq(xs)?;
        let forward_out = self.forward.states_to_tensor(&forward_states)?;

        let reversed = xs.index_select(&reverse, 1)?;
        let backward_states = self.backward.seq(&reversed)?;
        // 反向结果按原时间顺序对齐
        let backward_out = self
            .backward
            .states_to_tensor(&backward_states)?
            .index_select(&reverse, 1)?;

        Tensor::cat(&[forward_out, backward_out], 2)
    }

    /// Output at the final sequence position, both directions: `(B, T, F)` → `(B, 2H)`.
    pub fn aggregate(&self, xs: &Tensor) -> Result<Tensor> {
        let (_b, t, _f) = xs.dims3()?;
        self.outputs(xs)?.i((.., t - 1, ..))?.contiguous()
    }
}
