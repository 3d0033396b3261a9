//! 动态损失缩放（混合精度训练）
//!
//! The loss is multiplied by the current scale before backprop, gradients are
//! divided by it afterwards. A non-finite gradient skips the optimizer step
//! and backs the scale off; enough clean steps in a row grow it again.

use crate::core::error::Result;
use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::Optimizer;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradScalerConfig {
    pub enabled: bool,
    pub init_scale: f64,
    pub growth_factor: f64,
    pub backoff_factor: f64,
    pub growth_interval: usize,
}

impl Default for GradScalerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            init_scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// Gradients overflowed; parameters untouched.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct GradScaler {
    config: GradScalerConfig,
    scale: f64,
    growth_tracker: usize,
}

impl GradScaler {
    pub fn new(config: GradScalerConfig) -> Self {
        let scale = if config.enabled { config.init_scale } else { 1.0 };
        Self {
            config,
            scale,
            growth_tracker: 0,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn scale_loss(&self, loss: &Tensor) -> Result<Tensor> {
        if !self.config.enabled {
            return Ok(loss.clone());
        }
        Ok(loss.affine(self.scale, 0.0)?)
    }

    /// Divides every gradient of `vars` by the scale in place.
    /// Returns `true` when any of them is non-finite.
    pub fn unscale(&self, grads: &mut GradStore, vars: &[Var]) -> Result<bool> {
        let inv_scale = 1.0 / self.scale;
        let mut found_inf = false;
        for var in vars {
            let Some(grad) = grads.remove(var.as_tensor()) else {
                continue;
            };
            let grad = if self.config.enabled {
                grad.affine(inv_scale, 0.0)?
            } else {
                grad
            };
            if !found_inf {
                let norm: f32 = grad.sqr()?.sum_all()?.to_dtype(candle_core::DType::F32)?.to_scalar()?;
                found_inf = !norm.is_finite();
            }
            grads.insert(var.as_tensor(), grad);
        }
        Ok(found_inf)
    }

    /// Adjusts the scale after a step.
    pub fn update(&mut self, found_inf: bool) {
        if !self.config.enabled {
            return;
        }
        if found_inf {
            self.scale *= self.config.backoff_factor;
            self.growth_tracker = 0;
            warn!("⚠️ Gradient overflow, loss scale reduced to {}", self.scale);
        } else {
            self.growth_tracker += 1;
            if self.growth_tracker >= self.config.growth_interval {
                self.scale *= self.config.growth_factor;
                self.growth_tracker = 0;
                debug!("loss scale grown to {}", self.scale);
            }
        }
    }

    /// Scaled backward pass, unscale, overflow check, optimizer step, scale update.
    pub fn step<O: Optimizer>(
        &mut self,
        optimizer: &mut O,
        loss: &Tensor,
        vars: &[Var],
    ) -> Result<StepOutcome> {
        let mut grads = self.scale_loss(loss)?.backward()?;
        let found_inf = self.unscale(&mut grads, vars)?;
        let outcome = if found_inf {
            StepOutcome::Skipped
        } else {
            optimizer.step(&grads)?;
            StepOutcome::Applied
        };
        self.update(found_inf);
        Ok(outcome)
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(GradScalerConfig::default())
    }
}
