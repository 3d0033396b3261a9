use crate::core::error::Result;
use candle_core::Tensor;

/// Mean binary cross-entropy on logits:
/// `max(x, 0) - x * t + ln(1 + e^-|x|)`, stable for large |x|.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let targets = targets.to_dtype(logits.dtype())?;
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let loss = ((logits.relu()? - logits.mul(&targets)?)? + softplus)?;
    Ok(loss.mean_all()?)
}
