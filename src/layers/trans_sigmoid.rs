use super::layer::Layer;
use crate::error::NetError;
use crate::tensor::Tensor;

/// Piecewise-linear "transitional sigmoid": a ramp from 0 to 1 on
/// `[0, alpha]`, a plateau at 1 on `(alpha, alpha + beta]` and a ramp back
/// down to 0 on `(alpha + beta, 1]`. Anything outside `[0, 1]` maps to 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransSigmoid {
    alpha: f32,
    beta: f32,
}

impl TransSigmoid {
    /// Requires `0 < alpha`, `0 <= beta` and `alpha + beta < 1`.
    pub fn new(alpha: f32, beta: f32) -> Result<Self, NetError> {
        if !(alpha > 0.0 && beta >= 0.0 && alpha + beta < 1.0) {
            return Err(NetError::InvalidConfig(format!(
                "transitional sigmoid needs 0 < alpha, 0 <= beta, alpha + beta < 1 (got alpha {}, beta {})",
                alpha, beta
            )));
        }
        Ok(Self { alpha, beta })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn apply(&self, v: f32) -> f32 {
        let knee = self.alpha + self.beta;
        if v < 0.0 || v > 1.0 {
            0.0
        } else if v <= self.alpha {
            v / self.alpha
        } else if v <= knee {
            1.0
        } else {
            // NaN falls through to here and stays NaN
            (1.0 - v) / (1.0 - knee)
        }
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        x.map(|v| self.apply(v))
    }
}

impl Layer for TransSigmoid {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        Ok(TransSigmoid::forward(self, x))
    }
}
