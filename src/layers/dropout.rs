use super::layer::Layer;
use crate::error::NetError;
use crate::rng::rng_from_env;
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::Rng;

/// Dropout layer that randomly zeros elements during training.
///
/// During [`Layer::forward_train`] each element is kept with probability
/// `1 - p` and kept values are scaled by `1/(1 - p)` ("inverted" dropout),
/// so inference is the identity.
pub struct Dropout {
    p: f32,
    rng: StdRng,
}

impl Dropout {
    pub fn new(p: f32) -> Result<Self, NetError> {
        Self::with_rng(p, rng_from_env())
    }

    pub fn with_rng(p: f32, rng: StdRng) -> Result<Self, NetError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(NetError::InvalidConfig(format!(
                "dropout probability must lie in [0, 1], got {}",
                p
            )));
        }
        Ok(Self { p, rng })
    }

    pub fn p(&self) -> f32 {
        self.p
    }
}

impl Layer for Dropout {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        Ok(x.clone())
    }

    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor, NetError> {
        if self.p == 0.0 {
            return Ok(x.clone());
        }
        let scale = if self.p < 1.0 { 1.0 / (1.0 - self.p) } else { 0.0 };
        let mut out = x.clone();
        for v in out.data.iter_mut() {
            if self.rng.gen::<f32>() < self.p {
                *v = 0.0;
            } else {
                *v *= scale;
            }
        }
        Ok(out)
    }
}
