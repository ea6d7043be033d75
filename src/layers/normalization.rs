use super::layer::{join, Layer, ParamKind, Parameterized};
use crate::error::NetError;
use crate::tensor::Tensor;

/// Batch normalisation over the channel axis of NCHW tensors, with learnable
/// scale (`weight`) and shift (`bias`).
///
/// Inference uses the running statistics. Training normalises with the
/// biased batch variance and folds the unbiased variance into the running
/// estimate: `running = (1 - momentum) * running + momentum * batch`.
pub struct BatchNorm2d {
    pub weight: Tensor,
    pub bias: Tensor,
    pub running_mean: Tensor,
    pub running_var: Tensor,
    eps: f32,
    momentum: f32,
}

impl BatchNorm2d {
    pub fn new(channels: usize, eps: f32, momentum: f32) -> Self {
        Self {
            weight: Tensor::full(vec![channels], 1.0),
            bias: Tensor::zeros(vec![channels]),
            running_mean: Tensor::zeros(vec![channels]),
            running_var: Tensor::full(vec![channels], 1.0),
            eps,
            momentum,
        }
    }

    pub fn channels(&self) -> usize {
        self.weight.numel()
    }

    fn check(&self, x: &Tensor) -> Result<(usize, usize, usize, usize), NetError> {
        let dims = x.dims4("batch_norm")?;
        if dims.1 != self.channels() {
            return Err(NetError::ChannelMismatch {
                op: "batch_norm",
                expected: self.channels(),
                got: dims.1,
            });
        }
        Ok(dims)
    }

    /// Per-channel mean and biased variance over batch and spatial axes.
    pub fn batch_stats(&self, x: &Tensor) -> Result<(Vec<f32>, Vec<f32>), NetError> {
        let (batch, channels, h, w) = self.check(x)?;
        let n = (batch * h * w) as f32;
        let mut mean = vec![0.0; channels];
        let mut var = vec![0.0; channels];
        for c in 0..channels {
            let mut sum = 0.0;
            for b in 0..batch {
                sum += x.plane(b, c).iter().sum::<f32>();
            }
            let m = sum / n;
            let mut var_sum = 0.0;
            for b in 0..batch {
                var_sum += x.plane(b, c).iter().map(|v| (v - m) * (v - m)).sum::<f32>();
            }
            mean[c] = m;
            var[c] = var_sum / n;
        }
        Ok((mean, var))
    }

    fn normalize(&self, x: &Tensor, mean: &[f32], var: &[f32]) -> Tensor {
        let (batch, channels, h, w) = (x.shape[0], x.shape[1], x.shape[2], x.shape[3]);
        let plane = h * w;
        let mut out = x.clone();
        for b in 0..batch {
            for c in 0..channels {
                let scale = self.weight.data[c] / (var[c] + self.eps).sqrt();
                let shift = self.bias.data[c] - mean[c] * scale;
                let start = (b * channels + c) * plane;
                for v in out.data[start..start + plane].iter_mut() {
                    *v = *v * scale + shift;
                }
            }
        }
        out
    }

    fn training_stats(&self, x: &Tensor) -> Result<(Vec<f32>, Vec<f32>), NetError> {
        let (batch, _, h, w) = self.check(x)?;
        if batch * h * w < 2 {
            return Err(NetError::shape(
                "batch_norm",
                "more than one value per channel in training mode",
                &x.shape,
            ));
        }
        self.batch_stats(x)
    }

    /// Normalise with the statistics of `x` itself without touching the
    /// running estimates. Used when a checkpointed stage is replayed.
    pub fn forward_batch_stats(&self, x: &Tensor) -> Result<Tensor, NetError> {
        let (mean, var) = self.training_stats(x)?;
        Ok(self.normalize(x, &mean, &var))
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        self.check(x)?;
        Ok(self.normalize(x, &self.running_mean.data, &self.running_var.data))
    }

    pub fn forward_train(&mut self, x: &Tensor) -> Result<Tensor, NetError> {
        let (mean, var) = self.training_stats(x)?;
        let out = self.normalize(x, &mean, &var);
        let n = (x.shape[0] * x.shape[2] * x.shape[3]) as f32;
        let correction = n / (n - 1.0);
        let m = self.momentum;
        for c in 0..self.channels() {
            self.running_mean.data[c] = (1.0 - m) * self.running_mean.data[c] + m * mean[c];
            self.running_var.data[c] =
                (1.0 - m) * self.running_var.data[c] + m * var[c] * correction;
        }
        Ok(out)
    }
}

impl Layer for BatchNorm2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        BatchNorm2d::forward(self, x)
    }

    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor, NetError> {
        BatchNorm2d::forward_train(self, x)
    }
}

impl Parameterized for BatchNorm2d {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        out.push((join(prefix, "weight"), ParamKind::Weight, &self.weight));
        out.push((join(prefix, "bias"), ParamKind::Weight, &self.bias));
        out.push((join(prefix, "running_mean"), ParamKind::Buffer, &self.running_mean));
        out.push((join(prefix, "running_var"), ParamKind::Buffer, &self.running_var));
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        out.push((join(prefix, "weight"), ParamKind::Weight, &mut self.weight));
        out.push((join(prefix, "bias"), ParamKind::Weight, &mut self.bias));
        out.push((join(prefix, "running_mean"), ParamKind::Buffer, &mut self.running_mean));
        out.push((join(prefix, "running_var"), ParamKind::Buffer, &mut self.running_var));
    }
}
