use super::layer::{join, Layer, ParamKind, Parameterized};
use crate::error::NetError;
use crate::math;
use crate::tensor::Tensor;
use rand::Rng;
use rayon::prelude::*;

/// 2D convolution over NCHW tensors using im2col and a single matrix
/// product per sample.
///
/// The kernel is stored as `[out_channels, in_channels, k, k]`, which read
/// row-major is already the `(out, in*k*k)` weight matrix of the im2col
/// product. Weights and bias are drawn from `U(-1/sqrt(fan_in),
/// 1/sqrt(fan_in))`.
pub struct Conv2d {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
        rng: &mut impl Rng,
    ) -> Self {
        let fan_in = in_channels * kernel_size * kernel_size;
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let weight = Tensor::from_fn(
            vec![out_channels, in_channels, kernel_size, kernel_size],
            |_| rng.gen_range(-bound..bound),
        );
        let bias = bias.then(|| Tensor::from_fn(vec![out_channels], |_| rng.gen_range(-bound..bound)));
        Self {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel_size,
            stride: stride.max(1),
            padding,
        }
    }

    /// Spatial output size for an `h x w` input.
    pub fn output_size(&self, h: usize, w: usize) -> Result<(usize, usize), NetError> {
        let k = self.kernel_size;
        if h + 2 * self.padding < k || w + 2 * self.padding < k {
            return Err(NetError::shape(
                "conv2d",
                format!("spatial size of at least {} after padding", k),
                &[h, w],
            ));
        }
        let out_h = (h + 2 * self.padding - k) / self.stride + 1;
        let out_w = (w + 2 * self.padding - k) / self.stride + 1;
        Ok((out_h, out_w))
    }

    // (C, H, W) => (C*k*k, H'*W')
    fn im2col(&self, sample: &[f32], h: usize, w: usize, out_h: usize, out_w: usize) -> Vec<f32> {
        let k = self.kernel_size;
        let out_hw = out_h * out_w;
        let mut cols = vec![0.0; self.in_channels * k * k * out_hw];
        let (stride, pad) = (self.stride as isize, self.padding as isize);
        cols.par_chunks_mut(out_hw).enumerate().for_each(|(row, dst)| {
            let ic = row / (k * k);
            let kh = (row / k) % k;
            let kw = row % k;
            let src = &sample[ic * h * w..(ic + 1) * h * w];
            for oh in 0..out_h {
                let ih = oh as isize * stride + kh as isize - pad;
                if ih < 0 || ih >= h as isize {
                    continue;
                }
                for ow in 0..out_w {
                    let iw = ow as isize * stride + kw as isize - pad;
                    if iw >= 0 && iw < w as isize {
                        dst[oh * out_w + ow] = src[ih as usize * w + iw as usize];
                    }
                }
            }
        });
        cols
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        let (batch, channels, h, w) = x.dims4("conv2d")?;
        if channels != self.in_channels {
            return Err(NetError::ChannelMismatch {
                op: "conv2d",
                expected: self.in_channels,
                got: channels,
            });
        }
        let (out_h, out_w) = self.output_size(h, w)?;
        let out_hw = out_h * out_w;
        let patch = self.in_channels * self.kernel_size * self.kernel_size;
        let mut out = Vec::with_capacity(batch * self.out_channels * out_hw);
        for b in 0..batch {
            let sample = &x.data[b * channels * h * w..(b + 1) * channels * h * w];
            let cols = self.im2col(sample, h, w, out_h, out_w);
            let mut res = math::gemm(&self.weight.data, self.out_channels, patch, &cols, out_hw);
            if let Some(bias) = &self.bias {
                for (row, &bv) in res.chunks_mut(out_hw).zip(&bias.data) {
                    row.iter_mut().for_each(|v| *v += bv);
                }
            }
            out.extend_from_slice(&res);
        }
        Ok(Tensor::new(out, vec![batch, self.out_channels, out_h, out_w]))
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }
}

impl Layer for Conv2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        Conv2d::forward(self, x)
    }
}

impl Parameterized for Conv2d {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        out.push((join(prefix, "weight"), ParamKind::Weight, &self.weight));
        if let Some(bias) = &self.bias {
            out.push((join(prefix, "bias"), ParamKind::Weight, bias));
        }
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        out.push((join(prefix, "weight"), ParamKind::Weight, &mut self.weight));
        if let Some(bias) = &mut self.bias {
            out.push((join(prefix, "bias"), ParamKind::Weight, bias));
        }
    }
}
