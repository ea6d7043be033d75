use super::layer::{join, Layer, ParamKind, Parameterized};
use crate::error::NetError;
use crate::math::{self, Matrix};
use crate::tensor::Tensor;
use rand::Rng;
use rayon::prelude::*;

/// Learned upsampling: 2D transposed convolution without padding.
///
/// Kernel layout is `[in_channels, out_channels, k, k]`. Output size is
/// `(h - 1) * stride + k`, so `k = stride = 2` exactly doubles each spatial
/// axis.
pub struct ConvTranspose2d {
    pub weight: Tensor,
    pub bias: Tensor,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
}

impl ConvTranspose2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        rng: &mut impl Rng,
    ) -> Self {
        // fan_in is taken over the second kernel axis, as for torch's ConvTranspose2d
        let fan_in = out_channels * kernel_size * kernel_size;
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let weight = Tensor::from_fn(
            vec![in_channels, out_channels, kernel_size, kernel_size],
            |_| rng.gen_range(-bound..bound),
        );
        let bias = Tensor::from_fn(vec![out_channels], |_| rng.gen_range(-bound..bound));
        Self {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel_size,
            stride: stride.max(1),
        }
    }

    pub fn output_size(&self, h: usize, w: usize) -> (usize, usize) {
        (
            (h.max(1) - 1) * self.stride + self.kernel_size,
            (w.max(1) - 1) * self.stride + self.kernel_size,
        )
    }

    // (out*k*k, H*W) => (out, H', W'), overlapping taps are summed
    fn col2im(&self, cols: &[f32], h: usize, w: usize, out_h: usize, out_w: usize) -> Vec<f32> {
        let k = self.kernel_size;
        let hw = h * w;
        let mut img = vec![0.0; self.out_channels * out_h * out_w];
        img.par_chunks_mut(out_h * out_w)
            .enumerate()
            .for_each(|(oc, dst)| {
                for kh in 0..k {
                    for kw in 0..k {
                        let row = (oc * k + kh) * k + kw;
                        let src = &cols[row * hw..(row + 1) * hw];
                        for ih in 0..h {
                            let oh = ih * self.stride + kh;
                            for iw in 0..w {
                                let ow = iw * self.stride + kw;
                                dst[oh * out_w + ow] += src[ih * w + iw];
                            }
                        }
                    }
                }
            });
        img
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        let (batch, channels, h, w) = x.dims4("conv_transpose2d")?;
        if channels != self.in_channels {
            return Err(NetError::ChannelMismatch {
                op: "conv_transpose2d",
                expected: self.in_channels,
                got: channels,
            });
        }
        if h == 0 || w == 0 {
            return Err(NetError::shape("conv_transpose2d", "non-empty spatial axes", &x.shape));
        }
        let k = self.kernel_size;
        let (out_h, out_w) = self.output_size(h, w);
        let taps = self.out_channels * k * k;
        let w_t = Matrix::from_vec(self.in_channels, taps, self.weight.data.clone()).transpose();
        let hw = h * w;
        let mut out = Vec::with_capacity(batch * self.out_channels * out_h * out_w);
        for b in 0..batch {
            let sample = &x.data[b * channels * hw..(b + 1) * channels * hw];
            let cols = math::gemm(&w_t.data, taps, self.in_channels, sample, hw);
            let mut img = self.col2im(&cols, h, w, out_h, out_w);
            for (plane, &bv) in img.chunks_mut(out_h * out_w).zip(&self.bias.data) {
                plane.iter_mut().for_each(|v| *v += bv);
            }
            out.extend_from_slice(&img);
        }
        Ok(Tensor::new(out, vec![batch, self.out_channels, out_h, out_w]))
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl Layer for ConvTranspose2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        ConvTranspose2d::forward(self, x)
    }
}

impl Parameterized for ConvTranspose2d {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        out.push((join(prefix, "weight"), ParamKind::Weight, &self.weight));
        out.push((join(prefix, "bias"), ParamKind::Weight, &self.bias));
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        out.push((join(prefix, "weight"), ParamKind::Weight, &mut self.weight));
        out.push((join(prefix, "bias"), ParamKind::Weight, &mut self.bias));
    }
}
