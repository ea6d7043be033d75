//! The four U-Net building blocks.
//!
//! Each block has three entry points: `forward` (inference), `forward_train`
//! (batch statistics, optionally recording intermediate activations into a
//! trace) and `replay` (batch statistics without touching running
//! estimates, used to rebuild a checkpointed stage).

use crate::error::NetError;
use crate::layers::layer::join;
use crate::layers::relu;
use crate::layers::{
    BatchNorm2d, Conv2d, ConvTranspose2d, Layer, MaxPool2d, ParamKind, Parameterized, UpsampleBilinear,
};
use crate::tensor::Tensor;
use log::debug;
use rand::Rng;

/// Batch-norm settings shared by every block of a network.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormSettings {
    pub eps: f32,
    pub momentum: f32,
}

impl Default for NormSettings {
    fn default() -> Self {
        Self {
            eps: 1e-5,
            momentum: 0.1,
        }
    }
}

/// Optional sink for activations recorded during a training pass.
pub type Trace<'a> = Option<&'a mut Vec<Tensor>>;

fn keep(trace: &mut Trace<'_>, t: &Tensor) {
    if let Some(saved) = trace.as_deref_mut() {
        saved.push(t.clone());
    }
}

/// (conv3x3 => BN => ReLU) * 2, spatial size preserved.
///
/// Convolutions carry no bias; the batch norm that follows supplies the
/// shift.
pub struct DoubleConv {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
}

impl DoubleConv {
    /// `mid_channels` defaults to `out_channels`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        mid_channels: Option<usize>,
        norm: NormSettings,
        rng: &mut impl Rng,
    ) -> Self {
        let mid = mid_channels.unwrap_or(out_channels);
        Self {
            conv1: Conv2d::new(in_channels, mid, 3, 1, 1, false, rng),
            bn1: BatchNorm2d::new(mid, norm.eps, norm.momentum),
            conv2: Conv2d::new(mid, out_channels, 3, 1, 1, false, rng),
            bn2: BatchNorm2d::new(out_channels, norm.eps, norm.momentum),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.conv1.in_channels()
    }

    pub fn mid_channels(&self) -> usize {
        self.conv1.out_channels()
    }

    pub fn out_channels(&self) -> usize {
        self.conv2.out_channels()
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        let mut h = self.bn1.forward(&self.conv1.forward(x)?)?;
        relu::forward_tensor(&mut h);
        let mut out = self.bn2.forward(&self.conv2.forward(&h)?)?;
        relu::forward_tensor(&mut out);
        Ok(out)
    }

    pub fn forward_train(&mut self, x: &Tensor, mut trace: Trace<'_>) -> Result<Tensor, NetError> {
        let c1 = self.conv1.forward(x)?;
        keep(&mut trace, &c1);
        let mut h = self.bn1.forward_train(&c1)?;
        keep(&mut trace, &h);
        relu::forward_tensor(&mut h);
        keep(&mut trace, &h);
        let c2 = self.conv2.forward(&h)?;
        keep(&mut trace, &c2);
        let mut out = self.bn2.forward_train(&c2)?;
        keep(&mut trace, &out);
        relu::forward_tensor(&mut out);
        keep(&mut trace, &out);
        Ok(out)
    }

    pub fn replay(&self, x: &Tensor) -> Result<Tensor, NetError> {
        let mut h = self.bn1.forward_batch_stats(&self.conv1.forward(x)?)?;
        relu::forward_tensor(&mut h);
        let mut out = self.bn2.forward_batch_stats(&self.conv2.forward(&h)?)?;
        relu::forward_tensor(&mut out);
        Ok(out)
    }
}

impl Parameterized for DoubleConv {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        let p = join(prefix, "double_conv");
        self.conv1.named_parameters(&join(&p, "0"), out);
        self.bn1.named_parameters(&join(&p, "1"), out);
        self.conv2.named_parameters(&join(&p, "3"), out);
        self.bn2.named_parameters(&join(&p, "4"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        let p = join(prefix, "double_conv");
        self.conv1.named_parameters_mut(&join(&p, "0"), out);
        self.bn1.named_parameters_mut(&join(&p, "1"), out);
        self.conv2.named_parameters_mut(&join(&p, "3"), out);
        self.bn2.named_parameters_mut(&join(&p, "4"), out);
    }
}

/// Downscaling with 2x2 max pool, then a [`DoubleConv`].
pub struct Down {
    pool: MaxPool2d,
    conv: DoubleConv,
}

impl Down {
    pub fn new(in_channels: usize, out_channels: usize, norm: NormSettings, rng: &mut impl Rng) -> Self {
        Self {
            pool: MaxPool2d::new(2, 2),
            conv: DoubleConv::new(in_channels, out_channels, None, norm, rng),
        }
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        self.conv.forward(&self.pool.forward(x)?)
    }

    pub fn forward_train(&mut self, x: &Tensor, mut trace: Trace<'_>) -> Result<Tensor, NetError> {
        let pooled = self.pool.forward(x)?;
        keep(&mut trace, &pooled);
        self.conv.forward_train(&pooled, trace)
    }

    pub fn replay(&self, x: &Tensor) -> Result<Tensor, NetError> {
        self.conv.replay(&self.pool.forward(x)?)
    }
}

impl Parameterized for Down {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        // index 0 of torch's `maxpool_conv` sequential is the parameter-free pool
        self.conv.named_parameters(&join(prefix, "maxpool_conv.1"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        self.conv.named_parameters_mut(&join(prefix, "maxpool_conv.1"), out);
    }
}

/// How [`Up`] doubles the spatial size of the deeper feature map.
pub enum Upsampler {
    /// Fixed bilinear interpolation with aligned corners; channels unchanged.
    Bilinear(UpsampleBilinear),
    /// Learned 2x2 stride-2 transposed convolution halving the channels.
    Transpose(ConvTranspose2d),
}

/// Upscaling, skip concatenation, then a [`DoubleConv`].
pub struct Up {
    up: Upsampler,
    conv: DoubleConv,
}

impl Up {
    /// `in_channels` counts the concatenated tensor (skip plus upsampled).
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        bilinear: bool,
        norm: NormSettings,
        rng: &mut impl Rng,
    ) -> Self {
        if bilinear {
            Self {
                up: Upsampler::Bilinear(UpsampleBilinear::new(2)),
                conv: DoubleConv::new(in_channels, out_channels, Some(in_channels / 2), norm, rng),
            }
        } else {
            Self {
                up: Upsampler::Transpose(ConvTranspose2d::new(
                    in_channels,
                    in_channels / 2,
                    2,
                    2,
                    rng,
                )),
                conv: DoubleConv::new(in_channels, out_channels, None, norm, rng),
            }
        }
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    pub fn is_bilinear(&self) -> bool {
        matches!(self.up, Upsampler::Bilinear(_))
    }

    /// Upsample `x`, pad or crop it onto `skip`'s spatial grid and stack
    /// `[skip, x]` along the channel axis.
    fn merge(&self, x: &Tensor, skip: &Tensor) -> Result<Tensor, NetError> {
        let upsampled = match &self.up {
            Upsampler::Bilinear(u) => u.forward(x)?,
            Upsampler::Transpose(t) => t.forward(x)?,
        };
        let aligned = align_to(&upsampled, skip)?;
        Tensor::concat_channels(&[skip, &aligned])
    }

    pub fn forward(&self, x: &Tensor, skip: &Tensor) -> Result<Tensor, NetError> {
        self.conv.forward(&self.merge(x, skip)?)
    }

    pub fn forward_train(
        &mut self,
        x: &Tensor,
        skip: &Tensor,
        mut trace: Trace<'_>,
    ) -> Result<Tensor, NetError> {
        let merged = self.merge(x, skip)?;
        keep(&mut trace, &merged);
        self.conv.forward_train(&merged, trace)
    }

    pub fn replay(&self, x: &Tensor, skip: &Tensor) -> Result<Tensor, NetError> {
        self.conv.replay(&self.merge(x, skip)?)
    }
}

/// Pad (or crop, when `x` is larger) `x` so its spatial extent equals
/// `target`'s. The split is `[d/2, d - d/2]` with floor division.
pub fn align_to(x: &Tensor, target: &Tensor) -> Result<Tensor, NetError> {
    let (_, _, h, w) = x.dims4("align")?;
    let (_, _, th, tw) = target.dims4("align")?;
    let dy = th as isize - h as isize;
    let dx = tw as isize - w as isize;
    if dx == 0 && dy == 0 {
        return Ok(x.clone());
    }
    debug!("aligning {}x{} onto {}x{} (dy {}, dx {})", h, w, th, tw, dy, dx);
    let (left, top) = (dx.div_euclid(2), dy.div_euclid(2));
    x.pad2d([left, dx - left, top, dy - top])
}

impl Parameterized for Up {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        if let Upsampler::Transpose(t) = &self.up {
            t.named_parameters(&join(prefix, "up"), out);
        }
        self.conv.named_parameters(&join(prefix, "conv"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        if let Upsampler::Transpose(t) = &mut self.up {
            t.named_parameters_mut(&join(prefix, "up"), out);
        }
        self.conv.named_parameters_mut(&join(prefix, "conv"), out);
    }
}

/// 1x1 convolution to the class channels; raw logits, no activation.
pub struct OutConv {
    conv: Conv2d,
}

impl OutConv {
    pub fn new(in_channels: usize, out_channels: usize, rng: &mut impl Rng) -> Self {
        Self {
            conv: Conv2d::new(in_channels, out_channels, 1, 1, 0, true, rng),
        }
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        self.conv.forward(x)
    }
}

impl Parameterized for OutConv {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        self.conv.named_parameters(&join(prefix, "conv"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        self.conv.named_parameters_mut(&join(prefix, "conv"), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_from_seed;

    #[test]
    fn double_conv_keeps_spatial_size() {
        let mut rng = rng_from_seed(1);
        let block = DoubleConv::new(3, 4, None, NormSettings::default(), &mut rng);
        let x = Tensor::from_fn(vec![2, 3, 7, 5], |i| (i as f32 * 0.37).sin());
        let y = block.forward(&x).unwrap();
        assert_eq!(y.shape, vec![2, 4, 7, 5]);
        assert!(y.data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn down_halves_with_floor() {
        let mut rng = rng_from_seed(2);
        let down = Down::new(2, 4, NormSettings::default(), &mut rng);
        let x = Tensor::zeros(vec![1, 2, 9, 8]);
        assert_eq!(down.forward(&x).unwrap().shape, vec![1, 4, 4, 4]);
    }

    #[test]
    fn align_pads_odd_mismatch_on_the_far_side() {
        let x = Tensor::full(vec![1, 1, 2, 2], 1.0);
        let target = Tensor::zeros(vec![1, 1, 3, 3]);
        let y = align_to(&x, &target).unwrap();
        assert_eq!(y.shape, vec![1, 1, 3, 3]);
        assert_eq!(y.data, vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn align_crops_when_larger() {
        let x = Tensor::from_fn(vec![1, 1, 3, 3], |i| i as f32);
        let target = Tensor::zeros(vec![1, 1, 2, 2]);
        let y = align_to(&x, &target).unwrap();
        // dx = -1 => left -1, right 0
        assert_eq!(y.data, vec![4.0, 5.0, 7.0, 8.0]);
    }

    #[test]
    fn up_transpose_restores_skip_size_for_odd_input() {
        let mut rng = rng_from_seed(3);
        let up = Up::new(8, 4, false, NormSettings::default(), &mut rng);
        let deep = Tensor::from_fn(vec![1, 8, 2, 2], |i| i as f32 * 0.01);
        let skip = Tensor::from_fn(vec![1, 4, 5, 5], |i| i as f32 * 0.02);
        let y = up.forward(&deep, &skip).unwrap();
        assert_eq!(y.shape, vec![1, 4, 5, 5]);
    }

    #[test]
    fn up_bilinear_uses_half_mid_channels() {
        let mut rng = rng_from_seed(4);
        let up = Up::new(8, 2, true, NormSettings::default(), &mut rng);
        assert!(up.is_bilinear());
        assert_eq!(up.conv.mid_channels(), 4);
        let deep = Tensor::zeros(vec![1, 4, 3, 3]);
        let skip = Tensor::zeros(vec![1, 4, 7, 7]);
        assert_eq!(up.forward(&deep, &skip).unwrap().shape, vec![1, 2, 7, 7]);
    }

    #[test]
    fn parameter_names_follow_torch_layout() {
        let mut rng = rng_from_seed(5);
        let down = Down::new(2, 4, NormSettings::default(), &mut rng);
        let mut names = Vec::new();
        down.named_parameters("down1", &mut names);
        let names: Vec<_> = names.into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names[0], "down1.maxpool_conv.1.double_conv.0.weight");
        assert!(names.contains(&"down1.maxpool_conv.1.double_conv.4.running_var".to_string()));
        assert_eq!(names.len(), 10);
    }
}
