use super::layer::Layer;
use crate::error::NetError;
use crate::tensor::Tensor;

/// Source coordinate and blend weight for one output index when the corner
/// pixels of input and output are aligned.
fn source_index(out_idx: usize, in_len: usize, out_len: usize) -> (usize, usize, f32) {
    if in_len == 1 || out_len == 1 {
        return (0, 0, 0.0);
    }
    let src = out_idx as f32 * (in_len - 1) as f32 / (out_len - 1) as f32;
    let i0 = (src.floor() as usize).min(in_len - 1);
    let i1 = (i0 + 1).min(in_len - 1);
    (i0, i1, src - i0 as f32)
}

/// Bilinear resize of every plane to `out_h x out_w` with aligned corners.
pub fn resize_bilinear(x: &Tensor, out_h: usize, out_w: usize) -> Result<Tensor, NetError> {
    let (batch, channels, h, w) = x.dims4("upsample")?;
    if h == 0 || w == 0 || out_h == 0 || out_w == 0 {
        return Err(NetError::shape("upsample", "non-empty spatial axes", &x.shape));
    }
    let rows: Vec<_> = (0..out_h).map(|oy| source_index(oy, h, out_h)).collect();
    let cols: Vec<_> = (0..out_w).map(|ox| source_index(ox, w, out_w)).collect();
    let mut out = Vec::with_capacity(batch * channels * out_h * out_w);
    for b in 0..batch {
        for c in 0..channels {
            let src = x.plane(b, c);
            for &(y0, y1, wy) in &rows {
                for &(x0, x1, wx) in &cols {
                    let top = src[y0 * w + x0] * (1.0 - wx) + src[y0 * w + x1] * wx;
                    let bottom = src[y1 * w + x0] * (1.0 - wx) + src[y1 * w + x1] * wx;
                    out.push(top * (1.0 - wy) + bottom * wy);
                }
            }
        }
    }
    Ok(Tensor::new(out, vec![batch, channels, out_h, out_w]))
}

/// Fixed (parameter-free) upsampling by an integer factor.
#[derive(Clone, Copy, Debug)]
pub struct UpsampleBilinear {
    scale: usize,
}

impl UpsampleBilinear {
    pub fn new(scale: usize) -> Self {
        Self {
            scale: scale.max(1),
        }
    }
}

impl Layer for UpsampleBilinear {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        let (_, _, h, w) = x.dims4("upsample")?;
        resize_bilinear(x, h * self.scale, w * self.scale)
    }
}
