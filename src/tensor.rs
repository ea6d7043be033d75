use crate::error::NetError;

/// N-dimensional tensor backed by a flat `Vec<f32>`.
///
/// Network activations are 4-D in NCHW order `(batch, channel, height,
/// width)`; parameters are 1-D (biases, norm statistics) or 4-D (kernels).
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Tensor elements in row-major order.
    pub data: Vec<f32>,
    /// Sizes for each dimension.
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor from raw parts. The number of elements in `data`
    /// must match the product of `shape`.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        assert_eq!(data.len(), shape.iter().product::<usize>());
        Tensor { data, shape }
    }

    /// Fallible variant of [`Tensor::new`] for data coming from outside the
    /// crate (checkpoints, callers).
    pub fn try_new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, NetError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(NetError::Shape {
                op: "tensor",
                expected: format!("{} elements", expected),
                got: vec![data.len()],
            });
        }
        Ok(Tensor { data, shape })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let len: usize = shape.iter().product();
        Tensor {
            data: vec![value; len],
            shape,
        }
    }

    pub fn zeros_like(other: &Tensor) -> Self {
        Tensor {
            data: vec![0.0; other.data.len()],
            shape: other.shape.clone(),
        }
    }

    /// Build a tensor by evaluating `f` on the flat index of every element.
    pub fn from_fn(shape: Vec<usize>, f: impl FnMut(usize) -> f32) -> Self {
        let len: usize = shape.iter().product();
        Tensor {
            data: (0..len).map(f).collect(),
            shape,
        }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    fn offset(&self, idx: &[usize]) -> usize {
        assert_eq!(idx.len(), self.shape.len());
        let mut stride = 1;
        let mut off = 0usize;
        for (i, &dim) in self.shape.iter().rev().enumerate() {
            let id = idx[self.shape.len() - 1 - i];
            assert!(id < dim, "index out of bounds");
            off += id * stride;
            stride *= dim;
        }
        off
    }

    pub fn get(&self, idx: &[usize]) -> f32 {
        self.data[self.offset(idx)]
    }

    pub fn set(&mut self, idx: &[usize], value: f32) {
        let off = self.offset(idx);
        self.data[off] = value;
    }

    /// Change the view of the underlying data without modifying order.
    pub fn reshape(&mut self, new_shape: Vec<usize>) {
        assert_eq!(self.data.len(), new_shape.iter().product::<usize>());
        self.shape = new_shape;
    }

    /// Split a rank-4 shape into `(batch, channels, height, width)`.
    pub fn dims4(&self, op: &'static str) -> Result<(usize, usize, usize, usize), NetError> {
        match self.shape.as_slice() {
            &[b, c, h, w] => Ok((b, c, h, w)),
            other => Err(NetError::shape(op, "a 4-D NCHW tensor", other)),
        }
    }

    /// Contiguous `(h, w)` plane for one sample and channel.
    pub fn plane(&self, b: usize, c: usize) -> &[f32] {
        let (ch, h, w) = (self.shape[1], self.shape[2], self.shape[3]);
        let start = (b * ch + c) * h * w;
        &self.data[start..start + h * w]
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn map_inplace(&mut self, f: impl Fn(f32) -> f32) {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
    }

    /// Concatenate NCHW tensors along the channel axis. Batch and spatial
    /// extents must agree exactly.
    pub fn concat_channels(parts: &[&Tensor]) -> Result<Tensor, NetError> {
        let first = parts
            .first()
            .ok_or_else(|| NetError::shape("concat", "at least one tensor", &[]))?;
        let (b, _, h, w) = first.dims4("concat")?;
        let mut total_c = 0;
        for p in parts {
            let (pb, pc, ph, pw) = p.dims4("concat")?;
            if pb != b || ph != h || pw != w {
                return Err(NetError::shape(
                    "concat",
                    format!("batch {} and spatial {}x{}", b, h, w),
                    &p.shape,
                ));
            }
            total_c += pc;
        }
        let plane = h * w;
        let mut data = Vec::with_capacity(b * total_c * plane);
        for n in 0..b {
            for p in parts {
                let pc = p.shape[1];
                let start = n * pc * plane;
                data.extend_from_slice(&p.data[start..start + pc * plane]);
            }
        }
        Ok(Tensor {
            data,
            shape: vec![b, total_c, h, w],
        })
    }

    /// Zero-pad (positive amounts) or crop (negative amounts) the two
    /// spatial axes, `[left, right, top, bottom]`.
    pub fn pad2d(&self, pad: [isize; 4]) -> Result<Tensor, NetError> {
        let (b, c, h, w) = self.dims4("pad2d")?;
        let [left, right, top, bottom] = pad;
        let out_h = h as isize + top + bottom;
        let out_w = w as isize + left + right;
        if out_h <= 0 || out_w <= 0 {
            return Err(NetError::shape(
                "pad2d",
                format!("a positive size after padding by {:?}", pad),
                &self.shape,
            ));
        }
        let (out_h, out_w) = (out_h as usize, out_w as usize);
        let mut out = Tensor::zeros(vec![b, c, out_h, out_w]);
        for n in 0..b {
            for ch in 0..c {
                let src = self.plane(n, ch);
                let base = (n * c + ch) * out_h * out_w;
                for oy in 0..out_h {
                    let iy = oy as isize - top;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for ox in 0..out_w {
                        let ix = ox as isize - left;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        out.data[base + oy * out_w + ox] = src[iy as usize * w + ix as usize];
                    }
                }
            }
        }
        Ok(out)
    }

    /// Sum over the spatial axes, `(B, C, H, W) -> (B, C)`.
    pub fn sum_spatial(&self) -> Result<Tensor, NetError> {
        let (b, c, _, _) = self.dims4("sum_spatial")?;
        let mut out = Vec::with_capacity(b * c);
        for n in 0..b {
            for ch in 0..c {
                out.push(self.plane(n, ch).iter().sum());
            }
        }
        Ok(Tensor::new(out, vec![b, c]))
    }

    /// Count of nonzero elements over the spatial axes, `(B, C)`.
    pub fn count_nonzero_spatial(&self) -> Result<Tensor, NetError> {
        let (b, c, _, _) = self.dims4("count_nonzero")?;
        let mut out = Vec::with_capacity(b * c);
        for n in 0..b {
            for ch in 0..c {
                out.push(self.plane(n, ch).iter().filter(|v| **v != 0.0).count() as f32);
            }
        }
        Ok(Tensor::new(out, vec![b, c]))
    }

    /// Largest absolute elementwise difference; `None` if shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor) -> Option<f32> {
        if self.shape != other.shape {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .fold(0.0f32, |m, (a, b)| m.max((a - b).abs())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_then_crop_restores() {
        let t = Tensor::from_fn(vec![1, 2, 3, 3], |i| i as f32);
        let padded = t.pad2d([0, 1, 1, 0]).unwrap();
        assert_eq!(padded.shape, vec![1, 2, 4, 4]);
        let back = padded.pad2d([0, -1, -1, 0]).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn dims4_rejects_matrix() {
        let t = Tensor::zeros(vec![2, 3]);
        assert!(matches!(t.dims4("x"), Err(NetError::Shape { .. })));
    }
}
