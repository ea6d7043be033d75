use super::layer::Layer;
use crate::error::NetError;
use crate::tensor::Tensor;

/// 2D max pooling over every plane of an NCHW tensor.
///
/// Output size is `(h - kernel) / stride + 1`; trailing rows or columns that
/// do not fill a window are dropped.
pub fn max_pool2d(x: &Tensor, kernel: usize, stride: usize) -> Result<Tensor, NetError> {
    let (batch, channels, h, w) = x.dims4("max_pool2d")?;
    if h < kernel || w < kernel {
        return Err(NetError::shape(
            "max_pool2d",
            format!("spatial size of at least {}x{}", kernel, kernel),
            &x.shape,
        ));
    }
    let out_h = (h - kernel) / stride + 1;
    let out_w = (w - kernel) / stride + 1;
    let mut out = Vec::with_capacity(batch * channels * out_h * out_w);
    for b in 0..batch {
        for c in 0..channels {
            let src = x.plane(b, c);
            for r in 0..out_h {
                for col in 0..out_w {
                    let mut best = f32::NEG_INFINITY;
                    for kr in 0..kernel {
                        for kc in 0..kernel {
                            let val = src[(r * stride + kr) * w + col * stride + kc];
                            if val > best || val.is_nan() {
                                best = val;
                            }
                        }
                    }
                    out.push(best);
                }
            }
        }
    }
    Ok(Tensor::new(out, vec![batch, channels, out_h, out_w]))
}

/// Max pooling layer implementing the [`Layer`] trait.
#[derive(Clone, Copy, Debug)]
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,
}

impl MaxPool2d {
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            kernel: kernel.max(1),
            stride: stride.max(1),
        }
    }

    pub fn kernel(&self) -> usize {
        self.kernel
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Layer for MaxPool2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        max_pool2d(x, self.kernel, self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_size_floors() {
        let x = Tensor::from_fn(vec![1, 1, 5, 5], |i| i as f32);
        let y = max_pool2d(&x, 2, 2).unwrap();
        assert_eq!(y.shape, vec![1, 1, 2, 2]);
        assert_eq!(y.data, vec![6.0, 8.0, 16.0, 18.0]);
    }

    #[test]
    fn too_small_input_is_rejected() {
        let x = Tensor::zeros(vec![1, 1, 1, 4]);
        assert!(max_pool2d(&x, 2, 2).is_err());
    }
}
