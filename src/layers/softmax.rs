use crate::error::NetError;
use crate::tensor::Tensor;

/// Softmax across the channel axis of an NCHW tensor, independently for
/// every pixel. The channel maximum is subtracted before exponentiation to
/// avoid overflow.
pub fn softmax_channels(x: &Tensor) -> Result<Tensor, NetError> {
    let (batch, channels, h, w) = x.dims4("softmax")?;
    let plane = h * w;
    let mut out = x.clone();
    for b in 0..batch {
        let base = b * channels * plane;
        for p in 0..plane {
            let at = |c: usize| base + c * plane + p;
            let max = (0..channels)
                .map(|c| x.data[at(c)])
                .fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for c in 0..channels {
                let e = (x.data[at(c)] - max).exp();
                out.data[at(c)] = e;
                sum += e;
            }
            for c in 0..channels {
                out.data[at(c)] /= sum;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_pixel_sums_to_one() {
        let x = Tensor::from_fn(vec![2, 3, 2, 2], |i| (i % 7) as f32 - 3.0);
        let y = softmax_channels(&x).unwrap();
        for b in 0..2 {
            for p in 0..4 {
                let s: f32 = (0..3).map(|c| y.plane(b, c)[p]).sum();
                assert!((s - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn large_logits_do_not_overflow() {
        let x = Tensor::new(vec![1000.0, 1000.0], vec![1, 2, 1, 1]);
        let y = softmax_channels(&x).unwrap();
        assert_eq!(y.data, vec![0.5, 0.5]);
    }
}
