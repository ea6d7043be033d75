use crate::tensor::Tensor;

/// Apply ReLU activation in place on a tensor.
pub fn forward_tensor(t: &mut Tensor) {
    for v in t.data.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}
