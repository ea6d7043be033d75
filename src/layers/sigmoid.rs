use crate::tensor::Tensor;

pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Apply sigmoid activation in place on a tensor.
pub fn forward_tensor(t: &mut Tensor) {
    t.map_inplace(sigmoid);
}

/// Sigmoid of every element, leaving the input untouched.
pub fn forward(t: &Tensor) -> Tensor {
    t.map(sigmoid)
}
