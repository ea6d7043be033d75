use crate::error::NetError;
use crate::tensor::Tensor;

/// Common interface for single-input network layers.
pub trait Layer {
    /// Forward pass used during inference: frozen statistics, no dropout.
    fn forward(&self, x: &Tensor) -> Result<Tensor, NetError>;

    /// Forward pass used during training. Layers with batch statistics or
    /// stochastic behaviour override this; stateless layers reuse
    /// [`Layer::forward`].
    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor, NetError> {
        self.forward(x)
    }
}

/// Whether a named tensor is learned by the optimiser or is a tracked buffer
/// such as a batch-norm running mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Weight,
    Buffer,
}

/// Named access to the tensors a block owns.
///
/// Names are dotted paths built from `prefix`, matching the keys of a
/// PyTorch `state_dict` for the same architecture.
pub trait Parameterized {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>);

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    );

    /// Number of learnable scalars, buffers excluded.
    fn parameter_count(&self) -> usize {
        let mut params = Vec::new();
        self.named_parameters("", &mut params);
        params
            .iter()
            .filter(|(_, kind, _)| *kind == ParamKind::Weight)
            .map(|(_, _, t)| t.numel())
            .sum()
    }
}

/// Join a parameter prefix and a local name with a dot.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
