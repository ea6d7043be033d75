use std::fmt;

/// Errors raised while building or running a network.
#[derive(Debug, Clone, PartialEq)]
pub enum NetError {
    /// A tensor had the wrong rank or spatial extent for `op`.
    Shape {
        op: &'static str,
        expected: String,
        got: Vec<usize>,
    },
    /// The channel axis did not match what the layer was built for.
    ChannelMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    /// A sample had no tissue pixels to normalise the pooled activation by.
    DivisionByZero { sample: usize, class: usize },
    InvalidConfig(String),
    /// Parameter import failed: unknown or missing name, or a shape mismatch.
    Weights(String),
}

impl NetError {
    pub(crate) fn shape(op: &'static str, expected: impl Into<String>, got: &[usize]) -> Self {
        NetError::Shape {
            op,
            expected: expected.into(),
            got: got.to_vec(),
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Shape { op, expected, got } => {
                write!(f, "{}: expected {}, got shape {:?}", op, expected, got)
            }
            NetError::ChannelMismatch { op, expected, got } => write!(
                f,
                "{}: expected {} input channels, got {}",
                op, expected, got
            ),
            NetError::DivisionByZero { sample, class } => write!(
                f,
                "tissue pixel count is zero for sample {} (class {})",
                sample, class
            ),
            NetError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            NetError::Weights(msg) => write!(f, "weights: {}", msg),
        }
    }
}

impl std::error::Error for NetError {}
