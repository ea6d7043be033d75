//! U-Net segmentation networks and the weakly-supervised CompSeg variants.
//!
//! The crate carries its own small NCHW [`tensor::Tensor`] and the handful of
//! layer primitives the U-Net graph needs. Networks are assembled from a
//! shared [`models::Backbone`] and a pluggable [`models::Head`].

pub mod config;
pub mod error;
pub mod layers;
pub mod math;
pub mod models;
pub mod rng;
pub mod tensor;
pub mod util;
pub mod weights;

pub use config::NetConfig;
pub use error::NetError;
pub use tensor::Tensor;
