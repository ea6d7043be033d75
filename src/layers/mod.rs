pub mod conv;
pub mod conv_transpose;
pub mod dropout;
pub mod layer;
pub mod normalization;
pub mod pooling;
pub mod relu;
pub mod sigmoid;
pub mod softmax;
pub mod trans_sigmoid;
pub mod upsample;

pub use conv::Conv2d;
pub use conv_transpose::ConvTranspose2d;
pub use dropout::Dropout;
pub use layer::{Layer, ParamKind, Parameterized};
pub use normalization::BatchNorm2d;
pub use pooling::MaxPool2d;
pub use trans_sigmoid::TransSigmoid;
pub use upsample::UpsampleBilinear;
