pub mod backbone;
pub mod compseg;
pub mod heads;
pub mod parts;
pub mod segnet;
pub mod unet;

pub use backbone::{Backbone, ChannelPlan, Stage};
pub use compseg::{CompSegNet, CompSegNet3, CompSegNetGrader};
pub use heads::{ClassificationHead, Head, PlainLogitsHead, PooledScore, PooledScoreHead};
pub use parts::{DoubleConv, Down, NormSettings, OutConv, Up};
pub use segnet::SegNet;
pub use unet::UNet;
