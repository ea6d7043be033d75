use super::heads::PlainLogitsHead;
use super::segnet::{delegate_segnet, SegNet};
use crate::config::NetConfig;
use crate::error::NetError;
use crate::tensor::Tensor;

/// Plain U-Net producing per-pixel class logits at input resolution.
pub struct UNet {
    net: SegNet<PlainLogitsHead>,
}

impl UNet {
    pub fn new(n_channels: usize, n_classes: usize, bilinear: bool) -> Result<Self, NetError> {
        let cfg = NetConfig {
            bilinear,
            ..NetConfig::new(n_channels, n_classes)
        };
        Self::from_config(&cfg)
    }

    /// `cfg.dropout` is ignored; the plain U-Net has no dropout.
    pub fn from_config(cfg: &NetConfig) -> Result<Self, NetError> {
        Ok(Self {
            net: SegNet::build("UNet", cfg, PlainLogitsHead, 0.0)?,
        })
    }

    /// Logits `(B, n_classes, H, W)` for an image `(B, n_channels, H, W)`.
    pub fn forward(&self, image: &Tensor) -> Result<Tensor, NetError> {
        self.net.forward(image, None)
    }

    pub fn forward_train(&mut self, image: &Tensor) -> Result<Tensor, NetError> {
        self.net.forward_train(image, None)
    }
}

delegate_segnet!(UNet);
