//! Weakly-supervised variants sharing the U-Net backbone.

use super::heads::{ClassificationHead, PooledScore, PooledScoreHead};
use super::segnet::{delegate_segnet, SegNet};
use crate::config::NetConfig;
use crate::error::NetError;
use crate::tensor::Tensor;
use log::warn;

fn compseg_config(
    n_channels: usize,
    n_classes: usize,
    bilinear: bool,
    dropout: f32,
    alpha: f32,
    beta: f32,
) -> NetConfig {
    NetConfig {
        bilinear,
        dropout,
        alpha,
        beta,
        ..NetConfig::new(n_channels, n_classes)
    }
}

/// U-Net with dropout between stages whose per-pixel sigmoid map is pooled
/// over the tissue area and squashed into a bounded per-class score.
pub struct CompSegNet {
    net: SegNet<PooledScoreHead>,
}

impl CompSegNet {
    pub fn new(
        n_channels: usize,
        n_classes: usize,
        bilinear: bool,
        dropout: f32,
        alpha: f32,
        beta: f32,
    ) -> Result<Self, NetError> {
        Self::from_config(&compseg_config(n_channels, n_classes, bilinear, dropout, alpha, beta))
    }

    pub fn from_config(cfg: &NetConfig) -> Result<Self, NetError> {
        let head = PooledScoreHead::new(cfg.alpha, cfg.beta)?;
        Ok(Self {
            net: SegNet::build("CompSegNet", cfg, head, cfg.dropout)?,
        })
    }

    /// Without a tissue mask the nonzero pixels of `image` stand in for the
    /// tissue area. Use `score` and `sig`; `pool_frac` is filled as well.
    pub fn forward(&self, image: &Tensor, tissue_mask: Option<&Tensor>) -> Result<PooledScore, NetError> {
        self.net.forward(image, tissue_mask)
    }

    pub fn forward_train(
        &mut self,
        image: &Tensor,
        tissue_mask: Option<&Tensor>,
    ) -> Result<PooledScore, NetError> {
        self.net.forward_train(image, tissue_mask)
    }

    pub fn dropout(&self) -> f32 {
        self.net.dropout()
    }
}

delegate_segnet!(CompSegNet);

/// [`CompSegNet`] that requires a tissue mask and reports the unclipped
/// pooled fraction next to the score.
pub struct CompSegNet3 {
    net: SegNet<PooledScoreHead>,
}

impl CompSegNet3 {
    pub fn new(
        n_channels: usize,
        n_classes: usize,
        bilinear: bool,
        dropout: f32,
        alpha: f32,
        beta: f32,
    ) -> Result<Self, NetError> {
        Self::from_config(&compseg_config(n_channels, n_classes, bilinear, dropout, alpha, beta))
    }

    pub fn from_config(cfg: &NetConfig) -> Result<Self, NetError> {
        let head = PooledScoreHead::new(cfg.alpha, cfg.beta)?;
        Ok(Self {
            net: SegNet::build("CompSegNet3", cfg, head, cfg.dropout)?,
        })
    }

    pub fn forward(&self, image: &Tensor, tissue_mask: &Tensor) -> Result<PooledScore, NetError> {
        self.net.forward(image, Some(tissue_mask))
    }

    pub fn forward_train(&mut self, image: &Tensor, tissue_mask: &Tensor) -> Result<PooledScore, NetError> {
        self.net.forward_train(image, Some(tissue_mask))
    }

    pub fn dropout(&self) -> f32 {
        self.net.dropout()
    }
}

delegate_segnet!(CompSegNet3);

/// Per-pixel grading network: sigmoid activations, optionally softmaxed
/// across the grade channels.
pub struct CompSegNetGrader {
    net: SegNet<ClassificationHead>,
}

impl CompSegNetGrader {
    pub fn new(
        n_channels: usize,
        n_classes: usize,
        bilinear: bool,
        dropout: f32,
        softmax: bool,
    ) -> Result<Self, NetError> {
        let cfg = NetConfig {
            bilinear,
            dropout,
            softmax,
            ..NetConfig::new(n_channels, n_classes)
        };
        Self::from_config(&cfg)
    }

    pub fn from_config(cfg: &NetConfig) -> Result<Self, NetError> {
        Ok(Self {
            net: SegNet::build("CompSegNetGrader", cfg, ClassificationHead::new(cfg.softmax), cfg.dropout)?,
        })
    }

    pub fn dropout(&self) -> f32 {
        self.net.dropout()
    }

    pub fn softmax(&self) -> bool {
        self.net.head().softmax()
    }

    /// `cancer_mask` is accepted but takes no part in the computation.
    pub fn forward(&self, image: &Tensor, cancer_mask: &Tensor) -> Result<Tensor, NetError> {
        check_cancer_mask(image, cancer_mask);
        self.net.forward(image, None)
    }

    pub fn forward_train(&mut self, image: &Tensor, cancer_mask: &Tensor) -> Result<Tensor, NetError> {
        check_cancer_mask(image, cancer_mask);
        self.net.forward_train(image, None)
    }
}

delegate_segnet!(CompSegNetGrader);

fn check_cancer_mask(image: &Tensor, cancer_mask: &Tensor) {
    if image.shape.first() != cancer_mask.shape.first() {
        warn!(
            "cancer mask {:?} does not match image batch {:?}; it is not used",
            cancer_mask.shape, image.shape
        );
    }
}
