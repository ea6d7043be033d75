use crate::error::NetError;
use crate::layers::TransSigmoid;
use serde::{Deserialize, Serialize};
use std::fs;

/// Which network a configuration builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Unet,
    CompSeg,
    CompSeg3,
    Grader,
}

/// Network construction parameters loaded from a TOML or JSON file.
///
/// Fields missing from the file take their [`Default`] value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub variant: Variant,
    /// Input channel depth.
    pub n_channels: usize,
    /// Output channel depth, one per class.
    pub n_classes: usize,
    /// Fixed bilinear upsampling instead of learned transposed convolutions.
    pub bilinear: bool,
    /// Dropout probability after every backbone stage (CompSeg variants and grader).
    pub dropout: f32,
    /// Transitional sigmoid ramp width.
    pub alpha: f32,
    /// Transitional sigmoid plateau width.
    pub beta: f32,
    /// Grader head: softmax across classes after the sigmoid.
    pub softmax: bool,
    /// Channels of the first encoder stage; doubles at every level.
    pub base_width: usize,
    pub bn_eps: f32,
    pub bn_momentum: f32,
    pub checkpointing: bool,
    /// Fixed seed for weight init and dropout, otherwise `SEED` from the
    /// environment.
    pub seed: Option<u64>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Unet,
            n_channels: 3,
            n_classes: 1,
            bilinear: false,
            dropout: 0.0,
            alpha: 0.1,
            beta: 0.8,
            softmax: true,
            base_width: 64,
            bn_eps: 1e-5,
            bn_momentum: 0.1,
            checkpointing: false,
            seed: None,
        }
    }
}

impl NetConfig {
    pub fn new(n_channels: usize, n_classes: usize) -> Self {
        Self {
            n_channels,
            n_classes,
            ..Self::default()
        }
    }

    /// Load configuration from the given path.  Supports TOML or JSON based on
    /// the file extension. Returns `None` if reading or parsing fails.
    pub fn from_path(path: &str) -> Option<Self> {
        let Ok(content) = fs::read_to_string(path) else {
            return None;
        };
        if path.ends_with(".json") {
            serde_json::from_str(&content).ok()
        } else {
            toml::from_str(&content).ok()
        }
    }

    pub fn validate(&self) -> Result<(), NetError> {
        if self.n_channels == 0 || self.n_classes == 0 {
            return Err(NetError::InvalidConfig(format!(
                "n_channels and n_classes must be positive (got {} and {})",
                self.n_channels, self.n_classes
            )));
        }
        if self.base_width == 0 {
            return Err(NetError::InvalidConfig("base_width must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(NetError::InvalidConfig(format!(
                "dropout probability must lie in [0, 1], got {}",
                self.dropout
            )));
        }
        if !(self.bn_eps > 0.0) || !(0.0..=1.0).contains(&self.bn_momentum) {
            return Err(NetError::InvalidConfig(format!(
                "batch norm needs eps > 0 and momentum in [0, 1] (got {}, {})",
                self.bn_eps, self.bn_momentum
            )));
        }
        if matches!(self.variant, Variant::CompSeg | Variant::CompSeg3) {
            TransSigmoid::new(self.alpha, self.beta)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constructor() {
        let cfg = NetConfig::default();
        assert_eq!(cfg.alpha, 0.1);
        assert_eq!(cfg.beta, 0.8);
        assert_eq!(cfg.dropout, 0.0);
        assert!(!cfg.bilinear);
        assert!(cfg.softmax);
        assert_eq!(cfg.base_width, 64);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_trans_sigmoid_only_matters_for_compseg() {
        let mut cfg = NetConfig::new(3, 2);
        cfg.alpha = 0.5;
        cfg.beta = 0.6;
        assert!(cfg.validate().is_ok());
        cfg.variant = Variant::CompSeg;
        assert!(matches!(cfg.validate(), Err(NetError::InvalidConfig(_))));
    }
}
