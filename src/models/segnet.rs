use super::backbone::Backbone;
use super::heads::Head;
use super::parts::NormSettings;
use crate::config::NetConfig;
use crate::error::NetError;
use crate::layers::layer::Layer;
use crate::layers::{Dropout, ParamKind, Parameterized};
use crate::rng::{rng_from_env, rng_from_seed};
use crate::tensor::Tensor;
use crate::util::logging::log_parameter_count;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A [`Backbone`] paired with an output [`Head`].
///
/// Dropout runs between backbone stages in training passes only.
pub struct SegNet<H: Head> {
    backbone: Backbone,
    head: H,
    dropout: Dropout,
}

impl<H: Head> SegNet<H> {
    /// Build from `cfg`, drawing weights from `cfg.seed` if set, otherwise
    /// from the `SEED` environment variable. `dropout` overrides
    /// `cfg.dropout` for variants that never drop.
    pub fn build(name: &str, cfg: &NetConfig, head: H, dropout: f32) -> Result<Self, NetError> {
        cfg.validate()?;
        let mut rng = match cfg.seed {
            Some(seed) => rng_from_seed(seed),
            None => rng_from_env(),
        };
        let norm = NormSettings {
            eps: cfg.bn_eps,
            momentum: cfg.bn_momentum,
        };
        let mut backbone = Backbone::new(
            cfg.n_channels,
            cfg.n_classes,
            cfg.base_width,
            cfg.bilinear,
            norm,
            &mut rng,
        );
        if cfg.checkpointing {
            backbone.use_checkpointing();
        }
        let dropout = Dropout::with_rng(dropout, StdRng::seed_from_u64(rng.gen()))?;
        let net = Self {
            backbone,
            head,
            dropout,
        };
        info!("{} channel plan: {}", name, net.backbone.plan());
        log_parameter_count(name, net.parameter_count());
        Ok(net)
    }

    pub fn backbone(&self) -> &Backbone {
        &self.backbone
    }

    pub fn backbone_mut(&mut self) -> &mut Backbone {
        &mut self.backbone
    }

    pub fn head(&self) -> &H {
        &self.head
    }

    pub fn dropout(&self) -> f32 {
        self.dropout.p()
    }

    pub fn forward(&self, image: &Tensor, mask: Option<&Tensor>) -> Result<H::Output, NetError> {
        let ctx = self.head.prepare(image, mask, self.backbone.n_classes())?;
        let logits = self.backbone.forward(image)?;
        self.head.finish(logits, ctx)
    }

    pub fn forward_train(&mut self, image: &Tensor, mask: Option<&Tensor>) -> Result<H::Output, NetError> {
        let ctx = self.head.prepare(image, mask, self.backbone.n_classes())?;
        let dropout = &mut self.dropout;
        let logits = if dropout.p() > 0.0 {
            self.backbone.forward_train_with(image, |t| dropout.forward_train(&t))?
        } else {
            self.backbone.forward_train(image)?
        };
        self.head.finish(logits, ctx)
    }
}

impl<H: Head> Parameterized for SegNet<H> {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        self.backbone.named_parameters(prefix, out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        self.backbone.named_parameters_mut(prefix, out);
    }
}

/// Accessors every public variant shares with its inner `net: SegNet<_>`.
macro_rules! delegate_segnet {
    ($ty:ty) => {
        impl $ty {
            pub fn n_channels(&self) -> usize {
                self.net.backbone().n_channels()
            }

            pub fn n_classes(&self) -> usize {
                self.net.backbone().n_classes()
            }

            pub fn bilinear(&self) -> bool {
                self.net.backbone().bilinear()
            }

            pub fn plan(&self) -> &$crate::models::ChannelPlan {
                self.net.backbone().plan()
            }

            /// Retain only stage inputs in training passes; see
            /// [`Backbone::replay`](crate::models::Backbone::replay).
            pub fn use_checkpointing(&mut self) {
                self.net.backbone_mut().use_checkpointing();
            }

            pub fn backbone(&self) -> &$crate::models::Backbone {
                self.net.backbone()
            }

            pub fn backbone_mut(&mut self) -> &mut $crate::models::Backbone {
                self.net.backbone_mut()
            }
        }

        impl $crate::layers::Parameterized for $ty {
            fn named_parameters<'a>(
                &'a self,
                prefix: &str,
                out: &mut Vec<(String, $crate::layers::ParamKind, &'a $crate::tensor::Tensor)>,
            ) {
                $crate::layers::Parameterized::named_parameters(&self.net, prefix, out);
            }

            fn named_parameters_mut<'a>(
                &'a mut self,
                prefix: &str,
                out: &mut Vec<(String, $crate::layers::ParamKind, &'a mut $crate::tensor::Tensor)>,
            ) {
                $crate::layers::Parameterized::named_parameters_mut(&mut self.net, prefix, out);
            }
        }
    };
}

pub(crate) use delegate_segnet;
