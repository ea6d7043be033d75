//! Output heads that turn backbone logits into a variant's result.

use crate::error::NetError;
use crate::layers::softmax::softmax_channels;
use crate::layers::{sigmoid, TransSigmoid};
use crate::tensor::Tensor;

/// Strategy applied around the shared backbone.
///
/// `prepare` sees the raw inputs before the backbone runs and may reject
/// them early; whatever it returns is handed to `finish` together with the
/// logits.
pub trait Head {
    type Context;
    type Output;

    fn prepare(
        &self,
        image: &Tensor,
        mask: Option<&Tensor>,
        n_classes: usize,
    ) -> Result<Self::Context, NetError>;

    fn finish(&self, logits: Tensor, ctx: Self::Context) -> Result<Self::Output, NetError>;
}

/// Returns the logits unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainLogitsHead;

impl Head for PlainLogitsHead {
    type Context = ();
    type Output = Tensor;

    fn prepare(&self, _: &Tensor, _: Option<&Tensor>, _: usize) -> Result<(), NetError> {
        Ok(())
    }

    fn finish(&self, logits: Tensor, _: ()) -> Result<Tensor, NetError> {
        Ok(logits)
    }
}

/// Result of the tissue-normalised pooling head.
#[derive(Clone, Debug, PartialEq)]
pub struct PooledScore {
    /// Transitional sigmoid of `pool_frac`, `(B, K)`, in `[0, 1]`.
    pub score: Tensor,
    /// Per-class sum of `sig` divided by the tissue pixel count, `(B, K)`.
    pub pool_frac: Tensor,
    /// Per-pixel sigmoid activations, `(B, K, H, W)`.
    pub sig: Tensor,
}

/// Sigmoid, spatial sum normalised by tissue area, transitional sigmoid.
#[derive(Clone, Copy, Debug)]
pub struct PooledScoreHead {
    trans: TransSigmoid,
}

impl PooledScoreHead {
    pub fn new(alpha: f32, beta: f32) -> Result<Self, NetError> {
        Ok(Self {
            trans: TransSigmoid::new(alpha, beta)?,
        })
    }

    pub fn trans_sigmoid(&self) -> &TransSigmoid {
        &self.trans
    }
}

impl Head for PooledScoreHead {
    /// Tissue pixel counts, `(B, K)`.
    type Context = Tensor;
    type Output = PooledScore;

    fn prepare(
        &self,
        image: &Tensor,
        mask: Option<&Tensor>,
        n_classes: usize,
    ) -> Result<Tensor, NetError> {
        tissue_pixels(image, mask, n_classes)
    }

    fn finish(&self, logits: Tensor, tissue: Tensor) -> Result<PooledScore, NetError> {
        let sig = sigmoid::forward(&logits);
        let pooled = sig.sum_spatial()?;
        if pooled.shape != tissue.shape {
            return Err(NetError::shape(
                "pooled_score",
                format!("tissue counts shaped {:?}", pooled.shape),
                &tissue.shape,
            ));
        }
        let classes = pooled.shape[1];
        let mut frac = Vec::with_capacity(pooled.numel());
        for (i, (&p, &t)) in pooled.data.iter().zip(&tissue.data).enumerate() {
            if t == 0.0 {
                return Err(NetError::DivisionByZero {
                    sample: i / classes,
                    class: i % classes,
                });
            }
            frac.push(p / t);
        }
        let pool_frac = Tensor::new(frac, pooled.shape.clone());
        let score = self.trans.forward(&pool_frac);
        Ok(PooledScore {
            score,
            pool_frac,
            sig,
        })
    }
}

/// Tissue pixel count per sample and class, `(B, n_classes)`.
///
/// A `(B, 1, h, w)` mask yields one count per sample shared by every class;
/// a `(B, n_classes, h, w)` mask yields one per class. Pixels are counted over
/// the mask's own `h, w`, which need not match the image. Without a mask the
/// nonzero pixels of the image are counted across all channels and divided
/// by the channel count.
pub fn tissue_pixels(image: &Tensor, mask: Option<&Tensor>, n_classes: usize) -> Result<Tensor, NetError> {
    let (batch, channels, _, _) = image.dims4("tissue_pixels")?;
    let per_sample: Vec<Vec<f32>> = match mask {
        Some(mask) => {
            let (mb, mc, _, _) = mask.dims4("tissue_mask")?;
            if mb != batch || (mc != 1 && mc != n_classes) {
                return Err(NetError::shape(
                    "tissue_mask",
                    format!("({}, 1 or {}, h, w)", batch, n_classes),
                    &mask.shape,
                ));
            }
            let counts = mask.count_nonzero_spatial()?;
            (0..batch)
                .map(|b| {
                    (0..n_classes)
                        .map(|k| counts.data[b * mc + if mc == 1 { 0 } else { k }])
                        .collect()
                })
                .collect()
        }
        None => {
            let counts = image.count_nonzero_spatial()?;
            (0..batch)
                .map(|b| {
                    let total: f32 = counts.data[b * channels..(b + 1) * channels].iter().sum();
                    vec![total / channels as f32; n_classes]
                })
                .collect()
        }
    };
    Ok(Tensor::new(
        per_sample.into_iter().flatten().collect(),
        vec![batch, n_classes],
    ))
}

/// Per-pixel grade activations: sigmoid, then an optional softmax over
/// the class channels.
#[derive(Clone, Copy, Debug)]
pub struct ClassificationHead {
    softmax: bool,
}

impl ClassificationHead {
    pub fn new(softmax: bool) -> Self {
        Self { softmax }
    }

    pub fn softmax(&self) -> bool {
        self.softmax
    }
}

impl Head for ClassificationHead {
    type Context = ();
    type Output = Tensor;

    fn prepare(&self, _: &Tensor, _: Option<&Tensor>, _: usize) -> Result<(), NetError> {
        Ok(())
    }

    fn finish(&self, logits: Tensor, _: ()) -> Result<Tensor, NetError> {
        let mut out = logits;
        sigmoid::forward_tensor(&mut out);
        if self.softmax {
            out = softmax_channels(&out)?;
        }
        Ok(out)
    }
}
