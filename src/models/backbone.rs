use super::parts::{DoubleConv, Down, NormSettings, OutConv, Up};
use crate::error::NetError;
use crate::layers::layer::join;
use crate::layers::{ParamKind, Parameterized};
use crate::tensor::Tensor;
use log::debug;
use rand::Rng;
use std::fmt;

/// Channel widths of every stage for a given base width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPlan {
    /// Output channels of `inc`, `down1` .. `down4`.
    pub encoder: [usize; 5],
    /// `(in, out)` channels of `up1` .. `up4`; `in` counts the concatenation.
    pub decoder: [(usize, usize); 4],
    pub n_classes: usize,
    /// 2 in bilinear mode, 1 with transposed convolutions.
    pub factor: usize,
}

impl ChannelPlan {
    pub fn new(base_width: usize, n_classes: usize, bilinear: bool) -> Self {
        let w = base_width;
        let factor = if bilinear { 2 } else { 1 };
        Self {
            encoder: [w, w * 2, w * 4, w * 8, w * 16 / factor],
            decoder: [
                (w * 16, w * 8 / factor),
                (w * 8, w * 4 / factor),
                (w * 4, w * 2 / factor),
                (w * 2, w),
            ],
            n_classes,
            factor,
        }
    }
}

impl fmt::Display for ChannelPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enc: Vec<String> = self.encoder.iter().map(|c| c.to_string()).collect();
        let dec: Vec<String> = self.decoder.iter().map(|(_, o)| o.to_string()).collect();
        write!(
            f,
            "encoder {} | decoder {} | head {}",
            enc.join("->"),
            dec.join("->"),
            self.n_classes
        )
    }
}

/// Identifies one of the ten backbone stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Inc,
    Down(usize),
    Up(usize),
    OutConv,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 10] = [
        Stage::Inc,
        Stage::Down(1),
        Stage::Down(2),
        Stage::Down(3),
        Stage::Down(4),
        Stage::Up(1),
        Stage::Up(2),
        Stage::Up(3),
        Stage::Up(4),
        Stage::OutConv,
    ];

    fn index(self) -> Option<usize> {
        match self {
            Stage::Inc => Some(0),
            Stage::Down(i @ 1..=4) => Some(i),
            Stage::Up(i @ 1..=4) => Some(4 + i),
            Stage::OutConv => Some(9),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        match self {
            Stage::Inc => "inc".to_string(),
            Stage::Down(i) => format!("down{}", i),
            Stage::Up(i) => format!("up{}", i),
            Stage::OutConv => "outc".to_string(),
        }
    }
}

/// Activations one stage kept from the last training pass.
#[derive(Debug, Default)]
struct Retained {
    inputs: Vec<Tensor>,
    trace: Vec<Tensor>,
}

/// The shared U-Net encoder/decoder: stem, four downs, four ups and the
/// 1x1 head convolution. Produces raw per-pixel logits.
pub struct Backbone {
    inc: DoubleConv,
    downs: [Down; 4],
    ups: [Up; 4],
    outc: OutConv,
    plan: ChannelPlan,
    n_channels: usize,
    checkpointing: bool,
    retained: Vec<Retained>,
}

impl Backbone {
    pub fn new(
        n_channels: usize,
        n_classes: usize,
        base_width: usize,
        bilinear: bool,
        norm: NormSettings,
        rng: &mut impl Rng,
    ) -> Self {
        let plan = ChannelPlan::new(base_width, n_classes, bilinear);
        let e = plan.encoder;
        let inc = DoubleConv::new(n_channels, e[0], None, norm, rng);
        let downs = [
            Down::new(e[0], e[1], norm, rng),
            Down::new(e[1], e[2], norm, rng),
            Down::new(e[2], e[3], norm, rng),
            Down::new(e[3], e[4], norm, rng),
        ];
        let d = plan.decoder;
        let ups = [
            Up::new(d[0].0, d[0].1, bilinear, norm, rng),
            Up::new(d[1].0, d[1].1, bilinear, norm, rng),
            Up::new(d[2].0, d[2].1, bilinear, norm, rng),
            Up::new(d[3].0, d[3].1, bilinear, norm, rng),
        ];
        let outc = OutConv::new(d[3].1, n_classes, rng);
        Self {
            inc,
            downs,
            ups,
            outc,
            plan,
            n_channels,
            checkpointing: false,
            retained: (0..Stage::ALL.len()).map(|_| Retained::default()).collect(),
        }
    }

    pub fn plan(&self) -> &ChannelPlan {
        &self.plan
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn n_classes(&self) -> usize {
        self.plan.n_classes
    }

    pub fn bilinear(&self) -> bool {
        self.plan.factor == 2
    }

    /// Retain only stage inputs during training passes and rebuild the rest
    /// on demand with [`Backbone::replay`]. Output values are unaffected.
    pub fn use_checkpointing(&mut self) {
        self.set_checkpointing(true);
    }

    pub fn set_checkpointing(&mut self, on: bool) {
        self.checkpointing = on;
        self.clear_retained();
    }

    pub fn is_checkpointing(&self) -> bool {
        self.checkpointing
    }

    pub fn clear_retained(&mut self) {
        for r in self.retained.iter_mut() {
            r.inputs.clear();
            r.trace.clear();
        }
    }

    /// Inference pass: running batch-norm statistics, `between` applied to
    /// the output of every stage except the head.
    pub fn forward_with(
        &self,
        x: &Tensor,
        mut between: impl FnMut(Tensor) -> Result<Tensor, NetError>,
    ) -> Result<Tensor, NetError> {
        self.check_input(x)?;
        let x1 = between(self.inc.forward(x)?)?;
        let mut skips = vec![x1];
        for down in &self.downs {
            let next = between(down.forward(skips.last().unwrap_or(x))?)?;
            skips.push(next);
        }
        let mut h = skips.pop().ok_or_else(|| NetError::shape("backbone", "encoder output", &[]))?;
        for up in &self.ups {
            let skip = skips
                .pop()
                .ok_or_else(|| NetError::shape("backbone", "a skip tensor per decoder stage", &[]))?;
            h = between(up.forward(&h, &skip)?)?;
        }
        let logits = self.outc.forward(&h)?;
        debug!("backbone logits {:?}", logits.shape);
        Ok(logits)
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, NetError> {
        self.forward_with(x, Ok)
    }

    /// Training pass: batch statistics, running-estimate updates and
    /// activation retention per stage.
    pub fn forward_train_with(
        &mut self,
        x: &Tensor,
        mut between: impl FnMut(Tensor) -> Result<Tensor, NetError>,
    ) -> Result<Tensor, NetError> {
        self.check_input(x)?;
        self.clear_retained();
        let mut retained = std::mem::take(&mut self.retained);
        let result = self.run_train(x, &mut retained, &mut between);
        self.retained = retained;
        result
    }

    fn run_train(
        &mut self,
        x: &Tensor,
        retained: &mut [Retained],
        between: &mut impl FnMut(Tensor) -> Result<Tensor, NetError>,
    ) -> Result<Tensor, NetError> {
        let ckpt = self.checkpointing;
        let mut skips: Vec<Tensor> = Vec::with_capacity(5);

        let r = &mut retained[0];
        r.inputs.push(x.clone());
        let x1 = self.inc.forward_train(x, (!ckpt).then_some(&mut r.trace))?;
        debug!("inc {:?}", x1.shape);
        skips.push(between(x1)?);

        for (i, down) in self.downs.iter_mut().enumerate() {
            let input = &skips[i];
            let r = &mut retained[1 + i];
            r.inputs.push(input.clone());
            let out = down.forward_train(input, (!ckpt).then_some(&mut r.trace))?;
            debug!("down{} {:?}", i + 1, out.shape);
            skips.push(between(out)?);
        }

        let mut h = skips
            .pop()
            .ok_or_else(|| NetError::shape("backbone", "encoder output", &[]))?;
        for (i, up) in self.ups.iter_mut().enumerate() {
            let skip = skips
                .pop()
                .ok_or_else(|| NetError::shape("backbone", "a skip tensor per decoder stage", &[]))?;
            let r = &mut retained[5 + i];
            r.inputs.push(h.clone());
            r.inputs.push(skip.clone());
            let out = up.forward_train(&h, &skip, (!ckpt).then_some(&mut r.trace))?;
            debug!("up{} {:?}", i + 1, out.shape);
            h = between(out)?;
        }

        let r = &mut retained[9];
        r.inputs.push(h.clone());
        let logits = self.outc.forward(&h)?;
        if !ckpt {
            r.trace.push(logits.clone());
        }
        Ok(logits)
    }

    pub fn forward_train(&mut self, x: &Tensor) -> Result<Tensor, NetError> {
        self.forward_train_with(x, Ok)
    }

    fn retained_for(&self, stage: Stage) -> Result<&Retained, NetError> {
        let idx = stage
            .index()
            .ok_or_else(|| NetError::InvalidConfig(format!("no such stage {:?}", stage)))?;
        Ok(&self.retained[idx])
    }

    /// Tensors retained for `stage` by the last training pass: its inputs,
    /// plus every intermediate activation unless checkpointing is on.
    pub fn saved_tensors(&self, stage: Stage) -> Result<Vec<&Tensor>, NetError> {
        let r = self.retained_for(stage)?;
        Ok(r.inputs.iter().chain(r.trace.iter()).collect())
    }

    /// Bytes held across all stages by the last training pass.
    pub fn saved_bytes(&self) -> usize {
        self.retained
            .iter()
            .flat_map(|r| r.inputs.iter().chain(r.trace.iter()))
            .map(|t| t.numel() * std::mem::size_of::<f32>())
            .sum()
    }

    /// Output of `stage` in the last training pass, before any `between`
    /// hook. Checkpointed stages recompute it from their retained inputs
    /// using that pass's batch statistics.
    pub fn replay(&self, stage: Stage) -> Result<Tensor, NetError> {
        let r = self.retained_for(stage)?;
        if r.inputs.is_empty() {
            return Err(NetError::InvalidConfig(format!(
                "{}: nothing retained, run forward_train first",
                stage.name()
            )));
        }
        if let Some(out) = r.trace.last() {
            return Ok(out.clone());
        }
        match stage {
            Stage::Inc => self.inc.replay(&r.inputs[0]),
            Stage::Down(i) => self.downs[i - 1].replay(&r.inputs[0]),
            Stage::Up(i) => self.ups[i - 1].replay(&r.inputs[0], &r.inputs[1]),
            Stage::OutConv => self.outc.forward(&r.inputs[0]),
        }
    }

    fn check_input(&self, x: &Tensor) -> Result<(), NetError> {
        let (_, c, h, w) = x.dims4("backbone")?;
        if c != self.n_channels {
            return Err(NetError::ChannelMismatch {
                op: "backbone",
                expected: self.n_channels,
                got: c,
            });
        }
        // four 2x2 pools need at least 16 pixels per axis
        if h < 16 || w < 16 {
            return Err(NetError::shape(
                "backbone",
                "spatial size of at least 16x16 for four downsampling stages",
                &x.shape,
            ));
        }
        Ok(())
    }
}

impl Parameterized for Backbone {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ParamKind, &'a Tensor)>) {
        self.inc.named_parameters(&join(prefix, "inc"), out);
        for (i, down) in self.downs.iter().enumerate() {
            down.named_parameters(&join(prefix, &format!("down{}", i + 1)), out);
        }
        for (i, up) in self.ups.iter().enumerate() {
            up.named_parameters(&join(prefix, &format!("up{}", i + 1)), out);
        }
        self.outc.named_parameters(&join(prefix, "outc"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ParamKind, &'a mut Tensor)>,
    ) {
        self.inc.named_parameters_mut(&join(prefix, "inc"), out);
        for (i, down) in self.downs.iter_mut().enumerate() {
            down.named_parameters_mut(&join(prefix, &format!("down{}", i + 1)), out);
        }
        for (i, up) in self.ups.iter_mut().enumerate() {
            up.named_parameters_mut(&join(prefix, &format!("up{}", i + 1)), out);
        }
        self.outc.named_parameters_mut(&join(prefix, "outc"), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_matches_reference_widths() {
        let plan = ChannelPlan::new(64, 2, false);
        assert_eq!(plan.encoder, [64, 128, 256, 512, 1024]);
        assert_eq!(plan.decoder, [(1024, 512), (512, 256), (256, 128), (128, 64)]);
    }

    #[test]
    fn bilinear_plan_halves_deep_widths() {
        let plan = ChannelPlan::new(64, 2, true);
        assert_eq!(plan.encoder, [64, 128, 256, 512, 512]);
        assert_eq!(plan.decoder, [(1024, 256), (512, 128), (256, 64), (128, 64)]);
        assert_eq!(
            plan.to_string(),
            "encoder 64->128->256->512->512 | decoder 256->128->64->64 | head 2"
        );
    }
}
