//! Factorised bigram language model.
//!
//! `logits(x) = E[x] · W + b` with `E: V×d`, `W: d×V`, `b: 1×V`, trained with
//! mean cross-entropy over every adjacent token pair of a batch.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Evaluation, LanguageModel, LossAndGrads, Parameter};
use crate::data::Batch;
use crate::dist::BoundDevice;
use crate::error::{Error, Result};
use crate::precision::Precision;

const EMBEDDING: usize = 0;
const OUTPUT_WEIGHT: usize = 1;
const OUTPUT_BIAS: usize = 2;

/// Architecture of a [`BigramLm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigramConfig {
    /// Token vocabulary size
    pub vocab_size: usize,
    /// Width of the hidden representation
    #[serde(default = "default_hidden")]
    pub hidden_size: usize,
    /// Scale of the uniform initialisation
    #[serde(default = "default_init_scale")]
    pub init_scale: f32,
}

fn default_hidden() -> usize {
    32
}

fn default_init_scale() -> f32 {
    0.1
}

impl BigramConfig {
    pub fn new(vocab_size: usize, hidden_size: usize) -> Self {
        Self { vocab_size, hidden_size, init_scale: default_init_scale() }
    }
}

/// Reference model used by the training loop.
#[derive(Debug, Clone)]
pub struct BigramLm {
    config: BigramConfig,
    params: Vec<Parameter>,
    device: BoundDevice,
}

impl BigramLm {
    /// Allocate a randomly initialised model on `device`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an empty vocabulary or hidden layer.
    pub fn new(config: BigramConfig, device: &BoundDevice, seed: u64) -> Result<Self> {
        if config.vocab_size == 0 || config.hidden_size == 0 {
            return Err(Error::Configuration(format!(
                "bigram model needs positive sizes, got vocab {} hidden {}",
                config.vocab_size, config.hidden_size
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = config.init_scale;
        let (v, d) = (config.vocab_size, config.hidden_size);
        let mut uniform = |rows, cols| {
            Array2::from_shape_fn((rows, cols), |_| {
                if scale > 0.0 {
                    rng.gen_range(-scale..scale)
                } else {
                    0.0
                }
            })
        };
        let params = vec![
            Parameter::prunable("embedding.weight", uniform(v, d)),
            Parameter::prunable("output.weight", uniform(d, v)),
            Parameter::dense("output.bias", Array2::zeros((1, v))),
        ];
        debug!(vocab = v, hidden = d, device = %device.device(), "initialised bigram model");
        Ok(Self { config, params, device: *device })
    }

    pub fn config(&self) -> &BigramConfig {
        &self.config
    }

    pub fn device(&self) -> &BoundDevice {
        &self.device
    }

    fn check(&self, weights: &[Array2<f32>], batch: &Batch) -> Result<()> {
        if weights.len() != self.params.len()
            || weights.iter().zip(&self.params).any(|(w, p)| w.dim() != p.value.dim())
        {
            return Err(Error::Configuration(
                "weights do not match the bigram model's parameters".to_string(),
            ));
        }
        let v = self.config.vocab_size;
        if let Some(&bad) = batch.sequences.iter().flatten().find(|&&t| t as usize >= v) {
            return Err(Error::Data(format!("token id {bad} outside vocabulary of {v}")));
        }
        Ok(())
    }

    /// Weights as the forward pass sees them: `E`, `W` and `b` rounded to
    /// `precision`.
    fn rounded(
        weights: &[Array2<f32>],
        precision: Precision,
    ) -> (Array2<f32>, Array2<f32>, Array1<f32>) {
        let round = |x: f32| precision.round(x);
        (
            weights[EMBEDDING].mapv(round),
            weights[OUTPUT_WEIGHT].mapv(round),
            weights[OUTPUT_BIAS].row(0).mapv(round),
        )
    }

    /// Softmax probabilities of the next token given `h`.
    fn probabilities(
        h: ArrayView1<'_, f32>,
        w: &Array2<f32>,
        b: ArrayView1<'_, f32>,
        precision: Precision,
    ) -> Array1<f32> {
        let mut z = h.dot(w) + &b;
        z.mapv_inplace(|x| precision.round(x));
        let max = z.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        z.mapv_inplace(|x| (x - max).exp());
        let sum = z.sum();
        z / sum
    }
}

impl LanguageModel for BigramLm {
    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn loss_and_grads(
        &self,
        weights: &[Array2<f32>],
        batch: &Batch,
        precision: Precision,
        loss_scale: f32,
    ) -> Result<LossAndGrads> {
        self.check(weights, batch)?;
        let (e, w, b) = Self::rounded(weights, precision);

        let mut de = Array2::<f32>::zeros(e.dim());
        let mut dw = Array2::<f32>::zeros(w.dim());
        let mut db = Array1::<f32>::zeros(self.config.vocab_size);
        let mut total = 0.0f32;
        let mut targets = 0usize;
        let mut correct = 0usize;

        for (x, y) in batch.pairs() {
            let (x, y) = (x as usize, y as usize);
            let h = e.row(x);
            let mut dz = Self::probabilities(h, &w, b.view(), precision);
            total -= dz[y].max(f32::MIN_POSITIVE).ln();
            correct += usize::from(argmax(&dz) == y);
            dz[y] -= 1.0;

            // dW += hᵀ dz, dE[x] += W dz
            dw += &h.insert_axis(Axis(1)).dot(&dz.view().insert_axis(Axis(0)));
            let dh = w.dot(&dz);
            de.row_mut(x).scaled_add(1.0, &dh);
            db += &dz;
            targets += 1;
        }

        let (loss, factor) = if targets == 0 {
            (0.0, 0.0)
        } else {
            (total / targets as f32, loss_scale / targets as f32)
        };
        let finish = |g: Array2<f32>| g.mapv(|x| precision.round(x * factor));
        let grads = vec![finish(de), finish(dw), finish(db.insert_axis(Axis(0)))];
        Ok(LossAndGrads { loss, targets, correct, grads })
    }

    fn evaluate(
        &self,
        weights: &[Array2<f32>],
        batch: &Batch,
        precision: Precision,
    ) -> Result<Evaluation> {
        self.check(weights, batch)?;
        let (e, w, b) = Self::rounded(weights, precision);

        let mut total = 0.0f32;
        let mut eval = Evaluation::default();
        for (x, y) in batch.pairs() {
            let p = Self::probabilities(e.row(x as usize), &w, b.view(), precision);
            total -= p[y as usize].max(f32::MIN_POSITIVE).ln();
            eval.correct += usize::from(argmax(&p) == y as usize);
            eval.targets += 1;
        }
        if eval.targets > 0 {
            eval.loss = total / eval.targets as f32;
        }
        Ok(eval)
    }
}

/// Index of the largest value; the first one on ties.
fn argmax(values: &Array1<f32>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| if v > max { (i, v) } else { (best, max) })
        .0
}
