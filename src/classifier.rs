use log::debug;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::*;

/// A fitted model assigning a label to a histogram.
pub trait Classifier {
    fn predict(&self, bow: &BoW) -> BowResult<&str>;
}

/// Fits a [`Classifier`] on labeled histograms.
pub trait Trainer {
    type Model: Classifier;

    fn train(&self, examples: &[LabeledExample<BoW>]) -> BowResult<Self::Model>;
}

/// Fraction of `examples` whose prediction matches their own label.
///
/// Always within `[0, 1]`. An empty test set is an `EmptySplit` error.
pub fn evaluate<C: Classifier + ?Sized>(
    model: &C,
    examples: &[LabeledExample<BoW>],
) -> BowResult<f64> {
    if examples.is_empty() {
        return Err(BowErr::EmptySplit("no test examples".into()));
    }
    let mut correct = 0;
    for e in examples {
        if model.predict(&e.features)? == e.label {
            correct += 1;
        }
    }
    let accuracy = correct as f64 / examples.len() as f64;
    debug!("{} / {} correct", correct, examples.len());
    Ok(accuracy)
}

/// Histogram length shared by all examples, and the sorted label set.
fn check_training(examples: &[LabeledExample<BoW>]) -> BowResult<(usize, Vec<String>)> {
    let first = examples
        .first()
        .ok_or_else(|| BowErr::EmptySplit("no training examples".into()))?;
    let dim = first.features.len();
    if dim == 0 {
        return Err(BowErr::Classifier("histograms have no bins".into()));
    }
    if let Some(e) = examples.iter().find(|e| e.features.len() != dim) {
        return Err(BowErr::Classifier(format!(
            "shape mismatch: expected {} bins, found {}",
            dim,
            e.features.len()
        )));
    }
    let labels: BTreeSet<&str> = examples.iter().map(|e| e.label.as_str()).collect();
    if labels.len() < 2 {
        return Err(BowErr::Classifier(format!(
            "need at least two labels, found {}",
            labels.len()
        )));
    }
    Ok((dim, labels.into_iter().map(String::from).collect()))
}

fn check_shape(bow: &BoW, dim: usize) -> BowResult<()> {
    if bow.len() != dim {
        return Err(BowErr::Classifier(format!(
            "shape mismatch: expected {} bins, found {}",
            dim,
            bow.len()
        )));
    }
    Ok(())
}

/////////////////////               Linear SVM               ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SvmParams {
    /// Regularization strength.
    pub lambda: f32,
    /// Passes over the training set.
    pub epochs: usize,
    /// Seed for the order examples are visited in.
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            lambda: 1e-3,
            epochs: 100,
            seed: 0,
        }
    }
}

/// One-vs-rest linear SVM fitted with Pegasos (stochastic sub-gradient
/// descent on the hinge loss) over L1-normalized histograms.
#[derive(Debug, Clone, Default)]
pub struct LinearSvm {
    pub params: SvmParams,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinearSvmModel {
    labels: Vec<String>,
    /// One row per label: `dim` weights followed by the bias.
    weights: Vec<Vec<f32>>,
}

impl LinearSvm {
    pub fn new(params: SvmParams) -> Self {
        Self { params }
    }

    /// Normalized histogram with a trailing 1 for the bias.
    fn input(bow: &BoW) -> Vec<f32> {
        let mut x = bow.l1_normalized();
        x.push(1.);
        x
    }

    fn dot(w: &[f32], x: &[f32]) -> f32 {
        w.iter().zip(x).map(|(a, b)| a * b).sum()
    }
}

impl Trainer for LinearSvm {
    type Model = LinearSvmModel;

    fn train(&self, examples: &[LabeledExample<BoW>]) -> BowResult<LinearSvmModel> {
        let (dim, labels) = check_training(examples)?;
        if !(self.params.lambda > 0.) {
            return Err(BowErr::InvalidConfig("svm lambda must be positive".into()));
        }
        let inputs: Vec<Vec<f32>> = examples.iter().map(|e| Self::input(&e.features)).collect();
        let mut order: Vec<usize> = (0..examples.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let lambda = self.params.lambda;

        let mut weights = Vec::with_capacity(labels.len());
        for label in &labels {
            let mut w = vec![0f32; dim + 1];
            let mut t = 0usize;
            for _ in 0..self.params.epochs {
                order.shuffle(&mut rng);
                for &i in &order {
                    t += 1;
                    let eta = 1. / (lambda * t as f32);
                    let y = if examples[i].label == *label { 1. } else { -1. };
                    let margin = y * Self::dot(&w, &inputs[i]);
                    let decay = 1. - eta * lambda;
                    w.iter_mut().for_each(|v| *v *= decay);
                    if margin < 1. {
                        for (v, x) in w.iter_mut().zip(&inputs[i]) {
                            *v += eta * y * x;
                        }
                    }
                }
            }
            weights.push(w);
        }
        debug!(
            "Trained linear svm: {} labels, {} examples",
            labels.len(),
            examples.len()
        );
        Ok(LinearSvmModel { labels, weights })
    }
}

impl Classifier for LinearSvmModel {
    fn predict(&self, bow: &BoW) -> BowResult<&str> {
        let dim = self.weights.first().map(|w| w.len() - 1).unwrap_or(0);
        check_shape(bow, dim)?;
        let x = LinearSvm::input(bow);
        let mut best: (usize, f32) = (0, f32::NEG_INFINITY);
        for (j, w) in self.weights.iter().enumerate() {
            let s = LinearSvm::dot(w, &x);
            if s > best.1 {
                best = (j, s);
            }
        }
        self.labels
            .get(best.0)
            .map(String::as_str)
            .ok_or_else(|| BowErr::Classifier("model has no labels".into()))
    }
}

/////////////////////            Nearest Neighbor            ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

/// Labels a histogram with the training example of highest l1 score.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbor;

#[derive(Debug, Clone)]
pub struct NearestNeighborModel {
    examples: Vec<LabeledExample<BoW>>,
    dim: usize,
}

impl Trainer for NearestNeighbor {
    type Model = NearestNeighborModel;

    fn train(&self, examples: &[LabeledExample<BoW>]) -> BowResult<NearestNeighborModel> {
        let (dim, _) = check_training(examples)?;
        Ok(NearestNeighborModel {
            examples: examples.to_vec(),
            dim,
        })
    }
}

impl Classifier for NearestNeighborModel {
    fn predict(&self, bow: &BoW) -> BowResult<&str> {
        check_shape(bow, self.dim)?;
        let mut best: (Option<&str>, f32) = (None, f32::NEG_INFINITY);
        for e in &self.examples {
            let score = bow.l1(&e.features);
            if score > best.1 {
                best = (Some(e.label.as_str()), score);
            }
        }
        best.0.ok_or_else(|| BowErr::Classifier("model has no examples".into()))
    }
}
