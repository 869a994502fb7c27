use thiserror::Error;

/// Descriptor sets, and the contract for extracting them from images.
pub mod descriptors;
pub use descriptors::{DescriptorSet, Extractor};

/// Labeled examples, datasets and train/test splits.
pub mod dataset;
pub use dataset::{Dataset, ImageSource, LabeledExample, Split};

/// Visual vocabulary built with k-means, which provides the main
/// functionality of this crate: turning descriptor sets into histograms.
pub mod vocab;
pub use vocab::{KMeansInit, KMeansParams, Vocabulary};

/// Supervised models operating on histograms.
pub mod classifier;
pub use classifier::{
    evaluate, Classifier, LinearSvm, LinearSvmModel, NearestNeighbor, NearestNeighborModel,
    SvmParams, Trainer,
};

/// 2D projections of histograms for visual inspection.
pub mod projection;
pub use projection::{pca_2d, JsonProjection, NoVisualizer, ProjectedPoint, Visualizer};

pub mod config;
pub use config::Config;

/// Repeated train/test runs over a dataset.
pub mod pipeline;
pub use pipeline::{Pipeline, RunResult, Stage};

/// Utilities for extracting SIFT descriptors and walking image directories using opencv.
#[cfg(feature = "opencv")]
pub mod opencv_utils;
#[cfg(feature = "opencv")]
pub use opencv_utils::*;

/// Dimension of a descriptor.
pub const DESC_DIM: usize = 128;

/// Supported descriptor type is a 128-float array.
///
/// This is the layout produced by SIFT. Descriptors are never modified
/// once extracted.
pub type Desc = [f32; DESC_DIM];

/// Bag-of-Words representation of an image or descriptor set.
///
/// Index: word id in the vocabulary.
///
/// Value: number of descriptors assigned to that word.
pub type BoW = Vec<u32>;

/// Word id assigned to each input descriptor, in input order.
pub type DirectIdx = Vec<usize>;

/// Provides method(s) for normalizing and scoring bow vectors.
pub trait BoWTrait {
    /// Word frequencies. An all-zero bow stays all zero.
    fn l1_normalized(&self) -> Vec<f32>;
    /// Similarity score between normalized bows (Galvez, Eq 2). 1 means identical.
    fn l1(&self, other: &Self) -> f32;
}

impl BoWTrait for BoW {
    fn l1_normalized(&self) -> Vec<f32> {
        let sum: u32 = self.iter().sum();
        if sum == 0 {
            return vec![0.; self.len()];
        }
        let inv_sum = 1. / sum as f32;
        self.iter().map(|&c| c as f32 * inv_sum).collect()
    }

    fn l1(&self, other: &Self) -> f32 {
        1. - 0.5
            * (self
                .l1_normalized()
                .iter()
                .zip(other.l1_normalized())
                .fold(0., |a, (b, c)| a + (b - c).abs()))
    }
}

pub type BowResult<T> = std::result::Result<T, BowErr>;

#[derive(Error, Debug)]
pub enum BowErr {
    #[error("Expected {expected} descriptors, found {found}")]
    InsufficientDescriptors { expected: usize, found: usize },
    #[error("Cannot build {needed} words from {available} descriptors")]
    InsufficientData { needed: usize, available: usize },
    #[error("Empty split: {0}")]
    EmptySplit(String),
    #[error("Classifier Error: {0}")]
    Classifier(String),
    #[error("Corrupt vocabulary: {0}")]
    CorruptVocabulary(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Iteration {iteration} failed")]
    Iteration {
        iteration: usize,
        #[source]
        source: Box<BowErr>,
    },
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[error("Json Error")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "bincode")]
    #[error("Vocabulary Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[cfg(feature = "opencv")]
    #[error("Opencv Error")]
    OpenCvInternal(#[from] opencv::Error),
    #[cfg(feature = "opencv")]
    #[error("Opencv Descriptor decode error")]
    OpenCvDecode,
}
