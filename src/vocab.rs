#[cfg(feature = "bincode")]
use bincode;
use log::{debug, info};
use rand::{
    distributions::{Distribution, WeightedIndex},
    seq::index,
    Rng,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::*;

/// How k-means picks its starting centroids.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KMeansInit {
    /// Distinct training descriptors drawn uniformly.
    Random,
    /// k-means++: each new seed drawn with probability proportional to its
    /// squared distance from the seeds chosen so far.
    PlusPlus,
}

/// Stopping rule and seeding for vocabulary clustering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KMeansParams {
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this (euclidean).
    pub tolerance: f32,
    pub init: KMeansInit,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            tolerance: 1e-4,
            init: KMeansInit::PlusPlus,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
/// Visual vocabulary built from a pool of training descriptors. Can be:
/// 1. Created.
/// 2. Saved to a file & loaded from a file (requires bincode feature, enabled by default).
/// 3. Used to transform a new set of descriptors into a BoW histogram (and
///    optionally get the word assigned to every descriptor).
///
/// Word `i` is the `i`-th centroid; the order never changes after creation.
pub struct Vocabulary {
    /// Centroids, row-major, `DESC_DIM` floats each.
    words: Vec<f32>,
    cluster_size: Vec<usize>,
    inertia: f64,
    iterations: usize,
}

/// Vocabulary API
impl Vocabulary {
    /// Transform a set of descriptors into its bag of words histogram with
    /// respect to the Vocabulary. Bin `i` counts the descriptors whose nearest
    /// word is `i`, so the bins sum to `features.len()`.
    pub fn transform(&self, features: &[Desc]) -> BoW {
        self.transform_generic(features, false).0
    }

    /// Transform a set of descriptors into its bag of words histogram.
    ///
    /// Also provides "direct index": `DirectIdx[i]` is the word id matching `features[i]`.
    pub fn transform_with_direct_idx(&self, features: &[Desc]) -> (BoW, DirectIdx) {
        self.transform_generic(features, true)
    }

    /// Encode every example of a split with this vocabulary, keeping labels.
    pub fn encode(&self, examples: &[LabeledExample<DescriptorSet>]) -> Vec<LabeledExample<BoW>> {
        examples
            .iter()
            .map(|e| LabeledExample::new(e.label.as_str(), self.transform(e.features.as_slice())))
            .collect()
    }

    /// Build a vocabulary of `num_words` words by k-means clustering of `features`.
    ///
    /// Fails with `InsufficientData` when there are fewer descriptors than words.
    /// Results depend on `rng`: two runs may order or place the words differently.
    pub fn create<R: Rng + ?Sized>(
        features: &[Desc],
        num_words: usize,
        params: &KMeansParams,
        rng: &mut R,
    ) -> BowResult<Self> {
        if num_words == 0 {
            return Err(BowErr::InvalidConfig("vocabulary needs at least one word".into()));
        }
        if features.len() < num_words {
            return Err(BowErr::InsufficientData {
                needed: num_words,
                available: features.len(),
            });
        }
        info!(
            "KMeans with {} features into {} words",
            features.len(),
            num_words
        );

        let (clusters, iterations) = Self::cluster(features, num_words, params, rng);

        // Final assignment against the returned centroids
        let mut cluster_size = vec![0; num_words];
        let mut inertia = 0.;
        for f in features {
            let (w, d) = Self::nearest(&clusters, f);
            cluster_size[w] += 1;
            inertia += d as f64;
        }

        let v = Self {
            words: clusters.iter().flat_map(|c| c.iter().copied()).collect(),
            cluster_size,
            inertia,
            iterations,
        };
        debug!("Vocabulary = {:?}", v);
        Ok(v)
    }

    /// Number of words (histogram length).
    pub fn len(&self) -> usize {
        self.cluster_size.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cluster_size.is_empty()
    }

    /// Centroid of word `id`.
    pub fn word(&self, id: usize) -> Option<&[f32]> {
        self.words.chunks_exact(DESC_DIM).nth(id)
    }

    /// Training descriptors nearest to each word.
    pub fn cluster_sizes(&self) -> &[usize] {
        &self.cluster_size
    }

    /// Sum of squared distances from training descriptors to their word.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Lloyd iterations run before stopping.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Load a vocabulary from a file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        let v: Self = bincode::deserialize(&buffer)?;
        v.check_shape()?;
        Ok(v)
    }

    /// Save vocabulary to a file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

impl Vocabulary {
    /// Every word has a centroid of `DESC_DIM` floats, and there is at least one word.
    #[cfg(feature = "bincode")]
    fn check_shape(&self) -> BowResult<()> {
        if self.cluster_size.is_empty() {
            return Err(BowErr::CorruptVocabulary("no words".into()));
        }
        if self.words.len() != self.cluster_size.len() * DESC_DIM {
            return Err(BowErr::CorruptVocabulary(format!(
                "{} words but {} centroid floats",
                self.cluster_size.len(),
                self.words.len()
            )));
        }
        Ok(())
    }

    fn transform_generic(&self, features: &[Desc], di: bool) -> (BoW, DirectIdx) {
        let mut bow: BoW = vec![0; self.len()];
        let mut direct_idx: DirectIdx = Vec::with_capacity(if di { features.len() } else { 0 });
        for feature in features {
            let mut best: (usize, f32) = (0, f32::INFINITY);
            for (w, word) in self.words.chunks_exact(DESC_DIM).enumerate() {
                let d = Self::l2_sq(feature, word);
                if d < best.1 {
                    best = (w, d);
                }
            }
            bow[best.0] += 1;
            if di {
                direct_idx.push(best.0);
            }
        }
        (bow, direct_idx)
    }

    /// Lloyd's k-means. Returns the centroids and the number of iterations run.
    fn cluster<R: Rng + ?Sized>(
        features: &[Desc],
        k: usize,
        params: &KMeansParams,
        rng: &mut R,
    ) -> (Vec<Desc>, usize) {
        let mut clusters = match params.init {
            KMeansInit::Random => Self::initialize_clusters(features, k, rng),
            KMeansInit::PlusPlus => Self::initialize_clusters_pp(features, k, rng),
        };
        let mut groups: Vec<usize> = vec![usize::MAX; features.len()];
        let mut dists: Vec<f32> = vec![0.; features.len()];

        let mut iteration = 0;
        while iteration < params.max_iterations {
            iteration += 1;

            let mut changed = false;
            for (i, f) in features.iter().enumerate() {
                let (w, d) = Self::nearest(&clusters, f);
                if groups[i] != w {
                    groups[i] = w;
                    changed = true;
                }
                dists[i] = d;
            }
            if !changed {
                break; // converged
            }

            // update clusters
            let mut sums = vec![[0f32; DESC_DIM]; k];
            let mut counts = vec![0usize; k];
            for (f, &g) in features.iter().zip(&groups) {
                counts[g] += 1;
                for (s, v) in sums[g].iter_mut().zip(f.iter()) {
                    *s += v;
                }
            }
            let mut new_clusters = Vec::with_capacity(k);
            for (sum, &count) in sums.iter().zip(&counts) {
                let mut c = *sum;
                if count > 0 {
                    let inv = 1. / count as f32;
                    c.iter_mut().for_each(|v| *v *= inv);
                }
                new_clusters.push(c);
            }

            // An empty cluster takes over the descriptor farthest from its own word
            for (j, _) in counts.iter().enumerate().filter(|(_, c)| **c == 0) {
                let far = dists
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                new_clusters[j] = features[far];
                dists[far] = 0.;
            }

            let shift = clusters
                .iter()
                .zip(&new_clusters)
                .map(|(a, b)| Self::l2_sq(a, b))
                .fold(0f32, f32::max)
                .sqrt();
            clusters = new_clusters;
            if shift <= params.tolerance {
                break;
            }
        }
        debug!("KMeans stopped after {} iterations", iteration);
        (clusters, iteration)
    }

    /// Initialize clusters with distinct randomly chosen descriptors.
    fn initialize_clusters<R: Rng + ?Sized>(features: &[Desc], k: usize, rng: &mut R) -> Vec<Desc> {
        index::sample(rng, features.len(), k)
            .into_iter()
            .map(|i| features[i])
            .collect()
    }

    /// Initialize clusters with k-means++ seeding.
    fn initialize_clusters_pp<R: Rng + ?Sized>(features: &[Desc], k: usize, rng: &mut R) -> Vec<Desc> {
        let mut clusters: Vec<Desc> = Vec::with_capacity(k);
        clusters.push(features[rng.gen_range(0..features.len())]);
        let mut dists: Vec<f32> = features.iter().map(|f| Self::l2_sq(f, &clusters[0])).collect();

        while clusters.len() < k {
            let next = match WeightedIndex::new(&dists) {
                Ok(w) => w.sample(rng),
                // Every descriptor sits on a seed already
                Err(_) => rng.gen_range(0..features.len()),
            };
            clusters.push(features[next]);
            let c = features[next];
            for (d, f) in dists.iter_mut().zip(features) {
                *d = d.min(Self::l2_sq(f, &c));
            }
        }
        clusters
    }

    #[inline]
    /// Nearest cluster to `f` and the squared distance to it. Ties go to the lower id.
    fn nearest(clusters: &[Desc], f: &Desc) -> (usize, f32) {
        let mut best: (usize, f32) = (0, f32::INFINITY);
        for (j, c) in clusters.iter().enumerate() {
            let d = Self::l2_sq(c, f);
            if d < best.1 {
                best = (j, d);
            }
        }
        best
    }

    #[inline]
    /// Squared euclidean distance between two descriptors.
    fn l2_sq(x: &[f32], y: &[f32]) -> f32 {
        x.iter()
            .zip(y)
            .fold(0., |a, (b, c)| a + (b - c) * (b - c))
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sum = self.cluster_size.iter().sum::<usize>();
        f.debug_struct("Vocabulary")
            .field("Words", &self.len())
            .field("Descriptor Dimension", &DESC_DIM)
            .field("Total Training Features", &sum)
            .field("Min Word Cluster Size", &self.cluster_size.iter().min().unwrap_or(&0))
            .field("Max Word Cluster Size", &self.cluster_size.iter().max().unwrap_or(&0))
            .field("Mean Word Cluster Size", &(sum / self.len().max(1)))
            .field("Inertia", &self.inertia)
            .field("Iterations", &self.iterations)
            .finish()
    }
}
