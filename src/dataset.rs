use log::{debug, info, warn};
use rand::Rng;
use std::collections::BTreeMap;

use crate::*;

/// Draws tried before a split is reported empty.
pub const MAX_SPLIT_ATTEMPTS: usize = 100;

/// Yields every image of a labeled collection, one category at a time.
pub trait ImageSource {
    type Image;

    /// Call `f` with `(label, image)` for every image. Errors returned by `f`
    /// stop the walk and are passed through.
    fn for_each_image(
        &self,
        f: &mut dyn FnMut(&str, Self::Image) -> BowResult<()>,
    ) -> BowResult<()>;
}

/// Features paired with the label of the image they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample<T> {
    pub label: String,
    pub features: T,
}

impl<T> LabeledExample<T> {
    pub fn new<S: Into<String>>(label: S, features: T) -> Self {
        Self {
            label: label.into(),
            features,
        }
    }
}

/// Descriptor sets of every usable image, grouped by label.
#[derive(Debug, Clone)]
pub struct Dataset {
    sets: BTreeMap<String, Vec<DescriptorSet>>,
    k: usize,
    dropped: usize,
}

/// Disjoint train and test examples drawn from one [`Dataset`].
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<LabeledExample<DescriptorSet>>,
    pub test: Vec<LabeledExample<DescriptorSet>>,
}

impl Dataset {
    pub fn new(k: usize) -> Self {
        Self {
            sets: BTreeMap::new(),
            k,
            dropped: 0,
        }
    }

    /// Run `extractor` on every image of `source`, keeping images that yield
    /// exactly `k` descriptors.
    pub fn extract<S, E>(source: &S, extractor: &E, k: usize) -> BowResult<Self>
    where
        S: ImageSource,
        E: Extractor<Image = S::Image>,
    {
        let mut dataset = Self::new(k);
        source.for_each_image(&mut |label, image| {
            let descriptors = extractor.extract(&image, k)?;
            dataset.push(label, descriptors)
        })?;
        info!(
            "Extracted {} images in {} categories ({} dropped)",
            dataset.len(),
            dataset.sets.len(),
            dataset.dropped
        );
        Ok(dataset)
    }

    /// Add one image's descriptors. Images with the wrong descriptor count
    /// are dropped, not reported as errors.
    pub fn push(&mut self, label: &str, descriptors: Vec<Desc>) -> BowResult<()> {
        match DescriptorSet::new(descriptors, self.k) {
            Ok(set) => {
                self.sets.entry(label.to_owned()).or_default().push(set);
                Ok(())
            }
            Err(BowErr::InsufficientDescriptors { expected, found }) => {
                debug!(
                    "Dropping image of {:?}: {} of {} descriptors",
                    label, found, expected
                );
                self.dropped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Number of kept images.
    pub fn len(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of images dropped for having too few descriptors.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn images(&self, label: &str) -> &[DescriptorSet] {
        self.sets.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Assign every image to train with probability `train_ratio`, to test
    /// otherwise. Draws are independent, so the realized ratio is approximate.
    ///
    /// A draw leaving either side empty, or a category without training
    /// images, is redrawn; after `MAX_SPLIT_ATTEMPTS` such draws the split
    /// fails with `EmptySplit`. A ratio outside `[0, 1]` is `InvalidConfig`.
    pub fn split<R: Rng + ?Sized>(&self, train_ratio: f64, rng: &mut R) -> BowResult<Split> {
        if !(0. ..=1.).contains(&train_ratio) {
            return Err(BowErr::InvalidConfig(format!(
                "train_ratio must be in [0, 1], got {}",
                train_ratio
            )));
        }
        let mut attempt = 1;
        loop {
            match self.draw_split(train_ratio, rng) {
                Err(BowErr::EmptySplit(reason)) if attempt < MAX_SPLIT_ATTEMPTS => {
                    debug!("Redrawing split ({})", reason);
                    attempt += 1;
                }
                Err(BowErr::EmptySplit(reason)) => {
                    warn!("No usable split after {} draws", attempt);
                    return Err(BowErr::EmptySplit(reason));
                }
                r => return r,
            }
        }
    }

    fn draw_split<R: Rng + ?Sized>(&self, train_ratio: f64, rng: &mut R) -> BowResult<Split> {
        let mut split = Split {
            train: Vec::new(),
            test: Vec::new(),
        };
        for (label, sets) in &self.sets {
            let mut n_train = 0;
            for set in sets {
                let example = LabeledExample::new(label.as_str(), set.clone());
                if rng.gen_bool(train_ratio) {
                    split.train.push(example);
                    n_train += 1;
                } else {
                    split.test.push(example);
                }
            }
            if n_train == 0 {
                return Err(BowErr::EmptySplit(format!(
                    "category {:?} has no training image",
                    label
                )));
            }
        }
        if split.train.is_empty() {
            return Err(BowErr::EmptySplit("train set is empty".into()));
        }
        if split.test.is_empty() {
            return Err(BowErr::EmptySplit("test set is empty".into()));
        }
        debug!(
            "Split {} images into {} train / {} test",
            self.len(),
            split.train.len(),
            split.test.len()
        );
        Ok(split)
    }
}

impl Split {
    /// All training descriptors in one sequence, image boundaries dropped.
    pub fn train_descriptors(&self) -> Vec<Desc> {
        self.train
            .iter()
            .flat_map(|e| e.features.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn desc(v: f32) -> Desc {
        [v; DESC_DIM]
    }

    fn dataset(per_label: usize) -> Dataset {
        let mut d = Dataset::new(3);
        let mut v = 0.;
        for label in &["a", "b"] {
            for _ in 0..per_label {
                d.push(label, vec![desc(v); 3]).unwrap();
                v += 1.;
            }
        }
        d
    }

    #[test]
    fn short_images_are_dropped() {
        let mut d = Dataset::new(3);
        d.push("a", vec![desc(0.); 3]).unwrap();
        d.push("a", vec![desc(0.); 2]).unwrap();
        d.push("b", vec![]).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.dropped(), 2);
        assert_eq!(d.labels().collect::<Vec<_>>(), vec!["a"]);
        assert!(d.images("b").is_empty());
    }

    #[test]
    fn split_is_disjoint_and_complete() {
        let d = dataset(20);
        let mut rng = StdRng::seed_from_u64(7);
        let split = d.split(0.7, &mut rng).unwrap();
        assert_eq!(split.train.len() + split.test.len(), d.len());

        // Every image has a distinct descriptor value, so each must appear once.
        let mut seen: Vec<f32> = split
            .train
            .iter()
            .chain(split.test.iter())
            .map(|e| e.features.as_slice()[0][0])
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f32> = (0..40).map(|v| v as f32).collect();
        assert_eq!(seen, expected);

        for e in split.train.iter().chain(split.test.iter()) {
            let v = e.features.as_slice()[0][0];
            let label = if v < 20. { "a" } else { "b" };
            assert_eq!(e.label, label);
        }
    }

    #[test]
    fn flattened_train_descriptors() {
        let d = dataset(10);
        let split = d.split(0.7, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(split.train_descriptors().len(), split.train.len() * 3);
    }

    #[test]
    fn all_train_is_an_empty_split() {
        let d = dataset(5);
        let err = d.split(1.0, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, BowErr::EmptySplit(_)));
    }

    #[test]
    fn ratio_outside_unit_interval_is_rejected() {
        let d = dataset(5);
        for ratio in &[1.5, -0.1, f64::NAN] {
            let err = d.split(*ratio, &mut StdRng::seed_from_u64(1)).unwrap_err();
            assert!(matches!(err, BowErr::InvalidConfig(_)));
        }
    }

    #[test]
    fn empty_dataset_cannot_be_split() {
        let d = Dataset::new(3);
        let err = d.split(0.7, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, BowErr::EmptySplit(_)));
    }

    #[test]
    fn small_categories_are_redrawn_until_usable() {
        let d = dataset(2);
        for seed in 0..20 {
            let split = d.split(0.7, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(!split.test.is_empty());
            for label in &["a", "b"] {
                assert!(split.train.iter().any(|e| e.label == *label));
            }
        }
    }

    #[test]
    fn category_without_training_image_is_an_empty_split() {
        let d = dataset(5);
        let err = d.split(0.0, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, BowErr::EmptySplit(_)));
    }
}
