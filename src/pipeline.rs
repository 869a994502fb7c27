use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::fmt;

use crate::*;

/// Steps of one train/test iteration, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractSplit,
    BuildVocabulary,
    EncodeTrain,
    Train,
    EncodeTest,
    Evaluate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ExtractSplit => "extract/split",
            Stage::BuildVocabulary => "build vocabulary",
            Stage::EncodeTrain => "encode train",
            Stage::Train => "train",
            Stage::EncodeTest => "encode test",
            Stage::Evaluate => "evaluate",
        };
        f.write_str(name)
    }
}

/// Accuracy of every completed iteration.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub accuracies: Vec<f64>,
}

impl RunResult {
    /// Mean accuracy over iterations, 0 if none ran.
    pub fn mean(&self) -> f64 {
        if self.accuracies.is_empty() {
            return 0.;
        }
        self.accuracies.iter().sum::<f64>() / self.accuracies.len() as f64
    }
}

/// Repeats split → vocabulary → encode → train → evaluate `n_tests` times.
///
/// Each iteration owns its split and vocabulary; test histograms are always
/// encoded with the vocabulary built from the same iteration's training set.
/// The first failing iteration aborts the whole run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> BowResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract descriptors from every image of `source`, then [`run`](Self::run).
    pub fn extract_and_run<S, E, T, V>(
        &self,
        source: &S,
        extractor: &E,
        trainer: &T,
        visualizer: &mut V,
    ) -> BowResult<RunResult>
    where
        S: ImageSource,
        E: Extractor<Image = S::Image>,
        T: Trainer,
        V: Visualizer + ?Sized,
    {
        let dataset = Dataset::extract(source, extractor, self.config.k)?;
        self.run(&dataset, trainer, visualizer)
    }

    pub fn run<T, V>(&self, dataset: &Dataset, trainer: &T, visualizer: &mut V) -> BowResult<RunResult>
    where
        T: Trainer,
        V: Visualizer + ?Sized,
    {
        if dataset.k() != self.config.k {
            return Err(BowErr::InvalidConfig(format!(
                "dataset holds {} descriptors per image, config expects {}",
                dataset.k(),
                self.config.k
            )));
        }
        let mut result = RunResult::default();
        for iteration in 0..self.config.n_tests {
            let mut rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(iteration as u64)),
                None => StdRng::from_entropy(),
            };
            let accuracy = self
                .run_iteration(iteration, dataset, trainer, visualizer, &mut rng)
                .map_err(|e| BowErr::Iteration {
                    iteration,
                    source: Box::new(e),
                })?;
            info!("Iteration {}: accuracy {:.4}", iteration, accuracy);
            result.accuracies.push(accuracy);
        }
        info!("Mean accuracy over {} iterations: {:.4}", self.config.n_tests, result.mean());
        Ok(result)
    }

    /// One full train/test cycle. Returns the test accuracy.
    pub fn run_iteration<T, V>(
        &self,
        iteration: usize,
        dataset: &Dataset,
        trainer: &T,
        visualizer: &mut V,
        rng: &mut StdRng,
    ) -> BowResult<f64>
    where
        T: Trainer,
        V: Visualizer + ?Sized,
    {
        let stage = |s: Stage| debug!("Iteration {}: {}", iteration, s);

        stage(Stage::ExtractSplit);
        let split = dataset.split(self.config.train_ratio, rng)?;

        stage(Stage::BuildVocabulary);
        let voc = Vocabulary::create(
            &split.train_descriptors(),
            self.config.dictionary_size,
            &self.config.kmeans,
            rng,
        )?;

        stage(Stage::EncodeTrain);
        let train = voc.encode(&split.train);

        stage(Stage::Train);
        let model = trainer.train(&train)?;

        stage(Stage::EncodeTest);
        let test = voc.encode(&split.test);

        stage(Stage::Evaluate);
        let accuracy = evaluate(&model, &test)?;
        visualizer.record(iteration, &test)?;
        Ok(accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Label "a" descriptors near 0, label "b" near 50.
    fn dataset(per_label: usize, k: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut d = Dataset::new(k);
        for (label, center) in &[("a", 0f32), ("b", 50.)] {
            for _ in 0..per_label {
                let descs = (0..k)
                    .map(|_| {
                        let mut x = [*center; DESC_DIM];
                        x.iter_mut().for_each(|v| *v += rng.gen_range(0.0..10.0));
                        x
                    })
                    .collect();
                d.push(label, descs).unwrap();
            }
        }
        d
    }

    fn config(seed: u64) -> Config {
        Config {
            k: 5,
            dictionary_size: 4,
            n_tests: 3,
            seed: Some(seed),
            ..Default::default()
        }
    }

    struct Recorder(Vec<(usize, usize)>);

    impl Visualizer for Recorder {
        fn record(&mut self, iteration: usize, examples: &[LabeledExample<BoW>]) -> BowResult<()> {
            self.0.push((iteration, examples.len()));
            Ok(())
        }
    }

    #[test]
    fn every_iteration_reports_an_accuracy() {
        let d = dataset(12, 5, 0);
        let pipeline = Pipeline::new(config(11)).unwrap();
        let mut rec = Recorder(Vec::new());
        let result = pipeline.run(&d, &NearestNeighbor, &mut rec).unwrap();
        assert_eq!(result.accuracies.len(), 3);
        assert!(result.accuracies.iter().all(|a| (0. ..=1.).contains(a)));
        assert!((0. ..=1.).contains(&result.mean()));
        assert_eq!(rec.0.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(rec.0.iter().all(|r| r.1 > 0));
    }

    #[test]
    fn seeded_runs_repeat() {
        let d = dataset(10, 5, 1);
        let pipeline = Pipeline::new(config(5)).unwrap();
        let svm = LinearSvm::default();
        let a = pipeline.run(&d, &svm, &mut NoVisualizer).unwrap();
        let b = pipeline.run(&d, &svm, &mut NoVisualizer).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_large_vocabulary_aborts_the_run() {
        let d = dataset(20, 5, 2);
        let pipeline = Pipeline::new(Config {
            dictionary_size: 1000,
            ..config(3)
        })
        .unwrap();
        let err = pipeline.run(&d, &NearestNeighbor, &mut NoVisualizer).unwrap_err();
        match err {
            BowErr::Iteration { iteration, source } => {
                assert_eq!(iteration, 0);
                assert!(matches!(*source, BowErr::InsufficientData { .. }));
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn descriptor_count_must_match_config() {
        let d = dataset(4, 6, 3);
        let pipeline = Pipeline::new(config(3)).unwrap();
        assert!(matches!(
            pipeline.run(&d, &NearestNeighbor, &mut NoVisualizer),
            Err(BowErr::InvalidConfig(_))
        ));
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(RunResult::default().mean(), 0.);
        let r = RunResult {
            accuracies: vec![0.5, 1.],
        };
        assert_eq!(r.mean(), 0.75);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::BuildVocabulary.to_string(), "build vocabulary");
        assert_eq!(Stage::ExtractSplit.to_string(), "extract/split");
    }
}
