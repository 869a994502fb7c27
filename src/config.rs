//! Run configuration, loadable from a JSON file.
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Descriptors extracted per image. Images yielding fewer are dropped.
    pub k: usize,
    /// Words in the vocabulary, i.e. histogram length.
    pub dictionary_size: usize,
    /// Train/test repetitions averaged into the final accuracy.
    pub n_tests: usize,
    /// Probability that an image goes to the training set.
    pub train_ratio: f64,
    /// Makes splits and clustering reproducible. `None` draws from the OS.
    pub seed: Option<u64>,
    pub kmeans: KMeansParams,
    pub svm: SvmParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: 20,
            dictionary_size: 50,
            n_tests: 10,
            train_ratio: 0.7,
            seed: None,
            kmeans: KMeansParams::default(),
            svm: SvmParams::default(),
        }
    }
}

impl Config {
    /// Read a JSON config. Missing fields take their default value.
    pub fn load<P: AsRef<Path>>(path: P) -> BowResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BowResult<()> {
        if self.k == 0 {
            return Err(BowErr::InvalidConfig("k must be positive".into()));
        }
        if self.dictionary_size == 0 {
            return Err(BowErr::InvalidConfig("dictionary_size must be positive".into()));
        }
        if self.n_tests == 0 {
            return Err(BowErr::InvalidConfig("n_tests must be positive".into()));
        }
        if !(self.train_ratio > 0. && self.train_ratio < 1.) {
            return Err(BowErr::InvalidConfig(format!(
                "train_ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        if self.kmeans.max_iterations == 0 {
            return Err(BowErr::InvalidConfig("kmeans.max_iterations must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = Config::default();
        assert_eq!((c.k, c.dictionary_size, c.n_tests), (20, 50, 10));
        c.validate().unwrap();
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{ "dictionary_size": 10, "seed": 4, "kmeans": { "init": "Random" } }"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert_eq!(c.dictionary_size, 10);
        assert_eq!(c.seed, Some(4));
        assert_eq!(c.k, 20);
        assert_eq!(c.kmeans.init, KMeansInit::Random);
        assert_eq!(c.kmeans.max_iterations, 300);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for c in vec![
            Config { k: 0, ..Default::default() },
            Config { dictionary_size: 0, ..Default::default() },
            Config { n_tests: 0, ..Default::default() },
            Config { train_ratio: 1., ..Default::default() },
            Config { train_ratio: f64::NAN, ..Default::default() },
        ] {
            assert!(matches!(c.validate(), Err(BowErr::InvalidConfig(_))));
        }
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("bovw-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "k": 15, "n_tests": 2 }"#).unwrap();
        let c = Config::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(c.k, 15);
        assert_eq!(c.n_tests, 2);

        let missing = std::env::temp_dir().join("bovw-config-missing.json");
        assert!(matches!(Config::load(&missing), Err(BowErr::Io(_))));
    }
}
