use bovw::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random descriptors scattered around `center`.
fn image(center: f32, k: usize, rng: &mut StdRng) -> Vec<Desc> {
    (0..k)
        .map(|_| {
            let mut d = [center; DESC_DIM];
            d.iter_mut().for_each(|v| *v += rng.gen_range(0.0..40.0));
            d
        })
        .collect()
}

fn main() -> BowResult<()> {
    env_logger::init();
    let config = Config {
        n_tests: 5,
        seed: Some(0),
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(42);

    // Three overlapping categories, with a few images too poor to keep
    let mut dataset = Dataset::new(config.k);
    for (label, center) in &[("circles", 0.), ("stripes", 25.), ("dots", 50.)] {
        for i in 0..30 {
            let k = if i % 10 == 9 { config.k - 5 } else { config.k };
            dataset.push(label, image(*center, k, &mut rng))?;
        }
    }
    println!("Kept {} images, dropped {}.", dataset.len(), dataset.dropped());

    // Create a vocabulary from the whole dataset
    let features: Vec<Desc> = dataset
        .labels()
        .flat_map(|l| dataset.images(l).iter().flat_map(|s| s.iter().copied()))
        .collect();
    let voc = Vocabulary::create(&features, config.dictionary_size, &config.kmeans, &mut rng)?;
    println!("\nVocabulary = {:#?}", voc);

    // Save vocab and load it again just for fun
    #[cfg(feature = "bincode")]
    {
        let path = std::env::temp_dir().join("synthetic.voc");
        voc.save(&path)?;
        assert_eq!(voc, Vocabulary::load(&path)?);
    }

    let svm = LinearSvm::new(config.svm.clone());
    let result = Pipeline::new(config)?.run(&dataset, &svm, &mut NoVisualizer)?;
    println!("Accuracies: {:?}", result.accuracies);
    println!("Final accuracy of the model is: {}", result.mean());
    Ok(())
}
