use bovw::*;
use std::path::PathBuf;

/// Usage: classify <dataset dir> [config.json]
///
/// The dataset dir holds one subdirectory of images per category.
fn main() -> BowResult<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let root = PathBuf::from(args.next().unwrap_or_else(|| "data/101_ObjectCategories".into()));
    let config = match args.next() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    println!("Config: {:#?}", config);

    // Extract sift descriptors once, the split is redrawn every iteration
    let dataset = Dataset::extract(&DirSource::new(&root), &SiftExtractor, config.k)?;
    println!(
        "Kept {} images ({} dropped) in {} categories.",
        dataset.len(),
        dataset.dropped(),
        dataset.labels().count()
    );

    let svm = LinearSvm::new(config.svm.clone());
    let mut plots = JsonProjection::new("plots")?;
    let result = Pipeline::new(config)?.run(&dataset, &svm, &mut plots)?;
    println!("Final accuracy of the model is: {}", result.mean());
    Ok(())
}
