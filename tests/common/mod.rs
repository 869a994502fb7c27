use bovw::{BowResult, Desc, Extractor, ImageSource, DESC_DIM};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Stand-in for an image: descriptors are drawn around `center`.
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    pub center: f32,
    pub descriptors: usize,
    pub seed: u64,
}

/// Returns `descriptors` descriptors per image, whatever `k` asks for.
pub struct SyntheticExtractor;

impl Extractor for SyntheticExtractor {
    type Image = SyntheticImage;

    fn extract(&self, image: &SyntheticImage, _k: usize) -> BowResult<Vec<Desc>> {
        let mut rng = StdRng::seed_from_u64(image.seed);
        Ok((0..image.descriptors)
            .map(|_| {
                let mut d = [image.center; DESC_DIM];
                d.iter_mut().for_each(|v| *v += rng.gen_range(0.0..20.0));
                d
            })
            .collect())
    }
}

pub struct MemorySource {
    pub images: Vec<(String, SyntheticImage)>,
}

impl MemorySource {
    /// `per_label` images for each `(label, center)`, all with `descriptors` descriptors.
    pub fn new(labels: &[(&str, f32)], per_label: usize, descriptors: usize) -> Self {
        let mut images = Vec::new();
        let mut seed = 0;
        for (label, center) in labels {
            for _ in 0..per_label {
                images.push((
                    label.to_string(),
                    SyntheticImage {
                        center: *center,
                        descriptors,
                        seed,
                    },
                ));
                seed += 1;
            }
        }
        Self { images }
    }
}

impl ImageSource for MemorySource {
    type Image = SyntheticImage;

    fn for_each_image(
        &self,
        f: &mut dyn FnMut(&str, SyntheticImage) -> BowResult<()>,
    ) -> BowResult<()> {
        for (label, image) in &self.images {
            f(label, image.clone())?;
        }
        Ok(())
    }
}
