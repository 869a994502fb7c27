use crate::*;
use log::{debug, warn};
use opencv::{self, prelude::*};
use std::path::{Path, PathBuf};

type CvImage = opencv::core::Mat;
type CvMat = opencv::core::Mat;

/// SIFT keypoint descriptors, keeping the `k` strongest keypoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiftExtractor;

impl Extractor for SiftExtractor {
    type Image = CvImage;

    fn extract(&self, image: &CvImage, k: usize) -> BowResult<Vec<Desc>> {
        sift_from_cvimage(image, k)
    }
}

/// Extract sift keypoint descriptors from a grayscale image.
fn sift_from_cvimage(cv_img: &CvImage, k: usize) -> BowResult<Vec<Desc>> {
    // Create detector
    let mut sift = opencv::features2d::SIFT::create(k as i32, 3, 0.04, 10., 1.6)?;

    // Detect keypoints and compute descriptors
    let mut kps = opencv::types::VectorOfKeyPoint::new();
    let mut desc = CvMat::default()?;
    let mask = CvMat::default()?;
    sift.detect_and_compute(cv_img, &mask, &mut kps, &mut desc, false)?;
    if kps.is_empty() {
        return Ok(Vec::new());
    }
    if desc.cols() as usize != DESC_DIM {
        return Err(BowErr::OpenCvDecode);
    }

    // Copy data from CvMat into descriptor buffers
    let mut out: Vec<Desc> = Vec::with_capacity(desc.rows() as usize);
    for i in 0..desc.rows() {
        let mut d: Desc = [0.; DESC_DIM];
        for (j, v) in d.iter_mut().enumerate() {
            *v = *desc.at_2d::<f32>(i, j as i32)?;
        }
        out.push(d);
    }
    Ok(out)
}

/// Use opencv to load an image in grayscale. `None` if it cannot be decoded.
pub fn load_gray<P: AsRef<Path>>(path: P) -> BowResult<Option<CvImage>> {
    let img: CvImage = opencv::imgcodecs::imread(
        &path.as_ref().to_string_lossy(),
        opencv::imgcodecs::IMREAD_GRAYSCALE,
    )?;
    if img.empty()? {
        return Ok(None);
    }
    Ok(Some(img))
}

/// A directory holding one subdirectory per category; every file inside a
/// subdirectory is an image of that category.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn sorted_entries(dir: &Path) -> BowResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in dir.read_dir()? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }
}

impl ImageSource for DirSource {
    type Image = CvImage;

    fn for_each_image(
        &self,
        f: &mut dyn FnMut(&str, CvImage) -> BowResult<()>,
    ) -> BowResult<()> {
        for category in Self::sorted_entries(&self.root)? {
            if !category.is_dir() {
                continue;
            }
            let label = match category.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            debug!("Extracting keypoint descriptors from {:?}", category);
            for file in Self::sorted_entries(&category)? {
                match load_gray(&file)? {
                    Some(img) => f(&label, img)?,
                    None => warn!("Skipping unreadable image {:?}", file),
                }
            }
        }
        Ok(())
    }
}
