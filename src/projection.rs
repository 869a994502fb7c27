use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use crate::*;

const POWER_ITERATIONS: usize = 500;
const POWER_TOLERANCE: f64 = 1e-12;
/// Relative to the largest covariance column.
const VARIANCE_FLOOR: f64 = 1e-9;

/// Receives the encoded test set of every iteration.
pub trait Visualizer {
    fn record(&mut self, iteration: usize, examples: &[LabeledExample<BoW>]) -> BowResult<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVisualizer;

impl Visualizer for NoVisualizer {
    fn record(&mut self, _iteration: usize, _examples: &[LabeledExample<BoW>]) -> BowResult<()> {
        Ok(())
    }
}

/// One histogram projected on the first two principal components.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectedPoint {
    pub label: String,
    pub x: f32,
    pub y: f32,
}

/// Writes `projection_<iteration>.json` into a directory, one point per
/// example, ready for an external plotting tool.
#[derive(Debug, Clone)]
pub struct JsonProjection {
    dir: PathBuf,
}

impl JsonProjection {
    pub fn new<P: AsRef<Path>>(dir: P) -> BowResult<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self, iteration: usize) -> PathBuf {
        self.dir.join(format!("projection_{}.json", iteration))
    }
}

impl Visualizer for JsonProjection {
    fn record(&mut self, iteration: usize, examples: &[LabeledExample<BoW>]) -> BowResult<()> {
        let bows: Vec<BoW> = examples.iter().map(|e| e.features.clone()).collect();
        let points: Vec<ProjectedPoint> = pca_2d(&bows)
            .into_iter()
            .zip(examples)
            .map(|(p, e)| ProjectedPoint {
                label: e.label.clone(),
                x: p[0],
                y: p[1],
            })
            .collect();
        let path = self.path(iteration);
        debug!("Writing {} projected points to {:?}", points.len(), path);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &points)?;
        Ok(())
    }
}

/// Project histograms on their first two principal components.
///
/// Components are found by power iteration on the covariance matrix, with
/// deflation for the second one. Directions with no variance project to 0.
pub fn pca_2d(bows: &[BoW]) -> Vec<[f32; 2]> {
    let n = bows.len();
    let d = bows.iter().map(Vec::len).max().unwrap_or(0);
    if n == 0 || d == 0 {
        return vec![[0., 0.]; n];
    }

    let mut mean = vec![0f64; d];
    for b in bows {
        for (m, &c) in mean.iter_mut().zip(b) {
            *m += c as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n as f64);
    let centred: Vec<Vec<f64>> = bows
        .iter()
        .map(|b| {
            (0..d)
                .map(|j| b.get(j).copied().unwrap_or(0) as f64 - mean[j])
                .collect()
        })
        .collect();

    let mut cov = vec![vec![0f64; d]; d];
    for x in &centred {
        for i in 0..d {
            for j in 0..d {
                cov[i][j] += x[i] * x[j];
            }
        }
    }
    cov.iter_mut()
        .flat_map(|r| r.iter_mut())
        .for_each(|v| *v /= n as f64);

    let scale = cov.iter().map(|r| norm(r)).fold(0f64, f64::max);
    let floor = VARIANCE_FLOOR * scale.max(1.);
    let (v1, l1) = principal_component(&cov, None, floor);
    for i in 0..d {
        for j in 0..d {
            cov[i][j] -= l1 * v1[i] * v1[j];
        }
    }
    let (v2, _) = principal_component(&cov, Some(v1.as_slice()), floor);

    centred
        .iter()
        .map(|x| [dot(x, &v1) as f32, dot(x, &v2) as f32])
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Dominant eigenvector and eigenvalue of a symmetric PSD matrix, restricted
/// to the complement of `orth`. Zero vector when no direction there has
/// variance above `floor`.
fn principal_component(m: &[Vec<f64>], orth: Option<&[f64]>, floor: f64) -> (Vec<f64>, f64) {
    let d = m.len();
    let reject = |v: &mut Vec<f64>| {
        if let Some(o) = orth {
            let p = dot(v, o);
            v.iter_mut().zip(o).for_each(|(x, y)| *x -= p * y);
        }
    };

    // Start from the largest column, which lies in the range of `m`
    let mut v = match m.iter().max_by(|a, b| {
        norm(a)
            .partial_cmp(&norm(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        Some(col) => col.clone(),
        None => return (Vec::new(), 0.),
    };
    reject(&mut v);
    let n0 = norm(&v);
    if n0 <= floor {
        return (vec![0.; d], 0.);
    }
    v.iter_mut().for_each(|x| *x /= n0);

    let mut lambda = 0.;
    for _ in 0..POWER_ITERATIONS {
        let mut w: Vec<f64> = m.iter().map(|row| dot(row, &v)).collect();
        reject(&mut w);
        let nw = norm(&w);
        if nw <= floor {
            return (vec![0.; d], 0.);
        }
        w.iter_mut().for_each(|x| *x /= nw);
        let delta: f64 = w.iter().zip(&v).map(|(a, b)| (a - b) * (a - b)).sum();
        v = w;
        lambda = nw;
        if delta < POWER_TOLERANCE {
            break;
        }
    }
    (v, lambda)
}
