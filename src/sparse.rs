//! Sparse reconstruction of OCT B-scans
//!
//! The convolutional basis-pursuit denoising solver itself is external
//! numerical code; [`SparseSolver`] is the seam the figures rely on and
//! [`CachedSolver`] reads outputs the solver wrote offline into an `.npz`
//! archive. What lives here is the despeckling structure around the solver:
//! a first unweighted pass segments the B-scan into structure and speckle,
//! the second pass down-weights the data-fidelity term inside the speckle
//! regions.

use std::path::PathBuf;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::{bscan, dataset};

#[derive(thiserror::Error, Debug)]
pub enum SparseError {
    #[error("failed to read the solver cache")]
    Io(#[from] std::io::Error),
    #[error("solver cache has no `{0}` entry")]
    MissingEntry(String),
    #[error("solver cache entry `{0}` is not a 2-D array")]
    NotAnImage(String),
    #[error("solver returned a {found:?} array for a {expected:?} signal")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Sweep point of the despeckling parameters
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SparseParams {
    /// Regularization weight of the weighted pass
    pub lmbda: f64,
    /// Regularization weight of the speckle-segmentation pass
    pub mask_lmbda: f64,
    /// Fidelity weight applied inside speckle regions
    pub speckle_weight: f64,
}

/// Output of one convolutional basis-pursuit solve
pub struct SparseCode {
    /// Sparse coefficient image
    pub coefficients: DMatrix<Complex64>,
    /// Dictionary convolution of the coefficients
    pub reconstruction: DMatrix<Complex64>,
}

/// Convolutional basis-pursuit denoising solver
///
/// `lmbda` weighs the l1 penalty; `weights`, when given, scales the
/// data-fidelity term per sample.
pub trait SparseSolver {
    fn solve(
        &self,
        signal: &DMatrix<Complex64>,
        dictionary: &DVector<Complex64>,
        lmbda: f64,
        weights: Option<&DMatrix<f64>>,
    ) -> Result<SparseCode, SparseError>;
}

/// Solver outputs precomputed offline into an `.npz` archive
///
/// The archive holds one `x_*`/`r_*` pair of `complex128` arrays
/// (coefficients and reconstruction) per solve, keyed `l{lmbda:.3}` for an
/// unweighted pass and `l{lmbda:.3}_w{omega:.3}` for a weighted one, where
/// `omega` is the smallest fidelity weight.
pub struct CachedSolver {
    archive: PathBuf,
}
impl CachedSolver {
    pub fn new<P: Into<PathBuf>>(archive: P) -> Self {
        Self {
            archive: archive.into(),
        }
    }
    fn entry(&self, name: &str) -> Result<DMatrix<Complex64>, SparseError> {
        let mut npz = npyz::npz::NpzArchive::open(&self.archive)?;
        let npy = npz
            .by_name(name)?
            .ok_or_else(|| SparseError::MissingEntry(name.into()))?;
        let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();
        let [rows, cols] = shape[..] else {
            return Err(SparseError::NotAnImage(name.into()));
        };
        let data = npy.into_vec::<Complex64>()?;
        Ok(DMatrix::from_row_iterator(rows, cols, data))
    }
}
impl SparseSolver for CachedSolver {
    fn solve(
        &self,
        signal: &DMatrix<Complex64>,
        _dictionary: &DVector<Complex64>,
        lmbda: f64,
        weights: Option<&DMatrix<f64>>,
    ) -> Result<SparseCode, SparseError> {
        let key = match weights {
            Some(w) => format!("l{:.3}_w{:.3}", lmbda, w.min()),
            None => format!("l{lmbda:.3}"),
        };
        log::debug!("solver cache lookup: {key}");
        let coefficients = self.entry(&format!("x_{key}"))?;
        let reconstruction = self.entry(&format!("r_{key}"))?;
        if coefficients.shape() != signal.shape() {
            return Err(SparseError::ShapeMismatch {
                expected: signal.shape(),
                found: coefficients.shape(),
            });
        }
        Ok(SparseCode {
            coefficients,
            reconstruction,
        })
    }
}

/// Speckle segmentation of the weighted pass
#[derive(Debug, Clone, Copy)]
pub struct Masking {
    /// dB level above the image minimum separating structure from speckle
    pub threshold: f64,
    /// Disk radius of the closing applied to the structure mask
    pub radius: usize,
}
impl Default for Masking {
    fn default() -> Self {
        Self {
            threshold: 30.,
            radius: 1,
        }
    }
}

/// Per-sample fidelity weights from a first-pass sparse estimate
///
/// Samples above the dB threshold are structure and keep weight one; the
/// complement is speckle and gets `speckle_weight`. A morphological closing
/// removes pinholes in the structure mask.
pub fn speckle_weights(
    coefficients: &DMatrix<Complex64>,
    masking: &Masking,
    speckle_weight: f64,
) -> DMatrix<f64> {
    let log = bscan::log_magnitude(coefficients);
    let floor = log.min();
    let structure = log.map(|x| x - floor > masking.threshold);
    let structure = bscan::erode(&bscan::dilate(&structure, masking.radius), masking.radius);
    structure.map(|s| if s { 1. } else { speckle_weight })
}

/// Sparse-vector and reconstruction images of the two-pass despeckling
pub struct Despeckled {
    /// Sparse-vector image, de-normalized and aligned to the dictionary peak
    pub image: DMatrix<Complex64>,
    /// Dictionary reconstruction of the weighted pass
    pub reconstruction: DMatrix<Complex64>,
    /// Fidelity weights used by the weighted pass
    pub weights: DMatrix<f64>,
}

/// Two-pass speckle-weighted reconstruction of a B-scan
///
/// A-lines are l2-normalized; an unweighted solve at `params.mask_lmbda`
/// segments speckle, the weighted solve at `params.lmbda` produces the
/// despeckled image.
pub fn despeckle<S: SparseSolver>(
    solver: &S,
    bscan: &DMatrix<Complex64>,
    dictionary: &DVector<Complex64>,
    params: &SparseParams,
    masking: &Masking,
) -> Result<Despeckled, SparseError> {
    let (norms, snorm) = dataset::to_l2_normed(bscan);
    let segmentation = solver.solve(&snorm, dictionary, params.mask_lmbda, None)?;
    let weights = speckle_weights(&segmentation.coefficients, masking, params.speckle_weight);
    let code = solver.solve(&snorm, dictionary, params.lmbda, Some(&weights))?;
    let aligned = roll_rows(&code.coefficients, argmax_magnitude(dictionary));
    Ok(Despeckled {
        image: dataset::from_l2_normed(&aligned, &norms),
        reconstruction: dataset::from_l2_normed(&code.reconstruction, &norms),
        weights,
    })
}

/// Single unweighted pass at `lmbda`, de-normalized and aligned
pub fn sparse_estimate<S: SparseSolver>(
    solver: &S,
    bscan: &DMatrix<Complex64>,
    dictionary: &DVector<Complex64>,
    lmbda: f64,
) -> Result<SparseCode, SparseError> {
    let (norms, snorm) = dataset::to_l2_normed(bscan);
    let code = solver.solve(&snorm, dictionary, lmbda, None)?;
    let aligned = roll_rows(&code.coefficients, argmax_magnitude(dictionary));
    Ok(SparseCode {
        coefficients: dataset::from_l2_normed(&aligned, &norms),
        reconstruction: dataset::from_l2_normed(&code.reconstruction, &norms),
    })
}

/// Aligns the coefficient rows to the dictionary peak delay
fn roll_rows(m: &DMatrix<Complex64>, shift: usize) -> DMatrix<Complex64> {
    let n = m.nrows();
    let shift = shift % n;
    DMatrix::from_fn(n, m.ncols(), |r, c| m[((r + n - shift) % n, c)])
}

fn argmax_magnitude(d: &DVector<Complex64>) -> usize {
    d.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // hands the signal back as both coefficients and reconstruction
    struct PassThrough;
    impl SparseSolver for PassThrough {
        fn solve(
            &self,
            signal: &DMatrix<Complex64>,
            _dictionary: &DVector<Complex64>,
            _lmbda: f64,
            _weights: Option<&DMatrix<f64>>,
        ) -> Result<SparseCode, SparseError> {
            Ok(SparseCode {
                coefficients: signal.clone(),
                reconstruction: signal.clone(),
            })
        }
    }

    fn delta_dictionary(len: usize, peak: usize) -> DVector<Complex64> {
        let mut d = DVector::from_element(len, Complex64::new(0., 0.));
        d[peak] = Complex64::new(1., 0.);
        d
    }

    #[test]
    fn speckle_weights_split_structure_from_background() {
        let mut image = DMatrix::from_element(20, 20, Complex64::new(1e-4, 0.));
        for r in 8..12 {
            for c in 8..12 {
                image[(r, c)] = Complex64::new(1., 0.);
            }
        }
        let weights = speckle_weights(&image, &Masking::default(), 0.1);
        assert_eq!(weights[(10, 10)], 1.);
        assert_eq!(weights[(0, 0)], 0.1);
    }

    #[test]
    fn despeckle_restores_scale_and_alignment() {
        let bscan = DMatrix::from_fn(8, 3, |r, c| Complex64::new((r + 2 * c) as f64 + 1., 0.));
        let params = SparseParams {
            lmbda: 0.1,
            mask_lmbda: 0.02,
            speckle_weight: 0.5,
        };
        // delta dictionary peaking at 0: no roll, pass-through solver, so the
        // de-normalized image is the input B-scan
        let out = despeckle(
            &PassThrough,
            &bscan,
            &delta_dictionary(8, 0),
            &params,
            &Masking::default(),
        )
        .unwrap();
        assert!((&out.image - &bscan).norm() < 1e-12);
        assert_eq!(out.weights.shape(), bscan.shape());
    }

    #[test]
    fn rolling_follows_the_dictionary_peak() {
        let bscan = DMatrix::from_fn(5, 2, |r, _| Complex64::new(r as f64, 0.));
        let out = sparse_estimate(&PassThrough, &bscan, &delta_dictionary(5, 2), 0.1).unwrap();
        // rows shifted down by 2, circularly: [0,1,2,3,4] -> [3,4,0,1,2]
        let rolled: Vec<f64> = out.coefficients.column(0).iter().map(|x| x.re).collect();
        let expected = [3., 4., 0., 1., 2.];
        for (got, want) in rolled.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_cache_is_an_io_error() {
        let solver = CachedSolver::new("/nonexistent/cache.npz");
        let signal = DMatrix::from_element(2, 2, Complex64::new(1., 0.));
        let dict = delta_dictionary(2, 0);
        assert!(matches!(
            solver.solve(&signal, &dict, 0.1, None),
            Err(SparseError::Io(_))
        ));
    }
}
