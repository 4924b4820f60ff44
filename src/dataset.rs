//! OCT dataset loading
//!
//! A dataset pairs a complex B-scan, saved with `numpy.save` as a 2-D
//! `complex128` array, with the learned axial PSF exported from the
//! dictionary-learning run as a pickled `{"re": [...], "im": [...]}` mapping.
//! The measured PSF comes from a mirror measurement stack instead: the
//! frame-averaged spectrum is highpass filtered and inverse Fourier
//! transformed into a unit-norm axial trace.

use std::{
    f64::consts::PI,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rustfft::FftPlanner;

#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("failed to read the dataset file")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize the dictionary pickle")]
    Pickle(#[from] serde_pickle::Error),
    #[error("expected a 2-D B-scan, found {0} dimension(s)")]
    NotAnImage(usize),
    #[error("dictionary real and imaginary parts differ in length ({re} vs {im})")]
    MismatchedDictionary { re: usize, im: usize },
    #[error("A-line index {index} outside the {width} columns of the B-scan")]
    ALineOutOfRange { index: usize, width: usize },
    #[error("{0}-sample spectrum is too short for a {1}-sample PSF crop")]
    SpectrumTooShort(usize, usize),
}

/// A complex B-scan and the learned dictionary that reconstructs it
pub struct Dataset {
    /// Complex B-scan, depth along the rows, lateral position along the columns
    pub bscan: DMatrix<Complex64>,
    /// Learned axial PSF
    pub dictionary: DVector<Complex64>,
}
impl Dataset {
    /// Returns one axial depth profile of the B-scan
    pub fn a_line(&self, index: usize) -> Result<DVector<Complex64>, DatasetError> {
        if index >= self.bscan.ncols() {
            return Err(DatasetError::ALineOutOfRange {
                index,
                width: self.bscan.ncols(),
            });
        }
        Ok(self.bscan.column(index).into_owned())
    }
}

/// Dataset loader
///
/// `<path>/<name>.npy` holds the B-scan and `<path>/<name>_psf.pkl` the
/// learned dictionary.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    path: PathBuf,
    decimation: usize,
}
impl Default for DatasetLoader {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            decimation: 1,
        }
    }
}
impl DatasetLoader {
    pub fn data_path<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            path: path.into(),
            ..self
        }
    }
    /// Keeps one A-line out of `factor`
    pub fn decimation(self, factor: usize) -> Self {
        Self {
            decimation: factor.max(1),
            ..self
        }
    }
    pub fn load(&self, name: &str) -> Result<Dataset, DatasetError> {
        let bscan = read_bscan(self.path.join(name).with_extension("npy"))?;
        let bscan = decimate_columns(bscan, self.decimation);
        let dictionary = read_dictionary(self.path.join(format!("{name}_psf.pkl")))?;
        log::info!(
            "dataset `{}`: {}x{} B-scan (1:{} lateral decimation), {}-sample dictionary",
            name,
            bscan.nrows(),
            bscan.ncols(),
            self.decimation,
            dictionary.len()
        );
        Ok(Dataset { bscan, dictionary })
    }
}

fn read_bscan<P: AsRef<Path>>(path: P) -> Result<DMatrix<Complex64>, DatasetError> {
    let npy = npyz::NpyFile::new(BufReader::new(File::open(path)?))?;
    let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();
    let [rows, cols] = shape[..] else {
        return Err(DatasetError::NotAnImage(shape.len()));
    };
    let data = npy.into_vec::<Complex64>()?;
    Ok(DMatrix::from_row_iterator(rows, cols, data))
}

#[derive(serde::Deserialize)]
struct PickledPsf {
    re: Vec<f64>,
    im: Vec<f64>,
}

/// Reads a learned PSF pickled as `{"re": [...], "im": [...]}`
pub fn read_dictionary<P: AsRef<Path>>(path: P) -> Result<DVector<Complex64>, DatasetError> {
    let mut file = File::open(path)?;
    let psf: PickledPsf = serde_pickle::from_reader(&mut file, Default::default())?;
    if psf.re.len() != psf.im.len() {
        return Err(DatasetError::MismatchedDictionary {
            re: psf.re.len(),
            im: psf.im.len(),
        });
    }
    Ok(DVector::from_iterator(
        psf.re.len(),
        psf.re
            .into_iter()
            .zip(psf.im)
            .map(|(re, im)| Complex64::new(re, im)),
    ))
}

/// Frame-averaged spectrum of a measurement stack saved as an N-D `float64`
/// array, averaged over every axis but the last
pub fn mean_spectrum<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, DatasetError> {
    let npy = npyz::NpyFile::new(BufReader::new(File::open(path)?))?;
    let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();
    let samples = *shape.last().ok_or(DatasetError::NotAnImage(0))?;
    if samples == 0 {
        return Ok(Vec::new());
    }
    let data = npy.into_vec::<f64>()?;
    let frames = (data.len() / samples).max(1);
    let mut mean = vec![0f64; samples];
    for frame in data.chunks_exact(samples) {
        for (m, &x) in mean.iter_mut().zip(frame) {
            *m += x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= frames as f64);
    Ok(mean)
}

/// Recovers the measured axial PSF from a frame-averaged mirror spectrum
///
/// The spectrum is highpass filtered (zero phase, 401-tap windowed sinc,
/// 0.05 cutoff) to strip the DC term, inverse Fourier transformed and
/// l2-normalized; the returned trace is the `2 * half_width` samples centered
/// on the magnitude peak.
pub fn measured_psf(
    spectrum: &[f64],
    half_width: usize,
) -> Result<DVector<Complex64>, DatasetError> {
    if spectrum.len() < 2 * half_width {
        return Err(DatasetError::SpectrumTooShort(
            spectrum.len(),
            2 * half_width,
        ));
    }
    let taps = highpass_taps(401.min(odd_below(spectrum.len())), 0.05);
    let filtered = filtfilt(&taps, spectrum);

    let mut trace: Vec<Complex64> = filtered.iter().map(|&x| Complex64::new(x, 0.)).collect();
    FftPlanner::new()
        .plan_fft_inverse(trace.len())
        .process(&mut trace);
    // unit l2 norm, the FFT scaling drops out
    let norm = trace.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0. {
        trace.iter_mut().for_each(|x| *x /= norm);
    }

    let peak = trace
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let lo = peak
        .saturating_sub(half_width)
        .min(trace.len() - 2 * half_width);
    Ok(DVector::from_row_slice(&trace[lo..lo + 2 * half_width]))
}

fn odd_below(n: usize) -> usize {
    if n % 2 == 0 {
        n - 1
    } else {
        n
    }
}

/// Hamming-windowed sinc highpass, `cutoff` relative to Nyquist, odd tap count
fn highpass_taps(n_taps: usize, cutoff: f64) -> Vec<f64> {
    let m = (n_taps - 1) as f64 / 2.;
    let mut lowpass: Vec<f64> = (0..n_taps)
        .map(|i| {
            let k = i as f64 - m;
            let sinc = if k == 0. {
                2. * cutoff
            } else {
                (2. * cutoff * PI * k).sin() / (PI * k)
            };
            let window = 0.54 - 0.46 * (2. * PI * i as f64 / (n_taps - 1) as f64).cos();
            sinc * window
        })
        .collect();
    let gain: f64 = lowpass.iter().sum();
    lowpass.iter_mut().for_each(|t| *t /= gain);
    // spectral inversion
    let mut taps: Vec<f64> = lowpass.into_iter().map(|t| -t).collect();
    taps[(n_taps - 1) / 2] += 1.;
    taps
}

/// Zero-phase FIR filtering, forward then backward, edges held constant
fn filtfilt(taps: &[f64], signal: &[f64]) -> Vec<f64> {
    let forward = fir(taps, signal);
    let mut backward: Vec<f64> = forward.into_iter().rev().collect();
    backward = fir(taps, &backward);
    backward.reverse();
    backward
}

fn fir(taps: &[f64], signal: &[f64]) -> Vec<f64> {
    let delay = (taps.len() - 1) / 2;
    let at = |i: i64| {
        let i = i.clamp(0, signal.len() as i64 - 1) as usize;
        signal[i]
    };
    (0..signal.len())
        .map(|n| {
            taps.iter()
                .enumerate()
                .map(|(k, &t)| t * at(n as i64 + delay as i64 - k as i64))
                .sum()
        })
        .collect()
}

/// Normalizes every A-line to unit l2 norm, returning the norms for
/// [`from_l2_normed`]
pub fn to_l2_normed(bscan: &DMatrix<Complex64>) -> (DVector<f64>, DMatrix<Complex64>) {
    let norms = DVector::from_iterator(bscan.ncols(), bscan.column_iter().map(|c| c.norm()));
    let mut normed = bscan.clone();
    for (mut col, &n) in normed.column_iter_mut().zip(norms.iter()) {
        if n > 0. {
            col.iter_mut().for_each(|x| *x /= n);
        }
    }
    (norms, normed)
}

/// Restores the A-line scaling removed by [`to_l2_normed`]
pub fn from_l2_normed(normed: &DMatrix<Complex64>, norms: &DVector<f64>) -> DMatrix<Complex64> {
    let mut bscan = normed.clone();
    for (mut col, &n) in bscan.column_iter_mut().zip(norms.iter()) {
        col.iter_mut().for_each(|x| *x *= n);
    }
    bscan
}

pub(crate) fn decimate_columns(m: DMatrix<Complex64>, factor: usize) -> DMatrix<Complex64> {
    if factor <= 1 {
        return m;
    }
    let cols: Vec<usize> = (0..m.ncols()).step_by(factor).collect();
    m.select_columns(&cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_norm_roundtrip() {
        let bscan = DMatrix::from_fn(6, 4, |r, c| Complex64::new(r as f64 + 1., c as f64));
        let (norms, normed) = to_l2_normed(&bscan);
        for col in normed.column_iter() {
            assert!((col.norm() - 1.).abs() < 1e-12);
        }
        let back = from_l2_normed(&normed, &norms);
        assert!((&back - &bscan).norm() < 1e-12);
    }

    #[test]
    fn decimation_keeps_every_kth_a_line() {
        let bscan = DMatrix::from_fn(3, 10, |_, c| Complex64::new(c as f64, 0.));
        let thinned = decimate_columns(bscan, 4);
        assert_eq!(thinned.ncols(), 3);
        assert_eq!(thinned[(0, 1)].re, 4.);
        assert_eq!(thinned[(0, 2)].re, 8.);
    }

    #[test]
    fn a_line_bounds() {
        let dataset = Dataset {
            bscan: DMatrix::from_element(4, 4, Complex64::new(1., 0.)),
            dictionary: DVector::from_element(4, Complex64::new(1., 0.)),
        };
        assert!(dataset.a_line(3).is_ok());
        assert!(matches!(
            dataset.a_line(4),
            Err(DatasetError::ALineOutOfRange { index: 4, width: 4 })
        ));
    }

    #[test]
    fn highpass_rejects_dc_and_passes_band() {
        let taps = highpass_taps(101, 0.05);
        let dc: f64 = taps.iter().sum();
        assert!(dc.abs() < 1e-6);
        // response at half Nyquist
        let n = taps.len() as f64;
        let (re, im) = taps.iter().enumerate().fold((0., 0.), |(re, im), (k, &t)| {
            let phase = PI * 0.5 * (k as f64 - (n - 1.) / 2.);
            (re + t * phase.cos(), im - t * phase.sin())
        });
        let gain = (re * re + im * im).sqrt();
        assert!((gain - 1.).abs() < 1e-2);
    }

    #[test]
    fn measured_psf_peaks_at_the_crop_center() {
        let n = 1024;
        let spectrum: Vec<f64> = (0..n)
            .map(|i| (2. * PI * 256. * i as f64 / n as f64).cos())
            .collect();
        let psf = measured_psf(&spectrum, 100).unwrap();
        assert_eq!(psf.len(), 200);
        assert!((psf.norm() - 1.).abs() < 0.5);
        let peak = psf
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 100);
    }

    #[test]
    fn pickled_dictionary_roundtrip() {
        let dir = std::env::temp_dir().join("oct-despeckle-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dict_psf.pkl");
        let value = serde_pickle::to_vec(
            &std::collections::BTreeMap::from([
                ("re".to_string(), vec![1.0, 0.5]),
                ("im".to_string(), vec![0.0, -0.5]),
            ]),
            Default::default(),
        )
        .unwrap();
        std::fs::write(&path, value).unwrap();
        let dict = read_dictionary(&path).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict[1], Complex64::new(0.5, -0.5));
    }
}
