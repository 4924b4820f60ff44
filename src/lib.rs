//! Sparse-coding speckle reduction for optical coherence tomography
//!
//! The crate gathers the analysis and rendering blocks behind the manuscript
//! figures:
//!  - [`psf`]: axial point-spread function characterization (main peak,
//!    sidelobe, background level),
//!  - [`dataset`]: complex B-scan and learned-dictionary loading, A-line
//!    extraction, measured-PSF recovery from mirror spectra,
//!  - [`sparse`]: the interface to the external convolutional basis-pursuit
//!    solver and the two-pass speckle-weighted reconstruction built on it,
//!  - [`bscan`]: dB-image helpers (ROI cropping, median filtering, binary
//!    morphology),
//!  - [`render`] (feature `plot`): multi-panel figure composition.
//!
//! The figure binaries (`psf-comparison`, `lambda-compare`, `omega-compare`,
//! `sparse-mask`) require the `plot` feature.

mod error;

pub mod bscan;
pub mod dataset;
pub mod psf;
#[cfg(feature = "plot")]
pub mod render;
pub mod sparse;

pub use error::Error;
pub use psf::{analyze, PeakRecord, PsfAnalysis, Scale};

/// Smallest magnitude clamped into the decibel conversion
pub const EPS: f64 = 1e-14;

/// Decibel value of a linear magnitude
pub fn to_db(value: f64) -> f64 {
    20. * value.max(EPS).log10()
}
