//! Measured vs learned PSF comparison
//!
//! Upper row: magnitudes of the measured PSF, of the learned PSF and of both
//! overlaid. Lower row: the corresponding dB traces annotated with the
//! sidelobe-suppression and dynamic-range arrows. A second, single-panel
//! figure shows the measured PSF alone.

use std::path::PathBuf;

use num_complex::Complex64;
use plotters::prelude::*;
use structopt::StructOpt;

use oct_despeckle::{
    dataset,
    psf::{self, PsfError},
    render, PsfAnalysis, Scale,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "psf-comparison", about = "Measured vs learned PSF characterization")]
struct Opt {
    /// Path to the dataset repository
    #[structopt(long, parse(from_os_str), default_value = "data")]
    data: PathBuf,
    /// Mirror measurement stack for the measured PSF
    #[structopt(long, default_value = "mirror_clean.npy")]
    mirror: String,
    /// Learned dictionary name
    #[structopt(long, default_value = "nail")]
    dictionary: String,
    /// Half-width of the measured PSF crop [samples]
    #[structopt(long, default_value = "165")]
    half_width: usize,
    /// Sidelobe search radius [samples]
    #[structopt(long, default_value = "20")]
    search_window: usize,
    /// Background exclusion radius [samples]
    #[structopt(long, default_value = "100")]
    exclude_window: usize,
    /// Average the background on linear magnitudes instead of dB
    #[structopt(long)]
    linear: bool,
    /// Comparison figure
    #[structopt(short, long, parse(from_os_str), default_value = "psf-comparison.png")]
    output: PathBuf,
    /// Single-panel measured PSF figure
    #[structopt(long, parse(from_os_str), default_value = "measured-psf.svg")]
    single: PathBuf,
}

/// Doubles the search window until a sidelobe turns up
fn analyze_relaxed(
    label: &str,
    trace: &[Complex64],
    opt: &Opt,
    scale: Scale,
) -> anyhow::Result<PsfAnalysis> {
    let mut window = opt.search_window;
    loop {
        match psf::analyze(trace, window, opt.exclude_window, scale) {
            Err(PsfError::NoSidelobeFound(w)) if 2 * window < trace.len() => {
                log::warn!("{label}: no sidelobe within {w} samples, relaxing the search window");
                window *= 2;
            }
            Ok(analysis) => {
                psf::report(label, &analysis);
                return Ok(analysis);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let scale = if opt.linear {
        Scale::Linear
    } else {
        Scale::Decibel
    };

    let spectrum = dataset::mean_spectrum(opt.data.join(&opt.mirror))?;
    let measured = dataset::measured_psf(&spectrum, opt.half_width)?;
    let learned = dataset::read_dictionary(opt.data.join(format!("{}_psf.pkl", opt.dictionary)))?;

    let measured_analysis = analyze_relaxed("measured PSF", measured.as_slice(), &opt, scale)?;
    let learned_analysis = analyze_relaxed("learned PSF", learned.as_slice(), &opt, scale)?;

    let measured_mag: Vec<f64> = measured.iter().map(|x| x.norm()).collect();
    let learned_mag: Vec<f64> = learned.iter().map(|x| x.norm()).collect();

    let cfg = render::RenderConfig::default();
    let fig = BitMapBackend::new(&opt.output, cfg.size).into_drawing_area();
    fig.fill(&WHITE)?;
    let panels = fig.split_evenly((2, 3));
    render::draw_traces(
        &panels[0],
        &[("measured PSF", measured_mag.as_slice())],
        "measured PSF",
        "magnitude [a.u.]",
    );
    render::draw_traces(
        &panels[1],
        &[("learned PSF", learned_mag.as_slice())],
        "learned PSF",
        "magnitude [a.u.]",
    );
    render::draw_traces(
        &panels[2],
        &[
            ("measured PSF", measured_mag.as_slice()),
            ("learned PSF", learned_mag.as_slice()),
        ],
        "measured & learned PSF",
        "magnitude [a.u.]",
    );
    render::draw_psf_trace(&panels[3], &measured_analysis, "");
    render::draw_psf_trace(&panels[4], &learned_analysis, "");
    render::draw_traces(
        &panels[5],
        &[
            ("measured PSF", measured_analysis.db_trace.as_slice()),
            ("learned PSF", learned_analysis.db_trace.as_slice()),
        ],
        "",
        "20 log(magnitude) [dB]",
    );
    fig.present()?;
    log::info!("saved {:?}", opt.output);

    let single = SVGBackend::new(&opt.single, cfg.size).into_drawing_area();
    single.fill(&WHITE)?;
    render::draw_psf_trace(
        &single,
        &measured_analysis,
        "averaged axial point spread function (PSF)",
    );
    single.present()?;
    log::info!("saved {:?}", opt.single);

    render::trace_quicklook(
        &measured_analysis.db_trace,
        "measured-psf_quicklook.svg",
    );
    Ok(())
}
