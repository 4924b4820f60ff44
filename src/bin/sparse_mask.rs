//! Speckle-mask demonstration figure
//!
//! One middle-ear B-scan worked through the despeckling pipeline: the
//! reference image, the learned PSF magnitude, the dictionary reconstruction
//! ("sparse estimation"), the unweighted sparse-vector image and the weighted
//! one with the speckle segmentation tinted over it, next to the A-line
//! profile.

use std::path::PathBuf;

use plotters::prelude::*;
use structopt::StructOpt;

use oct_despeckle::{
    bscan,
    dataset::{to_l2_normed, DatasetLoader},
    render::{self, Decor},
    sparse::{despeckle, sparse_estimate, CachedSolver, Masking, SparseParams},
};

#[derive(Debug, StructOpt)]
#[structopt(name = "sparse-mask", about = "Speckle-weighted sparse reconstruction demo")]
struct Opt {
    /// Path to the dataset repository
    #[structopt(long, parse(from_os_str), default_value = "data")]
    data: PathBuf,
    /// Dataset name
    #[structopt(long, default_value = "ear")]
    name: String,
    /// Solver output archive
    #[structopt(long, parse(from_os_str), default_value = "data/solver-cache.npz")]
    cache: PathBuf,
    /// Lateral decimation factor
    #[structopt(long, default_value = "20")]
    decimation: usize,
    /// Regularization weight
    #[structopt(long, default_value = "0.05")]
    lmbda: f64,
    /// Regularization weight of the speckle-segmentation pass
    #[structopt(long, default_value = "0.02")]
    mask_lmbda: f64,
    /// Fidelity weight inside speckle regions
    #[structopt(long, default_value = "0.1")]
    speckle_weight: f64,
    /// Marked A-line
    #[structopt(long, default_value = "400")]
    index: usize,
    /// Displayed dynamic range [dB]
    #[structopt(long, use_delimiter = true, default_value = "65,115")]
    db_range: Vec<f64>,
    /// Output figure
    #[structopt(short, long, parse(from_os_str), default_value = "sparse-mask.png")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let dataset = DatasetLoader::default()
        .data_path(&opt.data)
        .decimation(opt.decimation)
        .load(&opt.name)?;
    let index = opt.index.min(dataset.bscan.ncols() - 1);
    let solver = CachedSolver::new(&opt.cache);
    let params = SparseParams {
        lmbda: opt.lmbda,
        mask_lmbda: opt.mask_lmbda,
        speckle_weight: opt.speckle_weight,
    };

    let estimate = sparse_estimate(&solver, &dataset.bscan, &dataset.dictionary, opt.lmbda)?;
    let weighted = despeckle(
        &solver,
        &dataset.bscan,
        &dataset.dictionary,
        &params,
        &Masking::default(),
    )?;
    let speckle_fraction = weighted
        .weights
        .iter()
        .filter(|&&w| w < 1.)
        .count() as f64
        / weighted.weights.len() as f64;
    log::info!(
        "λ = {:.2}, ω = {:.1}: {:.0}% of the B-scan segmented as speckle",
        params.lmbda,
        params.speckle_weight,
        100. * speckle_fraction
    );

    let s_log = bscan::log_magnitude(&dataset.bscan);
    let r_log = bscan::log_magnitude(&estimate.reconstruction);
    let x_log = bscan::log_magnitude(&estimate.coefficients);
    let xw_log = bscan::log_magnitude(&weighted.image);
    let (_, snorm) = to_l2_normed(&dataset.bscan);
    let s_line: Vec<f64> = snorm.column(index).iter().map(|x| x.norm()).collect();
    let d_mag: Vec<f64> = dataset.dictionary.iter().map(|x| x.norm()).collect();

    let cfg = render::RenderConfig::default().db_range(opt.db_range[0], opt.db_range[1]);
    let fig = BitMapBackend::new(&opt.output, cfg.size).into_drawing_area();
    fig.fill(&WHITE)?;
    let panels = fig.split_evenly((2, 3));

    let marked = Decor {
        a_line: Some(index),
        ..Default::default()
    };
    render::draw_bscan(&panels[0], &s_log, &cfg, "(a) reference", &marked);
    render::draw_traces(
        &panels[1],
        &[("learned PSF", d_mag.as_slice())],
        "(b) magnitude of the learned PSF d(z)",
        "magnitude [a.u.]",
    );
    render::draw_bscan(
        &panels[2],
        &r_log,
        &cfg,
        &format!("(c) sparse estimation image, λ = {:.2}", opt.lmbda),
        &Decor::default(),
    );
    render::draw_bscan(
        &panels[3],
        &x_log,
        &cfg,
        &format!("(d) sparse vector image wo/ weighting, λ = {:.2}", opt.lmbda),
        &Decor::default(),
    );
    render::draw_bscan(
        &panels[4],
        &xw_log,
        &cfg,
        &format!(
            "(e) sparse vector image w/ weighting, λ = {:.2}, ω = {:.1}",
            opt.lmbda, opt.speckle_weight
        ),
        &Decor {
            speckle: Some(&weighted.weights),
            ..Default::default()
        },
    );
    let y_max = s_line.iter().cloned().fold(f64::NEG_INFINITY, f64::max) * 1.1;
    render::draw_profile(&panels[5], &s_line, y_max, "normalized magnitude [a.u.]");

    fig.present()?;
    log::info!("saved {:?}", opt.output);

    render::bscan_quicklook(&xw_log, "despeckled_quicklook.png");
    Ok(())
}
