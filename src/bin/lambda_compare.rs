//! Regularization sweep figure
//!
//! Sparse reconstructions of the same middle-ear B-scan with the same learned
//! dictionary for increasing values of the regularization weight λ. One
//! column per λ, next to the reference: the full B-scan, the homogeneous ROI
//! crop and the marked A-line profile.

use std::path::PathBuf;

use indicatif::ParallelProgressIterator;
use plotters::prelude::*;
use rayon::prelude::*;
use structopt::StructOpt;

use oct_despeckle::{
    bscan::{self, Roi},
    dataset::{to_l2_normed, DatasetLoader},
    render::{self, Decor},
    sparse::{despeckle, CachedSolver, Despeckled, Masking, SparseParams},
};

#[derive(Debug, StructOpt)]
#[structopt(name = "lambda-compare", about = "Sparse reconstruction λ sweep")]
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
    /// Regularization weights to sweep
    #[structopt(long, use_delimiter = true, default_value = "0.01,0.05,0.1,0.15,0.2")]
    lmbda: Vec<f64>,
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
    #[structopt(long, use_delimiter = true, default_value = "5,55")]
    db_range: Vec<f64>,
    /// Output figure
    #[structopt(short, long, parse(from_os_str), default_value = "lambda-compare.png")]
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

    let s_log = bscan::log_magnitude(&dataset.bscan);
    let (_, snorm) = to_l2_normed(&dataset.bscan);
    let s_line: Vec<f64> = snorm.column(index).iter().map(|x| x.norm()).collect();
    let y_max = s_line.iter().cloned().fold(f64::NEG_INFINITY, f64::max) * 1.1;

    let results: Vec<Despeckled> = opt
        .lmbda
        .par_iter()
        .progress_count(opt.lmbda.len() as u64)
        .map(|&lmbda| {
            despeckle(
                &solver,
                &dataset.bscan,
                &dataset.dictionary,
                &SparseParams {
                    lmbda,
                    mask_lmbda: opt.mask_lmbda,
                    speckle_weight: opt.speckle_weight,
                },
                &Masking::default(),
            )
        })
        .collect::<Result<_, _>>()?;

    let cfg = render::RenderConfig::default().db_range(opt.db_range[0], opt.db_range[1]);
    let roi = Roi::new(125, 120, 100, 80);
    let ncols = opt.lmbda.len() + 1;

    let fig = BitMapBackend::new(&opt.output, cfg.size).into_drawing_area();
    fig.fill(&WHITE)?;
    let panels = fig.split_evenly((3, ncols));

    let decor = Decor {
        a_line: Some(index),
        roi: Some(&roi),
        ..Default::default()
    };
    render::draw_bscan(&panels[0], &s_log, &cfg, "reference", &decor);
    render::draw_roi_crop(&panels[ncols], &roi.crop(&s_log), &cfg);
    render::draw_profile(&panels[2 * ncols], &s_line, y_max, "normalized magnitude [a.u.]");

    for (i, (&lmbda, result)) in opt.lmbda.iter().zip(&results).enumerate() {
        let x_log = bscan::log_magnitude(&result.image);
        let (_, xnorm) = to_l2_normed(&result.image);
        let x_line: Vec<f64> = xnorm.column(index).iter().map(|x| x.norm()).collect();
        let title = format!("λ = {:.2}, ω = {:.1}", lmbda, opt.speckle_weight);
        render::draw_bscan(&panels[i + 1], &x_log, &cfg, &title, &decor);
        render::draw_roi_crop(&panels[ncols + i + 1], &roi.crop(&x_log), &cfg);
        render::draw_profile(&panels[2 * ncols + i + 1], &x_line, y_max, "");
    }
    fig.present()?;
    log::info!("saved {:?}", opt.output);
    Ok(())
}
