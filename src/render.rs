//! Manuscript figure rendering
//!
//! Multi-panel figures are composed with `plotters`; `complot` covers the
//! single-panel quick looks. Presentation defaults travel in an explicit
//! [`RenderConfig`], there is no process-wide plotting state.

use nalgebra::DMatrix;
use plotters::prelude::*;

use crate::{bscan::Roi, psf::PsfAnalysis};

/// Presentation defaults shared by the manuscript figures
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Displayed dynamic range (black level, white level) [dB]
    pub db_range: (f64, f64),
    /// Figure size [pixels]
    pub size: (u32, u32),
}
impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            db_range: (5., 55.),
            size: (1600, 900),
        }
    }
}
impl RenderConfig {
    pub fn db_range(self, black: f64, white: f64) -> Self {
        Self {
            db_range: (black, white),
            ..self
        }
    }
}

/// Grayscale of a dB value clipped to the displayed range
pub fn gray(value: f64, (black, white): (f64, f64)) -> RGBColor {
    let t = ((value - black) / (white - black)).clamp(0., 1.);
    let c = colorous::GREYS.eval_continuous(1. - t);
    RGBColor(c.r, c.g, c.b)
}

/// Overlays of a B-scan panel
#[derive(Default)]
pub struct Decor<'a> {
    /// A-line marker column
    pub a_line: Option<usize>,
    /// Region-of-interest outline
    pub roi: Option<&'a Roi>,
    /// Fidelity weights; speckle regions (weight < 1) are tinted orange
    pub speckle: Option<&'a DMatrix<f64>>,
}

/// dB B-scan panel with optional A-line marker, ROI outline and speckle tint
pub fn draw_bscan<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    image: &DMatrix<f64>,
    cfg: &RenderConfig,
    title: &str,
    decor: &Decor,
) {
    let area = area.titled(title, ("sans-serif", 18)).unwrap();
    let (rows, cols) = image.shape();
    let mut chart = ChartBuilder::on(&area)
        .build_cartesian_2d(0f64..cols as f64, rows as f64..0f64)
        .unwrap();
    chart
        .draw_series((0..rows).flat_map(|r| {
            (0..cols).map(move |c| {
                Rectangle::new(
                    [(c as f64, r as f64), (c as f64 + 1., r as f64 + 1.)],
                    gray(image[(r, c)], cfg.db_range).filled(),
                )
            })
        }))
        .unwrap();
    if let Some(weights) = decor.speckle {
        let tint = RGBColor(255, 165, 0).mix(0.35).filled();
        chart
            .draw_series((0..rows).flat_map(|r| {
                (0..cols)
                    .filter(move |&c| weights[(r, c)] < 1.)
                    .map(move |c| {
                        Rectangle::new(
                            [(c as f64, r as f64), (c as f64 + 1., r as f64 + 1.)],
                            tint,
                        )
                    })
            }))
            .unwrap();
    }
    let plotting = chart.plotting_area();
    if let Some(index) = decor.a_line {
        plotting
            .draw(&PathElement::new(
                vec![(index as f64, 0.), (index as f64, rows as f64)],
                RGBColor(255, 165, 0).stroke_width(1),
            ))
            .unwrap();
    }
    if let Some(roi) = decor.roi {
        plotting
            .draw(&Rectangle::new(
                [
                    (roi.x as f64, roi.y as f64),
                    ((roi.x + roi.width) as f64, (roi.y + roi.height) as f64),
                ],
                WHITE.stroke_width(1),
            ))
            .unwrap();
    }
}

/// Region-of-interest crop panel with the white pointer arrow and the red
/// circle of the manuscript
pub fn draw_roi_crop<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    crop: &DMatrix<f64>,
    cfg: &RenderConfig,
) {
    let (rows, cols) = crop.shape();
    let mut chart = ChartBuilder::on(area)
        .build_cartesian_2d(0f64..cols as f64, rows as f64..0f64)
        .unwrap();
    chart
        .draw_series((0..rows).flat_map(|r| {
            (0..cols).map(move |c| {
                Rectangle::new(
                    [(c as f64, r as f64), (c as f64 + 1., r as f64 + 1.)],
                    gray(crop[(r, c)], cfg.db_range).filled(),
                )
            })
        }))
        .unwrap();
    let plotting = chart.plotting_area();
    // annotation landmarks, in crop coordinates relative to a 100x80 region
    let (sx, sy) = (cols as f64 / 100., rows as f64 / 80.);
    arrow(plotting, (60. * sx, 5. * sy), (72.5 * sx, 10. * sy), &WHITE);
    plotting
        .draw(&Circle::new(
            (80. * sx, 55. * sy),
            (15. * sx.min(sy)) as i32,
            RED.stroke_width(1),
        ))
        .unwrap();
}

/// Line-profile panel (normalized magnitude against axial depth)
pub fn draw_profile<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    profile: &[f64],
    y_max: f64,
    y_label: &str,
) {
    let mut chart = ChartBuilder::on(area)
        .set_label_area_size(LabelAreaPosition::Left, 40)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(5)
        .build_cartesian_2d(0f64..profile.len() as f64, 0f64..y_max)
        .unwrap();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("axial depth [pixels]")
        .y_desc(y_label)
        .draw()
        .unwrap();
    chart
        .draw_series(LineSeries::new(
            profile.iter().enumerate().map(|(i, &y)| (i as f64, y)),
            &BLUE,
        ))
        .unwrap();
}

/// Annotated dB PSF trace: the sidelobe-suppression arrow next to the
/// sidelobe and the dynamic-range arrow over the background
pub fn draw_psf_trace<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    analysis: &PsfAnalysis,
    title: &str,
) {
    let area = area.titled(title, ("sans-serif", 18)).unwrap();
    let y_max = analysis.peak.value * 1.1;
    let mut chart = ChartBuilder::on(&area)
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(5)
        .build_cartesian_2d(0f64..analysis.db_trace.len() as f64, 0f64..y_max)
        .unwrap();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("axial depth [pixels]")
        .y_desc("20 log(magnitude) [dB]")
        .draw()
        .unwrap();
    chart
        .draw_series(LineSeries::new(
            analysis
                .db_trace
                .iter()
                .enumerate()
                .map(|(i, &y)| (i as f64, y)),
            &BLUE,
        ))
        .unwrap();

    let plotting = chart.plotting_area();
    let thin_red = RED.stroke_width(1);
    let x = analysis.sidelobe.index as f64;
    let offset = 10.;
    // sidelobe suppression
    for y in [analysis.peak.value, analysis.sidelobe.value] {
        plotting
            .draw(&PathElement::new(
                vec![(x - offset, y), (x + offset, y)],
                thin_red,
            ))
            .unwrap();
    }
    arrow(
        plotting,
        (x - offset / 2., analysis.peak.value),
        (x - offset / 2., analysis.sidelobe.value),
        &RED,
    );
    plotting
        .draw(&Text::new(
            format!("PSF - sidelobe: {:.2} dB", analysis.sidelobe_suppression()),
            (x + offset, analysis.sidelobe.value + 2.),
            ("sans-serif", 13).into_font().color(&RED),
        ))
        .unwrap();
    // dynamic range, drawn away from the peak
    let x = (analysis.peak.index as f64 + offset * 10.)
        .min(analysis.db_trace.len() as f64 - offset * 2.);
    for y in [analysis.peak.value, analysis.background] {
        plotting
            .draw(&PathElement::new(
                vec![(x - offset, y), (x + offset, y)],
                thin_red,
            ))
            .unwrap();
    }
    arrow(
        plotting,
        (x, analysis.peak.value),
        (x, analysis.background),
        &RED,
    );
    plotting
        .draw(&Text::new(
            format!("PSF - background: {:.2} dB", analysis.dynamic_range()),
            (x + offset / 2., (analysis.peak.value + analysis.background) / 2.),
            ("sans-serif", 13).into_font().color(&RED),
        ))
        .unwrap();
}

/// Overlaid magnitude (or dB) traces with a legend
pub fn draw_traces<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    traces: &[(&str, &[f64])],
    title: &str,
    y_label: &str,
) {
    let area = area.titled(title, ("sans-serif", 18)).unwrap();
    let x_max = traces.iter().map(|(_, t)| t.len()).max().unwrap_or(1) as f64;
    let y_max = traces
        .iter()
        .flat_map(|(_, t)| t.iter().cloned())
        .fold(f64::NEG_INFINITY, f64::max)
        * 1.1;
    let mut chart = ChartBuilder::on(&area)
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(5)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)
        .unwrap();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("axial depth [pixels]")
        .y_desc(y_label)
        .draw()
        .unwrap();
    let mut colors = colorous::TABLEAU10.iter().cycle();
    for (label, trace) in traces {
        let c = colors.next().unwrap();
        let rgb = RGBColor(c.r, c.g, c.b);
        chart
            .draw_series(LineSeries::new(
                trace.iter().enumerate().map(|(i, &y)| (i as f64, y)),
                &rgb,
            ))
            .unwrap()
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], rgb));
    }
    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .unwrap();
}

/// Double-headed arrow between two points, heads sized from the span
fn arrow<DB: DrawingBackend>(
    plotting: &DrawingArea<
        DB,
        plotters::coord::cartesian::Cartesian2d<
            plotters::coord::types::RangedCoordf64,
            plotters::coord::types::RangedCoordf64,
        >,
    >,
    from: (f64, f64),
    to: (f64, f64),
    color: &RGBColor,
) {
    let style = color.stroke_width(1);
    plotting
        .draw(&PathElement::new(vec![from, to], style))
        .unwrap();
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0. {
        return;
    }
    let (ux, uy) = (dx / len, dy / len);
    let head = len * 0.06;
    for (tip, sign) in [(to, -1.), (from, 1.)] {
        for side in [-1., 1.] {
            // 30 degrees off the shaft
            let hx = sign * (ux * 0.866 + side * uy * 0.5) * head;
            let hy = sign * (uy * 0.866 - side * ux * 0.5) * head;
            plotting
                .draw(&PathElement::new(
                    vec![tip, (tip.0 + hx, tip.1 + hy)],
                    style,
                ))
                .unwrap();
        }
    }
}

/// complot quick look of a dB trace
pub fn trace_quicklook(db_trace: &[f64], filename: &str) {
    let config = complot::Config::new()
        .filename(filename.to_string())
        .xaxis(complot::Axis::new().label("axial depth [pixels]"))
        .yaxis(complot::Axis::new().label("20 log(magnitude) [dB]"));
    let _: complot::Plot = (
        db_trace
            .iter()
            .enumerate()
            .map(|(i, &y)| (i as f64, vec![y])),
        Some(config),
    )
        .into();
}

/// complot quick look of a dB B-scan
pub fn bscan_quicklook(image: &DMatrix<f64>, filename: &str) {
    let filename = filename.to_string();
    let data: Vec<f64> = (0..image.nrows())
        .flat_map(|r| (0..image.ncols()).map(move |c| image[(r, c)]))
        .collect();
    let _: complot::Heatmap = (
        (data.as_slice(), (image.nrows(), image.ncols())),
        complot::complot!(filename),
    )
        .into();
}
