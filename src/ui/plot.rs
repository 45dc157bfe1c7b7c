use eframe::egui::{self, vec2, Color32, ColorImage, TextureOptions, Ui};
use egui_plot::{GridMark, Line, Plot, PlotBounds, PlotImage, PlotPoint, PlotPoints};

use crate::color::EnergyColorMap;
use crate::data::model::TimeSeries;
use crate::data::qtransform::QGram;
use crate::render::{time_axis_label, Figure, OverlayFigure, SeriesPanel, SpectrogramFigure};
use crate::state::ViewerState;

/// Extra samples drawn on each side of the visible window so panning
/// does not show an empty edge straight away.
const PAD_SECONDS: f64 = 0.5;

/// Colour bar resolution, in texels.
const COLORBAR_STEPS: usize = 100;

// ---------------------------------------------------------------------------
// Central panel
// ---------------------------------------------------------------------------

/// Draw the selected figure.
pub fn figure(ui: &mut Ui, state: &mut ViewerState) {
    let index = state.selected;
    let reset = state.reset_view;
    match state.figures.get(index) {
        None => {
            ui.centered_and_justified(|ui: &mut Ui| {
                ui.heading("No figures were produced");
            });
        }
        Some(Figure::Overlay(fig)) => overlay(ui, fig, index, reset),
        Some(Figure::Spectrogram(fig)) => {
            let cmap = EnergyColorMap::new(fig.energy_range.0, fig.energy_range.1);
            let ctx = ui.ctx().clone();
            let texture = state
                .textures
                .entry(index)
                .or_insert_with(|| {
                    ctx.load_texture(
                        format!("qscan-{index}"),
                        spectrogram_image(&fig.qgram, &cmap),
                        TextureOptions::LINEAR,
                    )
                })
                .clone();
            let bar = colorbar_texture(&ctx, &mut state.colorbar, &cmap);
            spectrogram(ui, fig, &texture, &bar, &cmap, index, reset);
        }
    }
    state.reset_view = false;
}

/// The colour bar gradient, uploaded on first use. Every scale shares it:
/// only the axis values differ between figures.
fn colorbar_texture(
    ctx: &egui::Context,
    slot: &mut Option<egui::TextureHandle>,
    cmap: &EnergyColorMap,
) -> egui::TextureHandle {
    slot.get_or_insert_with(|| {
        ctx.load_texture(
            "colorbar",
            colorbar_image(cmap, COLORBAR_STEPS),
            TextureOptions::NEAREST,
        )
    })
    .clone()
}

// ---------------------------------------------------------------------------
// Overlay: two stacked panels sharing the time axis
// ---------------------------------------------------------------------------

fn overlay(ui: &mut Ui, fig: &OverlayFigure, index: usize, reset: bool) {
    ui.vertical_centered(|ui: &mut Ui| ui.heading(&fig.title));
    let link = format!("overlay-{index}");
    let height = (ui.available_height() - ui.spacing().item_spacing.y) / 2.0;

    series_panel(ui, fig, &fig.top, &format!("{link}-top"), &link, height, false, reset);
    series_panel(ui, fig, &fig.bottom, &format!("{link}-bottom"), &link, height, true, reset);
}

#[allow(clippy::too_many_arguments)]
fn series_panel(
    ui: &mut Ui,
    fig: &OverlayFigure,
    panel: &SeriesPanel,
    id: &str,
    link: &str,
    height: f32,
    show_time_axis: bool,
    reset: bool,
) {
    let epoch = fig.epoch;
    let (x0, x1) = (fig.xlim.0 - epoch, fig.xlim.1 - epoch);
    let points = windowed_points(&panel.series, epoch, x0 - PAD_SECONDS, x1 + PAD_SECONDS);
    let (y0, y1) = panel
        .ylim
        .unwrap_or_else(|| padded_range(&points, x0, x1));

    let mut plot = Plot::new(id)
        .height(height)
        .link_axis(link.to_string(), [true, false])
        .link_cursor(link.to_string(), [true, false])
        .y_axis_label(panel.ylabel.clone())
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true);
    if show_time_axis {
        plot = plot.x_axis_label(time_axis_label(epoch));
    }

    let color = fig.color;
    plot.show(ui, |plot_ui| {
        if reset {
            plot_ui.set_plot_bounds(PlotBounds::from_min_max([x0, y0], [x1, y1]));
        }
        plot_ui.line(Line::new(PlotPoints::from(points)).color(color).width(1.2));
    });
}

/// Samples of `series` with `lo <= t - epoch <= hi`, as plot points
/// relative to `epoch`.
pub fn windowed_points(series: &TimeSeries, epoch: f64, lo: f64, hi: f64) -> Vec<[f64; 2]> {
    series
        .samples()
        .iter()
        .enumerate()
        .map(|(i, &v)| [series.time_at(i) - epoch, v])
        .filter(|[t, _]| *t >= lo && *t <= hi)
        .collect()
}

/// y range of the points inside `[x0, x1]`, padded by 5 %.
fn padded_range(points: &[[f64; 2]], x0: f64, x1: f64) -> (f64, f64) {
    let (lo, hi) = points
        .iter()
        .filter(|[t, _]| *t >= x0 && *t <= x1)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), [_, v]| {
            (lo.min(*v), hi.max(*v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { lo.abs().max(1e-30) };
    (lo - pad, hi + pad)
}

// ---------------------------------------------------------------------------
// Spectrogram: heatmap with a log10 frequency axis and a colour bar
// ---------------------------------------------------------------------------

/// Rasterize a Q-gram, highest frequency in the top row.
pub fn spectrogram_image(qgram: &QGram, cmap: &EnergyColorMap) -> ColorImage {
    let width = qgram.times.len();
    let height = qgram.frequencies.len();
    let mut img = ColorImage::new([width, height], Color32::TRANSPARENT);
    for fi in 0..height {
        for ti in 0..width {
            img[(ti, height - 1 - fi)] = cmap.color_for(qgram.energy_at(fi, ti));
        }
    }
    img
}

fn frequency_tick(mark: GridMark, _range: &std::ops::RangeInclusive<f64>) -> String {
    let f = 10f64.powf(mark.value);
    if f >= 100.0 {
        format!("{f:.0}")
    } else {
        format!("{f:.1}")
    }
}

fn spectrogram(
    ui: &mut Ui,
    fig: &SpectrogramFigure,
    texture: &egui::TextureHandle,
    bar: &egui::TextureHandle,
    cmap: &EnergyColorMap,
    index: usize,
    reset: bool,
) {
    ui.vertical_centered(|ui: &mut Ui| ui.heading(&fig.title));

    let qgram = &fig.qgram;
    let epoch = fig.epoch;
    let (Some(&t_first), Some(&t_last)) = (qgram.times.first(), qgram.times.last()) else {
        return;
    };
    let (Some(&f_first), Some(&f_last)) = (qgram.frequencies.first(), qgram.frequencies.last())
    else {
        return;
    };
    let (t0, t1) = (t_first - epoch, t_last - epoch);
    let (y0, y1) = (f_first.log10(), f_last.log10());

    let image = PlotImage::new(
        texture,
        PlotPoint::new((t0 + t1) / 2.0, (y0 + y1) / 2.0),
        vec2((t1 - t0) as f32, (y1 - y0) as f32),
    );
    let (x0, x1) = (fig.xlim.0 - epoch, fig.xlim.1 - epoch);
    let height = ui.available_height();
    let colorbar_width = 90.0;
    let width = ui.available_width() - colorbar_width - ui.spacing().item_spacing.x;

    ui.horizontal(|ui: &mut Ui| {
        Plot::new(format!("qscan-{index}"))
            .width(width)
            .height(height)
            .x_axis_label(time_axis_label(epoch))
            .y_axis_label(fig.ylabel.clone())
            .y_axis_formatter(frequency_tick)
            .label_formatter(|_name, point| {
                format!("{:.3} s\n{:.1} Hz", point.x, 10f64.powf(point.y))
            })
            .show_grid(false)
            .show(ui, |plot_ui| {
                if reset {
                    plot_ui.set_plot_bounds(PlotBounds::from_min_max([x0, y0], [x1, y1]));
                }
                plot_ui.image(image);
            });
        colorbar(ui, fig, bar, cmap, index, height);
    });
}

/// Vertical gradient, `vmax` in the top texel.
pub fn colorbar_image(cmap: &EnergyColorMap, steps: usize) -> ColorImage {
    let mut img = ColorImage::new([1, steps], Color32::TRANSPARENT);
    for (i, (_, color)) in cmap.legend_entries(steps).into_iter().enumerate() {
        img[(0, steps - 1 - i)] = color;
    }
    img
}

fn colorbar(
    ui: &mut Ui,
    fig: &SpectrogramFigure,
    texture: &egui::TextureHandle,
    cmap: &EnergyColorMap,
    index: usize,
    height: f32,
) {
    let span = cmap.vmax - cmap.vmin;
    let bar = PlotImage::new(
        texture,
        PlotPoint::new(0.5, cmap.vmin + span / 2.0),
        vec2(1.0, span as f32),
    );

    Plot::new(format!("colorbar-{index}"))
        .width(ui.available_width())
        .height(height)
        .show_x(false)
        .show_axes([false, true])
        .show_grid(false)
        .y_axis_label(fig.colorbar_label.clone())
        .allow_zoom(false)
        .allow_scroll(false)
        .allow_boxed_zoom(false)
        .allow_drag(false)
        .show(ui, |plot_ui| {
            plot_ui.set_plot_bounds(PlotBounds::from_min_max([0.0, cmap.vmin], [1.0, cmap.vmax]));
            plot_ui.image(bar);
        });
}
