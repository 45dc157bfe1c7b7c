use eframe::egui::{self, Key, RichText, Ui};

use crate::data::model::TimeSeries;
use crate::render::{Figure, OverlayFigure, SpectrogramFigure};
use crate::state::ViewerState;

// ---------------------------------------------------------------------------
// Top bar – one tab per figure
// ---------------------------------------------------------------------------

pub fn top_bar(ui: &mut Ui, state: &mut ViewerState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("View", |ui: &mut Ui| {
            if ui.button("Reset zoom").clicked() {
                state.reset_view = true;
                ui.close_menu();
            }
            ui.checkbox(&mut state.show_info, "Details panel");
        });

        ui.separator();

        let mut clicked = None;
        for (i, fig) in state.figures.iter().enumerate() {
            let text = RichText::new(fig.title());
            let text = match fig {
                Figure::Overlay(o) => text.color(o.color),
                Figure::Spectrogram(_) => text,
            };
            if ui.selectable_label(state.selected == i, text).clicked() {
                clicked = Some(i);
            }
        }
        if let Some(i) = clicked {
            state.select(i);
        }
    });
}

/// Arrow keys cycle through figures, `R` resets the zoom.
pub fn handle_keys(ctx: &egui::Context, state: &mut ViewerState) {
    ctx.input(|input| {
        if input.key_pressed(Key::ArrowRight) {
            state.select_next();
        }
        if input.key_pressed(Key::ArrowLeft) {
            state.select_previous();
        }
        if input.key_pressed(Key::R) {
            state.reset_view = true;
        }
    });
}

// ---------------------------------------------------------------------------
// Right side panel – details of the figure on screen
// ---------------------------------------------------------------------------

pub fn info_panel(ui: &mut Ui, state: &ViewerState) {
    ui.heading("Details");
    ui.separator();

    let Some(fig) = state.current() else {
        ui.label("Nothing to show.");
        return;
    };

    let detector = fig.detector();
    egui::Grid::new("detector_info")
        .num_columns(2)
        .striped(true)
        .show(ui, |ui: &mut Ui| {
            ui.label("Detector");
            ui.label(detector.code());
            ui.end_row();
            ui.label("Site");
            ui.label(detector.site());
            ui.end_row();
        });
    ui.add_space(8.0);

    match fig {
        Figure::Overlay(o) => overlay_info(ui, o),
        Figure::Spectrogram(s) => spectrogram_info(ui, s, state),
    }
}

fn series_rows(ui: &mut Ui, name: &str, series: &TimeSeries) {
    ui.strong(name);
    ui.end_row();
    ui.label("Start");
    ui.label(format!("{:.4}", series.t0()));
    ui.end_row();
    ui.label("Duration");
    ui.label(format!("{} s", series.span().duration()));
    ui.end_row();
    ui.label("Sample rate");
    ui.label(format!("{} Hz", series.sample_rate()));
    ui.end_row();
    ui.label("RMS");
    ui.label(format!("{:.3e}", series.rms()));
    ui.end_row();
}

fn overlay_info(ui: &mut Ui, fig: &OverlayFigure) {
    egui::Grid::new("overlay_info")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Epoch");
            ui.label(format!("{}", fig.epoch));
            ui.end_row();
            series_rows(ui, &fig.top.ylabel, &fig.top.series);
            series_rows(ui, &fig.bottom.ylabel, &fig.bottom.series);
        });
}

fn spectrogram_info(ui: &mut Ui, fig: &SpectrogramFigure, state: &ViewerState) {
    let qgram = &fig.qgram;
    egui::Grid::new("qscan_info")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Q");
            ui.label(format!("{:.2}", qgram.q));
            ui.end_row();
            ui.label("Peak time");
            ui.label(format!("{:.4} s", qgram.peak.time - fig.epoch));
            ui.end_row();
            ui.label("Peak frequency");
            ui.label(format!("{:.1} Hz", qgram.peak.frequency));
            ui.end_row();
            ui.label("Peak energy");
            ui.label(format!("{:.2}", qgram.peak.energy));
            ui.end_row();
        });

    if let Some(cmap) = state.color_map(state.selected) {
        ui.add_space(8.0);
        ui.strong(&fig.colorbar_label);
        for (value, color) in cmap.legend_entries(6).into_iter().rev() {
            ui.label(RichText::new(format!("■ {value:.1}")).color(color));
        }
    }
}
