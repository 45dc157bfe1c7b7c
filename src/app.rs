use eframe::egui;

use crate::error::{AnalysisError, Result};
use crate::render::Figure;
use crate::state::ViewerState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct StrainViewerApp {
    pub state: ViewerState,
}

impl StrainViewerApp {
    pub fn new(figures: Vec<Figure>) -> Self {
        Self {
            state: ViewerState::new(figures),
        }
    }
}

impl eframe::App for StrainViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        panels::handle_keys(ctx, &mut self.state);

        // ---- Top panel: figure tabs ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Right side panel: figure details ----
        if self.state.show_info {
            egui::SidePanel::right("info_panel")
                .default_width(240.0)
                .resizable(true)
                .show(ctx, |ui| {
                    panels::info_panel(ui, &self.state);
                });
        }

        // ---- Central panel: the figure ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::figure(ui, &mut self.state);
        });
    }
}

/// Open the viewer window and block until it is closed.
pub fn run_viewer(figures: Vec<Figure>) -> Result<()> {
    log::info!("Opening viewer with {} figures", figures.len());
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 700.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "GW Strain Viewer",
        options,
        Box::new(|_cc| Ok(Box::new(StrainViewerApp::new(figures)))),
    )
    .map_err(|e| AnalysisError::Render(e.to_string()))
}
