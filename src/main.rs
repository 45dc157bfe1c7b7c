mod app;
mod color;
mod config;
mod data;
mod error;
mod pipeline;
mod processor;
mod render;
mod state;
mod ui;

use anyhow::Context;

use config::AnalysisConfig;
use data::loader::GwoscClient;
use pipeline::Pipeline;
use processor::NativeProcessor;
use render::ViewerRenderer;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AnalysisConfig::default();
    log::debug!(
        "Effective configuration:\n{}",
        serde_json::to_string_pretty(&config).context("serializing configuration")?
    );

    let client = GwoscClient::new(config.gwosc.clone()).context("creating GWOSC client")?;
    let processor = NativeProcessor {
        bandpass_order: config.filter.order,
    };
    let mut renderer = ViewerRenderer::new();

    let results = Pipeline::new(&config, &client, &client, &processor)
        .run(&mut renderer)
        .with_context(|| format!("analysis of {} failed", config.event))?;

    log::info!("Done: {} detectors processed", results.len());
    Ok(())
}
