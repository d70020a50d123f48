use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use beatfetch::audio::analyze::Analyzer;
use beatfetch::config::Config;
use beatfetch::jobs::{reaper, store::JobStore};
use beatfetch::pipeline::ExternalPipeline;
use beatfetch::server::{self, AppState};

#[tokio::main]
async fn main() -> beatfetch::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    let config = Config::parse();
    info!("beatfetch {} starting", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(JobStore::new());
    reaper::spawn(store.clone(), config.reap_interval(), config.retention());

    let state = Arc::new(AppState {
        store,
        analyzer: Arc::new(Analyzer::new()),
        pipeline: Arc::new(ExternalPipeline::new(&config)),
        temp_root: config.temp_dir(),
    });

    server::serve(&config, state).await
}
