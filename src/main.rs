use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Builder;
use log::{info, warn};

use cyanopica::config::WatchConfig;
use cyanopica::workflow::types::StatusEvent;
use cyanopica::workflow::watcher::start_watching;

fn initialize_logger() {
    Builder::new()
        .format(|buf, record| {
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "{} {}{}{} {} {}",
                buf.timestamp(),
                level_style.render(),
                record.level(),
                level_style.render_reset(),
                record.target(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn render_status(event: StatusEvent) {
    match event {
        StatusEvent::Detected { path } => info!("Detected new file: {:?}", path),
        StatusEvent::Skipped { path, reason } => info!("Skipping {:?}: {}", path, reason),
        StatusEvent::Succeeded { output, .. } => info!("Successfully processed: {:?}", output),
        StatusEvent::Failed { path, detail } => warn!("Failed to process {:?}: {}", path, detail),
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    initialize_logger();

    let config: WatchConfig = envy::prefixed("CAPTURE_")
        .from_env()
        .context("failed to read CAPTURE_* configuration from the environment")?;

    info!("Source:   {:?}", config.source_folder);
    info!("Output:   {:?}", config.output_folder);

    let session = start_watching(config, Arc::new(render_status))?;
    info!("Watching for new images. Press Ctrl+C to stop.");

    session.join();
    Ok(())
}
