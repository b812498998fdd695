mod config;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use archivist_engine::{
    ensure_output_dir, ChromeDriverLauncher, CommandLoop, JobRegistry, JsonExportWriter,
    WriterPacketSink,
};
use clap::Parser;
use engine_logging::{engine_info, engine_warn};

use config::{Cli, ServerConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_overrides(&cli);

    let log_file = engine_logging::initialize(&config.log_settings(cli.debug))
        .with_context(|| format!("failed to open log directory {}", config.log_dir.display()))?;
    engine_info!("archivist {} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = log_file {
        engine_info!("logging to {}", path.display());
    }

    ensure_output_dir(&config.export_dir).with_context(|| {
        format!("export directory {} is unusable", config.export_dir.display())
    })?;
    engine_info!("exporting to {}", config.export_dir.display());

    // Stdout is the protocol channel; logs go to stderr and the log file.
    let registry = JobRegistry::new(
        Arc::new(ChromeDriverLauncher::new(config.driver_settings())),
        Arc::new(JsonExportWriter::new(config.export_dir.clone())),
        Arc::new(WriterPacketSink::new(io::stdout())),
        config.job_settings(),
    );
    let summary = CommandLoop::new(registry).run(io::stdin().lock());

    if summary.jobs_torn_down > 0 {
        engine_warn!("{} jobs were still running at exit", summary.jobs_torn_down);
    }
    engine_info!("archivist stopped ({:?})", summary.reason);
    Ok(())
}
