use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use stripe_export::{run_export, ExportConfig, StripeClient};

#[derive(Parser, Debug)]
#[command(about = "Export today's Stripe balance transactions for each company in a roster")]
struct Args {
    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Roster CSV (name, API key, output folder)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Folder receiving one sub-folder per company
    #[arg(long)]
    output: Option<PathBuf>,

    /// strftime template for dates and file names, e.g. %Y-%m-%d
    #[arg(long)]
    date_format: Option<String>,

    /// Prefix of every export file name
    #[arg(long)]
    prefix: Option<String>,

    /// Processor API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Companies exported at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Transactions requested per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ExportConfig> {
        let mut config = match &self.config {
            Some(path) => ExportConfig::load(path)?,
            None => ExportConfig::default(),
        };

        if let Some(input) = self.input {
            config.input_file = input;
        }
        if let Some(output) = self.output {
            config.output_folder = output;
        }
        if let Some(date_format) = self.date_format {
            config.date_format = date_format;
        }
        if let Some(prefix) = self.prefix {
            config.file_name_prefix = prefix;
        }
        if let Some(api_base) = self.api_base {
            config.api_base = api_base;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.request_timeout_secs = timeout_secs;
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    // File logging is optional; stderr always gets the diagnostics
    let (file_layer, _guard) = match args.log_dir.take() {
        Some(log_dir) => {
            fs::create_dir_all(&log_dir)
                .with_context(|| format!("Creating log directory {:?}", log_dir))?;
            let datetime = Local::now().format("%Y%m%d_%H%M%S");
            let file_appender =
                tracing_appender::rolling::never(&log_dir, format!("stripe_export_{}.log", datetime));
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = args.into_config()?;
    config.validate()?;

    let client = StripeClient::new(&config)?;
    run_export(&config, &client, Utc::now()).await?;

    Ok(())
}
