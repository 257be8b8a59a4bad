use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::fetcher::{fetch_transactions, BalanceApi};
use crate::models::{RosterEntry, TimeWindow};
use crate::projector::project;
use crate::roster::RosterReader;
use crate::window::day_window;
use crate::writer::ExportWriter;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::pin::pin;
use std::time::Instant;
use tracing::{error, info, warn};

/// Totals for one export run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub exported: usize,
    pub failed: usize,
    pub skipped_rows: usize,
    pub rows_written: usize,
}

/// Settings shared by every company in a run
struct RunContext<'a> {
    config: &'a ExportConfig,
    window: TimeWindow,
    file_name: String,
}

/// Fail fast when the roster or the output root is missing
pub fn check_preconditions(config: &ExportConfig) -> Result<()> {
    if !config.input_file.is_file() {
        return Err(ExportError::InputUnavailable(config.input_file.clone()));
    }
    if !config.output_folder.is_dir() {
        return Err(ExportError::OutputUnavailable(config.output_folder.clone()));
    }
    Ok(())
}

/// Export today's transactions for every company in the roster.
///
/// `now` anchors both the query window and the output file date. Only startup
/// failures are returned; row and company failures are logged and counted.
pub async fn run_export<A>(config: &ExportConfig, api: &A, now: DateTime<Utc>) -> Result<RunSummary>
where
    A: BalanceApi + ?Sized,
{
    config.validate()?;
    check_preconditions(config)?;

    let start_time = Instant::now();
    let ctx = RunContext {
        config,
        window: day_window(now),
        file_name: config.file_name(&now.format(&config.date_format).to_string()),
    };
    info!(
        "Exporting transactions created in [{}, {}) from {:?} into {:?}",
        ctx.window.start, ctx.window.end, config.input_file, config.output_folder
    );

    let roster = RosterReader::open(&config.input_file)?;
    let mut skipped_rows = 0;
    // Each company owns its folder; later rows naming a taken folder are skipped
    let mut claimed_folders = HashSet::new();

    let outcomes: Vec<Result<usize>> = stream::iter(roster.filter_map(|item| match item {
        Ok(entry) if !claimed_folders.insert(entry.output_folder.to_lowercase()) => {
            let e = ExportError::MalformedInput {
                line: entry.line,
                reason: format!(
                    "output folder '{}' for '{}' is already used by another company",
                    entry.output_folder, entry.display_name
                ),
            };
            warn!("Skipping roster row: {}", e);
            skipped_rows += 1;
            None
        }
        Ok(entry) => Some(entry),
        Err(e @ ExportError::InputReadFailure(_)) => {
            error!("Something wrong with input file {:?}: {}", config.input_file, e);
            None
        }
        Err(e) => {
            warn!("Skipping roster row: {}", e);
            skipped_rows += 1;
            None
        }
    }))
    .map(|entry| export_company(&ctx, api, entry))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let mut summary = RunSummary {
        skipped_rows,
        ..RunSummary::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(rows) => {
                summary.exported += 1;
                summary.rows_written += rows;
            }
            Err(_) => summary.failed += 1,
        }
    }

    info!(
        "Run finished in {:.2?}: {} companies exported, {} failed, {} roster rows skipped, {} rows written",
        start_time.elapsed(),
        summary.exported,
        summary.failed,
        summary.skipped_rows,
        summary.rows_written
    );

    Ok(summary)
}

/// Fetch and write one company's file; failures are logged here and returned
/// only for counting.
async fn export_company<A>(ctx: &RunContext<'_>, api: &A, entry: RosterEntry) -> Result<usize>
where
    A: BalanceApi + ?Sized,
{
    info!("Processing company name: {}", entry.display_name);

    let result = write_company_file(ctx, api, &entry).await;
    match &result {
        Ok(rows) => info!("Wrote {} rows for {}", rows, entry.display_name),
        Err(e) => error!("Export failed for {}: {}", entry.display_name, e),
    }
    result
}

async fn write_company_file<A>(ctx: &RunContext<'_>, api: &A, entry: &RosterEntry) -> Result<usize>
where
    A: BalanceApi + ?Sized,
{
    let mut writer = ExportWriter::create(
        &ctx.config.output_folder,
        &entry.output_folder,
        &ctx.file_name,
    )?;

    let mut transactions = pin!(fetch_transactions(api, &entry.api_credential, ctx.window));
    while let Some(tx) = transactions.next().await {
        let tx = tx?;
        let (amount_row, fee_row) = project(&tx, &ctx.config.date_format)?;
        writer.write_pair(&amount_row, &fee_row)?;
    }

    writer.finish()
}
