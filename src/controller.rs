use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::AddressTemplate;
use crate::config::GeocodeConfig;
use crate::errors::AppResult;
use crate::geocode::{GeocodeOutcome, GeocodeService};
use crate::pacing::{PacingState, ProgressCounter, Scheduler, TokioScheduler};
use crate::table::{load_table, write_checkpoint, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    Batch,
    RowError,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    pub rows_completed: usize,
    pub reason: CheckpointReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_rows: usize,
    pub requests: usize,
    pub geocoded: usize,
    pub already_geocoded: usize,
    pub zero_results: usize,
    pub denied: usize,
    pub unhandled: usize,
    pub transport_failures: usize,
    pub rate_limit_hits: u32,
    pub final_delay_ms: u64,
    pub final_wait_time_ms: u64,
    pub checkpoints: Vec<CheckpointRecord>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            total_rows: 0,
            requests: 0,
            geocoded: 0,
            already_geocoded: 0,
            zero_results: 0,
            denied: 0,
            unhandled: 0,
            transport_failures: 0,
            rate_limit_hits: 0,
            final_delay_ms: 0,
            final_wait_time_ms: 0,
            checkpoints: Vec::new(),
        }
    }
}

/// What happens after one evaluation of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowStep {
    Advance { delay: Duration },
    Retry { delay: Duration },
    SkipAndCheckpoint { delay: Duration },
}

/// Drives every row of the table through the geocoder, one request at a time.
pub struct RowController {
    config: GeocodeConfig,
    template: AddressTemplate,
    geocoder: GeocodeService,
    scheduler: Arc<dyn Scheduler>,
    pacing: PacingState,
    progress: ProgressCounter,
    source_path: PathBuf,
    summary: RunSummary,
}

impl RowController {
    pub fn new(config: GeocodeConfig, geocoder: GeocodeService) -> AppResult<Self> {
        Self::with_scheduler(config, geocoder, Arc::new(TokioScheduler))
    }

    pub fn with_scheduler(
        config: GeocodeConfig,
        geocoder: GeocodeService,
        scheduler: Arc<dyn Scheduler>,
    ) -> AppResult<Self> {
        let template = AddressTemplate::parse(&config.address_template)?;
        Ok(Self {
            template,
            geocoder,
            scheduler,
            pacing: PacingState::from_config(&config),
            progress: ProgressCounter::new(config.checkpoint_every_n_rows),
            source_path: config.input_path.clone(),
            summary: RunSummary::new(),
            config,
        })
    }

    pub async fn run(mut self) -> AppResult<RunSummary> {
        let mut table = self.load_source()?;
        let total = table.len();
        self.summary.total_rows = total;
        info!(
            source = %self.source_path.display(),
            output = %self.config.output_path.display(),
            total,
            "starting geocoding run"
        );

        let mut index = 0;
        while index < total {
            match self.evaluate(&mut table, index, total).await? {
                RowStep::Retry { delay } => {
                    self.scheduler.wait(delay).await;
                }
                RowStep::Advance { delay } => {
                    index += 1;
                    self.progress.record();
                    if index >= total {
                        break;
                    }
                    if self.progress.batch_complete() {
                        table = self.checkpoint_and_reload(&table, index, CheckpointReason::Batch)?;
                    } else {
                        self.scheduler.wait(delay).await;
                    }
                }
                RowStep::SkipAndCheckpoint { delay } => {
                    index += 1;
                    self.progress.record();
                    if index >= total {
                        break;
                    }
                    table =
                        self.checkpoint_and_reload(&table, index, CheckpointReason::RowError)?;
                    self.scheduler.wait(delay).await;
                }
            }
        }

        self.checkpoint(&table, total, CheckpointReason::Exhausted)?;
        self.summary.rate_limit_hits = self.pacing.rate_limit_hits();
        self.summary.final_delay_ms = self.pacing.delay().as_millis() as u64;
        self.summary.final_wait_time_ms = self.pacing.wait_time().as_millis() as u64;
        self.summary.finished_at = Some(Utc::now());
        info!(
            total,
            geocoded = self.summary.geocoded,
            requests = self.summary.requests,
            rate_limit_hits = self.summary.rate_limit_hits,
            "geocoding run complete"
        );
        Ok(self.summary)
    }

    async fn evaluate(
        &mut self,
        table: &mut Table,
        index: usize,
        total: usize,
    ) -> AppResult<RowStep> {
        let line = index + 1;
        let Some(row) = table.row_mut(index) else {
            return Ok(RowStep::Advance {
                delay: Duration::ZERO,
            });
        };

        if row.has_coordinates() {
            debug!(row = line, total, "already geocoded; skipping");
            self.summary.already_geocoded += 1;
            return Ok(RowStep::Advance {
                delay: Duration::ZERO,
            });
        }

        // Every loaded header has passed `ensure_columns`, so this only fails on a broken row.
        let address = self.template.render(row)?;

        self.summary.requests += 1;
        let outcome = self.geocoder.geocode(&address).await;
        let delay = self.pacing.delay();
        let step = match outcome {
            GeocodeOutcome::Success(coordinates) => {
                row.apply_coordinates(&coordinates);
                self.summary.geocoded += 1;
                debug!(
                    row = line,
                    total,
                    lat = coordinates.lat,
                    lng = coordinates.lng,
                    accuracy = %coordinates.accuracy,
                    "geocoded"
                );
                RowStep::Advance { delay }
            }
            GeocodeOutcome::ZeroResults => {
                self.summary.zero_results += 1;
                info!(row = line, total, status = outcome.label(), "no results; skipping");
                RowStep::Advance { delay }
            }
            GeocodeOutcome::Denied => {
                self.summary.denied += 1;
                info!(
                    row = line,
                    total,
                    status = outcome.label(),
                    %address,
                    "request denied (special characters such as `#` in the address?); skipping"
                );
                RowStep::Advance { delay }
            }
            GeocodeOutcome::RateLimited => {
                let cooldown = self.pacing.record_rate_limit();
                info!(
                    row = line,
                    total,
                    hits = self.pacing.rate_limit_hits(),
                    wait_ms = self.pacing.wait_time().as_millis() as u64,
                    delay_ms = self.pacing.delay().as_millis() as u64,
                    "hit rate limit; retrying row after cooldown"
                );
                RowStep::Retry { delay: cooldown }
            }
            GeocodeOutcome::UnhandledError(ref code) => {
                self.summary.unhandled += 1;
                warn!(
                    row = line,
                    total,
                    status = %code,
                    "unhandled status; skipping and checkpointing"
                );
                RowStep::SkipAndCheckpoint { delay }
            }
            GeocodeOutcome::TransportFailure(ref detail) => {
                self.summary.transport_failures += 1;
                warn!(
                    row = line,
                    total,
                    %detail,
                    "geocode request failed; skipping and checkpointing"
                );
                RowStep::SkipAndCheckpoint { delay }
            }
        };
        Ok(step)
    }

    fn load_source(&self) -> AppResult<Table> {
        let mut table = load_table(&self.source_path)?;
        table.ensure_geocode_columns();
        self.template.ensure_columns(table.columns())?;
        Ok(table)
    }

    fn checkpoint(
        &mut self,
        table: &Table,
        rows_completed: usize,
        reason: CheckpointReason,
    ) -> AppResult<()> {
        info!(
            rows_completed,
            ?reason,
            path = %self.config.output_path.display(),
            "writing checkpoint"
        );
        write_checkpoint(table, &self.config.output_path)?;
        self.progress.reset();
        self.summary.checkpoints.push(CheckpointRecord {
            rows_completed,
            reason,
        });
        Ok(())
    }

    /// Persists the table, then continues from the freshly written output.
    fn checkpoint_and_reload(
        &mut self,
        table: &Table,
        rows_completed: usize,
        reason: CheckpointReason,
    ) -> AppResult<Table> {
        self.checkpoint(table, rows_completed, reason)?;
        self.source_path = self.config.output_path.clone();
        let reloaded = self.load_source()?;
        if reloaded.len() != table.len() {
            warn!(
                expected = table.len(),
                found = reloaded.len(),
                "reloaded checkpoint has a different row count"
            );
        }
        Ok(reloaded)
    }
}
