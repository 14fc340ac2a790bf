mod address;
mod config;
mod controller;
mod errors;
mod geocode;
mod pacing;
mod table;

use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use address::AddressTemplate;
pub use config::{
    GeocodeConfig, PublicGeocodeConfig, DEFAULT_ADDRESS_TEMPLATE, DEFAULT_GEOCODE_ENDPOINT,
};
pub use controller::{CheckpointReason, CheckpointRecord, RowController, RunSummary};
pub use errors::{AppError, AppResult};
pub use geocode::{
    Coordinates, GeocodeLookup, GeocodeOutcome, GeocodeResponse, GeocodeService,
    HttpGeocodeClient,
};
pub use pacing::{PacingState, ProgressCounter, Scheduler, TokioScheduler, WAIT_BACKOFF_FACTOR};
pub use table::{
    load_table, read_table, write_checkpoint, write_table, Row, Table, ACCURACY_COLUMN,
    LAT_COLUMN, LNG_COLUMN,
};

/// Geocodes every row of `config.input_path` against the configured HTTP
/// endpoint, checkpointing into `config.output_path`.
pub async fn run(config: GeocodeConfig) -> AppResult<RunSummary> {
    debug!(config = ?config.public_profile(), "geocoding configuration");
    let geocoder = GeocodeService::new(&config)?;
    RowController::new(config, geocoder)?.run().await
}

pub fn init_tracing(verbose: bool) {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let default_directive = if verbose {
            "info,geocode_batch=debug"
        } else {
            "warn"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
