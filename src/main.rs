use anyhow::{Context, Result};
use geocode_batch::{init_tracing, run, GeocodeConfig};
use tracing::warn;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = GeocodeConfig::from_env();
    init_tracing(config.verbose_logging);
    if config.google_maps_api_key.is_none() {
        warn!("GOOGLE_MAPS_API_KEY is not set; requests will be sent without a key");
    }

    let input = config.input_path.display().to_string();
    let summary = run(config)
        .await
        .with_context(|| format!("geocoding {input} failed"))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
