use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_ADDRESS_TEMPLATE: &str = "{{address}}, {{city}}, {{state}}, {{zip}}";

const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
const DEFAULT_INITIAL_WAIT_TIME_MS: u64 = 5_000;
const DEFAULT_DELAY_INCREMENT_MS: u64 = 100;
const DEFAULT_CHECKPOINT_EVERY_N_ROWS: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug)]
pub struct GeocodeConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub address_template: String,
    pub initial_delay_ms: u64,
    pub initial_wait_time_ms: u64,
    pub delay_increment_ms: u64,
    pub checkpoint_every_n_rows: usize,
    pub verbose_logging: bool,
    pub geocode_endpoint: String,
    pub request_timeout_ms: u64,
    pub google_maps_api_key: Option<SecretString>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicGeocodeConfig {
    pub input_path: String,
    pub output_path: String,
    pub address_template: String,
    pub initial_delay_ms: u64,
    pub initial_wait_time_ms: u64,
    pub delay_increment_ms: u64,
    pub checkpoint_every_n_rows: usize,
    pub verbose_logging: bool,
    pub geocode_endpoint: String,
    pub request_timeout_ms: u64,
    pub has_google_maps_key: bool,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("input.csv"),
            output_path: PathBuf::from("geocoded.csv"),
            address_template: DEFAULT_ADDRESS_TEMPLATE.to_string(),
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            initial_wait_time_ms: DEFAULT_INITIAL_WAIT_TIME_MS,
            delay_increment_ms: DEFAULT_DELAY_INCREMENT_MS,
            checkpoint_every_n_rows: DEFAULT_CHECKPOINT_EVERY_N_ROWS,
            verbose_logging: true,
            geocode_endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            google_maps_api_key: None,
        }
    }
}

impl GeocodeConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        Self {
            input_path: parse_path("GEOCODE_INPUT_PATH", defaults.input_path),
            output_path: parse_path("GEOCODE_OUTPUT_PATH", defaults.output_path),
            address_template: env::var("GEOCODE_ADDRESS_TEMPLATE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.address_template),
            initial_delay_ms: parse_u64("GEOCODE_INITIAL_DELAY_MS", defaults.initial_delay_ms),
            initial_wait_time_ms: parse_u64(
                "GEOCODE_INITIAL_WAIT_TIME_MS",
                defaults.initial_wait_time_ms,
            ),
            delay_increment_ms: parse_u64(
                "GEOCODE_DELAY_INCREMENT_MS",
                defaults.delay_increment_ms,
            ),
            checkpoint_every_n_rows: parse_usize(
                "GEOCODE_CHECKPOINT_EVERY_N_ROWS",
                defaults.checkpoint_every_n_rows,
            )
            .max(1),
            verbose_logging: parse_bool("GEOCODE_VERBOSE", defaults.verbose_logging),
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.geocode_endpoint),
            request_timeout_ms: parse_u64(
                "GEOCODE_REQUEST_TIMEOUT_MS",
                defaults.request_timeout_ms,
            ),
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::new(v.into())),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn initial_wait_time(&self) -> Duration {
        Duration::from_millis(self.initial_wait_time_ms)
    }

    pub fn delay_increment(&self) -> Duration {
        Duration::from_millis(self.delay_increment_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn public_profile(&self) -> PublicGeocodeConfig {
        PublicGeocodeConfig {
            input_path: self.input_path.to_string_lossy().to_string(),
            output_path: self.output_path.to_string_lossy().to_string(),
            address_template: self.address_template.clone(),
            initial_delay_ms: self.initial_delay_ms,
            initial_wait_time_ms: self.initial_wait_time_ms,
            delay_increment_ms: self.delay_increment_ms,
            checkpoint_every_n_rows: self.checkpoint_every_n_rows,
            verbose_logging: self.verbose_logging,
            geocode_endpoint: self.geocode_endpoint.clone(),
            request_timeout_ms: self.request_timeout_ms,
            has_google_maps_key: self.google_maps_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_overrides_and_hides_secrets() {
        env::set_var("GEOCODE_INPUT_PATH", "hospitals.csv");
        env::set_var("GEOCODE_CHECKPOINT_EVERY_N_ROWS", "0");
        env::set_var("GEOCODE_VERBOSE", "false");
        env::set_var("GEOCODE_DELAY_INCREMENT_MS", "250");
        env::set_var("GOOGLE_MAPS_API_KEY", "secret");

        let config = GeocodeConfig::from_env();
        let public = config.public_profile();

        assert_eq!(public.input_path, "hospitals.csv");
        assert_eq!(public.checkpoint_every_n_rows, 1);
        assert!(!public.verbose_logging);
        assert_eq!(config.delay_increment(), Duration::from_millis(250));
        assert!(public.has_google_maps_key);
        assert!(!serde_json::to_string(&public).unwrap().contains("secret"));
        assert_eq!(public.initial_wait_time_ms, DEFAULT_INITIAL_WAIT_TIME_MS);
        assert_eq!(public.geocode_endpoint, DEFAULT_GEOCODE_ENDPOINT);
    }
}
