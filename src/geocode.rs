use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::GeocodeConfig;
use crate::errors::{AppError, AppResult};

const STATUS_OK: &str = "OK";
const STATUS_ZERO_RESULTS: &str = "ZERO_RESULTS";
const STATUS_OVER_QUERY_LIMIT: &str = "OVER_QUERY_LIMIT";
const STATUS_REQUEST_DENIED: &str = "REQUEST_DENIED";

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: String,
}

/// Result of one geocode attempt, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Success(Coordinates),
    ZeroResults,
    RateLimited,
    Denied,
    UnhandledError(String),
    TransportFailure(String),
}

impl GeocodeOutcome {
    pub fn from_response(response: GeocodeResponse) -> Self {
        match response.status.as_str() {
            STATUS_OK => match response.results.into_iter().next() {
                Some(result) => {
                    let GeocodeGeometry {
                        location,
                        location_type,
                    } = result.geometry;
                    GeocodeOutcome::Success(Coordinates {
                        lat: location.lat,
                        lng: location.lng,
                        accuracy: location_type.unwrap_or_default(),
                    })
                }
                None => GeocodeOutcome::ZeroResults,
            },
            STATUS_ZERO_RESULTS => GeocodeOutcome::ZeroResults,
            STATUS_OVER_QUERY_LIMIT => GeocodeOutcome::RateLimited,
            STATUS_REQUEST_DENIED => GeocodeOutcome::Denied,
            other => GeocodeOutcome::UnhandledError(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GeocodeOutcome::Success(_) => STATUS_OK,
            GeocodeOutcome::ZeroResults => STATUS_ZERO_RESULTS,
            GeocodeOutcome::RateLimited => STATUS_OVER_QUERY_LIMIT,
            GeocodeOutcome::Denied => STATUS_REQUEST_DENIED,
            GeocodeOutcome::UnhandledError(code) => code.as_str(),
            GeocodeOutcome::TransportFailure(_) => "TRANSPORT_FAILURE",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResult {
    pub geometry: GeocodeGeometry,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeGeometry {
    pub location: GeocodeLocation,
    #[serde(default)]
    pub location_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeLocation {
    pub lat: f64,
    pub lng: f64,
}

#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    /// Performs exactly one resolution attempt for `address`.
    async fn geocode(&self, address: &str) -> GeocodeOutcome;
}

#[derive(Clone)]
pub struct GeocodeService {
    inner: Arc<dyn GeocodeLookup>,
}

impl GeocodeService {
    pub fn new(config: &GeocodeConfig) -> AppResult<Self> {
        let client = HttpGeocodeClient::new(config)?;
        Ok(Self {
            inner: Arc::new(client),
        })
    }

    pub fn from_lookup(lookup: Arc<dyn GeocodeLookup>) -> Self {
        Self { inner: lookup }
    }

    pub async fn geocode(&self, address: &str) -> GeocodeOutcome {
        self.inner.geocode(address).await
    }
}

pub struct HttpGeocodeClient {
    http: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
}

impl HttpGeocodeClient {
    pub fn new(config: &GeocodeConfig) -> AppResult<Self> {
        let endpoint = Url::parse(&config.geocode_endpoint).map_err(|err| {
            AppError::Config(format!(
                "invalid geocode endpoint `{}`: {err}",
                config.geocode_endpoint
            ))
        })?;
        let http = Client::builder()
            .user_agent(concat!("geocode-batch/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key: config.google_maps_api_key.clone(),
        })
    }

    async fn fetch(&self, address: &str) -> AppResult<GeocodeResponse> {
        let mut request = self
            .http
            .get(self.endpoint.clone())
            .query(&[("address", address)]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.expose_secret())]);
        }

        let response = request.send().await?.error_for_status()?;
        let parsed: GeocodeResponse = response.json().await?;
        Ok(parsed)
    }
}

#[async_trait]
impl GeocodeLookup for HttpGeocodeClient {
    async fn geocode(&self, address: &str) -> GeocodeOutcome {
        match self.fetch(address).await {
            Ok(response) => {
                if let Some(message) = &response.error_message {
                    debug!(
                        status = %response.status,
                        message = %message,
                        "geocode service returned a message"
                    );
                }
                let outcome = GeocodeOutcome::from_response(response);
                trace!(address, status = outcome.label(), "geocode response");
                outcome
            }
            Err(err) => GeocodeOutcome::TransportFailure(err.to_string()),
        }
    }
}
