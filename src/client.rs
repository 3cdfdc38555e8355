use std::time::Duration;

use chrono_tz::Tz;
use polars::prelude::DataFrame;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIME_ZONE};
use crate::endpoints::{Endpoint, ObservationDate};
use crate::fetch_error::FetchError;
use crate::normalize::json_to_frame;

/// Client for forecasts, observations and place/station metadata from the
/// meteo.lt API. Every call returns a polars [`DataFrame`].
#[derive(Clone)]
pub struct MeteoClient {
    client: reqwest::Client,
    base_url: Url,
    time_zone: Tz,
    pub(crate) range_delay: Duration,
    pub(crate) rate_limit_backoff: Duration,
    pub(crate) rate_limit_max_retries: usize,
}

impl MeteoClient {
    pub fn new() -> Self {
        Self::with_session(reqwest::Client::new())
    }

    /// Use an existing HTTP client, sharing its connection pool and settings.
    pub fn with_session(session: reqwest::Client) -> Self {
        let defaults = ClientConfig::default();
        Self {
            client: session,
            base_url: Url::parse(DEFAULT_BASE_URL).expect("Default base URL is valid"),
            time_zone: DEFAULT_TIME_ZONE,
            range_delay: defaults.range_delay(),
            rate_limit_backoff: defaults.rate_limit_backoff(),
            rate_limit_max_retries: defaults.rate_limit_max_retries,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, FetchError> {
        let session = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_session(session)
            .with_base_url(&config.base_url)?
            .with_time_zone(config.time_zone)
            .with_range_delay(config.range_delay())
            .with_rate_limit(config.rate_limit_backoff(), config.rate_limit_max_retries))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, FetchError> {
        self.base_url =
            Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(self)
    }

    /// Zone used by the exploratory endpoints and as the CLI default.
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn with_range_delay(mut self, delay: Duration) -> Self {
        self.range_delay = delay;
        self
    }

    pub fn with_rate_limit(mut self, backoff: Duration, max_retries: usize) -> Self {
        self.rate_limit_backoff = backoff;
        self.rate_limit_max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// GET an endpoint and parse the body as JSON.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch_json(&self, endpoint: &Endpoint) -> Result<Value, FetchError> {
        let url = endpoint.url(&self.base_url)?;
        debug!("Sending HTTP request to {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            error!("Request to {} failed with status {}", url, status);
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!("Retrieved JSON content, size: {} bytes", body.len());
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_frame(&self, endpoint: Endpoint, time_zone: Tz) -> Result<DataFrame, FetchError> {
        let json = self.fetch_json(&endpoint).await?;
        let frame = json_to_frame(&json, endpoint.record_path(), time_zone)?;
        debug!(rows = frame.height(), columns = frame.width(), "Normalized response");
        Ok(frame)
    }

    /// Forecast for a place, indexed by `forecastTimeUtc` in `time_zone`.
    pub async fn place_forecast(
        &self,
        place_code: &str,
        forecast_type: &str,
        time_zone: Tz,
    ) -> Result<DataFrame, FetchError> {
        let endpoint = Endpoint::PlaceForecast {
            place_code: place_code.to_string(),
            forecast_type: forecast_type.to_string(),
        };
        self.fetch_frame(endpoint, time_zone).await
    }

    /// Observations recorded by a station on one day (or the latest batch).
    pub async fn station_observations(
        &self,
        station_code: &str,
        date: ObservationDate,
        time_zone: Tz,
    ) -> Result<DataFrame, FetchError> {
        let endpoint = Endpoint::StationObservations {
            station_code: station_code.to_string(),
            date,
        };
        self.fetch_frame(endpoint, time_zone).await
    }

    pub async fn places(&self) -> Result<DataFrame, FetchError> {
        self.fetch_frame(Endpoint::Places, self.time_zone).await
    }

    pub async fn place_info(&self, place_code: &str) -> Result<DataFrame, FetchError> {
        self.fetch_frame(Endpoint::Place(place_code.to_string()), self.time_zone)
            .await
    }

    /// Forecast types available for a place.
    pub async fn place_forecasts(&self, place_code: &str) -> Result<DataFrame, FetchError> {
        self.fetch_frame(Endpoint::PlaceForecasts(place_code.to_string()), self.time_zone)
            .await
    }

    pub async fn stations(&self) -> Result<DataFrame, FetchError> {
        self.fetch_frame(Endpoint::Stations, self.time_zone).await
    }

    pub async fn station_info(&self, station_code: &str) -> Result<DataFrame, FetchError> {
        self.fetch_frame(Endpoint::Station(station_code.to_string()), self.time_zone)
            .await
    }

    /// What the station stores: the undated observations endpoint.
    pub async fn station_observation_info(&self, station_code: &str) -> Result<DataFrame, FetchError> {
        self.fetch_frame(
            Endpoint::StationObservationInfo(station_code.to_string()),
            self.time_zone,
        )
        .await
    }
}

impl Default for MeteoClient {
    fn default() -> Self {
        Self::new()
    }
}
