//! Client for the meteo.lt weather API that turns JSON responses into
//! timestamp-indexed tables.

pub mod client;
pub mod config;
pub mod endpoints;
pub mod fetch_error;
pub mod frame;
pub mod normalize;
pub mod range;

pub use client::MeteoClient;
pub use config::{ClientConfig, ConfigError};
pub use endpoints::{Endpoint, ObservationDate, DEFAULT_FORECAST_TYPE};
pub use fetch_error::FetchError;
pub use frame::{concat_frames, INDEX_NAME};
pub use polars::prelude::DataFrame;
pub use range::DayProgress;
