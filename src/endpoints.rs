//! Endpoint templates for the meteo.lt v1 API.

use std::fmt;

use chrono::NaiveDate;
use reqwest::Url;

use crate::fetch_error::FetchError;

pub const DEFAULT_FORECAST_TYPE: &str = "long-term";

/// The `{date}` segment of the station observations endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationDate {
    #[default]
    Latest,
    On(NaiveDate),
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationDate::Latest => f.write_str("latest"),
            ObservationDate::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<NaiveDate> for ObservationDate {
    fn from(date: NaiveDate) -> Self {
        ObservationDate::On(date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Places,
    Place(String),
    PlaceForecasts(String),
    PlaceForecast {
        place_code: String,
        forecast_type: String,
    },
    Stations,
    Station(String),
    StationObservationInfo(String),
    StationObservations {
        station_code: String,
        date: ObservationDate,
    },
}

impl Endpoint {
    pub fn segments(&self) -> Vec<String> {
        match self {
            Endpoint::Places => vec!["places".into()],
            Endpoint::Place(code) => vec!["places".into(), code.clone()],
            Endpoint::PlaceForecasts(code) => {
                vec!["places".into(), code.clone(), "forecasts".into()]
            }
            Endpoint::PlaceForecast {
                place_code,
                forecast_type,
            } => vec![
                "places".into(),
                place_code.clone(),
                "forecasts".into(),
                forecast_type.clone(),
            ],
            Endpoint::Stations => vec!["stations".into()],
            Endpoint::Station(code) => vec!["stations".into(), code.clone()],
            Endpoint::StationObservationInfo(code) => {
                vec!["stations".into(), code.clone(), "observations".into()]
            }
            Endpoint::StationObservations { station_code, date } => vec![
                "stations".into(),
                station_code.clone(),
                "observations".into(),
                date.to_string(),
            ],
        }
    }

    /// Key holding the record list in this endpoint's response, when it has one.
    pub fn record_path(&self) -> Option<&'static str> {
        match self {
            Endpoint::PlaceForecast { .. } => Some("forecastTimestamps"),
            Endpoint::StationObservations { .. } => Some("observations"),
            _ => None,
        }
    }

    /// Join this endpoint onto `base`, percent-encoding each segment.
    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        let mut url = base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| FetchError::InvalidUrl(base.to_string()))?;
            path.pop_if_empty();
            for segment in self.segments() {
                path.push(&segment);
            }
        }
        Ok(url)
    }
}
