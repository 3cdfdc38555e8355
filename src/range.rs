//! Day-by-day observation fetches over a date range.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use chrono::NaiveDate;
use chrono_tz::Tz;
use polars::prelude::DataFrame;
use tracing::{info, instrument, warn};

use crate::client::MeteoClient;
use crate::endpoints::ObservationDate;
use crate::fetch_error::FetchError;
use crate::frame::concat_frames;

/// Reported after each day of a range completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayProgress {
    pub day: NaiveDate,
    pub rows: usize,
    pub completed: usize,
    pub total: usize,
}

/// Calendar days from `start` to `end`, inclusive. Empty when `start > end`.
pub fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

pub fn day_count(start: NaiveDate, end: NaiveDate) -> usize {
    if start > end {
        0
    } else {
        (end - start).num_days() as usize + 1
    }
}

impl MeteoClient {
    /// Observations for every day in `start..=end`, stacked in day order.
    pub async fn station_observations_range(
        &self,
        station_code: &str,
        start: NaiveDate,
        end: NaiveDate,
        time_zone: Tz,
    ) -> Result<DataFrame, FetchError> {
        self.station_observations_range_with(station_code, start, end, time_zone, |_| {})
            .await
    }

    /// Like [`MeteoClient::station_observations_range`], calling `on_day` after
    /// each day.
    ///
    /// A 429 waits out the rate-limit backoff and retries the same day, up to
    /// the configured retry limit. Any other error aborts the range.
    #[instrument(skip(self, on_day), fields(station = %station_code))]
    pub async fn station_observations_range_with<F>(
        &self,
        station_code: &str,
        start: NaiveDate,
        end: NaiveDate,
        time_zone: Tz,
        mut on_day: F,
    ) -> Result<DataFrame, FetchError>
    where
        F: FnMut(&DayProgress),
    {
        let total = day_count(start, end);
        let mut frames = Vec::new();

        for (i, day) in days(start, end).enumerate() {
            info!("Fetching data for {}...", day);

            let backoff = ConstantBuilder::default()
                .with_delay(self.rate_limit_backoff)
                .with_max_times(self.rate_limit_max_retries);

            let frame = (|| self.station_observations(station_code, ObservationDate::On(day), time_zone))
                .retry(backoff)
                .when(FetchError::is_rate_limited)
                .notify(|_: &FetchError, wait: Duration| {
                    warn!("Hit rate limit (429). Sleeping for {:?}...", wait);
                })
                .await?;

            let rows = frame.height();
            if rows > 0 {
                frames.push(frame);
            }
            on_day(&DayProgress {
                day,
                rows,
                completed: i + 1,
                total,
            });

            tokio::time::sleep(self.range_delay).await;
        }

        Ok(concat_frames(frames)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_inclusive_across_month_end() {
        let all: Vec<_> = days(date(2024, 2, 28), date(2024, 3, 1)).collect();
        assert_eq!(all, vec![date(2024, 2, 28), date(2024, 2, 29), date(2024, 3, 1)]);
        assert_eq!(day_count(date(2024, 2, 28), date(2024, 3, 1)), 3);
    }

    #[test]
    fn test_single_day() {
        assert_eq!(days(date(2024, 1, 1), date(2024, 1, 1)).count(), 1);
        assert_eq!(day_count(date(2024, 1, 1), date(2024, 1, 1)), 1);
    }

    #[test]
    fn test_reversed_range_is_empty() {
        assert_eq!(days(date(2024, 1, 2), date(2024, 1, 1)).count(), 0);
        assert_eq!(day_count(date(2024, 1, 2), date(2024, 1, 1)), 0);
    }
}
