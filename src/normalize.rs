//! JSON to [`DataFrame`] normalization.
//!
//! API responses come in three shapes: a bare list of objects (places,
//! stations), a single object (place or station info), or an object wrapping a
//! record list plus metadata (forecasts, observations). Only the last shape is
//! flattened and indexed by time.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use polars::prelude::DataFrame;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::fetch_error::FetchError;
use crate::frame::{self, Record};

pub const TIME_COLUMN_SUFFIX: &str = "TimeUtc";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn json_to_frame(
    json: &Value,
    record_path: Option<&str>,
    time_zone: Tz,
) -> Result<DataFrame, FetchError> {
    match json {
        Value::Array(items) => Ok(frame::frame_from_records(&list_records(items))?),
        Value::Object(data) if holds_empty_list(data, record_path) => {
            debug!("Record list is empty, returning empty frame");
            Ok(DataFrame::empty())
        }
        Value::Object(data) => match find_record_path(data, record_path) {
            Some(path) => {
                debug!(record_path = %path, "Normalizing records with metadata");
                let records = flatten_records(data, &path)?;
                set_timestamp_index(&records, time_zone)
            }
            None => {
                let row: Record = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Ok(frame::frame_from_records(&[row])?)
            }
        },
        _ => Ok(DataFrame::empty()),
    }
}

/// One row per element; objects are not flattened.
///
/// Nested lists spread into positional columns `0`, `1`, ...; any other
/// scalar lands in column `0`.
fn list_records(items: &[Value]) -> Vec<Record> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Value::Array(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            other => vec![("0".to_string(), other.clone())],
        })
        .collect()
}

fn holds_empty_list(data: &Map<String, Value>, record_path: Option<&str>) -> bool {
    record_path
        .and_then(|path| data.get(path))
        .is_some_and(|value| matches!(value, Value::Array(items) if items.is_empty()))
}

fn is_record_list(value: &Value) -> bool {
    matches!(value, Value::Array(items) if matches!(items.first(), Some(Value::Object(_))))
}

/// Pick the key holding the record list.
///
/// A `preferred` key wins when it holds a non-empty list whose first element is
/// an object; otherwise the first such key in document order is used.
pub fn find_record_path(data: &Map<String, Value>, preferred: Option<&str>) -> Option<String> {
    if let Some(path) = preferred {
        if data.get(path).is_some_and(is_record_list) {
            return Some(path.to_string());
        }
    }

    data.iter()
        .find(|(_, value)| is_record_list(value))
        .map(|(key, _)| key.clone())
}

/// Top-level keys other than `record_path`, with object values flattened one
/// level into `{key}_{subkey}`.
pub fn flatten_meta(data: &Map<String, Value>, record_path: &str) -> Vec<(String, Value)> {
    let mut meta = Vec::new();
    for (key, value) in data {
        if key == record_path {
            continue;
        }
        match value {
            Value::Object(inner) => {
                for (sub_key, sub_value) in inner {
                    meta.push((format!("{key}_{sub_key}"), sub_value.clone()));
                }
            }
            other => meta.push((key.clone(), other.clone())),
        }
    }
    meta
}

/// Flatten nested objects of a record into dotted column names.
fn flatten_record(prefix: Option<&str>, record: &Map<String, Value>, out: &mut Record) {
    for (key, value) in record {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_record(Some(&name), inner, out),
            other => out.push((name, other.clone())),
        }
    }
}

/// Rows of the record list with every metadata value repeated on each row.
fn flatten_records(data: &Map<String, Value>, record_path: &str) -> Result<Vec<Record>, FetchError> {
    let meta = flatten_meta(data, record_path);
    let records: &[Value] = match data.get(record_path) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };

    let mut rows: Vec<Record> = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        match record {
            Value::Object(obj) => {
                let mut row = Vec::new();
                flatten_record(None, obj, &mut row);
                rows.push(row);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} non-object entries under '{}'", skipped, record_path);
    }

    let record_columns: HashSet<&str> = rows
        .iter()
        .flat_map(|row| row.iter().map(|(name, _)| name.as_str()))
        .collect();
    if let Some((name, _)) = meta.iter().find(|(name, _)| record_columns.contains(name.as_str())) {
        return Err(FetchError::ConflictingMetadata(name.clone()));
    }

    Ok(rows
        .into_iter()
        .map(|mut row| {
            row.extend(meta.iter().cloned());
            row
        })
        .collect())
}

/// Parse an API timestamp as a UTC instant.
///
/// Naive values are taken to be UTC; values with an offset are converted.
pub fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Build a frame from `records`, converting every `*TimeUtc` column to
/// `time_zone` and indexing by the first one.
///
/// Unparseable values become null. Records without such columns produce an
/// unindexed frame.
pub fn set_timestamp_index(records: &[Record], time_zone: Tz) -> Result<DataFrame, FetchError> {
    Ok(frame::indexed_frame_from_records(records, time_zone)?)
}
