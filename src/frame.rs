//! Building polars [`DataFrame`]s from flattened JSON rows.
//!
//! Each column gets the narrowest type that holds all of its values: booleans,
//! integers, floats or strings. Objects and arrays become struct or list
//! columns. Time columns are stored as UTC instants tagged with the requested
//! zone.

use std::io::{Cursor, Write};

use chrono_tz::Tz;
use polars::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::normalize::{parse_utc_timestamp, TIME_COLUMN_SUFFIX};

/// Name of the leading time column of an indexed frame.
pub const INDEX_NAME: &str = "timestamp";

/// One flattened JSON row: column name and value, in document order.
pub type Record = Vec<(String, Value)>;

/// Union of record keys in first-seen order.
fn column_names(records: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        for (name, _) in record {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// Values of one column; missing keys and JSON nulls are `None`.
fn column_values<'a>(records: &'a [Record], name: &str) -> Vec<Option<&'a Value>> {
    records
        .iter()
        .map(|record| {
            record
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value)
                .filter(|value| !value.is_null())
        })
        .collect()
}

fn infer_series(name: &str, values: &[Option<&Value>]) -> PolarsResult<Series> {
    let present: Vec<&Value> = values.iter().flatten().copied().collect();
    let series_name = PlSmallStr::from_str(name);

    if present.is_empty() {
        return Ok(Series::full_null(series_name, values.len(), &DataType::Null));
    }
    if present.iter().all(|v| v.is_boolean()) {
        let data: Vec<Option<bool>> = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
        return Ok(Series::new(series_name, data));
    }
    if present.iter().all(|v| v.is_i64()) {
        let data: Vec<Option<i64>> = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
        return Ok(Series::new(series_name, data));
    }
    if present.iter().all(|v| v.is_number()) {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
        return Ok(Series::new(series_name, data));
    }
    if present.iter().all(|v| v.is_string()) {
        let data: Vec<Option<&str>> = values.iter().map(|v| v.and_then(Value::as_str)).collect();
        return Ok(Series::new(series_name, data));
    }
    nested_series(name, values)
}

/// Objects and arrays are read back through the polars JSON reader so they
/// land as struct/list columns. Mixed shapes fall back to JSON text.
fn nested_series(name: &str, values: &[Option<&Value>]) -> PolarsResult<Series> {
    let wrapped: Vec<Value> = values
        .iter()
        .map(|v| {
            let mut obj = Map::new();
            obj.insert(name.to_string(), v.cloned().unwrap_or(Value::Null));
            Value::Object(obj)
        })
        .collect();
    let bytes = serde_json::to_vec(&wrapped).unwrap_or_default();

    match JsonReader::new(Cursor::new(bytes)).finish() {
        Ok(df) => Ok(df.column(name)?.as_materialized_series().clone()),
        Err(e) => {
            warn!("Column '{}' has mixed nested values, keeping JSON text: {}", name, e);
            let data: Vec<Option<String>> = values.iter().map(|v| v.map(Value::to_string)).collect();
            Ok(Series::new(PlSmallStr::from_str(name), data))
        }
    }
}

/// Parse each value as a UTC instant and tag the column with `time_zone`.
/// Unparseable values become null.
fn timestamp_series(name: &str, values: &[Option<&Value>], time_zone: Tz) -> PolarsResult<Series> {
    let millis: Vec<Option<i64>> = values
        .iter()
        .map(|v| {
            v.and_then(Value::as_str)
                .and_then(parse_utc_timestamp)
                .map(|ts| ts.timestamp_millis())
        })
        .collect();
    Series::new(PlSmallStr::from_str(name), millis).cast(&DataType::Datetime(
        TimeUnit::Milliseconds,
        Some(PlSmallStr::from_str(time_zone.name())),
    ))
}

/// Build a frame with columns in first-seen order and missing cells null.
///
/// Records without any keys still count as rows.
pub fn frame_from_records(records: &[Record]) -> PolarsResult<DataFrame> {
    let names = column_names(records);
    if names.is_empty() {
        // SAFETY: no columns, so there is nothing to check against the height.
        return Ok(unsafe { DataFrame::new_no_checks(records.len(), Vec::new()) });
    }

    let columns = names
        .iter()
        .map(|name| infer_series(name, &column_values(records, name)).map(Column::from))
        .collect::<PolarsResult<Vec<_>>>()?;
    DataFrame::new(columns)
}

/// Build a frame whose `*TimeUtc` columns are converted to `time_zone`.
///
/// The first time column is renamed to `timestamp`, moved to the front, and
/// rows are stably sorted by it with nulls last. Without a time column the
/// frame is built as-is.
pub fn indexed_frame_from_records(records: &[Record], time_zone: Tz) -> PolarsResult<DataFrame> {
    let names = column_names(records);
    let Some(first) = names.iter().find(|name| name.ends_with(TIME_COLUMN_SUFFIX)).cloned() else {
        warn!("No column ending with '{}' found in frame", TIME_COLUMN_SUFFIX);
        return frame_from_records(records);
    };

    let columns = names
        .iter()
        .map(|name| {
            let values = column_values(records, name);
            let series = if name.ends_with(TIME_COLUMN_SUFFIX) {
                timestamp_series(name, &values, time_zone)?
            } else {
                infer_series(name, &values)?
            };
            Ok(Column::from(series))
        })
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut df = DataFrame::new(columns)?;
    df.rename(&first, PlSmallStr::from_static(INDEX_NAME))?;
    debug!(time_column = %first, "Indexed frame by time column");

    let df = index_first(&df)?;
    df.sort(
        [INDEX_NAME],
        SortMultipleOptions::default()
            .with_nulls_last(true)
            .with_maintain_order(true),
    )
}

/// Move `timestamp` to the front when present.
fn index_first(df: &DataFrame) -> PolarsResult<DataFrame> {
    if df.get_column_index(INDEX_NAME).is_none() {
        return Ok(df.clone());
    }
    let order: Vec<PlSmallStr> = std::iter::once(PlSmallStr::from_static(INDEX_NAME))
        .chain(
            df.get_column_names()
                .into_iter()
                .filter(|name| name.as_str() != INDEX_NAME)
                .cloned(),
        )
        .collect();
    df.select(order)
}

/// Widen column types that differ between frames so they can be stacked.
///
/// All-null columns take the type seen elsewhere; integer and float columns
/// meet at float.
fn unify_dtypes(frames: &mut [DataFrame]) -> PolarsResult<()> {
    let names: Vec<PlSmallStr> = frames
        .iter()
        .flat_map(|df| df.get_column_names().into_iter().cloned())
        .fold(Vec::new(), |mut acc, name| {
            if !acc.contains(&name) {
                acc.push(name);
            }
            acc
        });

    for name in names {
        let dtypes: Vec<DataType> = frames
            .iter()
            .filter_map(|df| df.column(name.as_str()).ok())
            .map(|column| column.dtype().clone())
            .filter(|dtype| !matches!(dtype, DataType::Null))
            .collect();
        let Some(first) = dtypes.first() else {
            continue;
        };
        let target = if dtypes.iter().all(|dtype| dtype == first) {
            first.clone()
        } else if dtypes
            .iter()
            .all(|dtype| matches!(dtype, DataType::Int64 | DataType::Float64))
        {
            DataType::Float64
        } else {
            continue;
        };

        for df in frames.iter_mut() {
            let cast = match df.column(name.as_str()) {
                Ok(column) if column.dtype() != &target => column.cast(&target)?,
                _ => continue,
            };
            df.with_column(cast)?;
        }
    }
    Ok(())
}

/// Stack frames vertically.
///
/// Columns are the union in first-seen order, missing cells are null and row
/// order is kept. Parts without a `timestamp` column contribute null
/// timestamps.
pub fn concat_frames(mut frames: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    match frames.len() {
        0 => return Ok(DataFrame::empty()),
        1 => return Ok(frames.remove(0)),
        _ => {}
    }
    unify_dtypes(&mut frames)?;
    let df = polars::functions::concat_df_diagonal(&frames)?;
    index_first(&df)
}

/// Write one JSON object per row.
pub fn write_json_lines<W: Write>(df: &mut DataFrame, out: W) -> PolarsResult<()> {
    JsonWriter::new(out)
        .with_json_format(JsonFormat::JsonLines)
        .finish(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => panic!("expected object"),
        }
    }

    fn names(df: &DataFrame) -> Vec<&str> {
        df.get_column_names().into_iter().map(|n| n.as_str()).collect()
    }

    fn timestamps(df: &DataFrame) -> Vec<Option<i64>> {
        let millis = df.column(INDEX_NAME).unwrap().cast(&DataType::Int64).unwrap();
        millis.i64().unwrap().into_iter().collect()
    }

    fn millis(h: u32) -> Option<i64> {
        Some(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap().timestamp_millis())
    }

    #[test]
    fn test_columns_union_in_first_seen_order() {
        let df = frame_from_records(&[
            record(json!({"a": 1, "b": "x"})),
            record(json!({"c": true, "a": 2})),
        ])
        .unwrap();

        assert_eq!(names(&df), vec!["a", "b", "c"]);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("b").unwrap().get(1).unwrap(), AnyValue::Null);
        assert_eq!(df.column("c").unwrap().get(1).unwrap(), AnyValue::Boolean(true));
    }

    #[test]
    fn test_mixed_numbers_become_float() {
        let df = frame_from_records(&[record(json!({"v": 1})), record(json!({"v": 2.5}))]).unwrap();
        assert_eq!(df.column("v").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("v").unwrap().get(0).unwrap(), AnyValue::Float64(1.0));
    }

    #[test]
    fn test_objects_become_struct_columns() {
        let df = frame_from_records(&[
            record(json!({"coordinates": {"latitude": 54.6, "longitude": 25.2}})),
            record(json!({"coordinates": null})),
        ])
        .unwrap();
        assert!(matches!(df.column("coordinates").unwrap().dtype(), DataType::Struct(_)));
    }

    #[test]
    fn test_rows_without_keys_keep_height() {
        let df = frame_from_records(&[record(json!({})), record(json!({}))]).unwrap();
        assert_eq!(df.width(), 0);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_indexed_frame_sorts_with_nulls_last() {
        let df = indexed_frame_from_records(
            &[
                record(json!({"v": 1, "observationTimeUtc": "2024-01-01 02:00:00"})),
                record(json!({"v": 2, "observationTimeUtc": "bad"})),
                record(json!({"v": 3, "observationTimeUtc": "2024-01-01 01:00:00"})),
            ],
            chrono_tz::Europe::Vilnius,
        )
        .unwrap();

        assert_eq!(names(&df), vec![INDEX_NAME, "v"]);
        assert_eq!(
            df.column(INDEX_NAME).unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, Some("Europe/Vilnius".into()))
        );
        assert_eq!(timestamps(&df), vec![millis(1), millis(2), None]);
        assert_eq!(df.column("v").unwrap().get(2).unwrap(), AnyValue::Int64(2));
    }

    #[test]
    fn test_concat_unions_columns_and_keeps_order() {
        let a = frame_from_records(&[record(json!({"x": 1}))]).unwrap();
        let b = frame_from_records(&[record(json!({"y": "b"})), record(json!({"x": 3}))]).unwrap();
        let df = concat_frames(vec![a, b]).unwrap();

        assert_eq!(df.height(), 3);
        assert_eq!(names(&df), vec!["x", "y"]);
        assert_eq!(df.column("x").unwrap().get(1).unwrap(), AnyValue::Null);
        assert_eq!(df.column("x").unwrap().get(2).unwrap(), AnyValue::Int64(3));
    }

    #[test]
    fn test_concat_mixed_indexed_and_plain_parts() {
        let plain = frame_from_records(&[record(json!({"v": 0.5}))]).unwrap();
        let indexed = indexed_frame_from_records(
            &[record(json!({"observationTimeUtc": "2024-01-01 03:00:00", "v": 1}))],
            chrono_tz::UTC,
        )
        .unwrap();

        let df = concat_frames(vec![plain, indexed]).unwrap();
        assert_eq!(names(&df), vec![INDEX_NAME, "v"]);
        assert_eq!(timestamps(&df), vec![None, millis(3)]);
        assert_eq!(df.column("v").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_concat_fills_all_null_column_type() {
        let a = frame_from_records(&[record(json!({"gust": null}))]).unwrap();
        let b = frame_from_records(&[record(json!({"gust": 7.5}))]).unwrap();
        let df = concat_frames(vec![a, b]).unwrap();
        assert_eq!(df.column("gust").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("gust").unwrap().get(1).unwrap(), AnyValue::Float64(7.5));
    }

    #[test]
    fn test_concat_nothing_is_empty() {
        let df = concat_frames(Vec::new()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 0);
    }

    #[test]
    fn test_json_lines_output() {
        let mut df = frame_from_records(&[
            record(json!({"code": "vilnius", "rank": 1})),
            record(json!({"code": "kaunas", "rank": null})),
        ])
        .unwrap();

        let mut out = Vec::new();
        write_json_lines(&mut df, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], json!({"code": "vilnius", "rank": 1}));
        assert_eq!(lines[1]["code"], json!("kaunas"));
        assert_eq!(lines[1]["rank"], Value::Null);
    }

    #[test]
    fn test_display_shows_rows_without_columns() {
        let df = frame_from_records(&[record(json!({})), record(json!({}))]).unwrap();
        assert!(df.to_string().contains("(2, 0)"));
    }
}
