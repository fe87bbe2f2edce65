//! Schema normalization: heterogeneous raw payloads → canonical (date, value)
//! series.
//!
//! The record collection is located by a closed set of shape parsers, tried in
//! a fixed order:
//!
//! 1. `RecordList`: the payload itself is a JSON array of records
//! 2. `Envelope`: a JSON object holding the array under `results`,
//!    `records` or `data` (first match wins)
//! 3. `SingleRecord`: a JSON object that is itself one record
//! 4. `CsvTable`: CSV text with a header row
//!
//! Records are JSON objects (fields looked up by name) or positional arrays
//! (field name is a zero-based column index). Rows whose date or value does not
//! parse are dropped. The result is valid iff at least one row survives.

use super::provider::RawPayload;
use crate::series::{NormalizedSeries, Observation};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Envelope keys, in priority order.
pub const ENVELOPE_KEYS: [&str; 3] = ["results", "records", "data"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationErrorKind {
    /// Records were found but none parsed.
    EmptyResult,
    /// The declared fields are absent from the payload.
    MissingField,
}

impl fmt::Display for NormalizationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationErrorKind::EmptyResult => f.write_str("empty result"),
            NormalizationErrorKind::MissingField => f.write_str("missing field"),
        }
    }
}

/// Soft failure: the caller treats it exactly like a fetch failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct NormalizationError {
    pub kind: NormalizationErrorKind,
    pub detail: String,
}

impl NormalizationError {
    fn new(kind: NormalizationErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Where the records live inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    RecordList,
    Envelope(&'static str),
    SingleRecord,
    CsvTable,
}

impl PayloadShape {
    /// Try each shape parser in priority order.
    pub fn detect(payload: &RawPayload, date_field: &str) -> Option<Self> {
        match payload {
            RawPayload::Csv(_) => Some(PayloadShape::CsvTable),
            RawPayload::Json(value) => Self::detect_json(value, date_field),
        }
    }

    fn detect_json(value: &Value, date_field: &str) -> Option<Self> {
        match value {
            Value::Array(_) => Some(PayloadShape::RecordList),
            Value::Object(map) => ENVELOPE_KEYS
                .iter()
                .find(|key| map.get(**key).is_some_and(Value::is_array))
                .map(|key| PayloadShape::Envelope(*key))
                .or_else(|| map.contains_key(date_field).then_some(PayloadShape::SingleRecord)),
            _ => None,
        }
    }
}

/// Normalize a raw payload using the declared date and value fields.
///
/// Idempotent: the same payload always yields the same series.
pub fn normalize(
    payload: &RawPayload,
    date_field: &str,
    value_field: &str,
) -> Result<NormalizedSeries, NormalizationError> {
    let shape = PayloadShape::detect(payload, date_field).ok_or_else(|| {
        NormalizationError::new(
            NormalizationErrorKind::MissingField,
            format!("no record collection found (looked for a list, {ENVELOPE_KEYS:?}, or a record with '{date_field}')"),
        )
    })?;

    let collected = match payload {
        RawPayload::Json(value) => collect_json(json_records(value, shape), date_field, value_field),
        RawPayload::Csv(text) => collect_csv(text, date_field, value_field)?,
    };

    finish(collected, shape, date_field, value_field)
}

fn json_records(value: &Value, shape: PayloadShape) -> &[Value] {
    match shape {
        PayloadShape::RecordList => value.as_array().map(Vec::as_slice).unwrap_or_default(),
        PayloadShape::Envelope(key) => value
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        PayloadShape::SingleRecord => std::slice::from_ref(value),
        PayloadShape::CsvTable => &[],
    }
}

#[derive(Debug, Default)]
struct Collected {
    observations: Vec<Observation>,
    /// Records seen.
    records: usize,
    /// Records carrying both declared fields, parsable or not.
    with_fields: usize,
}

impl Collected {
    fn push(&mut self, date: Option<NaiveDate>, value: Option<f64>) {
        if let (Some(date), Some(value)) = (date, value) {
            self.observations.push(Observation::new(date, value));
        }
    }
}

/// Look up a field on an object record, or a column on a positional record.
fn json_field<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    match record {
        Value::Object(map) => map.get(field),
        Value::Array(row) => field.parse::<usize>().ok().and_then(|i| row.get(i)),
        _ => None,
    }
}

fn collect_json(records: &[Value], date_field: &str, value_field: &str) -> Collected {
    let mut collected = Collected {
        records: records.len(),
        ..Collected::default()
    };

    for record in records {
        let (Some(date), Some(value)) = (json_field(record, date_field), json_field(record, value_field))
        else {
            continue;
        };
        collected.with_fields += 1;
        collected.push(date.as_str().and_then(parse_date), json_value(value));
    }

    collected
}

fn json_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_value(s),
        _ => None,
    }
}

fn collect_csv(text: &str, date_field: &str, value_field: &str) -> Result<Collected, NormalizationError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| NormalizationError::new(NormalizationErrorKind::MissingField, format!("unreadable CSV header: {e}")))?
        .clone();
    let (date_idx, value_idx) = resolve_csv_columns(&headers, date_field, value_field)?;
    debug!(
        date_column = headers.get(date_idx).unwrap_or_default(),
        value_column = headers.get(value_idx).unwrap_or_default(),
        "resolved CSV columns"
    );

    let mut collected = Collected::default();
    for row in reader.records() {
        collected.records += 1;
        // Malformed rows are dropped like any other unparsable record.
        let Ok(row) = row else { continue };
        let (Some(date), Some(value)) = (row.get(date_idx), row.get(value_idx)) else {
            continue;
        };
        collected.with_fields += 1;
        collected.push(parse_date(date), parse_value(value));
    }

    Ok(collected)
}

/// Pick the date and value columns of a CSV table.
///
/// Date: header equal to `date_field` (case-insensitive), a numeric index, or
/// the first column. Value: header equal to `value_field`, a header containing
/// it, a numeric index, or the first column that is not the date column.
fn resolve_csv_columns(
    headers: &StringRecord,
    date_field: &str,
    value_field: &str,
) -> Result<(usize, usize), NormalizationError> {
    if headers.len() < 2 {
        return Err(NormalizationError::new(
            NormalizationErrorKind::MissingField,
            format!("CSV has {} column(s), need a date and a value column", headers.len()),
        ));
    }

    let index_of = |field: &str| field.parse::<usize>().ok().filter(|i| *i < headers.len());
    let exact = |field: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(field));

    let date_idx = exact(date_field).or_else(|| index_of(date_field)).unwrap_or(0);

    let needle = value_field.to_lowercase();
    let value_idx = exact(value_field)
        .filter(|i| *i != date_idx)
        .or_else(|| {
            headers
                .iter()
                .enumerate()
                .position(|(i, h)| i != date_idx && h.to_lowercase().contains(&needle))
        })
        .or_else(|| index_of(value_field).filter(|i| *i != date_idx))
        .or_else(|| (0..headers.len()).find(|i| *i != date_idx))
        .ok_or_else(|| {
            NormalizationError::new(NormalizationErrorKind::MissingField, "no value column")
        })?;

    Ok((date_idx, value_idx))
}

fn finish(
    collected: Collected,
    shape: PayloadShape,
    date_field: &str,
    value_field: &str,
) -> Result<NormalizedSeries, NormalizationError> {
    if collected.observations.is_empty() {
        if collected.records > 0 && collected.with_fields == 0 {
            return Err(NormalizationError::new(
                NormalizationErrorKind::MissingField,
                format!(
                    "none of {} record(s) carry both '{date_field}' and '{value_field}'",
                    collected.records
                ),
            ));
        }
        return Err(NormalizationError::new(
            NormalizationErrorKind::EmptyResult,
            format!("0 of {} record(s) parsed", collected.records),
        ));
    }

    let dropped = collected.records - collected.observations.len();
    if dropped > 0 {
        debug!(?shape, dropped, kept = collected.observations.len(), "dropped unparsable records");
    }

    Ok(NormalizedSeries::new(collected.observations))
}

/// Parse a date in any of the formats the upstream sources use.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// timestamps (date part kept), `DD/MM/YYYY`, and `YYYY-MM` (first of month).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(d);
    }
    if is_year_month(s) {
        return NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok();
    }
    None
}

fn is_year_month(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7 && b[4] == b'-' && b[..4].iter().chain(&b[5..]).all(u8::is_ascii_digit)
}

/// Locale-invariant number parsing: `.` is the only decimal separator and no
/// grouping characters are accepted. Non-finite values are rejected.
pub fn parse_value(text: &str) -> Option<f64> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
