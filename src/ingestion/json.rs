//! JSON decoding.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single bare object: `{"a":1}`
//! - Newline-delimited objects (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Every body first goes through [`wrap_brackets_if_needed`]. Two frames are then derived: a
//! direct tabular frame (top-level keys as columns, nested values kept as JSON) and a normalized
//! frame where nested objects expand into dotted column paths (`user.name`).

use crate::error::{LandingError, LandingResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// The two tabular frames derived from one JSON body.
///
/// Only [`JsonFrames::normalized`] is loaded. [`JsonFrames::raw`] is kept and stamped alongside it
/// but never reaches the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonFrames {
    /// Top-level keys as columns.
    pub raw: DataSet,
    /// Nested objects flattened into dotted columns.
    pub normalized: DataSet,
}

/// Wrap a body in `[` / `]` unless it is already bracket-delimited.
///
/// A closing bracket followed by a single `\n` or `\r\n` counts as delimited.
pub fn wrap_brackets_if_needed(buffer: &str) -> String {
    let mut out = String::with_capacity(buffer.len() + 2);
    if !buffer.starts_with('[') {
        out.push('[');
    }
    out.push_str(buffer);
    if !(buffer.ends_with(']') || buffer.ends_with("]\n") || buffer.ends_with("]\r\n")) {
        out.push(']');
    }
    out
}

/// Decode a JSON object body into its raw and normalized frames.
pub fn decode_json(text: &str) -> LandingResult<JsonFrames> {
    if text.trim().is_empty() {
        return Err(LandingError::malformed("json body is empty"));
    }

    let records = parse_records(text)?;
    let objects = records
        .iter()
        .enumerate()
        .map(|(idx0, v)| {
            v.as_object().ok_or_else(|| {
                LandingError::malformed(format!("record {} is not a json object", idx0 + 1))
            })
        })
        .collect::<LandingResult<Vec<_>>>()?;

    let raw = frame_from_pairs(objects.iter().map(|obj| {
        obj.iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect::<Vec<_>>()
    }));

    let normalized = frame_from_pairs(objects.iter().map(|obj| {
        let mut pairs = Vec::new();
        flatten_into(None, obj, &mut pairs);
        pairs
    }));

    Ok(JsonFrames { raw, normalized })
}

// The wrapped body is tried first; a body of several top-level values (NDJSON) only parses as a
// value stream.
fn parse_records(text: &str) -> LandingResult<Vec<serde_json::Value>> {
    let wrapped = wrap_brackets_if_needed(text);
    let err = match serde_json::from_str::<serde_json::Value>(&wrapped) {
        Ok(serde_json::Value::Array(items)) => return Ok(items),
        Ok(other) => return Ok(vec![other]),
        Err(err) => err,
    };

    let stream = serde_json::Deserializer::from_str(text)
        .into_iter::<serde_json::Value>()
        .collect::<Result<Vec<_>, _>>();
    match stream {
        Ok(values) if values.len() > 1 => Ok(values),
        _ => Err(LandingError::Json(err)),
    }
}

fn flatten_into(
    prefix: Option<&str>,
    obj: &serde_json::Map<String, serde_json::Value>,
    out: &mut Vec<(String, Value)>,
) {
    for (key, value) in obj {
        let path = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            serde_json::Value::Object(inner) if !inner.is_empty() => {
                flatten_into(Some(&path), inner, out)
            }
            other => out.push((path, Value::from_json(other))),
        }
    }
}

/// Build a frame from per-row `(column, value)` pairs.
///
/// Columns appear in first-seen order; rows missing a column get [`Value::Null`].
fn frame_from_pairs<I>(rows: I) -> DataSet
where
    I: IntoIterator<Item = Vec<(String, Value)>>,
{
    let mut names: Vec<String> = Vec::new();
    let mut sparse: Vec<Vec<(usize, Value)>> = Vec::new();

    for pairs in rows {
        let mut row = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let idx = match names.iter().position(|n| *n == name) {
                Some(idx) => idx,
                None => {
                    names.push(name);
                    names.len() - 1
                }
            };
            row.push((idx, value));
        }
        sparse.push(row);
    }

    let rows: Vec<Vec<Value>> = sparse
        .into_iter()
        .map(|pairs| {
            let mut row = vec![Value::Null; names.len()];
            for (idx, value) in pairs {
                row[idx] = value;
            }
            row
        })
        .collect();

    let fields = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| Field::new(name, column_type(rows.iter().map(|r| &r[idx]))))
        .collect();
    DataSet::new(Schema::new(fields), rows)
}

/// Narrowest type holding every non-null value of a column; mixed columns stay JSON.
fn column_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut seen: Option<DataType> = None;
    for value in values {
        let current = match value {
            Value::Null => continue,
            Value::Int64(_) => DataType::Int64,
            Value::UInt64(_) => DataType::UInt64,
            Value::Float64(_) => DataType::Float64,
            Value::Bool(_) => DataType::Bool,
            Value::Utf8(_) => DataType::Utf8,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Json(_) => DataType::Json,
        };
        seen = match seen {
            None => Some(current),
            Some(prev) if prev == current => Some(prev),
            Some(prev) if prev.is_numeric() && current.is_numeric() => Some(DataType::Float64),
            Some(_) => return DataType::Json,
        };
    }
    seen.unwrap_or(DataType::Utf8)
}
