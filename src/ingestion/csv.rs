//! CSV decoding.

use crate::error::{LandingError, LandingResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Decode a comma-delimited object body into a [`DataSet`].
///
/// Rules:
///
/// - With `header`, the first record names the columns; otherwise columns are numbered `0..n`.
/// - Every record must have the same number of fields.
/// - Values stay text; empty cells map to [`Value::Null`].
pub fn decode_csv(text: &str, header: bool) -> LandingResult<DataSet> {
    if text.trim().is_empty() {
        return Err(LandingError::malformed("csv body is empty"));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(header)
        .delimiter(b',')
        .from_reader(text.as_bytes());
    decode_csv_from_reader(&mut rdr)
}

/// Decode CSV data from an existing CSV reader.
///
/// Column names come from the reader's headers when it was built with `has_headers(true)`.
pub fn decode_csv_from_reader<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> LandingResult<DataSet> {
    let mut names: Option<Vec<String>> = if rdr.has_headers() {
        let headers = rdr.headers()?.clone();
        let names: Vec<String> = headers.iter().map(str::to_owned).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(LandingError::malformed(format!(
                    "duplicate column '{name}' in header {names:?}"
                )));
            }
        }
        Some(names)
    } else {
        None
    };

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let width = names
            .get_or_insert_with(|| (0..record.len()).map(|i| i.to_string()).collect())
            .len();

        let mut row: Vec<Value> = Vec::with_capacity(width);
        for raw in record.iter() {
            row.push(if raw.is_empty() {
                Value::Null
            } else {
                Value::Utf8(raw.to_owned())
            });
        }
        rows.push(row);
    }

    let fields = names
        .unwrap_or_default()
        .into_iter()
        .map(|name| Field::new(name, DataType::Utf8))
        .collect();
    Ok(DataSet::new(Schema::new(fields), rows))
}
