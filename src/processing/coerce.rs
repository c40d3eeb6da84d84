//! Text coercion for [`crate::types::DataSet`].

use crate::types::{DataSet, DataType, Value};

/// Returns a copy of `dataset` where every column is [`DataType::Utf8`].
///
/// Each value is replaced by its text form ([`Value::to_text`]); nulls stay null.
pub fn coerce_to_text(dataset: &DataSet) -> DataSet {
    let mut out = dataset.map_rows(|row| {
        row.iter()
            .map(|v| v.to_text().map(Value::Utf8).unwrap_or(Value::Null))
            .collect()
    });
    for field in &mut out.schema.fields {
        field.data_type = DataType::Utf8;
    }
    out
}
