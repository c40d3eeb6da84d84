//! Schema auto-detection and conformance checks shared by the warehouse implementations.

use crate::types::{DataType, Field, Schema};

use super::{JsonRow, TableId, WarehouseError};

fn json_type(v: &serde_json::Value) -> Option<DataType> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(_) => Some(DataType::Bool),
        serde_json::Value::Number(n) if n.is_i64() => Some(DataType::Int64),
        serde_json::Value::Number(n) if n.is_u64() => Some(DataType::UInt64),
        serde_json::Value::Number(_) => Some(DataType::Float64),
        serde_json::Value::String(_) => Some(DataType::Utf8),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(DataType::Json),
    }
}

fn widen(a: DataType, b: DataType) -> Option<DataType> {
    match (a, b) {
        (a, b) if a == b => Some(a),
        (a, b) if a.is_numeric() && b.is_numeric() => Some(DataType::Float64),
        _ => None,
    }
}

fn accepts(declared: DataType, v: &serde_json::Value) -> bool {
    match (declared, v) {
        (_, serde_json::Value::Null) => true,
        (DataType::Int64, serde_json::Value::Number(n)) => n.is_i64(),
        (DataType::UInt64, serde_json::Value::Number(n)) => n.is_u64(),
        (DataType::Float64, serde_json::Value::Number(_)) => true,
        (DataType::Bool, serde_json::Value::Bool(_)) => true,
        (DataType::Utf8 | DataType::Timestamp, serde_json::Value::String(_)) => true,
        (DataType::Json, serde_json::Value::Array(_) | serde_json::Value::Object(_)) => true,
        _ => false,
    }
}

/// Infer a column schema from rows, in first-seen column order.
///
/// Integer and float columns widen to float. Columns holding only nulls take the type the
/// `existing` schema gives them, or `STRING`. Any other mix of types is a mismatch.
pub fn detect_schema(
    table: &TableId,
    rows: &[JsonRow],
    existing: Option<&Schema>,
) -> Result<Schema, WarehouseError> {
    let mut columns: Vec<(String, Option<DataType>)> = Vec::new();

    for (idx0, row) in rows.iter().enumerate() {
        for (name, value) in row {
            let pos = match columns.iter().position(|(n, _)| n == name) {
                Some(pos) => pos,
                None => {
                    columns.push((name.clone(), None));
                    columns.len() - 1
                }
            };
            let Some(seen) = json_type(value) else {
                continue;
            };
            let slot = &mut columns[pos].1;
            *slot = match *slot {
                None => Some(seen),
                Some(prev) => Some(widen(prev, seen).ok_or_else(|| WarehouseError::SchemaMismatch {
                    table: table.to_string(),
                    message: format!(
                        "column '{name}' mixes {} and {} (row {})",
                        prev.as_str(),
                        seen.as_str(),
                        idx0 + 1
                    ),
                })?),
            };
        }
    }

    let fields = columns
        .into_iter()
        .map(|(name, data_type)| {
            let data_type = data_type
                .or_else(|| existing.and_then(|s| s.field(&name)).map(|f| f.data_type))
                .unwrap_or(DataType::Utf8);
            Field::new(name, data_type)
        })
        .collect();
    Ok(Schema::new(fields))
}

/// Check every value of every row against `schema`.
pub(crate) fn validate_rows(table: &TableId, rows: &[JsonRow], schema: &Schema) -> Result<(), WarehouseError> {
    for (idx0, row) in rows.iter().enumerate() {
        for (name, value) in row {
            let field = schema.field(name).ok_or_else(|| WarehouseError::SchemaMismatch {
                table: table.to_string(),
                message: format!("row {} has unknown column '{name}'", idx0 + 1),
            })?;
            if !accepts(field.data_type, value) {
                return Err(WarehouseError::SchemaMismatch {
                    table: table.to_string(),
                    message: format!(
                        "row {} column '{name}' expected {}, got {value}",
                        idx0 + 1,
                        field.data_type.as_str()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Check that a load schema fits an existing table schema without evolving it.
pub(crate) fn ensure_compatible(table: &TableId, existing: &Schema, incoming: &Schema) -> Result<(), WarehouseError> {
    for field in &incoming.fields {
        let Some(current) = existing.field(&field.name) else {
            return Err(WarehouseError::SchemaMismatch {
                table: table.to_string(),
                message: format!("column '{}' does not exist in the table", field.name),
            });
        };
        let fits = current.data_type == field.data_type
            || (current.data_type == DataType::Float64 && field.data_type.is_numeric());
        if !fits {
            return Err(WarehouseError::SchemaMismatch {
                table: table.to_string(),
                message: format!(
                    "column '{}' is {} in the table but {} in the load",
                    field.name,
                    current.data_type.as_str(),
                    field.data_type.as_str()
                ),
            });
        }
    }
    Ok(())
}

/// Resolve the schema a load must satisfy and the table schema after the load.
///
/// An empty batch without an explicit schema says nothing about the columns, so the table
/// keeps whatever schema it had, possibly none.
pub(crate) fn plan_load(
    table: &TableId,
    rows: &[JsonRow],
    existing: Option<&Schema>,
    autodetect: bool,
    explicit: Option<&Schema>,
) -> Result<Option<Schema>, WarehouseError> {
    if rows.is_empty() && explicit.is_none() {
        return Ok(existing.cloned());
    }
    let target = match (explicit, autodetect) {
        (Some(schema), _) => schema.clone(),
        (None, true) => detect_schema(table, rows, existing)?,
        (None, false) => existing.cloned().ok_or_else(|| WarehouseError::SchemaMismatch {
            table: table.to_string(),
            message: "auto-detection is disabled and no schema was supplied".to_string(),
        })?,
    };
    validate_rows(table, rows, &target)?;

    match existing {
        Some(current) => {
            ensure_compatible(table, current, &target)?;
            Ok(Some(current.clone()))
        }
        None => Ok(Some(target)),
    }
}

/// Serialize a schema as `[{"name": .., "type": ..}, ..]`.
pub fn schema_to_json(schema: &Schema) -> serde_json::Value {
    serde_json::Value::Array(
        schema
            .fields
            .iter()
            .map(|f| serde_json::json!({ "name": f.name, "type": f.data_type.as_str() }))
            .collect(),
    )
}

/// Parse a schema produced by [`schema_to_json`].
pub fn schema_from_json(value: &serde_json::Value) -> Option<Schema> {
    let fields = value
        .as_array()?
        .iter()
        .map(|f| {
            let name = f.get("name")?.as_str()?;
            let data_type = DataType::parse(f.get("type")?.as_str()?)?;
            Some(Field::new(name, data_type))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(Schema::new(fields))
}
