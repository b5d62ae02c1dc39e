use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::table::{Record, Table};

/// Where the record array lives in the fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadShape {
    /// The document is the array: `[{...}, {...}]`
    #[default]
    Array,
    /// The array sits under a named field: `{"lookup": [{...}]}`
    Wrapped { field: String },
}

/// Parse a fetched document into a table.
///
/// Invalid JSON is a `Decode` failure; valid JSON that does not match
/// `shape` is an `UnexpectedShape` failure.
pub fn parse_payload(bytes: &[u8], shape: &PayloadShape) -> Result<Table> {
    let document: Value = serde_json::from_slice(bytes)?;

    let rows = match (shape, document) {
        (PayloadShape::Array, Value::Array(rows)) => rows,
        (PayloadShape::Array, other) => {
            return Err(CacheError::UnexpectedShape(format!(
                "expected a JSON array, got {}",
                type_name(&other)
            )));
        }
        (PayloadShape::Wrapped { field }, Value::Object(mut object)) => match object.remove(field) {
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                return Err(CacheError::UnexpectedShape(format!(
                    "field '{}' is {}, expected an array",
                    field,
                    type_name(&other)
                )));
            }
            None => {
                return Err(CacheError::UnexpectedShape(format!(
                    "missing array field '{}'",
                    field
                )));
            }
        },
        (PayloadShape::Wrapped { field }, other) => {
            return Err(CacheError::UnexpectedShape(format!(
                "expected an object holding '{}', got {}",
                field,
                type_name(&other)
            )));
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(object) => Ok(Record::from_object(object)),
            other => Err(CacheError::UnexpectedShape(format!(
                "element {} is {}, expected an object",
                i,
                type_name(&other)
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(Table::new)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
