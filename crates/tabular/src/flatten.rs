use serde_json::Value;

use crate::table::Row;

/// Flatten a JSON object into a single row, joining nested object keys with
/// dots. Arrays and scalars are stored as-is under their path.
pub fn flatten_object(value: &Value) -> Row {
    let mut row = Row::new();
    flatten_into("", value, &mut row);
    row
}

pub fn flatten_into(prefix: &str, value: &Value, row: &mut Row) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, nested, row);
            }
        }
        scalar_or_array => {
            // A scalar at the root has no column name to live under
            if !prefix.is_empty() {
                row.insert(prefix.to_string(), scalar_or_array.clone());
            }
        }
    }
}
