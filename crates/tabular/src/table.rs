use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::flatten::{flatten_into, flatten_object};

/// A single flat record: dotted column name to JSON value.
pub type Row = BTreeMap<String, Value>;

// Nested pool fields that are promoted to `<parent>.<child>` columns when a
// response is normalized
const NESTED_POOL_COLUMNS: [&str; 3] = ["price_change_percentage", "transactions", "volume_usd"];

/// An immutable-after-return, column-sparse table built from API responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// One row per element, every nested object flattened into dotted paths.
    pub fn from_records(records: &[Value]) -> Self {
        let rows = records
            .iter()
            .map(|record| match record {
                Value::Object(_) => flatten_object(record),
                scalar => Row::from([("0".to_string(), scalar.clone())]),
            })
            .collect();
        Table { rows }
    }

    /// One row per element, top-level keys only; nested values stay whole in
    /// their cell until a promotion pass runs.
    pub fn from_objects_shallow(records: &[Value]) -> Self {
        let rows = records
            .iter()
            .map(|record| match record {
                Value::Object(map) => {
                    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Row>()
                }
                scalar => Row::from([("0".to_string(), scalar.clone())]),
            })
            .collect();
        Table { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Union of row columns, in the order they are first seen.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row)?.get(column)
    }

    /// Cells of one column, skipping rows where it is missing.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> {
        self.rows.iter().filter_map(move |row| row.get(column))
    }

    pub fn concat<I: IntoIterator<Item = Table>>(tables: I) -> Table {
        let mut rows = Vec::new();
        for table in tables {
            rows.extend(table.rows);
        }
        Table { rows }
    }

    pub fn append(&mut self, other: Table) {
        self.rows.extend(other.rows);
    }

    /// Remove the `attributes` column and merge its flattened sub-fields in
    /// as top-level columns. Non-object cells are dropped with the column.
    pub fn promote_attributes(&mut self) {
        for row in &mut self.rows {
            if let Some(attributes) = row.remove("attributes") {
                if let Value::Object(map) = attributes {
                    for (key, nested) in &map {
                        flatten_into(key, nested, row);
                    }
                }
            }
        }
    }

    /// Remove a nested-object column and re-add its sub-fields prefixed with
    /// the parent name.
    pub fn promote_nested(&mut self, column: &str) {
        for row in &mut self.rows {
            if let Some(nested) = row.remove(column) {
                if let Value::Object(map) = nested {
                    for (key, value) in &map {
                        flatten_into(&format!("{}.{}", column, key), value, row);
                    }
                }
            }
        }
    }

    /// Promotion pass applied to every single-shot response: `attributes`
    /// first, then the known nested pool columns.
    pub fn normalize(&mut self) {
        self.promote_attributes();
        for column in NESTED_POOL_COLUMNS {
            self.promote_nested(column);
        }
    }

    /// Sort rows descending by one column; rows missing the column sink to
    /// the bottom.
    pub fn sort_desc_by(&mut self, column: &str) {
        self.rows.sort_by(|a, b| cmp_cells(b.get(column), a.get(column)));
    }

    /// Keep rows whose cell parses as f64 and is at least `min`. Numeric
    /// strings count; rows without a usable value are dropped.
    pub fn filter_min_f64(&mut self, column: &str, min: f64) {
        self.rows.retain(|row| match cell_f64(row.get(column)) {
            Some(value) => value >= min,
            None => false,
        });
    }

    /// Re-type a column's numeric-string cells as numbers; cells that do not
    /// parse are left alone.
    pub fn coerce_f64(&mut self, column: &str) {
        for row in &mut self.rows {
            let parsed = match row.get(column) {
                Some(Value::String(s)) => s.parse::<f64>().ok(),
                _ => None,
            };
            if let Some(number) = parsed {
                row.insert(column.to_string(), Value::from(number));
            }
        }
    }

    /// Add a column derived from the prefix of a string column, split at the
    /// first occurrence of `sep` (e.g. `chain` from `eth_0xabc`).
    pub fn derive_prefix_column(&mut self, new_column: &str, source: &str, sep: char) {
        for row in &mut self.rows {
            if let Some(Value::String(s)) = row.get(source) {
                let prefix = s.split(sep).next().unwrap_or(s).to_string();
                row.insert(new_column.to_string(), Value::String(prefix));
            }
        }
    }
}

fn cell_f64(cell: Option<&Value>) -> Option<f64> {
    match cell? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn cmp_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => cmp_values(a, b),
    }
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}
