use csv::WriterBuilder;
use log::info;
use serde_json::Value;

use config::config::OutputConfig;
use tabular::Table;

use crate::errors::StoreError;
use crate::TableStore;

/// Writes a table as delimited text, one header row plus one line per row.
/// Column order is the table's first-seen order; cells holding objects or
/// arrays are serialized as compact JSON.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: String,
    delimiter: u8,
    decimal_comma: bool,
}

impl CsvStore {
    pub fn new(path: String, delimiter: u8, decimal_comma: bool) -> Self {
        CsvStore { path, delimiter, decimal_comma }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        CsvStore::new(output.path.clone(), output.delimiter, output.decimal_comma)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn render_cell(&self, cell: Option<&Value>) -> String {
        match cell {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => {
                let rendered = n.to_string();
                if self.decimal_comma {
                    rendered.replace('.', ",")
                } else {
                    rendered
                }
            }
            Some(other) => other.to_string(),
        }
    }
}

impl TableStore for CsvStore {
    type Error = StoreError;

    fn save(&self, table: &Table) -> Result<(), StoreError> {
        let columns = table.columns();

        let mut writer = WriterBuilder::new().delimiter(self.delimiter).from_path(&self.path)?;
        writer.write_record(&columns)?;

        for row in table.rows() {
            let record: Vec<String> =
                columns.iter().map(|column| self.render_cell(row.get(column))).collect();
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("Wrote {} rows to {}", table.len(), self.path);
        Ok(())
    }
}
