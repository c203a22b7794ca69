use std::fs::File;
use std::io::{BufWriter, Write};

use log::info;

use tabular::Table;

use crate::errors::StoreError;
use crate::TableStore;

/// One JSON object per row per line. Keeps cell types intact, unlike the
/// stringly CSV rendering.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: String,
}

impl JsonLinesStore {
    pub fn new(path: String) -> Self {
        JsonLinesStore { path }
    }
}

impl TableStore for JsonLinesStore {
    type Error = StoreError;

    fn save(&self, table: &Table) -> Result<(), StoreError> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);

        for row in table.rows() {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }

        writer.flush()?;
        info!("Wrote {} rows to {}", table.len(), self.path);
        Ok(())
    }
}
