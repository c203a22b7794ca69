use tabular::Table;

pub mod csv_store;
pub mod errors;
pub mod json_lines;

pub use csv_store::CsvStore;
pub use errors::StoreError;
pub use json_lines::JsonLinesStore;

/// A sink aggregated tables are persisted to. Persistence is a caller
/// concern; the client never writes anything itself.
pub trait TableStore {
    type Error: std::error::Error;

    fn save(&self, table: &Table) -> Result<(), Self::Error>;
}
