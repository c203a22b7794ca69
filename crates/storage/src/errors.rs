use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
