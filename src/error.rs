use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Input is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Need at least 2 annual periods (YYYY) to compare, found {0}")]
    InsufficientYears(usize),

    #[error("KPI catalogue contains a dependency cycle through '{0}'")]
    KpiCycle(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
