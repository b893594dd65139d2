use thiserror::Error;

/// Failures that stop a single request. Other requests over the same base
/// tables are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{dataset} is missing required columns: {}", .missing.join(", "))]
    MissingColumns {
        dataset: String,
        missing: Vec<String>,
    },
    #[error("no {dataset} records for {selection}")]
    EmptySelection { dataset: String, selection: String },
    #[error("course `{0}` is not present in the course table")]
    UnknownCourse(String),
    #[error("completion summary has no entry for category `{0}`")]
    MissingCategory(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A single cell that could not be interpreted. Rows carrying one are
/// excluded from aggregation, never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unparseable timestamp `{0}`")]
    Timestamp(String),
    #[error("unparseable number `{0}`")]
    Number(String),
    #[error("blank {0}")]
    Blank(&'static str),
    #[error("row has {cells} cells but the header has {columns}")]
    ExtraCells { cells: usize, columns: usize },
}

pub type EngineResult<T> = Result<T, EngineError>;
