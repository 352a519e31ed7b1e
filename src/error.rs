use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrioritizerError {
    /// A single input file could not be read. Recovered by the loader.
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("{table} table is missing required column `{column}`")]
    Schema { table: String, column: String },

    #[error("{table} table row {row}: invalid value {value:?} in column `{column}`")]
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("at least 2 scored issues are required for ranking, found {found}")]
    DegenerateInput { found: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PrioritizerError {
    pub fn schema(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrioritizerError>;
