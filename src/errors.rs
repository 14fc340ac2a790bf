use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("invalid address template: {0}")]
    Template(String),
    #[error("address template references missing column `{column}`")]
    MissingColumn { column: String },
    #[error("row {row} does not match the table header: {detail}")]
    RowShape { row: usize, detail: String },
}
