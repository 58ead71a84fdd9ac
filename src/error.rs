//! Error types for the aggregation pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaggsError>;

/// Fatal pipeline errors. Per-record JSON failures are not represented
/// here: they are local to the `json` module and never abort a run.
#[derive(Error, Debug)]
pub enum CaggsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed INDEX at byte {offset}: {reason}")]
    IndexParse { offset: u64, reason: &'static str },

    #[error("worker pool error: {0}")]
    Pool(String),
}
