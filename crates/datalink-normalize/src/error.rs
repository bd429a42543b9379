use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Unsupported target encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Invalid rule for {table}.{column}: {reason}")]
    InvalidRule {
        table: String,
        column: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
