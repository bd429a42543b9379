//! Translation of driver errors into [`DataError`]

use datalink_core::DataError;
use mongodb::error::{Error, ErrorKind};

pub(crate) fn connection_error(err: Error) -> DataError {
    DataError::ConnectionFailed(format!("MongoDB connection failed: {}", err))
}

pub(crate) fn query_error(err: Error) -> DataError {
    match *err.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } | ErrorKind::Io(_) => {
            DataError::ConnectionFailed(err.to_string())
        }
        ErrorKind::Command(ref command) => DataError::QueryFailed(format!(
            "{} ({} {})",
            command.message, command.code_name, command.code
        )),
        _ => DataError::QueryFailed(err.to_string()),
    }
}
