//! Translation of sqlx errors into [`DataError`]

use datalink_core::DataError;

/// Error raised while opening or probing a pool
pub(crate) fn connection_error(err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::PoolTimedOut => {
            DataError::ConnectionFailed("timed out waiting for a connection".to_string())
        }
        sqlx::Error::Database(db) => {
            DataError::ConnectionFailed(format!("{} ({})", db.message(), code_of(&*db)))
        }
        other => DataError::ConnectionFailed(other.to_string()),
    }
}

/// Error raised while running a statement
pub(crate) fn query_error(err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::Database(db) => DataError::QueryFailed(database_message(&*db)),
        sqlx::Error::RowNotFound => DataError::not_found("query returned no rows"),
        sqlx::Error::PoolTimedOut => {
            DataError::ConnectionFailed("timed out waiting for a connection".to_string())
        }
        sqlx::Error::PoolClosed => DataError::NotConnected,
        sqlx::Error::Io(e) => DataError::ConnectionFailed(e.to_string()),
        sqlx::Error::Tls(e) => DataError::ConnectionFailed(e.to_string()),
        sqlx::Error::ColumnDecode { index, source } => {
            DataError::QueryFailed(format!("could not decode column {}: {}", index, source))
        }
        other => DataError::QueryFailed(other.to_string()),
    }
}

fn code_of(db: &dyn sqlx::error::DatabaseError) -> String {
    db.code().map(|c| c.to_string()).unwrap_or_else(|| "no code".to_string())
}

/// Message with SQLSTATE plus PostgreSQL detail/hint when available
fn database_message(db: &dyn sqlx::error::DatabaseError) -> String {
    let mut message = format!("{} [{}]", db.message(), code_of(db));

    if let Some(pg) = db.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg.detail() {
            message.push_str(&format!(" Detail: {}", detail));
        }
        if let Some(hint) = pg.hint() {
            message.push_str(&format!(" Hint: {}", hint));
        }
        if let Some(table) = pg.table() {
            message.push_str(&format!(" Table: {}", table));
        }
    }

    message
}
