//! Relational backends for datalink.
//!
//! [`SqlIngestor`] and [`SqlQueryExecutor`] speak PostgreSQL, MySQL and SQLite through sqlx.
//! Oracle and SQL Server are recognised store types but have no bundled driver, so
//! construction fails with `Unsupported` for them.

mod catalog;
mod dialect;
mod error;
mod executor;
mod ingestor;
mod pool;
mod value;

pub use dialect::Dialect;
pub use executor::SqlQueryExecutor;
pub use ingestor::SqlIngestor;
