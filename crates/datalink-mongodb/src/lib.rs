//! MongoDB backend for datalink.
//!
//! Collections are described with the same [`TableMetadata`] model as relational tables. Their
//! columns are inferred from a `$sample` of documents, so types and nullability are
//! statistical; see [`infer_fields`].
//!
//! Queries are aggregation pipelines written as JSON arrays and run against the collection
//! named by `additional_params.collection`.
//!
//! [`TableMetadata`]: datalink_core::TableMetadata

mod client;
pub mod convert;
mod error;
mod executor;
pub mod inference;
mod ingestor;

pub use convert::{bson_to_json, document_to_row, parse_pipeline};
pub use executor::MongoQueryExecutor;
pub use inference::infer_fields;
pub use ingestor::MongoIngestor;
