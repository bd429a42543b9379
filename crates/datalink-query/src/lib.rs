//! # datalink-query
//!
//! Natural-language and literal query handling on top of the datalink executors.
//!
//! - [`SchemaContext`] turns discovered metadata into the JSON document generators consume
//! - [`validate_sql`] / [`validate_pipeline`] reject destructive or malformed queries
//! - [`FallbackSqlGenerator`] / [`FallbackMongoGenerator`] answer when no model is configured
//! - [`QueryEngineFactory`] wires a generator, validator and executor per store type

mod engine;
mod factory;
pub mod fallback;
pub mod schema;
pub mod validation;

pub use engine::QueryEngine;
pub use factory::QueryEngineFactory;
pub use fallback::{describe_pipeline, describe_sql, FallbackMongoGenerator, FallbackSqlGenerator};
pub use schema::{render_schema_prompt, SchemaContext};
pub use validation::{validate_for, validate_pipeline, validate_sql};
