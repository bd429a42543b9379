//! # datalink-ingest
//!
//! Moves data between stores: an [`IngestorFactory`] builds backend ingestors, and the
//! [`IngestionPipeline`] plans and runs table-by-table transfers with normalization in between.
//!
//! Plans never hold passwords. Runs take a [`CredentialProvider`] that supplies them again.

mod credentials;
mod error;
mod factory;
mod pipeline;

pub use credentials::{ConnectionRole, CredentialProvider, StaticCredentials};
pub use error::{IngestError, Result};
pub use factory::{DefaultIngestorFactory, IngestorFactory};
pub use pipeline::{IngestionPipeline, ProgressCallback};
