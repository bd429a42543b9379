//! Cross-store normalization of discovered metadata and in-flight row batches.
//!
//! [`Normalizer::analyze_normalization_needs`] turns metadata into [`NormalizationRule`]s;
//! [`Normalizer::apply_business_rules`] folds them over a batch. Everything is in-memory and
//! side-effect free.
//!
//! [`NormalizationRule`]: datalink_core::NormalizationRule

pub mod constraints;
pub mod convert;
pub mod error;
pub mod normalizer;

pub use constraints::{CheckCondition, Constraint, ConstraintViolations};
pub use convert::{convert_value, TargetEncoding, TargetKind};
pub use error::{NormalizeError, Result};
pub use normalizer::{NormalizationReport, Normalizer, NullStrategy};
