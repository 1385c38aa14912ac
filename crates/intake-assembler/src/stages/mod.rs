//! Pipeline stages
//!
//! Each stage is compiled from one part of an importer configuration:
//! - `transform` - field mappings and converters
//! - `validate` - source and target constraints
//! - `filter` - the filter chain
//! - `object` - object materialization

pub mod filter;
pub mod object;
pub mod transform;
pub mod validate;

pub use filter::FilterChain;
pub use object::Materializer;
pub use transform::Transformer;
pub use validate::{RecordValidator, TargetCheck, Violation};
