// src/lib.rs

pub mod compliance;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod llm_extract;
pub mod merge;
pub mod normalize;
pub mod pdf_extract;
pub mod pipeline;
pub mod record;
pub mod reference;
pub mod schema;

pub use compliance::{ComplianceEvaluator, ComplianceVerdict, Recommendation, RiskLevel};
pub use error::ExtractError;
pub use merge::{Confidence, MissingField, merge, missing_fields};
pub use normalize::Normalized;
pub use pipeline::{Channel, HsCodeInfo, LcExtractor, LcPipeline, LcReport};
pub use record::LcRecord;
pub use reference::ReferenceData;
pub use schema::{SchemaError, SchemaRegistry};
