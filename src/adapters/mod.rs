//! Pure protocol adapters
//!
//! Stateless transforms shared by both output surfaces: schema normalization,
//! strict canonicalization, annotation mapping, module id normalization and
//! failure sanitization. None of them touch shared state.

pub mod annotations;
pub mod errors;
pub mod id_normalizer;
pub mod schema;
pub mod strict;

pub use annotations::AnnotationMapper;
pub use errors::{
    ErrorCode, ErrorMapper, ExecutionFailure, FailureClass, RenderedError, ACL_DENIED, CALL_DEPTH_EXCEEDED,
    CALL_FREQUENCY_EXCEEDED, CIRCULAR_CALL, MODULE_NOT_FOUND, MODULE_TIMEOUT, SCHEMA_VALIDATION_ERROR,
};
pub use id_normalizer::{ModuleIdNormalizer, MODULE_ID_PATTERN, TOOL_NAME_PATTERN};
pub use schema::{contains_ref, NormalizedSchema, SchemaConverter, SchemaGraph};
pub use strict::StrictTransformer;
