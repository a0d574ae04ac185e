//! Domain types for the generate-validate-retry pipeline.
//!
//! Everything here is created fresh per request and never shared between
//! concurrent orchestrations.

pub mod digest;
pub mod error;
pub mod request;
pub mod result;
pub mod verdict;

pub use digest::artifact_digest;
pub use error::{
    ConfigError, GeneratorError, LibraryError, OrchestratorError, PromptError, ValidationError,
};
pub use request::{GenerationRequest, GenerationResponse};
pub use result::{AttemptRecord, FailureKind, GenerationResult};
pub use verdict::ValidationVerdict;
