//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types
//! that the billing domain builds on.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::UserId;
pub use timestamp::Timestamp;
