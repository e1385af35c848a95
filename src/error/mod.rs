//! Error Handling Module
//!
//! This module provides the error taxonomy for the gateway:
//! - Core error type (`LlmError`) and its coarse classification (`ErrorKind`)
//! - The caller-facing `ErrorEnvelope`
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_bridge::error::{ErrorKind, LlmError};
//!
//! let error = LlmError::ValidationError("Model not supported: gpt-x".into());
//! assert_eq!(error.kind(), ErrorKind::Validation);
//! assert_eq!(error.status_code(), 400);
//! ```

// Module declarations
mod conversions;
pub mod types;

// Re-exports for public API
pub use types::*;
