//! # QuestGate Common
//!
//! Shared types, traits, and utilities used across QuestGate components.
//!
//! ## Modules
//! - `code` - Verification code generation and formatting
//! - `types` - Core data structures (Gate, VerificationCode, etc.)
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod code;
pub mod constants;
pub mod error;
pub mod types;

pub use error::{IssueError, QuestGateError, RedeemError};
pub use types::*;
