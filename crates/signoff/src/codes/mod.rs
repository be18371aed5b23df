//! Verification code issuing and redemption.
//!
//! Facilitators issue a code for a gate; participants redeem it once to
//! unlock that level. Pure helpers (generate/format/normalize) live in
//! `questgate_common::code`.

mod manager;

pub use manager::{CodeManager, CodePolicy};
