//! Verification code persistence.
//!
//! The manager only talks to [`CodeStore`]. Every state transition a store
//! performs (insert with supersede, consume, expire, revoke) must be atomic
//! with respect to concurrent callers, across processes for shared backends.

mod memory;
mod redis_store;

pub use memory::MemoryCodeStore;
pub use redis_store::RedisCodeStore;

use async_trait::async_trait;
use questgate_common::{Gate, QuestGateError, RedeemError, VerificationCode};
use thiserror::Error;

/// Backend failures, never a statement about a code
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("unexpected reply: {0}")]
    Protocol(String),
}

impl From<StoreError> for RedeemError {
    fn from(err: StoreError) -> Self {
        RedeemError::Store(err.to_string())
    }
}

impl From<StoreError> for QuestGateError {
    fn from(err: StoreError) -> Self {
        QuestGateError::Store(err.to_string())
    }
}

/// Outcome of inserting a freshly generated code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored; the gate's previous live code, if any, was removed
    Inserted { superseded: Option<String> },
    /// The code value is already taken by a retained record
    Collision,
}

/// Outcome of a redemption compare-and-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Consumed(VerificationCode),
    NotFound,
    Expired,
    AlreadyConsumed,
}

/// Lifetimes applied to stored records
#[derive(Debug, Clone, Copy)]
pub struct Retention {
    /// Validity window of a new code
    pub ttl_secs: u64,
    /// Extra time terminal records are kept past the window
    pub retention_secs: u64,
}

impl Retention {
    /// Lifetime of a record key
    pub fn record_secs(&self) -> u64 {
        self.ttl_secs.saturating_add(self.retention_secs).max(1)
    }

    /// Lifetime of a gate pointer
    pub fn gate_secs(&self) -> u64 {
        self.ttl_secs.max(1)
    }
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store `record` unless its code value is taken, superseding the
    /// gate's active code
    async fn insert(
        &self,
        record: &VerificationCode,
        retention: Retention,
    ) -> Result<InsertOutcome, StoreError>;

    /// Load a record by canonical code
    async fn find(&self, code: &str) -> Result<Option<VerificationCode>, StoreError>;

    /// Current active record of a gate, whether or not its window has closed
    async fn find_active_for_gate(
        &self,
        gate: &Gate,
    ) -> Result<Option<VerificationCode>, StoreError>;

    /// Consume `code` for `participant_id` if it is active and inside its
    /// window at `now`; an elapsed active code becomes expired
    async fn redeem(
        &self,
        code: &str,
        participant_id: &str,
        now: i64,
    ) -> Result<RedeemOutcome, StoreError>;

    /// Remove the gate's active code; returns the removed code value
    async fn revoke_gate(&self, gate: &Gate) -> Result<Option<String>, StoreError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Key of a gate pointer: vgate:{participant}:{quest}:{level}
pub(crate) fn gate_key(gate: &Gate) -> String {
    format!(
        "{}{}",
        questgate_common::constants::redis_keys::GATE_PREFIX,
        gate
    )
}

/// Key of a code record: vcode:{CODE}
pub(crate) fn code_key(code: &str) -> String {
    format!(
        "{}{}",
        questgate_common::constants::redis_keys::CODE_PREFIX,
        code
    )
}
