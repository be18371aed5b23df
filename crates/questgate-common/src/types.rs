//! Core types shared across QuestGate components.

use serde::{Deserialize, Serialize};

use crate::code;
use crate::constants::MAX_ID_LEN;
use crate::error::QuestGateError;

/// The progress gate a code unlocks: one level of one quest for one participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gate {
    pub participant_id: String,
    pub quest_id: String,
    pub level_index: u32,
}

impl Gate {
    pub fn new(
        participant_id: impl Into<String>,
        quest_id: impl Into<String>,
        level_index: u32,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            quest_id: quest_id.into(),
            level_index,
        }
    }

    /// Reject empty, oversized, or `:`-bearing identifiers
    ///
    /// Identifiers end up inside store keys, so the separator is not allowed.
    pub fn validate(&self) -> Result<(), QuestGateError> {
        validate_id("participant_id", &self.participant_id)?;
        validate_id("quest_id", &self.quest_id)?;
        Ok(())
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.participant_id, self.quest_id, self.level_index
        )
    }
}

pub(crate) fn validate_id(field: &str, value: &str) -> Result<(), QuestGateError> {
    if value.trim().is_empty() {
        return Err(QuestGateError::InvalidInput(format!("{field} is empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(QuestGateError::InvalidInput(format!(
            "{field} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if value.contains(':') {
        return Err(QuestGateError::InvalidInput(format!(
            "{field} must not contain ':'"
        )));
    }
    Ok(())
}

/// Lifecycle state of a verification code
///
/// `Active` moves to either terminal state and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    /// Issued, not yet redeemed, window still open (as far as the store knows)
    #[default]
    Active,
    /// Redeemed once
    Consumed,
    /// Window elapsed before redemption
    Expired,
}

impl CodeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A stored verification code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// Canonical code value
    pub code: String,

    pub participant_id: String,
    pub quest_id: String,
    pub level_index: u32,

    /// Issue timestamp (Unix epoch seconds)
    pub created_at: i64,

    /// End of the validity window (Unix epoch seconds)
    pub expires_at: i64,

    /// Redemption timestamp
    #[serde(default)]
    pub consumed_at: Option<i64>,

    #[serde(default)]
    pub status: CodeStatus,
}

impl VerificationCode {
    /// New active code for `gate`, valid for `ttl_secs` from `now`
    pub fn new(code: String, gate: &Gate, now: i64, ttl_secs: u64) -> Self {
        Self {
            code,
            participant_id: gate.participant_id.clone(),
            quest_id: gate.quest_id.clone(),
            level_index: gate.level_index,
            created_at: now,
            expires_at: now.saturating_add(ttl_secs as i64),
            consumed_at: None,
            status: CodeStatus::Active,
        }
    }

    pub fn gate(&self) -> Gate {
        Gate::new(
            self.participant_id.clone(),
            self.quest_id.clone(),
            self.level_index,
        )
    }

    /// Display form of the code
    pub fn display(&self) -> String {
        code::format(&self.code)
    }

    /// The window is closed at `expires_at` itself
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Active and inside its window
    pub fn is_live_at(&self, now: i64) -> bool {
        self.status == CodeStatus::Active && !self.is_expired_at(now)
    }
}

/// Result of a facilitator issuing a code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCode {
    /// Canonical code
    pub code: String,

    /// `XXX-XXX` form to show the facilitator
    pub display: String,

    pub gate: Gate,

    pub expires_at: i64,

    /// Previously outstanding code of the gate that this one replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<String>,
}

/// Result of a successful redemption: the progress it authorizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub participant_id: String,
    pub quest_id: String,
    pub level_index: u32,
    pub consumed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_validation() {
        assert!(Gate::new("p-1", "quest-7", 2).validate().is_ok());
        assert!(Gate::new("", "quest-7", 2).validate().is_err());
        assert!(Gate::new("p-1", "   ", 2).validate().is_err());
        assert!(Gate::new("p:1", "quest-7", 2).validate().is_err());
        assert!(Gate::new("p-1", "q".repeat(MAX_ID_LEN + 1), 0).validate().is_err());
    }

    #[test]
    fn test_window_boundaries() {
        let gate = Gate::new("p-1", "quest-7", 2);
        let record = VerificationCode::new("A7X99B".to_string(), &gate, 1_000, 60);
        assert_eq!(record.expires_at, 1_060);
        assert!(record.is_live_at(1_059));
        assert!(!record.is_live_at(1_060));
        assert!(record.is_expired_at(1_060));
        assert_eq!(record.gate(), gate);
        assert_eq!(record.display(), "A7X-99B");
    }

    #[test]
    fn test_record_json_shape() {
        let gate = Gate::new("p-1", "quest-7", 2);
        let record = VerificationCode::new("A7X99B".to_string(), &gate, 1_000, 60);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json["consumed_at"].is_null());

        // Records written without status/consumed_at still load
        let legacy = r#"{"code":"A7X99B","participant_id":"p-1","quest_id":"quest-7",
            "level_index":2,"created_at":1000,"expires_at":1060}"#;
        let parsed: VerificationCode = serde_json::from_str(legacy).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CodeStatus::Active.is_terminal());
        assert!(CodeStatus::Consumed.is_terminal());
        assert!(CodeStatus::Expired.is_terminal());
        assert_eq!(CodeStatus::default(), CodeStatus::Active);
    }
}
