//! The verification code manager.

use std::sync::Arc;

use questgate_common::code;
use questgate_common::{
    Gate, IssueError, IssuedCode, QuestGateError, RedeemError, Redemption, VerificationCode,
};

use crate::store::{CodeStore, InsertOutcome, RedeemOutcome, Retention};

/// Lifetimes and retry budget for issued codes
#[derive(Debug, Clone, Copy)]
pub struct CodePolicy {
    /// Validity window in seconds
    pub ttl_secs: u64,
    /// How long terminal records stay visible after the window
    pub retention_secs: u64,
    /// Fresh codes to try when the generated value is taken
    pub max_issue_attempts: u32,
}

impl Default for CodePolicy {
    fn default() -> Self {
        use questgate_common::constants::*;
        Self {
            ttl_secs: DEFAULT_CODE_TTL_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
            max_issue_attempts: DEFAULT_MAX_ISSUE_ATTEMPTS,
        }
    }
}

impl CodePolicy {
    fn retention(&self) -> Retention {
        Retention {
            ttl_secs: self.ttl_secs,
            retention_secs: self.retention_secs,
        }
    }
}

/// Issues and redeems verification codes against a [`CodeStore`]
pub struct CodeManager {
    store: Arc<dyn CodeStore>,
    policy: CodePolicy,
}

impl CodeManager {
    pub fn new(store: Arc<dyn CodeStore>, policy: CodePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CodePolicy {
        &self.policy
    }

    /// Issue a new code for `gate`, replacing any outstanding one
    pub async fn issue(&self, gate: Gate) -> Result<IssuedCode, IssueError> {
        gate.validate()?;

        let retention = self.policy.retention();
        let attempts = self.policy.max_issue_attempts.max(1);

        for attempt in 1..=attempts {
            let now = chrono::Utc::now().timestamp();
            let record = VerificationCode::new(code::generate(), &gate, now, self.policy.ttl_secs);

            let outcome = self
                .store
                .insert(&record, retention)
                .await
                .map_err(|e| IssueError::Store(e.to_string()))?;

            match outcome {
                InsertOutcome::Collision => {
                    tracing::debug!(
                        attempt,
                        code = %code::mask(&record.code),
                        "Generated code already taken, retrying"
                    );
                }
                InsertOutcome::Inserted { superseded } => {
                    if let Some(ref old) = superseded {
                        tracing::info!(
                            gate = %gate,
                            superseded = %code::mask(old),
                            "Outstanding code replaced"
                        );
                    }

                    tracing::info!(
                        gate = %gate,
                        code = %code::mask(&record.code),
                        expires_at = record.expires_at,
                        "Issued verification code"
                    );

                    return Ok(IssuedCode {
                        display: record.display(),
                        code: record.code,
                        gate,
                        expires_at: record.expires_at,
                        superseded,
                    });
                }
            }
        }

        tracing::warn!(gate = %gate, attempts, "Could not find a free code");
        Err(IssueError::Exhausted(attempts))
    }

    /// Redeem `input` (any casing, dashed or not) for `participant_id`
    pub async fn redeem(
        &self,
        input: &str,
        participant_id: &str,
    ) -> Result<Redemption, RedeemError> {
        self.redeem_at(input, participant_id, chrono::Utc::now().timestamp())
            .await
    }

    /// Redeem as of `now` (Unix seconds)
    pub async fn redeem_at(
        &self,
        input: &str,
        participant_id: &str,
        now: i64,
    ) -> Result<Redemption, RedeemError> {
        let canonical = code::normalize(input);
        if !code::is_well_formed(&canonical) || participant_id.is_empty() {
            tracing::debug!(participant_id = %participant_id, "Malformed redemption attempt");
            return Err(RedeemError::NotFound);
        }

        let outcome = self.store.redeem(&canonical, participant_id, now).await?;

        match outcome {
            RedeemOutcome::Consumed(record) => {
                tracing::info!(
                    participant_id = %record.participant_id,
                    quest_id = %record.quest_id,
                    level_index = record.level_index,
                    code = %code::mask(&canonical),
                    "Verification code redeemed"
                );
                Ok(Redemption {
                    consumed_at: record.consumed_at.unwrap_or(now),
                    participant_id: record.participant_id,
                    quest_id: record.quest_id,
                    level_index: record.level_index,
                })
            }
            RedeemOutcome::NotFound => {
                tracing::debug!(
                    participant_id = %participant_id,
                    code = %code::mask(&canonical),
                    "No matching verification code"
                );
                Err(RedeemError::NotFound)
            }
            RedeemOutcome::Expired => {
                tracing::debug!(
                    participant_id = %participant_id,
                    code = %code::mask(&canonical),
                    "Verification code expired"
                );
                Err(RedeemError::Expired)
            }
            RedeemOutcome::AlreadyConsumed => {
                tracing::warn!(
                    participant_id = %participant_id,
                    code = %code::mask(&canonical),
                    "Verification code reused"
                );
                Err(RedeemError::AlreadyConsumed)
            }
        }
    }

    /// The gate's code if it is still redeemable
    pub async fn outstanding(&self, gate: &Gate) -> Result<Option<VerificationCode>, QuestGateError> {
        gate.validate()?;
        let now = chrono::Utc::now().timestamp();
        let record = self.store.find_active_for_gate(gate).await?;
        Ok(record.filter(|r| r.is_live_at(now)))
    }

    /// Withdraw the gate's outstanding code without issuing another
    pub async fn revoke(&self, gate: &Gate) -> Result<Option<String>, QuestGateError> {
        gate.validate()?;
        let removed = self.store.revoke_gate(gate).await?;

        if let Some(ref code) = removed {
            tracing::info!(gate = %gate, code = %code::mask(code), "Verification code revoked");
        }

        Ok(removed)
    }

    /// Backing store reachability
    pub async fn store_ready(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Store ping failed");
                false
            }
        }
    }
}
