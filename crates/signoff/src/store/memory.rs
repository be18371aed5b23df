//! In-process code store for development and tests.
//!
//! One mutex guards both maps, so each operation is a single critical
//! section. State does not survive a restart and is not shared between
//! processes.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use questgate_common::{CodeStatus, Gate, VerificationCode};

use super::{CodeStore, InsertOutcome, RedeemOutcome, Retention, StoreError};

struct Entry {
    record: VerificationCode,
    /// Unix time after which the record is dropped
    drop_at: i64,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Entry>,
    gates: HashMap<Gate, String>,
}

impl Inner {
    /// Drop records whose retention has run out
    fn purge(&mut self, now: i64) {
        self.records.retain(|_, entry| entry.drop_at > now);
        let records = &self.records;
        self.gates.retain(|_, code| records.contains_key(code));
    }
}

/// Code store held in process memory
#[derive(Default)]
pub struct MemoryCodeStore {
    inner: Mutex<Inner>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained records
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn insert(
        &self,
        record: &VerificationCode,
        retention: Retention,
    ) -> Result<InsertOutcome, StoreError> {
        let now = record.created_at;
        let mut inner = self.inner.lock().await;
        inner.purge(now);

        if inner.records.contains_key(&record.code) {
            return Ok(InsertOutcome::Collision);
        }

        let gate = record.gate();
        let mut superseded = None;
        if let Some(prev) = inner.gates.get(&gate).cloned() {
            if let Some(entry) = inner.records.get_mut(&prev) {
                if entry.record.status == CodeStatus::Active {
                    if entry.record.is_expired_at(now) {
                        entry.record.status = CodeStatus::Expired;
                    } else {
                        inner.records.remove(&prev);
                        superseded = Some(prev);
                    }
                }
            }
        }

        inner.records.insert(
            record.code.clone(),
            Entry {
                record: record.clone(),
                drop_at: now.saturating_add(retention.record_secs() as i64),
            },
        );
        inner.gates.insert(gate, record.code.clone());

        Ok(InsertOutcome::Inserted { superseded })
    }

    async fn find(&self, code: &str) -> Result<Option<VerificationCode>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.records.get(code).map(|entry| entry.record.clone()))
    }

    async fn find_active_for_gate(
        &self,
        gate: &Gate,
    ) -> Result<Option<VerificationCode>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .gates
            .get(gate)
            .and_then(|code| inner.records.get(code))
            .map(|entry| entry.record.clone())
            .filter(|record| !record.status.is_terminal()))
    }

    async fn redeem(
        &self,
        code: &str,
        participant_id: &str,
        now: i64,
    ) -> Result<RedeemOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner.records.get_mut(code) else {
            return Ok(RedeemOutcome::NotFound);
        };
        let record = &mut entry.record;

        if record.participant_id != participant_id {
            return Ok(RedeemOutcome::NotFound);
        }

        match record.status {
            CodeStatus::Consumed => Ok(RedeemOutcome::AlreadyConsumed),
            CodeStatus::Expired => Ok(RedeemOutcome::Expired),
            CodeStatus::Active if record.is_expired_at(now) => {
                record.status = CodeStatus::Expired;
                Ok(RedeemOutcome::Expired)
            }
            CodeStatus::Active => {
                record.status = CodeStatus::Consumed;
                record.consumed_at = Some(now);
                Ok(RedeemOutcome::Consumed(record.clone()))
            }
        }
    }

    async fn revoke_gate(&self, gate: &Gate) -> Result<Option<String>, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut inner = self.inner.lock().await;

        let Some(code) = inner.gates.remove(gate) else {
            return Ok(None);
        };
        let Some(entry) = inner.records.get_mut(&code) else {
            return Ok(None);
        };

        if entry.record.status != CodeStatus::Active {
            return Ok(None);
        }
        if entry.record.is_expired_at(now) {
            entry.record.status = CodeStatus::Expired;
            return Ok(None);
        }

        inner.records.remove(&code);
        Ok(Some(code))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETENTION: Retention = Retention {
        ttl_secs: 60,
        retention_secs: 600,
    };

    fn record(code: &str, gate: &Gate, now: i64) -> VerificationCode {
        VerificationCode::new(code.to_string(), gate, now, RETENTION.ttl_secs)
    }

    #[tokio::test]
    async fn test_insert_detects_collision() {
        let store = MemoryCodeStore::new();
        let a = Gate::new("p-1", "q-1", 0);
        let b = Gate::new("p-2", "q-1", 0);

        let first = store.insert(&record("ABC234", &a, 1_000), RETENTION).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted { superseded: None });

        let second = store.insert(&record("ABC234", &b, 1_000), RETENTION).await.unwrap();
        assert_eq!(second, InsertOutcome::Collision);
    }

    #[tokio::test]
    async fn test_insert_supersedes_live_code() {
        let store = MemoryCodeStore::new();
        let gate = Gate::new("p-1", "q-1", 0);

        store.insert(&record("ABC234", &gate, 1_000), RETENTION).await.unwrap();
        let outcome = store.insert(&record("XYZ789", &gate, 1_010), RETENTION).await.unwrap();

        assert_eq!(
            outcome,
            InsertOutcome::Inserted { superseded: Some("ABC234".to_string()) }
        );
        assert!(store.find("ABC234").await.unwrap().is_none());
        let live = store.find_active_for_gate(&gate).await.unwrap().unwrap();
        assert_eq!(live.code, "XYZ789");
    }

    #[tokio::test]
    async fn test_insert_marks_elapsed_code_expired() {
        let store = MemoryCodeStore::new();
        let gate = Gate::new("p-1", "q-1", 0);

        store.insert(&record("ABC234", &gate, 1_000), RETENTION).await.unwrap();
        let outcome = store.insert(&record("XYZ789", &gate, 1_100), RETENTION).await.unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted { superseded: None });
        let old = store.find("ABC234").await.unwrap().unwrap();
        assert_eq!(old.status, CodeStatus::Expired);
    }

    #[tokio::test]
    async fn test_redeem_transitions() {
        let store = MemoryCodeStore::new();
        let gate = Gate::new("p-1", "q-1", 4);
        store.insert(&record("ABC234", &gate, 1_000), RETENTION).await.unwrap();

        assert_eq!(
            store.redeem("ABC234", "p-2", 1_001).await.unwrap(),
            RedeemOutcome::NotFound
        );

        let RedeemOutcome::Consumed(consumed) = store.redeem("ABC234", "p-1", 1_001).await.unwrap()
        else {
            panic!("expected consumed");
        };
        assert_eq!(consumed.consumed_at, Some(1_001));
        assert_eq!(consumed.level_index, 4);

        assert_eq!(
            store.redeem("ABC234", "p-1", 1_002).await.unwrap(),
            RedeemOutcome::AlreadyConsumed
        );
        // Consumed stays consumed after the window
        assert_eq!(
            store.redeem("ABC234", "p-1", 5_000).await.unwrap(),
            RedeemOutcome::AlreadyConsumed
        );
        assert!(store.find_active_for_gate(&gate).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_is_terminal() {
        let store = MemoryCodeStore::new();
        let gate = Gate::new("p-1", "q-1", 0);
        store.insert(&record("ABC234", &gate, 1_000), RETENTION).await.unwrap();

        assert_eq!(
            store.redeem("ABC234", "p-1", 1_060).await.unwrap(),
            RedeemOutcome::Expired
        );
        // A clock that goes backwards does not revive it
        assert_eq!(
            store.redeem("ABC234", "p-1", 1_010).await.unwrap(),
            RedeemOutcome::Expired
        );
    }

    #[tokio::test]
    async fn test_purge_drops_after_retention() {
        let store = MemoryCodeStore::new();
        let gate = Gate::new("p-1", "q-1", 0);
        let other = Gate::new("p-2", "q-1", 0);
        store.insert(&record("ABC234", &gate, 1_000), RETENTION).await.unwrap();
        assert_eq!(store.len().await, 1);

        store.insert(&record("XYZ789", &other, 1_000 + 660), RETENTION).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.find("ABC234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_unknown_gate() {
        let store = MemoryCodeStore::new();
        let gate = Gate::new("p-1", "q-1", 0);
        assert_eq!(store.revoke_gate(&gate).await.unwrap(), None);
    }
}
