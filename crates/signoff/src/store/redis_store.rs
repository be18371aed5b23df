//! Redis-backed code store.
//!
//! Records live as JSON under `vcode:{CODE}` and outlive their window by the
//! retention period. `vgate:{participant}:{quest}:{level}` points at the
//! gate's newest code. Every transition runs as a Lua script so that the
//! status check and the write happen in one atomic step on the server.
//!
//! The scripts touch record keys derived from the gate pointer, which are not
//! declared in KEYS; this store therefore expects a single Redis node (or a
//! primary), not Redis Cluster.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use questgate_common::constants::redis_keys::CODE_PREFIX;
use questgate_common::{Gate, VerificationCode};

use super::{
    CodeStore, InsertOutcome, RedeemOutcome, Retention, StoreError, code_key, gate_key,
};

/// Rewrites a record in place, keeping the remaining key lifetime
const REWRITE_FN: &str = r#"
local function rewrite(key, rec)
  local ttl = redis.call('PTTL', key)
  if ttl > 0 then
    redis.call('SET', key, cjson.encode(rec), 'PX', ttl)
  else
    redis.call('SET', key, cjson.encode(rec))
  end
end
"#;

// KEYS[1] code key, KEYS[2] gate key
// ARGV[1] record json, ARGV[2] record ttl, ARGV[3] gate ttl, ARGV[4] code,
// ARGV[5] code key prefix, ARGV[6] now
const INSERT_BODY: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return {'collision'}
end
local superseded = ''
local prev = redis.call('GET', KEYS[2])
if prev then
  local prev_key = ARGV[5] .. prev
  local raw = redis.call('GET', prev_key)
  if raw then
    local rec = cjson.decode(raw)
    if rec.status == 'active' then
      if tonumber(rec.expires_at) > tonumber(ARGV[6]) then
        redis.call('DEL', prev_key)
        superseded = prev
      else
        rec.status = 'expired'
        rewrite(prev_key, rec)
      end
    end
  end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SET', KEYS[2], ARGV[4], 'EX', ARGV[3])
return {'inserted', superseded}
"#;

// KEYS[1] code key
// ARGV[1] participant id, ARGV[2] now
const REDEEM_BODY: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {'not_found'}
end
local rec = cjson.decode(raw)
if rec.participant_id ~= ARGV[1] then
  return {'not_found'}
end
if rec.status == 'consumed' then
  return {'already_consumed'}
end
if rec.status == 'expired' then
  return {'expired'}
end
local now = tonumber(ARGV[2])
if now >= tonumber(rec.expires_at) then
  rec.status = 'expired'
  rewrite(KEYS[1], rec)
  return {'expired'}
end
rec.status = 'consumed'
rec.consumed_at = now
rewrite(KEYS[1], rec)
return {'consumed', cjson.encode(rec)}
"#;

// KEYS[1] gate key
// ARGV[1] code key prefix, ARGV[2] now
const REVOKE_BODY: &str = r#"
local code = redis.call('GET', KEYS[1])
if not code then
  return false
end
redis.call('DEL', KEYS[1])
local key = ARGV[1] .. code
local raw = redis.call('GET', key)
if not raw then
  return false
end
local rec = cjson.decode(raw)
if rec.status ~= 'active' then
  return false
end
if tonumber(rec.expires_at) <= tonumber(ARGV[2]) then
  rec.status = 'expired'
  rewrite(key, rec)
  return false
end
redis.call('DEL', key)
return code
"#;

/// Code store over a shared Redis instance
pub struct RedisCodeStore {
    /// Connection manager (auto-reconnecting)
    redis: ConnectionManager,
    insert_script: Script,
    redeem_script: Script,
    revoke_script: Script,
}

impl RedisCodeStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            insert_script: Script::new(&format!("{REWRITE_FN}{INSERT_BODY}")),
            redeem_script: Script::new(&format!("{REWRITE_FN}{REDEEM_BODY}")),
            revoke_script: Script::new(&format!("{REWRITE_FN}{REVOKE_BODY}")),
        }
    }

    /// Connect to `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self::new(redis))
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn insert(
        &self,
        record: &VerificationCode,
        retention: Retention,
    ) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.redis.clone();
        let value = serde_json::to_string(record)?;

        let reply: Vec<String> = self
            .insert_script
            .key(code_key(&record.code))
            .key(gate_key(&record.gate()))
            .arg(value)
            .arg(retention.record_secs())
            .arg(retention.gate_secs())
            .arg(&record.code)
            .arg(CODE_PREFIX)
            .arg(record.created_at)
            .invoke_async(&mut conn)
            .await?;

        parse_insert_reply(reply)
    }

    async fn find(&self, code: &str) -> Result<Option<VerificationCode>, StoreError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(code_key(code)).await?;

        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_active_for_gate(
        &self,
        gate: &Gate,
    ) -> Result<Option<VerificationCode>, StoreError> {
        let mut conn = self.redis.clone();
        let pointer: Option<String> = conn.get(gate_key(gate)).await?;

        let Some(code) = pointer else {
            return Ok(None);
        };

        Ok(self
            .find(&code)
            .await?
            .filter(|record| !record.status.is_terminal()))
    }

    async fn redeem(
        &self,
        code: &str,
        participant_id: &str,
        now: i64,
    ) -> Result<RedeemOutcome, StoreError> {
        let mut conn = self.redis.clone();

        let reply: Vec<String> = self
            .redeem_script
            .key(code_key(code))
            .arg(participant_id)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        parse_redeem_reply(reply)
    }

    async fn revoke_gate(&self, gate: &Gate) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        let now = chrono::Utc::now().timestamp();

        let removed: Option<String> = self
            .revoke_script
            .key(gate_key(gate))
            .arg(CODE_PREFIX)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn parse_insert_reply(reply: Vec<String>) -> Result<InsertOutcome, StoreError> {
    match reply.first().map(String::as_str) {
        Some("collision") => Ok(InsertOutcome::Collision),
        Some("inserted") => {
            let superseded = reply.get(1).filter(|code| !code.is_empty()).cloned();
            Ok(InsertOutcome::Inserted { superseded })
        }
        _ => Err(StoreError::Protocol(format!("insert script returned {reply:?}"))),
    }
}

fn parse_redeem_reply(reply: Vec<String>) -> Result<RedeemOutcome, StoreError> {
    match reply.first().map(String::as_str) {
        Some("not_found") => Ok(RedeemOutcome::NotFound),
        Some("expired") => Ok(RedeemOutcome::Expired),
        Some("already_consumed") => Ok(RedeemOutcome::AlreadyConsumed),
        Some("consumed") => {
            let raw = reply
                .get(1)
                .ok_or_else(|| StoreError::Protocol("consumed without record".to_string()))?;
            Ok(RedeemOutcome::Consumed(serde_json::from_str(raw)?))
        }
        _ => Err(StoreError::Protocol(format!("redeem script returned {reply:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questgate_common::CodeStatus;

    #[test]
    fn test_parse_insert_reply() {
        assert_eq!(
            parse_insert_reply(vec!["collision".into()]).unwrap(),
            InsertOutcome::Collision
        );
        assert_eq!(
            parse_insert_reply(vec!["inserted".into(), "".into()]).unwrap(),
            InsertOutcome::Inserted { superseded: None }
        );
        assert_eq!(
            parse_insert_reply(vec!["inserted".into(), "ABC234".into()]).unwrap(),
            InsertOutcome::Inserted { superseded: Some("ABC234".into()) }
        );
        assert!(parse_insert_reply(vec![]).is_err());
    }

    #[test]
    fn test_parse_redeem_reply() {
        assert_eq!(
            parse_redeem_reply(vec!["already_consumed".into()]).unwrap(),
            RedeemOutcome::AlreadyConsumed
        );
        assert_eq!(
            parse_redeem_reply(vec!["expired".into()]).unwrap(),
            RedeemOutcome::Expired
        );
        assert!(parse_redeem_reply(vec!["consumed".into()]).is_err());
        assert!(parse_redeem_reply(vec!["bogus".into()]).is_err());
    }

    #[test]
    fn test_parse_record_rewritten_by_lua() {
        // cjson reorders keys and escapes '/'
        let raw = r#"{"status":"consumed","quest_id":"q\/7","code":"A7X99B",
            "expires_at":1060,"level_index":2,"created_at":1000,
            "participant_id":"p-1","consumed_at":1030}"#;
        let reply = vec!["consumed".to_string(), raw.to_string()];
        let RedeemOutcome::Consumed(record) = parse_redeem_reply(reply).unwrap() else {
            panic!("expected consumed");
        };
        assert_eq!(record.quest_id, "q/7");
        assert_eq!(record.status, CodeStatus::Consumed);
        assert_eq!(record.consumed_at, Some(1030));
    }

    mod live {
        //! Scripts against a real server. Skipped unless `REDIS_URL` is set.

        use std::sync::Arc;

        use futures::future::join_all;
        use questgate_common::{Gate, RedeemError, VerificationCode};

        use super::super::RedisCodeStore;
        use crate::codes::{CodeManager, CodePolicy};
        use crate::store::{CodeStore, InsertOutcome, RedeemOutcome, Retention};

        async fn store() -> Option<RedisCodeStore> {
            let url = std::env::var("REDIS_URL").ok()?;
            Some(RedisCodeStore::connect(&url).await.unwrap())
        }

        /// Participant id unique to this run so reruns never see old keys
        fn participant(tag: &str) -> String {
            let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
            format!("it-{tag}-{}-{nanos}", std::process::id())
        }

        fn manager(store: RedisCodeStore, ttl_secs: u64) -> Arc<CodeManager> {
            let policy = CodePolicy {
                ttl_secs,
                retention_secs: 120,
                ..Default::default()
            };
            Arc::new(CodeManager::new(Arc::new(store), policy))
        }

        #[tokio::test]
        async fn test_redis_reissue_supersedes() {
            let Some(store) = store().await else { return };
            let codes = manager(store, 60);
            let p = participant("supersede");
            let gate = Gate::new(p.as_str(), "quest-7", 1);

            let first = codes.issue(gate.clone()).await.unwrap();
            let second = codes.issue(gate.clone()).await.unwrap();
            assert_eq!(second.superseded.as_deref(), Some(first.code.as_str()));

            let outstanding = codes.outstanding(&gate).await.unwrap().unwrap();
            assert_eq!(outstanding.code, second.code);

            assert_eq!(codes.redeem(&first.code, &p).await, Err(RedeemError::NotFound));
            assert!(codes.redeem(&second.display, &p).await.is_ok());
            assert!(codes.outstanding(&gate).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_redis_concurrent_redemption_single_winner() {
            let Some(store) = store().await else { return };
            let codes = manager(store, 60);
            let p = participant("race");
            let issued = codes.issue(Gate::new(p.as_str(), "quest-7", 0)).await.unwrap();

            let attempts = (0..32).map(|_| {
                let codes = codes.clone();
                let code = issued.code.clone();
                let p = p.clone();
                tokio::spawn(async move { codes.redeem(&code, &p).await })
            });
            let results: Vec<_> = join_all(attempts)
                .await
                .into_iter()
                .map(|joined| joined.unwrap())
                .collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert_eq!(
                results
                    .iter()
                    .filter(|r| matches!(r, Err(RedeemError::AlreadyConsumed)))
                    .count(),
                31
            );
        }

        #[tokio::test]
        async fn test_redis_expired_stays_expired() {
            let Some(store) = store().await else { return };
            let codes = manager(store, 60);
            let p = participant("expiry");
            let issued = codes.issue(Gate::new(p.as_str(), "quest-7", 0)).await.unwrap();

            assert_eq!(
                codes.redeem_at(&issued.code, &p, issued.expires_at).await,
                Err(RedeemError::Expired)
            );
            // Back inside the window by the clock, but the record is terminal
            assert_eq!(codes.redeem(&issued.code, &p).await, Err(RedeemError::Expired));
        }

        #[tokio::test]
        async fn test_redis_revoke() {
            let Some(store) = store().await else { return };
            let codes = manager(store, 60);
            let p = participant("revoke");
            let gate = Gate::new(p.as_str(), "quest-7", 3);
            let issued = codes.issue(gate.clone()).await.unwrap();

            assert_eq!(codes.revoke(&gate).await.unwrap(), Some(issued.code.clone()));
            assert_eq!(codes.revoke(&gate).await.unwrap(), None);
            assert!(codes.outstanding(&gate).await.unwrap().is_none());
            assert_eq!(codes.redeem(&issued.code, &p).await, Err(RedeemError::NotFound));
        }

        #[tokio::test]
        async fn test_redis_insert_collision_and_lapsed_supersede() {
            let Some(store) = store().await else { return };
            let retention = Retention {
                ttl_secs: 60,
                retention_secs: 120,
            };
            let p = participant("collide");
            let now = chrono::Utc::now().timestamp();

            // Issued long enough ago that its window has closed
            let gate = Gate::new(p.as_str(), "quest-7", 0);
            let code = questgate_common::code::generate();
            let lapsed = VerificationCode::new(code.clone(), &gate, now - 120, 60);
            assert_eq!(
                store.insert(&lapsed, retention).await.unwrap(),
                InsertOutcome::Inserted { superseded: None }
            );

            // Same value for another gate is refused while retained
            let other_gate = Gate::new(p.as_str(), "quest-8", 0);
            let other = VerificationCode::new(code.clone(), &other_gate, now, 60);
            assert_eq!(store.insert(&other, retention).await.unwrap(), InsertOutcome::Collision);

            // Replacing a lapsed code reports nothing superseded and marks it expired
            let fresh = VerificationCode::new(questgate_common::code::generate(), &gate, now, 60);
            assert_eq!(
                store.insert(&fresh, retention).await.unwrap(),
                InsertOutcome::Inserted { superseded: None }
            );

            let old = store.find(&code).await.unwrap().unwrap();
            assert_eq!(old.status, questgate_common::CodeStatus::Expired);
            assert_eq!(store.redeem(&code, &p, now).await.unwrap(), RedeemOutcome::Expired);
        }
    }
}
