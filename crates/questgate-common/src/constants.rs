//! Shared constants for QuestGate components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default sign-off service HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Default verification code validity (1 hour)
pub const DEFAULT_CODE_TTL_SECS: u64 = 3600;

/// How long consumed/expired records are kept after their window (24 hours)
pub const DEFAULT_RETENTION_SECS: u64 = 86_400;

/// Fresh codes to try before giving up on a collision streak
pub const DEFAULT_MAX_ISSUE_ATTEMPTS: u32 = 8;

/// Upper bound on participant/quest identifier length
pub const MAX_ID_LEN: usize = 128;

/// Redis key prefixes
pub mod redis_keys {
    /// Code record: vcode:{CODE}
    pub const CODE_PREFIX: &str = "vcode:";

    /// Live code of a gate: vgate:{participant}:{quest}:{level}
    pub const GATE_PREFIX: &str = "vgate:";
}
