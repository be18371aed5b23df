//! Common error types for QuestGate components.

use thiserror::Error;

/// Common errors across QuestGate components
#[derive(Debug, Error)]
pub enum QuestGateError {
    /// Backing store connection/operation error
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Nothing stored under the requested key
    #[error("Not found: {0}")]
    NotFound(String),
}

impl QuestGateError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Store(_) => 503,
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
        }
    }

    /// Short machine-readable kind for response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// Why a redemption attempt did not unlock progress
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedeemError {
    /// No retained code matches this value for this participant
    #[error("No matching verification code")]
    NotFound,

    /// The validity window elapsed before redemption
    #[error("Verification code expired")]
    Expired,

    /// The code was redeemed before
    #[error("Verification code already used")]
    AlreadyConsumed,

    /// The backing store failed; says nothing about the code itself
    #[error("Store error: {0}")]
    Store(String),
}

impl RedeemError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Expired => 410,
            Self::AlreadyConsumed => 409,
            Self::Store(_) => 503,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::AlreadyConsumed => "already_consumed",
            Self::Store(_) => "store",
        }
    }

    /// Text safe to show the participant
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "That code was not recognised. Check it with your facilitator.",
            Self::Expired => "That code has expired. Ask your facilitator for a new one.",
            Self::AlreadyConsumed => "That code has already been used.",
            Self::Store(_) => "Verification is temporarily unavailable. Please try again.",
        }
    }

    /// True for the three outcomes that describe the code rather than the system
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

/// Why a code could not be issued
#[derive(Debug, Error)]
pub enum IssueError {
    /// Gate identifiers rejected
    #[error(transparent)]
    InvalidGate(#[from] QuestGateError),

    /// Every generated candidate collided with a retained code
    #[error("No free code after {0} attempts")]
    Exhausted(u32),

    /// The backing store failed
    #[error("Store error: {0}")]
    Store(String),
}

impl IssueError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidGate(e) => e.status_code(),
            Self::Exhausted(_) => 503,
            Self::Store(_) => 503,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGate(e) => e.kind(),
            Self::Exhausted(_) => "exhausted",
            Self::Store(_) => "store",
        }
    }
}
