//! HTTP route handlers for Signoff.
//!
//! The platform backend calls these after it has authenticated the
//! facilitator or participant; no session handling happens here.

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use questgate_common::{IssueError, QuestGateError, RedeemError};

use crate::state::AppState;

mod codes;
mod extract;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/stats", get(health::stats))

        // Facilitator: issue, look up, and withdraw codes
        .route("/codes", post(codes::issue_code))
        .route(
            "/codes/{participant_id}/{quest_id}/{level_index}",
            get(codes::outstanding_code).delete(codes::revoke_code),
        )

        // Participant: redeem a code
        .route("/redeem", post(codes::redeem_code))

        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Error response `{ "error": kind, "message": text }`
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: u16, kind: &'static str, message: String) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            kind,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RedeemError> for ApiError {
    fn from(err: RedeemError) -> Self {
        if let RedeemError::Store(ref detail) = err {
            tracing::error!(error = %detail, "Redemption failed in store");
        }
        Self::new(err.status_code(), err.kind(), err.user_message().to_string())
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        if !matches!(err, IssueError::InvalidGate(_)) {
            tracing::error!(error = %err, "Issuing failed");
        }
        let message = match err {
            IssueError::InvalidGate(ref e) => e.to_string(),
            _ => "Could not issue a code right now. Please try again.".to_string(),
        };
        Self::new(err.status_code(), err.kind(), message)
    }
}

impl From<QuestGateError> for ApiError {
    fn from(err: QuestGateError) -> Self {
        if err.status_code() >= 500 {
            tracing::error!(error = %err, "Request failed");
        }
        Self::new(err.status_code(), err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let err = QuestGateError::InvalidInput(rejection.body_text());
        Self::new(err.status_code(), err.kind(), err.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        let err = QuestGateError::InvalidInput(rejection.body_text());
        Self::new(err.status_code(), err.kind(), err.to_string())
    }
}
