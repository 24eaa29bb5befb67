//! Status check handlers
//!
//! Lightweight client heartbeat records, open to anonymous callers.

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use cortexify_common::{db::models::StatusCheck, errors::Result, Repository};
use serde::Deserialize;
use tracing::instrument;
use validator::Validate;

/// Maximum heartbeats returned by a single listing
const STATUS_LIST_LIMIT: u64 = 1000;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStatusRequest {
    #[validate(length(min = 1, max = 100, message = "Client name must be 1-100 characters"))]
    pub client_name: String,
}

/// Record a client heartbeat
///
/// POST /api/status
#[instrument(skip(state, request), fields(client_name = %request.client_name))]
pub async fn create_status_check(
    State(state): State<AppState>,
    Json(request): Json<CreateStatusRequest>,
) -> Result<(StatusCode, Json<StatusCheck>)> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());
    let check = repo.create_status_check(request.client_name).await?;

    Ok((StatusCode::CREATED, Json(check)))
}

/// Recent heartbeats, newest first
///
/// GET /api/status
#[instrument(skip(state))]
pub async fn list_status_checks(
    State(state): State<AppState>,
) -> Result<Json<Vec<StatusCheck>>> {
    let repo = Repository::new(state.db.clone());
    let checks = repo.list_status_checks(STATUS_LIST_LIMIT).await?;

    Ok(Json(checks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_status_request_validation() {
        let request = CreateStatusRequest {
            client_name: "web-client".to_string(),
        };
        assert!(request.validate().is_ok());

        let request = CreateStatusRequest {
            client_name: String::new(),
        };
        assert!(request.validate().is_err());

        let request = CreateStatusRequest {
            client_name: "a".repeat(101),
        };
        assert!(request.validate().is_err());
    }
}
