//! Credential check endpoint

use axum::{extract::State, Json};
use dirgate_ldap::{release, user_dn};
use serde::Deserialize;
use tracing::{debug, warn};

use super::MessageResponse;
use crate::error::ApiError;
use crate::server::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /login - Bind as the user to verify the password
///
/// Any failure, including an unreachable directory, is a 401 with the same
/// generic message.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    debug!("POST /login username={}", request.username);

    // An empty simple bind is anonymous and would succeed
    if request.password.is_empty() {
        debug!("Rejecting login with empty password for {}", request.username);
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let dn = user_dn(&state.config.ldap, &request.username);

    let mut session = state.directory.connect().await.map_err(|e| {
        warn!("Login for {} failed, directory unreachable: {}", request.username, e);
        ApiError::unauthorized(INVALID_CREDENTIALS)
    })?;

    let result = session.simple_bind(&dn, &request.password).await;
    release(session).await;

    match result {
        Ok(()) => {
            debug!("Login successful for {}", request.username);
            Ok(Json(MessageResponse::new("Login successful")))
        }
        Err(e) => {
            debug!("Login failed for {}: {}", request.username, e);
            Err(ApiError::unauthorized(INVALID_CREDENTIALS))
        }
    }
}
