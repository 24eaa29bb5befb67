//! Authentication handlers
//!
//! Email/password registration with OTP verification, login issuing
//! JWT bearer tokens, and the OTP-based password reset flow.

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use cortexify_common::{
    auth::{self, AuthContext},
    db::models::{User, UserResponse},
    errors::{AppError, Result},
    metrics, Repository,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 50, message = "Username must be 1-50 characters"))]
    pub username: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,

    #[validate(length(equal = 6, message = "OTP must be 6 digits"))]
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,

    #[validate(length(equal = 6, message = "OTP must be 6 digits"))]
    pub otp: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: uuid::Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Register a new user account
///
/// POST /api/auth/register
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());

    if repo.find_user_by_email(&request.email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let password_hash = auth::hash_password(&request.password)?;
    let otp = auth::generate_otp();
    let now = Utc::now();

    let user = repo
        .create_user(
            request.email.clone(),
            request.username.clone(),
            password_hash,
            otp.clone(),
            now,
        )
        .await?;

    state
        .mailer
        .send_verification_otp(&user.email, &user.username, &otp);
    metrics::record_otp_issued("verification");

    info!(user_id = %user.id, "User registered, verification OTP issued");

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Verify a registration OTP, activating the account
///
/// POST /api/auth/verify-otp
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());

    let user = repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or(AppError::UserNotFound)?;

    check_otp(&user, &request.otp, &state)?;
    repo.mark_user_verified(user.id).await?;

    info!(user_id = %user.id, "Email verified");

    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// Authenticate and issue a bearer token
///
/// POST /api/auth/login
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let repo = Repository::new(state.db.clone());

    // Unknown email and wrong password answer identically
    let user = repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !auth::verify_password(&request.password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_verified {
        return Err(AppError::EmailNotVerified);
    }

    if !user.is_active {
        return Err(AppError::Unauthorized {
            message: "Account is deactivated".to_string(),
        });
    }

    let access_token = state.jwt.generate_token(user.id, &user.email)?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user_id: user.id,
        username: user.username,
    }))
}

/// Issue a password-reset OTP
///
/// POST /api/auth/request-otp
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(request): Json<RequestOtpRequest>,
) -> Result<Json<MessageResponse>> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());

    let user = repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let otp = auth::generate_otp();
    let user = repo.set_user_otp(user.id, otp.clone(), Utc::now()).await?;

    state
        .mailer
        .send_reset_otp(&user.email, &user.username, &otp);
    metrics::record_otp_issued("reset");

    info!(user_id = %user.id, "Password reset OTP issued");

    Ok(Json(MessageResponse::new("OTP sent to your email")))
}

/// Reset a password with a previously issued OTP
///
/// POST /api/auth/reset-password
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());

    let user = repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or(AppError::UserNotFound)?;

    check_otp(&user, &request.otp, &state)?;

    let password_hash = auth::hash_password(&request.new_password)?;
    repo.update_user_password(user.id, password_hash).await?;

    info!(user_id = %user.id, "Password reset");

    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// Current authenticated user
///
/// GET /api/auth/me
#[instrument(skip(state, auth))]
pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<UserResponse>> {
    let repo = Repository::new(state.db.clone());

    // A valid token for a deleted user is still unauthorized
    let user = repo
        .find_user_by_id(auth.user_id)
        .await?
        .ok_or(AppError::Unauthorized {
            message: "Unknown user".to_string(),
        })?;

    Ok(Json(user.into()))
}

/// Validate a submitted OTP against the pending one on the user record.
///
/// Expiry is reported before a code mismatch so the client knows a
/// fresh OTP is needed.
fn check_otp(user: &User, submitted: &str, state: &AppState) -> Result<()> {
    let (Some(stored), Some(issued_at)) = (&user.otp_code, user.otp_issued_at) else {
        return Err(AppError::OtpInvalid);
    };

    if !auth::otp_is_fresh(issued_at.into(), Utc::now(), state.config.otp_ttl()) {
        return Err(AppError::OtpExpired);
    }

    if stored != submitted {
        return Err(AppError::OtpInvalid);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..valid_clone(&valid)
        };
        assert!(bad_email.validate().is_err());

        let short_password = RegisterRequest {
            password: "short".to_string(),
            ..valid_clone(&valid)
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_otp_length_validation() {
        let request = VerifyOtpRequest {
            email: "alice@example.com".to_string(),
            otp: "12345".to_string(),
        };
        assert!(request.validate().is_err());

        let request = VerifyOtpRequest {
            otp: "123456".to_string(),
            ..request
        };
        assert!(request.validate().is_ok());
    }

    fn valid_clone(r: &RegisterRequest) -> RegisterRequest {
        RegisterRequest {
            email: r.email.clone(),
            username: r.username.clone(),
            password: r.password.clone(),
        }
    }
}
