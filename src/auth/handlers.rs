use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, GenericAck, LoginRequest, LoginResponse, PublicUser,
            RegisterRequest, ResetPasswordRequest, UpdateProfileRequest,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::User,
    },
    error::{AppError, AppResult},
    state::AppState,
};

const RESET_ACK: &str = "If that email is registered, a password reset link has been sent";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route(
        "/me",
        get(get_me).put(update_profile).delete(delete_profile),
    )
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!("invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    Ok(email)
}

fn check_password(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("Password too short".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let email = normalize_email(&payload.email)?;
    check_password(&payload.password)?;

    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::Validation("Display name is required".into()));
    }

    // Fast path; the unique constraint still covers the racing case.
    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::EmailTaken);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &email, &hash, display_name)
        .await
        .map_err(AppError::email_conflict)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let email = payload.email.trim().to_lowercase();

    // Unknown email and wrong password produce the same answer so the
    // endpoint cannot be used to enumerate accounts.
    let user = match User::find_by_email(&state.db, &email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let (access_token, expires_at) = keys.sign_session(user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        expires_at,
    }))
}

/// Always answers with the same generic ack, whether or not the email is
/// registered and whether or not dispatch succeeded. A failed dispatch does
/// not roll back the stored token; it is logged and the reset can be retried.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<GenericAck>> {
    let email = payload.email.trim().to_lowercase();

    if let Some(user) = User::find_by_email(&state.db, &email).await? {
        let keys = JwtKeys::from_ref(&state);
        let (token, expires_at) = keys.sign_reset(user.id)?;

        // Storing the new token invalidates any earlier outstanding one.
        User::store_reset_token(&state.db, user.id, &token, expires_at).await?;

        let body = format!(
            "A password reset was requested for your BookMind account.\n\n\
             Reset token: {token}\n\n\
             The token expires at {expires_at}. If you did not request this, \
             you can ignore this message."
        );
        if let Err(e) = state
            .mailer
            .send(&user.email, "BookMind password reset", &body)
            .await
        {
            error!(user_id = %user.id, error = %e, "reset mail dispatch failed");
        } else {
            info!(user_id = %user.id, "reset mail dispatched");
        }
    } else {
        info!("forgot-password for unknown email");
    }

    Ok(Json(GenericAck { message: RESET_ACK }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<GenericAck>> {
    check_password(&payload.new_password)?;

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_reset(&payload.reset_token).map_err(|e| {
        warn!(error = %e, "reset token rejected");
        AppError::InvalidResetToken
    })?;

    let hash = hash_password(&payload.new_password)?;

    // Signature and expiry alone are not enough: the token must also match
    // the one currently stored for the user, so a superseded or already
    // consumed token is refused even while its signature is still valid.
    let consumed =
        User::consume_reset_token(&state.db, claims.sub, &payload.reset_token, &hash).await?;
    if !consumed {
        warn!(user_id = %claims.sub, "reset token superseded, consumed or expired");
        return Err(AppError::InvalidResetToken);
    }

    info!(user_id = %claims.sub, "password reset");
    Ok(Json(GenericAck {
        message: "Password updated successfully",
    }))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip(state, user, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    let email = payload
        .email
        .as_deref()
        .map(normalize_email)
        .transpose()?;

    let display_name = match payload.display_name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("Display name is required".into())),
        other => other,
    };

    let password_hash = match payload.password.as_deref() {
        Some(p) => {
            check_password(p)?;
            Some(hash_password(p)?)
        }
        None => None,
    };

    let updated = User::update_profile(
        &state.db,
        user.id,
        display_name,
        email.as_deref(),
        password_hash.as_deref(),
    )
    .await
    .map_err(AppError::email_conflict)?
    // Row deleted between guard and update; same generic 401 as the guard.
    .ok_or(AppError::Unauthorized)?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated.into()))
}

#[instrument(skip(state, user))]
pub async fn delete_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<GenericAck>> {
    User::delete(&state.db, user.id).await?;
    info!(user_id = %user.id, "user deleted");
    Ok(Json(GenericAck {
        message: "User deleted successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_and_rejects() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@nodomain.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(
            normalize_email("  User@Example.COM ").unwrap(),
            "user@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
    }

    #[test]
    fn public_user_never_serializes_the_hash() {
        let user = User {
            id: uuid::Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            display_name: "Test".into(),
            reset_token: Some("tok".into()),
            reset_token_expires_at: None,
            created_at: time::OffsetDateTime::now_utc(),
            updated_at: time::OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("reset_token"));
    }
}
