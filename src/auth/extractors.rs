use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{jwt::JwtKeys, repo::User};
use crate::{error::AppError, state::AppState};

/// Auth guard: extracts the bearer token, verifies it as a session token and
/// resolves the user row. Handlers behind it receive the full `User` and never
/// re-verify the token.
///
/// Apart from a missing Authorization header, every failure collapses to the
/// same generic 401 so the response does not reveal whether the token was
/// expired, tampered with, or belonged to a deleted account.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::MissingCredential)?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_session(token).map_err(|e| {
            warn!(error = %e, "session token rejected");
            AppError::Unauthorized
        })?;

        // The row may be gone if the account was deleted after issuance; a
        // structurally valid token for a missing user is still a 401.
        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "session token for unknown user");
                AppError::Unauthorized
            })?;

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> axum::http::request::Parts {
        let mut builder = Request::builder().uri("/me");
        if let Some(v) = value {
            builder = builder.header(axum::http::header::AUTHORIZATION, v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_header_is_missing_credential() {
        let state = AppState::fake();
        let mut parts = parts_with_auth(None);
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extraction should fail");
        assert!(matches!(err, AppError::MissingCredential));
    }

    #[tokio::test]
    async fn wrong_scheme_is_generic_unauthorized() {
        let state = AppState::fake();
        let mut parts = parts_with_auth(Some("Basic dXNlcjpwdw=="));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extraction should fail");
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn garbage_token_is_generic_unauthorized() {
        let state = AppState::fake();
        let mut parts = parts_with_auth(Some("Bearer not.a.jwt"));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extraction should fail");
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn reset_token_is_rejected_as_session_credential() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let (token, _) = keys.sign_reset(uuid::Uuid::new_v4()).expect("sign reset");
        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extraction should fail");
        assert!(matches!(err, AppError::Unauthorized));
    }
}
