use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::JwtConfig, state::AppState};

/// Purpose tag inside every signed token. A reset token can never be replayed
/// as a session credential and vice versa.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Why a token failed verification. The auth guard collapses all of these to
/// a single generic 401; the variants exist for logs and for the reset flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("wrong token purpose")]
    WrongPurpose,
    #[error("malformed token")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// Signing/verification keys plus token parameters, built once from config.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub session_ttl: TimeDuration,
    pub reset_ttl: TimeDuration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            session_ttl: TimeDuration::minutes(cfg.ttl_minutes),
            reset_ttl: TimeDuration::minutes(cfg.reset_ttl_minutes),
        }
    }

    fn sign_with_kind(
        &self,
        user_id: Uuid,
        kind: TokenKind,
    ) -> anyhow::Result<(String, OffsetDateTime)> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Session => self.session_ttl,
            TokenKind::Reset => self.reset_ttl,
        };
        let exp = now + ttl;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok((token, exp))
    }

    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<(String, OffsetDateTime)> {
        self.sign_with_kind(user_id, TokenKind::Session)
    }

    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<(String, OffsetDateTime)> {
        self.sign_with_kind(user_id, TokenKind::Reset)
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_session(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Session {
            return Err(TokenError::WrongPurpose);
        }
        Ok(claims)
    }

    pub fn verify_reset(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Reset {
            return Err(TokenError::WrongPurpose);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn make_keys(secret: &str, ttl_minutes: i64) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes,
            reset_ttl_minutes: ttl_minutes,
        })
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = make_keys("dev-secret", 5);
        let user_id = Uuid::new_v4();
        let (token, _exp) = keys.sign_session(user_id).expect("sign session");
        let claims = keys.verify_session(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Session);
    }

    #[test]
    fn verify_session_rejects_reset_token() {
        let keys = make_keys("dev-secret", 5);
        let (token, _) = keys.sign_reset(Uuid::new_v4()).expect("sign reset");
        assert_eq!(keys.verify_session(&token), Err(TokenError::WrongPurpose));
    }

    #[test]
    fn verify_reset_rejects_session_token() {
        let keys = make_keys("dev-secret", 5);
        let (token, _) = keys.sign_session(Uuid::new_v4()).expect("sign session");
        assert_eq!(keys.verify_reset(&token), Err(TokenError::WrongPurpose));
    }

    #[test]
    fn verify_rejects_expired_token() {
        // Negative TTL produces a token that is already past expiry, well
        // beyond the default decode leeway.
        let keys = make_keys("dev-secret", -5);
        let (token, _) = keys.sign_session(Uuid::new_v4()).expect("sign session");
        assert_eq!(keys.verify_session(&token), Err(TokenError::Expired));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let good = make_keys("secret-a", 5);
        let other = make_keys("secret-b", 5);
        let (token, _) = good.sign_session(Uuid::new_v4()).expect("sign session");
        assert_eq!(
            other.verify_session(&token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret", 5);
        assert_eq!(
            keys.verify_session("not.a.jwt"),
            Err(TokenError::Malformed)
        );
    }
}
