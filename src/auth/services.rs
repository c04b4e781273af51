pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::dto::{RegisterRequest, UpdateProfileRequest};
use crate::config::JwtConfig;
use crate::error::{AppError, FieldError};
use crate::state::AppState;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn username_error(username: &str) -> Option<String> {
    let len = username.chars().count();
    if !(2..=20).contains(&len) {
        return Some("must be between 2 and 20 characters".into());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Some("may only contain letters, digits, '_' and '-'".into());
    }
    None
}

fn password_error(password: &str) -> Option<String> {
    if password.len() < 8 {
        return Some("must be at least 8 characters".into());
    }
    None
}

/// Field checks for registration. Returns every failed field at once.
pub fn validate_registration(payload: &RegisterRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if let Some(msg) = username_error(&payload.username) {
        errors.push(FieldError::new("username", msg));
    }
    if !is_valid_email(&payload.email) {
        errors.push(FieldError::new("email", "not a valid email address"));
    }
    if let Some(msg) = password_error(&payload.password) {
        errors.push(FieldError::new("password", msg));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Field checks for profile update; only submitted fields are checked.
pub fn validate_profile_update(payload: &UpdateProfileRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if let Some(username) = payload.username.as_deref() {
        if let Some(msg) = username_error(username) {
            errors.push(FieldError::new("username", msg));
        }
    }
    if let Some(email) = payload.email.as_deref() {
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "not a valid email address"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    match password_error(password) {
        Some(msg) => Err(AppError::Validation(vec![FieldError::new(
            "new_password",
            msg,
        )])),
        None => Ok(()),
    }
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// True iff `plain` matches the stored hash. A malformed stored hash
/// verifies as false rather than surfacing an error to the login path.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            session_ttl_minutes,
            remember_ttl_minutes,
            reset_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            session_ttl: Duration::from_secs((session_ttl_minutes as u64) * 60),
            remember_ttl: Duration::from_secs((remember_ttl_minutes as u64) * 60),
            reset_ttl: Duration::from_secs((reset_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
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
        Ok(token)
    }

    /// Session token; `remember` selects the extended lifetime.
    pub fn sign_session(&self, user_id: Uuid, remember: bool) -> anyhow::Result<String> {
        let ttl = if remember {
            self.remember_ttl
        } else {
            self.session_ttl
        };
        self.sign_with_kind(user_id, TokenKind::Session, ttl)
    }

    /// Password-reset token with its own, much shorter lifetime.
    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Reset, self.reset_ttl)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_session(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Session {
            anyhow::bail!("not a session token");
        }
        Ok(claims)
    }

    pub fn verify_reset(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Reset {
            anyhow::bail!("not a reset token");
        }
        Ok(claims)
    }
}

/// Extracts the authenticated identity from the Authorization header.
/// Handlers receive the user id as an explicit value.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("invalid Authorization header".into()))?;

        let claims = keys.verify_session(token).map_err(|_| {
            warn!("invalid or expired session token");
            AppError::Unauthorized("invalid or expired token".into())
        })?;

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_is_false_on_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn accepts_a_normal_registration() {
        assert!(validate_registration(&register("alice", "a@x.com", "long-enough")).is_ok());
    }

    #[test]
    fn rejects_bad_fields_and_reports_each() {
        let err = validate_registration(&register("a", "not-an-email", "short"));
        match err {
            Err(AppError::Validation(fields)) => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["username", "email", "password"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn email_regex_cases() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
        assert!(!is_valid_email("missing-at.com"));
        assert!(!is_valid_email("two@@x.com"));
        assert!(!is_valid_email("spaces in@x.com"));
        assert!(!is_valid_email("no-tld@host"));
    }

    #[test]
    fn profile_update_checks_only_submitted_fields() {
        let ok = UpdateProfileRequest {
            username: None,
            email: Some("new@x.com".into()),
        };
        assert!(validate_profile_update(&ok).is_ok());

        let bad = UpdateProfileRequest {
            username: Some("bad name!".into()),
            email: None,
        };
        assert!(validate_profile_update(&bad).is_err());
    }
}

#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_session_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_session(user_id, false).expect("sign session");
        let claims = keys.verify_session(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Session);
    }

    #[tokio::test]
    async fn remember_extends_the_session_lifetime() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let short = keys.sign_session(user_id, false).expect("sign");
        let long = keys.sign_session(user_id, true).expect("sign");
        let short_exp = keys.verify(&short).expect("verify").exp;
        let long_exp = keys.verify(&long).expect("verify").exp;
        assert!(long_exp > short_exp);
    }

    #[tokio::test]
    async fn sign_reset_then_verify_reset_returns_same_user() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_reset(user_id).expect("sign reset");
        let claims = keys.verify_reset(&token).expect("verify reset");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Reset);
    }

    #[tokio::test]
    async fn verify_reset_rejects_session_token() {
        let keys = make_keys();
        let token = keys.sign_session(Uuid::new_v4(), false).expect("sign");
        let err = keys.verify_reset(&token).unwrap_err();
        assert!(err.to_string().contains("not a reset token"));
    }

    #[tokio::test]
    async fn verify_session_rejects_reset_token() {
        let keys = make_keys();
        let token = keys.sign_reset(Uuid::new_v4()).expect("sign");
        let err = keys.verify_session(&token).unwrap_err();
        assert!(err.to_string().contains("not a session token"));
    }

    #[tokio::test]
    async fn tampered_signature_fails_verification() {
        let keys = make_keys();
        let token = keys.sign_reset(Uuid::new_v4()).expect("sign");
        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(keys.verify(&tampered).is_err());
    }

    #[tokio::test]
    async fn expired_reset_token_fails_verification() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        // Signed with the real key but an expiry well in the past (beyond
        // the validator's leeway window).
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: (now - TimeDuration::hours(2)).unix_timestamp() as usize,
            exp: (now - TimeDuration::hours(1)).unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            kind: TokenKind::Reset,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        assert!(keys.verify_reset(&token).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys();
        let mut bad_keys = make_keys();
        bad_keys.issuer = "other-issuer".into();
        bad_keys.audience = "other-aud".into();
        let token = good_keys
            .sign_session(Uuid::new_v4(), false)
            .expect("sign session");
        assert!(bad_keys.verify(&token).is_err());
    }
}
