use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenPurpose};
use crate::{config::JwtConfig, state::AppState};

/// Signing and verification keys plus per-purpose lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub session_ttl: Duration,
    pub reset_ttl: Duration,
    pub verification_ttl: Duration,
}

fn minutes(m: i64) -> Duration {
    Duration::from_secs(m.max(0) as u64 * 60)
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            session_ttl: minutes(cfg.session_ttl_minutes),
            reset_ttl: minutes(cfg.reset_ttl_minutes),
            verification_ttl: minutes(cfg.verification_ttl_minutes),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn ttl(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Session => self.session_ttl,
            TokenPurpose::PasswordReset => self.reset_ttl,
            TokenPurpose::EmailVerification => self.verification_ttl,
        }
    }

    pub(crate) fn sign_with_ttl(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        email: Option<String>,
        ttl: TimeDuration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            purpose,
            email,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, purpose = ?purpose, "jwt signed");
        Ok(token)
    }

    pub fn sign(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        email: Option<String>,
    ) -> anyhow::Result<String> {
        let ttl = TimeDuration::seconds(self.ttl(purpose).as_secs() as i64);
        self.sign_with_ttl(user_id, purpose, email, ttl)
    }

    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenPurpose::Session, None)
    }

    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenPurpose::PasswordReset, None)
    }

    pub fn sign_verification(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.sign(user_id, TokenPurpose::EmailVerification, Some(email.to_string()))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, purpose = ?data.claims.purpose, "jwt verified");
        Ok(data.claims)
    }

    /// Verifies and rejects tokens issued for any other purpose.
    pub fn verify_purpose(&self, token: &str, purpose: TokenPurpose) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.purpose != purpose {
            anyhow::bail!("token purpose mismatch: expected {purpose:?}");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            session_ttl_minutes: 5,
            reset_ttl_minutes: 60,
            verification_ttl_minutes: 1440,
        })
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_session(user_id).expect("sign session");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.purpose, TokenPurpose::Session);
        assert_eq!(claims.email, None);
    }

    #[test]
    fn verification_token_carries_email() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys
            .sign_verification(Uuid::new_v4(), "ana@example.com")
            .expect("sign verification");
        let claims = keys
            .verify_purpose(&token, TokenPurpose::EmailVerification)
            .expect("verify");
        assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
        assert_eq!(claims.exp - claims.iat, 1440 * 60);
    }

    #[test]
    fn reset_token_is_not_a_session_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign_reset(Uuid::new_v4()).expect("sign reset");
        let err = keys
            .verify_purpose(&token, TokenPurpose::Session)
            .unwrap_err();
        assert!(err.to_string().contains("purpose mismatch"));
        assert!(keys
            .verify_purpose(&token, TokenPurpose::PasswordReset)
            .is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys
            .sign_with_ttl(
                Uuid::new_v4(),
                TokenPurpose::PasswordReset,
                None,
                TimeDuration::hours(-2),
            )
            .expect("sign");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign_session(Uuid::new_v4()).expect("sign");
        assert!(bad_keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let ours = make_keys("ours", "iss", "aud");
        let theirs = make_keys("theirs", "iss", "aud");
        let token = theirs.sign_session(Uuid::new_v4()).expect("sign");
        assert!(ours.verify(&token).is_err());
    }
}
