//! Signed bearer credentials.
//!
//! Tokens are HS256 JWTs carrying the identity id (`id`), `iat` and `exp`. The
//! verifier is referentially transparent: no shared mutable state, safe to call
//! from any number of tasks at once.
//!
//! Callers only ever see [`AdmissionError::InvalidCredential`] from [`CredentialVerifier::verify`];
//! the precise cause (malformed, bad signature, expired) is logged at debug level and
//! otherwise discarded so it cannot be used as an oracle.
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::gate::AdmissionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Payload extracted from a token that passed signature and expiry checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    pub id: String,
    pub expires_at: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("key error: {0}")]
    Key(String),
    #[error("token carries no identity id")]
    MissingSubject,
}

/// Upper bound on credential lifetime; longer values are a configuration error.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

pub struct CredentialVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl CredentialVerifier {
    pub fn new(secret: &str, ttl: Duration, leeway_secs: u64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Key("signing secret must not be empty".to_string()));
        }
        if ttl.is_zero() || ttl > MAX_TOKEN_TTL {
            return Err(TokenError::Key(format!(
                "token lifetime must be between 1s and {}s, got {}s",
                MAX_TOKEN_TTL.as_secs(),
                ttl.as_secs()
            )));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    /// Mint a credential for `id` valid for the configured lifetime.
    pub fn issue(&self, id: &str) -> Result<String, TokenError> {
        if id.is_empty() { return Err(TokenError::MissingSubject); }
        let now = now_epoch_seconds();
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| TokenError::Key("token expiry out of range".to_string()))?;
        let claims = Claims { id: id.to_string(), iat: now, exp };
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedPayload, AdmissionError> {
        match self.decode(token) {
            Ok(claims) => Ok(VerifiedPayload { id: claims.id, expires_at: claims.exp }),
            Err(err) => {
                tracing::debug!(target: "auth", "credential rejected: {err}");
                Err(AdmissionError::InvalidCredential)
            }
        }
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token.trim(), &self.decoding, &self.validation)?;
        if data.claims.id.trim().is_empty() {
            return Err(TokenError::MissingSubject);
        }
        Ok(data.claims)
    }
}

fn now_epoch_seconds() -> i64 {
    // Clamp to zero if the clock is behind the epoch
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(secret: &str) -> CredentialVerifier {
        CredentialVerifier::new(secret, Duration::from_secs(900), 0).expect("verifier")
    }

    fn encode_raw(secret: &str, claims: &Claims) -> String {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn issue_then_verify_yields_id() {
        let v = verifier("s3cret");
        let token = v.issue("user-1").unwrap();
        let payload = v.verify(&token).unwrap();
        assert_eq!(payload.id, "user-1");
        assert!(payload.expires_at > now_epoch_seconds());
    }

    #[test]
    fn wrong_key_is_invalid_credential() {
        let token = verifier("key-a").issue("user-1").unwrap();
        let err = verifier("key-b").verify(&token).unwrap_err();
        assert_eq!(err, AdmissionError::InvalidCredential);
    }

    #[test]
    fn expired_token_is_invalid_credential() {
        let now = now_epoch_seconds();
        let token = encode_raw("k", &Claims { id: "user-1".into(), iat: now - 7200, exp: now - 3600 });
        assert_eq!(verifier("k").verify(&token).unwrap_err(), AdmissionError::InvalidCredential);
    }

    #[test]
    fn malformed_and_empty_subject_are_invalid_credential() {
        let v = verifier("k");
        assert_eq!(v.verify("not.a.jwt").unwrap_err(), AdmissionError::InvalidCredential);
        assert_eq!(v.verify("").unwrap_err(), AdmissionError::InvalidCredential);

        let now = now_epoch_seconds();
        let token = encode_raw("k", &Claims { id: "  ".into(), iat: now, exp: now + 60 });
        assert_eq!(v.verify(&token).unwrap_err(), AdmissionError::InvalidCredential);
    }

    #[test]
    fn other_algorithms_rejected() {
        let now = now_epoch_seconds();
        let claims = Claims { id: "user-1".into(), iat: now, exp: now + 60 };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS512), &claims, &EncodingKey::from_secret(b"k")).unwrap();
        assert_eq!(verifier("k").verify(&token).unwrap_err(), AdmissionError::InvalidCredential);
    }

    #[test]
    fn empty_secret_refused() {
        assert!(matches!(CredentialVerifier::new("", Duration::from_secs(1), 0), Err(TokenError::Key(_))));
    }

    #[test]
    fn out_of_range_lifetime_refused_at_construction() {
        assert!(matches!(CredentialVerifier::new("k", Duration::from_secs(u64::MAX), 0), Err(TokenError::Key(_))));
        assert!(matches!(CredentialVerifier::new("k", MAX_TOKEN_TTL + Duration::from_secs(1), 0), Err(TokenError::Key(_))));
        assert!(matches!(CredentialVerifier::new("k", Duration::ZERO, 0), Err(TokenError::Key(_))));

        // the longest accepted lifetime still mints a token that verifies
        let v = CredentialVerifier::new("k", MAX_TOKEN_TTL, 0).unwrap();
        let token = v.issue("u1").unwrap();
        let payload = v.verify(&token).unwrap();
        assert!(payload.expires_at > now_epoch_seconds());
    }
}
