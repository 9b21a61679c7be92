//! Identity token codec (HS256 JWT).
//!
//! Two token shapes are issued with the same key:
//! - identity tokens carry `{id, email, role, organizationId}` and open the API;
//! - MFA-pending tokens carry `{id, email, mfaPending: true}` and are only
//!   accepted by the MFA verification endpoint.
//!
//! Each shape fails to decode as the other, so a pending token can never pass
//! the request gate.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::Role;

pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Identity fields copied into a token at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub organization_id: Option<i32>,
}

/// Decoded identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub organization_id: Option<i32>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
            organization_id: self.organization_id,
        }
    }
}

/// Decoded MFA-pending token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingClaims {
    pub id: i32,
    pub email: String,
    pub mfa_pending: bool,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signs and verifies tokens with a symmetric secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"***")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec from the signing secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than `MIN_SECRET_LEN` bytes.
    pub fn new(secret: &SecretString) -> Result<Self, TokenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(TokenError::Signing(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
            default_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
        })
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue an identity token valid for the default TTL.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue(&self, subject: &Subject) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now(), self.default_ttl)
    }

    /// Issue an identity token valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_with_ttl(&self, subject: &Subject, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now(), ttl)
    }

    /// Issue an identity token as if it had been issued at `issued_at`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_at(
        &self,
        subject: &Subject,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            id: subject.id,
            email: subject.email.clone(),
            role: subject.role,
            organization_id: subject.organization_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }

    /// Issue a token that only proves the password step of an MFA login.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_pending(&self, id: i32, email: &str, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = PendingClaims {
            id,
            email: email.to_string(),
            mfa_pending: true,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }

    /// Verify an identity token.
    ///
    /// # Errors
    /// Returns `InvalidSignature`, `Expired` or `Malformed`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode::<Claims>(token)
    }

    /// Verify an MFA-pending token.
    ///
    /// # Errors
    /// Returns `InvalidSignature`, `Expired` or `Malformed`; identity tokens are
    /// `Malformed` here.
    pub fn verify_pending(&self, token: &str) -> Result<PendingClaims, TokenError> {
        let claims = self.decode::<PendingClaims>(token)?;
        if !claims.mfa_pending {
            return Err(TokenError::Malformed("token is not MFA pending".to_string()));
        }
        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let err = TokenError::from(err);
                debug!(reason = %err, "token rejected");
                err
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    fn codec() -> TokenCodec {
        TokenCodec::new(&SecretString::from(SECRET)).unwrap()
    }

    fn subject() -> Subject {
        Subject {
            id: 7,
            email: "a@x.com".to_string(),
            role: Role::Warehouse,
            organization_id: Some(3),
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(TokenCodec::new(&SecretString::from("short")).is_err());
    }

    #[test]
    fn issue_then_verify_recovers_subject() {
        let codec = codec();
        let token = codec.issue(&subject()).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.subject(), subject());
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_SECONDS);
    }

    #[test]
    fn tokens_issued_together_differ() {
        let codec = codec();
        let first = codec.issue(&subject()).unwrap();
        let second = codec.issue(&subject()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn expired_token_fails_with_expired() {
        let codec = codec();
        let issued_at = Utc::now() - Duration::hours(2);
        let token = codec
            .issue_at(&subject(), issued_at, Duration::hours(1))
            .unwrap();
        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_payload_or_signature_fails() {
        let codec = codec();
        let token = codec.issue(&subject()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        for (segment, offset) in [(1usize, 0usize), (1, parts[1].len() / 2), (2, parts[2].len() / 2)] {
            let mut bytes = parts[segment].as_bytes().to_vec();
            bytes[offset] = if bytes[offset] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            let mut tampered: Vec<&str> = parts.clone();
            tampered[segment] = &mutated;
            let tampered = tampered.join(".");
            assert!(codec.verify(&tampered).is_err(), "segment {segment} offset {offset}");
        }
    }

    #[test]
    fn signature_from_other_secret_is_invalid() {
        let other =
            TokenCodec::new(&SecretString::from("another-secret-of-sufficient-length!!")).unwrap();
        let token = other.issue(&subject()).unwrap();
        assert_eq!(codec().verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            codec().verify("not-a-token"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn pending_and_identity_tokens_do_not_mix() {
        let codec = codec();
        let pending = codec
            .issue_pending(7, "a@x.com", Duration::minutes(10))
            .unwrap();
        assert!(matches!(codec.verify(&pending), Err(TokenError::Malformed(_))));
        let claims = codec.verify_pending(&pending).unwrap();
        assert!(claims.mfa_pending);
        assert_eq!(claims.id, 7);

        let identity = codec.issue(&subject()).unwrap();
        assert!(matches!(
            codec.verify_pending(&identity),
            Err(TokenError::Malformed(_))
        ));
    }
}
