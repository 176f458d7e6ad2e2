//! # agora-auth-jwt
//!
//! HS256 session tokens implementing `SessionIssuer`.
//! A token carries the user's identity so that authenticating a request
//! needs no store lookup.

use agora_core::error::{AppError, Result};
use agora_core::models::{Identity, SessionToken, UserId};
use agora_core::traits::SessionIssuer;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Session lifetime when none is configured.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::hours(1);

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    userid: String,
    name: String,
    email: String,
    iss: String,
    iat: i64,
    exp: i64,
}

pub struct JwtSessions {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtSessions {
    /// Accepts the shared signing secret (e.g., from an environment variable).
    pub fn new(secret: &SecretString, issuer: &str) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            issuer: issuer.to_string(),
            ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn sign(&self, identity: &Identity, issued_at: DateTime<Utc>) -> Result<SessionToken> {
        let expires_at = issued_at + self.ttl;
        let claims = SessionClaims {
            userid: identity.user_id.0.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!(user_id = %identity.user_id, error = %e, "could not sign session token");
            AppError::Store(format!("could not sign session token: {e}"))
        })?;
        Ok(SessionToken { token, expires_at })
    }
}

impl SessionIssuer for JwtSessions {
    fn issue(&self, identity: &Identity) -> Result<SessionToken> {
        self.sign(identity, Utc::now())
    }

    fn verify(&self, token: &str) -> Result<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "rejected session token");
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "session expired",
                ErrorKind::InvalidIssuer => "token issued elsewhere",
                ErrorKind::InvalidSignature => "bad token signature",
                _ => "malformed token",
            };
            AppError::Unauthorized(reason.into())
        })?;

        let claims = data.claims;
        Ok(Identity {
            user_id: UserId(claims.userid),
            name: claims.name,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn ada() -> Identity {
        Identity {
            user_id: UserId::from("sub-1"),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        }
    }

    #[test]
    fn issued_token_verifies_to_the_same_identity() {
        let sessions = JwtSessions::new(&secret("s3cret"), "agora");
        let before = Utc::now();
        let token = sessions.issue(&ada()).unwrap();

        assert!(token.expires_at >= before + DEFAULT_TOKEN_TTL - Duration::seconds(1));
        assert_eq!(sessions.verify(&token.token).unwrap(), ada());
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let sessions = JwtSessions::new(&secret("s3cret"), "agora");
        // Well past the default validation leeway.
        let token = sessions
            .sign(&ada(), Utc::now() - Duration::hours(3))
            .unwrap();

        let err = sessions.verify(&token.token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "session expired"));
    }

    #[test]
    fn token_signed_with_another_secret_is_unauthorized() {
        let ours = JwtSessions::new(&secret("s3cret"), "agora");
        let theirs = JwtSessions::new(&secret("other"), "agora");
        let token = theirs.issue(&ada()).unwrap();

        let err = ours.verify(&token.token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "bad token signature"));
    }

    #[test]
    fn token_from_another_issuer_is_unauthorized() {
        let ours = JwtSessions::new(&secret("s3cret"), "agora");
        let theirs = JwtSessions::new(&secret("s3cret"), "elsewhere");
        let token = theirs.issue(&ada()).unwrap();

        assert!(matches!(
            ours.verify(&token.token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn garbage_is_unauthorized() {
        let sessions = JwtSessions::new(&secret("s3cret"), "agora");
        assert!(matches!(
            sessions.verify("not.a.jwt"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn custom_ttl_moves_expiry() {
        let sessions =
            JwtSessions::new(&secret("s3cret"), "agora").with_ttl(Duration::minutes(5));
        let issued = Utc::now();
        let token = sessions.sign(&ada(), issued).unwrap();
        assert_eq!(token.expires_at, issued + Duration::minutes(5));
    }
}
