//! Bearer token minting and validation.
//!
//! Tokens are compact three-part JWTs signed with HMAC-SHA-256 against a
//! single server-held secret. The verifier pins the algorithm from its own
//! configuration rather than trusting the token header, requires an expiry
//! claim, and tolerates a small clock skew between signer and verifier.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_LEEWAY_SECONDS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject id. Kept as a raw JSON value because round-tripping through
    /// serializers that lose type fidelity can turn it into a number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<Value>,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// Resolve the subject identifier from the claim set.
    ///
    /// Accepts a non-empty string claim, or a numeric claim rendered as its
    /// decimal integer form with no fractional component. Anything else
    /// resolves to `None`: a claim set without a subject is not an identity.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        match self.sub.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i.to_string())
                } else {
                    n.as_f64().map(|f| (f as i64).to_string())
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token has no expiry")]
    MissingExpiry,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    IssuerMismatch,
    #[error("invalid audience")]
    AudienceMismatch,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Mints and validates HS256 bearer tokens for one deployment.
///
/// Construct one per process from configuration; the service holds no global
/// state and is safe to share read-only across request handlers.
pub struct TokenService {
    secret: SecretString,
    issuer: String,
    audience: String,
    ttl: Duration,
    leeway_seconds: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: SecretString, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl: DEFAULT_TTL,
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_leeway_seconds(mut self, seconds: i64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Create a signed token asserting `subject` as the authenticated id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSecret`] if the signing secret is empty
    /// (signing never proceeds with a missing secret), or an encoding error
    /// if the claims cannot be serialized.
    pub fn sign(&self, subject: &str) -> Result<String, Error> {
        self.sign_at(subject, Utc::now().timestamp())
    }

    /// Same as [`TokenService::sign`] with an explicit issue time.
    pub fn sign_at(&self, subject: &str, now: i64) -> Result<String, Error> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: Some(Value::String(subject.to_string())),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: Some(now.saturating_add(ttl)),
        };
        self.sign_claims(&claims)
    }

    fn sign_claims(&self, claims: &Claims) -> Result<String, Error> {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return Err(Error::MissingSecret);
        }

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::MissingSecret)?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its decoded claims.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the token is malformed or contains invalid base64/json,
    /// - the header algorithm is anything but HS256,
    /// - the signature does not match,
    /// - the claims fail validation (`exp` missing or past leeway, `iss`,
    ///   `aud`).
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Same as [`TokenService::verify`] with an explicit current time.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, Error> {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return Err(Error::MissingSecret);
        }

        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        // Pin the algorithm before touching any crypto: the verifier decides
        // what is acceptable, not the token.
        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::MissingSecret)?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature_bytes)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        let exp = claims.exp.ok_or(Error::MissingExpiry)?;
        if now > exp.saturating_add(self.leeway_seconds) {
            return Err(Error::Expired);
        }
        if claims.iss != self.issuer {
            return Err(Error::IssuerMismatch);
        }
        if claims.aud != self.audience {
            return Err(Error::AudienceMismatch);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn service() -> TokenService {
        TokenService::new(
            SecretString::from("test-secret".to_string()),
            "bugtrail-api",
            "bugtrail-web",
        )
    }

    #[test]
    fn round_trip_sign_and_verify() -> Result<(), Error> {
        let svc = service();
        let token = svc.sign_at("68e23b3d997deadd848a490b", NOW)?;

        let claims = svc.verify_at(&token, NOW)?;
        assert_eq!(
            claims.subject().as_deref(),
            Some("68e23b3d997deadd848a490b")
        );
        assert_eq!(claims.iss, "bugtrail-api");
        assert_eq!(claims.aud, "bugtrail-web");
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, Some(NOW + 2 * 60 * 60));
        Ok(())
    }

    #[test]
    fn token_has_three_segments_and_hs256_header() -> Result<(), Error> {
        let token = service().sign_at("user-1", NOW)?;
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: TokenHeader = b64d_json(parts[0])?;
        assert_eq!(header, TokenHeader::hs256());
        Ok(())
    }

    #[test]
    fn sign_with_empty_secret_fails() {
        let svc = TokenService::new(SecretString::default(), "iss", "aud");
        assert!(matches!(svc.sign_at("user-1", NOW), Err(Error::MissingSecret)));
    }

    #[test]
    fn verify_rejects_wrong_secret() -> Result<(), Error> {
        let token = service().sign_at("user-1", NOW)?;
        let other = TokenService::new(
            SecretString::from("another-secret".to_string()),
            "bugtrail-api",
            "bugtrail-web",
        );
        assert!(matches!(
            other.verify_at(&token, NOW),
            Err(Error::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_foreign_algorithm() -> Result<(), Error> {
        // Well-formed token whose header declares a different algorithm; the
        // declared algorithm must be rejected before any signature check.
        let svc = service();
        let token = svc.sign_at("user-1", NOW)?;
        let claims_and_sig = token.splitn(2, '.').nth(1).map(ToString::to_string);
        let claims_and_sig = claims_and_sig.ok_or(Error::TokenFormat)?;

        for alg in ["HS384", "RS256", "none"] {
            let header = b64e_json(&TokenHeader {
                alg: alg.to_string(),
                typ: "JWT".to_string(),
            })?;
            let forged = format!("{header}.{claims_and_sig}");
            assert!(matches!(
                svc.verify_at(&forged, NOW),
                Err(Error::UnsupportedAlg(a)) if a == alg
            ));
        }
        Ok(())
    }

    #[test]
    fn verify_rejects_tampered_claims() -> Result<(), Error> {
        let svc = service();
        let token = svc.sign_at("user-1", NOW)?;
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = b64e_json(&Claims {
            sub: Some(json!("someone-else")),
            iss: "bugtrail-api".to_string(),
            aud: "bugtrail-web".to_string(),
            iat: NOW,
            exp: Some(NOW + 60),
        })?;
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(matches!(
            svc.verify_at(&forged, NOW),
            Err(Error::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn expiry_honors_leeway_boundary() -> Result<(), Error> {
        let svc = service();
        let token = svc.sign_at("user-1", NOW)?;
        let exp = NOW + 2 * 60 * 60;

        // Exactly `leeway` seconds past expiry still verifies.
        assert!(svc.verify_at(&token, exp + DEFAULT_LEEWAY_SECONDS).is_ok());
        // One second later it does not.
        assert!(matches!(
            svc.verify_at(&token, exp + DEFAULT_LEEWAY_SECONDS + 1),
            Err(Error::Expired)
        ));
        Ok(())
    }

    #[test]
    fn verify_requires_expiry_claim() -> Result<(), Error> {
        let svc = service();
        let token = svc.sign_claims(&Claims {
            sub: Some(json!("user-1")),
            iss: "bugtrail-api".to_string(),
            aud: "bugtrail-web".to_string(),
            iat: NOW,
            exp: None,
        })?;
        assert!(matches!(
            svc.verify_at(&token, NOW),
            Err(Error::MissingExpiry)
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_issuer_and_audience_mismatch() -> Result<(), Error> {
        let token = service().sign_at("user-1", NOW)?;

        let wrong_iss = TokenService::new(
            SecretString::from("test-secret".to_string()),
            "other-api",
            "bugtrail-web",
        );
        assert!(matches!(
            wrong_iss.verify_at(&token, NOW),
            Err(Error::IssuerMismatch)
        ));

        let wrong_aud = TokenService::new(
            SecretString::from("test-secret".to_string()),
            "bugtrail-api",
            "other-frontend",
        );
        assert!(matches!(
            wrong_aud.verify_at(&token, NOW),
            Err(Error::AudienceMismatch)
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_malformed_tokens() {
        let svc = service();
        assert!(matches!(svc.verify_at("", NOW), Err(Error::TokenFormat)));
        assert!(matches!(
            svc.verify_at("only-one-part", NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            svc.verify_at("a.b.c.d", NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            svc.verify_at("!!.!!.!!", NOW),
            Err(Error::Base64)
        ));
    }

    fn claims_with_sub(sub: Option<Value>) -> Claims {
        Claims {
            sub,
            iss: String::new(),
            aud: String::new(),
            iat: 0,
            exp: None,
        }
    }

    #[test]
    fn subject_resolves_string_claim() {
        let claims = claims_with_sub(Some(json!("68e23b3d997deadd848a490b")));
        assert_eq!(
            claims.subject().as_deref(),
            Some("68e23b3d997deadd848a490b")
        );
    }

    #[test]
    fn subject_resolves_numeric_claim_without_fraction() {
        assert_eq!(
            claims_with_sub(Some(json!(42))).subject().as_deref(),
            Some("42")
        );
        // Serialization formats that lose type fidelity hand back floats.
        assert_eq!(
            claims_with_sub(Some(json!(42.9))).subject().as_deref(),
            Some("42")
        );
    }

    #[test]
    fn subject_rejects_missing_empty_or_foreign_claims() {
        assert_eq!(claims_with_sub(None).subject(), None);
        assert_eq!(claims_with_sub(Some(json!(""))).subject(), None);
        assert_eq!(claims_with_sub(Some(json!(true))).subject(), None);
        assert_eq!(claims_with_sub(Some(json!(["a"]))).subject(), None);
    }
}
