//! Signing and verification of session tokens.
//!
//! Tokens are compact JWS strings signed with HMAC. Verification collects
//! every validity problem first and then reports the most significant one:
//! malformed > expired > bad signature > not yet active > other.

use crate::{
    claims::{now_unix, Claims},
    config::SessionConfig,
    config_error::ConfigError,
    errors::{ErrorKind, SessionError},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Default token lifetime when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Structural problems found while splitting and decoding a token.
#[derive(Debug, Error)]
enum TokenFormatError {
    #[error("token has {0} segments, expected 3")]
    SegmentCount(usize),

    #[error("{segment} segment is not valid base64url: {source}")]
    Base64 {
        segment: &'static str,
        source: base64::DecodeError,
    },

    #[error("{segment} segment is not valid JSON: {source}")]
    Json {
        segment: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
#[error("signing method {0:?} is not an HMAC algorithm")]
struct UnsupportedAlgorithm(Option<String>);

#[derive(Debug, Error)]
#[error("token used before issued (iat {issued_at}, now {now})")]
struct IssuedInFuture {
    issued_at: i64,
    now: i64,
}

#[derive(Debug, Error)]
#[error("claims payload is a JSON {0}, expected an object")]
struct ClaimsNotObject(&'static str);

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
}

/// Validity problems detected on a structurally sound token.
#[derive(Debug, Default)]
struct Violations {
    expired: bool,
    signature_invalid: bool,
    not_active: bool,
    issued_in_future: Option<IssuedInFuture>,
}

impl Violations {
    fn into_result(self) -> Result<(), SessionError> {
        if self.expired {
            return Err(ErrorKind::TokenExpired.into());
        }
        if self.signature_invalid {
            return Err(ErrorKind::InvalidToken.into());
        }
        if self.not_active {
            return Err(ErrorKind::TokenNotActive.into());
        }
        if let Some(cause) = self.issued_in_future {
            return Err(SessionError::with_source(
                ErrorKind::FailedToParseToken,
                cause,
            ));
        }
        Ok(())
    }
}

fn malformed(err: TokenFormatError) -> SessionError {
    SessionError::with_source(ErrorKind::TokenMalformed, err)
}

fn decode_segment(segment: &'static str, raw: &str) -> Result<Vec<u8>, SessionError> {
    URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|source| malformed(TokenFormatError::Base64 { segment, source }))
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

/// Issues and verifies HMAC-signed session tokens.
///
/// Holds only immutable key material and durations, so a single instance can
/// be shared across threads (e.g. behind an `Arc`) without locking.
pub struct Interactor {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    leeway: Duration,
    issuer: Option<String>,
}

impl fmt::Debug for Interactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interactor")
            .field("ttl", &self.ttl)
            .field("leeway", &self.leeway)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl Interactor {
    /// Create an interactor from a signing key and default TTL.
    ///
    /// A zero `ttl` falls back to one hour.
    ///
    /// # Panics
    /// Panics if `signing_key` is empty. A missing key is a deployment error
    /// that must stop the service at startup; use [`Interactor::try_new`] to
    /// handle it as a value instead.
    #[must_use]
    pub fn new(signing_key: &[u8], ttl: Duration) -> Self {
        match Self::try_new(signing_key, ttl) {
            Ok(interactor) => interactor,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible variant of [`Interactor::new`].
    ///
    /// # Errors
    /// Returns `ConfigError::MissingSigningKey` if `signing_key` is empty.
    pub fn try_new(signing_key: &[u8], ttl: Duration) -> Result<Self, ConfigError> {
        if signing_key.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }

        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };

        Ok(Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            ttl,
            leeway: Duration::ZERO,
            issuer: None,
        })
    }

    /// Build an interactor from validated configuration.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the configuration is invalid.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let key = Zeroizing::new(config.signing_key.expose().to_vec());
        let mut interactor = Self::try_new(&key, config.ttl())?.with_leeway(config.leeway());
        if let Some(issuer) = config.issuer.as_deref().filter(|s| !s.is_empty()) {
            interactor = interactor.with_issuer(issuer);
        }
        Ok(interactor)
    }

    /// Tolerance applied to `exp`, `nbf` and `iat` checks.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Issuer stamped on tokens whose claims do not name one.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Sign `claims` into a token string.
    ///
    /// Missing expiry is set to now + default TTL and a missing id is
    /// generated.
    ///
    /// # Errors
    /// Returns `ErrorKind::FailedToSignToken` if serialization or signing fails.
    pub fn issue(&self, mut claims: Claims) -> Result<String, SessionError> {
        if claims.expires_at == 0 {
            claims.expires_at = now_unix().saturating_add(seconds(self.ttl));
        }

        if claims.id.is_empty() {
            claims.id = Uuid::new_v4().to_string();
        }

        if claims.issuer.is_empty() {
            if let Some(issuer) = &self.issuer {
                claims.issuer.clone_from(issuer);
            }
        }

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to sign session token");
                SessionError::with_source(ErrorKind::FailedToSignToken, e)
            })?;

        tracing::debug!(jti = %claims.id, exp = claims.expires_at, "issued session token");
        Ok(token)
    }

    /// Parse and validate a token string back into claims.
    ///
    /// # Errors
    /// - `TokenMalformed`: not three base64url segments of JSON
    /// - `UnexpectedSigningMethod`: header algorithm outside the HMAC family
    /// - `FailedToParseClaims`: payload JSON does not match the claims shape
    /// - `TokenExpired`, `InvalidToken`, `TokenNotActive`: validity checks,
    ///   reported in that priority
    /// - `FailedToParseToken`: anything else (e.g. issued in the future)
    pub fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        let result = self.verify_token(token);
        if let Err(err) = &result {
            if err.is(ErrorKind::UnexpectedSigningMethod) {
                tracing::warn!(kind = %err.kind(), error = ?err, "session token rejected");
            } else {
                tracing::debug!(kind = %err.kind(), error = ?err, "session token rejected");
            }
        }
        result
    }

    fn verify_token(&self, token: &str) -> Result<Claims, SessionError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, _signature] = segments.as_slice() else {
            return Err(malformed(TokenFormatError::SegmentCount(segments.len())));
        };

        let header: RawHeader = serde_json::from_slice(&decode_segment("header", header)?)
            .map_err(|source| {
                malformed(TokenFormatError::Json {
                    segment: "header",
                    source,
                })
            })?;

        let payload: serde_json::Value =
            serde_json::from_slice(&decode_segment("payload", payload)?).map_err(|source| {
                malformed(TokenFormatError::Json {
                    segment: "payload",
                    source,
                })
            })?;
        let claims = Self::parse_claims(payload)?;

        let algorithm = Self::signing_algorithm(header)?;

        let mut violations = Violations {
            signature_invalid: !self.signature_matches(token, algorithm)?,
            ..Violations::default()
        };
        self.check_times(&claims, &mut violations);
        violations.into_result()?;

        Ok(claims)
    }

    /// Claims must be a JSON object; arrays and scalars are rejected even
    /// though serde would map an array onto the fields by position.
    fn parse_claims(payload: serde_json::Value) -> Result<Claims, SessionError> {
        if !payload.is_object() {
            return Err(SessionError::with_source(
                ErrorKind::FailedToParseClaims,
                ClaimsNotObject(json_type_name(&payload)),
            ));
        }
        serde_json::from_value(payload)
            .map_err(|source| SessionError::with_source(ErrorKind::FailedToParseClaims, source))
    }

    fn signing_algorithm(header: RawHeader) -> Result<Algorithm, SessionError> {
        match header.alg.as_deref().map(Algorithm::from_str) {
            Some(Ok(algorithm)) if is_hmac(algorithm) => Ok(algorithm),
            _ => Err(SessionError::with_source(
                ErrorKind::UnexpectedSigningMethod,
                UnsupportedAlgorithm(header.alg),
            )),
        }
    }

    fn signature_matches(&self, token: &str, algorithm: Algorithm) -> Result<bool, SessionError> {
        let mut validation = Validation::new(algorithm);

        // Time and audience checks are done separately so that their
        // priority relative to the signature check can be controlled.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        let empty_claims: &[&str] = &[];
        validation.set_required_spec_claims(empty_claims);

        match decode::<serde_json::Value>(token, &self.decoding_key, &validation) {
            Ok(_) => Ok(true),
            Err(e) => match e.kind() {
                JwtErrorKind::InvalidSignature | JwtErrorKind::Base64(_) => Ok(false),
                _ => Err(SessionError::with_source(ErrorKind::FailedToParseToken, e)),
            },
        }
    }

    fn check_times(&self, claims: &Claims, violations: &mut Violations) {
        let now = now_unix();
        let leeway = seconds(self.leeway);

        if claims.expires_at != 0 && now > claims.expires_at.saturating_add(leeway) {
            violations.expired = true;
        }

        if claims.not_before != 0 && now.saturating_add(leeway) < claims.not_before {
            violations.not_active = true;
        }

        if claims.issued_at != 0 && now.saturating_add(leeway) < claims.issued_at {
            violations.issued_in_future = Some(IssuedInFuture {
                issued_at: claims.issued_at,
                now,
            });
        }
    }
}
