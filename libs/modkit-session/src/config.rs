use crate::config_error::ConfigError;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable prefix for session settings (`SESSION_SIGNING_KEY`, ...).
pub const ENV_PREFIX: &str = "SESSION_";

const SIGNING_KEY: &str = "signing_key";

/// Shared HMAC secret.
///
/// `Debug` prints `[REDACTED]`; the buffer is zeroed on drop. Numbers and
/// booleans (unquoted YAML values) are kept in their textual form.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(String);

struct SigningSecretVisitor;

impl Visitor<'_> for SigningSecretVisitor {
    type Value = SigningSecret;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a signing key string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(SigningSecret::new(value))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(SigningSecret(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(SigningSecret(value.to_string()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(SigningSecret(value.to_string()))
    }

    fn visit_i128<E: de::Error>(self, value: i128) -> Result<Self::Value, E> {
        Ok(SigningSecret(value.to_string()))
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<Self::Value, E> {
        Ok(SigningSecret(value.to_string()))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(SigningSecret(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for SigningSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SigningSecretVisitor)
    }
}

impl SigningSecret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read-only access to the raw secret bytes.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Session token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC signing key (required)
    #[serde(default)]
    pub signing_key: SigningSecret,

    /// Default token lifetime in seconds, used when claims carry no expiry
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,

    /// Leeway in seconds for time-based validations (exp, nbf, iat)
    #[serde(default)]
    pub leeway_seconds: u64,

    /// Issuer stamped on tokens that do not name one
    #[serde(default)]
    pub issuer: Option<String>,

    /// Query parameter consulted when no `Authorization` header is sent
    #[serde(default = "default_token_query_param")]
    pub token_query_param: String,
}

fn default_ttl() -> u64 {
    3600
}

fn default_token_query_param() -> String {
    "token".to_owned()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signing_key: SigningSecret::default(),
            ttl_seconds: default_ttl(),
            leeway_seconds: 0,
            issuer: None,
            token_query_param: default_token_query_param(),
        }
    }
}

impl SessionConfig {
    /// Layered configuration source: optional YAML file, then `SESSION_*`
    /// environment variables.
    ///
    /// `SESSION_SIGNING_KEY` is taken verbatim, so keys such as `007` keep
    /// their exact bytes instead of being parsed as numbers.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&[SIGNING_KEY]));
        if let Some(key) = Env::var(&format!("{ENV_PREFIX}SIGNING_KEY")) {
            figment = figment.merge((SIGNING_KEY, key));
        }
        figment
    }

    /// Extract and validate configuration from a figment.
    ///
    /// # Errors
    /// Returns `ConfigError::Load` if extraction fails, or a validation error
    /// (see [`SessionConfig::validate`]).
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file and the environment.
    ///
    /// # Errors
    /// See [`SessionConfig::from_figment`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(path))
    }

    /// Validate the configuration for consistency
    ///
    /// # Errors
    /// Returns `ConfigError::MissingSigningKey` for an empty key and
    /// `ConfigError::InvalidConfig` for an empty query parameter name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_key.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }
        if self.token_query_param.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "token_query_param must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway_seconds)
    }
}
