use thiserror::Error;

/// Errors raised while configuring the session token system.
///
/// These are startup failures; callers are expected to abort rather than
/// retry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("signing key is not set")]
    MissingSigningKey,

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load session configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
