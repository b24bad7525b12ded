use crate::{claims::Claims, errors::SessionError, interactor::Interactor};
use std::sync::Arc;

/// Signs claims into token strings
pub trait TokenIssuer: Send + Sync {
    /// Sign the claims, filling in expiry and id when unset
    ///
    /// # Errors
    /// Returns `ErrorKind::FailedToSignToken` if signing fails.
    fn issue(&self, claims: Claims) -> Result<String, SessionError>;
}

/// Parses and validates token strings
pub trait TokenVerifier: Send + Sync {
    /// Validate a token and return its claims
    ///
    /// # Errors
    /// Returns a `SessionError` describing why the token was rejected.
    fn verify(&self, token: &str) -> Result<Claims, SessionError>;
}

impl TokenIssuer for Interactor {
    fn issue(&self, claims: Claims) -> Result<String, SessionError> {
        Interactor::issue(self, claims)
    }
}

impl TokenVerifier for Interactor {
    fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        Interactor::verify(self, token)
    }
}

impl<T: TokenIssuer + ?Sized> TokenIssuer for Arc<T> {
    fn issue(&self, claims: Claims) -> Result<String, SessionError> {
        (**self).issue(claims)
    }
}

impl<T: TokenVerifier + ?Sized> TokenVerifier for Arc<T> {
    fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        (**self).verify(token)
    }
}
