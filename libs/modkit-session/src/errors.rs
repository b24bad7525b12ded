use http::StatusCode;
use thiserror::Error;

/// Boxed underlying cause carried by [`SessionError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of session token failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidToken,
    TokenMalformed,
    TokenExpired,
    TokenNotActive,
    InvalidSession,
    FailedToParseClaims,
    UnexpectedSigningMethod,
    FailedToSignToken,
    FailedToParseToken,
    InvalidClaims,
    InvalidProjectId,
    InvalidAuthType,
    InsufficientScope,
}

/// Static definition of an error kind: HTTP status, wire code and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrDef {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: &'static str,
}

impl ErrorKind {
    /// Lookup table mapping each kind to its status, code and message.
    #[must_use]
    pub const fn def(self) -> ErrDef {
        let (status, code, message) = match self {
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", "Invalid token"),
            Self::TokenMalformed => (StatusCode::BAD_REQUEST, "token_malformed", "Malformed token"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired", "Token expired"),
            Self::TokenNotActive => (
                StatusCode::UNAUTHORIZED,
                "token_inactive",
                "Token not active",
            ),
            Self::InvalidSession => (
                StatusCode::UNAUTHORIZED,
                "invalid_session",
                "Invalid session",
            ),
            Self::FailedToParseClaims => (
                StatusCode::BAD_REQUEST,
                "failed_parse_claims",
                "Failed to parse claims",
            ),
            Self::UnexpectedSigningMethod => (
                StatusCode::BAD_REQUEST,
                "unexpected_signing_method",
                "Unexpected signing method",
            ),
            Self::FailedToSignToken => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed_to_sign_token",
                "Failed to sign token",
            ),
            Self::FailedToParseToken => (
                StatusCode::BAD_REQUEST,
                "failed_to_parse_token",
                "Failed to parse token",
            ),
            Self::InvalidClaims => (StatusCode::BAD_REQUEST, "invalid_claims", "Invalid claims"),
            Self::InvalidProjectId => (
                StatusCode::BAD_REQUEST,
                "invalid_project_id",
                "Invalid project ID",
            ),
            Self::InvalidAuthType => (
                StatusCode::BAD_REQUEST,
                "invalid_auth_type",
                "Invalid auth type",
            ),
            Self::InsufficientScope => (
                StatusCode::FORBIDDEN,
                "insufficient_scope",
                "Insufficient scope",
            ),
        };
        ErrDef {
            status,
            code,
            message,
        }
    }

    #[must_use]
    pub const fn status(self) -> StatusCode {
        self.def().status
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        self.def().code
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        self.def().message
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by token issuance, verification and context lookups.
///
/// Exposes a stable [`ErrorKind`] (and through it the HTTP status) while
/// keeping the original cause reachable via [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("{}", .kind.message())]
pub struct SessionError {
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl SessionError {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Wrap an underlying cause under the given kind.
    #[must_use]
    pub fn with_source(kind: ErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<ErrorKind> for SessionError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(feature = "axum-ext")]
impl axum::response::IntoResponse for SessionError {
    fn into_response(self) -> axum::response::Response {
        use axum::response::Json;
        use serde_json::json;

        let status = self.status();
        let body = Json(json!({
            "error": self.kind.code(),
            "error_code": status.as_u16(),
            "error_message": self.kind.message(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn status_table_matches_taxonomy() {
        let unauthorized = [
            ErrorKind::InvalidToken,
            ErrorKind::TokenExpired,
            ErrorKind::TokenNotActive,
            ErrorKind::InvalidSession,
        ];
        for kind in unauthorized {
            assert_eq!(kind.status(), StatusCode::UNAUTHORIZED, "{kind}");
        }

        let bad_request = [
            ErrorKind::TokenMalformed,
            ErrorKind::FailedToParseClaims,
            ErrorKind::UnexpectedSigningMethod,
            ErrorKind::FailedToParseToken,
            ErrorKind::InvalidClaims,
            ErrorKind::InvalidProjectId,
            ErrorKind::InvalidAuthType,
        ];
        for kind in bad_request {
            assert_eq!(kind.status(), StatusCode::BAD_REQUEST, "{kind}");
        }

        assert_eq!(
            ErrorKind::FailedToSignToken.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ErrorKind::InsufficientScope.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn display_uses_message_and_keeps_source() {
        let cause = std::io::Error::other("boom");
        let err = SessionError::with_source(ErrorKind::FailedToSignToken, cause);

        assert_eq!(err.to_string(), "Failed to sign token");
        assert!(err.is(ErrorKind::FailedToSignToken));
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("boom"));
    }

    #[test]
    fn kind_display_is_wire_code() {
        assert_eq!(ErrorKind::TokenNotActive.to_string(), "token_inactive");
        assert_eq!(ErrorKind::InvalidProjectId.to_string(), "invalid_project_id");
    }

    #[cfg(feature = "axum-ext")]
    #[test]
    fn into_response_uses_kind_status() {
        use axum::response::IntoResponse;

        let response = SessionError::new(ErrorKind::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
