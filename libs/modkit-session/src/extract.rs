//! Locating the session token in an inbound HTTP request.

use crate::errors::{ErrorKind, SessionError};
use http::{header::AUTHORIZATION, HeaderMap, Request, Uri};

/// Query parameter consulted when the `Authorization` header is empty.
pub const DEFAULT_TOKEN_QUERY_PARAM: &str = "token";

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the token from a request using the default query parameter.
///
/// # Errors
/// Returns `ErrorKind::InvalidToken` when no token is present.
pub fn token_from_request<B>(request: &Request<B>) -> Result<String, SessionError> {
    token_from_parts(request.headers(), request.uri(), DEFAULT_TOKEN_QUERY_PARAM)
}

/// Extract the token from headers, falling back to the `query_param` query
/// parameter.
///
/// A non-empty `Authorization` header wins; a leading `Bearer ` is stripped,
/// any other value is taken as-is.
///
/// # Errors
/// Returns `ErrorKind::InvalidToken` when both sources are empty.
pub fn token_from_parts(
    headers: &HeaderMap,
    uri: &Uri,
    query_param: &str,
) -> Result<String, SessionError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let token = if header.trim().is_empty() {
        query_value(uri, query_param).unwrap_or_default()
    } else {
        header
            .strip_prefix(BEARER_PREFIX)
            .unwrap_or(header)
            .trim()
            .to_owned()
    };

    if token.is_empty() {
        return Err(SessionError::new(ErrorKind::InvalidToken));
    }
    Ok(token)
}

fn query_value(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
