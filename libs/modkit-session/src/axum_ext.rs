//! Axum extractors and middleware for session tokens

use crate::{
    claims::Claims,
    config::SessionConfig,
    context::{claims_from_context, token_from_context, RequestContext},
    errors::{ErrorKind, SessionError},
    extract::{token_from_parts, DEFAULT_TOKEN_QUERY_PARAM},
    scope::authorize_scopes,
    traits::TokenVerifier,
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::Arc;

/// Decides per request whether the middleware steps aside.
pub type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Extractor for the verified claims stored by [`session_auth`].
#[derive(Debug, Clone)]
pub struct SessionClaims(pub Claims);

impl<S> FromRequestParts<S> for SessionClaims
where
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .ok_or_else(|| SessionError::new(ErrorKind::InvalidClaims))?;
        claims_from_context(ctx).cloned().map(SessionClaims)
    }
}

/// `Option<SessionClaims>` for routes behind an optional [`session_auth`].
impl<S> OptionalFromRequestParts<S> for SessionClaims
where
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| claims_from_context(ctx).ok())
            .cloned()
            .map(SessionClaims))
    }
}

/// Extractor for the raw token accepted by [`session_auth`].
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .ok_or_else(|| SessionError::new(ErrorKind::InvalidToken))?;
        token_from_context(ctx).map(|token| SessionToken(token.to_owned()))
    }
}

#[derive(Clone)]
pub struct SessionAuthState {
    verifier: Arc<dyn TokenVerifier>,
    required: bool,
    skipper: Option<Skipper>,
    scopes: Arc<[String]>,
    token_query_param: Arc<str>,
}

impl fmt::Debug for SessionAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthState")
            .field("required", &self.required)
            .field("skipper", &self.skipper.is_some())
            .field("scopes", &self.scopes)
            .field("token_query_param", &self.token_query_param)
            .finish_non_exhaustive()
    }
}

impl SessionAuthState {
    /// Requests without a token are rejected; no scopes are required.
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            required: true,
            skipper: None,
            scopes: Arc::from([]),
            token_query_param: Arc::from(DEFAULT_TOKEN_QUERY_PARAM),
        }
    }

    /// Like [`SessionAuthState::new`], reading the token query parameter
    /// name from `config`.
    #[must_use]
    pub fn from_config(verifier: Arc<dyn TokenVerifier>, config: &SessionConfig) -> Self {
        Self::new(verifier).with_token_query_param(config.token_query_param.as_str())
    }

    /// When `false`, requests without a token pass through unauthenticated.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn with_skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    /// Scopes every accepted token must grant.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_token_query_param(mut self, name: impl Into<String>) -> Self {
        self.token_query_param = Arc::from(name.into());
        self
    }
}

/// Session auth middleware
///
/// This middleware:
/// 1. Skips authentication for CORS preflight requests and when the skipper
///    says so
/// 2. Extracts the token from `Authorization` or the query string; a missing
///    token is a 401 when required, otherwise the request passes untouched
/// 3. Verifies the token (401 on failure) and checks required scopes (403)
/// 4. Inserts a [`RequestContext`] carrying the token and claims
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn session_auth(
    State(state): State<SessionAuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_preflight_request(request.method(), request.headers()) {
        return next.run(request).await;
    }

    if state.skipper.as_ref().is_some_and(|skip| skip(&request)) {
        return next.run(request).await;
    }

    let token = match token_from_parts(
        request.headers(),
        request.uri(),
        &state.token_query_param,
    ) {
        Ok(token) => token,
        Err(err) if state.required => return err.into_response(),
        Err(_) => return next.run(request).await,
    };

    let claims = match state.verifier.verify(&token) {
        Ok(claims) => claims,
        Err(err) => return unauthorized(err).into_response(),
    };

    if let Err(err) = authorize_scopes(&claims, &state.scopes[..]) {
        return err.into_response();
    }

    let ctx = RequestContext::new().with_token(token).with_claims(claims);
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

/// Verification failures always answer 401; kinds with another status are
/// wrapped as `InvalidToken`.
fn unauthorized(err: SessionError) -> SessionError {
    if err.status() == StatusCode::UNAUTHORIZED {
        err
    } else {
        SessionError::with_source(ErrorKind::InvalidToken, err)
    }
}

/// Check if this is a CORS preflight request
///
/// Preflight requests are OPTIONS requests with:
/// - Origin header present
/// - Access-Control-Request-Method header present
fn is_preflight_request(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(axum::http::header::ORIGIN)
        && headers.contains_key(axum::http::header::ACCESS_CONTROL_REQUEST_METHOD)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn preflight_needs_origin_and_request_method() {
        let mut headers = HeaderMap::new();
        assert!(!is_preflight_request(&Method::OPTIONS, &headers));

        headers.insert(header::ORIGIN, "https://app.local".parse().unwrap());
        assert!(!is_preflight_request(&Method::OPTIONS, &headers));

        headers.insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            "POST".parse().unwrap(),
        );
        assert!(is_preflight_request(&Method::OPTIONS, &headers));
        assert!(!is_preflight_request(&Method::GET, &headers));
    }

    #[test]
    fn non_unauthorized_failures_become_invalid_token() {
        let err = unauthorized(SessionError::new(ErrorKind::TokenMalformed));
        assert_eq!(err.kind(), ErrorKind::InvalidToken);

        let err = unauthorized(SessionError::new(ErrorKind::TokenExpired));
        assert_eq!(err.kind(), ErrorKind::TokenExpired);
    }
}

// Middleware behaviour is covered end to end in tests/axum_middleware.rs.
