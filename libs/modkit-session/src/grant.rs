//! Access token generation for OAuth2 authorization servers.
//!
//! [`JwtAccessGenerate`] turns a completed grant into a signed session token
//! and, on request, an opaque refresh token.

use crate::{
    claims::Claims,
    context::{project_id_from_context, ContextKey, ValueLookup},
    errors::{ErrorKind, SessionError},
    traits::TokenIssuer,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Grant data needed to mint an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateBasic {
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub access_created_at: OffsetDateTime,
    pub access_expires_in: Duration,
}

impl GenerateBasic {
    /// Absolute expiry of the access token, `None` when it falls outside
    /// the representable date range.
    #[must_use]
    pub fn access_expires_at(&self) -> Option<OffsetDateTime> {
        self.access_created_at.checked_add(self.access_expires_in)
    }
}

/// Tokens produced for a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTokens {
    pub access: String,
    /// Present only when a refresh token was requested.
    pub refresh: Option<String>,
}

/// Produces access (and optionally refresh) tokens for a grant.
pub trait AccessGenerate: Send + Sync {
    /// # Errors
    /// Returns the issuer's error when the access token cannot be signed, or
    /// `ErrorKind::FailedToSignToken` when the expiry overflows.
    fn generate(
        &self,
        ctx: &dyn ValueLookup,
        request: &GenerateBasic,
        gen_refresh: bool,
    ) -> Result<GeneratedTokens, SessionError>;
}

/// [`AccessGenerate`] backed by a [`TokenIssuer`].
#[derive(Debug, Clone)]
pub struct JwtAccessGenerate<I> {
    issuer: I,
    project_id_key: ContextKey,
}

impl<I: TokenIssuer> JwtAccessGenerate<I> {
    /// `project_id_key` names the context entry holding the project id.
    #[must_use]
    pub fn new(issuer: I, project_id_key: ContextKey) -> Self {
        Self {
            issuer,
            project_id_key,
        }
    }
}

impl<I: TokenIssuer> AccessGenerate for JwtAccessGenerate<I> {
    fn generate(
        &self,
        ctx: &dyn ValueLookup,
        request: &GenerateBasic,
        gen_refresh: bool,
    ) -> Result<GeneratedTokens, SessionError> {
        // A missing or unusable project id is not fatal for a grant.
        let project_id = project_id_from_context(ctx, &self.project_id_key).unwrap_or_default();
        let expires_at = request.access_expires_at().ok_or_else(|| {
            tracing::warn!(
                client_id = %request.client_id,
                expires_in = %request.access_expires_in,
                "Access token expiry out of range"
            );
            SessionError::new(ErrorKind::FailedToSignToken)
        })?;

        let claims = Claims::builder()
            .client_id(request.client_id.as_str())
            .user_id(request.user_id.as_str())
            .scope(request.scope.as_str())
            .project_id(project_id)
            .expires_at(expires_at.unix_timestamp())
            .build();

        let access = self.issuer.issue(claims)?;
        let refresh = gen_refresh.then(|| refresh_token_for(&access));

        tracing::debug!(
            client_id = %request.client_id,
            refresh = gen_refresh,
            "Generated access token for grant"
        );

        Ok(GeneratedTokens { access, refresh })
    }
}

/// Opaque refresh token derived from the access token and a random namespace.
fn refresh_token_for(access: &str) -> String {
    let id = Uuid::new_v5(&Uuid::new_v4(), access.as_bytes()).to_string();
    URL_SAFE_NO_PAD.encode(id.as_bytes()).to_uppercase()
}
