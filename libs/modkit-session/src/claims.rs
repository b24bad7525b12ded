use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// TTL applied by [`ClaimsBuilder::ttl`] when a non-positive value is given.
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

/// Current time as seconds since the unix epoch.
#[must_use]
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Who the token was issued to.
///
/// Serialized as a single string: `u`, `a`, `i`, or any caller-defined value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthType {
    /// End user (email/password).
    User,
    /// Application (client id/secret).
    App,
    /// Internal service (client id/secret).
    Internal,
    Custom(String),
}

impl AuthType {
    pub const USER: &'static str = "u";
    pub const APP: &'static str = "a";
    pub const INTERNAL: &'static str = "i";

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => Self::USER,
            Self::App => Self::APP,
            Self::Internal => Self::INTERNAL,
            Self::Custom(value) => value,
        }
    }

    /// Whether this is one of the predefined auth types.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<&str> for AuthType {
    fn from(value: &str) -> Self {
        match value {
            Self::USER => Self::User,
            Self::APP => Self::App,
            Self::INTERNAL => Self::Internal,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for AuthType {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::USER => Self::User,
            Self::APP => Self::App,
            Self::INTERNAL => Self::Internal,
            _ => Self::Custom(value),
        }
    }
}

impl From<AuthType> for String {
    fn from(value: AuthType) -> Self {
        match value {
            AuthType::Custom(value) => value,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Explicit `null` decodes to the field's zero value, like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Session token payload.
///
/// Built through [`Claims::builder`]; read-only afterwards. Standard claims
/// use their RFC 7519 names, custom claims are `uid`, `pid`, `cid`, `scope`
/// and `auth`. Empty strings and zero timestamps are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(
        rename = "jti",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) id: String,

    #[serde(
        rename = "iss",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) issuer: String,

    #[serde(
        rename = "sub",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) subject: String,

    #[serde(
        rename = "aud",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) audience: String,

    #[serde(
        rename = "iat",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "is_zero"
    )]
    pub(crate) issued_at: i64,

    #[serde(
        rename = "exp",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "is_zero"
    )]
    pub(crate) expires_at: i64,

    #[serde(
        rename = "nbf",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "is_zero"
    )]
    pub(crate) not_before: i64,

    #[serde(
        rename = "uid",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) user_id: String,

    #[serde(
        rename = "pid",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) project_id: String,

    #[serde(
        rename = "cid",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) client_id: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub(crate) scope: String,

    #[serde(rename = "auth", default, skip_serializing_if = "Option::is_none")]
    pub(crate) auth_type: Option<AuthType>,
}

impl Claims {
    /// Start building claims with a fresh id and `issued_at` set to now.
    #[must_use]
    pub fn builder() -> ClaimsBuilder {
        ClaimsBuilder::new()
    }

    /// Token id (`jti`).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Issued at, seconds since epoch.
    #[must_use]
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry, seconds since epoch. `0` means not set.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Not-before, seconds since epoch. `0` means no restriction.
    #[must_use]
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Raw granted scope string.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn auth_type(&self) -> Option<&AuthType> {
        self.auth_type.as_ref()
    }

    #[must_use]
    pub fn is_user_auth(&self) -> bool {
        self.auth_type == Some(AuthType::User)
    }

    #[must_use]
    pub fn is_app_auth(&self) -> bool {
        self.auth_type == Some(AuthType::App)
    }

    #[must_use]
    pub fn is_internal_auth(&self) -> bool {
        self.auth_type == Some(AuthType::Internal)
    }

    /// Iterate over the granted scopes (space or comma delimited).
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope
            .split(|c: char| c == ' ' || c == ',')
            .filter(|s| !s.is_empty())
    }

    /// True iff `required` is one of the granted scope tokens.
    ///
    /// Matches whole tokens only: `read` is not granted by `readonly`.
    #[must_use]
    pub fn check_scope_in_allowed(&self, required: &str) -> bool {
        self.scopes().any(|granted| granted == required)
    }
}

/// Builder applying claim mutators in call order; later calls win.
#[derive(Debug, Clone)]
#[must_use]
pub struct ClaimsBuilder {
    claims: Claims,
}

impl Default for ClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimsBuilder {
    pub fn new() -> Self {
        Self {
            claims: Claims {
                id: Uuid::new_v4().to_string(),
                issued_at: now_unix(),
                ..Claims::default()
            },
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.claims.user_id = user_id.into();
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.claims.project_id = project_id.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.claims.client_id = client_id.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.claims.scope = scope.into();
        self
    }

    /// Set the auth type; only [`AuthType::User`] and [`AuthType::App`] are
    /// accepted, anything else leaves the current value untouched.
    pub fn auth_type(mut self, auth_type: impl Into<AuthType>) -> Self {
        let auth_type = auth_type.into();
        if matches!(auth_type, AuthType::User | AuthType::App) {
            self.claims.auth_type = Some(auth_type);
        }
        self
    }

    /// Set any auth type, including internal and caller-defined values.
    /// An empty string clears it.
    pub fn custom_auth_type(mut self, auth_type: impl Into<AuthType>) -> Self {
        let auth_type = auth_type.into();
        self.claims.auth_type = match auth_type {
            AuthType::Custom(ref value) if value.is_empty() => None,
            other => Some(other),
        };
        self
    }

    /// Absolute expiry, seconds since epoch.
    pub fn expires_at(mut self, expires_at: i64) -> Self {
        self.claims.expires_at = expires_at;
        self
    }

    /// Expiry relative to the current `issued_at`, in seconds.
    /// Non-positive values fall back to [`DEFAULT_TTL_SECONDS`].
    pub fn ttl(mut self, ttl_seconds: i64) -> Self {
        let ttl = if ttl_seconds <= 0 {
            DEFAULT_TTL_SECONDS
        } else {
            ttl_seconds
        };
        if self.claims.issued_at == 0 {
            self.claims.issued_at = now_unix();
        }
        self.claims.expires_at = self.claims.issued_at.saturating_add(ttl);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.claims.id = id.into();
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims.issuer = issuer.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.claims.subject = subject.into();
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.claims.audience = audience.into();
        self
    }

    pub fn not_before(mut self, not_before: i64) -> Self {
        self.claims.not_before = not_before;
        self
    }

    pub fn issued_at(mut self, issued_at: i64) -> Self {
        self.claims.issued_at = issued_at;
        self
    }

    /// Apply an arbitrary caller-defined mutator.
    pub fn with(mut self, mutator: impl FnOnce(&mut Claims)) -> Self {
        mutator(&mut self.claims);
        self
    }

    #[must_use]
    pub fn build(self) -> Claims {
        self.claims
    }
}
