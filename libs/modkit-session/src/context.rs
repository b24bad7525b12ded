//! Request-scoped propagation of verified session data.
//!
//! Values are stored under a [`ContextKey`]. Lookups follow a two-step
//! policy: the typed key first, then the key's string form, so that values
//! placed by transports which only support string keys are still found.

use crate::{
    claims::{AuthType, Claims},
    errors::{ErrorKind, SessionError},
};
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Type-erased context value.
pub type ContextValue = dyn Any + Send + Sync;

/// Typed, string-backed key for values in a [`RequestContext`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    key: Cow<'static, str>,
}

impl ContextKey {
    pub const CLAIMS: Self = Self::from_static("claims");
    pub const TOKEN: Self = Self::from_static("token");
    pub const PROJECT_ID: Self = Self::from_static("project_id");
    pub const AUTH_TYPE: Self = Self::from_static("auth_type");

    #[must_use]
    pub const fn from_static(key: &'static str) -> Self {
        Self {
            key: Cow::Borrowed(key),
        }
    }

    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Cow::Owned(key.into()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey").field("key", &self.key).finish()
    }
}

/// String form used for the fallback lookup. An empty key renders as its
/// debug representation so it never collides with a plain empty string key.
impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{self:?}")
        } else {
            f.write_str(&self.key)
        }
    }
}

/// Read access to a request-scoped key-value store.
pub trait ValueLookup {
    /// Value stored under the typed key.
    fn typed_value(&self, key: &ContextKey) -> Option<&ContextValue>;

    /// Value stored under a plain string key.
    fn named_value(&self, key: &str) -> Option<&ContextValue>;
}

/// Request-scoped store keeping typed and string-keyed values apart.
#[derive(Clone, Default)]
pub struct RequestContext {
    typed: HashMap<ContextKey, Arc<ContextValue>>,
    named: HashMap<String, Arc<ContextValue>>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("typed", &self.typed.keys().collect::<Vec<_>>())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: ContextKey, value: T) {
        self.typed.insert(key, Arc::new(value));
    }

    pub fn insert_named<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.named.insert(key.into(), Arc::new(value));
    }

    #[must_use]
    pub fn with_value<T: Any + Send + Sync>(mut self, key: ContextKey, value: T) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_named_value<T: Any + Send + Sync>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Self {
        self.insert_named(key, value);
        self
    }

    /// Store verified claims under [`ContextKey::CLAIMS`].
    #[must_use]
    pub fn with_claims(self, claims: Claims) -> Self {
        self.with_value(ContextKey::CLAIMS, claims)
    }

    /// Store the raw token under [`ContextKey::TOKEN`].
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_value(ContextKey::TOKEN, token.into())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.named.is_empty()
    }
}

impl ValueLookup for RequestContext {
    fn typed_value(&self, key: &ContextKey) -> Option<&ContextValue> {
        self.typed.get(key).map(|v| &**v)
    }

    fn named_value(&self, key: &str) -> Option<&ContextValue> {
        self.named.get(key).map(|v| &**v)
    }
}

/// String-keyed maps, as kept by transports without typed keys.
impl<S: std::hash::BuildHasher> ValueLookup for HashMap<String, Box<ContextValue>, S> {
    fn typed_value(&self, _key: &ContextKey) -> Option<&ContextValue> {
        None
    }

    fn named_value(&self, key: &str) -> Option<&ContextValue> {
        self.get(key).map(|v| &**v)
    }
}

/// Find a value by typed key, falling back to the key's string form.
#[must_use]
pub fn lookup<'a, C>(ctx: &'a C, key: &ContextKey) -> Option<&'a ContextValue>
where
    C: ValueLookup + ?Sized,
{
    ctx.typed_value(key)
        .or_else(|| ctx.named_value(&key.to_string()))
}

/// Find a value of type `T`; a typed entry of another type does not stop
/// the string-key fallback.
#[must_use]
pub fn lookup_as<'a, T, C>(ctx: &'a C, key: &ContextKey) -> Option<&'a T>
where
    T: Any,
    C: ValueLookup + ?Sized,
{
    ctx.typed_value(key)
        .and_then(<dyn Any + Send + Sync>::downcast_ref::<T>)
        .or_else(|| {
            ctx.named_value(&key.to_string())
                .and_then(<dyn Any + Send + Sync>::downcast_ref::<T>)
        })
}

/// Verified claims stored for this request.
///
/// # Errors
/// Returns `ErrorKind::InvalidClaims` if no claims are stored.
pub fn claims_from_context<C: ValueLookup + ?Sized>(ctx: &C) -> Result<&Claims, SessionError> {
    lookup_as::<Claims, _>(ctx, &ContextKey::CLAIMS)
        .or_else(|| lookup_as::<Arc<Claims>, _>(ctx, &ContextKey::CLAIMS).map(|c| &**c))
        .ok_or_else(|| SessionError::new(ErrorKind::InvalidClaims))
}

/// User id from the stored claims (may be empty).
///
/// # Errors
/// Returns `ErrorKind::InvalidClaims` if no claims are stored.
pub fn user_id_from_context<C: ValueLookup + ?Sized>(ctx: &C) -> Result<&str, SessionError> {
    claims_from_context(ctx).map(Claims::user_id)
}

/// Session (token) id from the stored claims.
///
/// # Errors
/// Returns `ErrorKind::InvalidClaims` if no claims are stored.
pub fn session_id_from_context<C: ValueLookup + ?Sized>(ctx: &C) -> Result<&str, SessionError> {
    claims_from_context(ctx).map(Claims::id)
}

/// Client id from the stored claims.
///
/// # Errors
/// Returns `ErrorKind::InvalidClaims` if no claims are stored.
pub fn client_id_from_context<C: ValueLookup + ?Sized>(ctx: &C) -> Result<&str, SessionError> {
    claims_from_context(ctx).map(Claims::client_id)
}

/// Granted scope from the stored claims.
///
/// # Errors
/// Returns `ErrorKind::InvalidClaims` if no claims are stored.
pub fn scope_from_context<C: ValueLookup + ?Sized>(ctx: &C) -> Result<&str, SessionError> {
    claims_from_context(ctx).map(Claims::scope)
}

/// Raw token stored for this request.
///
/// # Errors
/// Returns `ErrorKind::InvalidToken` if no token string is stored.
pub fn token_from_context<C: ValueLookup + ?Sized>(ctx: &C) -> Result<&str, SessionError> {
    lookup_as::<String, _>(ctx, &ContextKey::TOKEN)
        .map(String::as_str)
        .or_else(|| lookup_as::<&'static str, _>(ctx, &ContextKey::TOKEN).copied())
        .ok_or_else(|| SessionError::new(ErrorKind::InvalidToken))
}

fn project_id_to_string(value: &ContextValue) -> Option<String> {
    if let Some(v) = value.downcast_ref::<String>() {
        return Some(v.clone());
    }
    if let Some(v) = value.downcast_ref::<&'static str>() {
        return Some((*v).to_owned());
    }
    if let Some(v) = value.downcast_ref::<Uuid>() {
        return Some(v.to_string());
    }
    if let Some(v) = value.downcast_ref::<i64>() {
        return Some(v.to_string());
    }
    if let Some(v) = value.downcast_ref::<i32>() {
        return Some(v.to_string());
    }
    if let Some(v) = value.downcast_ref::<u64>() {
        return Some(v.to_string());
    }
    if let Some(v) = value.downcast_ref::<u32>() {
        return Some(v.to_string());
    }
    if let Some(v) = value.downcast_ref::<usize>() {
        return Some(v.to_string());
    }
    value.downcast_ref::<isize>().map(ToString::to_string)
}

/// Project id stored under `key`, normalized to a string.
///
/// Strings, integers and UUIDs are accepted.
///
/// # Errors
/// Returns `ErrorKind::InvalidProjectId` if nothing is stored or the value
/// has an unsupported type.
pub fn project_id_from_context<C: ValueLookup + ?Sized>(
    ctx: &C,
    key: &ContextKey,
) -> Result<String, SessionError> {
    lookup(ctx, key)
        .and_then(project_id_to_string)
        .ok_or_else(|| SessionError::new(ErrorKind::InvalidProjectId))
}

/// Auth type stored under `key`; must be one of the predefined types.
///
/// # Errors
/// Returns `ErrorKind::InvalidAuthType` if nothing is stored, the value is
/// not a string or [`AuthType`], or it is a custom auth type.
pub fn auth_type_from_context<C: ValueLookup + ?Sized>(
    ctx: &C,
    key: &ContextKey,
) -> Result<AuthType, SessionError> {
    let value = lookup(ctx, key).ok_or_else(|| SessionError::new(ErrorKind::InvalidAuthType))?;

    let auth_type = if let Some(v) = value.downcast_ref::<AuthType>() {
        v.clone()
    } else if let Some(v) = value.downcast_ref::<String>() {
        AuthType::from(v.as_str())
    } else if let Some(v) = value.downcast_ref::<&'static str>() {
        AuthType::from(*v)
    } else {
        return Err(SessionError::new(ErrorKind::InvalidAuthType));
    };

    if auth_type.is_known() {
        Ok(auth_type)
    } else {
        Err(SessionError::new(ErrorKind::InvalidAuthType))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        Claims::builder()
            .id("session-1")
            .user_id("user-1")
            .client_id("client-1")
            .scope("read")
            .build()
    }

    #[test]
    fn key_display_uses_key_or_debug_form() {
        assert_eq!(ContextKey::CLAIMS.to_string(), "claims");
        assert_eq!(ContextKey::new("tenant").to_string(), "tenant");
        assert_eq!(ContextKey::new("").to_string(), r#"ContextKey { key: "" }"#);
    }

    #[test]
    fn typed_key_is_preferred_over_string_key() {
        let typed = Claims::builder().user_id("typed").build();
        let named = Claims::builder().user_id("named").build();
        let ctx = RequestContext::new()
            .with_named_value("claims", named)
            .with_claims(typed);

        assert_eq!(user_id_from_context(&ctx).unwrap(), "typed");
    }

    #[test]
    fn string_key_fallback_finds_values() {
        let ctx = RequestContext::new()
            .with_named_value("claims", sample_claims())
            .with_named_value("token", "abc".to_owned());

        assert_eq!(session_id_from_context(&ctx).unwrap(), "session-1");
        assert_eq!(client_id_from_context(&ctx).unwrap(), "client-1");
        assert_eq!(scope_from_context(&ctx).unwrap(), "read");
        assert_eq!(token_from_context(&ctx).unwrap(), "abc");
    }

    #[test]
    fn wrong_typed_value_falls_back_to_string_key() {
        let ctx = RequestContext::new()
            .with_value(ContextKey::CLAIMS, 42_i64)
            .with_named_value("claims", Arc::new(sample_claims()));

        assert_eq!(user_id_from_context(&ctx).unwrap(), "user-1");
    }

    #[test]
    fn string_only_maps_are_supported() {
        let mut map: HashMap<String, Box<ContextValue>> = HashMap::new();
        map.insert("claims".to_owned(), Box::new(sample_claims()));
        map.insert("project_id".to_owned(), Box::new(7_u32));

        assert_eq!(user_id_from_context(&map).unwrap(), "user-1");
        assert_eq!(
            project_id_from_context(&map, &ContextKey::PROJECT_ID).unwrap(),
            "7"
        );
    }

    #[test]
    fn missing_values_fail_with_typed_errors() {
        let ctx = RequestContext::new();

        assert!(ctx.is_empty());
        assert_eq!(
            claims_from_context(&ctx).unwrap_err().kind(),
            ErrorKind::InvalidClaims
        );
        assert_eq!(
            user_id_from_context(&ctx).unwrap_err().kind(),
            ErrorKind::InvalidClaims
        );
        assert_eq!(
            token_from_context(&ctx).unwrap_err().kind(),
            ErrorKind::InvalidToken
        );
        assert_eq!(
            project_id_from_context(&ctx, &ContextKey::PROJECT_ID)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidProjectId
        );
        assert_eq!(
            auth_type_from_context(&ctx, &ContextKey::AUTH_TYPE)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidAuthType
        );
    }

    #[test]
    fn empty_user_id_is_not_an_error() {
        let ctx = RequestContext::new().with_claims(Claims::builder().build());
        assert_eq!(user_id_from_context(&ctx).unwrap(), "");
    }

    #[test]
    fn project_id_is_normalized_to_string() {
        let uuid = Uuid::new_v4();
        let cases: Vec<(RequestContext, String)> = vec![
            (
                RequestContext::new().with_value(ContextKey::PROJECT_ID, "p-1".to_owned()),
                "p-1".to_owned(),
            ),
            (
                RequestContext::new().with_value(ContextKey::PROJECT_ID, "p-2"),
                "p-2".to_owned(),
            ),
            (
                RequestContext::new().with_value(ContextKey::PROJECT_ID, 42_i32),
                "42".to_owned(),
            ),
            (
                RequestContext::new().with_value(ContextKey::PROJECT_ID, -3_i64),
                "-3".to_owned(),
            ),
            (
                RequestContext::new().with_named_value("project_id", uuid),
                uuid.to_string(),
            ),
        ];

        for (ctx, expected) in cases {
            assert_eq!(
                project_id_from_context(&ctx, &ContextKey::PROJECT_ID).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn project_id_with_unsupported_type_is_rejected() {
        let ctx = RequestContext::new().with_value(ContextKey::PROJECT_ID, 1.5_f64);
        assert_eq!(
            project_id_from_context(&ctx, &ContextKey::PROJECT_ID)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidProjectId
        );
    }

    #[test]
    fn auth_type_accepts_only_predefined_values() {
        let key = ContextKey::AUTH_TYPE;

        let ctx = RequestContext::new().with_value(key.clone(), AuthType::Internal);
        assert_eq!(auth_type_from_context(&ctx, &key).unwrap(), AuthType::Internal);

        let ctx = RequestContext::new().with_named_value("auth_type", "u".to_owned());
        assert_eq!(auth_type_from_context(&ctx, &key).unwrap(), AuthType::User);

        let ctx = RequestContext::new().with_value(key.clone(), "a");
        assert_eq!(auth_type_from_context(&ctx, &key).unwrap(), AuthType::App);

        let ctx = RequestContext::new().with_value(key.clone(), "robot");
        assert_eq!(
            auth_type_from_context(&ctx, &key).unwrap_err().kind(),
            ErrorKind::InvalidAuthType
        );

        let ctx = RequestContext::new().with_value(key.clone(), 1_u8);
        assert_eq!(
            auth_type_from_context(&ctx, &key).unwrap_err().kind(),
            ErrorKind::InvalidAuthType
        );
    }

    #[test]
    fn custom_keys_are_isolated() {
        let key = ContextKey::new("tenant_project");
        let ctx = RequestContext::new().with_value(ContextKey::PROJECT_ID, "wrong");

        assert!(project_id_from_context(&ctx, &key).is_err());
    }
}
