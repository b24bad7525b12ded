use crate::{
    claims::Claims,
    errors::{ErrorKind, SessionError},
};
use thiserror::Error;

/// The scope that was required but not granted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required scope `{0}`")]
pub struct MissingScope(pub String);

/// Require every scope in `required` to be granted by `claims`.
///
/// Stops at the first scope that is not granted. An empty list always passes.
///
/// # Errors
/// Returns `ErrorKind::InsufficientScope` with a [`MissingScope`] source.
pub fn authorize_scopes<S: AsRef<str>>(
    claims: &Claims,
    required: &[S],
) -> Result<(), SessionError> {
    for scope in required {
        let scope = scope.as_ref();
        if !claims.check_scope_in_allowed(scope) {
            tracing::warn!(
                session_id = claims.id(),
                scope,
                granted = claims.scope(),
                "Required scope not granted"
            );
            return Err(SessionError::with_source(
                ErrorKind::InsufficientScope,
                MissingScope(scope.to_owned()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn claims(scope: &str) -> Claims {
        Claims::builder().scope(scope).build()
    }

    #[test]
    fn all_required_scopes_granted() {
        let claims = claims("read write,admin");
        assert!(authorize_scopes(&claims, &["read", "admin"]).is_ok());
    }

    #[test]
    fn empty_requirement_passes() {
        let required: [&str; 0] = [];
        assert!(authorize_scopes(&claims(""), &required).is_ok());
    }

    #[test]
    fn first_missing_scope_is_reported() {
        let err = authorize_scopes(&claims("read"), &["read", "write", "admin"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientScope);
        let missing = err
            .source()
            .and_then(|e| e.downcast_ref::<MissingScope>())
            .unwrap();
        assert_eq!(missing, &MissingScope("write".to_owned()));
    }

    #[test]
    fn owned_strings_are_accepted() {
        let required = vec!["read".to_owned()];
        assert!(authorize_scopes(&claims("read"), &required).is_ok());
    }
}
