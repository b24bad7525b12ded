#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Signed session tokens for `ModKit` services
//!
//! This crate provides:
//! - [`Claims`] built through composable mutators
//! - [`Interactor`] issuing and verifying HMAC-signed tokens
//! - [`RequestContext`] propagation with typed and string-keyed lookups
//! - Scope authorization and token extraction from HTTP requests
//! - [`JwtAccessGenerate`] for OAuth2 authorization servers
//! - Axum middleware and extractors (feature `axum-ext`, on by default)
//!
//! # Example
//!
//! ```
//! use modkit_session::{Claims, Interactor};
//! use std::time::Duration;
//!
//! let interactor = Interactor::new(b"secret", Duration::from_secs(3600));
//! let claims = Claims::builder().user_id("user-1").scope("read write").build();
//!
//! let token = interactor.issue(claims.clone()).unwrap();
//! let verified = interactor.verify(&token).unwrap();
//! assert_eq!(verified.user_id(), "user-1");
//! assert!(verified.check_scope_in_allowed("write"));
//! ```

pub mod claims;
pub mod config;
pub mod config_error;
pub mod context;
pub mod errors;
pub mod extract;
pub mod grant;
pub mod interactor;
pub mod scope;
pub mod traits;

#[cfg(feature = "axum-ext")]
pub mod axum_ext;

pub use claims::{AuthType, Claims, ClaimsBuilder};
pub use config::{SessionConfig, SigningSecret};
pub use config_error::ConfigError;
pub use context::{ContextKey, RequestContext, ValueLookup};
pub use errors::{ErrorKind, SessionError};
pub use extract::{token_from_parts, token_from_request};
pub use grant::{AccessGenerate, GenerateBasic, GeneratedTokens, JwtAccessGenerate};
pub use interactor::Interactor;
pub use scope::authorize_scopes;
pub use traits::{TokenIssuer, TokenVerifier};
