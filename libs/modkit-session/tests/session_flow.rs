#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Issue, verify, propagate and authorize a session token end to end

use modkit_session::context::{
    auth_type_from_context, claims_from_context, project_id_from_context, token_from_context,
    user_id_from_context,
};
use modkit_session::{
    AccessGenerate, AuthType, Claims, ContextKey, ErrorKind, GenerateBasic, Interactor,
    JwtAccessGenerate, RequestContext, SessionConfig, SigningSecret, TokenVerifier,
    authorize_scopes, token_from_request,
};
use std::sync::Arc;
use std::time::Duration;

fn interactor() -> Interactor {
    let config = SessionConfig {
        signing_key: SigningSecret::new("flow-secret"),
        issuer: Some("auth.local".to_owned()),
        ..SessionConfig::default()
    };
    Interactor::from_config(&config).unwrap()
}

#[test]
fn bearer_request_to_authorized_context() {
    let interactor = interactor();
    let token = interactor
        .issue(
            Claims::builder()
                .user_id("user-1")
                .project_id("project-1")
                .scope("orders:read orders:write")
                .auth_type(AuthType::User)
                .build(),
        )
        .unwrap();

    let request = http::Request::builder()
        .uri("/orders")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(())
        .unwrap();

    let extracted = token_from_request(&request).unwrap();
    let claims = interactor.verify(&extracted).unwrap();
    assert_eq!(claims.issuer(), "auth.local");
    authorize_scopes(&claims, &["orders:read"]).unwrap();

    let ctx = RequestContext::new()
        .with_token(extracted)
        .with_value(ContextKey::AUTH_TYPE, AuthType::User)
        .with_claims(claims);

    assert_eq!(token_from_context(&ctx).unwrap(), token);
    assert_eq!(user_id_from_context(&ctx).unwrap(), "user-1");
    assert!(claims_from_context(&ctx).unwrap().is_user_auth());
    assert_eq!(
        auth_type_from_context(&ctx, &ContextKey::AUTH_TYPE).unwrap(),
        AuthType::User
    );

    let granted = claims_from_context(&ctx).unwrap();
    let err = authorize_scopes(granted, &["orders:delete"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientScope);
    assert_eq!(err.status(), http::StatusCode::FORBIDDEN);
}

#[test]
fn grant_tokens_verify_with_shared_interactor() {
    let interactor = Arc::new(interactor());
    let generator = JwtAccessGenerate::new(Arc::clone(&interactor), ContextKey::PROJECT_ID);

    let ctx = RequestContext::new().with_named_value("project_id", 17_i64);
    let request = GenerateBasic {
        client_id: "web".to_owned(),
        user_id: "user-9".to_owned(),
        scope: "profile".to_owned(),
        access_created_at: time::OffsetDateTime::now_utc(),
        access_expires_in: time::Duration::minutes(15),
    };

    let tokens = generator.generate(&ctx, &request, true).unwrap();
    assert!(tokens.refresh.is_some());

    let verifier: Arc<dyn TokenVerifier> = interactor;
    let claims = verifier.verify(&tokens.access).unwrap();
    assert_eq!(claims.client_id(), "web");
    assert_eq!(claims.project_id(), "17");
    assert_eq!(
        claims.expires_at(),
        request.access_expires_at().unwrap().unix_timestamp()
    );
    assert_eq!(project_id_from_context(&ctx, &ContextKey::PROJECT_ID).unwrap(), "17");
}

#[test]
fn scenario_known_key_and_foreign_key() {
    let id1 = Interactor::new(b"secret", Duration::from_secs(3600));
    let other = Interactor::new(b"other", Duration::from_secs(3600));

    let token = id1
        .issue(Claims::builder().id("id1").user_id("u1").build())
        .unwrap();

    let claims = id1.verify(&token).unwrap();
    assert_eq!(claims.id(), "id1");
    assert_eq!(claims.user_id(), "u1");

    let err = other.verify(&token).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidToken);
}
