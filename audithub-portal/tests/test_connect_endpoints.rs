//! OpenID Connect endpoints through the full router

mod common;

use axum::http::{StatusCode, header};
use common::*;

#[tokio::test]
async fn discovery_document_points_at_issuer_endpoints() {
    let app = spawn_app();

    let response = app
        .send(get("/.well-known/openid-configuration", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = json(response).await;
    assert_eq!(doc["issuer"], ISSUER);
    assert_eq!(doc["token_endpoint"], format!("{ISSUER}/connect/token"));
    assert_eq!(doc["code_challenge_methods_supported"][0], "S256");
}

#[tokio::test]
async fn authorization_code_flow_issues_tokens() {
    let app = spawn_app();
    app.register("alice@example.com", "alice").await;

    let code = app
        .authorization_code("alice@example.com", "openid email offline_access")
        .await;
    let response = app.exchange_code(&code).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let tokens = json(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["access_token"].as_str().is_some());
    assert!(tokens["id_token"].as_str().is_some());
    assert!(tokens["refresh_token"].as_str().is_some());
    assert_eq!(tokens["scope"], "openid email offline_access");
}

#[tokio::test]
async fn pending_request_is_described_for_the_login_page() {
    let app = spawn_app();
    let request_id = app.authorize("openid profile").await;

    let response = app
        .send(get(&format!("/connect/authorize/{request_id}"), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["client_name"], "Portal");

    let unknown = app.send(get("/connect/authorize/nope", None)).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reusing_a_code_is_invalid_grant() {
    let app = spawn_app();
    app.register("bob@example.com", "bob").await;

    let code = app.authorization_code("bob@example.com", "openid").await;
    assert_eq!(app.exchange_code(&code).await.status(), StatusCode::OK);

    let replay = app.exchange_code(&code).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(replay.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(json(replay).await["error"], "invalid_grant");
}

#[tokio::test]
async fn wrong_verifier_is_rejected() {
    let app = spawn_app();
    app.register("carol@example.com", "carol").await;
    let code = app.authorization_code("carol@example.com", "openid").await;

    let response = app
        .send(post_form(
            "/connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", CLIENT_ID),
                ("code", &code),
                ("redirect_uri", REDIRECT),
                ("code_verifier", "not-the-verifier-that-was-hashed-into-the-challenge"),
            ],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn unknown_client_gets_a_direct_error() {
    let app = spawn_app();

    let uri = authorize_uri("openid").replace("client_id=portal", "client_id=stranger");
    let response = app.send(get(&uri, None)).await;

    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn disallowed_scope_redirects_back_with_error() {
    let app = spawn_app();

    let uri = authorize_uri("openid admin");
    let response = app.send(get(&uri, None)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with(REDIRECT));
    let params = query(&target);
    assert_eq!(params["error"], "invalid_scope");
    assert_eq!(params["state"], STATE);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = spawn_app();
    app.register("dave@example.com", "dave").await;
    let request_id = app.authorize("openid").await;

    let response = app
        .password_login(&request_id, "dave@example.com", "wrong-password-1")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_against_unknown_request_is_invalid_request() {
    let app = spawn_app();
    app.register("erin@example.com", "erin").await;

    let response = app
        .password_login("no-such-request", "erin@example.com", PASSWORD)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn userinfo_requires_a_bearer_token() {
    let app = spawn_app();

    let response = app.send(get("/connect/userinfo", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        response.headers()[header::WWW_AUTHENTICATE]
            .to_str()
            .unwrap()
            .starts_with("Bearer")
    );

    let garbage = app
        .send(get("/connect/userinfo", Some("not.a.jwt")))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn userinfo_releases_claims_by_scope() {
    let app = spawn_app();
    let profile = app.register("frank@example.com", "frank").await;

    let tokens = app.sign_in("frank@example.com", "openid email").await;
    let token = tokens["access_token"].as_str().unwrap();

    let response = app.send(get("/connect/userinfo", Some(token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let info = json(response).await;
    assert_eq!(info["sub"], profile["user_id"]);
    assert_eq!(info["email"], "frank@example.com");
    assert!(info.get("preferred_username").is_none_or(|v| v.is_null()));
}

#[tokio::test]
async fn refresh_rotation_and_revocation() {
    let app = spawn_app();
    app.register("gina@example.com", "gina").await;
    let tokens = app
        .sign_in("gina@example.com", "openid offline_access")
        .await;
    let first = tokens["refresh_token"].as_str().unwrap().to_string();

    let refresh = |token: String| {
        post_form(
            "/connect/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", CLIENT_ID),
                ("refresh_token", &token),
            ],
        )
    };

    let rotated = app.send(refresh(first.clone())).await;
    assert_eq!(rotated.status(), StatusCode::OK);
    let second = json(rotated).await["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first, second);

    let revoke = app
        .send(post_form(
            "/connect/revoke",
            &[("token", &second), ("client_id", CLIENT_ID)],
        ))
        .await;
    assert_eq!(revoke.status(), StatusCode::OK);

    let after_revoke = app.send(refresh(second)).await;
    assert_eq!(after_revoke.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(after_revoke).await["error"], "invalid_grant");
}

#[tokio::test]
async fn malformed_token_request_is_invalid_request() {
    let app = spawn_app();

    let response = app
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/connect/token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from("{}"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "invalid_request");
}
