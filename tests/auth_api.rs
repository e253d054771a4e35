mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use choperia_server::config::Config;
use choperia_server::store::users::Role;
use common::TestApp;

fn session_cookie(response: &common::Response) -> String {
    let set_cookie = response
        .headers
        .get(header::SET_COOKIE)
        .expect("set-cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn register_sets_cookie_and_me_reads_it() {
    let app = TestApp::new().await;

    let registered = app
        .post(
            "/auth/register",
            None,
            json!({ "name": "Ana", "email": "Ana@Example.com", "password": "segredo1" }),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);
    assert_eq!(registered.body["user"]["username"], "ana");
    assert_eq!(registered.body["user"]["role"], "online");
    assert!(registered.body["user"].get("password_hash").is_none());

    let cookie = session_cookie(&registered);
    let me = app
        .send(Method::GET, "/auth/me", None, &[("cookie", cookie.as_str())], None)
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "ana@example.com");

    let duplicate = app
        .post(
            "/auth/register",
            None,
            json!({ "name": "Ana 2", "email": "ana@example.com", "password": "segredo1" }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn anonymous_registration_cannot_pick_a_staff_role() {
    let app = TestApp::new().await;

    let registered = app
        .post(
            "/auth/register",
            None,
            json!({ "name": "Eve", "email": "eve@example.com", "password": "segredo1", "role": "admin" }),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body["user"]["role"], "online");

    let admin = app.admin().await;
    let waiter = app
        .post(
            "/auth/register",
            Some(&admin),
            json!({ "name": "Zé", "email": "ze@example.com", "password": "segredo1", "role": "fisica" }),
        )
        .await;
    assert_eq!(waiter.body["user"]["role"], "fisica");
}

#[tokio::test]
async fn login_checks_credentials_and_returns_token() {
    let app = TestApp::new().await;
    app.post(
        "/auth/register",
        None,
        json!({ "name": "Bia", "email": "bia@example.com", "password": "segredo1" }),
    )
    .await;

    let wrong = app
        .post("/auth/login", None, json!({ "email": "bia@example.com", "password": "nope" }))
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let ok = app
        .post("/auth/login", None, json!({ "email": "bia@example.com", "password": "segredo1" }))
        .await;
    assert_eq!(ok.status, StatusCode::OK, "{}", ok.body);
    assert!(ok.body["user"]["last_login"].is_string());

    let token = ok.body["token"].as_str().unwrap();
    let me = app.get("/auth/me", Some(token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["name"], "Bia");
}

#[tokio::test]
async fn login_is_rate_limited_per_email() {
    let mut config = Config::for_tests();
    config.login_attempts_per_minute = 2;
    let app = TestApp::with_config(config).await;

    let attempt = json!({ "email": "ghost@example.com", "password": "x" });
    assert_eq!(app.post("/auth/login", None, attempt.clone()).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.post("/auth/login", None, attempt.clone()).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.post("/auth/login", None, attempt).await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn status_reports_anonymous_and_protected_routes_reject() {
    let app = TestApp::new().await;

    let status = app.get("/auth", None).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["authenticated"], false);
    assert_eq!(status.body["endpoints"]["login"], "/auth/login");

    assert_eq!(app.get("/auth/me", None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.get("/auth/me", Some("garbage")).await.status, StatusCode::UNAUTHORIZED);

    let (_, token) = app.user("cliente", Role::Online).await;
    let status = app.get("/auth", Some(&token)).await;
    assert_eq!(status.body["authenticated"], true);
    assert_eq!(status.body["user"]["username"], "cliente");
}

#[tokio::test]
async fn tokens_of_deleted_users_stop_working() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (_, token) = app.user("temp", Role::Online).await;
    assert_eq!(app.get("/auth/me", Some(&token)).await.status, StatusCode::OK);

    let deleted = app.delete("/users/temp", Some(&admin)).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["deleted"], true);

    assert_eq!(app.get("/auth/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.delete("/users/temp", Some(&admin)).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_administration_is_admin_only() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let (_, customer) = app.user("cliente", Role::Online).await;

    assert_eq!(app.get("/users", Some(&customer)).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/users/cliente", Some(&customer)).await.status, StatusCode::OK);
    assert_eq!(app.get("/users/admin", Some(&customer)).await.status, StatusCode::FORBIDDEN);

    let created = app
        .post(
            "/users",
            Some(&admin),
            json!({ "email": "caixa@example.com", "name": "Caixa", "password": "segredo1", "role": "fisica" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["username"], "caixa");

    let listed = app.get("/users?limit=10", Some(&admin)).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn logout_clears_the_cookie() {
    let app = TestApp::new().await;
    let response = app.post("/auth/logout", None, json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    let set_cookie = response.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("access_token="));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = TestApp::new().await;
    let ping = app.get("/ping", None).await;
    assert_eq!(ping.body["status"], "ok");

    let health = app.get("/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["database"], "ok");
}
