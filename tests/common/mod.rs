//! Shared helpers for the API tests: an in-memory app and request shortcuts

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use choperia_server::app::AppState;
use choperia_server::config::Config;
use choperia_server::http::build_router;
use choperia_server::http::middleware::{sign_jwt, JwtClaims};
use choperia_server::store::users::{Role, User};
use choperia_server::store::Database;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::for_tests()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let db = Database::connect(&config.database_url, config.database_max_connections)
            .await
            .expect("in-memory database");
        db.migrate().await.expect("schema");
        let state = AppState::with_database(config, db);
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    /// Insert a user directly (no password hashing) and mint a session token
    pub async fn user(&self, username: &str, role: Role) -> (User, String) {
        let now = Utc::now();
        let user: User = sqlx::query_as(
            "INSERT INTO users (username, email, name, password_hash, role, is_active, created_at, updated_at)
             VALUES (?, ?, ?, 'not-a-hash', ?, 1, ?, ?) RETURNING *",
        )
        .bind(username)
        .bind(format!("{}@example.com", username))
        .bind(username)
        .bind(role)
        .bind(now)
        .bind(now)
        .fetch_one(self.state.db.pool())
        .await
        .expect("insert user");

        let claims = JwtClaims::for_user(&user, 60);
        let token = sign_jwt(&claims, &self.state.config.jwt_secret).expect("token");
        (user, token)
    }

    pub async fn admin(&self) -> String {
        self.user("admin", Role::Admin).await.1
    }

    pub async fn waiter(&self) -> String {
        self.user("garcom", Role::Fisica).await.1
    }

    /// Category plus a product with `stock` units; returns the product id
    pub async fn product(&self, token: &str, name: &str, price_cents: i64, stock: i64) -> i64 {
        let categories = self.get("/categories", None).await;
        let category_id = match categories.body.as_array().and_then(|c| c.first()) {
            Some(category) => category["id"].as_i64().expect("category id"),
            None => {
                let created = self
                    .post("/categories", Some(token), serde_json::json!({ "name": "BEBIDA" }))
                    .await;
                assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
                created.body["id"].as_i64().expect("category id")
            }
        };

        let code = format!("P-{}", name.to_uppercase().replace(' ', "-"));
        let created = self
            .post(
                "/products",
                Some(token),
                serde_json::json!({
                    "name": name,
                    "category_id": category_id,
                    "price_cents": price_cents,
                    "cost_cents": price_cents / 2,
                    "code": code,
                    "stock": stock,
                }),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
        created.body["id"].as_i64().expect("product id")
    }

    pub async fn stock_of(&self, product_id: i64) -> i64 {
        self.get(&format!("/products/{}", product_id), None).await.body["stock"]
            .as_i64()
            .expect("stock")
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::GET, uri, token, &[], None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.send(Method::POST, uri, token, &[], Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.send(Method::PATCH, uri, token, &[], Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.send(Method::PUT, uri, token, &[], Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::DELETE, uri, token, &[], None).await
    }
}
