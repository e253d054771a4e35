mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use choperia_server::config::Config;
use choperia_server::store::payments::ProviderOutcome;
use choperia_server::store::users::Role;
use common::TestApp;

/// Online order for `token` holding `quantity` units of `product`
async fn online_order(app: &TestApp, token: &str, product: i64, quantity: i64) -> i64 {
    app.post("/cart/items", Some(token), json!({ "product_id": product, "quantity": quantity }))
        .await;
    let checkout = app
        .post("/cart/checkout", Some(token), json!({ "payment_method": "mercadopago" }))
        .await;
    assert_eq!(checkout.status, StatusCode::CREATED, "{}", checkout.body);
    checkout.body["order"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn staff_orders_are_numbered_and_priced_from_the_catalog() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let (_, customer) = app.user("cliente", Role::Online).await;
    let chopp = app.product(&waiter, "Chopp Pilsen", 1290, 10).await;

    let body = json!({
        "kind": "fisica",
        "customer_name": "Balcão",
        "items": [
            { "product_id": chopp, "quantity": 2 },
            { "product_id": chopp, "quantity": 1, "unit_price_cents": 0 }
        ]
    });
    assert_eq!(
        app.post("/orders", Some(&customer), body.clone()).await.status,
        StatusCode::FORBIDDEN
    );

    let first = app.post("/orders", Some(&waiter), body.clone()).await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
    assert_eq!(first.body["number"], "01");
    assert_eq!(first.body["status"], "Pendente");
    assert_eq!(first.body["subtotal_cents"], 2580);
    assert_eq!(first.body["items"].as_array().unwrap().len(), 2);

    let second = app.post("/orders", Some(&waiter), body).await;
    assert_eq!(second.body["number"], "02");

    // Stock is untouched by a plain order
    assert_eq!(app.stock_of(chopp).await, 10);

    let empty = app
        .post("/orders", Some(&waiter), json!({ "kind": "fisica", "items": [] }))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let listed = app.get("/orders?kind=fisica", Some(&waiter)).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 2);
    assert_eq!(listed.body[0]["number"], "02");
    assert_eq!(app.get("/orders", Some(&customer)).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_moves_forward_only() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp IPA", 1590, 10).await;
    let created = app
        .post("/orders", Some(&waiter), json!({ "kind": "fisica", "items": [{ "product_id": chopp, "quantity": 1 }] }))
        .await;
    let id = created.body["id"].as_i64().unwrap();
    let status_uri = format!("/orders/{}/status", id);

    for status in ["Em Preparo", "Pronto", "Entregue"] {
        let moved = app.patch(&status_uri, Some(&waiter), json!({ "status": status })).await;
        assert_eq!(moved.status, StatusCode::OK, "{}", moved.body);
        assert_eq!(moved.body["status"], status);
    }

    let backwards = app.patch(&status_uri, Some(&waiter), json!({ "status": "Pronto" })).await;
    assert_eq!(backwards.status, StatusCode::CONFLICT);

    let unknown = app.patch(&status_uri, Some(&waiter), json!({ "status": "Voando" })).await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);

    let cancel = app.post(&format!("/orders/{}/cancel", id), Some(&waiter), json!({})).await;
    assert_eq!(cancel.status, StatusCode::CONFLICT);

    let missing = app.patch("/orders/999/status", Some(&waiter), json!({ "status": "Pronto" })).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let chopp = app.product(&admin, "Chopp Weiss", 1490, 10).await;
    let (_, ana) = app.user("ana", Role::Online).await;
    let (_, bia) = app.user("bia", Role::Online).await;

    let order_id = online_order(&app, &ana, chopp, 1).await;

    assert_eq!(app.get(&format!("/orders/{}", order_id), Some(&ana)).await.status, StatusCode::OK);
    assert_eq!(
        app.get(&format!("/orders/{}", order_id), Some(&bia)).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get(&format!("/orders/{}", order_id), Some(&admin)).await.status,
        StatusCode::OK
    );
    assert!(app.get("/orders/mine", Some(&bia)).await.body.as_array().unwrap().is_empty());

    // No payment recorded yet
    let payment = app.get(&format!("/orders/{}/payment", order_id), Some(&ana)).await;
    assert_eq!(payment.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_payments_confirm_or_cancel_the_order() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let chopp = app.product(&admin, "Chopp Stout", 2000, 10).await;
    let (_, customer) = app.user("cliente", Role::Online).await;

    let paid = online_order(&app, &customer, chopp, 2).await;
    let outcome = app
        .state
        .payments
        .confirm_provider_payment(paid, "991", Some(4000))
        .await
        .unwrap();
    assert_eq!(outcome, ProviderOutcome::Confirmed);
    let again = app
        .state
        .payments
        .confirm_provider_payment(paid, "991", Some(4000))
        .await
        .unwrap();
    assert_eq!(again, ProviderOutcome::AlreadyConfirmed);

    let order = app.get(&format!("/orders/{}", paid), Some(&customer)).await;
    assert_eq!(order.body["status"], "Pago");
    let payment = app.get(&format!("/orders/{}/payment", paid), Some(&customer)).await;
    assert_eq!(payment.body["status"], "Confirmado");
    assert_eq!(payment.body["amount_cents"], 4000);
    assert_eq!(payment.body["provider_reference"], "991");

    // A late rejection does not undo a confirmed payment
    let late = app
        .state
        .payments
        .reject_provider_payment(paid, "991")
        .await
        .unwrap();
    assert_eq!(late, ProviderOutcome::Ignored);
    assert_eq!(app.stock_of(chopp).await, 8);

    let rejected = online_order(&app, &customer, chopp, 3).await;
    assert_eq!(app.stock_of(chopp).await, 5);
    let outcome = app
        .state
        .payments
        .reject_provider_payment(rejected, "992")
        .await
        .unwrap();
    assert_eq!(outcome, ProviderOutcome::Rejected);
    let order = app.get(&format!("/orders/{}", rejected), Some(&customer)).await;
    assert_eq!(order.body["status"], "Cancelado");
    assert_eq!(app.stock_of(chopp).await, 8);

    // Paid orders are no longer the customer's to cancel
    let cancel = app.post(&format!("/orders/{}/cancel", paid), Some(&customer), json!({})).await;
    assert_eq!(cancel.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn preference_needs_a_configured_provider() {
    let app = TestApp::new().await;
    let (_, customer) = app.user("cliente", Role::Online).await;

    let response = app
        .post("/payments/mercadopago/preference", Some(&customer), json!({ "order_id": 1 }))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn webhook_signature_is_required_when_a_secret_is_set() {
    let mut config = Config::for_tests();
    config.mercado_pago_webhook_secret = Some("whsec".to_string());
    let app = TestApp::with_config(config).await;

    let unsigned = app
        .post(
            "/webhooks/mercadopago?type=payment&data.id=991",
            None,
            json!({ "type": "payment", "data": { "id": "991" } }),
        )
        .await;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);

    let forged = app
        .send(
            Method::POST,
            "/webhooks/mercadopago?type=payment&data.id=991",
            None,
            &[("x-signature", "ts=1700000000,v1=00ff"), ("x-request-id", "req-1")],
            Some(json!({ "type": "payment", "data": { "id": "991" } })),
        )
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    // The signature is checked before the body is looked at
    let malformed = app
        .send(
            Method::POST,
            "/webhooks/mercadopago?type=payment&data.id=991",
            None,
            &[],
            Some(json!("not an object")),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_without_provider_client() {
    let app = TestApp::new().await;

    let other_topic = app
        .post("/webhooks/mercadopago", None, json!({ "type": "merchant_order", "data": { "id": 7 } }))
        .await;
    assert_eq!(other_topic.status, StatusCode::OK);
    assert_eq!(other_topic.body["status"], "ok");

    let payment = app
        .post("/webhooks/mercadopago", None, json!({ "type": "payment", "data": { "id": 991 } }))
        .await;
    assert_eq!(payment.status, StatusCode::SERVICE_UNAVAILABLE);

    let garbage = app
        .send(Method::POST, "/webhooks/mercadopago", None, &[], Some(json!("not an object")))
        .await;
    assert_eq!(garbage.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn table_orders_are_only_delivered_through_table_payment() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Pilsen", 1290, 8).await;
    let mesa = app.post("/tables", Some(&waiter), json!({ "name": "3" })).await.body["id"]
        .as_i64()
        .unwrap();
    let opened = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 3 }))
        .await;
    let order_id = opened.body["order_id"].as_i64().unwrap();
    let status_uri = format!("/orders/{}/status", order_id);

    for status in ["Entregue", "Pago"] {
        let skipped = app.patch(&status_uri, Some(&waiter), json!({ "status": status })).await;
        assert_eq!(skipped.status, StatusCode::CONFLICT, "{}", skipped.body);
    }
    let preparing = app.patch(&status_uri, Some(&waiter), json!({ "status": "Em Preparo" })).await;
    assert_eq!(preparing.status, StatusCode::OK, "{}", preparing.body);
    assert_eq!(app.stock_of(chopp).await, 8);

    let paid = app
        .post(&format!("/tables/{}/payment", mesa), Some(&waiter), json!({ "method": "pix" }))
        .await;
    assert_eq!(paid.status, StatusCode::OK, "{}", paid.body);
    assert_eq!(app.stock_of(chopp).await, 5);

    let movements = app
        .get(&format!("/stock/movements?order_id={}", order_id), Some(&waiter))
        .await;
    assert_eq!(movements.body.as_array().unwrap().len(), 1);
    assert_eq!(movements.body[0]["origin"], "venda_fisica");
}

#[tokio::test]
async fn staff_can_add_lines_to_an_open_order() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let (_, customer) = app.user("cliente", Role::Online).await;
    let chopp = app.product(&waiter, "Chopp Pilsen", 1290, 10).await;
    let porcao = app.product(&waiter, "Porção de Fritas", 2500, 10).await;

    let created = app
        .post("/orders", Some(&waiter), json!({ "kind": "fisica", "items": [{ "product_id": chopp, "quantity": 1 }] }))
        .await;
    let id = created.body["id"].as_i64().unwrap();
    let items_uri = format!("/orders/{}/items", id);

    let added = app
        .post(&items_uri, Some(&waiter), json!({ "product_id": porcao, "quantity": 2 }))
        .await;
    assert_eq!(added.status, StatusCode::CREATED, "{}", added.body);
    assert_eq!(added.body["items"].as_array().unwrap().len(), 2);
    assert_eq!(added.body["items"][1]["name"], "Porção de Fritas");
    assert_eq!(added.body["subtotal_cents"], 6290);
    assert_eq!(added.body["total_cents"], 6290);
    assert_eq!(app.stock_of(porcao).await, 10);

    assert_eq!(
        app.post(&items_uri, Some(&customer), json!({ "product_id": chopp, "quantity": 1 }))
            .await
            .status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.post(&items_uri, Some(&waiter), json!({ "product_id": 999, "quantity": 1 }))
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.post(&items_uri, Some(&waiter), json!({ "product_id": chopp, "quantity": 0 }))
            .await
            .status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.post(&items_uri, Some(&waiter), json!({ "product_id": chopp, "quantity": i64::MAX }))
            .await
            .status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.post("/orders/999/items", Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
            .await
            .status,
        StatusCode::NOT_FOUND
    );

    app.patch(&format!("/orders/{}/status", id), Some(&waiter), json!({ "status": "Entregue" }))
        .await;
    let closed = app
        .post(&items_uri, Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    assert_eq!(closed.status, StatusCode::CONFLICT);

    let online = online_order(&app, &customer, chopp, 1).await;
    let online_add = app
        .post(&format!("/orders/{}/items", online), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    assert_eq!(online_add.status, StatusCode::CONFLICT);

    let mesa = app.post("/tables", Some(&waiter), json!({ "name": "4" })).await.body["id"]
        .as_i64()
        .unwrap();
    let table_order = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await
        .body["order_id"]
        .as_i64()
        .unwrap();
    let table_add = app
        .post(&format!("/orders/{}/items", table_order), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    assert_eq!(table_add.status, StatusCode::CONFLICT);
}
