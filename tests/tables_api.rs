mod common;

use axum::http::StatusCode;
use serde_json::json;

use choperia_server::store::users::Role;
use common::TestApp;

async fn table(app: &TestApp, token: &str, name: &str) -> i64 {
    let created = app.post("/tables", Some(token), json!({ "name": name })).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    created.body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn tables_get_slugs_and_are_staff_only() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let (_, customer) = app.user("cliente", Role::Online).await;

    let created = app.post("/tables", Some(&waiter), json!({ "name": "7" })).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["slug"], "Mesa-07");
    assert_eq!(created.body["status"], "Livre");

    let by_slug = app.get("/tables/slug/Mesa-07", Some(&waiter)).await;
    assert_eq!(by_slug.status, StatusCode::OK);
    assert_eq!(by_slug.body["order_id"], 0);

    assert_eq!(app.get("/tables", Some(&customer)).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/tables/slug/Mesa-99", Some(&waiter)).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn adding_items_opens_an_order_and_reserves_stock() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Pilsen", 1290, 5).await;
    let mesa = table(&app, &waiter, "1").await;

    let first = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 2 }))
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(first.body["status"], "Ocupada");
    assert_eq!(first.body["order_status"], "Pendente");
    assert_eq!(first.body["total_cents"], 2580);
    let order_id = first.body["order_id"].as_i64().unwrap();
    assert!(order_id > 0);

    let second = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 3 }))
        .await;
    assert_eq!(second.body["order_id"], order_id);
    assert_eq!(second.body["items"].as_array().unwrap().len(), 2);

    // Stock is only reserved, not taken
    assert_eq!(app.stock_of(chopp).await, 5);
    let reservations = app
        .get(&format!("/stock/reservations?product_id={}", chopp), Some(&waiter))
        .await;
    let reservations = reservations.body.as_array().unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0]["quantity"], 5);
    assert_eq!(reservations[0]["holder"], "mesa");

    let too_many = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    assert_eq!(too_many.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn another_table_cannot_take_reserved_units() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp IPA", 1590, 4).await;
    let mesa1 = table(&app, &waiter, "1").await;
    let mesa2 = table(&app, &waiter, "2").await;

    let ok = app
        .post(&format!("/tables/{}/items", mesa1), Some(&waiter), json!({ "product_id": chopp, "quantity": 3 }))
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let blocked = app
        .post(&format!("/tables/{}/items", mesa2), Some(&waiter), json!({ "product_id": chopp, "quantity": 2 }))
        .await;
    assert_eq!(blocked.status, StatusCode::CONFLICT);

    let fits = app
        .post(&format!("/tables/{}/items", mesa2), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    assert_eq!(fits.status, StatusCode::OK);
}

#[tokio::test]
async fn removing_an_item_shrinks_the_reservation() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Weiss", 1490, 10).await;
    let mesa = table(&app, &waiter, "3").await;

    app.post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 2 }))
        .await;
    let view = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 4 }))
        .await;
    let item_id = view.body["items"][1]["id"].as_i64().unwrap();

    let removed = app
        .delete(&format!("/tables/{}/items/{}", mesa, item_id), Some(&waiter))
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["total_cents"], 2980);

    let reservations = app
        .get(&format!("/stock/reservations?product_id={}", chopp), Some(&waiter))
        .await;
    assert_eq!(reservations.body[0]["quantity"], 2);

    let missing = app
        .delete(&format!("/tables/{}/items/{}", mesa, item_id), Some(&waiter))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paying_takes_stock_and_frees_the_table() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Stout", 1000, 10).await;
    let mesa = table(&app, &waiter, "4").await;

    let view = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 3 }))
        .await;
    let order_id = view.body["order_id"].as_i64().unwrap();

    let short = app
        .post(
            &format!("/tables/{}/payment", mesa),
            Some(&waiter),
            json!({ "method": "dinheiro", "received_cents": 2000 }),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(chopp).await, 10);

    let paid = app
        .post(
            &format!("/tables/{}/payment", mesa),
            Some(&waiter),
            json!({ "method": "dinheiro", "discount_cents": 500, "received_cents": 3000 }),
        )
        .await;
    assert_eq!(paid.status, StatusCode::OK, "{}", paid.body);
    assert_eq!(paid.body["ok"], true);
    assert_eq!(paid.body["payment"]["amount_cents"], 2500);
    assert_eq!(paid.body["payment"]["change_cents"], 500);
    assert_eq!(paid.body["table"]["status"], "Livre");
    assert_eq!(paid.body["table"]["order_id"], 0);

    assert_eq!(app.stock_of(chopp).await, 7);

    let order = app.get(&format!("/orders/{}", order_id), Some(&waiter)).await;
    assert_eq!(order.body["status"], "Entregue");
    assert_eq!(order.body["total_cents"], 2500);

    let movements = app
        .get(&format!("/stock/movements?order_id={}", order_id), Some(&waiter))
        .await;
    let movements = movements.body.as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["origin"], "venda_fisica");
    assert_eq!(movements[0]["previous_quantity"], 10);
    assert_eq!(movements[0]["new_quantity"], 7);

    let reservations = app
        .get(&format!("/stock/reservations?product_id={}", chopp), Some(&waiter))
        .await;
    assert!(reservations.body.as_array().unwrap().is_empty());

    let payment = app.get(&format!("/orders/{}/payment", order_id), Some(&waiter)).await;
    assert_eq!(payment.body["status"], "Confirmado");

    // Nothing open any more
    let again = app
        .post(&format!("/tables/{}/payment", mesa), Some(&waiter), json!({ "method": "pix" }))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancelling_a_table_releases_reservations_without_touching_stock() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let porcao = app.product(&waiter, "Batata Frita", 2590, 6).await;
    let mesa = table(&app, &waiter, "5").await;

    let view = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": porcao, "quantity": 6 }))
        .await;
    let order_id = view.body["order_id"].as_i64().unwrap();

    let cancelled = app.post(&format!("/tables/{}/cancel", mesa), Some(&waiter), json!({})).await;
    assert_eq!(cancelled.status, StatusCode::OK, "{}", cancelled.body);
    assert_eq!(cancelled.body["status"], "Livre");
    assert_eq!(cancelled.body["order_id"], 0);

    assert_eq!(app.stock_of(porcao).await, 6);
    let order = app.get(&format!("/orders/{}", order_id), Some(&waiter)).await;
    assert_eq!(order.body["status"], "Cancelado");

    // The units are free for the next table
    let other = table(&app, &waiter, "6").await;
    let ok = app
        .post(&format!("/tables/{}/items", other), Some(&waiter), json!({ "product_id": porcao, "quantity": 6 }))
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let nothing_open = app.post(&format!("/tables/{}/cancel", mesa), Some(&waiter), json!({})).await;
    assert_eq!(nothing_open.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_changes_follow_between_table_and_order() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Red Ale", 1590, 10).await;
    let mesa = table(&app, &waiter, "8").await;

    let view = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    let order_id = view.body["order_id"].as_i64().unwrap();

    let preparing = app
        .patch(&format!("/tables/{}/status", mesa), Some(&waiter), json!({ "status": "Preparando" }))
        .await;
    assert_eq!(preparing.body["order_status"], "Em Preparo");

    let ready = app
        .patch(&format!("/orders/{}/status", order_id), Some(&waiter), json!({ "status": "Pronto" }))
        .await;
    assert_eq!(ready.status, StatusCode::OK);
    let table_view = app.get(&format!("/tables/{}", mesa), Some(&waiter)).await;
    assert_eq!(table_view.body["status"], "Pronto");

    let backwards = app
        .patch(&format!("/orders/{}/status", order_id), Some(&waiter), json!({ "status": "Pendente" }))
        .await;
    assert_eq!(backwards.status, StatusCode::CONFLICT);

    let free_with_open_order = app
        .patch(&format!("/tables/{}/status", mesa), Some(&waiter), json!({ "status": "Livre" }))
        .await;
    assert_eq!(free_with_open_order.status, StatusCode::CONFLICT);

    let busy_delete = app.delete(&format!("/tables/{}", mesa), Some(&waiter)).await;
    assert_eq!(busy_delete.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn oversized_table_quantities_are_rejected() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Pilsen", 1290, 5).await;
    let mesa = table(&app, &waiter, "2").await;
    let items_uri = format!("/tables/{}/items", mesa);

    app.post(&items_uri, Some(&waiter), json!({ "product_id": chopp, "quantity": 2 }))
        .await;
    let huge = app
        .post(&items_uri, Some(&waiter), json!({ "product_id": chopp, "quantity": i64::MAX }))
        .await;
    assert_eq!(huge.status, StatusCode::BAD_REQUEST, "{}", huge.body);

    let view = app.get(&format!("/tables/{}", mesa), Some(&waiter)).await;
    assert_eq!(view.body["items"].as_array().unwrap().len(), 1);
    assert_eq!(view.body["total_cents"], 2580);
}

#[tokio::test]
async fn only_orders_in_service_are_open() {
    let app = TestApp::new().await;
    let waiter = app.waiter().await;
    let chopp = app.product(&waiter, "Chopp Pilsen", 1290, 5).await;
    let mesa = table(&app, &waiter, "5").await;

    let opened = app
        .post(&format!("/tables/{}/items", mesa), Some(&waiter), json!({ "product_id": chopp, "quantity": 1 }))
        .await;
    let order_id = opened.body["order_id"].as_i64().unwrap();

    sqlx::query("UPDATE orders SET status = 'Pago' WHERE id = ?")
        .bind(order_id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let view = app.get(&format!("/tables/{}", mesa), Some(&waiter)).await;
    assert_eq!(view.body["order_id"], 0);
    assert!(view.body["order_status"].is_null());
}
