mod common;

use common::{id_of, TestApp};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn pays_an_invoice_until_the_limit() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    let invoice_id = app.create_invoice(&client_id, 1000.0).await;

    let first = app
        .post("/api/payment/create", &json!({ "invoice": invoice_id, "amount": 500.0 }))
        .await;
    assert_eq!(first.status().as_u16(), 201);
    let payment: Value = first.json().await.expect("Failed to parse JSON");
    assert_eq!(payment["data"]["client"], json!(client_id));
    assert_eq!(app.read("invoice", &invoice_id).await["paymentStatus"], "partially");

    let second = app
        .post("/api/payment/create", &json!({ "invoice": invoice_id, "amount": 500.0 }))
        .await;
    assert_eq!(second.status().as_u16(), 201);

    let invoice = app.read("invoice", &invoice_id).await;
    assert_eq!(invoice["credit"], json!(1000.0));
    assert_eq!(invoice["paymentStatus"], "paid");
    assert_eq!(invoice["payment"].as_array().map(Vec::len), Some(2));

    let third = app
        .post("/api/payment/create", &json!({ "invoice": invoice_id, "amount": 1.0 }))
        .await;
    assert_eq!(third.status().as_u16(), 422);
    let body: Value = third.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "OVER_LIMIT");
    assert_eq!(body["message"], "The max amount you can add is 0");

    app.cleanup().await;
}

#[tokio::test]
async fn payment_for_missing_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/payment/create", &json!({ "invoice": "nope", "amount": 10.0 }))
        .await;

    assert_eq!(response.status().as_u16(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn non_positive_amount_fails_validation() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    let invoice_id = app.create_invoice(&client_id, 100.0).await;

    let response = app
        .post("/api/payment/create", &json!({ "invoice": invoice_id, "amount": -5.0 }))
        .await;

    assert_eq!(response.status().as_u16(), 422);
    assert_eq!(app.read("invoice", &invoice_id).await["credit"], json!(0.0));

    app.cleanup().await;
}

#[tokio::test]
async fn update_and_delete_keep_credit_in_step() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    let invoice_id = app.create_invoice(&client_id, 300.0).await;
    let payment_id = id_of(
        app.post("/api/payment/create", &json!({ "invoice": invoice_id, "amount": 100.0 }))
            .await,
    )
    .await;

    let raised = app
        .patch(
            &format!("/api/payment/update/{}", payment_id),
            &json!({ "amount": 300.0, "ref": "wire-17" }),
        )
        .await;
    assert_eq!(raised.status().as_u16(), 200);
    let invoice = app.read("invoice", &invoice_id).await;
    assert_eq!(invoice["credit"], json!(300.0));
    assert_eq!(invoice["paymentStatus"], "paid");

    let too_much = app
        .patch(
            &format!("/api/payment/update/{}", payment_id),
            &json!({ "amount": 301.0 }),
        )
        .await;
    assert_eq!(too_much.status().as_u16(), 422);

    let deleted = app.delete(&format!("/api/payment/delete/{}", payment_id)).await;
    assert_eq!(deleted.status().as_u16(), 200);
    let invoice = app.read("invoice", &invoice_id).await;
    assert_eq!(invoice["credit"], json!(0.0));
    assert_eq!(invoice["paymentStatus"], "unpaid");

    app.cleanup().await;
}

#[tokio::test]
async fn concurrent_payments_never_overpay() {
    let app = Arc::new(TestApp::spawn().await);
    let client_id = app.create_client("Acme").await;
    let invoice_id = app.create_invoice(&client_id, 100.0).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let app = app.clone();
        let invoice_id = invoice_id.clone();
        handles.push(tokio::spawn(async move {
            app.post("/api/payment/create", &json!({ "invoice": invoice_id, "amount": 10.0 }))
                .await
                .status()
                .as_u16()
        }));
    }

    let mut created = 0;
    let mut over_limit = 0;
    for handle in handles {
        match handle.await.expect("payment task panicked") {
            201 => created += 1,
            422 => over_limit += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(created, 10);
    assert_eq!(over_limit, 10);
    let invoice = app.read("invoice", &invoice_id).await;
    assert_eq!(invoice["credit"], json!(100.0));
    assert_eq!(invoice["paymentStatus"], "paid");

    if let Ok(app) = Arc::try_unwrap(app) {
        app.cleanup().await;
    }
}
