mod common;

use common::{id_of, invoice_body, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn create_invoice_computes_totals() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;

    let response = app
        .post("/api/invoice/create", &invoice_body(&client_id, 200.0, 10.0))
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    let invoice = &body["data"];
    assert_eq!(invoice["subTotal"], json!(200.0));
    assert_eq!(invoice["taxTotal"], json!(20.0));
    assert_eq!(invoice["total"], json!(220.0));
    assert_eq!(invoice["credit"], json!(0.0));
    assert_eq!(invoice["paymentStatus"], "unpaid");

    app.cleanup().await;
}

#[tokio::test]
async fn create_invoice_for_unknown_client_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/invoice/create", &invoice_body("missing-client", 100.0, 0.0))
        .await;

    assert_eq!(response.status().as_u16(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn non_numeric_tax_rate_is_rejected() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;

    let mut body = invoice_body(&client_id, 100.0, 0.0);
    body["taxRate"] = json!("abc");
    let response = app.post("/api/invoice/create", &body).await;

    assert_eq!(response.status().as_u16(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn update_reprices_and_keeps_credit() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    let invoice_id = app.create_invoice(&client_id, 100.0).await;

    let paid = app
        .post(
            "/api/payment/create",
            &json!({ "invoice": invoice_id, "amount": 100.0 }),
        )
        .await;
    assert_eq!(paid.status().as_u16(), 201);
    assert_eq!(app.read("invoice", &invoice_id).await["paymentStatus"], "paid");

    let response = app
        .patch(
            &format!("/api/invoice/update/{}", invoice_id),
            &json!({
                "items": [{ "itemName": "Consulting", "quantity": 2, "price": 100.0, "total": 200.0 }]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let invoice = app.read("invoice", &invoice_id).await;
    assert_eq!(invoice["total"], json!(200.0));
    assert_eq!(invoice["credit"], json!(100.0));
    assert_eq!(invoice["paymentStatus"], "partially");

    app.cleanup().await;
}

#[tokio::test]
async fn client_with_invoices_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    app.create_invoice(&client_id, 50.0).await;

    let response = app.delete(&format!("/api/client/delete/{}", client_id)).await;

    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "CONFLICT");

    app.cleanup().await;
}

#[tokio::test]
async fn deleting_an_invoice_removes_its_payments() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    let invoice_id = app.create_invoice(&client_id, 100.0).await;
    let payment = app
        .post(
            "/api/payment/create",
            &json!({ "invoice": invoice_id, "amount": 40.0 }),
        )
        .await;
    let payment_id = id_of(payment).await;

    let response = app.delete(&format!("/api/invoice/delete/{}", invoice_id)).await;
    assert_eq!(response.status().as_u16(), 200);

    let payment = app.get(&format!("/api/payment/read/{}", payment_id)).await;
    assert_eq!(payment.status().as_u16(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn breakdown_groups_by_payment_status() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;
    let paid = app.create_invoice(&client_id, 100.0).await;
    app.create_invoice(&client_id, 300.0).await;
    app.post("/api/payment/create", &json!({ "invoice": paid, "amount": 100.0 }))
        .await;

    let response = app.get("/api/invoice/breakdown").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["outstanding"], json!(300.0));

    app.cleanup().await;
}

#[tokio::test]
async fn quote_lifecycle() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme").await;

    let created = app
        .post("/api/quote/create", &invoice_body(&client_id, 80.0, 25.0))
        .await;
    assert_eq!(created.status().as_u16(), 201);
    let quote_id = id_of(created).await;

    let quote = app.read("quote", &quote_id).await;
    assert_eq!(quote["total"], json!(100.0));
    assert!(quote.get("credit").is_none());

    let accepted = app
        .patch(
            &format!("/api/quote/update/{}", quote_id),
            &json!({ "status": "accepted" }),
        )
        .await;
    assert_eq!(accepted.status().as_u16(), 200);
    assert_eq!(app.read("quote", &quote_id).await["status"], "accepted");

    let deleted = app.delete(&format!("/api/quote/delete/{}", quote_id)).await;
    assert_eq!(deleted.status().as_u16(), 200);

    app.cleanup().await;
}
