mod common;

use common::{id_of, TestApp};
use serde_json::{json, Value};

async fn defaults(app: &TestApp, entity: &str) -> Vec<Value> {
    let response = app
        .get(&format!("/api/{}/filter?filter=isDefault&equal=true", entity))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    body["data"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn first_tax_becomes_the_default() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/taxes/create", &json!({ "taxName": "VAT", "taxValue": "20" }))
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["isDefault"], true);
    assert_eq!(body["data"]["taxValue"], json!(20.0));

    app.cleanup().await;
}

#[tokio::test]
async fn non_numeric_tax_value_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/taxes/create", &json!({ "taxName": "VAT", "taxValue": "twenty" }))
        .await;

    assert_eq!(response.status().as_u16(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn promoting_a_tax_demotes_the_previous_default() {
    let app = TestApp::spawn().await;
    let vat = id_of(
        app.post("/api/taxes/create", &json!({ "taxName": "VAT", "taxValue": 20 }))
            .await,
    )
    .await;
    let gst = id_of(
        app.post("/api/taxes/create", &json!({ "taxName": "GST", "taxValue": 5 }))
            .await,
    )
    .await;

    let response = app
        .patch(&format!("/api/taxes/update/{}", gst), &json!({ "isDefault": true }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let current = defaults(&app, "taxes").await;
    assert_eq!(current.len(), 1);
    assert_eq!(current[0]["_id"], json!(gst));
    assert_eq!(app.read("taxes", &vat).await["isDefault"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn the_only_enabled_payment_mode_cannot_be_disabled() {
    let app = TestApp::spawn().await;
    let cash = id_of(
        app.post("/api/paymentMode/create", &json!({ "name": "Cash" }))
            .await,
    )
    .await;

    let response = app
        .patch(
            &format!("/api/paymentMode/update/{}", cash),
            &json!({ "enabled": false }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "CONFLICT");
    assert_eq!(app.read("paymentMode", &cash).await["enabled"], true);

    app.cleanup().await;
}

#[tokio::test]
async fn disabling_the_default_promotes_another() {
    let app = TestApp::spawn().await;
    let cash = id_of(
        app.post("/api/paymentMode/create", &json!({ "name": "Cash" }))
            .await,
    )
    .await;
    let card = id_of(
        app.post("/api/paymentMode/create", &json!({ "name": "Card" }))
            .await,
    )
    .await;

    let response = app
        .patch(
            &format!("/api/paymentMode/update/{}", cash),
            &json!({ "enabled": false }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let current = defaults(&app, "paymentMode").await;
    assert_eq!(current.len(), 1);
    assert_eq!(current[0]["_id"], json!(card));

    app.cleanup().await;
}

#[tokio::test]
async fn deleting_the_last_default_is_a_conflict() {
    let app = TestApp::spawn().await;
    let vat = id_of(
        app.post("/api/taxes/create", &json!({ "taxName": "VAT", "taxValue": 20 }))
            .await,
    )
    .await;

    let response = app.delete(&format!("/api/taxes/delete/{}", vat)).await;

    assert_eq!(response.status().as_u16(), 409);

    app.cleanup().await;
}
