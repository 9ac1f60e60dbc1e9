#![allow(dead_code)]

use backoffice_service::config::BackofficeConfig;
use backoffice_service::startup::Application;
use backoffice_service::store::{DocumentStore, MemoryStore, MongoStore};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct TestApp {
    pub http_address: String,
    pub port: u16,
    pub client: reqwest::Client,
    /// Set when the suite runs against a real MongoDB (`TEST_MONGODB_URI`).
    mongo: Option<MongoStore>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = BackofficeConfig::in_memory();

        let (store, mongo): (Arc<dyn DocumentStore>, Option<MongoStore>) =
            match std::env::var("TEST_MONGODB_URI") {
                Ok(uri) => {
                    let db_name = format!("backoffice_test_{}", uuid::Uuid::new_v4().simple());
                    let mongo = MongoStore::connect(&uri, &db_name)
                        .await
                        .expect("Failed to connect to test MongoDB");
                    (Arc::new(mongo.clone()), Some(mongo))
                }
                Err(_) => (Arc::new(MemoryStore::new()), None),
            };

        let app = Application::build_with_store(config, store)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let http_address = format!("http://127.0.0.1:{}", port);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            app.run_until_stopped(async {
                rx.await.ok();
            })
            .await
            .ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            port,
            client,
            mongo,
            shutdown: Some(tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a client and return its id.
    pub async fn create_client(&self, name: &str) -> String {
        let response = self
            .post(
                "/api/client/create",
                &json!({ "name": name, "email": "billing@example.com" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(response).await
    }

    /// Create an invoice with a single line of `amount` and no tax; return its id.
    pub async fn create_invoice(&self, client_id: &str, amount: f64) -> String {
        let response = self
            .post("/api/invoice/create", &invoice_body(client_id, amount, 0.0))
            .await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(response).await
    }

    pub async fn read(&self, entity: &str, id: &str) -> Value {
        let response = self.get(&format!("/api/{}/read/{}", entity, id)).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"].clone()
    }

    /// Stop the server and drop the test database, if any.
    pub async fn cleanup(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        if let Some(mongo) = &self.mongo {
            mongo
                .drop_database()
                .await
                .expect("Failed to drop test database");
        }
    }
}

pub fn invoice_body(client_id: &str, amount: f64, tax_rate: f64) -> Value {
    json!({
        "client": client_id,
        "number": 1,
        "year": 2024,
        "date": "2024-01-01",
        "expiredDate": "2024-01-31",
        "items": [
            { "itemName": "Consulting", "quantity": 1, "price": amount, "total": amount }
        ],
        "taxRate": tax_rate,
    })
}

pub async fn id_of(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse JSON");
    body["data"]["_id"]
        .as_str()
        .expect("response carries an _id")
        .to_string()
}
