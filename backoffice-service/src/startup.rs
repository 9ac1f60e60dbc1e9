//! Application startup and lifecycle management.

use crate::config::{BackofficeConfig, StoreBackend};
use crate::handlers;
use crate::models::fields::{ENABLED, INVOICE, IS_DEFAULT};
use crate::services::{
    DefaultManager, FinancialService, InvoiceLocks, PaymentLedger, QueryConfig, QueryEngine,
};
use crate::store::{Collection, DocumentStore, MemoryStore, MongoStore, CREATED, REMOVED};
use axum::middleware::from_fn;
use axum::{body::Body, routing::get, Router};
use mongodb::bson::doc;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const CLIENT_SEARCH: QueryConfig = QueryConfig::searching(&["name", "email", "phone", "country"]);
const INVOICE_SEARCH: QueryConfig = QueryConfig::searching(&["status", "paymentStatus", "notes"]);
const QUOTE_SEARCH: QueryConfig = QueryConfig::searching(&["status", "notes"]);
const PAYMENT_SEARCH: QueryConfig = QueryConfig::searching(&["ref", "description"]);
const TAX_SEARCH: QueryConfig = QueryConfig::searching(&["taxName"]);
const PAYMENT_MODE_SEARCH: QueryConfig = QueryConfig::searching(&["name", "description"]);

/// Handles to every collection the service owns.
#[derive(Clone)]
pub struct Collections {
    pub clients: Collection,
    pub invoices: Collection,
    pub quotes: Collection,
    pub payments: Collection,
    pub taxes: Collection,
    pub payment_modes: Collection,
}

impl Collections {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            clients: Collection::new(store.clone(), "clients"),
            invoices: Collection::new(store.clone(), "invoices"),
            quotes: Collection::new(store.clone(), "quotes"),
            payments: Collection::new(store.clone(), "payments"),
            taxes: Collection::new(store.clone(), "taxes"),
            payment_modes: Collection::new(store, "paymentmodes"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        let base = [doc! { REMOVED: 1 }, doc! { CREATED: -1 }];

        for collection in [&self.clients, &self.invoices, &self.quotes] {
            collection.ensure_indexes(&base).await?;
        }

        let mut payments = base.to_vec();
        payments.push(doc! { INVOICE: 1, REMOVED: 1 });
        self.payments.ensure_indexes(&payments).await?;

        let mut reference = base.to_vec();
        reference.push(doc! { ENABLED: 1, IS_DEFAULT: 1 });
        for collection in [&self.taxes, &self.payment_modes] {
            collection.ensure_indexes(&reference).await?;
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub collections: Collections,
    pub ledger: PaymentLedger,
    pub financial: FinancialService,
    pub taxes: DefaultManager,
    pub payment_modes: DefaultManager,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let collections = Collections::new(store.clone());
        // Payments and invoice edits share one lock table.
        let locks = InvoiceLocks::new();

        Self {
            ledger: PaymentLedger::new(
                collections.invoices.clone(),
                collections.payments.clone(),
                locks.clone(),
            ),
            financial: FinancialService::new(
                collections.clients.clone(),
                collections.invoices.clone(),
                collections.quotes.clone(),
                locks,
            ),
            taxes: DefaultManager::new(collections.taxes.clone()),
            payment_modes: DefaultManager::new(collections.payment_modes.clone()),
            collections,
            store,
        }
    }
}

fn api_router(state: &AppState) -> Router<AppState> {
    let c = &state.collections;

    let client = handlers::clients::routes()
        .merge(handlers::query::routes(QueryEngine::new(c.clients.clone(), CLIENT_SEARCH)));
    let invoice = handlers::invoices::routes()
        .merge(handlers::query::routes(QueryEngine::new(c.invoices.clone(), INVOICE_SEARCH)));
    let quote = handlers::quotes::routes()
        .merge(handlers::query::routes(QueryEngine::new(c.quotes.clone(), QUOTE_SEARCH)));
    let payment = handlers::payments::routes()
        .merge(handlers::query::routes(QueryEngine::new(c.payments.clone(), PAYMENT_SEARCH)));
    let taxes = handlers::references::tax_routes(state.taxes.clone())
        .merge(handlers::query::routes(QueryEngine::new(c.taxes.clone(), TAX_SEARCH)));
    let payment_mode = handlers::references::payment_mode_routes(state.payment_modes.clone())
        .merge(handlers::query::routes(QueryEngine::new(
            c.payment_modes.clone(),
            PAYMENT_MODE_SEARCH,
        )));

    Router::new()
        .nest("/client", client)
        .nest("/invoice", invoice)
        .nest("/quote", quote)
        .nest("/payment", payment)
        .nest("/taxes", taxes)
        .nest("/paymentMode", payment_mode)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect the configured store and build the application on top of it.
    pub async fn build(config: BackofficeConfig) -> Result<Self, AppError> {
        let store: Arc<dyn DocumentStore> = match config.store.backend {
            StoreBackend::Mongodb => Arc::new(
                MongoStore::connect(config.mongodb.uri.expose_secret(), &config.mongodb.database)
                    .await?,
            ),
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    pub async fn build_with_store(
        config: BackofficeConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, AppError> {
        let state = AppState::new(store);

        state.collections.ensure_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            .nest("/api", api_router(&state))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
            .with_state(state);

        // Port 0 binds a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Backoffice service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                e
            })
    }
}
