use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static LEDGER_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static DEFAULT_CASCADES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    // Payment ledger writes by operation and outcome (ok, over_limit, not_found, failed)
    let ledger_counter = IntCounterVec::new(
        Opts::new(
            "backoffice_ledger_operations_total",
            "Payment ledger operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create backoffice_ledger_operations_total metric");

    // Side effects of the single-default rule (promoted, demoted, rejected)
    let cascade_counter = IntCounterVec::new(
        Opts::new(
            "backoffice_default_cascades_total",
            "Default flag cascades by collection and action",
        ),
        &["collection", "action"],
    )
    .expect("Failed to create backoffice_default_cascades_total metric");

    registry
        .register(Box::new(ledger_counter.clone()))
        .expect("Failed to register backoffice_ledger_operations_total");
    registry
        .register(Box::new(cascade_counter.clone()))
        .expect("Failed to register backoffice_default_cascades_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    LEDGER_OPERATIONS_TOTAL
        .set(ledger_counter)
        .expect("Failed to set backoffice_ledger_operations_total");
    DEFAULT_CASCADES_TOTAL
        .set(cascade_counter)
        .expect("Failed to set backoffice_default_cascades_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record the outcome of a ledger write.
pub fn record_ledger_operation(operation: &str, outcome: &str) {
    if let Some(counter) = LEDGER_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record a cascade applied (or refused) while keeping a single default.
pub fn record_default_cascade(collection: &str, action: &str) {
    if let Some(counter) = DEFAULT_CASCADES_TOTAL.get() {
        counter.with_label_values(&[collection, action]).inc();
    }
}
