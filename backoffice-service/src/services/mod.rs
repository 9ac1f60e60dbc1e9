pub mod defaults;
pub mod financial;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod totals;

pub use defaults::DefaultManager;
pub use financial::FinancialService;
pub use ledger::{InvoiceLocks, PaymentLedger};
pub use metrics::{get_metrics, init_metrics};
pub use query::{QueryConfig, QueryEngine, QueryParams};
