//! Infrastructure layer: event store, dispatch, read models, job queue,
//! configuration and the application services of the shipping flow.

pub mod command_dispatcher;
pub mod config;
pub mod contacts;
pub mod error;
pub mod event_store;
pub mod jobs;
pub mod payment_terms;
pub mod read_model;
pub mod report;
pub mod shipping;

mod integration_tests;

pub use config::ShipAdviceConfig;
pub use contacts::ContactService;
pub use error::{ServiceError, ServiceResult};
pub use payment_terms::PaymentTermService;
pub use report::ReportAction;
pub use shipping::{ShippingContext, ShippingInvoicer, ShippingService};

/// Aggregate type names, one event stream family each.
pub mod streams {
    pub const PAYMENT_TERM: &str = "account.payment_term";
    pub const CONTACT: &str = "parties.contact";
    pub const SALES_ORDER: &str = "sales.order";
    pub const INVOICE: &str = "invoicing.invoice";
    pub const TRANSFER: &str = "stock.transfer";
    pub const SHIPMENT_ADVICE: &str = "stock.shipment_advice";
}

/// Load configuration from the environment and install the tracing
/// subscriber with its log filter.
pub fn bootstrap() -> anyhow::Result<ShipAdviceConfig> {
    bootstrap_with(|name| std::env::var(name).ok())
}

/// [`bootstrap`] over any variable source.
pub fn bootstrap_with(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<ShipAdviceConfig> {
    let config = ShipAdviceConfig::from_lookup(lookup)?;
    shipadvice_observability::init_with_default_filter(&config.log_filter);
    tracing::info!(
        queue_invoicing = config.queue_invoicing,
        invoicing_max_attempts = config.invoicing_max_attempts,
        "shipping services configured"
    );
    Ok(config)
}
