//! Startup orchestration.
//!
//! Order: observability first, then the gateway (which validates its config
//! and builds the client). Any failure here is fatal.

use crate::config::GatewayConfig;
use crate::gateway::{Gateway, StartupError};
use crate::observability::{logging, metrics};

/// Initialize logging and metrics, then build the gateway.
pub fn initialize(config: &GatewayConfig) -> Result<Gateway, StartupError> {
    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::from_config(config)?;
    tracing::info!(
        upstream = ?config.url,
        request_per_second = config.request_per_second,
        retry_codes = ?config.retry_error_status_codes,
        "Gateway initialized"
    );
    Ok(gateway)
}
