//! Tracing setup and run identifiers.

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install a formatted `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops. Embedders with
/// their own subscriber simply skip this.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .try_init();
}

/// Fresh run identifier stamped onto results and tracing spans.
#[must_use]
pub fn new_run_id() -> String {
    format!("run-{}", Uuid::new_v4())
}
