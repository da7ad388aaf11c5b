//! Telemetry initialization: stdout tracing subscriber.
//!
//! Custody events are logged under the `evidence_audit` target and failed
//! rollbacks under `custody_reconciliation`, so both can be routed
//! separately with `RUST_LOG`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str =
    "evidence_locker_backend=debug,evidence_audit=info,custody_reconciliation=info,tower_http=debug,sqlx::query=info";

/// Initialize the tracing subscriber.
pub fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if log_level.is_empty() || log_level == "info" {
            DEFAULT_FILTER.into()
        } else {
            EnvFilter::new(log_level)
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
