//! Subscriber installation for engine hosts.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

/// Install the process-wide subscriber: JSON lines with timestamps, filtered
/// by `RUST_LOG` (`info` when unset). The engine itself only emits events;
/// hosts decide when to call this, and calling it again is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_timer(SystemTime)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}
