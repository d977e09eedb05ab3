//! Shared tracing/logging setup for hosts embedding the engine.

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Initialize process-wide observability.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
