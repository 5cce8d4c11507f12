//! Logging initialization
//!
//! Thin wrapper around the fmt subscriber so binaries and tests share one
//! setup path.

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .try_init();
}
