//! Test-only logging setup, grounded in `async_raft`'s
//! `fixtures::init_tracing()` (`async-raft/tests/fixtures/mod.rs`).
//!
//! Library code in this crate never installs a subscriber itself — only
//! test binaries opt in, and only once.

use std::sync::Once;

use tracing_subscriber::prelude::*;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber reading `RUST_LOG` (falling back to
/// off). Safe to call from every test; only the first call has an effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::Layer::default()
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::FULL)
            .with_ansi(false);
        let subscriber = tracing_subscriber::Registry::default()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).expect("error setting global tracing subscriber");
    });
}
