#![allow(dead_code)]

pub mod aggregator;
pub mod backend;
pub mod consumer;

/// Install a fmt subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
