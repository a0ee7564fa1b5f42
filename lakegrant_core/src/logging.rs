//! Logging setup for anything embedding the reconciler.
//!

// Re-exports for convenience
pub use tracing::metadata::LevelFilter;
pub use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{util::SubscriberInitExt, Layer};

/// Filter used when `RUST_LOG` isn't set.
pub const DEFAULT_FILTER: &str = "lakegrant_core=info";

/// Set up stdout logging. `level` caps what gets printed and defaults to INFO.
///
/// Returns an error when a global subscriber is already installed.
pub fn setup(level: Option<LevelFilter>) -> anyhow::Result<()> {
    // RUST_LOG wins over the default filter (e.g. for tests).
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
    let logging_layers = vec![
        tracing_subscriber::EnvFilter::new(env).boxed(),
        tracing_subscriber::fmt::layer()
            .with_filter(level.unwrap_or(LevelFilter::INFO))
            .boxed(),
    ];

    tracing_subscriber::registry()
        .with(logging_layers)
        .try_init()?;

    debug!("logging set up");
    Ok(())
}
