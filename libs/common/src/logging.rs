//! Unified logging setup
//!
//! Services call [`init`] exactly once at startup. The configured level acts
//! as the default; `RUST_LOG` overrides it when present.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `level` is a tracing directive string such as `"info"` or
/// `"simsrv=debug,info"`.
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
