use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber (`RUST_LOG` filters, `info` by default).
/// A second call is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .try_init();
}
