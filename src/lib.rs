pub mod api;
pub mod core;

use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Installs the process logger once. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        // A host application may already own the global logger.
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
    });
}
