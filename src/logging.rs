use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle to the installed log filter.
///
/// Logging has to be up before configuration is loaded, but the verbosity
/// comes from configuration, so the level is adjusted through this handle
/// once the config is known.
pub struct LogHandle {
    filter: Option<reload::Handle<EnvFilter, Registry>>,

    /// `RUST_LOG` was set and takes precedence over the config debug flag.
    env_override: bool,
}

/// Installs the global fmt subscriber at `info` (or `RUST_LOG` when set).
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place and return a handle that does nothing.
pub fn init_logging() -> LogHandle {
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok());
    let env_override = env_filter.is_some();
    let filter = env_filter.unwrap_or_else(|| EnvFilter::new("info"));

    let (filter_layer, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false))
        .try_init();

    match installed {
        Ok(()) => LogHandle {
            filter: Some(handle),
            env_override,
        },
        Err(err) => {
            eprintln!("Failed to set global default subscriber: {}", err);
            LogHandle {
                filter: None,
                env_override,
            }
        }
    }
}

impl LogHandle {
    /// Switches between `debug` and `info` unless `RUST_LOG` pinned the level.
    pub fn set_debug(&self, debug: bool) {
        if self.env_override {
            return;
        }
        let Some(handle) = &self.filter else {
            return;
        };

        let level = if debug { "debug" } else { "info" };
        if let Err(err) = handle.reload(EnvFilter::new(level)) {
            eprintln!("Failed to update log level: {}", err);
        } else if debug {
            tracing::debug!("Debug mode enabled");
        }
    }
}
