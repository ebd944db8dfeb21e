//! Tracing setup
//!
//! The subscriber is installed before configuration is read, with a filter
//! that can be swapped once the configured level is known. `RUST_LOG`
//! always wins over the configured level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Level used until the configured one is applied
pub const BOOTSTRAP_LEVEL: &str = "info";

/// Filter layer whose directives can be replaced after startup
pub type FilterLayer = reload::Layer<EnvFilter, Registry>;

/// Handle to the live log filter
#[derive(Clone)]
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogFilter {
    /// Reloadable filter layer starting at `initial`
    ///
    /// `env_override` marks `initial` as coming from `RUST_LOG`.
    pub fn layer(initial: EnvFilter, env_override: bool) -> (FilterLayer, Self) {
        let (layer, handle) = reload::Layer::new(initial);
        (
            layer,
            Self {
                handle,
                env_override,
            },
        )
    }

    /// Switch to the configured level
    ///
    /// Returns `Ok(false)` without touching the filter when `RUST_LOG` is set.
    pub fn apply_configured_level(&self, level: &str) -> Result<bool, reload::Error> {
        if self.env_override {
            tracing::debug!(level, "RUST_LOG set, ignoring configured log level");
            return Ok(false);
        }
        self.handle.reload(EnvFilter::new(level))?;
        Ok(true)
    }
}

/// Install the global subscriber at [`BOOTSTRAP_LEVEL`] (or `RUST_LOG`)
pub fn init() -> LogFilter {
    let (initial, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(BOOTSTRAP_LEVEL), false),
    };
    let (filter_layer, filter) = LogFilter::layer(initial, env_override);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .init();

    filter
}
