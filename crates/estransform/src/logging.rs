//! Subscriber setup for binaries and tests embedding estransform.
//!
//! Only compiled with the `logging` feature. Libraries should leave the
//! subscriber to the application and just consume the `tracing` events.

use std::sync::Once;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Crates whose events follow the requested [`LogLevel`].
const OWN_TARGETS: &[&str] = &["estransform", "estransform_rolldown"];

/// Verbosity of estransform's own events.
///
/// Dependencies (oxc, rolldown) stay at `warn` unless `RUST_LOG` says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Silent,
    Error,
    /// Includes skipped rewrites.
    Warn,
    #[default]
    Info,
    /// Stage reports, transpilation and cache evictions.
    Debug,
    /// Resolver probes as well.
    Trace,
}

impl LogLevel {
    fn as_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Silent => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Per-target directives for this level.
    pub fn directives(&self) -> Vec<String> {
        OWN_TARGETS
            .iter()
            .map(|target| format!("{target}={self}"))
            .collect()
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy();
        for directive in self.directives() {
            if let Ok(directive) = directive.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "silent" | "off" => LogLevel::Silent,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            other => return Err(format!("unknown log level '{other}'")),
        })
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Silent => f.write_str("off"),
            other => write!(f, "{}", other.as_level_filter()),
        }
    }
}

fn install(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).without_time())
        .init();
}

/// Install a compact stderr subscriber at `level`.
///
/// Only the first call in a process has an effect.
///
/// ```rust,no_run
/// use estransform::logging::{LogLevel, init_logging};
///
/// init_logging(LogLevel::Debug);
/// ```
pub fn init_logging(level: LogLevel) {
    INIT.call_once(|| install(level.filter()));
}

/// Like [`init_logging`], but `RUST_LOG` decides everything; `info` when unset.
pub fn init_logging_from_env() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| LogLevel::default().filter());
        install(filter);
    });
}
