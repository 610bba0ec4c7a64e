use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with full filter directives, e.g. `netddp_client=trace`.
pub const LOG_FILTER_ENV: &str = "NETDDP_LOG";

/// Crates whose events follow `--log-level`. Everything else is capped at warn.
const OWN_TARGETS: [&str; 4] = [
    "netddp",
    "netddp_client",
    "netddp_frame",
    "netddp_transport",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Level applied to dependencies such as tungstenite and rustls.
    fn dependency_level(self) -> LogLevel {
        match self {
            LogLevel::Info | LogLevel::Debug | LogLevel::Trace => LogLevel::Warn,
            quieter => quieter,
        }
    }
}

/// Filter directives for `level`: the netddp crates at `level`, the rest no
/// louder than warn.
fn directives(level: LogLevel) -> String {
    let mut out = level.dependency_level().as_directive().to_string();
    for target in OWN_TARGETS {
        out.push_str(&format!(",{target}={}", level.as_directive()));
    }
    out
}

/// Install the stderr subscriber.
///
/// Thread names are included because transport events, the ingress worker,
/// and the caller each log from their own thread. `NETDDP_LOG`, when set and
/// valid, replaces the level-derived filter.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(directives(level)));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
