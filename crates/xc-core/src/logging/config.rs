//! Logging configuration.
//!
//! The level comes from, highest first: `-q`/`-v` flags, `XC_LOG` (a level
//! name), then `RUST_LOG` (full filter directives). The format comes from
//! `--log-format`, then `XC_LOG_FORMAT`.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Crates whose events are shown at the configured level.
const CRATE_TARGETS: &[&str] = &["xc_core", "xc_config", "xc_frame"];

/// Log output format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line, for CI log collectors.
    #[value(alias = "jsonl")]
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    /// Harness default: only kept sandboxes and failures are reported.
    #[default]
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Level selected by `-v` count and `-q`; `None` leaves it to the environment.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Option<Self> {
        if quiet {
            return Some(LogLevel::Error);
        }
        match verbose {
            0 => None,
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }

    /// Parse an `XC_LOG` value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "off" => Some(LogLevel::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Raw `RUST_LOG` directives, used only when no level was chosen explicitly.
    pub directives: Option<String>,
    /// Omit timestamps from human output.
    pub without_time: bool,
}

impl LogConfig {
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        let env_level = std::env::var("XC_LOG")
            .ok()
            .and_then(|v| LogLevel::from_name(&v));
        let directives = match (cli_level, env_level) {
            (None, None) => std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty()),
            _ => None,
        };
        let env_format = std::env::var("XC_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::from_str(v.trim(), true).ok());

        LogConfig {
            format: cli_format.or(env_format).unwrap_or_default(),
            level: cli_level.or(env_level).unwrap_or_default(),
            directives,
            without_time: false,
        }
    }

    /// `xc_core=<level>,...` for every harness crate.
    pub fn default_directive(&self) -> String {
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.level.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The subscriber filter: `RUST_LOG` directives if they parse, else the crate levels.
    pub fn filter(&self) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(self.default_directive()))
    }
}
