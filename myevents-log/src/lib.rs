//! MyEvents logging setup
//!
//! Installs a `tracing` subscriber for the MyEvents services. Everything in
//! the workspace logs through `tracing` macros with structured fields; this
//! crate only decides where those records go and at which level.
//!
//! # Usage
//!
//! ```rust,no_run
//! use myevents_log::LogConfig;
//!
//! myevents_log::init(&LogConfig::from_env()).ok();
//! tracing::info!(service = "events", "Service started");
//! ```
//!
//! # Environment Variables
//!
//! - `MYEVENTS_DEBUG=1` - Enable debug logging
//! - `MYEVENTS_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `MYEVENTS_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `MYEVENTS_LOG_COLOR=1|0` - Enable/disable colors
//! - `RUST_LOG` - Full filter directives, overrides the level when set

use once_cell::sync::OnceCell;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum LogError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level that reaches the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Filter directive understood by `EnvFilter`.
    pub fn directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            _ => Err(LogError::UnknownLevel(s.to_string())),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            _ => Err(LogError::UnknownFormat(s.to_string())),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    /// Whether ANSI colors are used (ignored for JSON)
    pub color: bool,
    /// Whether the event target (module path) is printed
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            module_path: true,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Create config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from any variable source.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let debug = lookup("MYEVENTS_DEBUG").is_some_and(|v| flag(&v));

        let level = lookup("MYEVENTS_LOG_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("MYEVENTS_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let color = lookup("MYEVENTS_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let module_path = lookup("MYEVENTS_LOG_MODULE").is_none_or(|v| flag(&v));

        Self {
            debug,
            level,
            format,
            color,
            module_path,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Level filter, `RUST_LOG` wins when it parses.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.module_path);

        match self.format {
            Format::Json => base.json().boxed(),
            Format::Pretty => base.pretty().with_ansi(self.color).boxed(),
            Format::Compact => base.compact().with_ansi(self.color).boxed(),
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

static ACTIVE: OnceCell<LogConfig> = OnceCell::new();

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set, by this crate or anyone else.
pub fn init(config: &LogConfig) -> Result<(), LogError> {
    tracing_subscriber::registry()
        .with(config.layer())
        .with(config.filter())
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

    let _ = ACTIVE.set(config.clone());
    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

/// The configuration passed to a successful [`init`], if any.
pub fn active_config() -> Option<&'static LogConfig> {
    ACTIVE.get()
}

// ============================================================================
// Tests
// ============================================================================
