// Environment variable overrides

use std::env;

/// Environment variable that overrides the broker URL
pub const AMQP_URL: &str = "AMQP_URL";
/// Environment variable that overrides the database connection
pub const DB_URL: &str = "DB_URL";
/// Environment variable that overrides the REST endpoint
pub const LISTEN_URL: &str = "LISTEN_URL";
/// Environment variable that overrides the TLS REST endpoint
pub const LISTEN_URL_TLS: &str = "LISTEN_URL_TLS";

/// Reads override variables from a source.
///
/// Empty values count as unset.
pub struct EnvLoader<F = fn(&str) -> Option<String>> {
    lookup: F,
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

impl EnvLoader {
    /// Read from the process environment
    pub fn new() -> Self {
        Self {
            lookup: process_env,
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Fn(&str) -> Option<String>> EnvLoader<F> {
    /// Read from a custom source
    pub fn from_fn(lookup: F) -> Self {
        Self { lookup }
    }

    /// Load a variable, ignoring empty values
    pub fn load_var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|| default.to_string())
    }
}
