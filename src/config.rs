//! Client configuration.
//!
//! Everything a client needs is resolved once, when the [`ClientConfig`] is
//! built, and then threaded through every runner it creates. The process
//! environment is only consulted by [`ClientConfig::from_env`].
use std::env;

use log::warn;

/// Overrides the default call timeout, in (fractional) seconds.
pub const TIMEOUT_ENV: &str = "COURIER_TIMEOUT";
/// Any value other than empty, `0` or `false` selects [`Mode::Test`].
pub const TEST_MODE_ENV: &str = "COURIER_TEST_MODE";

pub const DEFAULT_TIMEOUT: f64 = 60.0;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Whether stored responses are consulted before going to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Live,
    /// Services with a registered stub are answered from it (its default
    /// producer when the params match no entry) and the call is recorded.
    /// Services with no stub at all still go to the network.
    Test,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Default timeout for every call, in seconds.
    pub timeout: f64,
    pub mode: Mode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            mode: Mode::Live,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Builds a config for `host:port`, applying [`TIMEOUT_ENV`] and
    /// [`TEST_MODE_ENV`] from the process environment.
    pub fn from_env(host: impl Into<String>, port: u16) -> Self {
        Self::from_lookup(host, port, |key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(host: impl Into<String>, port: u16, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(host, port);

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => config.timeout = seconds,
                _ => warn!("ignoring invalid {TIMEOUT_ENV} value {raw:?}"),
            }
        }

        if let Some(raw) = lookup(TEST_MODE_ENV) {
            if is_truthy(&raw) {
                config.mode = Mode::Test;
            }
        }

        config
    }
}

fn is_truthy(raw: &str) -> bool {
    let raw = raw.trim();
    !(raw.is_empty() || raw == "0" || raw.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup("localhost", 9000, lookup(&[]));

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9000);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.mode, Mode::Live);
    }

    #[test]
    fn timeout_override_is_parsed_as_float() {
        let config = ClientConfig::from_lookup("h", 1, lookup(&[(TIMEOUT_ENV, "2.5")]));
        assert_eq!(config.timeout, 2.5);

        let config = ClientConfig::from_lookup("h", 1, lookup(&[(TIMEOUT_ENV, "soon")]));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_mode_flag() {
        for (raw, mode) in [
            ("yes", Mode::Test),
            ("1", Mode::Test),
            ("", Mode::Live),
            ("0", Mode::Live),
            ("FALSE", Mode::Live),
        ] {
            let config = ClientConfig::from_lookup("h", 1, lookup(&[(TEST_MODE_ENV, raw)]));
            assert_eq!(config.mode, mode, "value {raw:?}");
        }
    }

    #[test]
    fn builders_override_fields() {
        let config = ClientConfig::new("h", 1)
            .with_timeout(5.0)
            .with_mode(Mode::Test);

        assert_eq!(config.timeout, 5.0);
        assert_eq!(config.mode, Mode::Test);
    }
}
