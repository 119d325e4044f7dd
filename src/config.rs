use std::{env, time::Duration};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub status_interval: Duration,
    pub plugin_idle_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ROBLOX_STUDIO_PORT must be a valid u16")]
    InvalidPort,
    #[error("{name} must be a positive number of seconds")]
    InvalidDuration { name: &'static str },
    #[error("ROBLOX_STUDIO_HOST must be a hostname or IP address")]
    InvalidHost,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_HOST.to_string(),
            bind_port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            status_interval: Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS),
            plugin_idle_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = non_empty_var("ROBLOX_STUDIO_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let bind_port = non_empty_var("ROBLOX_STUDIO_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            bind_addr,
            bind_port,
            request_timeout: duration_var("ROBLOX_STUDIO_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            sweep_interval: duration_var("ROBLOX_STUDIO_SWEEP_INTERVAL_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)),
            status_interval: duration_var("ROBLOX_STUDIO_STATUS_INTERVAL_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS)),
            plugin_idle_timeout: duration_var("ROBLOX_STUDIO_PLUGIN_IDLE_TIMEOUT_SECS")?,
        };

        validate_host(&config.bind_addr)?;
        Ok(config)
    }

    /// Host and port in the form `TcpListener::bind` resolves, so names like
    /// `localhost` work as well as IP literals.
    pub fn bind_target(&self) -> (&str, u16) {
        (self.bind_addr.as_str(), self.bind_port)
    }
}

// Resolution happens at bind time; this only rejects values no resolver accepts.
fn validate_host(host: &str) -> Result<(), ConfigError> {
    let well_formed = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'));
    if well_formed {
        Ok(())
    } else {
        Err(ConfigError::InvalidHost)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn duration_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    non_empty_var(name)
        .map(|value| {
            value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidDuration { name })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Tests below mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "ROBLOX_STUDIO_HOST",
        "ROBLOX_STUDIO_PORT",
        "ROBLOX_STUDIO_REQUEST_TIMEOUT_SECS",
        "ROBLOX_STUDIO_SWEEP_INTERVAL_SECS",
        "ROBLOX_STUDIO_STATUS_INTERVAL_SECS",
        "ROBLOX_STUDIO_PLUGIN_IDLE_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn parse_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();

        let config = Config::from_env().expect("config should parse");
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.bind_port, 3002);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.status_interval, Duration::from_secs(5));
        assert_eq!(config.plugin_idle_timeout, None);
    }

    #[test]
    fn overrides_are_read() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("ROBLOX_STUDIO_HOST", "127.0.0.1");
        env::set_var("ROBLOX_STUDIO_PORT", "4100");
        env::set_var("ROBLOX_STUDIO_REQUEST_TIMEOUT_SECS", "12");
        env::set_var("ROBLOX_STUDIO_PLUGIN_IDLE_TIMEOUT_SECS", "60");

        let config = Config::from_env().expect("config should parse");
        assert_eq!(config.bind_target(), ("127.0.0.1", 4100));
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert_eq!(config.plugin_idle_timeout, Some(Duration::from_secs(60)));
        clear_env();
    }

    #[test]
    fn invalid_port_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("ROBLOX_STUDIO_PORT", "70000");

        let err = Config::from_env().expect_err("expected invalid port error");
        assert!(matches!(err, ConfigError::InvalidPort));
        clear_env();
    }

    #[test]
    fn zero_timeout_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("ROBLOX_STUDIO_REQUEST_TIMEOUT_SECS", "0");

        let err = Config::from_env().expect_err("expected invalid duration error");
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                name: "ROBLOX_STUDIO_REQUEST_TIMEOUT_SECS"
            }
        ));
        clear_env();
    }

    #[test]
    fn invalid_host_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        clear_env();
        env::set_var("ROBLOX_STUDIO_HOST", "not a host");

        let err = Config::from_env().expect_err("expected invalid host error");
        assert!(matches!(err, ConfigError::InvalidHost));
        clear_env();
    }

    #[test]
    fn hostname_and_ipv6_hosts_are_accepted() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        for host in ["localhost", "studio-bridge.local", "::1"] {
            clear_env();
            env::set_var("ROBLOX_STUDIO_HOST", host);

            let config = Config::from_env().expect("hostname should parse");
            assert_eq!(config.bind_target(), (host, DEFAULT_PORT));
        }
        clear_env();
    }

    #[tokio::test]
    async fn localhost_bind_target_binds() {
        let config = Config {
            bind_addr: "localhost".to_string(),
            bind_port: 0,
            ..Config::default()
        };

        let listener = tokio::net::TcpListener::bind(config.bind_target())
            .await
            .expect("localhost should resolve and bind");
        assert!(listener.local_addr().expect("local addr").ip().is_loopback());
    }
}
