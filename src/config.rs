use std::{env, net::SocketAddr, str::FromStr};

use thiserror::Error;

use crate::cors::OriginPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            _ => Err(ConfigError::InvalidTransport),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportKind,
    pub bind_addr: String,
    pub bind_port: u16,
    pub allowed_origins: Vec<String>,
    pub influxdb_url: String,
    pub influxdb_token: String,
    pub influxdb_org: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("INFLUXDB_TOKEN is required and must not be empty")]
    MissingToken,
    #[error("MCP_TRANSPORT must be one of: stdio, http")]
    InvalidTransport,
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let influxdb_token = non_empty("INFLUXDB_TOKEN").ok_or(ConfigError::MissingToken)?;

        let transport = non_empty("MCP_TRANSPORT")
            .map(|value| value.parse::<TransportKind>())
            .transpose()?
            .unwrap_or(TransportKind::Stdio);

        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = non_empty("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let allowed_origins = non_empty("MCP_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(|origin| origin.trim_end_matches('/').to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let influxdb_url = non_empty("INFLUXDB_URL")
            .unwrap_or_else(|| "http://localhost:8086".to_string())
            .trim_end_matches('/')
            .to_string();

        let config = Self {
            transport,
            bind_addr,
            bind_port,
            allowed_origins,
            influxdb_url,
            influxdb_token,
            influxdb_org: non_empty("INFLUXDB_ORG"),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        if self.allowed_origins.is_empty() {
            OriginPolicy::Relaxed
        } else {
            OriginPolicy::Strict(self.allowed_origins.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn parse_defaults() {
        let config = Config::from_lookup(lookup(&[("INFLUXDB_TOKEN", "abc")]))
            .expect("config should parse");

        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.influxdb_url, "http://localhost:8086");
        assert_eq!(config.influxdb_org, None);
        assert_eq!(config.origin_policy(), OriginPolicy::Relaxed);
    }

    #[test]
    fn missing_token_fails() {
        let err = Config::from_lookup(lookup(&[("MCP_TRANSPORT", "http")]))
            .expect_err("expected missing token error");
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn blank_token_fails() {
        let err = Config::from_lookup(lookup(&[("INFLUXDB_TOKEN", "   ")]))
            .expect_err("expected missing token error");
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn invalid_transport_fails() {
        let err = Config::from_lookup(lookup(&[
            ("INFLUXDB_TOKEN", "abc"),
            ("MCP_TRANSPORT", "websocket"),
        ]))
        .expect_err("expected invalid transport error");
        assert!(matches!(err, ConfigError::InvalidTransport));
    }

    #[test]
    fn invalid_port_fails() {
        let err = Config::from_lookup(lookup(&[
            ("INFLUXDB_TOKEN", "abc"),
            ("BIND_PORT", "99999"),
        ]))
        .expect_err("expected invalid port error");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn allowed_origins_select_strict_profile() {
        let config = Config::from_lookup(lookup(&[
            ("INFLUXDB_TOKEN", "abc"),
            ("MCP_TRANSPORT", "HTTP"),
            (
                "MCP_ALLOWED_ORIGINS",
                "https://app.example.com/, http://localhost:3000,,",
            ),
            ("INFLUXDB_URL", "https://influx.internal:8086/"),
        ]))
        .expect("config should parse");

        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.influxdb_url, "https://influx.internal:8086");
        assert_eq!(
            config.origin_policy(),
            OriginPolicy::Strict(vec![
                "https://app.example.com".to_string(),
                "http://localhost:3000".to_string(),
            ])
        );
    }
}
