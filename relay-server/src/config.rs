use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 30000;
const DEFAULT_OLLAMA_MODEL: &str = "gemma3:1b";
const DEFAULT_ALLOWED_ORIGINS: [&str; 6] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:8081",
    "http://127.0.0.1:8081",
    "http://localhost:8080",
    "http://127.0.0.1:8080",
];

/// Cross-origin policy for browser clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Gateway settings, read once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub ollama_host: String,
    pub ollama_port: u16,
    /// Base URL of the backend API, e.g. `http://localhost:30000/api`.
    pub ollama_api_base: String,
    pub ollama_model: String,
    pub allowed_origins: AllowedOrigins,
    pub static_dir: Option<PathBuf>,
}

/// The subset of configuration exposed by `GET /api/config`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicConfig {
    pub ollama_model: String,
    pub ollama_api_base: String,
    pub ollama_host: String,
    pub ollama_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_port: DEFAULT_OLLAMA_PORT,
            ollama_api_base: api_base(DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_PORT),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            allowed_origins: AllowedOrigins::List(
                DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            ),
            static_dir: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for
    /// unset or blank keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("RELAY_PORT") {
            Some(raw) => parse_port("RELAY_PORT", &raw)?,
            None => defaults.port,
        };
        let ollama_host = get("OLLAMA_HOST").unwrap_or(defaults.ollama_host);
        let ollama_port = match get("OLLAMA_PORT") {
            Some(raw) => parse_port("OLLAMA_PORT", &raw)?,
            None => defaults.ollama_port,
        };
        let ollama_api_base = get("OLLAMA_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| api_base(&ollama_host, ollama_port));
        let allowed_origins = match get("RELAY_ALLOWED_ORIGINS") {
            Some(raw) => parse_origins(&raw),
            None => defaults.allowed_origins,
        };

        Ok(Self {
            host: get("RELAY_HOST").unwrap_or(defaults.host),
            port,
            ollama_host,
            ollama_port,
            ollama_api_base,
            ollama_model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            allowed_origins,
            static_dir: get("RELAY_STATIC_DIR").map(PathBuf::from),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public(&self) -> PublicConfig {
        PublicConfig {
            ollama_model: self.ollama_model.clone(),
            ollama_api_base: self.ollama_api_base.clone(),
            ollama_host: self.ollama_host.clone(),
            ollama_port: self.ollama_port,
        }
    }
}

fn api_base(host: &str, port: u16) -> String {
    format!("http://{}:{}/api", host, port)
}

fn parse_port(key: &str, raw: &str) -> Result<u16> {
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a port number, got {:?}", key, raw))
}

fn parse_origins(raw: &str) -> AllowedOrigins {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect();
    if origins.iter().any(|o| o == "*") {
        AllowedOrigins::Any
    } else {
        AllowedOrigins::List(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_local_deployment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.ollama_api_base, "http://localhost:30000/api");
        assert_eq!(config.ollama_model, "gemma3:1b");
    }

    #[test]
    fn api_base_follows_host_and_port() {
        let config = config_from(&[("OLLAMA_HOST", "ollama.svc"), ("OLLAMA_PORT", "11434")]).unwrap();
        assert_eq!(config.ollama_api_base, "http://ollama.svc:11434/api");
    }

    #[test]
    fn explicit_api_base_wins() {
        let config = config_from(&[
            ("OLLAMA_PORT", "11434"),
            ("OLLAMA_API_BASE", "http://gpu-node:8000/api/"),
        ])
        .unwrap();
        assert_eq!(config.ollama_api_base, "http://gpu-node:8000/api");
        assert_eq!(config.ollama_port, 11434);
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = config_from(&[("RELAY_PORT", "fifty")]).unwrap_err();
        assert!(err.to_string().contains("RELAY_PORT"));
    }

    #[test]
    fn origins_are_comma_separated() {
        let config =
            config_from(&[("RELAY_ALLOWED_ORIGINS", "http://a.test, http://b.test,")]).unwrap();
        assert_eq!(
            config.allowed_origins,
            AllowedOrigins::List(vec!["http://a.test".into(), "http://b.test".into()])
        );

        let any = config_from(&[("RELAY_ALLOWED_ORIGINS", "*")]).unwrap();
        assert_eq!(any.allowed_origins, AllowedOrigins::Any);
    }

    #[test]
    fn public_view_exposes_backend_settings() {
        let public = GatewayConfig::default().public();
        let json = serde_json::to_value(&public).unwrap();
        assert_eq!(json["ollama_model"], "gemma3:1b");
        assert_eq!(json["ollama_api_base"], "http://localhost:30000/api");
        assert_eq!(json["ollama_port"], 30000);
    }
}
