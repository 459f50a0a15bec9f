//! Configuration for FigBridge Relay
//!
//! Settings come from an optional figbridge.yml, overridden by CLI flags
//! and environment variables. The Figma token is only ever read from
//! the environment.

use anyhow::{Context, Result};
use figbridge_shared::protocol::{DEFAULT_PORT, FIGMA_TOKEN_ENV};
use figbridge_shared::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_FIGMA_API_BASE: &str = "https://api.figma.com";

/// Optional on-disk settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tunnel_url: Option<String>,
    pub figma_api_base: Option<String>,
}

impl FileConfig {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Search for a config file in the working directory
    pub fn find_config() -> Option<PathBuf> {
        ["figbridge.yml", "figbridge.yaml", ".figbridge.yml"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tunnel_url: Option<String>,
}

/// Resolved relay configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Public address of the tunnel exposing this bridge, if any
    pub tunnel_url: Option<String>,
    pub figma_api_base: String,
    pub figma_token: String,
}

impl BridgeConfig {
    /// Defaults with the given token
    pub fn new(figma_token: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            tunnel_url: None,
            figma_api_base: DEFAULT_FIGMA_API_BASE.to_string(),
            figma_token: figma_token.into(),
        }
    }

    /// Read the Figma token from the process environment
    pub fn figma_token_from_env() -> figbridge_shared::Result<String> {
        require_token(std::env::var(FIGMA_TOKEN_ENV).ok())
    }

    /// Merge file settings and overrides on top of the defaults
    pub fn resolve(
        file: FileConfig,
        overrides: Overrides,
        figma_token: String,
    ) -> figbridge_shared::Result<Self> {
        let defaults = Self::new(figma_token);
        let config = Self {
            host: overrides.host.or(file.host).unwrap_or(defaults.host),
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            tunnel_url: overrides.tunnel_url.or(file.tunnel_url),
            figma_api_base: file.figma_api_base.unwrap_or(defaults.figma_api_base),
            figma_token: defaults.figma_token,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> figbridge_shared::Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host cannot be empty".into()));
        }
        if !is_http_url(&self.figma_api_base) {
            return Err(Error::Config(format!(
                "figma_api_base must be an http(s) URL, got '{}'",
                self.figma_api_base
            )));
        }
        if let Some(url) = &self.tunnel_url {
            validate_tunnel_url(url)?;
        }
        Ok(())
    }

    /// `host:port` pair handed to the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address local callers use to reach the bridge
    pub fn local_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn require_token(value: Option<String>) -> figbridge_shared::Result<String> {
    match value {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(Error::MissingEnv(FIGMA_TOKEN_ENV)),
    }
}

/// An http(s) scheme followed by a host
fn is_http_url(url: &str) -> bool {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty())
}

/// Tunnel URLs must be absolute http(s) addresses
pub fn validate_tunnel_url(url: &str) -> figbridge_shared::Result<()> {
    if is_http_url(url) {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!(
            "tunnel URL must start with http:// or https://, got '{}'",
            url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_or_blank_token_is_rejected() {
        assert!(matches!(require_token(None), Err(Error::MissingEnv("FIGMA_API_TOKEN"))));
        assert!(matches!(require_token(Some("  ".into())), Err(Error::MissingEnv(_))));
        assert_eq!(require_token(Some(" figd_abc ".into())).unwrap(), "figd_abc");
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
host: 0.0.0.0
port: 4000
tunnel_url: https://bridge.example.ngrok.app
"#;
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        let config = BridgeConfig::resolve(file, Overrides::default(), "tok".into()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.tunnel_url.as_deref(), Some("https://bridge.example.ngrok.app"));
        assert_eq!(config.figma_api_base, DEFAULT_FIGMA_API_BASE);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = FileConfig {
            port: Some(4000),
            tunnel_url: Some("https://old.example.com".into()),
            ..Default::default()
        };
        let overrides = Overrides {
            port: Some(5000),
            tunnel_url: Some("https://new.example.com".into()),
            ..Default::default()
        };
        let config = BridgeConfig::resolve(file, overrides, "tok".into()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.tunnel_url.as_deref(), Some("https://new.example.com"));
        assert_eq!(config.listen_addr(), "127.0.0.1:5000");
    }

    #[test]
    fn test_invalid_tunnel_url_fails() {
        let overrides = Overrides {
            tunnel_url: Some("bridge.example.com".into()),
            ..Default::default()
        };
        assert!(BridgeConfig::resolve(FileConfig::default(), overrides, "tok".into()).is_err());
    }

    #[test]
    fn test_tunnel_url_needs_a_host_after_the_scheme() {
        assert!(validate_tunnel_url("http://x").is_ok());
        assert!(validate_tunnel_url("https://a.io").is_ok());
        assert!(validate_tunnel_url("http://").is_err());
        assert!(validate_tunnel_url("https://").is_err());
        assert!(validate_tunnel_url("ftp://x").is_err());
    }
}
