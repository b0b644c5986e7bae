//! Configuration types for snapcache

use std::path::PathBuf;

use hyper::http::Uri;
use serde::{Deserialize, Serialize};

use crate::{Result, SnapError};

/// Main configuration
///
/// Loaded once at process start and passed by value into the proxy core
/// and cache store; nothing in the core mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the proxy listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Base URL of the upstream service, e.g. `http://api.example.com:80`
    pub base_url: String,
    /// Root directory for the on-disk cache
    pub cache_root: PathBuf,
    /// Cache GET requests (anything not cached passes through)
    #[serde(default = "default_true")]
    pub cache_get_requests: bool,
    /// Cache POST requests
    #[serde(default)]
    pub cache_post_requests: bool,
}

fn default_listen_port() -> u16 {
    8090
}

fn default_true() -> bool {
    true
}

/// Parsed components of the upstream base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    /// URL scheme (http or https)
    pub scheme: String,
    /// Upstream host
    pub host: String,
    /// Upstream port (scheme default when the URL omits it)
    pub port: u16,
}

impl BaseUrl {
    /// Parse a base URL string into its components
    pub fn parse(base_url: &str) -> Result<Self> {
        let uri = base_url
            .parse::<Uri>()
            .map_err(|e| SnapError::Config(format!("Invalid base_url '{base_url}': {e}")))?;

        let scheme = uri
            .scheme_str()
            .ok_or_else(|| SnapError::Config(format!("base_url '{base_url}' missing scheme")))?
            .to_string();

        let host = uri
            .host()
            .ok_or_else(|| SnapError::Config(format!("base_url '{base_url}' missing host")))?
            .to_string();

        let port = uri.port_u16().unwrap_or(match scheme.as_str() {
            "https" => 443,
            _ => 80,
        });

        Ok(Self { scheme, host, port })
    }

    /// Render as `scheme://host:port` for outbound URI building
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or fails
    /// validation
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SnapError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SnapError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL does not parse or the cache root is
    /// empty
    pub fn validate(&self) -> Result<()> {
        BaseUrl::parse(&self.base_url)?;

        if self.cache_root.as_os_str().is_empty() {
            return Err(SnapError::Config(
                "cache_root cannot be empty".to_string(),
            ));
        }

        if self.listen_port == 0 {
            return Err(SnapError::Config("listen_port cannot be 0".to_string()));
        }

        Ok(())
    }

    /// Parsed base URL components
    pub fn base(&self) -> Result<BaseUrl> {
        BaseUrl::parse(&self.base_url)
    }

    /// Whether the given method is cached under this policy
    ///
    /// Caching is opt-in per method: GET and POST have flags, everything
    /// else always passes through.
    #[must_use]
    pub fn should_cache(&self, method: &str) -> bool {
        match method.to_ascii_uppercase().as_str() {
            "GET" => self.cache_get_requests,
            "POST" => self.cache_post_requests,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            base_url = "http://api.example.com:8080"
            cache_root = "/tmp/snapcache"
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.listen_port, 8090);
        assert!(config.cache_get_requests);
        assert!(!config.cache_post_requests);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            listen_port = 9000
            base_url = "https://api.example.com"
            cache_root = "/tmp/snapcache"
            cache_post_requests = true
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert!(config.cache_post_requests);
    }

    #[test]
    fn test_invalid_base_url() {
        let config = Config {
            listen_port: 8090,
            base_url: "not a url".to_string(),
            cache_root: PathBuf::from("/tmp"),
            cache_get_requests: true,
            cache_post_requests: false,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_explicit_port() {
        let base = BaseUrl::parse("http://api.example.com:8081").unwrap();
        assert_eq!(base.scheme, "http");
        assert_eq!(base.host, "api.example.com");
        assert_eq!(base.port, 8081);
    }

    #[test]
    fn test_base_url_default_ports() {
        assert_eq!(BaseUrl::parse("http://h").unwrap().port, 80);
        assert_eq!(BaseUrl::parse("https://h").unwrap().port, 443);
    }

    #[test]
    fn test_base_url_origin() {
        let base = BaseUrl::parse("http://api.example.com").unwrap();
        assert_eq!(base.origin(), "http://api.example.com:80");
    }

    #[test]
    fn test_should_cache_policy() {
        let config = Config {
            listen_port: 8090,
            base_url: "http://h".to_string(),
            cache_root: PathBuf::from("/tmp"),
            cache_get_requests: true,
            cache_post_requests: false,
        };

        assert!(config.should_cache("GET"));
        assert!(config.should_cache("get"));
        assert!(!config.should_cache("POST"));
        assert!(!config.should_cache("HEAD"));
        assert!(!config.should_cache("DELETE"));
    }
}
