/// Process configuration for githarvest
///
/// Everything is supplied up front via command-line flags, each with an
/// environment-variable fallback. There is no config file; the process is
/// meant to be launched by an operator or a scheduler with explicit
/// arguments.
use crate::error::ConfigError;
use clap::{Parser, ValueEnum};

/// Runtime settings, parsed once at startup
#[derive(Debug, Clone, Parser)]
#[command(
    name = "githarvest",
    about = "Harvests commit history for every repository in a GitHub organization \
             into per-repository append-only logs, tracking incremental-fetch \
             watermarks in Consul",
    version
)]
pub struct Settings {
    /// GitHub organization name
    #[arg(value_name = "ORG")]
    pub organization: String,

    /// GitHub OAuth2 access token
    #[arg(long, env = "GITHARVEST_GITHUB_TOKEN")]
    pub github_token: Option<String>,

    /// Consul KV api address (ex: localhost:8500)
    #[arg(long, env = "GITHARVEST_CONSUL_ADDR")]
    pub consul_addr: String,

    /// Storage backend for commit logs
    #[arg(
        long,
        env = "GITHARVEST_STORAGE_TYPE",
        value_enum,
        default_value_t = StorageKind::Fs
    )]
    pub storage_type: StorageKind,

    /// Root directory (fs) or bucket base URL (object) for commit logs
    #[arg(long, env = "GITHARVEST_STORAGE_ROOT")]
    pub storage_root: String,

    /// GitHub API base URL, override for GitHub Enterprise
    #[arg(
        long,
        env = "GITHARVEST_GITHUB_API_URL",
        default_value = "https://api.github.com"
    )]
    pub github_api_url: String,
}

/// Which append-only log backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Local filesystem rooted at the storage root directory
    Fs,
    /// S3-compatible HTTP object store addressed by the storage root URL
    Object,
}

impl Settings {
    /// Validate cross-field constraints clap cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.organization.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ORG".to_string(),
                reason: "organization name must not be empty".to_string(),
            });
        }

        if self.consul_addr.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "consul-addr".to_string(),
                reason: "must be a host:port address".to_string(),
            });
        }

        if self.storage_root.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage-root".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.storage_type == StorageKind::Object
            && !(self.storage_root.starts_with("http://")
                || self.storage_root.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                key: "storage-root".to_string(),
                reason: format!(
                    "object storage requires an http(s) base URL, got '{}'",
                    self.storage_root
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(args).expect("settings should parse")
    }

    #[test]
    fn test_parse_minimal() {
        let settings = parse(&[
            "githarvest",
            "--consul-addr",
            "localhost:8500",
            "--storage-root",
            "/var/lib/githarvest",
            "acme",
        ]);

        assert_eq!(settings.organization, "acme");
        assert_eq!(settings.consul_addr, "localhost:8500");
        assert_eq!(settings.storage_type, StorageKind::Fs);
        assert_eq!(settings.github_api_url, "https://api.github.com");
        assert!(settings.github_token.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_object_storage() {
        let settings = parse(&[
            "githarvest",
            "--consul-addr",
            "consul.internal:8500",
            "--storage-type",
            "object",
            "--storage-root",
            "http://minio.internal:9000/commit-logs",
            "acme",
        ]);

        assert_eq!(settings.storage_type, StorageKind::Object);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_organization_fails_to_parse() {
        let result = Settings::try_parse_from([
            "githarvest",
            "--consul-addr",
            "localhost:8500",
            "--storage-root",
            "/tmp/logs",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_object_storage_requires_url() {
        let settings = parse(&[
            "githarvest",
            "--consul-addr",
            "localhost:8500",
            "--storage-type",
            "object",
            "--storage-root",
            "/var/lib/githarvest",
            "acme",
        ]);

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("storage-root"));
    }

    #[test]
    fn test_empty_organization_rejected() {
        let settings = parse(&[
            "githarvest",
            "--consul-addr",
            "localhost:8500",
            "--storage-root",
            "/tmp/logs",
            "  ",
        ]);
        assert!(settings.validate().is_err());
    }
}
