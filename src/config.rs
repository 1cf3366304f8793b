// Run configuration: CLI flags with environment fallback, resolved into an
// explicit struct handed to the orchestrator

use std::path::PathBuf;

use anyhow::{bail, Result};

pub const DEFAULT_LEDGER_PATH: &str = "backed_up_images.txt";
pub const DEFAULT_TAGS_PER_REPO: usize = 5;
pub const DEFAULT_CONTAINER_CLI: &str = "docker";

/// Read an environment variable, treating empty strings as unset.
pub(crate) fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .and_then(|v| if v.is_empty() { None } else { Some(v) })
}

/// Everything one mirror run needs, resolved up front. No process-wide
/// mutable state: the orchestrator receives this struct at construction.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Target registry hostname, e.g. `registry.example.com`.
    pub target_registry: String,
    /// Namespace on the target registry that mirrored images land in.
    pub target_namespace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Append-only ledger of already-mirrored repository:tag pairs.
    pub ledger_path: PathBuf,
    /// How many recent tags to fetch per tag-listing source.
    pub tags_per_repo: usize,
    pub container_cli: String,
    pub skip_login: bool,
    /// Comma-separated repository URLs to discover tags from.
    pub source_urls: Option<String>,
    /// File of image expressions, one per line.
    pub images_file: Option<PathBuf>,
}

impl MirrorConfig {
    /// Validate the resolved configuration. Missing required settings are
    /// fatal before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.target_registry.is_empty() {
            bail!("Target registry is required (--registry or TARGET_REGISTRY)");
        }
        if self.target_namespace.is_empty() {
            bail!("Target namespace is required (--namespace or TARGET_NAMESPACE)");
        }
        if !self.skip_login && (self.username.is_none() || self.password.is_none()) {
            bail!(
                "Registry credentials are required (--username/--password or \
                 REGISTRY_USERNAME/REGISTRY_PASSWORD); pass --skip-login to use \
                 an existing login"
            );
        }
        if self.source_urls.is_none() && self.images_file.is_none() {
            bail!("No sources configured: pass --source-urls and/or --images-file");
        }
        if self.tags_per_repo == 0 {
            bail!("--tags-per-repo must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> MirrorConfig {
        MirrorConfig {
            target_registry: "registry.example.com".to_string(),
            target_namespace: "mirror".to_string(),
            username: Some("bot".to_string()),
            password: Some("hunter2".to_string()),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            tags_per_repo: DEFAULT_TAGS_PER_REPO,
            container_cli: DEFAULT_CONTAINER_CLI.to_string(),
            skip_login: false,
            source_urls: Some("https://hub.docker.com/_/nginx".to_string()),
            images_file: None,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_registry_is_fatal() {
        let mut config = base_config();
        config.target_registry = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_fatal_unless_skip_login() {
        let mut config = base_config();
        config.password = None;
        assert!(config.validate().is_err());
        config.skip_login = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_sources_is_fatal() {
        let mut config = base_config();
        config.source_urls = None;
        config.images_file = None;
        assert!(config.validate().is_err());
    }
}
