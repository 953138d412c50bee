//! Configuration module for ModScout.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`modscout.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # modscout.yaml
//!
//! discovery:
//!   repositories:
//!     skip_archived: true
//!     name_pattern: "^terraform-"
//!   files:
//!     exclude_patterns:
//!       - "**/examples/**"
//!   file_concurrency: 10
//!
//! retry:
//!   max_attempts: 3
//!
//! platforms:
//!   github:
//!     token: ${GITHUB_TOKEN}  # Environment variable expansion
//! ```

use crate::discovery::{DiscoverySettings, FileSelector};
use crate::error::{AuditError, Result};
use crate::retry::RetryPolicy;
use crate::types::{DiscoveryFilter, DiscoveryOptions, Platform, RepositoryFilter};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex"));

static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex"));

/// Discovery options: what to list and how much to do at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Filters applied while listing repositories
    pub repositories: RepositoryFilter,

    /// Filters applied to each repository's file tree
    pub files: DiscoveryOptions,

    /// Repositories processed at once; unset uses the backend default
    /// (5 for hosted platforms, 1 for a local directory).
    pub repository_concurrency: Option<usize>,

    /// File reads in flight per repository.
    pub file_concurrency: usize,

    /// Maximum depth for local directory walks.
    pub max_depth: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            repositories: RepositoryFilter::default(),
            files: DiscoveryOptions::default(),
            repository_concurrency: None,
            file_concurrency: 10,
            max_depth: 100,
        }
    }
}

/// Retry options for idempotent backend reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

/// Repository lookup cache options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Connection settings for one hosted platform.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformConfig {
    /// API base URL; unset uses the public SaaS endpoint.
    pub api_url: Option<String>,

    /// Access token
    pub token: Option<String>,
}

/// Hosted platform settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformsConfig {
    pub github: PlatformConfig,
    pub gitlab: PlatformConfig,
}

impl PlatformsConfig {
    /// Fill unset tokens from the environment.
    ///
    /// Priority order per platform:
    /// 1. Value from configuration
    /// 2. `MODSCOUT_<PLATFORM>_TOKEN`
    /// 3. `<PLATFORM>_TOKEN`
    pub fn load_tokens_from_env(&mut self) {
        self.load_tokens_with(|var| std::env::var(var).ok());
    }

    fn load_tokens_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets = [
            (&mut self.github, ["MODSCOUT_GITHUB_TOKEN", "GITHUB_TOKEN"]),
            (&mut self.gitlab, ["MODSCOUT_GITLAB_TOKEN", "GITLAB_TOKEN"]),
        ];
        for (platform, vars) in targets {
            if platform.token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                continue;
            }
            if let Some((var, token)) = vars
                .iter()
                .find_map(|var| lookup(var).filter(|t| !t.is_empty()).map(|t| (*var, t)))
            {
                tracing::debug!(env_var = %var, "Loaded token from environment variable");
                platform.token = Some(token);
            }
        }
    }

    /// Settings for a hosted platform. `None` for [`Platform::Local`].
    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&PlatformConfig> {
        match platform {
            Platform::GitHub => Some(&self.github),
            Platform::GitLab => Some(&self.gitlab),
            Platform::Local => None,
        }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Discovery options
    pub discovery: DiscoveryConfig,

    /// Retry options
    pub retry: RetryConfig,

    /// Cache options
    pub cache: CacheConfig,

    /// Platform connection settings
    pub platforms: PlatformsConfig,
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        let config: Config = serde_yaml::from_str(&expanded).map_err(|e| {
            AuditError::config_parse(e.to_string(), Some(Box::new(e)), file!(), line!())
        })?;

        tracing::debug!(
            skip_archived = config.discovery.repositories.skip_archived,
            exclude_patterns = config.discovery.files.exclude_patterns.len(),
            max_attempts = config.retry.max_attempts,
            cache = config.cache.enabled,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Check every value that is compiled or parsed later (regex, globs,
    /// API URLs), so problems surface before any network call.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if let Some(pattern) = &self.discovery.repositories.name_pattern {
            Regex::new(pattern).map_err(|e| {
                crate::err!(ConfigValue {
                    key: "discovery.repositories.name_pattern".to_string(),
                    message: e.to_string(),
                })
            })?;
        }
        FileSelector::compile(&self.discovery.files)?;

        for platform in [Platform::GitHub, Platform::GitLab] {
            let Some(settings) = self.platforms.get(platform) else {
                continue;
            };
            if let Some(api_url) = &settings.api_url {
                url::Url::parse(api_url).map_err(|e| {
                    crate::err!(ConfigValue {
                        key: format!("platforms.{}.api_url", platform.as_str()),
                        message: e.to_string(),
                    })
                })?;
            }
        }
        Ok(())
    }

    /// The repository and file filters for a discovery run.
    #[must_use]
    pub fn filter(&self) -> DiscoveryFilter {
        DiscoveryFilter {
            repositories: self.discovery.repositories.clone(),
            files: self.discovery.files.clone(),
        }
    }

    /// Orchestrator settings derived from the `discovery`, `retry` and
    /// `cache` sections.
    #[must_use]
    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            retry: RetryPolicy::new(
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            ),
            max_attempts: self.retry.max_attempts,
            repository_concurrency: self.discovery.repository_concurrency,
            file_concurrency: self.discovery.file_concurrency,
            cache_enabled: self.cache.enabled,
        }
    }

    /// Load platform tokens from environment variables.
    /// This should be called after loading config to populate token fields.
    pub fn load_tokens_from_env(&mut self) {
        tracing::debug!("Loading platform tokens from environment variables");
        self.platforms.load_tokens_from_env();
        tracing::debug!(
            github_token_set = self.platforms.github.token.is_some(),
            gitlab_token_set = self.platforms.gitlab.token.is_some(),
            "Platform token loading complete"
        );
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# ModScout Configuration File

# Discovery options
discovery:
  # Filters applied while listing repositories
  repositories:
    # Stop after this many repositories (unset = all)
    # max_repositories: 50

    # Skip archived repositories
    skip_archived: true

    # Regular expression matched against the repository name
    # name_pattern: "^terraform-"

    # Only repositories with this visibility (public, private, internal)
    # visibility: private

  # Filters applied to each repository's file tree
  files:
    # IaC dialects to scan
    kinds:
      - terraform
      - terragrunt

    # Maximum number of files read per repository (unset = all)
    # max_files: 500

    # Glob patterns; a file must match at least one when given
    include_patterns: []

    # Glob patterns evaluated before include patterns
    exclude_patterns:
      - "**/.terraform/**"
      - "**/.terragrunt-cache/**"

  # Repositories processed at once (unset = 5 for platforms, 1 for --path)
  # repository_concurrency: 5

  # File reads in flight per repository
  file_concurrency: 10

  # Maximum depth for local directory walks
  max_depth: 100

# Retry options for backend reads
retry:
  # Total tries including the first
  max_attempts: 3

  # Delay before the second try; doubles for every further try
  base_delay_ms: 1000

  # Upper bound for a single delay
  max_delay_ms: 10000

# Repository lookup cache (one run only)
cache:
  enabled: true

# Platform connection settings
platforms:
  github:
    # GitHub Enterprise: https://github.example.com/api/v3
    api_url: https://api.github.com
    # Falls back to MODSCOUT_GITHUB_TOKEN, then GITHUB_TOKEN
    # token: ${GITHUB_TOKEN}
  gitlab:
    api_url: https://gitlab.com/api/v4
    # Falls back to MODSCOUT_GITLAB_TOKEN, then GITLAB_TOKEN
    # token: ${GITLAB_TOKEN}
"#
        .to_string()
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unknown variables are left as-is.
fn expand_env_vars(content: &str) -> String {
    expand_with(content, |var| std::env::var(var).ok())
}

fn expand_with(content: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
