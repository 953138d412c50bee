//! # ModScout
//!
//! An Infrastructure-as-Code module usage auditor.
//!
//! ModScout lists the repositories of a GitHub organization or user, a GitLab
//! group or user, or a single local directory, fetches every Terraform and
//! Terragrunt file, extracts each module declaration and summarizes which
//! sources and versions are in use.
//!
//! ## Features
//!
//! - **Multi-backend discovery**: GitHub, GitLab and the local filesystem share
//!   one orchestrator with bounded concurrency, retry and caching
//! - **Partial failure tolerance**: a failing repository or file degrades the
//!   result instead of aborting the run
//! - **Uniform error classification**: every backend failure becomes an
//!   [`classify::ErrorEnvelope`]
//! - **Module extraction**: source type, version and name derivation from raw
//!   Terraform / Terragrunt text
//! - **Summaries**: per-source and per-normalized-source version histograms
//!
//! ## Example
//!
//! ```rust,no_run
//! use modscout::{Auditor, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auditor = Auditor::new(Config::default());
//!
//!     // Audit a local directory
//!     let report = auditor.audit_path("./terraform").await?;
//!
//!     println!("Found {} modules", report.modules.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]

pub mod backend;
pub mod classify;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod discovery;
pub mod error;
pub mod parser;
pub mod retry;
pub mod summary;
pub mod types;

// Re-export commonly used types at crate root
pub use classify::{ErrorEnvelope, ErrorKind};
pub use config::Config;
pub use discovery::Discovery;
pub use error::{AuditError, Result};
pub use types::{AuditReport, IacFile, IacKind, Module, Platform, Repository, SourceType};

use backend::{GitHubBackend, GitLabBackend, LocalBackend, SourceBackend, GITHUB_API_URL, GITLAB_API_URL};
use parser::ModuleExtractor;
use std::path::Path;
use types::{AuditStats, DiscoveryReport};

/// Main audit orchestrator that wires discovery, extraction and summary.
///
/// The `Auditor` is the primary entry point for using ModScout as a library.
/// Each `audit_*` call builds a fresh backend and [`Discovery`], so caches
/// never outlive one run.
///
/// # Example
///
/// ```rust,no_run
/// use modscout::{Auditor, Config};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut config = Config::default();
///     config.load_tokens_from_env();
///
///     let report = Auditor::new(config).audit_github("acme").await?;
///     for (source, entry) in &report.summary {
///         println!("{source}: {}", entry.count);
///     }
///     Ok(())
/// }
/// ```
pub struct Auditor {
    config: Config,
    extractor: ModuleExtractor,
}

impl Auditor {
    /// Create a new auditor with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            extractor: ModuleExtractor::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Audit every repository of a GitHub organization or user.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No GitHub token is configured
    /// - The owner is invalid or cannot be resolved
    /// - Listing repositories fails after retries
    pub async fn audit_github(&self, owner: &str) -> Result<AuditReport> {
        let settings = &self.config.platforms.github;
        let backend = GitHubBackend::new(
            settings.api_url.as_deref().unwrap_or(GITHUB_API_URL),
            settings.token.as_deref(),
        )?;
        self.audit_with(backend, owner).await
    }

    /// Audit every project of a GitLab group (including subgroups) or user.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No GitLab token is configured
    /// - The group is invalid or cannot be resolved
    /// - Listing projects fails after retries
    pub async fn audit_gitlab(&self, group: &str) -> Result<AuditReport> {
        let settings = &self.config.platforms.gitlab;
        let backend = GitLabBackend::new(
            settings.api_url.as_deref().unwrap_or(GITLAB_API_URL),
            settings.token.as_deref(),
        )?;
        self.audit_with(backend, group).await
    }

    /// Audit a local directory tree as a single repository.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::DirectoryNotFound`] if the path is not a
    /// readable directory.
    pub async fn audit_path<P: AsRef<Path>>(&self, path: P) -> Result<AuditReport> {
        let backend = LocalBackend::new(self.config.discovery.max_depth);
        let owner = path.as_ref().display().to_string();
        self.audit_with(backend, &owner).await
    }

    /// Audit an owner through any backend.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails before any repository was
    /// processed (invalid owner, bad filter, listing failure).
    pub async fn audit_with<B: SourceBackend>(&self, backend: B, owner: &str) -> Result<AuditReport> {
        let platform = backend.platform();
        tracing::info!(platform = %platform, owner = %owner, "Starting audit");

        let discovery = Discovery::new(backend, self.config.discovery_settings());
        let report = discovery.discover(owner, &self.config.filter()).await?;
        Ok(self.build_report(platform, owner, report))
    }

    /// Extract, sort and summarize the files of a discovery run.
    #[must_use]
    pub fn build_report(&self, platform: Platform, owner: &str, report: DiscoveryReport) -> AuditReport {
        let extracted = self.extractor.extract(&report.files);
        let modules = summary::sort_modules_by_source(&extracted);

        let stats = AuditStats {
            repositories_scanned: report.repositories_scanned,
            repositories_failed: report.repositories_failed,
            files_scanned: report.files.len(),
            modules_found: modules.len(),
        };
        tracing::info!(
            platform = %platform,
            owner = %owner,
            repositories = stats.repositories_scanned,
            failed = stats.repositories_failed,
            files = stats.files_scanned,
            modules = stats.modules_found,
            "Audit complete"
        );

        AuditReport {
            platform,
            owner: owner.to_string(),
            summary: summary::create_module_summary(&modules),
            normalized_summary: summary::create_normalized_summary(&modules),
            modules,
            stats,
            failures: report.failures,
            generated_at: chrono::Utc::now(),
        }
    }
}
