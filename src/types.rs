//! Core data types used throughout ModScout.
//!
//! This module defines the fundamental data structures for representing:
//! - Repositories discovered on a platform or on disk
//! - IaC files fetched from those repositories
//! - Module declarations extracted from file text
//! - Repository and file filters applied during discovery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Platforms a repository can be discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// GitHub (github.com or Enterprise)
    GitHub,
    /// GitLab (gitlab.com or self-managed)
    GitLab,
    /// Local filesystem
    Local,
}

impl Platform {
    /// Get the platform name as a string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" | "gh" => Ok(Self::GitHub),
            "gitlab" | "gl" => Ok(Self::GitLab),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}

/// Repository visibility as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "internal" => Ok(Self::Internal),
            _ => Err(format!("Unknown visibility: {s}")),
        }
    }
}

/// A repository as fetched from a backend.
///
/// `full_name` is the identity key within a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    /// `owner/name` for hosted platforms, the directory name for local trees
    pub full_name: String,
    /// `None` for a repository without any commits
    pub default_branch: Option<String>,
    pub archived: bool,
    pub visibility: Visibility,
    /// Canonical browser URL
    pub url: String,
    pub clone_url: String,
}

impl Repository {
    /// Ref used when reading files: the default branch, else `HEAD`.
    #[must_use]
    pub fn branch(&self) -> &str {
        self.default_branch.as_deref().unwrap_or("HEAD")
    }
}

/// The IaC dialect of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IacKind {
    Terraform,
    Terragrunt,
}

impl IacKind {
    /// Detect the kind of a file from its path.
    ///
    /// `terragrunt.hcl` is Terragrunt, `*.tf` is Terraform, anything else is
    /// not an IaC file.
    #[must_use]
    pub fn detect(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        if file_name == "terragrunt.hcl" {
            Some(Self::Terragrunt)
        } else if file_name.ends_with(".tf") {
            Some(Self::Terraform)
        } else {
            None
        }
    }

    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![Self::Terraform, Self::Terragrunt]
    }
}

impl fmt::Display for IacKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terraform => write!(f, "terraform"),
            Self::Terragrunt => write!(f, "terragrunt"),
        }
    }
}

impl FromStr for IacKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terraform" | "tf" => Ok(Self::Terraform),
            "terragrunt" | "tg" => Ok(Self::Terragrunt),
            _ => Err(format!("Unknown IaC kind: {s}")),
        }
    }
}

/// A fetched IaC file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IacFile {
    pub kind: IacKind,
    /// `full_name` of the owning repository
    pub repository: String,
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub content: String,
    /// Browser URL of the file
    pub url: String,
    pub sha: Option<String>,
    pub size: Option<u64>,
}

/// Where a module's code originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Registry,
    Git,
    Archive,
    Artifactory,
    Unknown,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Registry => "registry",
            Self::Git => "git",
            Self::Archive => "archive",
            Self::Artifactory => "artifactory",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A module declaration extracted from an IaC file.
///
/// `source_type` and `version` depend only on the source string and the
/// optional explicit `version` attribute.
///
/// # Example HCL
///
/// ```hcl
/// module "vpc" {
///   source  = "terraform-aws-modules/vpc/aws"
///   version = "5.1.0"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Block label for Terraform, derived name for Terragrunt
    pub name: String,
    pub source: String,
    pub source_type: SourceType,
    pub version: Option<String>,
    pub repository: String,
    pub file_path: String,
    pub file_url: String,
    /// 1-indexed line of the block start
    pub line_number: usize,
    pub kind: IacKind,
}

/// Filters applied while listing repositories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryFilter {
    /// Stop listing once this many repositories were accepted
    pub max_repositories: Option<usize>,
    pub skip_archived: bool,
    /// Regular expression matched against the repository name
    pub name_pattern: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Filters applied to the file tree of each repository.
///
/// Exclude patterns are evaluated before include patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub kinds: Vec<IacKind>,
    pub max_files: Option<usize>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            kinds: IacKind::all(),
            max_files: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Repository and file filters for one discovery run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryFilter {
    pub repositories: RepositoryFilter,
    pub files: DiscoveryOptions,
}

/// Result of looking up one named repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Available,
    /// The platform reported the repository as absent
    Missing,
    /// The repository exists but the active filter excludes it (e.g. archived)
    Excluded,
}

/// A repository whose file discovery failed.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryFailure {
    pub repository: String,
    pub error: crate::classify::ErrorEnvelope,
}

/// Outcome of a discovery run across all repositories of an owner.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub repositories: Vec<Repository>,
    pub files: Vec<IacFile>,
    pub repositories_scanned: usize,
    pub repositories_failed: usize,
    pub failures: Vec<RepositoryFailure>,
}

impl DiscoveryReport {
    /// True when some repositories failed, as opposed to simply containing no IaC files.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.repositories_failed > 0
    }
}

/// Per-source entry of a module summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub count: usize,
    /// Version histogram; unversioned usages are not counted here
    pub versions: BTreeMap<String, usize>,
}

/// Per-normalized-source entry, keeping the classification of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedSourceSummary {
    pub source_type: SourceType,
    pub count: usize,
    pub versions: BTreeMap<String, usize>,
}

/// Counters describing an audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub repositories_scanned: usize,
    pub repositories_failed: usize,
    pub files_scanned: usize,
    pub modules_found: usize,
}

/// The full output of an audit: sorted modules plus both summaries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub platform: Platform,
    pub owner: String,
    pub modules: Vec<Module>,
    pub summary: BTreeMap<String, SourceSummary>,
    pub normalized_summary: BTreeMap<String, NormalizedSourceSummary>,
    pub stats: AuditStats,
    pub failures: Vec<RepositoryFailure>,
    pub generated_at: DateTime<Utc>,
}
