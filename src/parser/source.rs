//! Module source classification and version/name derivation.
//!
//! Everything here is a pure function of the source string (plus, for
//! versions, the optional explicit `version` attribute and, for names, the
//! file path), so re-parsing the same text always gives the same answer.
//!
//! # Source Types (first match wins)
//!
//! 1. **Local**: `./path`, `../path` or `/abs/path`
//! 2. **Artifactory**: an Artifactory / JFrog host (the path is not
//!    consulted), unless archive-suffixed
//! 3. **Archive**: `.tar.gz` or `.zip` (query string ignored)
//! 4. **Registry**: `namespace/name/provider`, a public registry host,
//!    `tfr://`, or `host/namespace/name/provider` on a non-git host
//! 5. **Git**: `git::` / `git@` prefix or a known git host
//! 6. **Unknown**

use crate::types::SourceType;
use regex::Regex;
use std::sync::LazyLock;

/// Prefixes that mark a local path. Kept literal: `.\` or bare relative
/// directories are not treated as local.
const LOCAL_PREFIXES: &[&str] = &["./", "../", "/"];

const ARTIFACTORY_MARKERS: &[&str] = &["artifactory", "jfrog.io"];

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".zip"];

const REGISTRY_HOSTS: &[&str] = &[
    "registry.terraform.io",
    "registry.opentofu.org",
    "app.terraform.io",
];

/// Terragrunt's shorthand for registry modules (`tfr:///ns/name/provider`).
const TERRAGRUNT_REGISTRY_SCHEME: &str = "tfr://";

const GIT_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "dev.azure.com",
    "visualstudio.com",
];

/// Suffixes stripped from a derived module name.
const NAME_SUFFIXES: &[&str] = &[".git", ".tar.gz", ".zip"];

static REGISTRY_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("Invalid regex"));

static VERSION_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]version=([^&#]+)").expect("Invalid regex"));

static REF_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]ref=([^&#]+)").expect("Invalid regex"));

/// Classify a module source string.
///
/// # Examples
///
/// ```rust
/// use modscout::parser::classify_source;
/// use modscout::types::SourceType;
///
/// assert_eq!(classify_source("./modules/vpc"), SourceType::Local);
/// assert_eq!(classify_source("hashicorp/consul/aws"), SourceType::Registry);
/// assert_eq!(classify_source("git::https://example.com/vpc.git?ref=v1"), SourceType::Git);
/// ```
#[must_use]
pub fn classify_source(source: &str) -> SourceType {
    let source = source.trim();
    let lower = source.to_lowercase();

    if is_local_path(source) {
        SourceType::Local
    } else if is_artifactory_host(source_host(&lower)) && !is_archive(&lower) {
        SourceType::Artifactory
    } else if is_archive(&lower) {
        SourceType::Archive
    } else if is_registry(&lower) {
        SourceType::Registry
    } else if is_git(&lower) {
        SourceType::Git
    } else {
        SourceType::Unknown
    }
}

/// Check if a source is a local path.
#[must_use]
pub fn is_local_path(source: &str) -> bool {
    LOCAL_PREFIXES.iter().any(|p| source.starts_with(p))
}

fn is_artifactory_host(host: &str) -> bool {
    ARTIFACTORY_MARKERS.iter().any(|m| host.contains(m))
}

/// Host of a source address, with any forced getter (`git::`), scheme,
/// `user@` and port removed. For a registry shorthand this is the namespace.
fn source_host(lower: &str) -> &str {
    let address = lower.split_once("::").map_or(lower, |(_, rest)| rest);
    let address = address.split_once("://").map_or(address, |(_, rest)| rest);
    let authority = address.split(['/', '?']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    authority.split(':').next().unwrap_or_default()
}

fn is_archive(lower: &str) -> bool {
    let address = strip_subdir(strip_query(lower));
    ARCHIVE_SUFFIXES.iter().any(|s| address.ends_with(s))
}

fn is_registry(lower: &str) -> bool {
    if lower.starts_with(TERRAGRUNT_REGISTRY_SCHEME) || REGISTRY_HOSTS.iter().any(|h| lower.contains(h)) {
        return true;
    }
    let address = strip_subdir(strip_query(lower));
    if address.contains("::") || address.contains("://") || address.starts_with("git@") {
        return false;
    }

    let segments: Vec<&str> = address.split('/').collect();
    match segments.as_slice() {
        [namespace, name, provider] => [namespace, name, provider]
            .iter()
            .all(|s| REGISTRY_SEGMENT.is_match(s)),
        [host, namespace, name, provider] => {
            host.contains('.')
                && !GIT_HOSTS.iter().any(|g| host.ends_with(g))
                && [namespace, name, provider]
                    .iter()
                    .all(|s| REGISTRY_SEGMENT.is_match(s))
        }
        _ => false,
    }
}

fn is_git(lower: &str) -> bool {
    lower.starts_with("git::") || lower.starts_with("git@") || GIT_HOSTS.iter().any(|h| lower.contains(h))
}

/// The part of a source before any `?query`.
fn strip_query(source: &str) -> &str {
    source.split_once('?').map_or(source, |(address, _)| address)
}

/// Byte offset of the last `//` that is not part of a `scheme://`.
fn subdir_separator(source: &str) -> Option<usize> {
    source
        .match_indices("//")
        .map(|(i, _)| i)
        .filter(|&i| i == 0 || source.as_bytes()[i - 1] != b':')
        .last()
}

/// The part of a source before its `//subdir` (scheme `://` excluded).
fn strip_subdir(source: &str) -> &str {
    subdir_separator(source).map_or(source, |i| &source[..i])
}

/// Extract the version a module is pinned to.
///
/// Precedence: explicit `version` attribute, `version=` query parameter,
/// `ref=` query parameter. A `//subdir` trailing a query value is cut off.
///
/// # Examples
///
/// ```rust
/// use modscout::parser::extract_version;
///
/// assert_eq!(extract_version("hashicorp/consul/aws", Some("0.1.0")).as_deref(), Some("0.1.0"));
/// assert_eq!(extract_version("git::https://example.com/vpc.git?ref=v1.2.0", None).as_deref(), Some("v1.2.0"));
/// assert_eq!(extract_version("./modules/vpc", None), None);
/// ```
#[must_use]
pub fn extract_version(source: &str, explicit: Option<&str>) -> Option<String> {
    if let Some(version) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return Some(version.to_string());
    }
    [&*VERSION_PARAM, &*REF_PARAM].iter().find_map(|re| {
        re.captures(source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().split("//").next().unwrap_or_default().trim())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    })
}

/// Derive a name for a Terragrunt `terraform { source = ... }` block.
///
/// In order: the directory holding `terragrunt.hcl`; the last segment after
/// the final `//` of the source; the last path segment of the source before
/// `?`; `unknown`.
#[must_use]
pub fn derive_terragrunt_name(file_path: &str, source: &str) -> String {
    if let Some(dir) = file_path
        .strip_suffix("/terragrunt.hcl")
        .and_then(|parent| parent.rsplit('/').next())
        .filter(|d| !d.is_empty())
    {
        return dir.to_string();
    }

    let address = strip_query(source.trim());
    if let Some(i) = subdir_separator(address) {
        if let Some(name) = last_segment(&address[i + 2..]) {
            return name;
        }
    }
    if let Some(name) = last_segment(address) {
        return name;
    }
    "unknown".to_string()
}

fn last_segment(path: &str) -> Option<String> {
    let segment = path
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or_default();
    let segment = NAME_SUFFIXES
        .iter()
        .find_map(|s| segment.strip_suffix(s))
        .unwrap_or(segment);
    (!segment.is_empty() && segment != "." && segment != "..").then(|| segment.to_string())
}
