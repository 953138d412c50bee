//! Module summaries and deterministic ordering.
//!
//! All functions here are synchronous and never mutate their input.

use crate::types::{Module, NormalizedSourceSummary, SourceSummary};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Query parameters that pin a version rather than identify a module.
static PIN_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:ref|version)=").expect("Invalid regex"));

/// Group modules by their exact source string.
///
/// Unversioned modules count towards `count` but not towards the version
/// histogram.
#[must_use]
pub fn create_module_summary(modules: &[Module]) -> BTreeMap<String, SourceSummary> {
    let mut summary: BTreeMap<String, SourceSummary> = BTreeMap::new();
    for module in modules {
        let entry = summary.entry(module.source.clone()).or_default();
        entry.count += 1;
        if let Some(version) = &module.version {
            *entry.versions.entry(version.clone()).or_default() += 1;
        }
    }
    summary
}

/// Strip `ref=` and `version=` query parameters from a source.
///
/// Other parameters and any `//subdir` are kept, so only differently-pinned
/// copies of the same module collapse together.
///
/// # Examples
///
/// ```rust
/// use modscout::summary::normalize_module_source;
///
/// assert_eq!(
///     normalize_module_source("git::https://example.com/vpc.git//modules/a?ref=v1.0.0"),
///     "git::https://example.com/vpc.git//modules/a"
/// );
/// assert_eq!(
///     normalize_module_source("https://example.com/m.zip?archive=zip&version=2"),
///     "https://example.com/m.zip?archive=zip"
/// );
/// ```
#[must_use]
pub fn normalize_module_source(source: &str) -> String {
    let Some((address, query)) = source.split_once('?') else {
        return source.to_string();
    };
    // `?ref=v1//modules/a`: the subdir rides after the query
    let (query, subdir) = query
        .split_once("//")
        .map_or((query, None), |(q, dir)| (q, Some(dir)));
    let kept: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !PIN_PARAM.is_match(p))
        .collect();

    let mut normalized = address.to_string();
    if !kept.is_empty() {
        normalized.push('?');
        normalized.push_str(&kept.join("&"));
    }
    if let Some(dir) = subdir {
        normalized.push_str("//");
        normalized.push_str(dir);
    }
    normalized
}

/// Group modules by normalized source, keeping the source type of the first
/// module seen for each entry.
#[must_use]
pub fn create_normalized_summary(modules: &[Module]) -> BTreeMap<String, NormalizedSourceSummary> {
    let mut summary: BTreeMap<String, NormalizedSourceSummary> = BTreeMap::new();
    for module in modules {
        let entry = summary
            .entry(normalize_module_source(&module.source))
            .or_insert_with(|| NormalizedSourceSummary {
                source_type: module.source_type,
                count: 0,
                versions: BTreeMap::new(),
            });
        entry.count += 1;
        if let Some(version) = &module.version {
            *entry.versions.entry(version.clone()).or_default() += 1;
        }
    }
    summary
}

/// Return a sorted copy: source, then version (versioned first on a tie),
/// then repository, file path, line number.
#[must_use]
pub fn sort_modules_by_source(modules: &[Module]) -> Vec<Module> {
    let mut sorted = modules.to_vec();
    sorted.sort_by(compare_modules);
    sorted
}

fn compare_modules(a: &Module, b: &Module) -> Ordering {
    a.source
        .cmp(&b.source)
        .then_with(|| compare_versions(a.version.as_deref(), b.version.as_deref()))
        .then_with(|| a.repository.cmp(&b.repository))
        .then_with(|| a.file_path.cmp(&b.file_path))
        .then_with(|| a.line_number.cmp(&b.line_number))
}

fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
