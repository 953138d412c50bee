//! GitHub REST v3 backend.
//!
//! Owners may be organizations or users; [`GitHubBackend::resolve_scope`]
//! probes `/orgs/{owner}` first and falls back to `/users/{owner}`. Files are
//! listed with one recursive tree call per repository and read through the
//! contents API (base64 payloads).

use super::http::ApiClient;
use super::{FileContent, FileEntry, OwnerScope, RepositoryPage, SourceBackend, PAGE_SIZE};
use crate::classify::RawFailure;
use crate::types::{Platform, Repository, Visibility};
use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub backend.
#[derive(Debug, Clone)]
pub struct GitHubBackend {
    client: ApiClient,
}

impl GitHubBackend {
    /// Create a backend for `api_url` (e.g. `https://api.github.com` or a GHES `/api/v3` URL).
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` without a token, `ConfigValue` for a malformed URL or token.
    pub fn new(api_url: &str, token: Option<&str>) -> crate::Result<Self> {
        let token = token.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            crate::err!(ConfigMissing {
                key: "platforms.github.token".to_string(),
            })
        })?;
        let client = ApiClient::new(
            api_url,
            "authorization",
            &format!("token {}", token.trim()),
            "platforms.github",
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceBackend for GitHubBackend {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    async fn resolve_scope(&self, owner: &str) -> Result<OwnerScope, RawFailure> {
        let org: Option<serde_json::Value> = self
            .client
            .get_optional_json(self.client.endpoint(&["orgs", owner], &[])?)
            .await?;
        if org.is_some() {
            tracing::debug!(owner, "Resolved GitHub owner as organization");
            return Ok(OwnerScope::Organization);
        }

        let user: Option<serde_json::Value> = self
            .client
            .get_optional_json(self.client.endpoint(&["users", owner], &[])?)
            .await?;
        if user.is_some() {
            tracing::debug!(owner, "Resolved GitHub owner as user");
            return Ok(OwnerScope::User);
        }

        Err(RawFailure::Http {
            status: 404,
            message: format!("GitHub owner '{owner}' is neither an organization nor a user"),
        })
    }

    async fn list_repository_page(
        &self,
        owner: &str,
        scope: &OwnerScope,
        page: u32,
    ) -> Result<RepositoryPage, RawFailure> {
        let page = page.to_string();
        let per_page = PAGE_SIZE.to_string();
        let url = match scope {
            OwnerScope::User => self.client.endpoint(
                &["users", owner, "repos"],
                &[("type", "owner"), ("per_page", per_page.as_str()), ("page", page.as_str())],
            )?,
            _ => self.client.endpoint(
                &["orgs", owner, "repos"],
                &[("type", "all"), ("per_page", per_page.as_str()), ("page", page.as_str())],
            )?,
        };

        let repos: Vec<GitHubRepository> = self.client.get_json(url).await?;
        let has_more = repos.len() == PAGE_SIZE;
        Ok(RepositoryPage {
            repositories: repos.into_iter().map(Repository::from).collect(),
            has_more,
        })
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, RawFailure> {
        let repo: Option<GitHubRepository> = self
            .client
            .get_optional_json(self.client.endpoint(&["repos", owner, name], &[])?)
            .await?;
        Ok(repo.map(Repository::from))
    }

    async fn list_files(&self, repository: &Repository) -> Result<Vec<FileEntry>, RawFailure> {
        let Some(branch) = repository.default_branch.as_deref() else {
            tracing::debug!(repository = %repository.full_name, "Repository has no default branch");
            return Ok(Vec::new());
        };
        let url = self.client.endpoint(
            &[
                "repos",
                repository.owner.as_str(),
                repository.name.as_str(),
                "git",
                "trees",
                branch,
            ],
            &[("recursive", "1")],
        )?;

        let tree: GitHubTree = match self.client.get_json(url).await {
            Ok(tree) => tree,
            // Empty repositories have no tree yet.
            Err(RawFailure::Http { status: 409, .. }) => {
                tracing::debug!(repository = %repository.full_name, "Repository is empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if tree.truncated {
            tracing::warn!(
                repository = %repository.full_name,
                entries = tree.tree.len(),
                "GitHub truncated the recursive tree listing; some files will be missed"
            );
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| FileEntry {
                path: e.path,
                size: e.size,
                sha: Some(e.sha),
            })
            .collect())
    }

    async fn read_file(
        &self,
        repository: &Repository,
        entry: &FileEntry,
    ) -> Result<FileContent, RawFailure> {
        let mut segments = vec!["repos", repository.owner.as_str(), repository.name.as_str(), "contents"];
        segments.extend(entry.path.split('/'));
        let url = self
            .client
            .endpoint(&segments, &[("ref", repository.branch())])?;

        let contents: GitHubContents = self.client.get_json(url).await?;
        let content = decode_contents(&contents)?;
        let url = contents.html_url.unwrap_or_else(|| {
            format!(
                "{}/blob/{}/{}",
                repository.url,
                repository.branch(),
                entry.path
            )
        });
        Ok(FileContent { content, url })
    }
}

fn decode_contents(contents: &GitHubContents) -> Result<String, RawFailure> {
    if contents.encoding.as_deref() != Some("base64") {
        return Err(RawFailure::Decode(format!(
            "unsupported content encoding {:?} for {}",
            contents.encoding, contents.path
        )));
    }
    let packed: String = contents
        .content
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| RawFailure::Decode(format!("invalid base64 in {}: {e}", contents.path)))?;
    String::from_utf8(bytes)
        .map_err(|e| RawFailure::Decode(format!("{} is not valid UTF-8: {e}", contents.path)))
}

/// GitHub repository API response structure.
#[derive(Debug, Deserialize)]
struct GitHubRepository {
    name: String,
    full_name: String,
    owner: GitHubOwner,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    visibility: Option<String>,
    html_url: String,
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubOwner {
    login: String,
}

impl From<GitHubRepository> for Repository {
    fn from(r: GitHubRepository) -> Self {
        let visibility = r
            .visibility
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(if r.private {
                Visibility::Private
            } else {
                Visibility::Public
            });
        Self {
            owner: r.owner.login,
            name: r.name,
            full_name: r.full_name,
            default_branch: r.default_branch,
            archived: r.archived,
            visibility,
            url: r.html_url,
            clone_url: r.clone_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubTree {
    tree: Vec<GitHubTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GitHubContents {
    path: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}
