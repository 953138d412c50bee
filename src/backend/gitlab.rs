//! GitLab REST v4 backend.
//!
//! Owners are groups (subgroups included) or users. Project paths are sent as
//! URL-encoded ids (`group%2Fsub%2Fproject`), the form GitLab expects.

use super::http::ApiClient;
use super::{FileContent, FileEntry, OwnerScope, RepositoryPage, SourceBackend, PAGE_SIZE};
use crate::classify::RawFailure;
use crate::types::{Platform, Repository, Visibility};
use async_trait::async_trait;
use serde::Deserialize;

/// Default gitlab.com API endpoint.
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

/// GitLab backend.
#[derive(Debug, Clone)]
pub struct GitLabBackend {
    client: ApiClient,
}

impl GitLabBackend {
    /// Create a backend for `api_url` (e.g. `https://gitlab.com/api/v4`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` without a token, `ConfigValue` for a malformed URL or token.
    pub fn new(api_url: &str, token: Option<&str>) -> crate::Result<Self> {
        let token = token.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            crate::err!(ConfigMissing {
                key: "platforms.gitlab.token".to_string(),
            })
        })?;
        let client = ApiClient::new(api_url, "private-token", token.trim(), "platforms.gitlab")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceBackend for GitLabBackend {
    fn platform(&self) -> Platform {
        Platform::GitLab
    }

    async fn resolve_scope(&self, owner: &str) -> Result<OwnerScope, RawFailure> {
        let group: Option<serde_json::Value> = self
            .client
            .get_optional_json(self.client.endpoint(&["groups", owner], &[])?)
            .await?;
        if group.is_some() {
            tracing::debug!(owner, "Resolved GitLab owner as group");
            return Ok(OwnerScope::Organization);
        }

        let users: Vec<serde_json::Value> = self
            .client
            .get_json(self.client.endpoint(&["users"], &[("username", owner)])?)
            .await?;
        if !users.is_empty() {
            tracing::debug!(owner, "Resolved GitLab owner as user");
            return Ok(OwnerScope::User);
        }

        Err(RawFailure::Http {
            status: 404,
            message: format!("GitLab owner '{owner}' is neither a group nor a user"),
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
                &["users", owner, "projects"],
                &[("per_page", per_page.as_str()), ("page", page.as_str())],
            )?,
            _ => self.client.endpoint(
                &["groups", owner, "projects"],
                &[
                    ("include_subgroups", "true"),
                    ("per_page", per_page.as_str()),
                    ("page", page.as_str()),
                ],
            )?,
        };

        let projects: Vec<GitLabProject> = self.client.get_json(url).await?;
        let has_more = projects.len() == PAGE_SIZE;
        Ok(RepositoryPage {
            repositories: projects.into_iter().map(Repository::from).collect(),
            has_more,
        })
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, RawFailure> {
        let id = format!("{owner}/{name}");
        let project: Option<GitLabProject> = self
            .client
            .get_optional_json(self.client.endpoint(&["projects", id.as_str()], &[])?)
            .await?;
        Ok(project.map(Repository::from))
    }

    async fn list_files(&self, repository: &Repository) -> Result<Vec<FileEntry>, RawFailure> {
        let Some(branch) = repository.default_branch.as_deref() else {
            tracing::debug!(repository = %repository.full_name, "Project has no default branch");
            return Ok(Vec::new());
        };
        let per_page = PAGE_SIZE.to_string();
        let mut entries = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_str = page.to_string();
            let url = self.client.endpoint(
                &["projects", repository.full_name.as_str(), "repository", "tree"],
                &[
                    ("recursive", "true"),
                    ("ref", branch),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ],
            )?;
            let batch: Vec<GitLabTreeEntry> = match self.client.get_json(url).await {
                Ok(batch) => batch,
                // No tree for the ref yet: the project is empty.
                Err(RawFailure::Http { status: 404, .. }) if page == 1 => {
                    tracing::debug!(repository = %repository.full_name, branch, "Project has no tree");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };
            let batch_len = batch.len();
            entries.extend(batch.into_iter().filter(|e| e.kind == "blob").map(|e| FileEntry {
                path: e.path,
                size: None,
                sha: Some(e.id),
            }));

            if batch_len < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            repository = %repository.full_name,
            pages = page,
            files = entries.len(),
            "Listed GitLab repository tree"
        );
        Ok(entries)
    }

    async fn read_file(
        &self,
        repository: &Repository,
        entry: &FileEntry,
    ) -> Result<FileContent, RawFailure> {
        let url = self.client.endpoint(
            &[
                "projects",
                repository.full_name.as_str(),
                "repository",
                "files",
                entry.path.as_str(),
                "raw",
            ],
            &[("ref", repository.branch())],
        )?;
        let content = self.client.get_text(url).await?;
        Ok(FileContent {
            content,
            url: format!(
                "{}/-/blob/{}/{}",
                repository.url,
                repository.branch(),
                entry.path
            ),
        })
    }
}

/// GitLab project API response structure.
#[derive(Debug, Deserialize)]
struct GitLabProject {
    path: String,
    path_with_namespace: String,
    namespace: GitLabNamespace,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    visibility: Option<String>,
    web_url: String,
    http_url_to_repo: String,
}

#[derive(Debug, Deserialize)]
struct GitLabNamespace {
    full_path: String,
}

impl From<GitLabProject> for Repository {
    fn from(p: GitLabProject) -> Self {
        Self {
            owner: p.namespace.full_path,
            name: p.path,
            full_name: p.path_with_namespace,
            default_branch: p.default_branch,
            archived: p.archived,
            visibility: p
                .visibility
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Visibility::Private),
            url: p.web_url,
            clone_url: p.http_url_to_repo,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabTreeEntry {
    id: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project_json(namespace: &str, name: &str, archived: bool) -> serde_json::Value {
        json!({
            "id": 7,
            "name": name,
            "path": name,
            "path_with_namespace": format!("{namespace}/{name}"),
            "namespace": { "full_path": namespace },
            "default_branch": "main",
            "archived": archived,
            "visibility": "internal",
            "web_url": format!("https://gitlab.com/{namespace}/{name}"),
            "http_url_to_repo": format!("https://gitlab.com/{namespace}/{name}.git"),
        })
    }

    fn project(namespace: &str, name: &str) -> Repository {
        Repository::from(serde_json::from_value::<GitLabProject>(project_json(namespace, name, false)).unwrap())
    }

    fn backend(server: &MockServer) -> GitLabBackend {
        GitLabBackend::new(&server.uri(), Some("glpat-test")).unwrap()
    }

    #[test]
    fn test_requires_token() {
        let err = GitLabBackend::new(DEFAULT_API_URL, None).unwrap_err();
        assert!(err.to_string().contains("platforms.gitlab.token"));
    }

    #[tokio::test]
    async fn test_resolve_scope_group_then_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/platform"))
            .and(header("private-token", "glpat-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/groups/jdoe"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("username", "jdoe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 3, "username": "jdoe"}])))
            .mount(&server)
            .await;

        let b = backend(&server);
        assert_eq!(b.resolve_scope("platform").await.unwrap(), OwnerScope::Organization);
        assert_eq!(b.resolve_scope("jdoe").await.unwrap(), OwnerScope::User);
    }

    #[tokio::test]
    async fn test_list_group_projects_includes_subgroups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/platform/projects"))
            .and(query_param("include_subgroups", "true"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                project_json("platform/networking", "vpc", false),
            ])))
            .mount(&server)
            .await;

        let page = backend(&server)
            .list_repository_page("platform", &OwnerScope::Organization, 2)
            .await
            .unwrap();
        assert!(!page.has_more);
        let repo = &page.repositories[0];
        assert_eq!(repo.full_name, "platform/networking/vpc");
        assert_eq!(repo.owner, "platform/networking");
        assert_eq!(repo.visibility, Visibility::Internal);
    }

    #[tokio::test]
    async fn test_list_files_follows_pages() {
        let server = MockServer::start().await;
        let full_page: Vec<serde_json::Value> = (0..PAGE_SIZE)
            .map(|i| json!({"id": format!("b{i}"), "path": format!("envs/e{i}/main.tf"), "type": "blob"}))
            .collect();
        Mock::given(method("GET"))
            .and(path_regex(r"^/projects/platform%2Fnetworking%2Fvpc/repository/tree$"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/projects/platform%2Fnetworking%2Fvpc/repository/tree$"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "t1", "path": "envs", "type": "tree"},
                {"id": "last", "path": "terragrunt.hcl", "type": "blob"},
            ])))
            .mount(&server)
            .await;

        let files = backend(&server)
            .list_files(&project("platform/networking", "vpc"))
            .await
            .unwrap();
        assert_eq!(files.len(), PAGE_SIZE + 1);
        assert_eq!(files.last().map(|f| f.path.as_str()), Some("terragrunt.hcl"));
    }

    #[tokio::test]
    async fn test_empty_project_has_no_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/projects/platform%2Fscratch/repository/tree$"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Tree Not Found"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut json = project_json("platform", "scratch", false);
        json["default_branch"] = serde_json::Value::Null;
        let branchless = Repository::from(serde_json::from_value::<GitLabProject>(json).unwrap());
        assert_eq!(branchless.default_branch, None);

        let b = backend(&server);
        assert!(b.list_files(&branchless).await.unwrap().is_empty());
        // A branch that has no tree yet lists as empty too.
        assert!(b.list_files(&project("platform", "scratch")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_file_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/projects/platform%2Fvpc/repository/files/live%2Fterragrunt\.hcl/raw$"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_string("terraform {\n  source = \"../modules//vpc\"\n}\n"))
            .mount(&server)
            .await;

        let entry = FileEntry {
            path: "live/terragrunt.hcl".to_string(),
            size: None,
            sha: None,
        };
        let file = backend(&server)
            .read_file(&project("platform", "vpc"), &entry)
            .await
            .unwrap();
        assert!(file.content.contains("../modules//vpc"));
        assert_eq!(file.url, "https://gitlab.com/platform/vpc/-/blob/main/live/terragrunt.hcl");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let b = backend(&server);
        let raw = b.get_repository("platform", "vpc").await.unwrap_err();
        let env = b.classify_error(raw);
        assert_eq!(env.kind, crate::classify::ErrorKind::PlatformError);
        assert!(env.retryable);
        assert_eq!(env.http_status, Some(502));
    }
}
