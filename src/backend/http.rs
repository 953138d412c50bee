//! Thin HTTP client shared by the hosted backends.

use crate::classify::RawFailure;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Headers platforms use to report an exhausted request quota.
const RATE_LIMIT_REMAINING_HEADERS: &[&str] = &["x-ratelimit-remaining", "ratelimit-remaining"];

/// JSON/text GET client bound to one API base URL and credential.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Build a client for `base_url`, sending `auth_header: auth_value` on every request.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValue` if the base URL or credential is malformed, or
    /// `Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        auth_header: &'static str,
        auth_value: &str,
        config_key: &str,
    ) -> crate::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            crate::err!(ConfigValue {
                key: format!("{config_key}.api_url"),
                message: format!("invalid URL '{base_url}': {e}"),
            })
        })?;
        if base_url.cannot_be_a_base() {
            return Err(crate::err!(ConfigValue {
                key: format!("{config_key}.api_url"),
                message: format!("'{base_url}' cannot be used as an API base URL"),
            }));
        }

        let mut value = HeaderValue::from_str(auth_value).map_err(|_| {
            crate::err!(ConfigValue {
                key: format!("{config_key}.token"),
                message: "token contains characters not allowed in an HTTP header".to_string(),
            })
        })?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(auth_header), value);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("modscout/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                crate::err!(Internal {
                    message: format!("failed to create HTTP client: {e}"),
                })
            })?;

        Ok(Self { client, base_url })
    }

    /// Build an endpoint URL from raw path segments (each percent-encoded as one
    /// segment) and query pairs.
    ///
    /// # Errors
    ///
    /// Returns `RawFailure::Configuration` if the base URL cannot take path segments.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, RawFailure> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RawFailure::Configuration(format!("cannot extend URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET and decode a JSON body.
    ///
    /// # Errors
    ///
    /// Any non-success status, transport failure or decode failure.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RawFailure> {
        let response = self.send(url).await?;
        response.json::<T>().await.map_err(RawFailure::from)
    }

    /// GET and decode a JSON body, mapping 404 to `None`.
    ///
    /// # Errors
    ///
    /// Any non-success status other than 404, transport or decode failure.
    pub async fn get_optional_json<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Option<T>, RawFailure> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(RawFailure::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET a raw text body.
    ///
    /// # Errors
    ///
    /// Any non-success status or transport failure.
    pub async fn get_text(&self, url: Url) -> Result<String, RawFailure> {
        let response = self.send(url).await?;
        response.text().await.map_err(RawFailure::from)
    }

    async fn send(&self, url: Url) -> Result<Response, RawFailure> {
        tracing::trace!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && quota_exhausted(response.headers()));
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&url, status, &body);

        if rate_limited {
            Err(RawFailure::RateLimited {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(RawFailure::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn quota_exhausted(headers: &HeaderMap) -> bool {
    RATE_LIMIT_REMAINING_HEADERS.iter().any(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
    })
}

/// Prefer the platform's `message` field over the raw body.
fn error_message(url: &Url, status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    format!("GET {} returned {status}: {detail}", url.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> ApiClient {
        ApiClient::new(uri, "authorization", "token secret", "platforms.github").unwrap()
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let err = ApiClient::new("not a url", "authorization", "t", "platforms.github").unwrap_err();
        assert!(err.to_string().contains("platforms.github.api_url"));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let c = client("https://gitlab.example.com/api/v4/");
        let url = c
            .endpoint(&["projects", "group/sub/proj", "repository", "tree"], &[("ref", "main")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/api/v4/projects/group%2Fsub%2Fproj/repository/tree?ref=main"
        );
    }

    #[tokio::test]
    async fn test_sends_auth_header_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("authorization", "token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let c = client(&server.uri());
        let body: serde_json::Value = c.get_json(c.endpoint(&["ping"], &[]).unwrap()).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_not_found_is_none_for_optional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let c = client(&server.uri());
        let url = c.endpoint(&["missing"], &[]).unwrap();
        let found: Option<serde_json::Value> = c.get_optional_json(url.clone()).await.unwrap();
        assert!(found.is_none());

        match c.get_json::<serde_json::Value>(url).await {
            Err(RawFailure::Http { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("Not Found"));
            }
            other => panic!("expected 404, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forbidden_with_exhausted_quota_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_json(json!({"message": "API rate limit exceeded"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let c = client(&server.uri());
        let limited = c.get_text(c.endpoint(&["limited"], &[]).unwrap()).await;
        assert!(matches!(limited, Err(RawFailure::RateLimited { status: 403, .. })));

        let forbidden = c.get_text(c.endpoint(&["forbidden"], &[]).unwrap()).await;
        assert!(matches!(forbidden, Err(RawFailure::Http { status: 403, .. })));
    }
}
