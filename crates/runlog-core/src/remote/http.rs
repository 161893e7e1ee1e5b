//! reqwest-backed implementation of [`RemoteClient`].

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{NewRun, RemoteClient, RemoteError, RemoteRun};
use crate::auth::Credential;
use crate::config::{is_http_url, ClientConfig};
use crate::models::RunId;

const RUNS_PATH: &str = "/api/runs/";

/// Upper bound on followed `next` links so a misbehaving server cannot loop us
const MAX_LIST_PAGES: usize = 200;

/// Runs API client speaking `Authorization: Token <token>`
#[derive(Clone)]
pub struct HttpRunsClient {
    config: ClientConfig,
    client: Client,
}

impl HttpRunsClient {
    pub fn new(config: ClientConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authorized(request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request
            .header(AUTHORIZATION, credential.authorization_header())
            .header(ACCEPT, "application/json")
    }

    fn resolve_next(&self, next: &str) -> String {
        if is_http_url(next) {
            next.to_string()
        } else {
            self.config.endpoint(next)
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRunsClient {
    async fn list(&self, credential: &Credential) -> Result<Vec<RemoteRun>, RemoteError> {
        let mut url = self.config.endpoint(RUNS_PATH);
        let mut runs = Vec::new();

        for page_number in 1..=MAX_LIST_PAGES {
            let response = Self::authorized(self.client.get(&url), credential)
                .send()
                .await?;
            let body = expect_status(response, StatusCode::OK).await?;
            let page = parse_list_page(&body)?;
            runs.extend(page.results);

            match page.next {
                Some(next) if page_number < MAX_LIST_PAGES => url = self.resolve_next(&next),
                Some(_) => {
                    tracing::warn!("Stopped following run list pagination after {MAX_LIST_PAGES} pages");
                    break;
                }
                None => break,
            }
        }

        tracing::debug!("Fetched {} runs from {}", runs.len(), self.config.api_base_url);
        Ok(runs)
    }

    async fn create(
        &self,
        credential: &Credential,
        run: &NewRun,
    ) -> Result<RemoteRun, RemoteError> {
        let request = self.client.post(self.config.endpoint(RUNS_PATH)).json(run);
        let response = Self::authorized(request, credential).send().await?;
        let body = expect_status(response, StatusCode::CREATED).await?;
        serde_json::from_str(&body).map_err(|error| RemoteError::Decode(error.to_string()))
    }

    async fn delete(&self, credential: &Credential, id: &RunId) -> Result<(), RemoteError> {
        let url = self.config.endpoint(&format!("{RUNS_PATH}{id}/"));
        let response = Self::authorized(self.client.delete(url), credential)
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

/// One page of `GET /api/runs/`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<RemoteRun>,
}

/// Parse a run list body, accepting both the paginated envelope and a bare
/// array.
///
/// Public for testability.
pub fn parse_list_page(body: &str) -> Result<ListPage, RemoteError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|error| RemoteError::Decode(error.to_string()))?;

    if value.is_array() {
        let results = serde_json::from_value(value)
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        return Ok(ListPage {
            count: None,
            next: None,
            results,
        });
    }

    serde_json::from_value(value).map_err(|error| RemoteError::Decode(error.to_string()))
}

/// Read the body when the status matches, otherwise classify the failure.
async fn expect_status(response: Response, expected: StatusCode) -> Result<String, RemoteError> {
    let status = response.status();
    let body = response.text().await?;
    if status == expected {
        return Ok(body);
    }
    Err(status_error(status, &body))
}

/// Map a non-success status onto the remote error taxonomy.
///
/// Public for testability.
pub fn status_error(status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        _ => RemoteError::Server {
            status: status.as_u16(),
            message: parse_api_error(body),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.detail.or(payload.error).or(payload.message) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_page_reads_envelope() {
        let body = r#"{
            "count": 1,
            "next": "https://api.example.com/api/runs/?page=2",
            "previous": null,
            "results": [{
                "id": "0b6f7a3e-3a7b-4b59-9d1c-2f0e6f3e2a10",
                "date": "2025-01-01T07:00:00Z",
                "distance_km": "5.00",
                "time_minutes": "30.00",
                "pace": "6.00"
            }]
        }"#;
        let page = parse_list_page(body).unwrap();
        assert_eq!(page.count, Some(1));
        assert_eq!(
            page.next.as_deref(),
            Some("https://api.example.com/api/runs/?page=2")
        );
        assert_eq!(page.results.len(), 1);
    }

    #[test]
    fn parse_list_page_reads_bare_array() {
        let page = parse_list_page("[]").unwrap();
        assert!(page.results.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn parse_list_page_rejects_malformed_payload() {
        assert!(matches!(
            parse_list_page("<html>oops</html>"),
            Err(RemoteError::Decode(_))
        ));
        assert!(matches!(
            parse_list_page(r#"{"results": [{"id": "nope"}]}"#),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn status_error_classifies_statuses() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Unauthorized
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, ""),
            RemoteError::Unauthorized
        );
        assert_eq!(status_error(StatusCode::NOT_FOUND, ""), RemoteError::NotFound);
        assert_eq!(
            status_error(
                StatusCode::BAD_REQUEST,
                r#"{"detail": "distance_km must be positive"}"#
            ),
            RemoteError::Server {
                status: 400,
                message: "distance_km must be positive".to_string()
            }
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "  "),
            RemoteError::Server {
                status: 502,
                message: "empty response body".to_string()
            }
        );
    }

    #[test]
    fn resolve_next_joins_relative_links() {
        let client = HttpRunsClient::new(ClientConfig::new("https://api.example.com/").unwrap())
            .unwrap();
        assert_eq!(
            client.resolve_next("/api/runs/?page=2"),
            "https://api.example.com/api/runs/?page=2"
        );
        assert_eq!(
            client.resolve_next("https://other.example.com/api/runs/?page=3"),
            "https://other.example.com/api/runs/?page=3"
        );
    }
}
