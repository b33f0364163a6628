use super::{RemoteConnector, RemoteSource, SelectQuery};
use crate::errors::{AppError, AppResult};
use crate::models::{RemoteCredentials, Row, Tenant};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;

const REST_PREFIX: [&str; 2] = ["rest", "v1"];
const SCHEMA_RESOURCE: &str = "(schema)";
const MAX_ERROR_BODY_CHARS: usize = 256;

/// REST client for a PostgREST-style endpoint (`<base>/rest/v1/<table>`).
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PostgrestClient {
    pub fn new(credentials: &RemoteCredentials, timeout: Option<Duration>) -> AppResult<Self> {
        let base_url = Url::parse(credentials.endpoint.trim())
            .map_err(|err| AppError::InvalidInput(format!("invalid remote url: {}", err)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidInput(format!(
                "remote url {} cannot be used as a base",
                credentials.endpoint
            )));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&credentials.credential)
            .map_err(|_| AppError::InvalidInput("invalid remote key format".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.credential))
            .map_err(|_| AppError::InvalidInput("invalid remote key format".to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| AppError::Internal(err.to_string()))?;

        Ok(Self { http, base_url })
    }

    fn resource_url(&self, table: Option<&str>) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::InvalidInput("remote url cannot carry a path".to_string()))?;
            segments.pop_if_empty().extend(REST_PREFIX);
            match table {
                Some(table) => {
                    segments.push(table);
                }
                None => {
                    segments.push("");
                }
            }
        }
        Ok(url)
    }

    async fn send(&self, table: &str, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|err| AppError::remote(table, err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::remote(table, describe_failure(status, &body)))
    }
}

#[async_trait]
impl RemoteSource for PostgrestClient {
    async fn describe(&self) -> AppResult<serde_json::Value> {
        let url = self.resource_url(None)?;
        let request = self
            .http
            .get(url)
            .header(ACCEPT, "application/openapi+json, application/json");
        let response = self.send(SCHEMA_RESOURCE, request).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| AppError::remote(SCHEMA_RESOURCE, err.to_string()))
    }

    async fn count(&self, table: &str) -> AppResult<u64> {
        let url = self.resource_url(Some(table))?;
        let request = self
            .http
            .head(url)
            .query(&[("select", "*")])
            .header("Prefer", "count=exact");
        let response = self.send(table, request).await?;
        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        parse_content_range_total(range)
            .ok_or_else(|| AppError::remote(table, "count unavailable"))
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<Vec<Row>> {
        let url = self.resource_url(Some(table))?;
        let mut params = vec![("select".to_string(), query.select_clause())];
        if let Some(order) = &query.order_by {
            let direction = if order.descending { "desc" } else { "asc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let response = self.send(table, self.http.get(url).query(&params)).await?;
        response
            .json::<Vec<Row>>()
            .await
            .map_err(|err| AppError::remote(table, err.to_string()))
    }
}

/// Connects tenants that carry both a remote URL and key.
#[derive(Debug, Clone, Default)]
pub struct PostgrestConnector {
    timeout: Option<Duration>,
}

impl PostgrestConnector {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl RemoteConnector for PostgrestConnector {
    fn connect(&self, tenant: &Tenant) -> AppResult<Option<Arc<dyn RemoteSource>>> {
        let Some(credentials) = tenant.remote_credentials() else {
            return Ok(None);
        };
        let client = PostgrestClient::new(&credentials, self.timeout)?;
        Ok(Some(Arc::new(client)))
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range_total(raw: &str) -> Option<u64> {
    let (_, total) = raw.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let mut preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        preview.push_str("...");
    }
    if preview.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, preview.trim())
    }
}
