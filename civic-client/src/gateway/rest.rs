//! REST gateway for the managed platform
//!
//! Rows go through the PostgREST surface (`/rest/v1`), procedures through
//! `/rest/v1/rpc`, images through `/storage/v1/object` and the session user
//! through `/auth/v1/user`. Counts use `HEAD` with `Prefer: count=exact`. Change feeds use the realtime websocket.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use shared::client::UserMetadata;
use shared::{EventMask, RowId, Table, UserInfo};
use std::time::Duration;

use super::{Filter, Gateway, Query};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::realtime::{RealtimeClient, Subscription};
use crate::types::SessionContext;

/// [`Gateway`] over HTTP
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    api_key: String,
    token: Option<String>,
    realtime: RealtimeClient,
}

impl RestGateway {
    /// Create a gateway from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base().to_string(),
            api_key: config.api_key.clone(),
            token: config.token.clone(),
            realtime: RealtimeClient::new(config.realtime_url()?, config.token.clone(), config.realtime.clone()),
        })
    }

    /// Set the authentication token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.realtime = self.realtime.with_access_token(Some(token.clone()));
        self.token = Some(token);
        self
    }

    /// Act on behalf of `session`
    pub fn with_session(self, session: &SessionContext) -> Self {
        match session.token() {
            Some(token) => self.with_token(token),
            None => self,
        }
    }

    /// Get the current token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Resolve the session once: the user behind the current token.
    ///
    /// Without a token the session is anonymous.
    pub async fn resolve_session(&self) -> ClientResult<SessionContext> {
        let Some(token) = self.token.clone() else {
            return Ok(SessionContext::anonymous());
        };

        let response = self.request(self.client.get(self.url("auth/v1/user"))).send().await?;
        let response = handle_response(response, ClientError::NotFound).await?;
        let user: UserInfo = response.json().await?;

        tracing::info!(user_id = %user.id, "Session resolved");
        Ok(SessionContext::authenticated(user, token))
    }

    /// Public URL of a stored object
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Attach `apikey` and bearer headers
    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self.token.as_deref().unwrap_or(&self.api_key);
        builder
            .header("apikey", &self.api_key)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", bearer))
    }
}

/// Map a non-success response onto the error taxonomy
async fn handle_response<F>(response: Response, fail: F) -> ClientResult<Response>
where
    F: FnOnce(String) -> ClientError,
{
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => Err(ClientError::AuthRequired),
        _ => Err(fail(format!("{}: {}", status, text))),
    }
}

/// PostgREST query string for `query`
fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.select_clause())];

    for filter in &query.filters {
        let (op, value) = match filter {
            Filter::Eq(_, value) => ("eq", value),
            Filter::Gt(_, value) => ("gt", value),
        };
        params.push((filter.column().to_string(), format!("{}.{}", op, scalar(value))));
    }

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn query(&self, query: &Query) -> ClientResult<Vec<Value>> {
        let table = query.table;
        let request = self
            .client
            .get(self.url(&format!("rest/v1/{}", table)))
            .query(&query_params(query));

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::fetch(table, e))?;
        let response = handle_response(response, |m| ClientError::fetch(table, m)).await?;
        response.json().await.map_err(|e| ClientError::fetch(table, e))
    }

    async fn count(&self, query: &Query) -> ClientResult<u64> {
        let table = query.table;
        let request = self
            .client
            .head(self.url(&format!("rest/v1/{}", table)))
            .query(&query_params(query))
            .header("Prefer", "count=exact");

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::fetch(table, e))?;
        let response = handle_response(response, |m| ClientError::fetch(table, m)).await?;

        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| ClientError::fetch(table, "response carried no row count"))
    }

    async fn insert(&self, table: Table, row: Value) -> ClientResult<Value> {
        let request = self
            .client
            .post(self.url(&format!("rest/v1/{}", table)))
            .header("Prefer", "return=representation")
            .json(&row);

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::write(table, e))?;
        let response = handle_response(response, |m| ClientError::write(table, m)).await?;
        let rows: Vec<Value> = response.json().await.map_err(|e| ClientError::write(table, e))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ClientError::write(table, "insert returned no row"))
    }

    async fn update(&self, table: Table, id: &RowId, patch: Value) -> ClientResult<()> {
        let request = self
            .client
            .patch(self.url(&format!("rest/v1/{}", table)))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=minimal")
            .json(&patch);

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::write(table, e))?;
        handle_response(response, |m| ClientError::write(table, m)).await?;
        Ok(())
    }

    async fn remote_call(&self, name: &str, args: Value) -> ClientResult<Value> {
        let request = self.client.post(self.url(&format!("rest/v1/rpc/{}", name))).json(&args);

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::call(name, e))?;
        let response = handle_response(response, |m| ClientError::call(name, m)).await?;

        // void procedures answer with an empty body
        let body = response.text().await.map_err(|e| ClientError::call(name, e))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ClientError::call(name, e))
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> ClientResult<String> {
        let path = path.trim_start_matches('/');
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let request = self
            .client
            .post(self.url(&format!("storage/v1/object/{}/{}", bucket, path)))
            .header(reqwest::header::CONTENT_TYPE, mime.as_ref())
            .header("x-upsert", "true")
            .body(bytes);

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::call("upload", e))?;
        handle_response(response, |m| ClientError::call("upload", m)).await?;

        tracing::debug!(bucket = %bucket, path = %path, "Object uploaded");
        Ok(self.public_url(bucket, path))
    }

    async fn update_user(&self, user_id: &str, metadata: &UserMetadata) -> ClientResult<UserInfo> {
        if self.token.is_none() {
            return Err(ClientError::AuthRequired);
        }
        let request = self
            .client
            .put(self.url("auth/v1/user"))
            .json(&json!({ "data": metadata }));

        let response = self
            .request(request)
            .send()
            .await
            .map_err(|e| ClientError::write(Table::Users, e))?;
        let response = handle_response(response, |m| ClientError::write(Table::Users, m)).await?;
        let user: UserInfo = response.json().await.map_err(|e| ClientError::write(Table::Users, e))?;

        if user.id != user_id {
            tracing::warn!(expected = %user_id, actual = %user.id, "Token belongs to another user");
        }
        tracing::info!(user_id = %user.id, "Profile metadata updated");
        Ok(user)
    }

    async fn subscribe(&self, table: Table, mask: EventMask) -> ClientResult<Subscription> {
        self.realtime.subscribe(table, mask).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_postgrest_params() {
        let query = Query::new(Table::Comments)
            .eq("issue_id", 42)
            .gt("created_at", "2026-10-01T00:00:00Z")
            .order_by("created_at", true)
            .limit(20);

        let params = query_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("issue_id".to_string(), "eq.42".to_string()),
                ("created_at".to_string(), "gt.2026-10-01T00:00:00Z".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn reads_total_from_content_range() {
        assert_eq!(content_range_total("0-24/3573"), Some(3573));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-24/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn session_token_replaces_api_key_bearer() {
        let config = ClientConfig::new("https://civic.example.co/", "anon");
        let gateway = RestGateway::new(&config).unwrap();
        assert!(gateway.token().is_none());
        assert_eq!(
            gateway.public_url("issue-images", "/u1-1.png"),
            "https://civic.example.co/storage/v1/object/public/issue-images/u1-1.png"
        );

        let session = SessionContext::authenticated(UserInfo::new("u1"), "jwt");
        let gateway = gateway.with_session(&session);
        assert_eq!(gateway.token(), Some("jwt"));
    }
}
