use crate::sources::ContentSource;
use crate::types::content::ContentItem;
use crate::utils::error::{Result, RumIndexerError};
use async_trait::async_trait;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads group feeds from a Quorum node's content API.
#[derive(Debug, Clone)]
pub struct QuorumClient {
    http: reqwest::Client,
    base_url: String,
    jwt: Option<String>,
}

impl QuorumClient {
    /// Creates a client for the node at `base_url` (e.g. `http://127.0.0.1:8002`).
    pub fn new(base_url: impl Into<String>, jwt: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(http, base_url, jwt)
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, jwt: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jwt,
        }
    }

    fn content_url(&self, group_id: &str) -> String {
        format!("{}/app/api/v1/group/{}/content", self.base_url, group_id)
    }
}

#[async_trait]
impl ContentSource for QuorumClient {
    async fn list_contents(
        &self,
        group_id: &str,
        start_trx: Option<&str>,
        count: usize,
    ) -> Result<Vec<ContentItem>> {
        let mut query: Vec<(&str, String)> = vec![
            ("num", count.to_string()),
            ("reverse", "false".to_string()),
            ("include_start_trx", "false".to_string()),
        ];
        if let Some(start) = start_trx {
            query.push(("start_trx", start.to_string()));
        }

        let mut request = self.http.get(self.content_url(group_id)).query(&query);
        if let Some(jwt) = &self.jwt {
            request = request.bearer_auth(jwt);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RumIndexerError::NodeStatus {
                status: status.as_u16(),
                message: format!("listing contents of group {group_id}: {body}"),
            });
        }

        let body = response.bytes().await?;
        let items: Option<Vec<ContentItem>> = serde_json::from_slice(&body).map_err(|e| {
            RumIndexerError::DecodingError(format!("content list of group {group_id}: {e}"))
        })?;

        let mut items = items.unwrap_or_default();
        for item in &mut items {
            if item.group_id.is_empty() {
                item.group_id = group_id.to_string();
            }
        }

        tracing::debug!(
            group_id,
            start_trx = start_trx.unwrap_or("-"),
            fetched = items.len(),
            "Listed contents"
        );
        Ok(items)
    }
}
