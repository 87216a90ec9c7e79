//! Server-side read state and history endpoints.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::event::{CHANGE_DETECTED_TYPE, ChangeType, EntityType, NotificationEvent};
use crate::utils::url::{endpoint, redacted};

/// A past change as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub change_type: ChangeType,
    pub field_name: String,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
    #[serde(default)]
    pub is_significant: bool,
    /// When the change was detected; older servers send `timestamp`.
    #[serde(alias = "timestamp")]
    pub detected_at: String,
    #[serde(default)]
    pub region_code: String,
}

impl From<HistoryRecord> for NotificationEvent {
    fn from(record: HistoryRecord) -> Self {
        Self {
            id: record.id,
            kind: CHANGE_DETECTED_TYPE.to_string(),
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            entity_name: record.entity_name,
            change_type: record.change_type,
            field_name: record.field_name,
            old_value: record.old_value,
            new_value: record.new_value,
            is_significant: record.is_significant,
            timestamp: record.detected_at,
            region_code: record.region_code,
        }
    }
}

/// Server calls made on behalf of the user.
#[async_trait]
pub trait NotificationsBackend: Send + Sync + 'static {
    /// Record that one notification was read.
    async fn mark_read(&self, id: &str) -> Result<()>;

    /// Record that every notification was read.
    async fn mark_all_read(&self) -> Result<()>;

    /// Most recent changes, newest first.
    async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>>;

    /// Replace the bearer token used for subsequent calls.
    fn set_token(&self, _token: &str) {}
}

/// [`NotificationsBackend`] over the REST API.
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: RwLock<String>,
}

impl HttpBackend {
    pub fn new(client: Client, base: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            base,
            token: RwLock::new(token.into()),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.base, segments)
    }

    async fn post(&self, url: Url) -> Result<()> {
        let token = self.token.read().clone();
        let response = self.client.post(url.clone()).bearer_auth(token).send().await?;
        check_status(&response, &url)?;
        debug!(url = %url, "Read state synced");
        Ok(())
    }
}

fn check_status(response: &reqwest::Response, url: &Url) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::InvalidStatus {
            status: status.as_u16(),
            url: redacted(url),
        });
    }
    Ok(())
}

#[async_trait]
impl NotificationsBackend for HttpBackend {
    async fn mark_read(&self, id: &str) -> Result<()> {
        let url = self.url(&["notifications", id, "read"])?;
        self.post(url).await
    }

    async fn mark_all_read(&self) -> Result<()> {
        let url = self.url(&["notifications", "read-all"])?;
        self.post(url).await
    }

    async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut url = self.url(&["notifications", "history"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let token = self.token.read().clone();
        let response = self.client.get(url.clone()).bearer_auth(token).send().await?;
        check_status(&response, &url)?;

        let records: Vec<HistoryRecord> = response.json().await?;
        debug!(count = records.len(), "Fetched notification history");
        Ok(records)
    }

    fn set_token(&self, token: &str) {
        *self.token.write() = token.to_string();
    }
}
