//! Graph REST client.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::token::{Token, TokenErrorResponse, TokenResponse};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const PAGE_SIZE: usize = 100;
const MAX_RATE_LIMIT_RETRIES: usize = 5;
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 5;

/// Connection settings for an app-only Graph mailbox client.
#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    /// Azure AD tenant id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Mailbox to operate on (user principal name or object id).
    pub user: String,
}

/// A mail folder as reported by the mailFolders endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MailFolder {
    /// Graph folder id, used in message listing and upload URLs.
    pub id: String,
    /// Human-readable folder name.
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Total number of items in the folder.
    #[serde(rename = "totalItemCount", default)]
    pub total_item_count: Option<u64>,
}

/// Lightweight message listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageMeta {
    /// Graph message id.
    pub id: String,
    /// RFC822 Message-ID header value.
    #[serde(rename = "internetMessageId", default)]
    pub internet_message_id: Option<String>,
    /// Delivery timestamp.
    #[serde(rename = "receivedDateTime")]
    pub received_date_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// App-only Microsoft Graph mail client bound to one mailbox.
pub struct GraphClient {
    http: Client,
    config: GraphConfig,
    token: Mutex<Option<Token>>,
}

impl GraphClient {
    /// Create a client for the given credentials and mailbox.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// Acquire a bearer token, reusing the cached one while valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the grant.
    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let access = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access)
    }

    async fn fetch_token(&self) -> Result<Token> {
        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.config.tenant_id
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            let body: TokenResponse = response.json().await?;
            debug!(tenant = %self.config.tenant_id, "acquired graph access token");
            Ok(Token::from_response(body))
        } else {
            let status = response.status();
            let message = response
                .json::<TokenErrorResponse>()
                .await
                .map_or_else(
                    |_| format!("status {status}"),
                    |e| format!("{}: {}", e.error, e.error_description),
                );
            Err(Error::Token(message))
        }
    }

    /// Verify that credentials work and the mailbox is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if token acquisition or the probe request fails.
    pub async fn test_connection(&self) -> Result<()> {
        self.list_mail_folders().await?;
        Ok(())
    }

    /// List all mail folders in the mailbox, following paging links.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn list_mail_folders(&self) -> Result<Vec<MailFolder>> {
        let url = format!(
            "{GRAPH_API_BASE}/users/{}/mailFolders?$top={PAGE_SIZE}",
            self.config.user
        );
        self.collect_pages(url).await
    }

    /// List messages in a folder received at or after `since`, oldest first.
    ///
    /// `None` lists the whole folder.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn list_messages_since(
        &self,
        folder_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageMeta>> {
        let mut url = format!(
            "{GRAPH_API_BASE}/users/{}/mailFolders/{folder_id}/messages\
             ?$select=id,internetMessageId,receivedDateTime\
             &$orderby=receivedDateTime%20asc&$top={PAGE_SIZE}",
            self.config.user
        );
        if let Some(ts) = since {
            let stamp = ts.to_rfc3339_opts(SecondsFormat::Secs, true);
            url.push_str(&format!("&$filter=receivedDateTime%20ge%20{stamp}"));
        }
        self.collect_pages(url).await
    }

    /// List messages in a folder received strictly before `cutoff`.
    ///
    /// Used by the retention path to find expired messages.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn list_messages_before(
        &self,
        folder_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageMeta>> {
        let stamp = cutoff.to_rfc3339_opts(SecondsFormat::Secs, true);
        let url = format!(
            "{GRAPH_API_BASE}/users/{}/mailFolders/{folder_id}/messages\
             ?$select=id,internetMessageId,receivedDateTime\
             &$filter=receivedDateTime%20lt%20{stamp}&$top={PAGE_SIZE}",
            self.config.user
        );
        self.collect_pages(url).await
    }

    /// Download the raw MIME content of a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_mime(&self, message_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{GRAPH_API_BASE}/users/{}/messages/{message_id}/$value",
            self.config.user
        );
        let response = self.get_with_retry(&url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload a raw MIME message into a folder.
    ///
    /// Graph accepts base64-encoded MIME with a `text/plain` content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload is rejected.
    pub async fn upload_mime(&self, folder_id: &str, raw: &[u8]) -> Result<()> {
        let url = format!(
            "{GRAPH_API_BASE}/users/{}/mailFolders/{folder_id}/messages",
            self.config.user
        );
        let token = self.access_token().await?;
        let body = BASE64.encode(raw);

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header("Content-Type", "text/plain")
                .body(body.clone())
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                self.back_off(&response, attempt).await?;
                continue;
            }
            return Self::check_status(response).await.map(|_| ());
        }
        Err(Error::RateLimited(MAX_RATE_LIMIT_RETRIES))
    }

    /// Delete a message from the mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion is rejected.
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        let url = format!(
            "{GRAPH_API_BASE}/users/{}/messages/{message_id}",
            self.config.user
        );
        let token = self.access_token().await?;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self.http.delete(&url).bearer_auth(&token).send().await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                self.back_off(&response, attempt).await?;
                continue;
            }
            return Self::check_status(response).await.map(|_| ());
        }
        Err(Error::RateLimited(MAX_RATE_LIMIT_RETRIES))
    }

    async fn collect_pages<T: for<'de> Deserialize<'de>>(&self, first: String) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next {
            let response = self.get_with_retry(&url).await?;
            let page: Page<T> = response.json().await?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }

    async fn get_with_retry(&self, url: &str) -> Result<Response> {
        let token = self.access_token().await?;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self.http.get(url).bearer_auth(&token).send().await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                self.back_off(&response, attempt).await?;
                continue;
            }
            return Self::check_status(response).await;
        }
        Err(Error::RateLimited(MAX_RATE_LIMIT_RETRIES))
    }

    async fn back_off(&self, response: &Response, attempt: usize) -> Result<()> {
        if attempt >= MAX_RATE_LIMIT_RETRIES {
            return Err(Error::RateLimited(MAX_RATE_LIMIT_RETRIES));
        }
        let seconds = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
        warn!(seconds, attempt, "graph rate limited, backing off");
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        Ok(())
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_else(|_| String::new());
            Err(Error::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_meta_deserializes_graph_shape() {
        let json = r#"{
            "id": "AAMk",
            "internetMessageId": "<abc@example.com>",
            "receivedDateTime": "2024-01-02T03:04:05Z"
        }"#;
        let meta: MessageMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.internet_message_id.as_deref(), Some("<abc@example.com>"));
        assert_eq!(meta.received_date_time.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn page_deserializes_next_link() {
        let json = r#"{
            "value": [{"id": "f1", "displayName": "Inbox", "totalItemCount": 7}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        }"#;
        let page: Page<MailFolder> = serde_json::from_str(json).unwrap();
        assert_eq!(page.value.len(), 1);
        assert_eq!(page.value[0].display_name, "Inbox");
        assert!(page.next_link.is_some());
    }
}
