//! Mastodon REST and streaming client.
//!
//! Talks to the server directly over `reqwest`: statuses are posted with
//! `POST /api/v1/statuses`, and the user / local timelines are read from the
//! server-sent-events streaming endpoints. Each stream is owned by a
//! background task that reconnects when the connection drops and forwards
//! decoded events over an mpsc channel.

use crate::channels::sse::{parse_stream_event, SseDecoder};
use crate::channels::types::{Account, Status, StreamEvent, Toot};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header, Client};
use std::time::Duration;
use tokio::sync::mpsc;

/// Wait before reopening a dropped stream
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Buffered events per stream before the reader waits on the dispatcher
const STREAM_BUFFER: usize = 64;

/// Posting side of the social network, the only part the dispatcher needs
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Publish a status and return it as created by the server.
    async fn post_status(&self, toot: &Toot) -> Result<Status, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Notifications and home timeline of the authenticated account
    User,
    /// Public posts from the local server only
    PublicLocal,
}

impl StreamKind {
    pub fn path(&self) -> &'static str {
        match self {
            StreamKind::User => "/api/v1/streaming/user",
            StreamKind::PublicLocal => "/api/v1/streaming/public/local",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StreamKind::User => "user",
            StreamKind::PublicLocal => "local",
        }
    }
}

#[derive(Clone)]
pub struct MastodonClient {
    client: Client,
    server: String,
    auth_headers: header::HeaderMap,
}

impl MastodonClient {
    pub fn new(server: &str, access_token: &str) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|e| format!("Invalid access token format: {}", e))?;
        auth_headers.insert(header::AUTHORIZATION, auth_value);

        Ok(Self {
            client: crate::http::shared_client().clone(),
            server: server.trim_end_matches('/').to_string(),
            auth_headers,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    /// Fetch the account the access token belongs to.
    pub async fn verify_credentials(&self) -> Result<Account, String> {
        let response = self
            .client
            .get(self.url("/api/v1/accounts/verify_credentials"))
            .headers(self.auth_headers.clone())
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("API error ({}): {}", status, body));
        }

        serde_json::from_str(&body).map_err(|e| format!("Failed to parse account: {}", e))
    }

    /// Open a stream. The returned receiver yields events until it is
    /// dropped; connection failures are retried in the background.
    pub fn stream(&self, kind: StreamKind) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = self.clone();
        tokio::spawn(async move {
            client.stream_loop(kind, tx).await;
        });
        rx
    }

    async fn stream_loop(&self, kind: StreamKind, tx: mpsc::Sender<StreamEvent>) {
        loop {
            match self.read_stream(kind, &tx).await {
                Ok(()) => log::warn!("[MASTODON] {} stream ended", kind.label()),
                Err(e) => log::error!("[MASTODON] {} stream error: {}", kind.label(), e),
            }
            if tx.is_closed() {
                log::info!("[MASTODON] {} stream receiver dropped, stopping", kind.label());
                return;
            }
            log::info!(
                "[MASTODON] Reconnecting {} stream in {}s",
                kind.label(),
                RECONNECT_DELAY.as_secs()
            );
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Read one connection until it closes. Returns Ok when the server ends
    /// the body or the receiver goes away.
    async fn read_stream(
        &self,
        kind: StreamKind,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), String> {
        let response = self
            .client
            .get(self.url(kind.path()))
            .headers(self.auth_headers.clone())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API error ({}): {}", status, body));
        }

        log::info!("[MASTODON] Connected to {} stream", kind.label());

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| format!("Stream read error: {}", e))?;
            for frame in decoder.push(&chunk) {
                match parse_stream_event(&frame) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => log::warn!("[MASTODON] Skipping {} event: {}", frame.event, e),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SocialClient for MastodonClient {
    async fn post_status(&self, toot: &Toot) -> Result<Status, String> {
        let response = self
            .client
            .post(self.url("/api/v1/statuses"))
            .headers(self.auth_headers.clone())
            .json(toot)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("API error ({}): {}", status, body));
        }

        let posted: Status =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse status: {}", e))?;
        log::info!("[MASTODON] Posted status {}", posted.id);
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_paths() {
        assert_eq!(StreamKind::User.path(), "/api/v1/streaming/user");
        assert_eq!(StreamKind::PublicLocal.path(), "/api/v1/streaming/public/local");
    }

    #[test]
    fn test_server_trailing_slash() {
        let client = MastodonClient::new("https://mstdn.example/", "token").unwrap();
        assert_eq!(client.server(), "https://mstdn.example");
        assert_eq!(client.url("/api/v1/statuses"), "https://mstdn.example/api/v1/statuses");
    }

    #[test]
    fn test_invalid_token_rejected() {
        assert!(MastodonClient::new("https://mstdn.example", "bad\ntoken").is_err());
    }

    #[tokio::test]
    async fn test_post_status_decodes_created_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/v1/statuses"))
            .and(wiremock::matchers::header("authorization", "Bearer token"))
            .and(wiremock::matchers::body_json(serde_json::json!({
                "status": "@alice \nこんにちは",
                "in_reply_to_id": "100"
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "101",
                "content": "<p>@alice こんにちは</p>",
                "account": {"id": "1", "username": "kita_kitsune", "acct": "kita_kitsune"},
                "tags": [],
                "in_reply_to_id": "100"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MastodonClient::new(&server.uri(), "token").unwrap();
        let posted = client
            .post_status(&Toot::reply_to("@alice \nこんにちは", "100"))
            .await
            .unwrap();

        assert_eq!(posted.id, "101");
        assert_eq!(posted.account.acct, "kita_kitsune");
    }

    #[tokio::test]
    async fn test_post_status_error_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/v1/statuses"))
            .respond_with(
                wiremock::ResponseTemplate::new(422)
                    .set_body_string(r#"{"error":"Validation failed: Text can't be blank"}"#),
            )
            .mount(&server)
            .await;

        let client = MastodonClient::new(&server.uri(), "token").unwrap();
        let err = client.post_status(&Toot::new("")).await.unwrap_err();

        assert!(err.contains("422"), "unexpected error: {}", err);
        assert!(err.contains("Validation failed"), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_verify_credentials_returns_account() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v1/accounts/verify_credentials"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1",
                "username": "kita_kitsune",
                "acct": "kita_kitsune"
            })))
            .mount(&server)
            .await;

        let client = MastodonClient::new(&server.uri(), "token").unwrap();
        let account = client.verify_credentials().await.unwrap();
        assert_eq!(account.acct, "kita_kitsune");
    }

    #[tokio::test]
    async fn test_stream_forwards_decoded_events() {
        let server = wiremock::MockServer::start().await;
        let body = concat!(
            ":thump\n\n",
            "event: delete\n",
            "data: 42\n\n",
        );
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v1/streaming/public/local"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = MastodonClient::new(&server.uri(), "token").unwrap();
        let mut rx = client.stream(StreamKind::PublicLocal);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, StreamEvent::Delete(ref id) if id == "42"));
    }
}
