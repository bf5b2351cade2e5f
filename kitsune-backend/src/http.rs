//! Process-wide HTTP client shared by the Mastodon and OpenAI adapters.
//!
//! No request timeout is set: the Mastodon streaming connections stay open
//! indefinitely, and completion calls rely on the transport defaults.

use once_cell::sync::Lazy;
use std::time::Duration;

const USER_AGENT: &str = concat!("kitsune-backend/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

static SHARED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Failed to build configured HTTP client, using defaults: {}", e);
            reqwest::Client::new()
        })
});

pub fn shared_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}
