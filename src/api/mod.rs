//! REST surface of the chat service. All calls ride the mutual-TLS client
//! and are authorized by the `SESSION` cookie, except session issuance
//! itself which authenticates with the API key.

use crate::config::Config;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

/// Rows requested per room-search page.
pub const SEARCH_PAGE_SIZE: u64 = 500;

/// Outcome of a new-session request, reduced to what the retry logic
/// inspects: the HTTP status and the `SESSION` cookie, if any.
#[derive(Debug)]
pub struct NewSessionResponse {
    pub status: u16,
    pub credential: Option<String>,
}

#[derive(Debug)]
pub struct RoomSearchPage {
    pub total_room_count: u64,
    pub rooms: Vec<String>,
}

/// A thread the service reports a message as belonging to.
#[derive(Debug)]
pub struct ThreadRef {
    pub thread_id: String,
}

/// Public message to publish into a room. `thread_parent` carries the
/// originating message id when the post should land as a threaded reply;
/// the relay always leaves it `None`.
#[derive(Debug, Serialize)]
pub struct PublicMessage {
    pub text: String,
    pub room_name: String,
    pub nick_name: String,
    pub thread_parent: Option<String>,
}

pub struct ChatApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    domain_id: String,
    classification: String,
    instance_id: String,
}

impl ChatApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = crate::tls::http_client(
            &config.cert_path,
            &config.key_path,
            &config.ca_bundle_path,
        )?;
        Ok(Self::with_client(client, config.api_base(), config))
    }

    /// Construct over an existing client and base URL. Tests point this at
    /// a mock server with a plain client.
    pub fn with_client(client: reqwest::Client, base_url: String, config: &Config) -> Self {
        Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            domain_id: config.domain_id.clone(),
            classification: config.classification.clone(),
            instance_id: config.instance_id.clone(),
        }
    }

    fn cookie(session: &str) -> String {
        format!("SESSION={session}")
    }

    /// Single new-session attempt. Retry policy lives in the session manager.
    pub async fn new_session(&self) -> Result<NewSessionResponse> {
        let url = format!("{}/api/auth/newsession", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "apiKey": self.api_key }))
            .send()
            .await
            .with_context(|| "new-session request failed")?;

        let status = response.status().as_u16();
        let credential = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_session_cookie);
        Ok(NewSessionResponse { status, credential })
    }

    /// Invalidate all server-side sessions for this API key. Retries up to
    /// 5 times with a 1-second pause while the service reports failure.
    pub async fn clear_sessions(&self) -> Result<()> {
        let url = format!(
            "{}/api/auth/clearsessions?api-key={}",
            self.base_url, self.api_key
        );
        for attempt in 0..5u32 {
            let response = self
                .client
                .post(&url)
                .send()
                .await
                .with_context(|| "clear-sessions request failed")?;
            if response.status().as_u16() <= 204 {
                return Ok(());
            }
            debug!(
                "clear-sessions returned {} (attempt {})",
                response.status(),
                attempt + 1
            );
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        anyhow::bail!("clear-sessions kept failing after 5 attempts");
    }

    /// Names of private rooms the bot currently belongs to.
    pub async fn private_rooms(&self, session: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/roommembership/rooms/private", self.base_url);
        let body: Value = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, Self::cookie(session))
            .send()
            .await
            .with_context(|| "private-rooms request failed")?
            .json()
            .await
            .with_context(|| "private-rooms response was not JSON")?;

        let rooms = body
            .get("privateRooms")
            .and_then(Value::as_array)
            .map(|rooms| {
                rooms
                    .iter()
                    .filter_map(|r| r.get("roomName").and_then(Value::as_str))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(rooms)
    }

    /// One page of the room directory, newest-joined first.
    pub async fn search_rooms_page(&self, session: &str, page_number: u64) -> Result<RoomSearchPage> {
        let url = format!("{}/api/roomsearch/rooms/search", self.base_url);
        let payload = json!({
            "sortCriteria": {
                "orders": [{"sortField": "FIRST_JOINED_DATE", "sortDirection": "DESC"}]
            },
            "keywordCriteria": {"searchFields": ["DISPLAY_NAME"], "query": ""},
            "aboveUserDefaultHighOptIn": true,
            "includePrivateRooms": true,
            "pageNumber": page_number,
            "pageSize": SEARCH_PAGE_SIZE,
        });

        let body: Value = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, Self::cookie(session))
            .json(&payload)
            .send()
            .await
            .with_context(|| "room-search request failed")?
            .json()
            .await
            .with_context(|| "room-search response was not JSON")?;

        let total_room_count = body
            .get("totalRoomCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let rooms = body
            .get("rooms")
            .and_then(Value::as_array)
            .map(|rooms| {
                rooms
                    .iter()
                    .filter_map(|r| r.get("roomName").and_then(Value::as_str))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(RoomSearchPage {
            total_room_count,
            rooms,
        })
    }

    /// Resolve the thread a message belongs to, if any.
    pub async fn fetch_thread(
        &self,
        session: &str,
        room_name: &str,
        message_id: &str,
    ) -> Result<Option<ThreadRef>> {
        let url = format!(
            "{}/api/chat/messages/{}/{}?threadId={}",
            self.base_url, self.domain_id, room_name, message_id
        );
        let body: Value = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, Self::cookie(session))
            .send()
            .await
            .with_context(|| "thread lookup request failed")?
            .json()
            .await
            .with_context(|| "thread lookup response was not JSON")?;

        let thread_id = body
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.last())
            .and_then(|last| last.get("threadId"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        Ok(thread_id.map(|thread_id| ThreadRef { thread_id }))
    }

    /// Publish a public message to a room, either top-level or as a reply
    /// into the thread of `thread_parent`.
    pub async fn post_public_message(&self, session: &str, msg: &PublicMessage) -> Result<()> {
        let mut payload = json!({
            "classification": self.classification,
            "message": msg.text,
            "domainId": self.domain_id,
            "nickName": msg.nick_name,
            "roomName": msg.room_name,
        });

        let url = if let Some(parent_id) = &msg.thread_parent {
            // Replies attach to the root of the thread when one exists,
            // otherwise directly to the parent message.
            let thread_id = match self.fetch_thread(session, &msg.room_name, parent_id).await? {
                Some(thread) => thread.thread_id,
                None => parent_id.clone(),
            };
            payload["files"] = json!([]);
            format!("{}/api/thread/thread/{}/reply", self.base_url, thread_id)
        } else {
            format!(
                "{}/api/chatserver/message?api-key={}",
                self.base_url, self.api_key
            )
        };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, Self::cookie(session))
            .json(&payload)
            .send()
            .await
            .with_context(|| "post-public-message request failed")?;
        debug!(status = %response.status(), room = %msg.room_name, "posted public message");
        if !response.status().is_success() {
            anyhow::bail!("post-public-message returned {}", response.status());
        }
        Ok(())
    }

    /// Send a direct message to a user.
    pub async fn post_direct_message(&self, session: &str, user_id: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/api/directmessage/contacts/{}/messages",
            self.base_url, user_id
        );
        let payload = json!({
            "classification": self.classification,
            "files": [],
            "instanceId": self.instance_id,
            "text": text,
        });
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, Self::cookie(session))
            .json(&payload)
            .send()
            .await
            .with_context(|| "post-direct-message request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("post-direct-message returned {}", response.status());
        }
        Ok(())
    }
}

/// Pull the `SESSION` cookie value out of a `Set-Cookie` header.
/// Empty values are treated as absent — the service occasionally answers
/// with `SESSION=` while it is still warming up.
fn extract_session_cookie(header: &str) -> Option<String> {
    let first_pair = header.split(';').next()?;
    let (name, value) = first_pair.split_once('=')?;
    if name.trim() != "SESSION" || value.is_empty() {
        return None;
    }
    Some(value.to_string())
}
