//! Session credential lifecycle: one current credential, cached on disk so
//! restarts inside the expiry window skip reissuance.

use crate::api::ChatApi;
use crate::errors::RelayError;
use crate::utils::atomic_write;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SESSION_TTL_SECS: i64 = 3600;
const ISSUE_ATTEMPTS: u32 = 5;
const ISSUE_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSession {
    credential: String,
    expires_at: DateTime<Utc>,
}

pub struct SessionManager {
    api: Arc<ChatApi>,
    cache_path: PathBuf,
}

impl SessionManager {
    pub fn new(api: Arc<ChatApi>, cache_path: PathBuf) -> Self {
        Self { api, cache_path }
    }

    /// Current session credential, reissuing if the cache is absent, empty,
    /// or past expiry.
    pub async fn get_session(&self) -> Result<String, RelayError> {
        if let Some(cached) = self.read_cache()
            && cached.expires_at > Utc::now()
            && !cached.credential.is_empty()
        {
            debug!("using cached session (expires {})", cached.expires_at);
            return Ok(cached.credential);
        }
        self.issue().await
    }

    /// Clear-then-reissue. Retries while the service answers with a
    /// retryable status or an absent/empty session cookie.
    async fn issue(&self) -> Result<String, RelayError> {
        info!("session expired or missing, requesting a new one");

        // Old sessions are invalidated server-side before a new request;
        // a failure here is logged but does not block reissuance.
        if let Err(e) = self.api.clear_sessions().await {
            warn!("clear-sessions failed: {e:#}");
        }

        for attempt in 1..=ISSUE_ATTEMPTS {
            match self.api.new_session().await {
                Ok(response) => {
                    if let Some(credential) = response.credential {
                        self.write_cache(&credential);
                        info!("issued new session");
                        return Ok(credential);
                    }
                    debug!(
                        "new-session attempt {attempt} returned status {} without a credential",
                        response.status
                    );
                }
                Err(e) => warn!("new-session attempt {attempt} failed: {e:#}"),
            }
            if attempt < ISSUE_ATTEMPTS {
                tokio::time::sleep(ISSUE_BACKOFF).await;
            }
        }
        Err(RelayError::Auth(format!(
            "no session credential after {ISSUE_ATTEMPTS} attempts"
        )))
    }

    fn read_cache(&self) -> Option<CachedSession> {
        let content = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("session cache unreadable, reissuing: {e}");
                None
            }
        }
    }

    fn write_cache(&self, credential: &str) {
        let cached = CachedSession {
            credential: credential.to_string(),
            expires_at: Utc::now() + Duration::seconds(SESSION_TTL_SECS),
        };
        let Ok(content) = serde_json::to_string_pretty(&cached) else {
            return;
        };
        // Cache misses are recoverable; a write failure only costs a
        // reissue on the next run.
        if let Err(e) = atomic_write(&self.cache_path, &content) {
            warn!("failed to persist session cache: {e:#}");
        }
    }
}
