//! Translation & relay: resolve the room pairing, translate, republish
//! into the paired room under the original sender's name.

use crate::api::{ChatApi, PublicMessage};
use crate::classify::ChatMessage;
use crate::errors::RelayError;
use crate::registry::RoomRegistry;
use crate::session::SessionManager;
use crate::translate::Translator;
use std::sync::Arc;
use tracing::{debug, info};

/// Appended to the sender's display name on every relayed message.
pub const ATTRIBUTION_SUFFIX: &str = " (from Google Translate)";

pub struct Relay {
    registry: RoomRegistry,
    translator: Arc<dyn Translator>,
    api: Arc<ChatApi>,
    sessions: Arc<SessionManager>,
}

impl Relay {
    pub fn new(
        registry: RoomRegistry,
        translator: Arc<dyn Translator>,
        api: Arc<ChatApi>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            registry,
            translator,
            api,
            sessions,
        }
    }

    /// Relay one message. A room outside the registry is a silent no-op;
    /// the caller treats returned errors as per-message (log and drop).
    pub async fn relay(&self, message: &ChatMessage) -> Result<(), RelayError> {
        let Some(room_name) = message.room_name.as_deref() else {
            debug!("message {} has no room, skipping", message.id);
            return Ok(());
        };
        let Some(route) = self.registry.resolve(room_name) else {
            return Ok(());
        };

        debug!(
            "translating message in {room_name} from {} to {}",
            route.from_lang, route.to_lang
        );
        let translated = self
            .translator
            .translate(&message.text, &route.from_lang, &route.to_lang)
            .await
            .map_err(|e| RelayError::Translation(format!("{e:#}")))?;

        let session = self.sessions.get_session().await?;
        // Always a fresh top-level message in the target room, regardless
        // of whether the source was a threaded reply.
        self.api
            .post_public_message(
                &session,
                &PublicMessage {
                    text: translated,
                    room_name: route.target_room.clone(),
                    nick_name: format!("{}{}", message.sender, ATTRIBUTION_SUFFIX),
                    thread_parent: None,
                },
            )
            .await?;
        info!("relayed message from {room_name} to {}", route.target_room);
        Ok(())
    }
}
