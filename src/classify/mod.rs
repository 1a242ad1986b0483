//! Classification of decoded payloads into typed inbound events.
//!
//! Known schemas are attempted in priority order: direct message,
//! membership change, room chat message. Anything else is `Unrecognized`
//! and ignored by the router.

use serde::Deserialize;
use serde_json::Value;

/// A normalized chat or direct message.
///
/// DMs arrive wrapped (`{message: {...}, contactUserId: ...}`) and report
/// their sender under `senderUserId`; normalization unwraps them into this
/// shape so the rest of the pipeline sees one schema.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(rename = "roomName", default)]
    pub room_name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub classification: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MembershipChange {
    #[serde(rename = "changedMembershipType")]
    pub membership: String,
    #[serde(rename = "roomName", default)]
    pub room_name: Option<String>,
    #[serde(rename = "privateRoom", default)]
    pub private_room: bool,
}

impl MembershipChange {
    /// The bot was added to a private room.
    pub fn is_private_room_add(&self) -> bool {
        self.membership == "FOLLOWER" && self.private_room
    }

    /// The bot was removed from a private room.
    pub fn is_private_room_remove(&self) -> bool {
        self.membership == "NONE" && self.private_room
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    ChatMessage(ChatMessage),
    DirectMessage(ChatMessage),
    MembershipChange(MembershipChange),
    Unrecognized,
}

/// DM envelope schema, tried first.
#[derive(Deserialize)]
struct DirectMessageEnvelope {
    message: Value,
    #[serde(rename = "contactUserId")]
    #[allow(dead_code)]
    contact_user_id: String,
}

/// Classify a decoded payload. Pure — the same input always yields the
/// same event.
pub fn classify(payload: &Value) -> InboundEvent {
    // Direct message: unwrap the inner message and normalize the sender
    // id, which DMs report under a different key than room messages.
    if let Ok(envelope) = DirectMessageEnvelope::deserialize(payload) {
        let mut inner = envelope.message;
        if let Some(sender_user_id) = inner.get("senderUserId").cloned() {
            inner["userId"] = sender_user_id;
        }
        if let Ok(message) = ChatMessage::deserialize(&inner) {
            return InboundEvent::DirectMessage(message);
        }
        return InboundEvent::Unrecognized;
    }

    if let Ok(change) = MembershipChange::deserialize(payload) {
        return InboundEvent::MembershipChange(change);
    }

    if let Ok(message) = ChatMessage::deserialize(payload) {
        return InboundEvent::ChatMessage(message);
    }

    InboundEvent::Unrecognized
}

/// Routing decision: the message to hand to translation, if any.
///
/// Messages from the bot's own user id are excluded unconditionally —
/// relayed output must never feed back into translation.
pub fn should_relay<'a>(event: &'a InboundEvent, bot_user_id: &str) -> Option<&'a ChatMessage> {
    let message = match event {
        InboundEvent::ChatMessage(m) | InboundEvent::DirectMessage(m) => m,
        _ => return None,
    };
    if message.user_id == bot_user_id {
        return None;
    }
    Some(message)
}
