//! Connection supervisor: owns the WebSocket lifecycle.
//!
//! Disconnected → Connecting → Subscribing → Listening → (Closing |
//! Reconnecting). One supervisor task runs at a time; the control plane
//! cancels it through a shared flag the listen loop polls at every
//! 1-second receive tick. Everything inside a connection is sequential —
//! messages relay in arrival order and a slow translation simply delays
//! the next frame (deliberate backpressure).
//!
//! Restarting the supervisor is the only way registry changes reach the
//! subscription set; there is no dynamic subscribe/unsubscribe.

use crate::api::ChatApi;
use crate::classify::{InboundEvent, classify, should_relay};
use crate::codec::{self, Decoded};
use crate::config::Config;
use crate::errors::RelayError;
use crate::relay::Relay;
use crate::session::SessionManager;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, warn};

/// How long the listen loop blocks on receive before re-checking the
/// cancellation flag.
const RECEIVE_TICK: Duration = Duration::from_secs(1);
/// How long the control plane waits for the task to wind down.
const STOP_WAIT: Duration = Duration::from_secs(5);
/// Granularity of backoff sleeps, so cancellation interrupts them.
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// One subscription the connection holds: id and destination. Rebuilt at
/// each connection establishment, discarded on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: u64,
    pub destination: String,
}

/// Static topics plus one entry per private room, ids sequential from 0.
pub fn build_subscriptions(domain_id: &str, private_rooms: &[String]) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(3 + private_rooms.len());
    let mut next_id = 0u64;
    for destination in [
        "/topic/chat-messages-all".to_string(),
        "/user/topic/direct-message".to_string(),
        "/user/topic/room-membership-changed-event".to_string(),
    ] {
        subscriptions.push(Subscription {
            id: next_id,
            destination,
        });
        next_id += 1;
    }
    for room in private_rooms {
        subscriptions.push(Subscription {
            id: next_id,
            destination: format!("/topic/chat-messages-room/{domain_id}/{room}"),
        });
        next_id += 1;
    }
    subscriptions
}

/// Handle the control plane keeps on a running supervisor task.
pub struct ClientHandle {
    stop: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl ClientHandle {
    /// Signal cancellation and wait (bounded) for the task to finish.
    /// Returns false if the task outlived the wait — the caller proceeds
    /// anyway and surfaces a warning.
    pub async fn stop(self) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        match tokio::time::timeout(STOP_WAIT, self.handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!("client task did not stop within {STOP_WAIT:?}");
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub struct Supervisor {
    ws_url: String,
    domain_id: String,
    bot_user_id: String,
    tls: Option<Arc<rustls::ClientConfig>>,
    api: Arc<ChatApi>,
    sessions: Arc<SessionManager>,
    relay: Relay,
}

impl Supervisor {
    pub fn new(
        config: &Config,
        api: Arc<ChatApi>,
        sessions: Arc<SessionManager>,
        relay: Relay,
    ) -> anyhow::Result<Self> {
        let tls = crate::tls::websocket_tls_config(
            &config.cert_path,
            &config.key_path,
            &config.ca_bundle_path,
        )?;
        Ok(Self::with_parts(
            config.websocket_url(),
            config.domain_id.clone(),
            config.bot_user_id.clone(),
            Some(tls),
            api,
            sessions,
            relay,
        ))
    }

    /// Assemble from already-built parts. Tests use this to point at a
    /// plain `ws://` endpoint without TLS material.
    pub fn with_parts(
        ws_url: String,
        domain_id: String,
        bot_user_id: String,
        tls: Option<Arc<rustls::ClientConfig>>,
        api: Arc<ChatApi>,
        sessions: Arc<SessionManager>,
        relay: Relay,
    ) -> Self {
        Self {
            ws_url,
            domain_id,
            bot_user_id,
            tls,
            api,
            sessions,
            relay,
        }
    }

    /// Start the supervisor on a background task.
    pub fn spawn(self) -> ClientHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = tokio::spawn(async move {
            self.run(flag).await;
        });
        ClientHandle { stop, handle }
    }

    /// Reconnect loop. Exits only on cancellation.
    async fn run(self, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::SeqCst) {
            match self.run_connection(&stop).await {
                Ok(()) => {
                    info!("client cancelled, closing without reconnect");
                    break;
                }
                Err(e) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let delay = e.reconnect_delay();
                    warn!("connection ended: {e}; reconnecting in {delay:?}");
                    if wait_with_cancel(&stop, delay).await {
                        break;
                    }
                }
            }
        }
        info!("client task finished");
    }

    /// One full connection cycle: connect, subscribe, listen.
    /// `Ok(())` means cancellation was observed; every other exit is an
    /// error the reconnect loop acts on.
    async fn run_connection(&self, stop: &AtomicBool) -> Result<(), RelayError> {
        // Fresh session and private-room list every cycle; the registry
        // is re-read per message, so restart is the staleness bound.
        let session = self.sessions.get_session().await?;
        let private_rooms = self
            .api
            .private_rooms(&session)
            .await
            .map_err(|e| RelayError::Transport(format!("{e:#}")))?;

        debug!("connecting to {}", self.ws_url);
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::Transport(format!("bad websocket url: {e}")))?;
        request.headers_mut().insert(
            "Cookie",
            format!("SESSION={session}")
                .parse()
                .map_err(|_| RelayError::Transport("invalid session cookie".into()))?,
        );

        let connector = self
            .tls
            .clone()
            .map(tokio_tungstenite::Connector::Rustls);
        let (ws_stream, response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| RelayError::Transport(format!("websocket connect: {e}")))?;
        info!("connected (status: {})", response.status());
        let (mut write, mut read) = ws_stream.split();

        // Subscribing: CONNECT, then one SUBSCRIBE per destination.
        // Fire-and-continue — no acknowledgement is awaited.
        write
            .send(Message::text(codec::connect_frame()))
            .await
            .map_err(|e| RelayError::Transport(format!("send CONNECT: {e}")))?;
        let subscriptions = build_subscriptions(&self.domain_id, &private_rooms);
        for subscription in &subscriptions {
            write
                .send(Message::text(codec::subscribe_frame(
                    subscription.id,
                    &subscription.destination,
                )))
                .await
                .map_err(|e| RelayError::Transport(format!("send SUBSCRIBE: {e}")))?;
        }
        info!(
            "sent {} subscriptions, listening for messages",
            subscriptions.len()
        );

        // Listening: bounded receive so cancellation is observed within
        // one tick.
        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            let next = match tokio::time::timeout(RECEIVE_TICK, read.next()).await {
                Err(_) => continue,
                Ok(None) => return Err(RelayError::ConnectionClosed),
                Ok(Some(next)) => next,
            };
            match next {
                Ok(Message::Text(text)) => self.handle_frame(text.as_str()).await,
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        error!("failed to send pong: {e}");
                    }
                }
                Ok(Message::Close(_)) => return Err(RelayError::ConnectionClosed),
                Ok(_) => {}
                Err(e) => return Err(RelayError::Transport(e.to_string())),
            }
        }
    }

    /// Decode, classify, and route one frame. Per-message failures are
    /// logged here and never surface to the connection.
    async fn handle_frame(&self, raw: &str) {
        let payload = match codec::decode(raw) {
            Ok(Decoded::Event(payload)) => payload,
            Ok(Decoded::Control | Decoded::Empty) => return,
            Err(e) => {
                error!("dropping undecodable frame: {e}");
                return;
            }
        };

        let event = classify(&payload);
        if let InboundEvent::MembershipChange(change) = &event {
            let room = change.room_name.as_deref().unwrap_or("<unknown>");
            if change.is_private_room_add() {
                info!("bot added to private room {room}; restart to subscribe");
            } else if change.is_private_room_remove() {
                info!("bot removed from private room {room}");
            }
            return;
        }

        if let Some(message) = should_relay(&event, &self.bot_user_id)
            && let Err(e) = self.relay.relay(message).await
        {
            // Translation/post failures drop the message, not the stream.
            error!("failed to relay message {}: {e}", message.id);
        }
    }
}

/// Sleep in small slices so a cancellation request interrupts the wait.
/// Returns true if cancellation arrived before the delay elapsed.
async fn wait_with_cancel(stop: &AtomicBool, delay: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + delay;
    while tokio::time::Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(CANCEL_POLL).await;
    }
    stop.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests;
