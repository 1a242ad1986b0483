//! STOMP-over-JSON frame codec.
//!
//! The transport multiplexes STOMP text frames inside one-element JSON
//! arrays, SockJS-style: `o` opens the stream, `a[...]` carries frames.
//! Outbound frames are `COMMAND\nheader:value\n…\n\n\0` wrapped in an
//! array. Inbound MESSAGE frames carry a JSON object as the STOMP body.
//!
//! Decoding is two-stage: strip the array envelope, tokenize the STOMP
//! frame (command, headers, body up to the NUL terminator), then strictly
//! parse the body as JSON. Some upstream relays over-escape the payload,
//! so a tolerant fallback handles frames the strict path rejects.

use crate::errors::RelayError;
use serde_json::Value;
use std::sync::OnceLock;

/// Sentinel standing in for escaped nested quotes while backslash escapes
/// are stripped in the tolerant path. Random per process so message text
/// cannot collide with it.
fn quote_sentinel() -> &'static str {
    static SENTINEL: OnceLock<String> = OnceLock::new();
    SENTINEL.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

/// Result of decoding one raw transport frame.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// Heartbeat or connection acknowledgement — nothing to route.
    Control,
    /// A MESSAGE frame's JSON payload.
    Event(Value),
    /// A frame with no JSON body (e.g. bare RECEIPT); safely ignorable.
    Empty,
}

/// STOMP CONNECT frame, array-wrapped for the transport.
pub fn connect_frame() -> String {
    wrap("CONNECT\naccept-version:1.2\nheart-beat:0,0\n\n\0")
}

/// STOMP SUBSCRIBE frame for a destination. Ids render as `sub-N` and must
/// stay unique per connection.
pub fn subscribe_frame(id: u64, destination: &str) -> String {
    wrap(&format!(
        "SUBSCRIBE\nid:sub-{id}\ndestination:{destination}\n\n\0"
    ))
}

fn wrap(frame: &str) -> String {
    // serde_json handles the newline and NUL escaping inside the envelope.
    Value::Array(vec![Value::String(frame.to_string())]).to_string()
}

/// Decode one raw frame into a routable event.
///
/// Heartbeats (bare `o`) and connection acks (anything containing
/// `CONNECTED`) never carry a payload. Malformed JSON is an error the
/// caller logs and drops — it must never end the connection.
pub fn decode(raw: &str) -> Result<Decoded, RelayError> {
    if raw == "o" || raw.contains("CONNECTED") {
        return Ok(Decoded::Control);
    }

    // Stage 1: envelope. SockJS data frames are `a` followed by an array.
    let envelope = raw.strip_prefix('a').unwrap_or(raw);
    if let Ok(Value::Array(frames)) = serde_json::from_str::<Value>(envelope) {
        for frame in &frames {
            let Some(text) = frame.as_str() else { continue };
            // Stage 2: STOMP tokenize + strict body parse.
            if let Some(body) = stomp_body(text)
                && let Ok(value) = serde_json::from_str::<Value>(body)
            {
                return Ok(Decoded::Event(value));
            }
        }
    }

    // Fallback for frames the strict path could not handle.
    tolerant_decode(raw)
}

/// Extract the body of a STOMP text frame: everything between the blank
/// line ending the headers and the NUL terminator.
fn stomp_body(frame: &str) -> Option<&str> {
    let (_, body) = frame.split_once("\n\n")?;
    let body = body.split('\0').next().unwrap_or(body).trim();
    if body.is_empty() { None } else { Some(body) }
}

/// Tolerant path for over-escaped frames: protect escaped nested quotes
/// with a sentinel, strip the remaining backslash escapes, pull out the
/// first balanced `{…}` substring, parse it, and restore the literal
/// quotes inside `text` so message bodies round-trip exactly.
fn tolerant_decode(raw: &str) -> Result<Decoded, RelayError> {
    let sentinel = quote_sentinel();
    let cleaned = raw.replace("\\\\\\\"", sentinel).replace('\\', "");

    let Some(candidate) = balanced_object(&cleaned) else {
        return Ok(Decoded::Empty);
    };

    let mut value: Value = serde_json::from_str(candidate)
        .map_err(|e| RelayError::Decode(format!("{e}: {candidate}")))?;

    restore_quotes(&mut value, sentinel);
    Ok(Decoded::Event(value))
}

/// First balanced `{…}` substring, tracking nesting depth and skipping
/// braces inside string literals.
fn balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Swap sentinel occurrences back to literal quotes in every string value.
fn restore_quotes(value: &mut Value, sentinel: &str) {
    match value {
        Value::String(s) if s.contains(sentinel) => {
            *s = s.replace(sentinel, "\"");
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                restore_quotes(v, sentinel);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                restore_quotes(v, sentinel);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests;
