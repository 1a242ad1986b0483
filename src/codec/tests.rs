use super::*;
use serde_json::json;

/// Build a wire frame the way the server does: STOMP text, JSON body,
/// NUL terminator, array envelope, SockJS `a` prefix.
fn message_frame(body: &serde_json::Value) -> String {
    let stomp = format!(
        "MESSAGE\ndestination:/topic/chat-messages-all\ncontent-type:application/json\n\n{body}\u{0}"
    );
    format!("a{}", json!([stomp]))
}

#[test]
fn test_connect_frame_shape() {
    let frame = connect_frame();
    assert!(frame.starts_with("[\"CONNECT"));
    assert!(frame.contains("accept-version:1.2"));
    assert!(frame.contains("heart-beat:0,0"));
    assert!(frame.contains("\\u0000"));

    // The envelope must itself be valid one-element JSON.
    let parsed: Vec<String> = serde_json::from_str(&frame).unwrap();
    assert_eq!(parsed.len(), 1);
    assert!(parsed[0].ends_with('\u{0}'));
}

#[test]
fn test_subscribe_frame_carries_id_and_destination() {
    let frame = subscribe_frame(2, "/user/topic/direct-message");
    let parsed: Vec<String> = serde_json::from_str(&frame).unwrap();
    assert!(parsed[0].contains("id:sub-2"));
    assert!(parsed[0].contains("destination:/user/topic/direct-message"));
}

#[test]
fn test_heartbeat_and_connected_are_control() {
    assert_eq!(decode("o").unwrap(), Decoded::Control);
    assert_eq!(
        decode("a[\"CONNECTED\\nversion:1.2\\n\\n\\u0000\"]").unwrap(),
        Decoded::Control
    );
}

#[test]
fn test_decode_message_frame() {
    let raw = message_frame(&json!({
        "userId": "u1",
        "sender": "sam",
        "roomName": "alpha",
        "text": "hello",
    }));
    let Decoded::Event(value) = decode(&raw).unwrap() else {
        panic!("expected an event");
    };
    assert_eq!(value["roomName"], "alpha");
    assert_eq!(value["text"], "hello");
}

#[test]
fn test_quote_bearing_text_round_trips_exactly() {
    let original = r#"she said "hello there" and left"#;
    let raw = message_frame(&json!({"userId": "u1", "text": original, "roomName": "alpha"}));
    let Decoded::Event(value) = decode(&raw).unwrap() else {
        panic!("expected an event");
    };
    assert_eq!(value["text"].as_str().unwrap(), original);
}

#[test]
fn test_tolerant_path_restores_over_escaped_quotes() {
    // An unenveloped, over-escaped frame: nested quotes arrive as `\\"`,
    // ordinary quotes as `\"`. The strict path rejects it.
    let raw = "MESSAGE\ndestination:/topic/x\n\n{\\\"text\\\":\\\"say \\\\\\\"hi\\\\\\\" now\\\",\\\"userId\\\":\\\"u1\\\"}\u{0}";
    let Decoded::Event(value) = decode(raw).unwrap() else {
        panic!("expected an event");
    };
    assert_eq!(value["text"].as_str().unwrap(), "say \"hi\" now");
    assert_eq!(value["userId"], "u1");
}

#[test]
fn test_bodyless_frame_is_empty() {
    let raw = format!("a{}", json!(["RECEIPT\nreceipt-id:1\n\n\u{0}"]));
    assert_eq!(decode(&raw).unwrap(), Decoded::Empty);
}

#[test]
fn test_malformed_json_is_a_decode_error() {
    let raw = format!("a{}", json!(["MESSAGE\n\n{broken}\u{0}"]));
    let err = decode(&raw).unwrap_err();
    assert!(matches!(err, crate::errors::RelayError::Decode(_)), "{err:?}");
}

#[test]
fn test_balanced_extraction_ignores_braces_in_strings() {
    let raw = message_frame(&json!({"userId": "u1", "text": "code: fn main() { loop {} }", "roomName": "alpha"}));
    let Decoded::Event(value) = decode(&raw).unwrap() else {
        panic!("expected an event");
    };
    assert_eq!(value["text"], "code: fn main() { loop {} }");
}

#[test]
fn test_balanced_object_helper() {
    assert_eq!(balanced_object("xx {\"a\":1} yy"), Some("{\"a\":1}"));
    assert_eq!(
        balanced_object("{\"a\":{\"b\":2}} trailing {\"c\":3}"),
        Some("{\"a\":{\"b\":2}}")
    );
    assert_eq!(balanced_object("no object"), None);
    assert_eq!(balanced_object("{unclosed"), None);
}
