//! Local policy limits (§6 "Limits")

use crate::event::Event;

pub const MAX_ID_LEN: usize = 256;
pub const MAX_PUBLIC_KEY_LEN: usize = 4096;
pub const MAX_SIGNATURE_LEN: usize = 2048;
pub const MAX_PREV_ENTRIES: usize = 64;
pub const MAX_DELEGATION_SCOPES: usize = 64;
pub const MAX_MESSAGE_TEXT_CHARS: usize = 2000;
pub const MAX_WIRE_MESSAGE_BYTES: usize = 256 * 1024;
pub const MAX_SDP_CODE_BYTES: usize = 128 * 1024;
pub const MAX_SYNC_HEADS: usize = 256;
pub const MAX_SYNC_WANT: usize = 256;
pub const MAX_SYNC_HAVE: usize = 64;

/// Returns a short machine-readable reason if `event` violates a field-
/// length or size cap, or `None` if it is within limits.
pub fn event_limit_violation(event: &Event) -> Option<&'static str> {
    if event.space_id.len() > MAX_ID_LEN {
        return Some("space_id too long");
    }
    if event.room_id.len() > MAX_ID_LEN {
        return Some("room_id too long");
    }
    if event.event_id.len() > MAX_ID_LEN {
        return Some("event_id too long");
    }
    if event.kind.len() > MAX_ID_LEN {
        return Some("kind too long");
    }
    if event.prev.len() > MAX_PREV_ENTRIES {
        return Some("prev exceeds max entries");
    }
    if event.delegation.scopes.len() > MAX_DELEGATION_SCOPES {
        return Some("delegation scopes exceed max entries");
    }
    if event.author_device_pub.len() > MAX_PUBLIC_KEY_LEN {
        return Some("author_device_pub too long");
    }
    if event.sig.len() > MAX_SIGNATURE_LEN {
        return Some("sig too long");
    }
    if event.kind == "MSG_POST" {
        if let Some(text) = event.body.get("text").and_then(|v| v.as_str()) {
            if text.chars().count() > MAX_MESSAGE_TEXT_CHARS {
                return Some("message text exceeds max length");
            }
        }
    }
    None
}

/// Whether a session id is hex-only, as §6 requires.
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty() && session_id.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, TestCsprng};
    use crate::identity::Identity;
    use serde_json::json;

    #[test]
    fn accepts_ordinary_event() {
        let mut rng = TestCsprng::new(1);
        let mut id = Identity::create(&mut rng);
        let clock = FixedClock(1_000);
        let e = Event::create(&mut id, "s", "general", "MSG_POST", json!({"text":"hi"}), vec![], &clock).unwrap();
        assert!(event_limit_violation(&e).is_none());
    }

    #[test]
    fn rejects_oversized_message_text() {
        let mut rng = TestCsprng::new(2);
        let mut id = Identity::create(&mut rng);
        let clock = FixedClock(1_000);
        let long_text = "a".repeat(2001);
        let e = Event::create(&mut id, "s", "general", "MSG_POST", json!({"text": long_text}), vec![], &clock).unwrap();
        assert_eq!(event_limit_violation(&e), Some("message text exceeds max length"));
    }

    #[test]
    fn session_id_must_be_hex() {
        assert!(is_valid_session_id("deadbeef"));
        assert!(!is_valid_session_id("not-hex!"));
        assert!(!is_valid_session_id(""));
    }
}
