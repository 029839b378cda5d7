//! Invite-link encoding (§6 "Invite link encoding")
//!
//! An Invite distributed as a URL is UTF-8 JSON, base64url-nopad, placed in
//! a URL fragment as `#invite=<code>`. Rendezvous hints of the form
//! `signal-ws:<ws-url>#sid=<hex>` are optional and relay-agnostic.

use crate::crypto::{b64url_decode, b64url_encode};
use crate::error::{Error, Result};
use crate::invite::Invite;

const FRAGMENT_KEY: &str = "#invite=";

/// Encode an Invite as a `#invite=<code>` fragment.
pub fn encode(invite: &Invite) -> Result<String> {
    let json = serde_json::to_vec(invite)?;
    Ok(format!("{FRAGMENT_KEY}{}", b64url_encode(&json)))
}

/// Decode a `#invite=<code>` fragment (the leading `#invite=` is optional;
/// callers may pass just the code).
pub fn decode(fragment: &str) -> Result<Invite> {
    let code = fragment.strip_prefix(FRAGMENT_KEY).unwrap_or(fragment);
    let bytes = b64url_decode(code)?;
    let invite: Invite = serde_json::from_slice(&bytes)?;
    Ok(invite)
}

/// A `signal-ws:<ws-url>#sid=<hex>` rendezvous hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousHint {
    pub ws_url: String,
    pub session_id_hex: String,
}

/// Parse a `signal-ws:` rendezvous hint.
pub fn parse_rendezvous_hint(hint: &str) -> Result<RendezvousHint> {
    let rest = hint
        .strip_prefix("signal-ws:")
        .ok_or_else(|| Error::InvalidIdentifier("not a signal-ws: hint".into()))?;
    let (ws_url, sid_part) = rest
        .split_once('#')
        .ok_or_else(|| Error::InvalidIdentifier("missing '#sid=' in rendezvous hint".into()))?;
    let session_id_hex = sid_part
        .strip_prefix("sid=")
        .ok_or_else(|| Error::InvalidIdentifier("missing 'sid=' in rendezvous hint".into()))?;
    if !session_id_hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidIdentifier(
            "session id must be hex-only".into(),
        ));
    }
    Ok(RendezvousHint {
        ws_url: ws_url.to_string(),
        session_id_hex: session_id_hex.to_string(),
    })
}

/// Render a rendezvous hint back to its wire form.
pub fn format_rendezvous_hint(hint: &RendezvousHint) -> String {
    format!("signal-ws:{}#sid={}", hint.ws_url, hint.session_id_hex)
}
