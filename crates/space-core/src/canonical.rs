//! Canonical signature inputs (§4.1, §6)
//!
//! Every signed object's input is: an ASCII domain separator terminated by
//! `\n`, followed by a concatenation of netstrings in the field order given
//! in spec §6. Extensible sub-objects are JCS bytes embedded as a single
//! netstring.

use crate::netstring::{write, write_str, write_u64};

/// Domain separator for [`crate::identity::DelegationCert`].
pub const DOMAIN_DELEGATION: &str = "p2pspace/delegation/v0";
/// Domain separator for [`crate::genesis::SpaceGenesis`].
pub const DOMAIN_SPACE_GENESIS: &str = "p2pspace/space-genesis/v0";
/// Domain separator for [`crate::invite::InviteIssuerCertificate`].
pub const DOMAIN_INVITE_ISSUER: &str = "p2pspace/invite-issuer/v0";
/// Domain separator for [`crate::invite::Invite`].
pub const DOMAIN_INVITE: &str = "p2pspace/invite/v0";
/// Domain separator for [`crate::event::Event`].
pub const DOMAIN_EVENT: &str = "p2pspace/event/v0";
/// Domain separator for a peer record (§6 "Peer record").
pub const DOMAIN_PEER: &str = "p2pspace/peer/v0";
/// Domain separator for the invite proof-of-work input (§4.4).
pub const DOMAIN_POW: &str = "p2pspace/pow/v0";

fn domain_prefix(out: &mut Vec<u8>, domain: &str) {
    out.extend_from_slice(domain.as_bytes());
    out.push(b'\n');
}

/// Delegation sigInput: `v, principal_id, principal_pub, device_id,
/// device_pub, not_before_ts, expires_ts, count(scopes), scopes…`
#[allow(clippy::too_many_arguments)]
pub fn delegation_sig_input(
    v: u64,
    principal_id: &str,
    principal_pub: &[u8; 32],
    device_id: &str,
    device_pub: &[u8; 32],
    not_before_ts: u64,
    expires_ts: u64,
    scopes: &[String],
) -> Vec<u8> {
    let mut out = Vec::new();
    domain_prefix(&mut out, DOMAIN_DELEGATION);
    write_u64(&mut out, v);
    write_str(&mut out, principal_id);
    write(&mut out, principal_pub);
    write_str(&mut out, device_id);
    write(&mut out, device_pub);
    write_u64(&mut out, not_before_ts);
    write_u64(&mut out, expires_ts);
    write_u64(&mut out, scopes.len() as u64);
    for scope in scopes {
        write_str(&mut out, scope);
    }
    out
}

/// Space genesis sigInput: `v, space_id, space_root_pub, created_ts,
/// name-or-empty`
pub fn space_genesis_sig_input(
    v: u64,
    space_id: &str,
    space_root_pub: &[u8; 32],
    created_ts: u64,
    name: Option<&str>,
) -> Vec<u8> {
    let mut out = Vec::new();
    domain_prefix(&mut out, DOMAIN_SPACE_GENESIS);
    write_u64(&mut out, v);
    write_str(&mut out, space_id);
    write(&mut out, space_root_pub);
    write_u64(&mut out, created_ts);
    write_str(&mut out, name.unwrap_or(""));
    out
}

/// IIC sigInput: `v, space_id, space_root_pub, issuer_principal_id,
/// issuer_principal_pub, not_before_ts, expires_ts, count(allowed_scopes),
/// allowed_scopes…`
#[allow(clippy::too_many_arguments)]
pub fn iic_sig_input(
    v: u64,
    space_id: &str,
    space_root_pub: &[u8; 32],
    issuer_principal_id: &str,
    issuer_principal_pub: &[u8; 32],
    not_before_ts: u64,
    expires_ts: u64,
    allowed_scopes: &[String],
) -> Vec<u8> {
    let mut out = Vec::new();
    domain_prefix(&mut out, DOMAIN_INVITE_ISSUER);
    write_u64(&mut out, v);
    write_str(&mut out, space_id);
    write(&mut out, space_root_pub);
    write_str(&mut out, issuer_principal_id);
    write(&mut out, issuer_principal_pub);
    write_u64(&mut out, not_before_ts);
    write_u64(&mut out, expires_ts);
    write_u64(&mut out, allowed_scopes.len() as u64);
    for scope in allowed_scopes {
        write_str(&mut out, scope);
    }
    out
}

/// Invite sigInput: `v, space_id, invite_id, issued_ts, expires_ts,
/// issuer_principal_id, issuer_device_id, issuer_device_pub,
/// issuer_delegation.sig, invite_issuer.sig-or-empty, constraints_jcs,
/// bootstrap_jcs`
#[allow(clippy::too_many_arguments)]
pub fn invite_sig_input(
    v: u64,
    space_id: &str,
    invite_id: &str,
    issued_ts: u64,
    expires_ts: u64,
    issuer_principal_id: &str,
    issuer_device_id: &str,
    issuer_device_pub: &[u8; 32],
    issuer_delegation_sig: &[u8],
    invite_issuer_sig: Option<&[u8]>,
    constraints_jcs: &[u8],
    bootstrap_jcs: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    domain_prefix(&mut out, DOMAIN_INVITE);
    write_u64(&mut out, v);
    write_str(&mut out, space_id);
    write_str(&mut out, invite_id);
    write_u64(&mut out, issued_ts);
    write_u64(&mut out, expires_ts);
    write_str(&mut out, issuer_principal_id);
    write_str(&mut out, issuer_device_id);
    write(&mut out, issuer_device_pub);
    write(&mut out, issuer_delegation_sig);
    write(&mut out, invite_issuer_sig.unwrap_or(&[]));
    write(&mut out, constraints_jcs);
    write(&mut out, bootstrap_jcs);
    out
}

/// Event sigInput: `v, space_id, room_id, author_principal_id,
/// author_device_id, author_device_pub, delegation.sig, ts, kind,
/// count(prev), prev…, body_jcs`
#[allow(clippy::too_many_arguments)]
pub fn event_sig_input(
    v: u64,
    space_id: &str,
    room_id: &str,
    author_principal_id: &str,
    author_device_id: &str,
    author_device_pub: &[u8; 32],
    delegation_sig: &[u8],
    ts: u64,
    kind: &str,
    prev: &[String],
    body_jcs: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    domain_prefix(&mut out, DOMAIN_EVENT);
    write_u64(&mut out, v);
    write_str(&mut out, space_id);
    write_str(&mut out, room_id);
    write_str(&mut out, author_principal_id);
    write_str(&mut out, author_device_id);
    write(&mut out, author_device_pub);
    write(&mut out, delegation_sig);
    write_u64(&mut out, ts);
    write_str(&mut out, kind);
    write_u64(&mut out, prev.len() as u64);
    for id in prev {
        write_str(&mut out, id);
    }
    write(&mut out, body_jcs);
    out
}

/// Peer record sigInput: `v, principal_id, principal_pub, device_id,
/// device_pub, delegation.sig, ts, expires_ts, addrs_jcs`
#[allow(clippy::too_many_arguments)]
pub fn peer_sig_input(
    v: u64,
    principal_id: &str,
    principal_pub: &[u8; 32],
    device_id: &str,
    device_pub: &[u8; 32],
    delegation_sig: &[u8],
    ts: u64,
    expires_ts: u64,
    addrs_jcs: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    domain_prefix(&mut out, DOMAIN_PEER);
    write_u64(&mut out, v);
    write_str(&mut out, principal_id);
    write(&mut out, principal_pub);
    write_str(&mut out, device_id);
    write(&mut out, device_pub);
    write(&mut out, delegation_sig);
    write_u64(&mut out, ts);
    write_u64(&mut out, expires_ts);
    write(&mut out, addrs_jcs);
    out
}

/// Proof-of-work input (§4.4): plain concatenation (not netstring-framed),
/// as specified: `domain || invite_id || 0x00 || joiner_principal_id || 0x00
/// || pow_nonce`.
pub fn pow_input(invite_id: &str, joiner_principal_id: &str, pow_nonce: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(DOMAIN_POW.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(invite_id.as_bytes());
    out.push(0u8);
    out.extend_from_slice(joiner_principal_id.as_bytes());
    out.push(0u8);
    out.extend_from_slice(pow_nonce);
    out
}

/// JCS-serialize `value`, falling back to `{}`/`[]`-shaped empty payloads
/// when the object is conceptually absent (§6 "use `{}` / `[]` when absent").
pub fn jcs_or_empty_object<T: serde::Serialize>(value: &Option<T>) -> crate::error::Result<Vec<u8>> {
    match value {
        Some(v) => crate::jcs::to_vec(v),
        None => Ok(b"{}".to_vec()),
    }
}
