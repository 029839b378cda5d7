//! Acceptance pipeline (§4.7): the five-step gate every inbound Event must
//! pass before it is durably appended.

use serde::{Deserialize, Serialize};

use crate::dag::RoomLog;
use crate::error::Error;
use crate::event::Event;
use crate::governance::{GovernancePolicy, GovernanceState, SpaceRootOnlyPolicy, GOVERNANCE_ROOM};
use crate::invite::Invite;
use crate::limits::event_limit_violation;

/// Known event kinds (§6 "Event kinds (v0)"). Anything else is `unknown_kind`.
const KNOWN_KINDS: &[&str] = &[
    "MSG_POST",
    "MSG_EDIT",
    "MSG_REDACT",
    "REACTION_ADD",
    "REACTION_REMOVE",
    "PIN_ADD",
    "PIN_REMOVE",
    "SPACE_POLICY_SET",
    "ROLE_DEFINE",
    "ROLE_GRANT",
    "ROLE_REVOKE",
    "MEMBER_BAN",
    "MEMBER_UNBAN",
    "INVITE_ISSUE",
    "INVITE_REVOKE",
    "MEMBER_JOIN",
    "ROOM_DEFINE",
    "ROOM_ARCHIVE",
    "DEVICE_REVOKE",
];

/// The error taxonomy returned by the acceptance pipeline and sync (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("encoding invalid")]
    EncodingInvalid,
    #[error("id mismatch")]
    IdMismatch,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("delegation window")]
    DelegationWindow,
    #[error("delegation scope missing")]
    DelegationScopeMissing,
    #[error("invite invalid")]
    InviteInvalid,
    #[error("invite expired")]
    InviteExpired,
    #[error("pow insufficient")]
    PowInsufficient,
    #[error("not a member")]
    NotAMember,
    #[error("banned")]
    Banned,
    #[error("limits exceeded")]
    LimitsExceeded,
    #[error("peer rate limited")]
    PeerRateLimited,
    #[error("transport closed")]
    TransportClosed,
}

impl From<Error> for RejectReason {
    fn from(e: Error) -> Self {
        match e {
            Error::IdMismatch { .. } => RejectReason::IdMismatch,
            Error::InvalidSignature | Error::InvalidSignatureEncoding(_) => {
                RejectReason::SignatureInvalid
            }
            Error::Json(_) | Error::MalformedNetstring(_) | Error::NonFiniteFloat => {
                RejectReason::EncodingInvalid
            }
            Error::InvalidPublicKey(_) | Error::InvalidIdentifier(_) | Error::Base64(_) => {
                RejectReason::EncodingInvalid
            }
            Error::MissingField(_) => RejectReason::EncodingInvalid,
        }
    }
}

/// Informational outcome of an accepted event (§7: `unknown_kind` and
/// `orphan` are "informational, not an error").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub unknown_kind: bool,
    pub orphan: bool,
}

/// The required delegation scope suffix for `kind` (§4.7 step 2).
fn required_scope_suffix(kind: &str) -> &'static str {
    if kind == "MEMBER_JOIN" {
        "join"
    } else if kind.starts_with("MSG_") || kind.starts_with("REACTION_") || kind.starts_with("PIN_")
    {
        "post"
    } else if KNOWN_KINDS.contains(&kind) {
        "governance"
    } else {
        "post"
    }
}

/// Everything `accept_event` needs beyond the event itself: the Space's
/// root key, the current wall-clock time, the governance state derived from
/// the governance-room DAG so far, and the target room's log (to detect
/// orphans).
pub struct AcceptanceContext<'a> {
    pub space_root_pub: [u8; 32],
    pub now_ms: u64,
    pub governance_state: &'a GovernanceState,
    pub room_log: &'a dyn RoomLog,
    pub governance_policy: &'a dyn GovernancePolicy,
}

/// Run the full §4.7 pipeline against one inbound event. Does not persist;
/// callers append to the room log themselves once `Ok` is returned.
pub fn accept_event(ctx: &AcceptanceContext, event: &Event) -> Result<Accepted, RejectReason> {
    // 1. Syntax and length caps.
    if event_limit_violation(event).is_some() {
        return Err(RejectReason::LimitsExceeded);
    }

    // 2. Cryptographic validation (event_id, device id, signature).
    event.verify().map_err(RejectReason::from)?;

    // Required scope for this event's kind.
    let required_scope = format!(
        "space:{}:{}",
        event.space_id,
        required_scope_suffix(&event.kind)
    );
    if !event.delegation.has_scope(&required_scope) {
        return Err(RejectReason::DelegationScopeMissing);
    }

    // 3. Delegation validity window (±10 min skew), plus its own signature
    //    and identity checks.
    event.delegation.verify(ctx.now_ms).map_err(|e| match e {
        Error::InvalidSignature | Error::InvalidSignatureEncoding(_) => {
            RejectReason::SignatureInvalid
        }
        _ => RejectReason::DelegationWindow,
    })?;

    // 4. Authorization.
    if event.room_id == GOVERNANCE_ROOM {
        if event.kind == "MEMBER_JOIN" {
            authorize_member_join(event, ctx)?;
        } else if !ctx
            .governance_policy
            .authorizes(&event.author_principal_id, &event.space_id, ctx.governance_state)
        {
            return Err(RejectReason::NotAMember);
        }
    } else {
        if ctx.governance_state.banned.contains(&event.author_principal_id) {
            return Err(RejectReason::Banned);
        }
        if !ctx.governance_state.members.contains(&event.author_principal_id) {
            return Err(RejectReason::NotAMember);
        }
    }

    // 5. (informational) unknown kind / orphan.
    let unknown_kind = !KNOWN_KINDS.contains(&event.kind.as_str());
    let orphan = event.prev.iter().any(|p| !ctx.room_log.has(p));

    Ok(Accepted { unknown_kind, orphan })
}

#[derive(Debug, Deserialize)]
struct JoinBody {
    principal_id: String,
    principal_pub: String,
    invite: Invite,
}

fn authorize_member_join(event: &Event, ctx: &AcceptanceContext) -> Result<(), RejectReason> {
    let body: JoinBody =
        serde_json::from_value(event.body.clone()).map_err(|_| RejectReason::EncodingInvalid)?;
    if body.principal_id != event.author_principal_id {
        return Err(RejectReason::InviteInvalid);
    }
    if body.principal_pub != event.delegation.principal_pub {
        return Err(RejectReason::InviteInvalid);
    }
    if body.invite.space_id != event.space_id {
        return Err(RejectReason::InviteInvalid);
    }
    body.invite
        .verify(&ctx.space_root_pub, ctx.now_ms)
        .map_err(|e| match e {
            Error::InvalidIdentifier(msg) if msg.contains("expired") => RejectReason::InviteExpired,
            _ => RejectReason::InviteInvalid,
        })?;
    Ok(())
}
