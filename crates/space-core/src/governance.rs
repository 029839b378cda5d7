//! Governance state machine (§3 "Governance State", §4.6)
//!
//! A pure fold over the governance-room DAG, evaluated in the deterministic
//! topological order of [`crate::dag::topo_sort`]. Invite verification
//! inside the fold uses the authoring event's own `ts` as "now" rather than
//! a wall clock, so that replaying the same event set always yields the
//! same state (§8 "Determinism") regardless of when the fold runs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dag::topo_sort;
use crate::event::Event;
use crate::invite::Invite;

/// The well-known room carrying admin events for a Space.
pub const GOVERNANCE_ROOM: &str = "governance";

/// `{members, banned}`, the pure fold of the governance-room DAG (§3).
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GovernanceState {
    pub members: HashSet<String>,
    pub banned: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct JoinBody {
    principal_id: String,
    principal_pub: String,
    invite: Invite,
}

#[derive(Debug, Deserialize)]
struct BanBody {
    principal_id: String,
}

impl GovernanceState {
    /// Apply one already-validated event to the state (§4.6). Unrecognized
    /// or malformed bodies are no-ops, matching "other kinds out of scope of
    /// this baseline".
    pub fn apply_one(&mut self, event: &Event, space_root_pub: &[u8; 32]) {
        match event.kind.as_str() {
            "MEMBER_JOIN" => self.apply_member_join(event, space_root_pub),
            "MEMBER_BAN" => {
                if let Ok(body) = serde_json::from_value::<BanBody>(event.body.clone()) {
                    if !body.principal_id.is_empty() {
                        self.banned.insert(body.principal_id);
                    }
                }
            }
            "MEMBER_UNBAN" => {
                if let Ok(body) = serde_json::from_value::<BanBody>(event.body.clone()) {
                    self.banned.remove(&body.principal_id);
                }
            }
            _ => {}
        }
    }

    fn apply_member_join(&mut self, event: &Event, space_root_pub: &[u8; 32]) {
        let Ok(body) = serde_json::from_value::<JoinBody>(event.body.clone()) else {
            return;
        };
        if body.principal_id != event.author_principal_id {
            return;
        }
        if body.principal_pub != event.delegation.principal_pub {
            return;
        }
        if body.invite.space_id != event.space_id {
            return;
        }
        if body.invite.verify(space_root_pub, event.ts).is_err() {
            return;
        }
        self.members.insert(body.principal_id);
    }
}

/// Who may author a non-`MEMBER_JOIN` governance-room event (§4.5 step 4).
/// The baseline restricts these to the Space Root; role-derived permissions
/// are the extension point this trait exists for.
pub trait GovernancePolicy {
    fn authorizes(&self, author_principal_id: &str, space_id: &str, state: &GovernanceState) -> bool;
}

/// Space Root only, with no role derivation.
pub struct SpaceRootOnlyPolicy;

impl GovernancePolicy for SpaceRootOnlyPolicy {
    fn authorizes(&self, author_principal_id: &str, space_id: &str, _state: &GovernanceState) -> bool {
        author_principal_id == space_id
    }
}

/// Fold a topologically-sorted slice of governance-room events into a
/// `GovernanceState` from scratch.
pub fn fold(events: &[Event], space_root_pub: &[u8; 32]) -> GovernanceState {
    let order = topo_sort(events);
    let by_id: std::collections::HashMap<&str, &Event> =
        events.iter().map(|e| (e.event_id.as_str(), e)).collect();
    let mut state = GovernanceState::default();
    for id in order {
        if let Some(event) = by_id.get(id.as_str()) {
            state.apply_one(event, space_root_pub);
        }
    }
    state
}
