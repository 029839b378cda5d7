//! Per-`(space_id, room_id)` state: a `RoomLog` plus, for the governance
//! room, the folded [`GovernanceState`] that authorizes everything else.
//!
//! One [`RoomState`] is held per Room the node has joined, behind its own
//! lock (§5 "no global lock — each (Space, Room) keeps its own append-only
//! log and its own session state").

use std::sync::Arc;

use space_core::acceptance::{self, AcceptanceContext, Accepted, RejectReason};
use space_core::clock::Clock;
use space_core::dag::RoomLog;
use space_core::event::Event;
use space_core::governance::{self, GovernanceState, GOVERNANCE_ROOM};
use space_core::sync::EventAcceptor;

/// A joined Room: its log, its authorization state, and the clock used to
/// evaluate the acceptance pipeline's time-bound checks.
pub struct RoomState {
    pub space_id: String,
    pub room_id: String,
    space_root_pub: [u8; 32],
    log: Box<dyn RoomLog + Send>,
    governance: GovernanceState,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl RoomState {
    pub fn new(
        space_id: impl Into<String>,
        room_id: impl Into<String>,
        space_root_pub: [u8; 32],
        log: Box<dyn RoomLog + Send>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let room_id = room_id.into();
        let governance = if room_id == GOVERNANCE_ROOM {
            let events: Vec<Event> = log.all_ids().iter().filter_map(|id| log.get(id)).collect();
            governance::fold(&events, &space_root_pub)
        } else {
            GovernanceState::default()
        };
        Self { space_id: space_id.into(), room_id, space_root_pub, log, governance, clock }
    }

    pub fn governance_state(&self) -> &GovernanceState {
        &self.governance
    }

    pub fn log(&self) -> &dyn RoomLog {
        self.log.as_ref()
    }

    fn refold_governance(&mut self) {
        let events: Vec<Event> = self.log.all_ids().iter().filter_map(|id| self.log.get(id)).collect();
        self.governance = governance::fold(&events, &self.space_root_pub);
    }
}

impl EventAcceptor for RoomState {
    fn has(&self, event_id: &str) -> bool {
        self.log.has(event_id)
    }

    fn heads(&self) -> Vec<String> {
        self.log.heads()
    }

    fn accept(&mut self, event: &Event) -> Result<Accepted, RejectReason> {
        let ctx = AcceptanceContext {
            space_root_pub: self.space_root_pub,
            now_ms: self.clock.now_ms(),
            governance_state: &self.governance,
            room_log: self.log.as_ref(),
            governance_policy: &governance::SpaceRootOnlyPolicy,
        };
        acceptance::accept_event(&ctx, event)
    }

    fn store(&mut self, event: Event) {
        let is_governance_room = self.room_id == GOVERNANCE_ROOM;
        let event_for_fold = event.clone();
        if self.log.put(event).is_err() {
            return;
        }
        if is_governance_room {
            let parents_present = event_for_fold.prev.iter().all(|p| self.log.has(p));
            if parents_present {
                self.governance.apply_one(&event_for_fold, &self.space_root_pub);
            } else {
                self.refold_governance();
            }
        }
    }
}
