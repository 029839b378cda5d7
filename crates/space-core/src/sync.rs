//! Anti-entropy sync protocol (§4.8, §6 "Sync frames")
//!
//! One [`SyncSession`] per `(space_id, room_id)` per peer (§5 "no global
//! lock"). Frames are exchanged as JSON with a `t` discriminator; `spaceId`/
//! `roomId` are camelCase on the wire, unlike the snake_case entity fields
//! elsewhere in the protocol.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::acceptance::{Accepted, RejectReason};
use crate::event::Event;
use crate::limits::{MAX_SYNC_HAVE, MAX_SYNC_HEADS, MAX_SYNC_WANT};

/// A sync wire frame (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum SyncFrame {
    Hello {
        v: u64,
        #[serde(rename = "spaceId")]
        space_id: String,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Heads {
        v: u64,
        #[serde(rename = "spaceId")]
        space_id: String,
        #[serde(rename = "roomId")]
        room_id: String,
        heads: Vec<String>,
    },
    Want {
        v: u64,
        #[serde(rename = "spaceId")]
        space_id: String,
        #[serde(rename = "roomId")]
        room_id: String,
        ids: Vec<String>,
    },
    Have {
        v: u64,
        #[serde(rename = "spaceId")]
        space_id: String,
        #[serde(rename = "roomId")]
        room_id: String,
        events: Vec<Event>,
    },
}

/// A token bucket: `capacity` burst, refilling at `refill_per_sec` tokens
/// per second (§4.8 "Rate limiting").
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill_ms: u64,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: u32, now_ms: u64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            last_refill_ms: now_ms,
        }
    }

    fn refill(&mut self, now_ms: u64) {
        let elapsed_s = now_ms.saturating_sub(self.last_refill_ms) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_s * self.refill_per_sec).min(self.capacity);
        self.last_refill_ms = now_ms;
    }

    /// Try to spend one token; returns whether it was available.
    pub fn try_take(&mut self, now_ms: u64) -> bool {
        self.refill(now_ms);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// The storage + acceptance seam a [`SyncSession`] drives: look up and
/// store events, and run the acceptance pipeline against inbound ones. The
/// embedder implements this over its `RoomLog` and governance context.
pub trait EventAcceptor {
    fn has(&self, event_id: &str) -> bool;
    fn heads(&self) -> Vec<String>;
    fn accept(&mut self, event: &Event) -> Result<Accepted, RejectReason>;
    fn store(&mut self, event: Event);
}

/// Per-(Space, Room)-per-peer sync session state (§5, §4.8).
pub struct SyncSession {
    pub space_id: String,
    pub room_id: String,
    message_bucket: TokenBucket,
    verify_bucket: TokenBucket,
    last_rate_limit_warn_ms: Option<u64>,
}

impl SyncSession {
    pub fn new(space_id: impl Into<String>, room_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            space_id: space_id.into(),
            room_id: room_id.into(),
            message_bucket: TokenBucket::new(60, 20, now_ms),
            verify_bucket: TokenBucket::new(80, 20, now_ms),
            last_rate_limit_warn_ms: None,
        }
    }

    fn warn_rate_limited(&mut self, now_ms: u64, what: &str) {
        let should_warn = match self.last_rate_limit_warn_ms {
            Some(last) => now_ms.saturating_sub(last) >= 1000,
            None => true,
        };
        if should_warn {
            warn!(space_id = %self.space_id, room_id = %self.room_id, %what, "peer rate limited");
            self.last_rate_limit_warn_ms = Some(now_ms);
        }
    }

    fn take_message_token(&mut self, now_ms: u64) -> Result<(), RejectReason> {
        if self.message_bucket.try_take(now_ms) {
            Ok(())
        } else {
            self.warn_rate_limited(now_ms, "message");
            Err(RejectReason::PeerRateLimited)
        }
    }

    /// Transport just opened: send `hello` then `heads` (§4.8).
    pub fn on_open<A: EventAcceptor>(&mut self, acceptor: &A) -> Vec<SyncFrame> {
        vec![self.hello_frame(), self.heads_frame(acceptor)]
    }

    fn hello_frame(&self) -> SyncFrame {
        SyncFrame::Hello {
            v: 1,
            space_id: self.space_id.clone(),
            room_id: self.room_id.clone(),
        }
    }

    fn heads_frame<A: EventAcceptor>(&self, acceptor: &A) -> SyncFrame {
        let mut heads = acceptor.heads();
        heads.truncate(MAX_SYNC_HEADS);
        SyncFrame::Heads {
            v: 1,
            space_id: self.space_id.clone(),
            room_id: self.room_id.clone(),
            heads,
        }
    }

    /// On `hello`: reply with our own `heads`.
    pub fn on_hello<A: EventAcceptor>(
        &mut self,
        acceptor: &A,
        now_ms: u64,
    ) -> Result<Option<SyncFrame>, RejectReason> {
        self.take_message_token(now_ms)?;
        Ok(Some(self.heads_frame(acceptor)))
    }

    /// On `heads{heads}`: diff against local knowledge and `want` the gap.
    pub fn on_heads<A: EventAcceptor>(
        &mut self,
        peer_heads: Vec<String>,
        acceptor: &A,
        now_ms: u64,
    ) -> Result<Option<SyncFrame>, RejectReason> {
        self.take_message_token(now_ms)?;
        let mut wanted: Vec<String> = peer_heads
            .into_iter()
            .take(MAX_SYNC_HEADS)
            .filter(|id| !acceptor.has(id))
            .collect();
        wanted.truncate(MAX_SYNC_WANT);
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(Some(SyncFrame::Want {
            v: 1,
            space_id: self.space_id.clone(),
            room_id: self.room_id.clone(),
            ids: wanted,
        }))
    }

    /// On `want{ids}`: reply with the subset of ids we actually have.
    pub fn on_want(
        &mut self,
        ids: Vec<String>,
        lookup: impl Fn(&str) -> Option<Event>,
        now_ms: u64,
    ) -> Result<Option<SyncFrame>, RejectReason> {
        self.take_message_token(now_ms)?;
        let events: Vec<Event> = ids
            .into_iter()
            .take(MAX_SYNC_WANT)
            .filter_map(|id| lookup(&id))
            .take(MAX_SYNC_HAVE)
            .collect();
        if events.is_empty() {
            return Ok(None);
        }
        Ok(Some(SyncFrame::Have {
            v: 1,
            space_id: self.space_id.clone(),
            room_id: self.room_id.clone(),
            events,
        }))
    }

    /// On `have{events}`: run acceptance on each (bounded to the first 64;
    /// §8 "sync.have exceeding 64 entries"), appending what's accepted.
    pub fn on_have<A: EventAcceptor>(
        &mut self,
        events: Vec<Event>,
        acceptor: &mut A,
        now_ms: u64,
    ) -> Result<Vec<Event>, RejectReason> {
        self.take_message_token(now_ms)?;
        let mut accepted = Vec::new();
        for event in events.into_iter().take(MAX_SYNC_HAVE) {
            if !self.verify_bucket.try_take(now_ms) {
                self.warn_rate_limited(now_ms, "verification");
                continue;
            }
            match acceptor.accept(&event) {
                Ok(_) => {
                    acceptor.store(event.clone());
                    accepted.push(event);
                }
                Err(reason) => {
                    debug!(event_id = %event.event_id, ?reason, "dropped event during sync");
                }
            }
        }
        Ok(accepted)
    }

    /// Forward propagation: eagerly announce a freshly persisted local
    /// event to the connected peer (§4.8).
    pub fn on_new_local_event(&self, event: &Event) -> SyncFrame {
        SyncFrame::Have {
            v: 1,
            space_id: self.space_id.clone(),
            room_id: self.room_id.clone(),
            events: vec![event.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, TestCsprng};
    use crate::dag::{MemoryRoomLog, RoomLog};
    use crate::identity::Identity;
    use serde_json::json;
    use std::collections::HashMap;

    struct TestAcceptor {
        log: MemoryRoomLog,
        members: std::collections::HashSet<String>,
    }

    impl EventAcceptor for TestAcceptor {
        fn has(&self, event_id: &str) -> bool {
            self.log.has(event_id)
        }

        fn heads(&self) -> Vec<String> {
            self.log.heads()
        }

        fn accept(&mut self, event: &Event) -> Result<Accepted, RejectReason> {
            if !self.members.contains(&event.author_principal_id) {
                return Err(RejectReason::NotAMember);
            }
            Ok(Accepted { unknown_kind: false, orphan: false })
        }

        fn store(&mut self, event: Event) {
            self.log.put(event).unwrap();
        }
    }

    fn make_event(identity: &mut Identity, ts: u64, prev: Vec<String>) -> Event {
        let clock = FixedClock(ts);
        Event::create(identity, "space1", "general", "MSG_POST", json!({"text":"hi"}), prev, &clock).unwrap()
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(2, 1, 0);
        assert!(bucket.try_take(0));
        assert!(bucket.try_take(0));
        assert!(!bucket.try_take(0));
        assert!(bucket.try_take(1000));
    }

    #[test]
    fn heads_then_want_then_have_converges() {
        let mut rng = TestCsprng::new(1);
        let mut identity = Identity::create(&mut rng);
        let e1 = make_event(&mut identity, 1_000, vec![]);
        let e2 = make_event(&mut identity, 2_000, vec![e1.event_id.clone()]);

        let mut a_log = MemoryRoomLog::new();
        a_log.put(e1.clone()).unwrap();
        a_log.put(e2.clone()).unwrap();
        let mut members = std::collections::HashSet::new();
        members.insert(identity.principal_id.clone());
        let mut a = TestAcceptor { log: a_log, members: members.clone() };

        let mut b_log = MemoryRoomLog::new();
        b_log.put(e1.clone()).unwrap();
        let mut b = TestAcceptor { log: b_log, members };

        let mut session_a = SyncSession::new("space1", "general", 0);
        let mut session_b = SyncSession::new("space1", "general", 0);

        let a_heads = session_a.heads_frame(&a);
        let SyncFrame::Heads { heads, .. } = a_heads else { panic!() };
        let want = session_b.on_heads(heads, &b, 0).unwrap().unwrap();
        let SyncFrame::Want { ids, .. } = want else { panic!() };

        let store: HashMap<String, Event> = a.log.all_ids().into_iter().map(|id| (id.clone(), a.log.get(&id).unwrap())).collect();
        let have = session_a.on_want(ids, |id| store.get(id).cloned(), 0).unwrap().unwrap();
        let SyncFrame::Have { events, .. } = have else { panic!() };

        let accepted = session_b.on_have(events, &mut b, 0).unwrap();
        assert_eq!(accepted.len(), 1);
        assert!(b.has(&e2.event_id));
    }

    #[test]
    fn have_batch_over_64_is_truncated() {
        let mut rng = TestCsprng::new(2);
        let mut identity = Identity::create(&mut rng);
        let mut members = std::collections::HashSet::new();
        members.insert(identity.principal_id.clone());
        let mut acceptor = TestAcceptor { log: MemoryRoomLog::new(), members };

        let events: Vec<Event> = (0..70)
            .map(|i| make_event(&mut identity, 1_000 + i, vec![]))
            .collect();

        let mut session = SyncSession::new("space1", "general", 0);
        let accepted = session.on_have(events, &mut acceptor, 0).unwrap();
        assert_eq!(accepted.len(), MAX_SYNC_HAVE);
    }
}
