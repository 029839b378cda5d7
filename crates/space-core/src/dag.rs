//! Per-Room event DAG (§3 "Room DAG", §4.5)
//!
//! A Room's events form an arena indexed by `event_id`; edges point from a
//! child to its declared parents in `prev`. A [`RoomLog`] is the storage
//! seam for one `(space_id, room_id)` (§9 "an arena of events indexed by
//! event_id, with child-sets computed lazily").

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::Result;
use crate::event::Event;

/// Storage seam for one Room's event log. Implementations must be
/// content-addressed and idempotent on duplicate `put`.
pub trait RoomLog {
    /// Insert `event`. A duplicate `event_id` is a no-op, not an error.
    fn put(&mut self, event: Event) -> Result<()>;
    /// Look up an event by id.
    fn get(&self, event_id: &str) -> Option<Event>;
    /// Whether `event_id` is already stored.
    fn has(&self, event_id: &str) -> bool;
    /// Current heads: stored events with no observed child.
    fn heads(&self) -> Vec<String>;
    /// Every stored event id.
    fn all_ids(&self) -> Vec<String>;
    /// Direct children of `event_id` among stored events.
    fn children_of(&self, event_id: &str) -> Vec<String>;
}

/// In-memory [`RoomLog`]: a `HashMap`-backed arena. Used by `space-core`'s
/// own tests; `space-storage` ships a `sled`-backed implementation for a
/// real embedding.
#[derive(Debug, Default)]
pub struct MemoryRoomLog {
    events: HashMap<String, Event>,
    /// ids that appear in some stored event's `prev` — i.e. not heads.
    referenced: HashSet<String>,
    children: HashMap<String, HashSet<String>>,
}

impl MemoryRoomLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomLog for MemoryRoomLog {
    fn put(&mut self, event: Event) -> Result<()> {
        if self.events.contains_key(&event.event_id) {
            return Ok(());
        }
        for parent in &event.prev {
            self.referenced.insert(parent.clone());
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(event.event_id.clone());
        }
        self.events.insert(event.event_id.clone(), event);
        Ok(())
    }

    fn get(&self, event_id: &str) -> Option<Event> {
        self.events.get(event_id).cloned()
    }

    fn has(&self, event_id: &str) -> bool {
        self.events.contains_key(event_id)
    }

    fn heads(&self) -> Vec<String> {
        self.events
            .keys()
            .filter(|id| !self.referenced.contains(*id))
            .cloned()
            .collect()
    }

    fn all_ids(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    fn children_of(&self, event_id: &str) -> Vec<String> {
        self.children
            .get(event_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// An event is a head among `events` if no event in the set lists its id in
/// `prev` (§4.5 "Heads").
pub fn compute_heads(events: &[Event]) -> Vec<String> {
    let mut referenced: HashSet<&str> = HashSet::new();
    for e in events {
        for p in &e.prev {
            referenced.insert(p.as_str());
        }
    }
    events
        .iter()
        .map(|e| e.event_id.clone())
        .filter(|id| !referenced.contains(id.as_str()))
        .collect()
}

/// An event in `events` with a `prev` entry not present in `events` is an
/// orphan relative to that set (§4.5 "Orphans").
pub fn orphans<'a>(events: &'a [Event]) -> Vec<&'a Event> {
    let ids: HashSet<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
    events
        .iter()
        .filter(|e| e.prev.iter().any(|p| !ids.contains(p.as_str())))
        .collect()
}

#[derive(Eq, PartialEq)]
struct Ready {
    ts: u64,
    event_id: String,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest (ts, event_id)
        // tie-break pops first.
        other
            .ts
            .cmp(&self.ts)
            .then_with(|| other.event_id.cmp(&self.event_id))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Kahn-style topological sort over `events`, tie-broken by `(ts, event_id)`
/// ascending (§4.5 "Deterministic ordering"). Edges to parents outside
/// `events` are treated as already satisfied. If a cycle is present (local
/// corruption; must not occur with honest signers), the remaining nodes are
/// appended by the same tie-break rule rather than left out.
pub fn topo_sort(events: &[Event]) -> Vec<String> {
    let by_id: HashMap<&str, &Event> = events.iter().map(|e| (e.event_id.as_str(), e)).collect();

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for e in events {
        in_degree.entry(e.event_id.as_str()).or_insert(0);
        for parent in &e.prev {
            if by_id.contains_key(parent.as_str()) {
                *in_degree.entry(e.event_id.as_str()).or_insert(0) += 1;
                children.entry(parent.as_str()).or_default().push(e.event_id.as_str());
            }
        }
    }

    let mut heap = BinaryHeap::new();
    for e in events {
        if in_degree.get(e.event_id.as_str()).copied().unwrap_or(0) == 0 {
            heap.push(Ready { ts: e.ts, event_id: e.event_id.clone() });
        }
    }

    let mut order = Vec::with_capacity(events.len());
    let mut visited: HashSet<String> = HashSet::new();
    while let Some(Ready { event_id, .. }) = heap.pop() {
        if !visited.insert(event_id.clone()) {
            continue;
        }
        order.push(event_id.clone());
        if let Some(kids) = children.get(event_id.as_str()) {
            for &child in kids {
                if let Some(d) = in_degree.get_mut(child) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        if let Some(child_event) = by_id.get(child) {
                            heap.push(Ready { ts: child_event.ts, event_id: child.to_string() });
                        }
                    }
                }
            }
        }
    }

    if order.len() < events.len() {
        // Cycle: append whatever remains by the same tie-break rule.
        let mut remaining: Vec<&Event> = events
            .iter()
            .filter(|e| !visited.contains(&e.event_id))
            .collect();
        remaining.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.event_id.cmp(&b.event_id)));
        order.extend(remaining.into_iter().map(|e| e.event_id.clone()));
    }

    order
}
