//! End-to-end scenarios from the protocol's "Concrete scenarios" list:
//! identity derivation, joining a Space, posting, banning, gossip sync
//! convergence with gap-fill, and Invite Issuer Certificate scope
//! enforcement.

use serde_json::json;

use space_core::acceptance::{accept_event, AcceptanceContext, RejectReason};
use space_core::clock::{Clock, FixedClock, TestCsprng};
use space_core::dag::{topo_sort, MemoryRoomLog, RoomLog};
use space_core::event::Event;
use space_core::genesis::SpaceGenesis;
use space_core::governance::{self, GovernanceState, GOVERNANCE_ROOM};
use space_core::identifiers::id_from_spki;
use space_core::identity::Identity;
use space_core::invite::{Invite, InviteIssuerCertificate};
use space_core::sync::{EventAcceptor, SyncFrame, SyncSession};

/// Minimal `EventAcceptor` driving the acceptance pipeline against an
/// in-memory log and an incrementally-folded governance state, mirroring
/// how an embedder wires the two together per room.
struct TestRoom {
    space_root_pub: [u8; 32],
    log: MemoryRoomLog,
    governance: GovernanceState,
    is_governance_room: bool,
    clock: FixedClock,
}

impl TestRoom {
    fn new(space_root_pub: [u8; 32], is_governance_room: bool, clock: FixedClock) -> Self {
        Self {
            space_root_pub,
            log: MemoryRoomLog::new(),
            governance: GovernanceState::default(),
            is_governance_room,
            clock,
        }
    }
}

impl EventAcceptor for TestRoom {
    fn has(&self, event_id: &str) -> bool {
        self.log.has(event_id)
    }

    fn heads(&self) -> Vec<String> {
        self.log.heads()
    }

    fn accept(&mut self, event: &Event) -> Result<space_core::acceptance::Accepted, RejectReason> {
        let ctx = AcceptanceContext {
            space_root_pub: self.space_root_pub,
            now_ms: self.clock.now_ms(),
            governance_state: &self.governance,
            room_log: &self.log,
            governance_policy: &governance::SpaceRootOnlyPolicy,
        };
        accept_event(&ctx, event)
    }

    fn store(&mut self, event: Event) {
        let cloned = event.clone();
        if self.log.put(event).is_ok() && self.is_governance_room {
            self.governance.apply_one(&cloned, &self.space_root_pub);
        }
    }
}

impl TestRoom {
    fn get(&self, event_id: &str) -> Option<Event> {
        self.log.get(event_id)
    }
}

/// 1. Identity: derive ids from SPKI hashes, mint a delegation, verify it
/// independently of the `Identity` that produced it.
#[test]
fn scenario_identity() {
    let mut rng = TestCsprng::new(1);
    let mut identity = Identity::create(&mut rng);

    assert_eq!(identity.principal_id, id_from_spki(&identity.principal().public_key()));
    assert_eq!(identity.device_id, id_from_spki(&identity.device().public_key()));
    assert!(identity.principal_id.starts_with("ed25519:"));

    let space_id = "ed25519:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    let clock = FixedClock(1_000_000);
    let delegation = identity.ensure_delegation_for_space(space_id, &clock).clone();

    assert!(delegation.has_scope(&format!("space:{space_id}:join")));
    assert!(delegation.has_scope(&format!("space:{space_id}:post")));
    delegation.verify(clock.now_ms()).expect("delegation verifies independently");
}

/// 2. Space + Join: Genesis verifies, the Space Root's own invite admits a
/// fresh Principal, and the governance fold records them as a member.
#[test]
fn scenario_space_and_join() {
    let mut rng = TestCsprng::new(2);
    let mut root = Identity::create(&mut rng);
    let clock = FixedClock(1_000_000);

    let genesis = SpaceGenesis::new(root.principal(), clock.now_ms(), Some("test".into()));
    genesis.verify().expect("genesis verifies");
    assert_eq!(genesis.space_id, root.principal_id);

    let space_id = root.principal_id.clone();
    let invite = Invite::issue(
        &mut root,
        &space_id,
        clock.now_ms() + 3_600_000,
        vec![format!("space:{space_id}:read"), format!("space:{space_id}:post")],
        None,
        json!({}),
        None,
        &clock,
        &mut rng,
    )
    .unwrap();

    let mut joiner = Identity::create(&mut rng);
    let delegation = joiner.ensure_delegation_for_space(&space_id, &clock).clone();
    let join_event = Event::create(
        &mut joiner,
        &space_id,
        GOVERNANCE_ROOM,
        "MEMBER_JOIN",
        json!({
            "principal_id": joiner.principal_id,
            "principal_pub": delegation.principal_pub,
            "invite": invite,
        }),
        vec![],
        &clock,
    )
    .unwrap();

    let mut room = TestRoom::new(root.principal().public_key(), true, clock);
    room.accept(&join_event).expect("join is accepted");
    room.store(join_event);

    assert_eq!(room.governance.members, [joiner.principal_id.clone()].into_iter().collect());
}

/// 3. Post: a member's two messages accept in order and `topo_sort` places
/// the parent before its child.
#[test]
fn scenario_post_and_topo_order() {
    let mut rng = TestCsprng::new(3);
    let mut root = Identity::create(&mut rng);
    let clock = FixedClock(1_000_000);
    let space_id = root.principal_id.clone();

    let (mut joiner, _) = join_space(&mut root, &space_id, &clock, &mut rng);

    let first = Event::create(
        &mut joiner,
        &space_id,
        "general",
        "MSG_POST",
        json!({"text": "hello"}),
        vec![],
        &clock,
    )
    .unwrap();
    let second = Event::create(
        &mut joiner,
        &space_id,
        "general",
        "MSG_POST",
        json!({"text": "world"}),
        vec![first.event_id.clone()],
        &clock,
    )
    .unwrap();

    let mut general = TestRoom::new(root.principal().public_key(), false, clock);
    general.governance.members.insert(joiner.principal_id.clone());

    general.accept(&first).expect("first post accepted");
    general.store(first.clone());
    general.accept(&second).expect("second post accepted");
    general.store(second.clone());

    let order = topo_sort(&[second.clone(), first.clone()]);
    let first_pos = order.iter().position(|id| id == &first.event_id).unwrap();
    let second_pos = order.iter().position(|id| id == &second.event_id).unwrap();
    assert!(first_pos < second_pos, "parent must sort before child");
}

/// 4. Ban: after the Space Root bans a member, that member's further posts
/// are rejected as `banned`.
#[test]
fn scenario_ban() {
    let mut rng = TestCsprng::new(4);
    let mut root = Identity::create(&mut rng);
    let clock = FixedClock(1_000_000);
    let space_id = root.principal_id.clone();

    let (mut joiner, join_event) = join_space(&mut root, &space_id, &clock, &mut rng);

    let mut governance_room = TestRoom::new(root.principal().public_key(), true, clock);
    governance_room.accept(&join_event).unwrap();
    governance_room.store(join_event.clone());

    let ban_event = Event::create(
        &mut root,
        &space_id,
        GOVERNANCE_ROOM,
        "MEMBER_BAN",
        json!({"principal_id": joiner.principal_id}),
        vec![join_event.event_id.clone()],
        &clock,
    )
    .unwrap();
    governance_room.accept(&ban_event).unwrap();
    governance_room.store(ban_event);

    assert!(governance_room.governance.banned.contains(&joiner.principal_id));

    let mut general = TestRoom::new(root.principal().public_key(), false, clock);
    general.governance = governance_room.governance.clone();

    let post_after_ban = Event::create(
        &mut joiner,
        &space_id,
        "general",
        "MSG_POST",
        json!({"text": "can anyone hear me"}),
        vec![],
        &clock,
    )
    .unwrap();
    assert_eq!(general.accept(&post_after_ban), Err(RejectReason::Banned));
}

/// 5. Sync: peer B starts one event behind and converges onto peer A's
/// three-event chain within the hello/heads/want/have rounds, gap-filling
/// the missing middle event.
#[test]
fn scenario_sync_convergence_with_gap_fill() {
    let mut rng = TestCsprng::new(5);
    let mut root = Identity::create(&mut rng);
    let clock = FixedClock(1_000_000);
    let space_id = root.principal_id.clone();

    let (mut joiner, _) = join_space(&mut root, &space_id, &clock, &mut rng);

    let e1 = Event::create(&mut joiner, &space_id, "general", "MSG_POST", json!({"text": "1"}), vec![], &clock).unwrap();
    let e2 = Event::create(&mut joiner, &space_id, "general", "MSG_POST", json!({"text": "2"}), vec![e1.event_id.clone()], &clock).unwrap();
    let e3 = Event::create(&mut joiner, &space_id, "general", "MSG_POST", json!({"text": "3"}), vec![e2.event_id.clone()], &clock).unwrap();

    let mut room_a = TestRoom::new(root.principal().public_key(), false, clock);
    room_a.governance.members.insert(joiner.principal_id.clone());
    for e in [&e1, &e2, &e3] {
        room_a.accept(e).unwrap();
        room_a.store(e.clone());
    }

    let mut room_b = TestRoom::new(root.principal().public_key(), false, clock);
    room_b.governance.members.insert(joiner.principal_id.clone());
    room_b.accept(&e1).unwrap();
    room_b.store(e1.clone());

    let mut session_a = SyncSession::new(space_id.clone(), "general", clock.now_ms());
    let mut session_b = SyncSession::new(space_id.clone(), "general", clock.now_ms());

    let opening = session_a.on_open(&room_a);
    let hello_from_a = &opening[0];
    let heads_from_a = opening[1].clone();

    let SyncFrame::Hello { .. } = hello_from_a else { panic!("expected hello") };
    let hello_reply = session_b.on_hello(&room_b, clock.now_ms()).unwrap();
    assert!(matches!(hello_reply, Some(SyncFrame::Heads { .. })));

    let SyncFrame::Heads { heads, .. } = heads_from_a else { panic!("expected heads") };
    let want = session_b.on_heads(heads, &room_b, clock.now_ms()).unwrap().expect("b should want e3");
    let SyncFrame::Want { ids, .. } = want else { panic!("expected want") };
    assert_eq!(ids, vec![e3.event_id.clone()]);

    let have = session_a.on_want(ids, |id| room_a.get(id), clock.now_ms()).unwrap().expect("a has e3");
    let SyncFrame::Have { events, .. } = have else { panic!("expected have") };
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, e3.event_id);

    // `e3` arrives before its parent `e2`: acceptance treats that as an
    // informational orphan, not a rejection, so B stores it right away but
    // still lacks e2 in its log.
    let accepted_round_one = session_b.on_have(events, &mut room_b, clock.now_ms()).unwrap();
    assert_eq!(accepted_round_one.len(), 1);
    assert!(room_b.has(&e3.event_id));
    assert!(!room_b.has(&e2.event_id));

    // B notices its just-accepted event's declared parent is absent and
    // asks for it directly (§4.8 "ask for prev of just-accepted events").
    let missing_parents: Vec<String> = accepted_round_one[0]
        .prev
        .iter()
        .filter(|p| !room_b.has(p))
        .cloned()
        .collect();
    assert_eq!(missing_parents, vec![e2.event_id.clone()]);

    let have_gap = session_a
        .on_want(missing_parents, |id| room_a.get(id), clock.now_ms())
        .unwrap()
        .expect("a has the missing parent");
    let SyncFrame::Have { events, .. } = have_gap else { panic!("expected have") };
    let accepted_gap = session_b.on_have(events, &mut room_b, clock.now_ms()).unwrap();
    assert_eq!(accepted_gap.len(), 1);

    assert!(room_b.has(&e1.event_id));
    assert!(room_b.has(&e2.event_id));
    assert!(room_b.has(&e3.event_id));
}

/// 6. IIC: a delegated issuer's invite within its allowed scopes is
/// honored; one that asks for more than `allowed_scopes` covers is
/// rejected as `invite_invalid`.
#[test]
fn scenario_iic_scope_subset() {
    let mut rng = TestCsprng::new(6);
    let mut root = Identity::create(&mut rng);
    let clock = FixedClock(1_000_000);
    let space_id = root.principal_id.clone();
    let space_root_keypair = root.principal().clone();

    let mut issuer = Identity::create(&mut rng);
    let iic = InviteIssuerCertificate::new(
        &space_root_keypair,
        &issuer.principal().public_key(),
        clock.now_ms().saturating_sub(1_000),
        clock.now_ms() + 3_600_000,
        vec![format!("space:{space_id}:read"), format!("space:{space_id}:post")],
    );
    iic.verify(clock.now_ms()).expect("iic verifies");

    let good_invite = Invite::issue(
        &mut issuer,
        &space_id,
        clock.now_ms() + 3_600_000,
        vec![format!("space:{space_id}:read")],
        None,
        json!({}),
        Some(iic.clone()),
        &clock,
        &mut rng,
    )
    .unwrap();

    let mut joiner = Identity::create(&mut rng);
    let delegation = joiner.ensure_delegation_for_space(&space_id, &clock).clone();
    let join_event = Event::create(
        &mut joiner,
        &space_id,
        GOVERNANCE_ROOM,
        "MEMBER_JOIN",
        json!({
            "principal_id": joiner.principal_id,
            "principal_pub": delegation.principal_pub,
            "invite": good_invite,
        }),
        vec![],
        &clock,
    )
    .unwrap();

    let mut room = TestRoom::new(root.principal().public_key(), true, clock);
    room.accept(&join_event).expect("join via IIC-scoped invite accepted");
    room.store(join_event);
    assert!(room.governance.members.contains(&joiner.principal_id));

    let over_scoped = Invite::issue(
        &mut issuer,
        &space_id,
        clock.now_ms() + 3_600_000,
        vec![format!("space:{space_id}:read"), format!("space:{space_id}:governance")],
        None,
        json!({}),
        Some(iic),
        &clock,
        &mut rng,
    )
    .unwrap();
    assert!(
        over_scoped.verify(&root.principal().public_key(), clock.now_ms()).is_err(),
        "scopes exceeding the IIC's allowed_scopes must fail verification"
    );
}

/// §8 "Determinism": folding the same governance events in a shuffled
/// input order always yields the same `(members, banned)` pair, since the
/// fold sorts by `(ts, event_id)` before applying.
#[test]
fn governance_fold_is_order_independent() {
    let mut rng = TestCsprng::new(7);
    let mut root = Identity::create(&mut rng);
    let clock = FixedClock(1_000_000);
    let space_id = root.principal_id.clone();

    let (_joiner, join_event) = join_space(&mut root, &space_id, &clock, &mut rng);
    let ban_event = Event::create(
        &mut root,
        &space_id,
        GOVERNANCE_ROOM,
        "MEMBER_BAN",
        json!({"principal_id": "ed25519:nobody"}),
        vec![join_event.event_id.clone()],
        &clock,
    )
    .unwrap();

    let forward = governance::fold(&[join_event.clone(), ban_event.clone()], &root.principal().public_key());
    let reversed = governance::fold(&[ban_event, join_event], &root.principal().public_key());
    assert_eq!(forward, reversed);
}

fn join_space(
    root: &mut Identity,
    space_id: &str,
    clock: &FixedClock,
    rng: &mut TestCsprng,
) -> (Identity, Event) {
    let invite = Invite::issue(
        root,
        space_id,
        clock.now_ms() + 3_600_000,
        vec![format!("space:{space_id}:read"), format!("space:{space_id}:post")],
        None,
        json!({}),
        None,
        clock,
        rng,
    )
    .unwrap();

    let mut joiner = Identity::create(rng);
    let delegation = joiner.ensure_delegation_for_space(space_id, clock).clone();
    let join_event = Event::create(
        &mut joiner,
        space_id,
        GOVERNANCE_ROOM,
        "MEMBER_JOIN",
        json!({
            "principal_id": joiner.principal_id,
            "principal_pub": delegation.principal_pub,
            "invite": invite,
        }),
        vec![],
        clock,
    )
    .unwrap();

    (joiner, join_event)
}
