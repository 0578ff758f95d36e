//! Fingerprint watcher state machine tests, driven with explicit instants.

use std::sync::Arc;
use std::time::Duration;

use pairsync_core::types::{Address, ObjectKind, RawFingerprint, TargetIdentity};
use pairsync_test_utils::{fast_watch_settings, FakeHost};
use pairsync_watch::fingerprint::WEAPON_DRAWING_BIT;
use pairsync_watch::{FingerprintWatcher, SuppressionGate, TargetEvent, WatchState};
use rstest::rstest;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    host: Arc<FakeHost>,
    gate: SuppressionGate,
    watcher: FingerprintWatcher,
    events: mpsc::UnboundedReceiver<TargetEvent>,
}

fn harness(identity: TargetIdentity, self_owned: bool) -> Harness {
    let host = Arc::new(FakeHost::new());
    let settings = fast_watch_settings();
    let gate = SuppressionGate::new(&settings);
    let (tx, events) = mpsc::unbounded_channel();
    let watcher = FingerprintWatcher::new(identity, self_owned, host.clone(), gate.clone(), &settings, tx);
    Harness {
        host,
        gate,
        watcher,
        events,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TargetEvent>) -> Vec<TargetEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn fingerprint() -> RawFingerprint {
    RawFingerprint {
        headwear: Some(0),
        visor_weapon: Some(0),
        ..RawFingerprint::default()
    }
}

fn pet() -> TargetIdentity {
    TargetIdentity::primary("Remote Peer").with_kind(ObjectKind::Pet)
}

// ---------------------------------------------------------------------------
// Appearance and change detection
// ---------------------------------------------------------------------------

#[test]
fn first_resolution_raises_appeared_then_changed() {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    let now = Instant::now();

    h.watcher.poll_at(now);
    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.watcher.state(), WatchState::Searching);

    h.host.place(&player, Address(0x1000));
    h.host.set_fingerprint(Address(0x1000), fingerprint());
    h.watcher.poll_at(now);

    let events = drain(&mut h.events);
    assert_eq!(
        events,
        vec![
            TargetEvent::Appeared {
                identity: player.clone(),
                address: Address(0x1000)
            },
            TargetEvent::Changed {
                identity: player,
                address: Address(0x1000)
            },
        ]
    );
    assert_eq!(h.watcher.state(), WatchState::Tracking);
}

#[test]
fn steady_target_raises_nothing() {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    h.host.place(&player, Address(0x1000));
    h.host.set_fingerprint(Address(0x1000), fingerprint());
    let now = Instant::now();
    h.watcher.poll_at(now);
    drain(&mut h.events);

    for _ in 0..5 {
        h.watcher.poll_at(now);
    }
    assert!(drain(&mut h.events).is_empty());
}

#[rstest]
#[case::equipment_first(true, 0)]
#[case::equipment_last(true, 39)]
#[case::customization_first(false, 0)]
#[case::customization_last(false, 25)]
fn single_byte_change_raises_changed(#[case] equipment: bool, #[case] index: usize) {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    h.host.place(&player, Address(0x1000));
    h.host.set_fingerprint(Address(0x1000), fingerprint());
    let now = Instant::now();
    h.watcher.poll_at(now);
    drain(&mut h.events);

    let mut changed = fingerprint();
    if equipment {
        changed.equipment[index] = 0xff;
    } else {
        changed.customization[index] = 0xff;
    }
    h.host.set_fingerprint(Address(0x1000), changed);
    h.watcher.poll_at(now);

    assert_eq!(
        drain(&mut h.events),
        vec![TargetEvent::Changed {
            identity: player,
            address: Address(0x1000)
        }]
    );
}

#[test]
fn cosmetic_toggles_alone_are_suppressed() {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    h.host.place(&player, Address(0x1000));
    h.host.set_fingerprint(Address(0x1000), fingerprint());
    let now = Instant::now();
    h.watcher.poll_at(now);
    drain(&mut h.events);

    h.host.set_fingerprint(
        Address(0x1000),
        RawFingerprint {
            headwear: Some(1),
            ..fingerprint()
        },
    );
    h.watcher.poll_at(now);
    h.host.set_fingerprint(
        Address(0x1000),
        RawFingerprint {
            headwear: Some(1),
            visor_weapon: Some(1),
            ..fingerprint()
        },
    );
    h.watcher.poll_at(now);
    h.host.set_fingerprint(
        Address(0x1000),
        RawFingerprint {
            headwear: Some(1),
            visor_weapon: Some(1 | WEAPON_DRAWING_BIT),
            ..fingerprint()
        },
    );
    h.watcher.poll_at(now);

    assert!(drain(&mut h.events).is_empty());
}

#[test]
fn address_or_draw_object_churn_raises_changed() {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    h.host.place(&player, Address(0x1000));
    h.host.set_fingerprint(Address(0x1000), fingerprint());
    let now = Instant::now();
    h.watcher.poll_at(now);
    drain(&mut h.events);

    h.host.set_draw_object(Address(0x1000), Some(Address(0x9000)));
    h.watcher.poll_at(now);
    assert_eq!(drain(&mut h.events).len(), 1);

    h.host.place(&player, Address(0x2000));
    h.host.set_fingerprint(Address(0x2000), fingerprint());
    h.watcher.poll_at(now);
    assert_eq!(
        drain(&mut h.events),
        vec![TargetEvent::Changed {
            identity: player,
            address: Address(0x2000)
        }]
    );
    assert_eq!(h.watcher.address(), Some(Address(0x2000)));
}

// ---------------------------------------------------------------------------
// Removal and grace
// ---------------------------------------------------------------------------

#[test]
fn self_owned_primary_is_removed_immediately() {
    let player = TargetIdentity::primary("Local User");
    let mut h = harness(player.clone(), true);
    h.host.place(&player, Address(0x1000));
    let now = Instant::now();
    h.watcher.poll_at(now);
    drain(&mut h.events);

    h.host.remove(&player);
    h.watcher.poll_at(now);

    assert_eq!(drain(&mut h.events), vec![TargetEvent::Removed { identity: player }]);
    assert_eq!(h.watcher.state(), WatchState::Searching);
}

#[test]
fn secondary_removal_waits_for_grace() {
    let mut h = harness(pet(), true);
    h.host.place(&pet(), Address(0x3000));
    let start = Instant::now();
    h.watcher.poll_at(start);
    drain(&mut h.events);

    h.host.remove(&pet());
    h.watcher.poll_at(start);
    h.watcher.poll_at(start + Duration::from_millis(999));
    assert!(drain(&mut h.events).is_empty());
    assert!(matches!(h.watcher.state(), WatchState::Absent { .. }));

    h.watcher.poll_at(start + Duration::from_millis(1_000));
    assert_eq!(drain(&mut h.events), vec![TargetEvent::Removed { identity: pet() }]);

    h.host.place(&pet(), Address(0x3100));
    h.watcher.poll_at(start + Duration::from_millis(1_100));
    let events = drain(&mut h.events);
    assert!(matches!(events.first(), Some(TargetEvent::Appeared { .. })));
}

#[test]
fn reappearance_within_grace_cancels_removal() {
    let mut h = harness(pet(), false);
    h.host.place(&pet(), Address(0x3000));
    let start = Instant::now();
    h.watcher.poll_at(start);
    drain(&mut h.events);

    h.host.remove(&pet());
    h.watcher.poll_at(start);
    h.host.place(&pet(), Address(0x3000));
    h.watcher.poll_at(start + Duration::from_millis(500));
    h.watcher.poll_at(start + Duration::from_millis(2_000));

    let events = drain(&mut h.events);
    assert!(events
        .iter()
        .all(|e| !matches!(e, TargetEvent::Removed { .. } | TargetEvent::Appeared { .. })));
    assert_eq!(h.watcher.state(), WatchState::Tracking);
}

// ---------------------------------------------------------------------------
// Suppression
// ---------------------------------------------------------------------------

#[test]
fn zone_transition_suspends_polling_until_settled() {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    let start = Instant::now();
    h.gate.zone_transition_start(start);
    h.host.place(&player, Address(0x1000));

    h.watcher.poll_at(start + Duration::from_secs(1));
    assert!(drain(&mut h.events).is_empty());

    h.gate.zone_transition_end(start + Duration::from_secs(2));
    h.watcher.poll_at(start + Duration::from_millis(4_000));
    assert!(drain(&mut h.events).is_empty());

    h.watcher.poll_at(start + Duration::from_millis(4_500));
    assert!(matches!(
        drain(&mut h.events).first(),
        Some(TargetEvent::Appeared { .. })
    ));
}

#[test]
fn cutscene_halts_polling() {
    let player = TargetIdentity::primary("Remote Peer");
    let mut h = harness(player.clone(), false);
    h.host.place(&player, Address(0x1000));
    let now = Instant::now();

    h.gate.set_cutscene(true);
    h.watcher.poll_at(now);
    assert!(drain(&mut h.events).is_empty());

    h.gate.set_cutscene(false);
    h.watcher.poll_at(now);
    assert!(!drain(&mut h.events).is_empty());
}
