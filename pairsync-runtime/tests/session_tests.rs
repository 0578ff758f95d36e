use std::sync::Arc;
use std::time::Duration;

use pairsync_core::config::{StoreSettings, SyncConfig};
use pairsync_core::types::{Address, ObjectKind, RawFingerprint, StateSnapshot, TargetIdentity};
use pairsync_runtime::{HostSignal, RuntimeError, Session, SessionHandle, SessionParts};
use pairsync_sync::RevertStatus;
use pairsync_test_utils::{
    category, fast_apply_settings, fast_watch_settings, snapshot, BackendCall, FakeHost,
    MemoryResolver, RecordingBackends, ScriptedFetcher,
};

const PLAYER_ADDR: Address = Address(0x4000);

struct Fixture {
    host: Arc<FakeHost>,
    rec: RecordingBackends,
    session: Session,
    handle: SessionHandle,
}

fn player() -> TargetIdentity {
    TargetIdentity::primary("Remote Peer")
}

fn config() -> SyncConfig {
    SyncConfig {
        watch: fast_watch_settings(),
        apply: fast_apply_settings(),
        store: StoreSettings::default(),
    }
}

fn fixture() -> Fixture {
    let host = Arc::new(FakeHost::new());
    host.set_fingerprint(PLAYER_ADDR, RawFingerprint::default());
    let resolver = Arc::new(MemoryResolver::new());
    let fetcher = Arc::new(ScriptedFetcher::new(resolver.clone()));
    let rec = RecordingBackends::new();
    let parts = SessionParts {
        primary: player(),
        host: host.clone(),
        resolver,
        fetcher,
        backends: rec.backends(),
    };
    let (session, handle) = Session::new(parts, config()).expect("valid config");
    Fixture {
        host,
        rec,
        session,
        handle,
    }
}

fn look(appearance: &str) -> StateSnapshot {
    snapshot([(ObjectKind::Player, category(appearance, &[]))])
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn snapshot_applied_once_target_appears() {
    let Fixture {
        host,
        rec,
        session,
        handle,
    } = fixture();
    let running = tokio::spawn(session.run());

    handle.apply_snapshot(look("look:1"), false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(rec.log.calls().is_empty());

    host.place(&player(), PLAYER_ADDR);
    eventually("deferred apply", || rec.log.applied("appearance").len() == 1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rec.log.applied("appearance"), vec!["look:1".to_string()]);

    handle.shutdown();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_reverts_applied_state() {
    let Fixture {
        host,
        rec,
        session,
        handle,
    } = fixture();
    host.place(&player(), PLAYER_ADDR);
    let running = tokio::spawn(session.run());

    handle.apply_snapshot(look("look:1"), false).await.unwrap();
    eventually("apply", || {
        handle.orchestrator().stats().applies_completed == 1
    })
    .await;

    rec.log.clear();
    handle.shutdown();
    let report = running.await.unwrap().unwrap();

    assert_eq!(report.status(ObjectKind::Player), Some(&RevertStatus::Reverted));
    assert!(rec.log.calls().contains(&BackendCall::Redraw { target: player() }));
    assert!(matches!(
        handle.apply_snapshot(look("look:2"), false).await,
        Err(RuntimeError::ChannelClosed(_))
    ));
}

#[tokio::test]
async fn cutscene_holds_watcher_until_it_ends() {
    let Fixture {
        host,
        rec,
        session,
        handle,
    } = fixture();
    let running = tokio::spawn(session.run());

    handle.signal(HostSignal::CutsceneStarted).await.unwrap();
    handle.apply_snapshot(look("look:1"), false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    host.place(&player(), PLAYER_ADDR);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rec.log.applied("appearance").is_empty());

    handle.signal(HostSignal::CutsceneEnded).await.unwrap();
    eventually("apply after cutscene", || {
        rec.log.applied("appearance") == vec!["look:1".to_string()]
    })
    .await;

    handle.shutdown();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn dropping_every_handle_ends_session() {
    let Fixture {
        session, handle, ..
    } = fixture();
    let running = tokio::spawn(session.run());
    drop(handle);

    let report = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("session should stop")
        .unwrap()
        .unwrap();
    assert!(report.categories.is_empty());
}

#[tokio::test]
async fn shutdown_before_run_still_stops() {
    let Fixture {
        session, handle, ..
    } = fixture();
    handle.shutdown();

    let report = tokio::time::timeout(Duration::from_secs(2), session.run())
        .await
        .expect("session should stop")
        .unwrap();
    assert!(report.is_clean());
}

#[test]
fn invalid_config_is_rejected() {
    let host = Arc::new(FakeHost::new());
    let resolver = Arc::new(MemoryResolver::new());
    let fetcher = Arc::new(ScriptedFetcher::new(resolver.clone()));
    let mut config = config();
    config.watch.tick_interval_ms = 0;
    let parts = SessionParts {
        primary: player(),
        host,
        resolver,
        fetcher,
        backends: RecordingBackends::new().backends(),
    };

    let err = Session::new(parts, config).err().expect("rejected");
    assert!(matches!(err, RuntimeError::Config(_)));
}

#[tokio::test(start_paused = true)]
async fn only_the_primary_target_is_polled() {
    let Fixture {
        host,
        session,
        handle,
        ..
    } = fixture();
    host.place(&player().with_kind(ObjectKind::Pet), Address(0x5000));
    let running = tokio::spawn(session.run());

    // Eleven ticks at the 10 ms watch interval.
    tokio::time::sleep(Duration::from_millis(105)).await;
    handle.shutdown();
    running.await.unwrap().unwrap();

    let polls = host.resolve_calls();
    assert!((1..=12).contains(&polls), "{polls} lookups for eleven ticks");
}
