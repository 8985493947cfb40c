//! Warm and cold restarts of syncd over a surviving virtual switch.

mod common;

use common::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use sonic_sai::ObjectId;
use sonic_sairedis::{ClientConfig, InProcessChannel, NotificationEvent, NotificationKind};
use sonic_syncd::{
    Driver, FileStateStore, ShutdownKind, StateStore, StoreError, Syncd, SyncdConfig, SyncdError,
    VirtualSwitch,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Stops `h` and starts a new daemon on the same switch and store.
async fn restart(h: Harness, kind: ShutdownKind, warm: bool) -> Harness {
    let Harness {
        sai,
        handle,
        vs,
        store,
    } = h;
    handle.shutdown(kind).await.unwrap();
    drop(sai);
    Harness::with(vs, store, warm, SyncdConfig::default(), ClientConfig::default())
}

fn file_store(dir: &TempDir) -> Arc<dyn StateStore> {
    Arc::new(FileStateStore::new(dir.path()))
}

#[tokio::test]
async fn test_warm_restart_reconciles_with_zero_operations() {
    let dir = TempDir::new().unwrap();
    let h = Harness::with(
        Arc::new(VirtualSwitch::with_catalog(catalog())),
        file_store(&dir),
        false,
        SyncdConfig::default(),
        ClientConfig::default(),
    );
    let (first, _) = apply_topology(&h.sai, 25_000).await;
    let views_before = h.sai.dump_views().await.unwrap();

    let h = restart(h, ShutdownKind::Warm, true).await;
    assert_eq!(h.store.list().unwrap(), vec![first.switch_id]);
    assert_eq!(h.sai.dump_views().await.unwrap(), views_before);

    let calls = h.vs.call_count();
    let (second, report) = apply_topology(&h.sai, 25_000).await;
    assert!(report.is_noop());
    assert_eq!(second, first);
    assert_eq!(h.vs.call_count(), calls);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_new_objects_after_warm_restart_get_fresh_ids() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;
    let h = restart(h, ShutdownKind::Warm, true).await;

    let vr = h
        .sai
        .create(first.switch_id, sonic_sai::ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let existing = [first.switch_id, first.ports[0], first.ports[1], first.vr, first.rif];
    assert!(!existing.contains(&vr));
    assert!(existing.iter().all(|id| id.index() < vr.index()));
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_notification_sequence_continues_after_warm_restart() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;
    let rid = h.vs.switches()[0];
    assert!(h.vs.inject_event(rid, NotificationKind::SwitchShutdownRequest));
    assert!(h.vs.inject_event(rid, NotificationKind::SwitchShutdownRequest));

    let h = restart(h, ShutdownKind::Warm, true).await;
    let mut events = h.sai.subscribe(first.switch_id).await.unwrap();
    assert!(h.vs.inject_event(rid, NotificationKind::SwitchShutdownRequest));

    let NotificationEvent::Notification(notification) = events.next().await.unwrap() else {
        panic!("expected a notification");
    };
    assert_eq!(notification.switch_id, first.switch_id);
    assert_eq!(notification.sequence, 3);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_cold_start_ignores_saved_state() {
    let h = Harness::start();
    apply_topology(&h.sai, 25_000).await;

    let h = restart(h, ShutdownKind::Warm, false).await;
    assert_eq!(h.store.list().unwrap().len(), 1);
    assert!(h.sai.dump_views().await.unwrap().is_empty());
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_cold_shutdown_saves_nothing() {
    let h = Harness::start();
    apply_topology(&h.sai, 25_000).await;

    let h = restart(h, ShutdownKind::Cold, true).await;
    assert!(h.store.list().unwrap().is_empty());
    assert!(h.sai.dump_views().await.unwrap().is_empty());
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_warm_start_refuses_unreadable_image() {
    let dir = TempDir::new().unwrap();
    let sw = ObjectId::compose_virtual(0, sonic_sai::ObjectType::SWITCH, 1).unwrap();
    std::fs::write(
        dir.path().join(format!("switch-{:016x}.json", sw.as_raw())),
        "{ not json",
    )
    .unwrap();

    let (_client, server) = InProcessChannel::pair();
    let driver: Arc<dyn Driver> = Arc::new(VirtualSwitch::new());
    let result = Syncd::new(driver, file_store(&dir), SyncdConfig::default())
        .start(Arc::new(server), true);
    assert!(matches!(
        result,
        Err(SyncdError::Store(StoreError::Malformed { .. }))
    ));
}
