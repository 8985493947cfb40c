//! INIT_VIEW/APPLY_VIEW transactions against a live syncd.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use sonic_sai::{AttrId, AttrValue, Attribute, ObjectKey, ObjectType, SaiStatus};
use sonic_sairedis::{ClientConfig, CommunicationMode, PlannedAction, SairedisError, ViewPhase};
use sonic_syncd::{MemoryStateStore, ShutdownKind, SyncdConfig, VirtualSwitch};
use std::sync::Arc;

#[tokio::test]
async fn test_first_apply_creates_in_dependency_order() {
    let h = Harness::start();
    let (topology, report) = apply_topology(&h.sai, 25_000).await;

    assert_eq!(report.applied, 6);
    let order: Vec<ObjectKey> = report.ops().map(|op| op.key).collect();
    let position = |key: ObjectKey| order.iter().position(|k| *k == key).unwrap();
    assert_eq!(position(ObjectKey::Oid(topology.switch_id)), 0);
    assert!(position(ObjectKey::Oid(topology.vr)) < position(ObjectKey::Oid(topology.rif)));
    assert!(position(ObjectKey::Oid(topology.ports[0])) < position(ObjectKey::Oid(topology.rif)));
    assert!(position(ObjectKey::Oid(topology.vr)) < position(topology.route));
    assert!(report
        .ops()
        .all(|op| matches!(op.action, PlannedAction::Create(_))));

    assert_eq!(h.vs.object_count(), 6);
    assert_eq!(h.sai.view().phase(), ViewPhase::Idle);
    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].switch_id, topology.switch_id);
    assert_eq!(views[0].len(), 6);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_identical_second_apply_is_noop() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;
    let calls = h.vs.call_count();

    let (second, report) = apply_topology(&h.sai, 25_000).await;
    assert!(report.is_noop());
    assert_eq!(second, first);
    assert_eq!(h.vs.call_count(), calls);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_changed_attribute_becomes_set() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;

    let (second, report) = apply_topology(&h.sai, 100_000).await;
    assert_eq!(second, first);
    assert_eq!(report.applied, 2);
    for op in report.ops() {
        assert_eq!(op.object_type, ObjectType::PORT);
        assert_eq!(
            op.action,
            PlannedAction::Set(Attribute::new(PORT_SPEED, AttrValue::U32(100_000)))
        );
    }

    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(
        views[0]
            .get(&ObjectKey::Oid(first.ports[1]))
            .and_then(|o| o.attribute(AttrId(PORT_SPEED)))
            .cloned(),
        Some(AttrValue::U32(100_000))
    );
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_undeclared_objects_are_removed_in_reverse_order() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;

    h.sai.view().init().await.unwrap();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    assert_eq!(sw, first.switch_id);
    let report = h.sai.view().apply().await.unwrap();

    assert_eq!(report.applied, 5);
    assert!(report.ops().all(|op| op.action == PlannedAction::Remove));
    let order: Vec<ObjectKey> = report.ops().map(|op| op.key).collect();
    let position = |key: ObjectKey| order.iter().position(|k| *k == key).unwrap();
    assert!(position(ObjectKey::Oid(first.rif)) < position(ObjectKey::Oid(first.vr)));
    assert!(position(ObjectKey::Oid(first.rif)) < position(ObjectKey::Oid(first.ports[0])));
    assert!(position(first.route) < position(ObjectKey::Oid(first.vr)));

    assert_eq!(h.vs.object_count(), 1);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_replaced_object_is_removed_and_created() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;

    h.sai.view().init().await.unwrap();
    let topology = declare_topology(&h.sai, 25_000).await;
    h.sai
        .remove(ObjectType::ROUTE_ENTRY, topology.route)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    h.sai
        .remove(ObjectType::ROUTER_INTERFACE, ObjectKey::Oid(topology.rif))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let rif = h
        .sai
        .create(
            topology.switch_id,
            ObjectType::ROUTER_INTERFACE,
            vec![
                Attribute::new(RIF_VR_ID, AttrValue::ObjectId(topology.vr)),
                Attribute::new(RIF_PORT_ID, AttrValue::ObjectId(topology.ports[1])),
            ],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_ne!(rif, first.rif);
    let report = h.sai.view().apply().await.unwrap();

    let (creates, sets, removes) = report.plans[0].counts();
    assert_eq!((creates, sets, removes), (1, 0, 2));
    let views = h.sai.dump_views().await.unwrap();
    assert!(views[0].contains(&ObjectKey::Oid(rif)));
    assert!(!views[0].contains(&ObjectKey::Oid(first.rif)));
    assert!(!views[0].contains(&first.route));
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_shadow_get_reads_temporary_view() {
    let h = Harness::start();
    let (first, _) = apply_topology(&h.sai, 25_000).await;

    h.sai.view().init().await.unwrap();

    // Not declared yet: answered by the driver.
    let attrs = h
        .sai
        .get(ObjectType::PORT, ObjectKey::Oid(first.ports[0]), &[AttrId(PORT_SPEED)])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(attrs, vec![Attribute::new(PORT_SPEED, AttrValue::U32(25_000))]);

    let topology = declare_topology(&h.sai, 50_000).await;
    let attrs = h
        .sai
        .get(
            ObjectType::PORT,
            ObjectKey::Oid(topology.ports[0]),
            &[AttrId(PORT_SPEED), AttrId(PORT_ADMIN_STATE)],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(
        attrs,
        vec![
            Attribute::new(PORT_SPEED, AttrValue::U32(50_000)),
            Attribute::new(PORT_ADMIN_STATE, AttrValue::Bool(false)),
        ]
    );

    // The driver still holds the old value until apply.
    let calls = h.vs.call_count();
    h.sai.view().reset().await.unwrap();
    assert_eq!(h.vs.call_count(), calls);
    let attrs = h
        .sai
        .get(ObjectType::PORT, ObjectKey::Oid(first.ports[0]), &[AttrId(PORT_SPEED)])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(attrs, vec![Attribute::new(PORT_SPEED, AttrValue::U32(25_000))]);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_shadow_remove_of_referenced_object_is_refused() {
    let h = Harness::start();
    h.sai.view().init().await.unwrap();
    let topology = declare_topology(&h.sai, 25_000).await;

    let err = h
        .sai
        .remove(ObjectType::VIRTUAL_ROUTER, ObjectKey::Oid(topology.vr))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(SaiStatus::ObjectInUse));
    assert_eq!(h.vs.call_count(), 0);

    h.sai.view().reset().await.unwrap();
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_failed_apply_reports_partial_progress_and_retries() {
    let h = Harness::start();
    h.sai.view().init().await.unwrap();
    h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    h.sai.view().apply().await.unwrap();

    h.sai.view().init().await.unwrap();
    let topology = declare_topology(&h.sai, 25_000).await;
    h.vs.fail_next(SaiStatus::InsufficientResources);
    let err = h.sai.view().apply().await.unwrap_err();

    let SairedisError::PartialReconciliation {
        applied,
        failed,
        skipped,
    } = err
    else {
        panic!("expected partial reconciliation, got {err:?}");
    };
    assert!(applied.is_empty());
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, Some(SaiStatus::InsufficientResources));
    assert_eq!(skipped.len(), 4);
    assert_eq!(h.sai.view().phase(), ViewPhase::Reconciling);

    let report = h.sai.view().retry().await.unwrap();
    assert_eq!(report.applied, 5);
    assert_eq!(h.sai.view().phase(), ViewPhase::Idle);

    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views[0].len(), 6);
    assert!(views[0].contains(&topology.route));
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_reopened_session_discards_temporary_view() {
    let h = Harness::start();
    h.sai.view().init().await.unwrap();
    declare_topology(&h.sai, 25_000).await;
    h.sai.view().reset().await.unwrap();

    let (_, report) = apply_topology(&h.sai, 25_000).await;
    assert_eq!(report.applied, 6);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_async_shadow_calls_are_mirrored_without_waiting() {
    let h = Harness::with(
        Arc::new(VirtualSwitch::with_catalog(catalog())),
        Arc::new(MemoryStateStore::new()),
        false,
        SyncdConfig::default(),
        ClientConfig::default().with_mode(CommunicationMode::Async),
    );

    h.sai.view().init().await.unwrap();
    let sw = h.sai.create_switch(vec![]).await.unwrap();
    assert!(!sw.is_pending());
    let sw = sw.wait().await.unwrap();

    // the handle is dropped without being awaited
    let vr = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap();
    assert!(!vr.is_pending());
    drop(vr);

    let report = h.sai.view().apply().await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(h.vs.object_count(), 2);

    // outside the session calls are asynchronous again
    let pending = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap();
    assert!(pending.is_pending());
    pending.wait().await.unwrap();
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}
