//! End-to-end calls through the client proxy and syncd.
//!
//! Run with: cargo test -p sonic-syncd --test call_bridge

mod common;

use common::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use sonic_sai::{AttrId, AttrValue, Attribute, ObjectId, ObjectKey, ObjectType, SaiStatus};
use sonic_sairedis::{
    BulkMode, BulkSetEntry, ClientConfig, CommunicationMode, NotificationEvent, NotificationKind,
    SairedisError,
};
use sonic_syncd::{MemoryStateStore, ShutdownKind, SyncdConfig, VirtualSwitch};
use std::sync::Arc;
use std::time::Duration;

async fn create_port(h: &Harness, switch_id: ObjectId, lane: u32) -> ObjectId {
    h.sai
        .create(
            switch_id,
            ObjectType::PORT,
            vec![
                Attribute::new(PORT_HW_LANE, AttrValue::U32(lane)),
                Attribute::new(PORT_SPEED, AttrValue::U32(25_000)),
            ],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_set_get_round_trip() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    assert_eq!(sw.virtual_object_type(), ObjectType::SWITCH);

    let port = create_port(&h, sw, 0).await;
    assert_eq!(port.virtual_object_type(), ObjectType::PORT);
    assert_eq!(port.switch_index(), sw.switch_index());

    h.sai
        .set(
            ObjectType::PORT,
            ObjectKey::Oid(port),
            Attribute::new(PORT_SPEED, AttrValue::U32(100_000)),
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let attrs = h
        .sai
        .get(
            ObjectType::PORT,
            ObjectKey::Oid(port),
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
            Attribute::new(PORT_SPEED, AttrValue::U32(100_000)),
            Attribute::new(PORT_ADMIN_STATE, AttrValue::Bool(false)),
        ]
    );

    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].switch_id, sw);
    assert_eq!(
        views[0]
            .get(&ObjectKey::Oid(port))
            .and_then(|o| o.attribute(AttrId(PORT_SPEED)))
            .cloned(),
        Some(AttrValue::U32(100_000))
    );

    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_get_returns_virtual_ids() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let port = create_port(&h, sw, 0).await;
    let vr = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let rif = h
        .sai
        .create(
            sw,
            ObjectType::ROUTER_INTERFACE,
            vec![
                Attribute::new(RIF_VR_ID, AttrValue::ObjectId(vr)),
                Attribute::new(RIF_PORT_ID, AttrValue::ObjectId(port)),
            ],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let attrs = h
        .sai
        .get(
            ObjectType::ROUTER_INTERFACE,
            ObjectKey::Oid(rif),
            &[AttrId(RIF_VR_ID), AttrId(RIF_PORT_ID), AttrId(RIF_MTU)],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(attrs[0].value, AttrValue::ObjectId(vr));
    assert_eq!(attrs[1].value, AttrValue::ObjectId(port));
    assert_eq!(attrs[2].value, AttrValue::U32(1514));

    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_remove_of_referenced_object_is_refused() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let vr = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let rif = h
        .sai
        .create(
            sw,
            ObjectType::ROUTER_INTERFACE,
            vec![Attribute::new(RIF_VR_ID, AttrValue::ObjectId(vr))],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let err = h
        .sai
        .remove(ObjectType::VIRTUAL_ROUTER, ObjectKey::Oid(vr))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(SaiStatus::ObjectInUse));

    h.sai
        .remove(ObjectType::ROUTER_INTERFACE, ObjectKey::Oid(rif))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    h.sai
        .remove(ObjectType::VIRTUAL_ROUTER, ObjectKey::Oid(vr))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views[0].len(), 1);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_unknown_object_is_rejected() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let ghost = ObjectId::compose_virtual(sw.switch_index(), ObjectType::VIRTUAL_ROUTER, 999).unwrap();

    let err = h
        .sai
        .create(
            sw,
            ObjectType::ROUTER_INTERFACE,
            vec![Attribute::new(RIF_VR_ID, AttrValue::ObjectId(ghost))],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(SaiStatus::InvalidObjectId));

    let err = h
        .sai
        .remove(ObjectType::VIRTUAL_ROUTER, ObjectKey::Oid(ghost))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(SaiStatus::ItemNotFound));

    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_driver_failure_is_reported_and_nothing_recorded() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    h.vs.fail_next(SaiStatus::InsufficientResources);

    let err = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SairedisError::Driver {
            status: SaiStatus::InsufficientResources
        }
    ));

    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views[0].len(), 1);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_bulk_set_stop_on_error() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let first = create_port(&h, sw, 0).await;
    let second = create_port(&h, sw, 1).await;
    let missing = ObjectId::compose_virtual(sw.switch_index(), ObjectType::PORT, 999).unwrap();

    let entries = |speed: u32| {
        [first, missing, second]
            .into_iter()
            .map(|port| BulkSetEntry {
                key: ObjectKey::Oid(port),
                attribute: Attribute::new(PORT_SPEED, AttrValue::U32(speed)),
            })
            .collect::<Vec<_>>()
    };

    let err = h
        .sai
        .bulk_set(sw, ObjectType::PORT, entries(10_000), BulkMode::StopOnError)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    let SairedisError::BulkFailed { status, items } = err else {
        panic!("expected a bulk failure, got {err:?}");
    };
    assert_eq!(status, SaiStatus::ItemNotFound);
    let statuses: Vec<SaiStatus> = items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![SaiStatus::Success, SaiStatus::ItemNotFound, SaiStatus::NotExecuted]
    );
    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(
        views[0]
            .get(&ObjectKey::Oid(second))
            .and_then(|o| o.attribute(AttrId(PORT_SPEED)))
            .cloned(),
        Some(AttrValue::U32(25_000))
    );

    let err = h
        .sai
        .bulk_set(sw, ObjectType::PORT, entries(40_000), BulkMode::IgnoreError)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    let SairedisError::BulkFailed { items, .. } = err else {
        panic!("expected a bulk failure, got {err:?}");
    };
    let statuses: Vec<SaiStatus> = items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![SaiStatus::Success, SaiStatus::ItemNotFound, SaiStatus::Success]
    );

    let views = h.sai.dump_views().await.unwrap();
    let speed = |port| {
        views[0]
            .get(&ObjectKey::Oid(port))
            .and_then(|o| o.attribute(AttrId(PORT_SPEED)))
            .cloned()
    };
    assert_eq!(speed(first), Some(AttrValue::U32(40_000)));
    assert_eq!(speed(second), Some(AttrValue::U32(40_000)));
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_bulk_create_returns_ids_in_order() {
    let h = Harness::start();
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let entries = (0..3)
        .map(|lane| sonic_sairedis::BulkCreateEntry {
            key: ObjectKey::Oid(ObjectId::NULL),
            attributes: vec![Attribute::new(PORT_HW_LANE, AttrValue::U32(lane))],
        })
        .collect();

    let items = h
        .sai
        .bulk_create(sw, ObjectType::PORT, entries, BulkMode::StopOnError)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.status == SaiStatus::Success));
    let indexes: Vec<u64> = items.iter().map(|i| i.object_id.index()).collect();
    let mut sorted = indexes.clone();
    sorted.sort_unstable();
    assert_eq!(indexes, sorted);

    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views[0].objects_of_type(ObjectType::PORT).count(), 3);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_zero_timeout_reports_timeout() {
    let h = Harness::start();
    h.sai.set_response_timeout(Duration::ZERO);

    let err = h.sai.create_switch(vec![]).await.unwrap_err();
    assert!(matches!(err, SairedisError::Timeout { .. }));

    h.sai.set_response_timeout(Duration::from_secs(5));
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    assert_eq!(sw.virtual_object_type(), ObjectType::SWITCH);

    // The abandoned create still ran on the daemon.
    let views = h.sai.dump_views().await.unwrap();
    assert_eq!(views.len(), 2);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_async_calls_settle_out_of_order() {
    let h = Harness::with(
        Arc::new(VirtualSwitch::with_catalog(catalog())),
        Arc::new(MemoryStateStore::new()),
        false,
        SyncdConfig::default(),
        ClientConfig::default().with_mode(CommunicationMode::Async),
    );

    let sw = h.sai.create_switch(vec![]).await.unwrap();
    assert!(sw.is_pending());
    let sw = sw.wait().await.unwrap();

    let first = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap()
        .into_pending()
        .unwrap();
    let second = h
        .sai
        .create(sw, ObjectType::VIRTUAL_ROUTER, vec![])
        .await
        .unwrap()
        .into_pending()
        .unwrap();
    assert!(second.correlation_id() > first.correlation_id());

    let second_id = second.wait().await.unwrap();
    let first_id = first.wait().await.unwrap();
    assert!(first_id.index() < second_id.index());
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_notify_only_rejects_calls() {
    let h = Harness::start();
    h.sai.set_communication_mode(CommunicationMode::NotifyOnly);
    let err = h.sai.create_switch(vec![]).await.unwrap_err();
    assert!(matches!(err, SairedisError::InvalidState(_)));
    assert_eq!(h.vs.call_count(), 0);
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_notifications_are_sequenced_with_gaps() {
    let h = Harness::with(
        Arc::new(VirtualSwitch::with_catalog(catalog())),
        Arc::new(MemoryStateStore::new()),
        false,
        SyncdConfig::default().with_notification_queue_limit(1),
        ClientConfig::default(),
    );
    let sw = h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let mut events = h.sai.subscribe(sw).await.unwrap();
    let rid = h.vs.switches()[0];

    // Queue holds one event; the next two are dropped but keep their numbers.
    for _ in 0..3 {
        assert!(h.vs.inject_event(rid, NotificationKind::SwitchShutdownRequest));
    }
    let NotificationEvent::Notification(first) = events.next().await.unwrap() else {
        panic!("expected a notification");
    };
    assert_eq!(first.switch_id, sw);
    assert_eq!(first.sequence, 1);

    assert!(h.vs.inject_event(
        rid,
        NotificationKind::SwitchStateChange {
            status: sonic_types::OperStatus::Down
        }
    ));
    assert_eq!(
        events.next().await.unwrap(),
        NotificationEvent::Gap {
            switch_id: sw,
            expected: 2,
            received: 4,
        }
    );
    let NotificationEvent::Notification(fourth) = events.next().await.unwrap() else {
        panic!("expected a notification");
    };
    assert_eq!(fourth.sequence, 4);
    assert_eq!(
        fourth.kind,
        NotificationKind::SwitchStateChange {
            status: sonic_types::OperStatus::Down
        }
    );
    h.handle.shutdown(ShutdownKind::Cold).await.unwrap();
}

#[tokio::test]
async fn test_daemon_stops_when_clients_are_gone() {
    let h = Harness::start();
    h.sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
    let Harness { sai, handle, .. } = h;
    drop(sai);
    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap()
        .unwrap();
}
