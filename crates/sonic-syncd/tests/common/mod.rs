//! Shared harness: a client proxy talking to a live syncd over the
//! in-process channel, with the virtual switch as driver.

#![allow(dead_code)]

use sonic_sai::{
    AttrMetadata, AttrValue, AttrValueType, Attribute, Catalog, ObjectId, ObjectKey, ObjectType,
    RouteEntry,
};
use sonic_sairedis::{ClientConfig, InProcessChannel, RemoteSai};
use sonic_syncd::{
    Driver, MemoryStateStore, StateStore, Syncd, SyncdConfig, SyncdHandle, VirtualSwitch,
};
use std::sync::Arc;

pub const PORT_SPEED: u32 = 0;
pub const PORT_ADMIN_STATE: u32 = 1;
pub const PORT_HW_LANE: u32 = 2;
pub const VR_SRC_MAC: u32 = 0;
pub const RIF_VR_ID: u32 = 0;
pub const RIF_PORT_ID: u32 = 1;
pub const RIF_MTU: u32 = 5;
pub const ROUTE_PACKET_ACTION: u32 = 0;

pub fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::builder()
            .object_type(ObjectType::SWITCH)
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(PORT_SPEED, "SAI_PORT_ATTR_SPEED", AttrValueType::U32),
            )
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(PORT_ADMIN_STATE, "SAI_PORT_ATTR_ADMIN_STATE", AttrValueType::Bool)
                    .with_default(AttrValue::Bool(false)),
            )
            .attribute(
                ObjectType::PORT,
                AttrMetadata::new(PORT_HW_LANE, "SAI_PORT_ATTR_HW_LANE", AttrValueType::U32)
                    .create_only(),
            )
            .attribute(
                ObjectType::VIRTUAL_ROUTER,
                AttrMetadata::new(VR_SRC_MAC, "SAI_VIRTUAL_ROUTER_ATTR_SRC_MAC_ADDRESS", AttrValueType::Mac),
            )
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_VR_ID, "SAI_ROUTER_INTERFACE_ATTR_VIRTUAL_ROUTER_ID", AttrValueType::ObjectId)
                    .mandatory()
                    .create_only(),
            )
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_PORT_ID, "SAI_ROUTER_INTERFACE_ATTR_PORT_ID", AttrValueType::ObjectId)
                    .create_only(),
            )
            .attribute(
                ObjectType::ROUTER_INTERFACE,
                AttrMetadata::new(RIF_MTU, "SAI_ROUTER_INTERFACE_ATTR_MTU", AttrValueType::U32)
                    .with_default(AttrValue::U32(1514)),
            )
            .attribute(
                ObjectType::ROUTE_ENTRY,
                AttrMetadata::new(ROUTE_PACKET_ACTION, "SAI_ROUTE_ENTRY_ATTR_PACKET_ACTION", AttrValueType::Enum)
                    .with_default(AttrValue::Enum(1)),
            )
            .build()
            .unwrap(),
    )
}

pub struct Harness {
    pub sai: RemoteSai,
    pub handle: SyncdHandle,
    pub vs: Arc<VirtualSwitch>,
    pub store: Arc<dyn StateStore>,
}

impl Harness {
    pub fn start() -> Self {
        Self::with(
            Arc::new(VirtualSwitch::with_catalog(catalog())),
            Arc::new(MemoryStateStore::new()),
            false,
            SyncdConfig::default(),
            ClientConfig::default(),
        )
    }

    /// Starts a daemon on an existing switch and store, as after a restart.
    pub fn with(
        vs: Arc<VirtualSwitch>,
        store: Arc<dyn StateStore>,
        warm: bool,
        config: SyncdConfig,
        client_config: ClientConfig,
    ) -> Self {
        let (client, server) = InProcessChannel::pair();
        let driver: Arc<dyn Driver> = vs.clone();
        let handle = Syncd::new(driver, store.clone(), config)
            .with_catalog(catalog())
            .start(Arc::new(server), warm)
            .unwrap();
        let sai = RemoteSai::new(Arc::new(client), catalog(), &client_config).unwrap();
        Self {
            sai,
            handle,
            vs,
            store,
        }
    }
}

/// Objects of the reference topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub switch_id: ObjectId,
    pub ports: [ObjectId; 2],
    pub vr: ObjectId,
    pub rif: ObjectId,
    pub route: ObjectKey,
}

/// Declares a switch, two ports, a virtual router, a router interface on the
/// first port and a route through the router, in the order a client would.
pub async fn declare_topology(sai: &RemoteSai, speed: u32) -> Topology {
    let switch_id = sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();

    let mut ports = [ObjectId::NULL; 2];
    for (lane, port) in ports.iter_mut().enumerate() {
        *port = sai
            .create(
                switch_id,
                ObjectType::PORT,
                vec![
                    Attribute::new(PORT_HW_LANE, AttrValue::U32(lane as u32)),
                    Attribute::new(PORT_SPEED, AttrValue::U32(speed)),
                ],
            )
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
    }

    let vr = sai
        .create(
            switch_id,
            ObjectType::VIRTUAL_ROUTER,
            vec![Attribute::new(
                VR_SRC_MAC,
                AttrValue::Mac("52:54:00:12:34:56".parse().unwrap()),
            )],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let rif = sai
        .create(
            switch_id,
            ObjectType::ROUTER_INTERFACE,
            vec![
                Attribute::new(RIF_VR_ID, AttrValue::ObjectId(vr)),
                Attribute::new(RIF_PORT_ID, AttrValue::ObjectId(ports[0])),
            ],
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let route = ObjectKey::Route(RouteEntry {
        switch_id,
        vr_id: vr,
        destination: "10.1.0.0/16".parse().unwrap(),
    });
    sai.create_entry(route, vec![Attribute::new(ROUTE_PACKET_ACTION, AttrValue::Enum(1))])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    Topology {
        switch_id,
        ports,
        vr,
        rif,
        route,
    }
}

/// Runs one view transaction declaring the reference topology.
pub async fn apply_topology(sai: &RemoteSai, speed: u32) -> (Topology, sonic_sairedis::ApplyReport) {
    sai.view().init().await.unwrap();
    let topology = declare_topology(sai, speed).await;
    let report = sai.view().apply().await.unwrap();
    (topology, report)
}
