//! The syncd daemon.
//!
//! One task reads request frames off the channel and executes them strictly
//! in arrival order; every request gets exactly one response. Real calls are
//! translated from VIDs to RIDs, executed on the [`Driver`] and recorded in
//! the current view of their switch. Shadow calls made while a view session
//! is open touch the driver only for reads of objects outside the session.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-10: Information Input Validation - Catalog checks on every call
//! - CP-10: System Recovery and Reconstitution - Warm shutdown and restore
//! - AU-12: Audit Record Generation - Every failed call is logged with its status

use crate::config::SyncdConfig;
use crate::driver::{Driver, DriverCall, DriverRequest};
use crate::error::{Result, SyncdError};
use crate::notifications::NotificationHub;
use crate::shadow::ShadowSession;
use crate::translator::{IdTranslator, VidAllocator};
use crate::warm_restart::{StateStore, SwitchImage};
use parking_lot::Mutex;
use sonic_sai::{
    AttrId, Attribute, Catalog, CatalogError, ObjectId, ObjectIdRefs, ObjectKey, ObjectType,
    SaiStatus,
};
use sonic_sairedis::codec::peek_correlation_id;
use sonic_sairedis::{
    BulkItemResult, BulkMode, Call, CallRequest, CallResponse, Codec, CorrelationId,
    ResponsePayload, ServerChannel, View, ViewObject,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type CallResult = std::result::Result<ResponsePayload, SaiStatus>;

/// How the daemon stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownKind {
    /// Nothing is saved; the next start begins from an empty switch.
    #[default]
    Cold,
    /// Current views and id bindings are saved for the next warm start.
    Warm,
}

/// Daemon builder.
pub struct Syncd {
    driver: Arc<dyn Driver>,
    store: Arc<dyn StateStore>,
    catalog: Option<Arc<Catalog>>,
    config: SyncdConfig,
}

impl Syncd {
    pub fn new(driver: Arc<dyn Driver>, store: Arc<dyn StateStore>, config: SyncdConfig) -> Self {
        Self {
            driver,
            store,
            catalog: None,
            config,
        }
    }

    /// Validates every call against `catalog`.
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Spawns the request loop and the notification publisher.
    ///
    /// With `warm` set, the saved switch images are restored first; the
    /// daemon refuses to start when an image cannot be read.
    pub fn start(self, channel: Arc<dyn ServerChannel>, warm: bool) -> Result<SyncdHandle> {
        let codec = match &self.catalog {
            Some(catalog) => Codec::new(catalog.clone()),
            None => Codec::unchecked(),
        };
        let translator = Arc::new(IdTranslator::new());
        let pump_cancel = CancellationToken::new();
        let (hub, pump) = NotificationHub::start(
            self.config.notification_queue_limit,
            translator.clone(),
            codec.clone(),
            channel.clone(),
            pump_cancel.clone(),
        );

        let mut daemon = Daemon {
            driver: self.driver,
            catalog: self.catalog,
            codec,
            store: self.store,
            translator,
            allocator: VidAllocator::new(),
            hub,
            switches: BTreeMap::new(),
            session: None,
        };
        if warm {
            if let Err(e) = daemon.restore() {
                pump_cancel.cancel();
                return Err(e);
            }
        }
        info!(
            warm,
            switches = daemon.switches.len(),
            queue_limit = self.config.notification_queue_limit,
            "syncd started"
        );

        let cancel = CancellationToken::new();
        let kind = Arc::new(Mutex::new(ShutdownKind::Cold));
        let requests = tokio::spawn(daemon.run(channel, cancel.clone(), kind.clone()));
        Ok(SyncdHandle {
            cancel,
            pump_cancel,
            kind,
            requests,
            pump,
        })
    }
}

/// Running daemon.
pub struct SyncdHandle {
    cancel: CancellationToken,
    pump_cancel: CancellationToken,
    kind: Arc<Mutex<ShutdownKind>>,
    requests: JoinHandle<Result<()>>,
    pump: JoinHandle<()>,
}

impl SyncdHandle {
    /// Stops reading requests once the one in progress is answered, then
    /// saves state when `kind` is warm.
    pub async fn shutdown(self, kind: ShutdownKind) -> Result<()> {
        *self.kind.lock() = kind;
        self.cancel.cancel();
        self.join().await
    }

    /// Waits until the request loop ends by itself, which happens once every
    /// client endpoint is gone. Ends cold.
    pub async fn join(self) -> Result<()> {
        let outcome = match self.requests.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SyncdError::Task(e.to_string())),
        };
        self.pump_cancel.cancel();
        if let Err(e) = self.pump.await {
            warn!(error = %e, "notification publisher ended abnormally");
        }
        outcome
    }

    pub fn is_finished(&self) -> bool {
        self.requests.is_finished()
    }
}

struct Daemon {
    driver: Arc<dyn Driver>,
    catalog: Option<Arc<Catalog>>,
    codec: Codec,
    store: Arc<dyn StateStore>,
    translator: Arc<IdTranslator>,
    allocator: VidAllocator,
    hub: NotificationHub,
    /// Current view of every switch, keyed by switch VID.
    switches: BTreeMap<ObjectId, View>,
    session: Option<ShadowSession>,
}

impl Daemon {
    async fn run(
        mut self,
        channel: Arc<dyn ServerChannel>,
        cancel: CancellationToken,
        kind: Arc<Mutex<ShutdownKind>>,
    ) -> Result<()> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = channel.recv_request() => frame,
            };
            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("request channel closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "request channel failed");
                    return Err(e.into());
                }
            };

            if let Some((id, response)) = self.handle_frame(&frame) {
                if let Err(e) = channel.send_response(id, response).await {
                    warn!(correlation_id = id, error = %e, "response not delivered");
                }
            }
        }

        let kind = *kind.lock();
        self.stop(kind)
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Option<(CorrelationId, Vec<u8>)> {
        let request = match self.codec.decode_request(frame) {
            Ok(request) => request,
            Err(e) => {
                return match peek_correlation_id(frame) {
                    Ok(id) => {
                        warn!(correlation_id = id, error = %e, "malformed request");
                        self.encode(CallResponse::new(id, SaiStatus::InvalidParameter))
                    }
                    Err(_) => {
                        warn!(error = %e, len = frame.len(), "unreadable frame dropped");
                        None
                    }
                };
            }
        };
        let response = self.dispatch(request);
        self.encode(response)
    }

    fn encode(&self, response: CallResponse) -> Option<(CorrelationId, Vec<u8>)> {
        let id = response.correlation_id;
        match self.codec.encode_response(&response) {
            Ok(frame) => Some((id, frame)),
            Err(e) => {
                error!(correlation_id = id, error = %e, "cannot encode response");
                self.codec
                    .encode_response(&CallResponse::new(id, SaiStatus::Failure))
                    .ok()
                    .map(|frame| (id, frame))
            }
        }
    }

    fn dispatch(&mut self, request: CallRequest) -> CallResponse {
        let CallRequest {
            correlation_id,
            switch_id,
            object_type,
            shadow,
            call,
        } = request;
        let op = call.operation();
        debug!(correlation_id, %op, %object_type, shadow, "request");

        let result = match call {
            Call::InitView => Ok(self.init_view()),
            Call::ApplyView => Ok(self.apply_view()),
            Call::DumpView => Ok(ResponsePayload::Views(
                self.switches.values().cloned().collect(),
            )),
            Call::BulkCreate { entries, mode } => {
                let calls = entries
                    .into_iter()
                    .map(|e| Call::Create {
                        key: e.key,
                        attributes: e.attributes,
                    })
                    .collect();
                return self.bulk(correlation_id, switch_id, object_type, shadow, calls, mode);
            }
            Call::BulkRemove { keys, mode } => {
                let calls = keys.into_iter().map(|key| Call::Remove { key }).collect();
                return self.bulk(correlation_id, switch_id, object_type, shadow, calls, mode);
            }
            Call::BulkSet { entries, mode } => {
                let calls = entries
                    .into_iter()
                    .map(|e| Call::Set {
                        key: e.key,
                        attribute: e.attribute,
                    })
                    .collect();
                return self.bulk(correlation_id, switch_id, object_type, shadow, calls, mode);
            }
            single => self.execute(switch_id, object_type, shadow, single),
        };

        match result {
            Ok(payload) => CallResponse::success(correlation_id, payload),
            Err(status) => {
                warn!(correlation_id, %op, %object_type, shadow, %status, "call failed");
                CallResponse::new(correlation_id, status)
            }
        }
    }

    /// Executes bulk items in order. After a failure in stop-on-error mode
    /// the remaining items are reported as not executed.
    fn bulk(
        &mut self,
        correlation_id: CorrelationId,
        switch_id: ObjectId,
        object_type: ObjectType,
        shadow: bool,
        calls: Vec<Call>,
        mode: BulkMode,
    ) -> CallResponse {
        let mut items = Vec::with_capacity(calls.len());
        let mut first_failure = None;

        for call in calls {
            if first_failure.is_some() && mode == BulkMode::StopOnError {
                items.push(BulkItemResult::new(SaiStatus::NotExecuted));
                continue;
            }
            let item = match self.execute(switch_id, object_type, shadow, call) {
                Ok(ResponsePayload::ObjectId(id)) => BulkItemResult::created(id),
                Ok(_) => BulkItemResult::new(SaiStatus::Success),
                Err(status) => {
                    first_failure.get_or_insert(status);
                    BulkItemResult::new(status)
                }
            };
            items.push(item);
        }

        let status = first_failure.unwrap_or(SaiStatus::Success);
        if !status.is_success() {
            warn!(correlation_id, %object_type, items = items.len(), %status, ?mode, "bulk call failed");
        }
        CallResponse {
            correlation_id,
            status,
            payload: ResponsePayload::Bulk(items),
        }
    }

    fn execute(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        shadow: bool,
        call: Call,
    ) -> CallResult {
        if shadow {
            if self.session.is_none() {
                warn!(%object_type, "shadow call without an open view session");
                return Err(SaiStatus::Failure);
            }
            return match call {
                Call::Create { key, attributes } => {
                    self.shadow_create(switch_id, object_type, key, attributes)
                }
                Call::Remove { key } => self.shadow_remove(key),
                Call::Set { key, attribute } => self.shadow_set(object_type, key, attribute),
                Call::Get { key, attr_ids } => self.shadow_get(switch_id, object_type, key, attr_ids),
                _ => Err(SaiStatus::InvalidParameter),
            };
        }

        match call {
            Call::Create { key, attributes } => self.create(switch_id, object_type, key, attributes),
            Call::Remove { key } => self.remove(switch_id, object_type, key),
            Call::Set { key, attribute } => self.set(switch_id, object_type, key, attribute),
            Call::Get { key, attr_ids } => self.get(switch_id, object_type, key, attr_ids),
            _ => Err(SaiStatus::InvalidParameter),
        }
    }

    fn validate(
        &self,
        check: impl FnOnce(&Catalog) -> std::result::Result<(), CatalogError>,
    ) -> std::result::Result<(), SaiStatus> {
        match &self.catalog {
            Some(catalog) => check(catalog).map_err(|e| {
                debug!(error = %e, "catalog validation failed");
                e.status()
            }),
            None => Ok(()),
        }
    }

    /// Switch owning a call: the switch itself for switch calls, then the
    /// explicit switch id, the switch of an entry key, or the switch with the
    /// index of the VID.
    fn resolve_switch(&self, switch_id: ObjectId, object_type: ObjectType, key: &ObjectKey) -> Option<ObjectId> {
        if object_type == ObjectType::SWITCH {
            return key.object_id().filter(|id| !id.is_null());
        }
        if !switch_id.is_null() {
            return Some(switch_id);
        }
        if let Some(sw) = key.entry_switch_id() {
            return Some(sw);
        }
        let index = key.object_id().filter(|id| !id.is_null())?.switch_index();
        self.switches
            .keys()
            .copied()
            .find(|sw| sw.switch_index() == index)
            .or_else(|| self.session.as_ref()?.switch_with_index(index))
    }

    fn translate_key(&self, key: ObjectKey) -> std::result::Result<ObjectKey, SaiStatus> {
        let mut key = key;
        self.translator.to_rids(&mut key).map_err(|vid| {
            debug!(%vid, "key names an unknown object");
            SaiStatus::ItemNotFound
        })?;
        Ok(key)
    }

    fn translate_attrs(&self, attributes: &[Attribute]) -> std::result::Result<Vec<Attribute>, SaiStatus> {
        let mut attributes = attributes.to_vec();
        self.translator
            .to_rids(attributes.as_mut_slice())
            .map_err(|vid| {
                debug!(%vid, "attribute references an unknown object");
                SaiStatus::InvalidObjectId
            })?;
        Ok(attributes)
    }

    fn switch_rid(&self, switch_id: ObjectId) -> std::result::Result<ObjectId, SaiStatus> {
        if !self.switches.contains_key(&switch_id) {
            return Err(SaiStatus::InvalidParameter);
        }
        self.translator
            .rid_of(switch_id)
            .ok_or(SaiStatus::InvalidParameter)
    }

    fn create(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attributes: Vec<Attribute>,
    ) -> CallResult {
        self.validate(|c| c.validate_create(object_type, &attributes))?;
        if object_type == ObjectType::SWITCH {
            return self.create_switch(key, attributes);
        }

        let sw = self
            .resolve_switch(switch_id, object_type, &key)
            .ok_or(SaiStatus::InvalidParameter)?;
        let sw_rid = self.switch_rid(sw)?;

        let vid = match key {
            ObjectKey::Oid(id) if id.is_null() => Some(
                self.allocator
                    .allocate(sw.switch_index(), object_type)
                    .ok_or(SaiStatus::InsufficientResources)?,
            ),
            ObjectKey::Oid(id) => {
                if self.translator.is_bound(id) {
                    return Err(SaiStatus::ItemAlreadyExists);
                }
                if id.virtual_object_type() != object_type || id.switch_index() != sw.switch_index()
                {
                    return Err(SaiStatus::InvalidParameter);
                }
                self.allocator.observe(id);
                Some(id)
            }
            entry => {
                if self.switches.get(&sw).is_some_and(|v| v.contains(&entry)) {
                    return Err(SaiStatus::ItemAlreadyExists);
                }
                None
            }
        };

        let driver_key = match vid {
            Some(_) => ObjectKey::Oid(ObjectId::NULL),
            None => self.translate_key(key)?,
        };
        let reply = self.driver.apply(DriverRequest {
            switch_id: sw_rid,
            object_type,
            key: driver_key,
            call: DriverCall::Create {
                attributes: self.translate_attrs(&attributes)?,
            },
        });
        if !reply.status.is_success() {
            return Err(reply.status);
        }

        let (stored, payload) = match vid {
            Some(vid) => {
                if reply.object_id.is_null() {
                    error!(%object_type, "driver created an object without an id");
                    return Err(SaiStatus::Failure);
                }
                self.translator.bind(vid, reply.object_id);
                (ObjectKey::Oid(vid), ResponsePayload::ObjectId(vid))
            }
            None => (key, ResponsePayload::None),
        };
        if let Some(view) = self.switches.get_mut(&sw) {
            view.insert(stored, ViewObject::new(object_type, attributes));
        }
        debug!(key = %stored, %object_type, "created");
        Ok(payload)
    }

    fn create_switch(&mut self, key: ObjectKey, attributes: Vec<Attribute>) -> CallResult {
        let requested = match key {
            ObjectKey::Oid(id) if id.is_null() => None,
            ObjectKey::Oid(id) => {
                if id.virtual_object_type() != ObjectType::SWITCH {
                    return Err(SaiStatus::InvalidParameter);
                }
                if self.translator.is_bound(id)
                    || self.allocator.is_switch_in_use(id.switch_index())
                {
                    return Err(SaiStatus::ItemAlreadyExists);
                }
                Some(id)
            }
            _ => return Err(SaiStatus::InvalidParameter),
        };

        let rid_attrs = self.translate_attrs(&attributes)?;
        let vid = match requested {
            Some(vid) => {
                self.allocator.claim_switch(vid);
                vid
            }
            None => {
                let reserved = self
                    .session
                    .as_ref()
                    .map(|s| s.reserved_indexes().clone())
                    .unwrap_or_default();
                self.allocator
                    .allocate_switch(&reserved)
                    .ok_or(SaiStatus::InsufficientResources)?
            }
        };

        let reply = self.driver.apply(DriverRequest {
            switch_id: ObjectId::NULL,
            object_type: ObjectType::SWITCH,
            key: ObjectKey::Oid(ObjectId::NULL),
            call: DriverCall::Create {
                attributes: rid_attrs,
            },
        });
        if !reply.status.is_success() || reply.object_id.is_null() {
            self.allocator.release_switch(vid.switch_index());
            return Err(if reply.status.is_success() {
                SaiStatus::Failure
            } else {
                reply.status
            });
        }

        self.translator.bind(vid, reply.object_id);
        let mut view = View::new(vid);
        view.insert(
            ObjectKey::Oid(vid),
            ViewObject::new(ObjectType::SWITCH, attributes),
        );
        self.switches.insert(vid, view);
        self.driver
            .register_event_sink(reply.object_id, self.hub.sink(vid));
        info!(switch_id = %vid, rid = %reply.object_id, "switch created");
        Ok(ResponsePayload::ObjectId(vid))
    }

    fn remove(&mut self, switch_id: ObjectId, object_type: ObjectType, key: ObjectKey) -> CallResult {
        let sw = self
            .resolve_switch(switch_id, object_type, &key)
            .ok_or(SaiStatus::InvalidParameter)?;
        let sw_rid = self.switch_rid(sw)?;
        if !self.switches.get(&sw).is_some_and(|v| v.contains(&key)) {
            return Err(SaiStatus::ItemNotFound);
        }

        let reply = self.driver.apply(DriverRequest {
            switch_id: sw_rid,
            object_type,
            key: self.translate_key(key)?,
            call: DriverCall::Remove,
        });
        if !reply.status.is_success() {
            return Err(reply.status);
        }

        if key.object_id() == Some(sw) {
            self.switches.remove(&sw);
            let unbound = self.translator.unbind_switch(sw.switch_index());
            self.allocator.release_switch(sw.switch_index());
            self.hub.forget(sw);
            info!(switch_id = %sw, unbound, "switch removed");
            return Ok(ResponsePayload::None);
        }

        if let Some(view) = self.switches.get_mut(&sw) {
            view.remove(&key);
        }
        if let Some(vid) = key.object_id() {
            self.translator.unbind(vid);
        }
        debug!(%key, %object_type, "removed");
        Ok(ResponsePayload::None)
    }

    fn set(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attribute: Attribute,
    ) -> CallResult {
        self.validate(|c| c.validate_set(object_type, &attribute))?;
        let sw = self
            .resolve_switch(switch_id, object_type, &key)
            .ok_or(SaiStatus::InvalidParameter)?;
        let sw_rid = self.switch_rid(sw)?;
        if !self.switches.get(&sw).is_some_and(|v| v.contains(&key)) {
            return Err(SaiStatus::ItemNotFound);
        }

        let mut rid_attr = self.translate_attrs(std::slice::from_ref(&attribute))?;
        let reply = self.driver.apply(DriverRequest {
            switch_id: sw_rid,
            object_type,
            key: self.translate_key(key)?,
            call: DriverCall::Set {
                attribute: rid_attr.remove(0),
            },
        });
        if !reply.status.is_success() {
            return Err(reply.status);
        }

        if let Some(view) = self.switches.get_mut(&sw) {
            view.set_attribute(&key, attribute);
        }
        Ok(ResponsePayload::None)
    }

    fn get(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attr_ids: Vec<AttrId>,
    ) -> CallResult {
        self.validate(|c| c.validate_get(object_type, &attr_ids))?;
        let sw = self
            .resolve_switch(switch_id, object_type, &key)
            .ok_or(SaiStatus::InvalidParameter)?;
        let sw_rid = self.switch_rid(sw)?;

        let reply = self.driver.apply(DriverRequest {
            switch_id: sw_rid,
            object_type,
            key: self.translate_key(key)?,
            call: DriverCall::Get { attr_ids },
        });
        if !reply.status.is_success() {
            return Err(reply.status);
        }
        let mut attributes = reply.attributes;
        self.translator.to_vids(attributes.as_mut_slice());
        Ok(ResponsePayload::Attributes(attributes))
    }

    /// Every non-null id in `value` must name a current or temporary object.
    fn check_references<T: ObjectIdRefs + ?Sized>(&self, value: &T) -> std::result::Result<(), SaiStatus> {
        for id in value.referenced_ids() {
            let current = self
                .switches
                .values()
                .any(|v| v.switch_id == id || v.contains_id(id));
            let temporary = self.session.as_ref().is_some_and(|s| s.knows(id));
            if !current && !temporary {
                debug!(vid = %id, "shadow call references an unknown object");
                return Err(SaiStatus::InvalidObjectId);
            }
        }
        Ok(())
    }

    fn shadow_create(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attributes: Vec<Attribute>,
    ) -> CallResult {
        self.validate(|c| c.validate_create(object_type, &attributes))?;
        self.check_references(attributes.as_slice())?;
        if matches!(key, ObjectKey::Oid(id) if !id.is_null()) {
            return Err(SaiStatus::InvalidParameter);
        }
        if key.object_id().is_none() {
            self.check_references(&key)?;
        }

        let catalog = self.catalog.as_deref();
        let Some(session) = self.session.as_mut() else {
            return Err(SaiStatus::Failure);
        };

        if object_type == ObjectType::SWITCH {
            let candidates = self
                .switches
                .iter()
                .filter_map(|(sw, view)| view.get(&ObjectKey::Oid(*sw)).map(|o| (*sw, o)));
            let vid = match session.best_candidate(candidates, object_type, &attributes, catalog) {
                Some(vid) => {
                    session.claim(vid);
                    vid
                }
                None => {
                    let index = self
                        .allocator
                        .free_switch_index(session.reserved_indexes())
                        .ok_or(SaiStatus::InsufficientResources)?;
                    let vid = self
                        .allocator
                        .allocate(index, ObjectType::SWITCH)
                        .ok_or(SaiStatus::InsufficientResources)?;
                    session.reserve(index);
                    vid
                }
            };
            session.open_switch(vid, ViewObject::new(object_type, attributes))?;
            debug!(switch_id = %vid, "shadow switch");
            return Ok(ResponsePayload::ObjectId(vid));
        }

        let sw = if switch_id.is_null() {
            key.entry_switch_id().ok_or(SaiStatus::InvalidParameter)?
        } else {
            switch_id
        };
        if session.temp_view(sw).is_none() {
            debug!(switch_id = %sw, "switch not declared in the view session");
            return Err(SaiStatus::InvalidParameter);
        }

        match key {
            ObjectKey::Oid(_) => {
                let candidates = self
                    .switches
                    .get(&sw)
                    .into_iter()
                    .flat_map(|v| v.objects_of_type(object_type))
                    .filter_map(|(k, o)| k.object_id().map(|id| (id, o)));
                let vid = match session.best_candidate(candidates, object_type, &attributes, catalog) {
                    Some(vid) => {
                        session.claim(vid);
                        vid
                    }
                    None => self
                        .allocator
                        .allocate(sw.switch_index(), object_type)
                        .ok_or(SaiStatus::InsufficientResources)?,
                };
                session.insert(sw, ObjectKey::Oid(vid), ViewObject::new(object_type, attributes))?;
                Ok(ResponsePayload::ObjectId(vid))
            }
            entry => {
                session.insert(sw, entry, ViewObject::new(object_type, attributes))?;
                Ok(ResponsePayload::None)
            }
        }
    }

    fn shadow_remove(&mut self, key: ObjectKey) -> CallResult {
        let session = self.session.as_mut().ok_or(SaiStatus::Failure)?;
        session.remove(&key)?;
        Ok(ResponsePayload::None)
    }

    fn shadow_set(&mut self, object_type: ObjectType, key: ObjectKey, attribute: Attribute) -> CallResult {
        self.validate(|c| c.validate_set(object_type, &attribute))?;
        self.check_references(&attribute)?;
        let session = self.session.as_mut().ok_or(SaiStatus::Failure)?;
        session.set(&key, attribute)?;
        Ok(ResponsePayload::None)
    }

    /// Temporary objects answer from the session; anything else is read
    /// from the driver.
    fn shadow_get(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attr_ids: Vec<AttrId>,
    ) -> CallResult {
        self.validate(|c| c.validate_get(object_type, &attr_ids))?;
        let from_session = self
            .session
            .as_ref()
            .and_then(|s| s.get(&key, &attr_ids, self.catalog.as_deref()));
        match from_session {
            Some(result) => result.map(ResponsePayload::Attributes),
            None => self.get(switch_id, object_type, key, attr_ids),
        }
    }

    fn init_view(&mut self) -> ResponsePayload {
        if let Some(old) = self.session.replace(ShadowSession::new()) {
            warn!(
                switches = old.switch_ids().count(),
                "view session reopened, previous temporary view discarded"
            );
        }
        info!("view session opened");
        ResponsePayload::None
    }

    fn apply_view(&mut self) -> ResponsePayload {
        match self.session.take() {
            Some(session) => {
                let views = session.into_views();
                info!(
                    switches = views.len(),
                    objects = views.values().map(View::len).sum::<usize>(),
                    "view session closed"
                );
            }
            None => debug!("apply view with no open session"),
        }
        ResponsePayload::None
    }

    /// Loads every saved switch image.
    fn restore(&mut self) -> Result<()> {
        let saved = self.store.list()?;
        if saved.is_empty() {
            info!("no saved switch state, starting empty");
            return Ok(());
        }

        for switch_id in saved {
            let image = self.store.load(switch_id)?;
            let Some(switch_rid) = image.switch_rid() else {
                return Err(SyncdError::InvalidState(format!(
                    "saved state of {switch_id} has no binding for the switch"
                )));
            };

            self.allocator.claim_switch(switch_id);
            for (vid, rid) in &image.bindings {
                self.translator.bind(*vid, *rid);
                self.allocator.observe(*vid);
            }
            self.hub
                .restore_sequence(switch_id, image.notification_sequence);
            self.driver
                .register_event_sink(switch_rid, self.hub.sink(switch_id));
            info!(
                %switch_id,
                objects = image.view.len(),
                bindings = image.bindings.len(),
                saved_at = %image.saved_at,
                "switch state restored"
            );
            self.switches.insert(switch_id, image.view);
        }
        Ok(())
    }

    fn stop(self, kind: ShutdownKind) -> Result<()> {
        if self.session.is_some() {
            warn!("view session open at shutdown, temporary view discarded");
        }
        match kind {
            ShutdownKind::Cold => {
                info!(switches = self.switches.len(), "cold shutdown");
            }
            ShutdownKind::Warm => {
                for (switch_id, view) in &self.switches {
                    let image = SwitchImage::new(
                        view.clone(),
                        self.translator.bindings_for(switch_id.switch_index()),
                        self.hub.last_sequence(*switch_id),
                    );
                    self.store.save(&image)?;
                }
                info!(
                    switches = self.switches.len(),
                    dropped_notifications = self.hub.dropped(),
                    "warm shutdown, state saved"
                );
            }
        }
        Ok(())
    }
}
