//! View transactions.
//!
//! ```text
//! IDLE --init--> BUILDING --apply--> RECONCILING --ApplyView ok--> IDLE
//!                                         |  ^
//!                                         +--+ retry (after a failure)
//! ```
//!
//! While BUILDING, every call of the proxy is sent as a shadow call: the
//! daemon validates it against its own copy of the temporary view and never
//! touches the driver, and the proxy mirrors each successful call into the
//! temporary view kept here. `apply` fetches the daemon's current views,
//! plans the difference per switch and runs the plan as ordinary synchronous
//! calls, one at a time, before closing the daemon's session.
//!
//! A failure while reconciling leaves the transaction RECONCILING with the
//! switch partly reconciled. Nothing is rolled back; `retry` plans again from
//! the daemon's updated views and `reset` abandons the temporary view.

use crate::client::RemoteSai;
use crate::config::CommunicationMode;
use crate::error::{Result, SairedisError};
use crate::proto::{Call, CallRequest, ResponsePayload};
use crate::reconcile::{self, FailedOp, PlannedOp, ReconciliationPlan};
use crate::view::{View, ViewObject};
use sonic_sai::{Attribute, ObjectId, ObjectKey, ObjectType, SaiStatus};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Phase of the view transaction of one proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewPhase {
    #[default]
    Idle,
    Building,
    Reconciling,
}

/// Transaction state shared by every clone of a proxy.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    phase: ViewPhase,
    /// InitView round trip in flight.
    opening: bool,
    temp_views: BTreeMap<ObjectId, View>,
}

impl TransactionState {
    pub(crate) fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// Applies the effect of a successful shadow call to the temporary view.
    pub(crate) fn mirror(
        &mut self,
        request: &CallRequest,
        status: SaiStatus,
        payload: &ResponsePayload,
    ) {
        let ot = request.object_type;
        let sw = request.switch_id;
        match (&request.call, payload) {
            (Call::Create { key, attributes }, _) if status.is_success() => {
                let created = match payload {
                    ResponsePayload::ObjectId(id) => *id,
                    _ => ObjectId::NULL,
                };
                self.mirror_create(sw, ot, *key, attributes, created);
            }
            (Call::Remove { key }, _) if status.is_success() => self.mirror_remove(key),
            (Call::Set { key, attribute }, _) if status.is_success() => {
                self.mirror_set(key, attribute)
            }
            (Call::BulkCreate { entries, .. }, ResponsePayload::Bulk(items)) => {
                for (entry, item) in entries.iter().zip(items) {
                    if item.status.is_success() {
                        self.mirror_create(sw, ot, entry.key, &entry.attributes, item.object_id);
                    }
                }
            }
            (Call::BulkRemove { keys, .. }, ResponsePayload::Bulk(items)) => {
                for (key, item) in keys.iter().zip(items) {
                    if item.status.is_success() {
                        self.mirror_remove(key);
                    }
                }
            }
            (Call::BulkSet { entries, .. }, ResponsePayload::Bulk(items)) => {
                for (entry, item) in entries.iter().zip(items) {
                    if item.status.is_success() {
                        self.mirror_set(&entry.key, &entry.attribute);
                    }
                }
            }
            _ => {}
        }
    }

    fn mirror_create(
        &mut self,
        switch_id: ObjectId,
        object_type: ObjectType,
        key: ObjectKey,
        attributes: &[Attribute],
        created: ObjectId,
    ) {
        let key = match key {
            ObjectKey::Oid(id) if id.is_null() => ObjectKey::Oid(created),
            other => other,
        };
        let owner = if object_type == ObjectType::SWITCH {
            key.object_id()
        } else {
            self.owner_of(switch_id, &key)
        };
        let Some(owner) = owner.filter(|id| !id.is_null()) else {
            warn!(%key, %object_type, "cannot tell which switch a shadow object belongs to");
            return;
        };

        self.temp_views
            .entry(owner)
            .or_insert_with(|| View::new(owner))
            .insert(key, ViewObject::new(object_type, attributes.iter().cloned()));
    }

    fn mirror_remove(&mut self, key: &ObjectKey) {
        if let Some(id) = key.object_id() {
            if self.temp_views.remove(&id).is_some() {
                return;
            }
        }
        if let Some(view) = self.temp_views.values_mut().find(|v| v.contains(key)) {
            view.remove(key);
        }
    }

    fn mirror_set(&mut self, key: &ObjectKey, attribute: &Attribute) {
        if let Some(view) = self.temp_views.values_mut().find(|v| v.contains(key)) {
            view.set_attribute(key, attribute.clone());
        }
    }

    /// Switch an object belongs to: the explicit switch id, the switch
    /// embedded in an entry key, or the switch with the same index as a
    /// virtual id.
    fn owner_of(&self, switch_id: ObjectId, key: &ObjectKey) -> Option<ObjectId> {
        if !switch_id.is_null() {
            return Some(switch_id);
        }
        if let Some(sw) = key.entry_switch_id() {
            return Some(sw);
        }
        let id = key.object_id()?;
        self.temp_views
            .keys()
            .find(|sw| sw.switch_index() == id.switch_index())
            .copied()
    }

    fn close(&mut self) {
        self.phase = ViewPhase::Idle;
        self.opening = false;
        self.temp_views.clear();
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// One plan per switch of the temporary view.
    pub plans: Vec<ReconciliationPlan>,
    /// Operations executed.
    pub applied: usize,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }

    pub fn ops(&self) -> impl Iterator<Item = &PlannedOp> {
        self.plans.iter().flat_map(|p| p.ops.iter())
    }
}

/// View transaction manager of one proxy.
pub struct ViewTransaction<'a> {
    sai: &'a RemoteSai,
}

impl<'a> ViewTransaction<'a> {
    pub(crate) fn new(sai: &'a RemoteSai) -> Self {
        Self { sai }
    }

    pub fn phase(&self) -> ViewPhase {
        self.sai.inner.transaction.lock().phase
    }

    /// Copy of the temporary view of a switch.
    pub fn temporary_view(&self, switch_id: ObjectId) -> Option<View> {
        self.sai.inner.transaction.lock().temp_views.get(&switch_id).cloned()
    }

    /// Opens the transaction (INIT_VIEW).
    pub async fn init(&self) -> Result<()> {
        if self.sai.communication_mode() == CommunicationMode::NotifyOnly {
            return Err(SairedisError::InvalidState(
                "view transactions are unavailable in notify-only mode".to_string(),
            ));
        }
        {
            let mut state = self.sai.inner.transaction.lock();
            if state.phase != ViewPhase::Idle || state.opening {
                return Err(SairedisError::InvalidState(format!(
                    "view transaction already open ({:?})",
                    state.phase
                )));
            }
            state.opening = true;
        }

        let result = self
            .sai
            .execute(ObjectId::NULL, ObjectType::NULL, Call::InitView)
            .await;

        let mut state = self.sai.inner.transaction.lock();
        state.opening = false;
        result?;
        state.temp_views.clear();
        state.phase = ViewPhase::Building;
        info!("view transaction opened");
        Ok(())
    }

    /// Reconciles the temporary view against the current one (APPLY_VIEW).
    pub async fn apply(&self) -> Result<ApplyReport> {
        {
            let mut state = self.sai.inner.transaction.lock();
            if state.phase != ViewPhase::Building {
                return Err(SairedisError::InvalidState(format!(
                    "apply requires an open view transaction, phase is {:?}",
                    state.phase
                )));
            }
            state.phase = ViewPhase::Reconciling;
        }
        self.reconcile().await
    }

    /// Plans and runs the remaining difference after a failed apply.
    pub async fn retry(&self) -> Result<ApplyReport> {
        let phase = self.phase();
        if phase != ViewPhase::Reconciling {
            return Err(SairedisError::InvalidState(format!(
                "nothing to retry, phase is {phase:?}"
            )));
        }
        info!("retrying view reconciliation");
        self.reconcile().await
    }

    /// Abandons the transaction and closes the daemon's session.
    ///
    /// The local state returns to IDLE even when the daemon cannot be
    /// reached; the error is still reported.
    pub async fn reset(&self) -> Result<()> {
        {
            let state = self.sai.inner.transaction.lock();
            if state.phase == ViewPhase::Idle && !state.opening {
                return Ok(());
            }
        }
        let result = self
            .sai
            .execute(ObjectId::NULL, ObjectType::NULL, Call::ApplyView)
            .await;
        self.sai.inner.transaction.lock().close();
        match result {
            Ok(_) => {
                info!("view transaction reset");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "view transaction reset locally, daemon session not closed");
                Err(err)
            }
        }
    }

    /// Plans without executing anything.
    pub async fn plan(&self) -> Result<Vec<ReconciliationPlan>> {
        if self.phase() == ViewPhase::Idle {
            return Err(SairedisError::InvalidState(
                "no view transaction open".to_string(),
            ));
        }
        let current = self.sai.dump_views().await?;
        self.plans(&current)
    }

    fn plans(&self, current: &[View]) -> Result<Vec<ReconciliationPlan>> {
        let temporary: Vec<View> = self
            .sai
            .inner
            .transaction
            .lock()
            .temp_views
            .values()
            .cloned()
            .collect();
        let catalog = self.sai.catalog();

        temporary
            .iter()
            .map(|temp| {
                let empty;
                let cur = match current.iter().find(|v| v.switch_id == temp.switch_id) {
                    Some(view) => view,
                    None => {
                        empty = View::new(temp.switch_id);
                        &empty
                    }
                };
                reconcile::plan(cur, temp, catalog)
            })
            .collect()
    }

    async fn reconcile(&self) -> Result<ApplyReport> {
        let current = self.sai.dump_views().await?;
        let plans = self.plans(&current)?;
        for plan in &plans {
            let (creates, sets, removes) = plan.counts();
            info!(
                switch_id = %plan.switch_id,
                creates,
                sets,
                removes,
                "reconciliation planned"
            );
        }

        let applied = self.execute_plans(&plans).await?;
        self.sai
            .execute(ObjectId::NULL, ObjectType::NULL, Call::ApplyView)
            .await?;

        self.sai.inner.transaction.lock().close();
        info!(applied, "view applied");
        Ok(ApplyReport { plans, applied })
    }

    async fn execute_plans(&self, plans: &[ReconciliationPlan]) -> Result<usize> {
        let ops: Vec<(ObjectId, &PlannedOp)> = plans
            .iter()
            .flat_map(|p| p.ops.iter().map(move |op| (p.switch_id, op)))
            .collect();

        for (index, (switch_id, op)) in ops.iter().enumerate() {
            match self
                .sai
                .execute(*switch_id, op.object_type, op.to_call())
                .await
            {
                Ok(_) => debug!(%op, "reconciled"),
                Err(err) => {
                    warn!(%op, error = %err, "reconciliation stopped");
                    return Err(SairedisError::PartialReconciliation {
                        applied: owned_ops(&ops[..index]),
                        failed: vec![FailedOp {
                            op: (*op).clone(),
                            status: err.status(),
                            reason: err.to_string(),
                        }],
                        skipped: owned_ops(&ops[index + 1..]),
                    });
                }
            }
        }
        Ok(ops.len())
    }
}

fn owned_ops(ops: &[(ObjectId, &PlannedOp)]) -> Vec<PlannedOp> {
    ops.iter().map(|(_, op)| (*op).clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{InProcessChannel, InProcessServer, ServerChannel};
    use crate::codec::Codec;
    use crate::config::ClientConfig;
    use crate::proto::{BulkCreateEntry, BulkItemResult, BulkMode, CallResponse};
    use pretty_assertions::assert_eq;
    use sonic_sai::{AttrId, AttrValue, Catalog};
    use std::sync::Arc;

    const SW: u64 = 0x0021_0000_0000_0001;
    const PORT_A: u64 = 0x0001_0000_0000_0002;
    const PORT_B: u64 = 0x0001_0000_0000_0003;

    fn oid(raw: u64) -> ObjectId {
        ObjectId::from_raw(raw)
    }

    fn shadow(call: Call, object_type: ObjectType, switch_id: ObjectId) -> CallRequest {
        CallRequest {
            correlation_id: 1,
            switch_id,
            object_type,
            shadow: true,
            call,
        }
    }

    #[test]
    fn test_mirror_builds_temporary_view() {
        let mut state = TransactionState::default();
        state.mirror(
            &shadow(
                Call::Create {
                    key: ObjectKey::Oid(ObjectId::NULL),
                    attributes: vec![],
                },
                ObjectType::SWITCH,
                ObjectId::NULL,
            ),
            SaiStatus::Success,
            &ResponsePayload::ObjectId(oid(SW)),
        );
        state.mirror(
            &shadow(
                Call::BulkCreate {
                    entries: vec![
                        BulkCreateEntry {
                            key: ObjectKey::Oid(ObjectId::NULL),
                            attributes: vec![Attribute::new(0, AttrValue::U32(1))],
                        },
                        BulkCreateEntry {
                            key: ObjectKey::Oid(ObjectId::NULL),
                            attributes: vec![],
                        },
                    ],
                    mode: BulkMode::IgnoreError,
                },
                ObjectType::PORT,
                oid(SW),
            ),
            SaiStatus::Failure,
            &ResponsePayload::Bulk(vec![
                BulkItemResult::created(oid(PORT_A)),
                BulkItemResult::new(SaiStatus::InvalidParameter),
            ]),
        );

        let view = &state.temp_views[&oid(SW)];
        assert_eq!(view.len(), 2);
        assert!(view.contains_id(oid(PORT_A)));

        // a set with a null switch id finds the view through the object
        state.mirror(
            &shadow(
                Call::Set {
                    key: ObjectKey::Oid(oid(PORT_A)),
                    attribute: Attribute::new(0, AttrValue::U32(2)),
                },
                ObjectType::PORT,
                ObjectId::NULL,
            ),
            SaiStatus::Success,
            &ResponsePayload::None,
        );
        let port = state.temp_views[&oid(SW)].get(&ObjectKey::Oid(oid(PORT_A))).unwrap();
        assert_eq!(port.attribute(AttrId(0)), Some(&AttrValue::U32(2)));

        // failed calls leave the view alone
        state.mirror(
            &shadow(
                Call::Remove {
                    key: ObjectKey::Oid(oid(PORT_A)),
                },
                ObjectType::PORT,
                ObjectId::NULL,
            ),
            SaiStatus::ObjectInUse,
            &ResponsePayload::None,
        );
        assert!(state.temp_views[&oid(SW)].contains_id(oid(PORT_A)));

        state.mirror(
            &shadow(
                Call::Remove {
                    key: ObjectKey::Oid(oid(PORT_A)),
                },
                ObjectType::PORT,
                ObjectId::NULL,
            ),
            SaiStatus::Success,
            &ResponsePayload::None,
        );
        assert!(!state.temp_views[&oid(SW)].contains_id(oid(PORT_A)));
        assert!(!state.temp_views[&oid(SW)].contains_id(oid(PORT_B)));
    }

    /// Answers every request with success; dumps return no views.
    fn spawn_daemon(server: InProcessServer) -> tokio::task::JoinHandle<Vec<CallRequest>> {
        tokio::spawn(async move {
            let codec = Codec::unchecked();
            let mut seen = Vec::new();
            while let Ok(Some(frame)) = server.recv_request().await {
                let request = codec.decode_request(&frame).unwrap();
                let payload = match request.call {
                    Call::DumpView => ResponsePayload::Views(vec![]),
                    Call::Create { .. } => ResponsePayload::ObjectId(oid(SW)),
                    _ => ResponsePayload::None,
                };
                let response = CallResponse::success(request.correlation_id, payload);
                server
                    .send_response(request.correlation_id, codec.encode_response(&response).unwrap())
                    .await
                    .unwrap();
                seen.push(request);
            }
            seen
        })
    }

    fn client() -> (RemoteSai, InProcessServer) {
        let (client, server) = InProcessChannel::pair();
        let catalog = Arc::new(Catalog::builder().object_type(ObjectType::SWITCH).build().unwrap());
        let sai = RemoteSai::new(Arc::new(client), catalog, &ClientConfig::default()).unwrap();
        (sai, server)
    }

    #[tokio::test]
    async fn test_phase_machine() {
        let (sai, server) = client();
        let daemon = spawn_daemon(server);
        let view = sai.view();

        assert!(matches!(view.apply().await, Err(SairedisError::InvalidState(_))));
        view.init().await.unwrap();
        assert_eq!(view.phase(), ViewPhase::Building);
        assert!(matches!(view.init().await, Err(SairedisError::InvalidState(_))));

        let sw = sai.create_switch(vec![]).await.unwrap().wait().await.unwrap();
        assert_eq!(sw, oid(SW));
        assert_eq!(view.temporary_view(sw).unwrap().len(), 1);

        let report = view.apply().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(view.phase(), ViewPhase::Idle);
        assert!(view.temporary_view(sw).is_none());

        drop(sai);
        let seen = daemon.await.unwrap();
        let ops: Vec<_> = seen.iter().map(|r| (r.operation(), r.shadow)).collect();
        use crate::proto::Operation::*;
        assert_eq!(
            ops,
            vec![
                (InitView, false),
                (Create, true),
                (DumpView, false),
                (Create, false),
                (ApplyView, false),
            ]
        );
        // the real create carries the id handed out in the shadow session
        assert_eq!(seen[3].call.key(), Some(&ObjectKey::Oid(oid(SW))));
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let (sai, server) = client();
        let _daemon = spawn_daemon(server);
        let view = sai.view();

        view.reset().await.unwrap();
        view.init().await.unwrap();
        sai.create_switch(vec![]).await.unwrap();
        view.reset().await.unwrap();
        assert_eq!(view.phase(), ViewPhase::Idle);
        assert!(view.temporary_view(oid(SW)).is_none());
        assert!(matches!(view.retry().await, Err(SairedisError::InvalidState(_))));
    }
}
