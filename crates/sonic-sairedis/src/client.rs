//! Client proxy.
//!
//! [`RemoteSai`] presents every SAI operation as one logical call. Each call
//! builds its own immutable [`CallRequest`], takes a fresh correlation id,
//! goes through the codec and the channel, and is settled by the matching
//! response. In [`CommunicationMode::Sync`] the call resolves once the
//! response arrives; in [`CommunicationMode::Async`] it resolves to a
//! [`PendingCall`] right after the request was sent.
//!
//! Mutating calls are never retried: a timeout leaves their effect on the
//! driver unknown. GET calls are retried on transport errors and timeouts.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-2: Event Logging - Optional record tap of every request and response
//! - SI-10: Information Input Validation - Attributes checked against the catalog

use crate::channel::ClientChannel;
use crate::codec::{Codec, CodecError};
use crate::config::{ClientConfig, CommunicationMode};
use crate::error::{Result, SairedisError};
use crate::notify::NotificationStream;
use crate::proto::{
    BulkCreateEntry, BulkItemResult, BulkMode, BulkSetEntry, Call, CallRequest, CallResponse,
    CorrelationId, ResponsePayload,
};
use crate::recorder::{Direction, Recorder};
use crate::transaction::{TransactionState, ViewPhase, ViewTransaction};
use crate::view::View;
use parking_lot::{Mutex, RwLock};
use sonic_sai::{AttrId, Attribute, Catalog, ObjectId, ObjectKey, ObjectType};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Extract<T> = fn(ResponsePayload) -> Result<T>;

#[derive(Debug, Clone, Copy)]
struct Settings {
    mode: CommunicationMode,
    response_timeout: Duration,
    get_retries: u32,
}

pub(crate) struct Inner {
    channel: Arc<dyn ClientChannel>,
    codec: Codec,
    catalog: Arc<Catalog>,
    settings: RwLock<Settings>,
    next_id: AtomicU64,
    recorder: Mutex<Option<Recorder>>,
    pub(crate) transaction: Mutex<TransactionState>,
}

/// Handle to a remote SAI implementation behind a channel.
///
/// Cloning is cheap; clones share the correlation counter, the settings, the
/// record tap and the view transaction.
#[derive(Clone)]
pub struct RemoteSai {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for RemoteSai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSai")
            .field("settings", &*self.inner.settings.read())
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl RemoteSai {
    pub fn new(
        channel: Arc<dyn ClientChannel>,
        catalog: Arc<Catalog>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let recorder = config.record.as_ref().map(Recorder::open).transpose()?;
        let settings = Settings {
            mode: config.communication_mode,
            response_timeout: config.response_timeout(),
            get_retries: config.get_retries,
        };
        info!(
            mode = ?settings.mode,
            timeout_ms = config.response_timeout_ms,
            recording = recorder.is_some(),
            "sairedis client ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                channel,
                codec: Codec::new(catalog.clone()),
                catalog,
                settings: RwLock::new(settings),
                next_id: AtomicU64::new(1),
                recorder: Mutex::new(recorder),
                transaction: Mutex::new(TransactionState::default()),
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    pub fn communication_mode(&self) -> CommunicationMode {
        self.inner.settings.read().mode
    }

    pub fn set_communication_mode(&self, mode: CommunicationMode) {
        let mut settings = self.inner.settings.write();
        if settings.mode != mode {
            info!(from = ?settings.mode, to = ?mode, "communication mode changed");
            settings.mode = mode;
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.inner.settings.read().response_timeout
    }

    pub fn set_response_timeout(&self, timeout: Duration) {
        self.inner.settings.write().response_timeout = timeout;
    }

    pub fn set_get_retries(&self, retries: u32) {
        self.inner.settings.write().get_retries = retries;
    }

    /// Starts appending every request and response to `path`.
    pub fn enable_recording(&self, path: impl Into<PathBuf>) -> Result<()> {
        let recorder = Recorder::open(path)?;
        *self.inner.recorder.lock() = Some(recorder);
        Ok(())
    }

    pub fn disable_recording(&self) {
        if let Some(mut recorder) = self.inner.recorder.lock().take() {
            if let Err(err) = recorder.comment("recording off") {
                warn!(error = %err, "failed to close record log");
            }
            info!(path = %recorder.path().display(), "recording disabled");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recorder.lock().is_some()
    }

    /// Reopens the record log before the next record.
    pub fn request_log_rotate(&self) {
        if let Some(recorder) = self.inner.recorder.lock().as_ref() {
            recorder.request_log_rotate();
        }
    }

    /// View transaction manager bound to this proxy.
    pub fn view(&self) -> ViewTransaction<'_> {
        ViewTransaction::new(self)
    }

    /// Creates a switch; the returned id is the switch's virtual id.
    pub async fn create_switch(&self, attributes: Vec<Attribute>) -> Result<Invocation<ObjectId>> {
        let call = Call::Create {
            key: ObjectKey::Oid(ObjectId::NULL),
            attributes,
        };
        self.submit(ObjectId::NULL, ObjectType::SWITCH, call, extract_object_id)
            .await
    }

    /// Creates an id-keyed object on `switch_id`.
    pub async fn create(
        &self,
        switch_id: ObjectId,
        object_type: ObjectType,
        attributes: Vec<Attribute>,
    ) -> Result<Invocation<ObjectId>> {
        let call = Call::Create {
            key: ObjectKey::Oid(ObjectId::NULL),
            attributes,
        };
        self.submit(switch_id, object_type, call, extract_object_id)
            .await
    }

    /// Creates a route, FDB or neighbor entry.
    pub async fn create_entry(
        &self,
        key: ObjectKey,
        attributes: Vec<Attribute>,
    ) -> Result<Invocation<()>> {
        let object_type = entry_type(&key)?;
        let call = Call::Create { key, attributes };
        self.submit(switch_of(&key), object_type, call, extract_unit)
            .await
    }

    pub async fn remove(&self, object_type: ObjectType, key: ObjectKey) -> Result<Invocation<()>> {
        self.submit(switch_of(&key), object_type, Call::Remove { key }, extract_unit)
            .await
    }

    pub async fn set(
        &self,
        object_type: ObjectType,
        key: ObjectKey,
        attribute: Attribute,
    ) -> Result<Invocation<()>> {
        let call = Call::Set { key, attribute };
        self.submit(switch_of(&key), object_type, call, extract_unit)
            .await
    }

    pub async fn get(
        &self,
        object_type: ObjectType,
        key: ObjectKey,
        attr_ids: &[AttrId],
    ) -> Result<Invocation<Vec<Attribute>>> {
        let call = Call::Get {
            key,
            attr_ids: attr_ids.to_vec(),
        };
        self.submit(switch_of(&key), object_type, call, extract_attributes)
            .await
    }

    /// Creates objects of one type in one request. For id-keyed objects the
    /// entry key is `Oid(NULL)` and the created ids come back per item.
    pub async fn bulk_create(
        &self,
        switch_id: ObjectId,
        object_type: ObjectType,
        entries: Vec<BulkCreateEntry>,
        mode: BulkMode,
    ) -> Result<Invocation<Vec<BulkItemResult>>> {
        let call = Call::BulkCreate { entries, mode };
        self.submit(switch_id, object_type, call, extract_bulk)
            .await
    }

    pub async fn bulk_remove(
        &self,
        switch_id: ObjectId,
        object_type: ObjectType,
        keys: Vec<ObjectKey>,
        mode: BulkMode,
    ) -> Result<Invocation<Vec<BulkItemResult>>> {
        let call = Call::BulkRemove { keys, mode };
        self.submit(switch_id, object_type, call, extract_bulk)
            .await
    }

    pub async fn bulk_set(
        &self,
        switch_id: ObjectId,
        object_type: ObjectType,
        entries: Vec<BulkSetEntry>,
        mode: BulkMode,
    ) -> Result<Invocation<Vec<BulkItemResult>>> {
        let call = Call::BulkSet { entries, mode };
        self.submit(switch_id, object_type, call, extract_bulk)
            .await
    }

    /// Notifications of one switch, with sequence gaps reported.
    pub async fn subscribe(&self, switch_id: ObjectId) -> Result<NotificationStream> {
        let frames = self.inner.channel.subscribe_notifications().await?;
        debug!(%switch_id, "notification subscription opened");
        Ok(NotificationStream::new(
            frames,
            self.inner.codec.clone(),
            Some(switch_id),
        ))
    }

    /// Notifications of every switch.
    pub async fn subscribe_all(&self) -> Result<NotificationStream> {
        let frames = self.inner.channel.subscribe_notifications().await?;
        Ok(NotificationStream::new(frames, self.inner.codec.clone(), None))
    }

    async fn submit<T>(
        &self,
        switch_id: ObjectId,
        object_type: ObjectType,
        call: Call,
        extract: Extract<T>,
    ) -> Result<Invocation<T>> {
        let settings = *self.inner.settings.read();
        if settings.mode == CommunicationMode::NotifyOnly {
            return Err(SairedisError::InvalidState(format!(
                "{} rejected in notify-only mode",
                call.operation()
            )));
        }

        let shadow = match self.inner.transaction.lock().phase() {
            ViewPhase::Idle => false,
            ViewPhase::Building => true,
            ViewPhase::Reconciling => {
                return Err(SairedisError::InvalidState(
                    "view transaction is reconciling; retry or reset it first".to_string(),
                ));
            }
        };

        let is_get = matches!(call, Call::Get { .. });
        let attempts = if is_get && settings.mode == CommunicationMode::Sync {
            settings.get_retries.saturating_add(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let request = CallRequest {
                correlation_id: self.inner.next_correlation_id(),
                switch_id,
                object_type,
                shadow,
                call: call.clone(),
            };

            // Shadow calls settle before returning so the temporary view
            // never misses a change the daemon accepted.
            let outcome = match settings.mode {
                CommunicationMode::Async if !shadow => {
                    self.inner.send(&request).await?;
                    return Ok(Invocation::Pending(PendingCall::new(
                        self.inner.clone(),
                        request,
                        extract,
                    )));
                }
                _ => self.inner.round_trip(&request, settings.response_timeout).await,
            };

            match outcome {
                Ok(response) => {
                    return self.inner.settle(&request, response, extract).map(Invocation::Done);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        correlation_id = request.correlation_id,
                        attempt,
                        error = %err,
                        "retrying get"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Synchronous real call outside the shadow session, used by view
    /// control and reconciliation.
    pub(crate) async fn execute(
        &self,
        switch_id: ObjectId,
        object_type: ObjectType,
        call: Call,
    ) -> Result<ResponsePayload> {
        let request = CallRequest {
            correlation_id: self.inner.next_correlation_id(),
            switch_id,
            object_type,
            shadow: false,
            call,
        };
        let timeout = self.response_timeout();
        let response = self.inner.round_trip(&request, timeout).await?;
        self.inner.settle(&request, response, Ok)
    }

    /// Current views of every switch, as the daemon holds them.
    pub async fn dump_views(&self) -> Result<Vec<View>> {
        let payload = self
            .execute(ObjectId::NULL, ObjectType::NULL, Call::DumpView)
            .await?;
        extract_views(payload)
    }
}

impl Inner {
    fn next_correlation_id(&self) -> CorrelationId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, direction: Direction, id: CorrelationId, frame: &[u8]) {
        if let Some(recorder) = self.recorder.lock().as_mut() {
            if let Err(err) = recorder.record(direction, id, frame) {
                warn!(correlation_id = id, error = %err, "failed to write record log");
            }
        }
    }

    async fn send(&self, request: &CallRequest) -> Result<()> {
        let frame = self.codec.encode_request(request)?;
        self.record(Direction::Request, request.correlation_id, &frame);
        debug!(
            correlation_id = request.correlation_id,
            op = %request.operation(),
            object_type = %request.object_type,
            shadow = request.shadow,
            "sending request"
        );
        self.channel.send_request(request.correlation_id, frame).await
    }

    async fn receive(&self, id: CorrelationId, timeout: Duration) -> Result<CallResponse> {
        let frame = self.channel.await_response(id, timeout).await?;
        self.record(Direction::Response, id, &frame);
        let response = self.codec.decode_response(&frame)?;
        if response.correlation_id != id {
            return Err(SairedisError::Transport(format!(
                "response for correlation id {} delivered to {}",
                response.correlation_id, id
            )));
        }
        Ok(response)
    }

    async fn round_trip(&self, request: &CallRequest, timeout: Duration) -> Result<CallResponse> {
        self.send(request).await?;
        let result = self.receive(request.correlation_id, timeout).await;
        if result.is_err() {
            self.channel.abandon(request.correlation_id);
        }
        result
    }

    /// Turns a response into the caller's value, mirroring shadow effects
    /// into the temporary view first.
    fn settle<T>(
        &self,
        request: &CallRequest,
        response: CallResponse,
        extract: Extract<T>,
    ) -> Result<T> {
        if request.shadow {
            self.transaction
                .lock()
                .mirror(request, response.status, &response.payload);
        }

        if !response.status.is_success() {
            debug!(
                correlation_id = request.correlation_id,
                op = %request.operation(),
                status = %response.status,
                "call rejected"
            );
            return Err(match response.payload {
                ResponsePayload::Bulk(items) => SairedisError::BulkFailed {
                    status: response.status,
                    items,
                },
                _ => SairedisError::Driver {
                    status: response.status,
                },
            });
        }
        extract(response.payload)
    }
}

/// Outcome of a call: settled in sync mode, pending in async mode. Calls made
/// while a view is being built are always settled.
#[derive(Debug)]
pub enum Invocation<T> {
    Done(T),
    Pending(PendingCall<T>),
}

impl<T> Invocation<T> {
    /// Waits for the result, whatever the mode was.
    pub async fn wait(self) -> Result<T> {
        match self {
            Invocation::Done(value) => Ok(value),
            Invocation::Pending(pending) => pending.wait().await,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Invocation::Pending(_))
    }

    pub fn into_pending(self) -> Option<PendingCall<T>> {
        match self {
            Invocation::Pending(pending) => Some(pending),
            Invocation::Done(_) => None,
        }
    }
}

/// A sent call whose response has not been consumed yet.
///
/// Dropping it abandons the call: the request may still run to completion on
/// the daemon, its response is discarded.
pub struct PendingCall<T> {
    inner: Arc<Inner>,
    request: CallRequest,
    extract: Extract<T>,
    settled: bool,
}

impl<T> fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("correlation_id", &self.request.correlation_id)
            .field("operation", &self.request.operation())
            .field("settled", &self.settled)
            .finish()
    }
}

impl<T> PendingCall<T> {
    fn new(inner: Arc<Inner>, request: CallRequest, extract: Extract<T>) -> Self {
        Self {
            inner,
            request,
            extract,
            settled: false,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.request.correlation_id
    }

    pub fn request(&self) -> &CallRequest {
        &self.request
    }

    /// Checks for the response without blocking. `Ok(None)` means it has
    /// not arrived yet.
    pub async fn try_poll(&mut self) -> Result<Option<T>> {
        if self.settled {
            return Err(SairedisError::InvalidState(format!(
                "call {} already settled",
                self.request.correlation_id
            )));
        }
        match self
            .inner
            .receive(self.request.correlation_id, Duration::ZERO)
            .await
        {
            Ok(response) => {
                self.settled = true;
                self.inner
                    .settle(&self.request, response, self.extract)
                    .map(Some)
            }
            Err(SairedisError::Timeout { .. }) => Ok(None),
            Err(err) => {
                self.settled = true;
                self.inner.channel.abandon(self.request.correlation_id);
                Err(err)
            }
        }
    }

    /// Waits up to the proxy's response timeout.
    pub async fn wait(self) -> Result<T> {
        let timeout = self.inner.settings.read().response_timeout;
        self.wait_for(timeout).await
    }

    pub async fn wait_for(mut self, timeout: Duration) -> Result<T> {
        if self.settled {
            return Err(SairedisError::InvalidState(format!(
                "call {} already settled",
                self.request.correlation_id
            )));
        }
        let result = self.inner.receive(self.request.correlation_id, timeout).await;
        self.settled = true;
        match result {
            Ok(response) => self.inner.settle(&self.request, response, self.extract),
            Err(err) => {
                self.inner.channel.abandon(self.request.correlation_id);
                Err(err)
            }
        }
    }
}

impl<T> Drop for PendingCall<T> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(
                correlation_id = self.request.correlation_id,
                "pending call dropped"
            );
            self.inner.channel.abandon(self.request.correlation_id);
        }
    }
}

fn switch_of(key: &ObjectKey) -> ObjectId {
    key.entry_switch_id().unwrap_or(ObjectId::NULL)
}

fn entry_type(key: &ObjectKey) -> Result<ObjectType> {
    key.entry_type().ok_or_else(|| {
        SairedisError::InvalidState(format!("{key} is not an entry key; use create()"))
    })
}

fn unexpected(expected: &str, payload: &ResponsePayload) -> SairedisError {
    SairedisError::Codec(CodecError::InvalidValue(format!(
        "expected {expected} payload, got tag {}",
        payload.tag()
    )))
}

fn extract_unit(_: ResponsePayload) -> Result<()> {
    Ok(())
}

fn extract_object_id(payload: ResponsePayload) -> Result<ObjectId> {
    match payload {
        ResponsePayload::ObjectId(id) if !id.is_null() => Ok(id),
        other => Err(unexpected("object id", &other)),
    }
}

fn extract_attributes(payload: ResponsePayload) -> Result<Vec<Attribute>> {
    match payload {
        ResponsePayload::Attributes(attributes) => Ok(attributes),
        other => Err(unexpected("attribute", &other)),
    }
}

fn extract_bulk(payload: ResponsePayload) -> Result<Vec<BulkItemResult>> {
    match payload {
        ResponsePayload::Bulk(items) => Ok(items),
        other => Err(unexpected("bulk", &other)),
    }
}

pub(crate) fn extract_views(payload: ResponsePayload) -> Result<Vec<View>> {
    match payload {
        ResponsePayload::Views(views) => Ok(views),
        other => Err(unexpected("view", &other)),
    }
}
