//! Attribute codec.
//!
//! Binary framing of requests, responses and notifications. All integers are
//! little-endian.
//!
//! ```text
//! +------+---------+------+-------------+----------------+
//! | "SR" | version | kind | body length | body ...       |
//! |  2   |    1    |  1   |   u32 (4)   | body length    |
//! +------+---------+------+-------------+----------------+
//! ```
//!
//! Lists are a `u32` count followed by the items; byte blobs are a `u32`
//! length followed by the bytes. Encoding a request checks every attribute
//! against the catalog, so a mistyped value fails on the caller's side before
//! anything is sent.

use crate::proto::{
    BulkCreateEntry, BulkItemResult, BulkMode, BulkSetEntry, Call, CallRequest, CallResponse,
    CorrelationId, FdbEventData, FdbEventType, Notification, NotificationKind, Operation,
    PortStatusChange, ResponsePayload,
};
use crate::view::{View, ViewObject};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use sonic_sai::{
    AttrId, AttrValue, AttrValueType, Attribute, Catalog, CatalogError, FdbEntry, NeighborEntry,
    ObjectId, ObjectKey, ObjectType, RouteEntry, SaiStatus,
};
use sonic_types::{AddressFamily, IpAddress, IpPrefix, MacAddress, OperStatus};
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;

/// Frame magic.
pub const MAGIC: [u8; 2] = *b"SR";

/// Wire format version written by this codec.
pub const WIRE_VERSION: u8 = 1;

const HEADER_LEN: usize = 8;

/// Kind of a frame, from its header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Request = 1,
    Response = 2,
    Notification = 3,
}

impl FrameKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FrameKind::Request),
            2 => Some(FrameKind::Response),
            3 => Some(FrameKind::Notification),
            _ => None,
        }
    }
}

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame truncated")]
    Truncated,

    #[error("bad frame magic {0:02x?}")]
    BadMagic([u8; 2]),

    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown {what} tag {tag}")]
    UnknownTag { what: &'static str, tag: u32 },

    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("expected {expected:?} frame, got {actual:?}")]
    UnexpectedFrame { expected: FrameKind, actual: FrameKind },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("unknown object type {0}")]
    UnknownObjectType(ObjectType),

    #[error("unknown attribute {attr} for {object_type}")]
    UnknownAttribute { object_type: ObjectType, attr: AttrId },

    #[error("{attr}: expected {expected:?} value, got {actual:?}")]
    TypeMismatch {
        attr: String,
        expected: AttrValueType,
        actual: AttrValueType,
    },
}

impl From<CatalogError> for CodecError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownObjectType(ot) => CodecError::UnknownObjectType(ot),
            CatalogError::UnknownAttribute { object_type, attr } => {
                CodecError::UnknownAttribute { object_type, attr }
            }
            CatalogError::TypeMismatch {
                name,
                expected,
                actual,
            } => CodecError::TypeMismatch {
                attr: name,
                expected,
                actual,
            },
            other => CodecError::InvalidValue(other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, CodecError>;

/// Request/response/notification codec.
///
/// Decoding never needs the catalog; encoding a request validates attribute
/// tags against it when one is attached.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    catalog: Option<Arc<Catalog>>,
}

impl Codec {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// A codec that skips catalog validation.
    pub fn unchecked() -> Self {
        Self { catalog: None }
    }

    pub fn catalog(&self) -> Option<&Arc<Catalog>> {
        self.catalog.as_ref()
    }

    pub fn encode_request(&self, request: &CallRequest) -> Result<Vec<u8>> {
        if let Some(catalog) = &self.catalog {
            validate_request(catalog, request)?;
        }

        let mut w = Writer::default();
        w.u64(request.correlation_id);
        w.oid(request.switch_id);
        w.u32(request.object_type.as_raw());
        w.u8(u8::from(request.shadow));
        w.u8(request.operation().tag());

        match &request.call {
            Call::Create { key, attributes } => {
                w.key(key);
                w.attributes(attributes)?;
            }
            Call::Remove { key } => w.key(key),
            Call::Set { key, attribute } => {
                w.key(key);
                w.attribute(attribute)?;
            }
            Call::Get { key, attr_ids } => {
                w.key(key);
                w.count(attr_ids.len())?;
                for id in attr_ids {
                    w.u32(id.0);
                }
            }
            Call::BulkCreate { entries, mode } => {
                w.u8(*mode as u8);
                w.count(entries.len())?;
                for entry in entries {
                    w.key(&entry.key);
                    w.attributes(&entry.attributes)?;
                }
            }
            Call::BulkRemove { keys, mode } => {
                w.u8(*mode as u8);
                w.count(keys.len())?;
                for key in keys {
                    w.key(key);
                }
            }
            Call::BulkSet { entries, mode } => {
                w.u8(*mode as u8);
                w.count(entries.len())?;
                for entry in entries {
                    w.key(&entry.key);
                    w.attribute(&entry.attribute)?;
                }
            }
            Call::InitView | Call::ApplyView | Call::DumpView => {}
        }

        w.finish(FrameKind::Request)
    }

    pub fn decode_request(&self, bytes: &[u8]) -> Result<CallRequest> {
        let mut r = Reader::frame(bytes, FrameKind::Request)?;
        let correlation_id = r.u64()?;
        let switch_id = r.oid()?;
        let object_type = ObjectType::from_raw(r.u32()?);
        let shadow = r.bool()?;
        let op_tag = r.u8()?;
        let op = Operation::from_tag(op_tag).ok_or(CodecError::UnknownTag {
            what: "operation",
            tag: u32::from(op_tag),
        })?;

        let call = match op {
            Operation::Create => Call::Create {
                key: r.key()?,
                attributes: r.attributes()?,
            },
            Operation::Remove => Call::Remove { key: r.key()? },
            Operation::Set => Call::Set {
                key: r.key()?,
                attribute: r.attribute()?,
            },
            Operation::Get => {
                let key = r.key()?;
                let n = r.count(4)?;
                let mut attr_ids = Vec::with_capacity(n);
                for _ in 0..n {
                    attr_ids.push(AttrId(r.u32()?));
                }
                Call::Get { key, attr_ids }
            }
            Operation::BulkCreate => {
                let mode = r.bulk_mode()?;
                let n = r.count(2)?;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    entries.push(BulkCreateEntry {
                        key: r.key()?,
                        attributes: r.attributes()?,
                    });
                }
                Call::BulkCreate { entries, mode }
            }
            Operation::BulkRemove => {
                let mode = r.bulk_mode()?;
                let n = r.count(2)?;
                let mut keys = Vec::with_capacity(n);
                for _ in 0..n {
                    keys.push(r.key()?);
                }
                Call::BulkRemove { keys, mode }
            }
            Operation::BulkSet => {
                let mode = r.bulk_mode()?;
                let n = r.count(2)?;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    entries.push(BulkSetEntry {
                        key: r.key()?,
                        attribute: r.attribute()?,
                    });
                }
                Call::BulkSet { entries, mode }
            }
            Operation::InitView => Call::InitView,
            Operation::ApplyView => Call::ApplyView,
            Operation::DumpView => Call::DumpView,
        };

        r.finish()?;
        Ok(CallRequest {
            correlation_id,
            switch_id,
            object_type,
            shadow,
            call,
        })
    }

    pub fn encode_response(&self, response: &CallResponse) -> Result<Vec<u8>> {
        let mut w = Writer::default();
        w.u64(response.correlation_id);
        w.i32(response.status.as_raw());
        w.u8(response.payload.tag());

        match &response.payload {
            ResponsePayload::None => {}
            ResponsePayload::ObjectId(id) => w.oid(*id),
            ResponsePayload::Attributes(attrs) => w.attributes(attrs)?,
            ResponsePayload::Bulk(items) => {
                w.count(items.len())?;
                for item in items {
                    w.i32(item.status.as_raw());
                    w.oid(item.object_id);
                }
            }
            ResponsePayload::Views(views) => {
                w.count(views.len())?;
                for view in views {
                    w.view(view)?;
                }
            }
        }

        w.finish(FrameKind::Response)
    }

    pub fn decode_response(&self, bytes: &[u8]) -> Result<CallResponse> {
        let mut r = Reader::frame(bytes, FrameKind::Response)?;
        let correlation_id = r.u64()?;
        let status = SaiStatus::from_raw(r.i32()?);
        let tag = r.u8()?;

        let payload = match tag {
            0 => ResponsePayload::None,
            1 => ResponsePayload::ObjectId(r.oid()?),
            2 => ResponsePayload::Attributes(r.attributes()?),
            3 => {
                let n = r.count(12)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(BulkItemResult {
                        status: SaiStatus::from_raw(r.i32()?),
                        object_id: r.oid()?,
                    });
                }
                ResponsePayload::Bulk(items)
            }
            4 => {
                let n = r.count(12)?;
                let mut views = Vec::with_capacity(n);
                for _ in 0..n {
                    views.push(r.view()?);
                }
                ResponsePayload::Views(views)
            }
            other => {
                return Err(CodecError::UnknownTag {
                    what: "payload",
                    tag: u32::from(other),
                })
            }
        };

        r.finish()?;
        Ok(CallResponse {
            correlation_id,
            status,
            payload,
        })
    }

    pub fn encode_notification(&self, notification: &Notification) -> Result<Vec<u8>> {
        let mut w = Writer::default();
        w.oid(notification.switch_id);
        w.u64(notification.sequence);

        match &notification.kind {
            NotificationKind::SwitchStateChange { status } => {
                w.u8(1);
                w.i32(status.as_raw());
            }
            NotificationKind::SwitchShutdownRequest => w.u8(2),
            NotificationKind::PortStateChange(changes) => {
                w.u8(3);
                w.count(changes.len())?;
                for change in changes {
                    w.oid(change.port_id);
                    w.i32(change.status.as_raw());
                }
            }
            NotificationKind::FdbEvent(events) => {
                w.u8(4);
                w.count(events.len())?;
                for event in events {
                    w.u8(event.event as u8);
                    w.fdb_entry(&event.entry);
                    w.attributes(&event.attributes)?;
                }
            }
        }

        w.finish(FrameKind::Notification)
    }

    pub fn decode_notification(&self, bytes: &[u8]) -> Result<Notification> {
        let mut r = Reader::frame(bytes, FrameKind::Notification)?;
        let switch_id = r.oid()?;
        let sequence = r.u64()?;
        let tag = r.u8()?;

        let kind = match tag {
            1 => NotificationKind::SwitchStateChange {
                status: OperStatus::from_raw(r.i32()?),
            },
            2 => NotificationKind::SwitchShutdownRequest,
            3 => {
                let n = r.count(12)?;
                let mut changes = Vec::with_capacity(n);
                for _ in 0..n {
                    changes.push(PortStatusChange {
                        port_id: r.oid()?,
                        status: OperStatus::from_raw(r.i32()?),
                    });
                }
                NotificationKind::PortStateChange(changes)
            }
            4 => {
                let n = r.count(27)?;
                let mut events = Vec::with_capacity(n);
                for _ in 0..n {
                    let event_tag = r.u8()?;
                    let event = FdbEventType::from_tag(event_tag).ok_or(CodecError::UnknownTag {
                        what: "fdb event",
                        tag: u32::from(event_tag),
                    })?;
                    events.push(FdbEventData {
                        event,
                        entry: r.fdb_entry()?,
                        attributes: r.attributes()?,
                    });
                }
                NotificationKind::FdbEvent(events)
            }
            other => {
                return Err(CodecError::UnknownTag {
                    what: "notification",
                    tag: u32::from(other),
                })
            }
        };

        r.finish()?;
        Ok(Notification {
            switch_id,
            sequence,
            kind,
        })
    }
}

/// Reads and checks a frame header.
pub fn frame_kind(bytes: &[u8]) -> Result<FrameKind> {
    split_frame(bytes).map(|(kind, _)| kind)
}

/// Correlation id of a request or response frame, without decoding the rest.
pub fn peek_correlation_id(bytes: &[u8]) -> Result<CorrelationId> {
    let (kind, body) = split_frame(bytes)?;
    if kind == FrameKind::Notification {
        return Err(CodecError::UnexpectedFrame {
            expected: FrameKind::Request,
            actual: kind,
        });
    }
    let mut r = Reader::body(body);
    r.u64()
}

fn split_frame(bytes: &[u8]) -> Result<(FrameKind, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated);
    }
    let magic = [bytes[0], bytes[1]];
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    if bytes[2] != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(bytes[2]));
    }
    let kind = FrameKind::from_tag(bytes[3]).ok_or(CodecError::UnknownTag {
        what: "frame kind",
        tag: u32::from(bytes[3]),
    })?;
    let declared = LittleEndian::read_u32(&bytes[4..HEADER_LEN]) as usize;
    let body = &bytes[HEADER_LEN..];
    if declared != body.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok((kind, body))
}

fn validate_request(catalog: &Catalog, request: &CallRequest) -> Result<()> {
    let ot = request.object_type;
    match &request.call {
        Call::Create { attributes, .. } => {
            for attr in attributes {
                catalog.check_value(ot, attr)?;
            }
        }
        Call::Set { attribute, .. } => {
            catalog.check_value(ot, attribute)?;
        }
        Call::Get { attr_ids, .. } => catalog.validate_get(ot, attr_ids)?,
        Call::BulkCreate { entries, .. } => {
            for attr in entries.iter().flat_map(|e| &e.attributes) {
                catalog.check_value(ot, attr)?;
            }
        }
        Call::BulkSet { entries, .. } => {
            for entry in entries {
                catalog.check_value(ot, &entry.attribute)?;
            }
        }
        Call::Remove { .. }
        | Call::BulkRemove { .. }
        | Call::InitView
        | Call::ApplyView
        | Call::DumpView => {}
    }
    Ok(())
}

const KEY_OID: u8 = 0;
const KEY_ROUTE: u8 = 1;
const KEY_FDB: u8 = 2;
const KEY_NEIGHBOR: u8 = 3;

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn finish(self, kind: FrameKind) -> Result<Vec<u8>> {
        let len = u32::try_from(self.buf.len())
            .map_err(|_| CodecError::InvalidValue(format!("body of {} bytes", self.buf.len())))?;
        let mut frame = Vec::with_capacity(HEADER_LEN + self.buf.len());
        frame.extend_from_slice(&MAGIC);
        frame.push(WIRE_VERSION);
        frame.push(kind as u8);
        let mut len_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut len_bytes, len);
        frame.extend_from_slice(&len_bytes);
        frame.extend_from_slice(&self.buf);
        Ok(frame)
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn i16(&mut self, v: i16) {
        let mut b = [0u8; 2];
        LittleEndian::write_i16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn i64(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn count(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n).map_err(|_| CodecError::InvalidValue(format!("list of {n} items")))?;
        self.u32(n);
        Ok(())
    }

    fn oid(&mut self, id: ObjectId) {
        self.u64(id.as_raw());
    }

    fn mac(&mut self, mac: &MacAddress) {
        self.buf.extend_from_slice(&mac.octets());
    }

    fn ip(&mut self, ip: &IpAddress) {
        self.u8(ip.family() as u8);
        self.buf.extend_from_slice(&ip.octets());
    }

    fn prefix(&mut self, prefix: &IpPrefix) {
        self.ip(&prefix.address());
        self.u8(prefix.prefix_len());
    }

    fn fdb_entry(&mut self, entry: &FdbEntry) {
        self.oid(entry.switch_id);
        self.mac(&entry.mac_address);
        self.oid(entry.bv_id);
    }

    fn key(&mut self, key: &ObjectKey) {
        match key {
            ObjectKey::Oid(id) => {
                self.u8(KEY_OID);
                self.oid(*id);
            }
            ObjectKey::Route(e) => {
                self.u8(KEY_ROUTE);
                self.oid(e.switch_id);
                self.oid(e.vr_id);
                self.prefix(&e.destination);
            }
            ObjectKey::Fdb(e) => {
                self.u8(KEY_FDB);
                self.fdb_entry(e);
            }
            ObjectKey::Neighbor(e) => {
                self.u8(KEY_NEIGHBOR);
                self.oid(e.switch_id);
                self.oid(e.rif_id);
                self.ip(&e.ip_address);
            }
        }
    }

    fn value(&mut self, value: &AttrValue) -> Result<()> {
        self.u8(value.value_type().tag());
        match value {
            AttrValue::Bool(v) => self.u8(u8::from(*v)),
            AttrValue::U8(v) => self.u8(*v),
            AttrValue::I8(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            AttrValue::U16(v) => self.u16(*v),
            AttrValue::I16(v) => self.i16(*v),
            AttrValue::U32(v) => self.u32(*v),
            AttrValue::I32(v) | AttrValue::Enum(v) => self.i32(*v),
            AttrValue::U64(v) => self.u64(*v),
            AttrValue::I64(v) => self.i64(*v),
            AttrValue::ObjectId(id) => self.oid(*id),
            AttrValue::ObjectList(ids) => {
                self.count(ids.len())?;
                for id in ids {
                    self.oid(*id);
                }
            }
            AttrValue::IpAddress(ip) => self.ip(ip),
            AttrValue::IpPrefix(prefix) => self.prefix(prefix),
            AttrValue::Mac(mac) => self.mac(mac),
            AttrValue::Bytes(bytes) => {
                self.count(bytes.len())?;
                self.buf.extend_from_slice(bytes);
            }
        }
        Ok(())
    }

    fn attribute(&mut self, attr: &Attribute) -> Result<()> {
        self.u32(attr.id.0);
        self.value(&attr.value)
    }

    fn attributes(&mut self, attrs: &[Attribute]) -> Result<()> {
        self.count(attrs.len())?;
        for attr in attrs {
            self.attribute(attr)?;
        }
        Ok(())
    }

    fn view(&mut self, view: &View) -> Result<()> {
        self.oid(view.switch_id);
        self.count(view.len())?;
        for (key, object) in view.iter() {
            self.key(key);
            self.u32(object.object_type.as_raw());
            self.count(object.attributes.len())?;
            for (id, value) in &object.attributes {
                self.u32(id.0);
                self.value(value)?;
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn frame(bytes: &'a [u8], expected: FrameKind) -> Result<Self> {
        let (kind, body) = split_frame(bytes)?;
        if kind != expected {
            return Err(CodecError::UnexpectedFrame {
                expected,
                actual: kind,
            });
        }
        Ok(Self::body(body))
    }

    fn body(body: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(body),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.cur.get_ref().len();
        len.saturating_sub(self.cur.position() as usize)
    }

    /// Fails when bytes remain after the body was decoded.
    fn finish(&self) -> Result<()> {
        let remaining = self.remaining();
        if remaining != 0 {
            let declared = self.cur.get_ref().len();
            return Err(CodecError::LengthMismatch {
                declared,
                actual: declared - remaining,
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.cur.read_u8().map_err(|_| CodecError::Truncated)
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidValue(format!("bool byte {other}"))),
        }
    }

    fn i8(&mut self) -> Result<i8> {
        self.cur.read_i8().map_err(|_| CodecError::Truncated)
    }

    fn u16(&mut self) -> Result<u16> {
        self.cur.read_u16::<LittleEndian>().map_err(|_| CodecError::Truncated)
    }

    fn i16(&mut self) -> Result<i16> {
        self.cur.read_i16::<LittleEndian>().map_err(|_| CodecError::Truncated)
    }

    fn u32(&mut self) -> Result<u32> {
        self.cur.read_u32::<LittleEndian>().map_err(|_| CodecError::Truncated)
    }

    fn i32(&mut self) -> Result<i32> {
        self.cur.read_i32::<LittleEndian>().map_err(|_| CodecError::Truncated)
    }

    fn u64(&mut self) -> Result<u64> {
        self.cur.read_u64::<LittleEndian>().map_err(|_| CodecError::Truncated)
    }

    fn i64(&mut self) -> Result<i64> {
        self.cur.read_i64::<LittleEndian>().map_err(|_| CodecError::Truncated)
    }

    fn exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.cur.read_exact(&mut buf).map_err(|_| CodecError::Truncated)?;
        Ok(buf)
    }

    /// Reads a list count, rejecting counts the remaining bytes cannot hold.
    fn count(&mut self, min_item_len: usize) -> Result<usize> {
        let n = self.u32()? as usize;
        let remaining = self.remaining();
        if n.saturating_mul(min_item_len) > remaining {
            return Err(CodecError::LengthMismatch {
                declared: n,
                actual: remaining,
            });
        }
        Ok(n)
    }

    fn oid(&mut self) -> Result<ObjectId> {
        self.u64().map(ObjectId::from_raw)
    }

    fn bulk_mode(&mut self) -> Result<BulkMode> {
        let tag = self.u8()?;
        BulkMode::from_tag(tag).ok_or(CodecError::UnknownTag {
            what: "bulk mode",
            tag: u32::from(tag),
        })
    }

    fn mac(&mut self) -> Result<MacAddress> {
        Ok(MacAddress::new(self.exact::<6>()?))
    }

    fn ip(&mut self) -> Result<IpAddress> {
        let family = AddressFamily::from_raw(self.u8()?)
            .map_err(|e| CodecError::InvalidValue(e.to_string()))?;
        let octets = match family {
            AddressFamily::Ipv4 => self.exact::<4>()?.to_vec(),
            AddressFamily::Ipv6 => self.exact::<16>()?.to_vec(),
        };
        IpAddress::from_octets(family, &octets).map_err(|e| CodecError::InvalidValue(e.to_string()))
    }

    fn prefix(&mut self) -> Result<IpPrefix> {
        let address = self.ip()?;
        let len = self.u8()?;
        IpPrefix::new(address, len).map_err(|e| CodecError::InvalidValue(e.to_string()))
    }

    fn fdb_entry(&mut self) -> Result<FdbEntry> {
        Ok(FdbEntry {
            switch_id: self.oid()?,
            mac_address: self.mac()?,
            bv_id: self.oid()?,
        })
    }

    fn key(&mut self) -> Result<ObjectKey> {
        let tag = self.u8()?;
        let key = match tag {
            KEY_OID => ObjectKey::Oid(self.oid()?),
            KEY_ROUTE => ObjectKey::Route(RouteEntry {
                switch_id: self.oid()?,
                vr_id: self.oid()?,
                destination: self.prefix()?,
            }),
            KEY_FDB => ObjectKey::Fdb(self.fdb_entry()?),
            KEY_NEIGHBOR => ObjectKey::Neighbor(NeighborEntry {
                switch_id: self.oid()?,
                rif_id: self.oid()?,
                ip_address: self.ip()?,
            }),
            other => {
                return Err(CodecError::UnknownTag {
                    what: "object key",
                    tag: u32::from(other),
                })
            }
        };
        Ok(key)
    }

    fn value(&mut self) -> Result<AttrValue> {
        let tag = self.u8()?;
        let ty = AttrValueType::from_tag(tag).ok_or(CodecError::UnknownTag {
            what: "attribute value",
            tag: u32::from(tag),
        })?;
        let value = match ty {
            AttrValueType::Bool => AttrValue::Bool(self.bool()?),
            AttrValueType::U8 => AttrValue::U8(self.u8()?),
            AttrValueType::I8 => AttrValue::I8(self.i8()?),
            AttrValueType::U16 => AttrValue::U16(self.u16()?),
            AttrValueType::I16 => AttrValue::I16(self.i16()?),
            AttrValueType::U32 => AttrValue::U32(self.u32()?),
            AttrValueType::I32 => AttrValue::I32(self.i32()?),
            AttrValueType::U64 => AttrValue::U64(self.u64()?),
            AttrValueType::I64 => AttrValue::I64(self.i64()?),
            AttrValueType::Enum => AttrValue::Enum(self.i32()?),
            AttrValueType::ObjectId => AttrValue::ObjectId(self.oid()?),
            AttrValueType::ObjectList => {
                let n = self.count(8)?;
                let mut ids = Vec::with_capacity(n);
                for _ in 0..n {
                    ids.push(self.oid()?);
                }
                AttrValue::ObjectList(ids)
            }
            AttrValueType::IpAddress => AttrValue::IpAddress(self.ip()?),
            AttrValueType::IpPrefix => AttrValue::IpPrefix(self.prefix()?),
            AttrValueType::Mac => AttrValue::Mac(self.mac()?),
            AttrValueType::Bytes => {
                let n = self.count(1)?;
                let mut bytes = vec![0u8; n];
                self.cur
                    .read_exact(&mut bytes)
                    .map_err(|_| CodecError::Truncated)?;
                AttrValue::Bytes(bytes)
            }
        };
        Ok(value)
    }

    fn attribute(&mut self) -> Result<Attribute> {
        let id = AttrId(self.u32()?);
        Ok(Attribute {
            id,
            value: self.value()?,
        })
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>> {
        let n = self.count(5)?;
        let mut attrs = Vec::with_capacity(n);
        for _ in 0..n {
            attrs.push(self.attribute()?);
        }
        Ok(attrs)
    }

    fn view(&mut self) -> Result<View> {
        let mut view = View::new(self.oid()?);
        let n = self.count(9)?;
        for _ in 0..n {
            let key = self.key()?;
            let object_type = ObjectType::from_raw(self.u32()?);
            let attributes = self.attributes()?;
            view.insert(key, ViewObject::new(object_type, attributes));
        }
        Ok(view)
    }
}
