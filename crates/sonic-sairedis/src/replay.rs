//! Record log replay.
//!
//! Resubmits the recorded requests, in order, against a fresh daemon. Object
//! ids handed out during the recording are rewritten to the ids the fresh
//! daemon hands out, learned from CREATE responses as the replay goes. Each
//! fresh response is compared byte for byte with the recorded one after the
//! same rewriting.
//!
//! Record files are appended to by every recording session and correlation
//! ids start over with each client, so a request is paired with the first
//! response to its id that follows it in the file.

use crate::channel::ClientChannel;
use crate::codec::Codec;
use crate::error::{Result, SairedisError};
use crate::proto::{Call, CallRequest, CallResponse, CorrelationId, Operation, ResponsePayload};
use crate::recorder::{Direction, RecordEntry};
use sonic_sai::{ObjectId, ObjectIdRefs, ObjectKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A recorded response that differs from the fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    /// Correlation id in the record log.
    pub correlation_id: CorrelationId,
    pub operation: Operation,
    /// Recorded response, ids rewritten, hex encoded.
    pub expected: String,
    /// Fresh response, hex encoded.
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub requests: usize,
    pub matched: usize,
    pub mismatches: Vec<ReplayMismatch>,
    /// Requests the fresh daemon did not answer in time.
    pub timeouts: usize,
    /// Requests with no recorded response, sent without comparison.
    pub unanswered: usize,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.timeouts == 0
    }
}

pub struct Replayer {
    channel: Arc<dyn ClientChannel>,
    codec: Codec,
    timeout: Duration,
    next_id: CorrelationId,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl Replayer {
    pub fn new(channel: Arc<dyn ClientChannel>, codec: Codec, timeout: Duration) -> Self {
        Self {
            channel,
            codec,
            timeout,
            next_id: 1,
            id_map: HashMap::new(),
        }
    }

    /// Recorded id to fresh id mapping learned so far.
    pub fn id_map(&self) -> &HashMap<ObjectId, ObjectId> {
        &self.id_map
    }

    pub async fn run(&mut self, entries: &[RecordEntry]) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();
        for (entry, recorded_response) in pair_responses(entries) {
            report.requests += 1;
            let recorded = self.codec.decode_request(&entry.frame)?;
            let operation = recorded.operation();

            let fresh_id = self.next_id;
            self.next_id += 1;
            let mut request = recorded.clone();
            request.correlation_id = fresh_id;
            self.rewrite(&mut request);

            let frame = self.codec.encode_request(&request)?;
            self.channel.send_request(fresh_id, frame).await?;
            let actual = match self.channel.await_response(fresh_id, self.timeout).await {
                Ok(frame) => frame,
                Err(SairedisError::Timeout { .. }) => {
                    warn!(correlation_id = entry.correlation_id, op = %operation, "no response during replay");
                    self.channel.abandon(fresh_id);
                    report.timeouts += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let Some(expected) = recorded_response else {
                debug!(correlation_id = entry.correlation_id, "no recorded response");
                report.unanswered += 1;
                continue;
            };
            let mut expected = self.codec.decode_response(expected)?;
            let fresh = self.codec.decode_response(&actual)?;
            self.learn(&recorded, &expected, &fresh);

            expected.correlation_id = fresh_id;
            self.rewrite(&mut expected);
            let expected = self.codec.encode_response(&expected)?;
            if expected == actual {
                report.matched += 1;
            } else {
                warn!(correlation_id = entry.correlation_id, op = %operation, "response differs");
                report.mismatches.push(ReplayMismatch {
                    correlation_id: entry.correlation_id,
                    operation,
                    expected: hex::encode(&expected),
                    actual: hex::encode(&actual),
                });
            }
        }

        info!(
            requests = report.requests,
            matched = report.matched,
            mismatches = report.mismatches.len(),
            timeouts = report.timeouts,
            "replay finished"
        );
        Ok(report)
    }

    fn rewrite<T: ObjectIdRefs + ?Sized>(&self, value: &mut T) {
        value.remap_object_ids(&mut |id| self.id_map.get(&id).copied().unwrap_or(id));
    }

    /// Records the ids a create handed out, recorded against fresh.
    fn learn(&mut self, request: &CallRequest, recorded: &CallResponse, fresh: &CallResponse) {
        let mut pairs = Vec::new();
        match (&request.call, &recorded.payload, &fresh.payload) {
            (
                Call::Create {
                    key: ObjectKey::Oid(key),
                    ..
                },
                ResponsePayload::ObjectId(old),
                ResponsePayload::ObjectId(new),
            ) if key.is_null() => pairs.push((*old, *new)),
            (Call::BulkCreate { .. }, ResponsePayload::Bulk(old), ResponsePayload::Bulk(new)) => {
                pairs.extend(
                    old.iter()
                        .zip(new)
                        .map(|(o, n)| (o.object_id, n.object_id)),
                );
            }
            _ => {}
        }

        for (old, new) in pairs {
            if old.is_null() || new.is_null() || old == new {
                continue;
            }
            debug!(recorded = %old, fresh = %new, "learned id");
            self.id_map.insert(old, new);
        }
    }
}

/// Requests in file order, each with the first response to its id that
/// follows it. A later request reusing the id closes the earlier one.
fn pair_responses(entries: &[RecordEntry]) -> Vec<(&RecordEntry, Option<&[u8]>)> {
    let mut pairs: Vec<(&RecordEntry, Option<&[u8]>)> = Vec::new();
    let mut open: HashMap<CorrelationId, usize> = HashMap::new();
    for entry in entries {
        match entry.direction {
            Direction::Request => {
                open.insert(entry.correlation_id, pairs.len());
                pairs.push((entry, None));
            }
            Direction::Response => match open.remove(&entry.correlation_id) {
                Some(index) => pairs[index].1 = Some(entry.frame.as_slice()),
                None => debug!(correlation_id = entry.correlation_id, "response without a request"),
            },
        }
    }
    pairs
}
