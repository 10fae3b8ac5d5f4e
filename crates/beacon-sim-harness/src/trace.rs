//! Ordered record of what a scenario did.
//!
//! The serialised trace is the golden artifact: a JSON array of
//! `{"type": "slot" | "block" | "attestation" | "check", "value": ...}`
//! records. Block and attestation payloads are hex-encoded bincode.
use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use beacon_sim_core::codec;
use beacon_sim_core::error::CodecError;
use beacon_sim_core::types::{Attestation, SignedBeaconBlock, Slot};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TestEvent {
    Slot(Slot),
    Block(String),
    Attestation(String),
    Check(BTreeMap<String, serde_json::Value>),
}

impl TestEvent {
    pub fn block(block: &SignedBeaconBlock) -> Result<Self, CodecError> {
        Ok(Self::Block(hex::encode(codec::encode(block)?)))
    }

    pub fn attestation(attestation: &Attestation) -> Result<Self, CodecError> {
        Ok(Self::Attestation(hex::encode(codec::encode(attestation)?)))
    }

    pub fn check(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Check(BTreeMap::from([(name.into(), value.into())]))
    }

    /// Decode the payload of a block record.
    pub fn decode_block(&self) -> Option<Result<SignedBeaconBlock, CodecError>> {
        match self {
            Self::Block(payload) => Some(decode_hex(payload)),
            _ => None,
        }
    }

    pub fn decode_attestation(&self) -> Option<Result<Attestation, CodecError>> {
        match self {
            Self::Attestation(payload) => Some(decode_hex(payload)),
            _ => None,
        }
    }
}

fn decode_hex<T: bincode::Decode<()>>(payload: &str) -> Result<T, CodecError> {
    let bytes = hex::decode(payload).map_err(|e| CodecError::Decode(e.to_string()))?;
    codec::decode(&bytes)
}

/// Where a recorded trace first departs from the golden one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceMismatch {
    #[error("expected {expected} events, got {actual}")] Length { expected: usize, actual: usize },
    #[error("event {index} differs: expected {expected:?}, got {actual:?}")] Event { index: usize, expected: TestEvent, actual: TestEvent },
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("json: {0}")] Json(#[from] serde_json::Error),
    #[error("golden trace mismatch: {0}")] Mismatch(#[from] TraceMismatch),
}

/// Append-only event log.
#[derive(Debug, Default)]
pub struct EventTrace {
    events: Mutex<Vec<TestEvent>>,
}

impl EventTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TestEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<TestEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn to_json(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string_pretty(&*self.events.lock())?)
    }

    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        let events: Vec<TestEvent> = serde_json::from_str(json)?;
        Ok(Self {
            events: Mutex::new(events),
        })
    }

    /// First difference against `expected`, if any.
    pub fn compare(&self, expected: &[TestEvent]) -> Result<(), TraceMismatch> {
        compare_events(expected, &self.events.lock())
    }
}

pub(crate) fn compare_events(expected: &[TestEvent], actual: &[TestEvent]) -> Result<(), TraceMismatch> {
    if let Some((index, (e, a))) = expected
        .iter()
        .zip(actual)
        .enumerate()
        .find(|(_, (e, a))| e != a)
    {
        return Err(TraceMismatch::Event {
            index,
            expected: e.clone(),
            actual: a.clone(),
        });
    }
    if expected.len() != actual.len() {
        return Err(TraceMismatch::Length {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_sim_core::types::{AttestationData, BeaconBlock, Hash256, Signature};

    fn block() -> SignedBeaconBlock {
        SignedBeaconBlock {
            message: BeaconBlock::empty().with_slot(2).with_parent_root(Hash256([1; 32])),
            signature: Signature([3; 64]),
        }
    }

    #[test]
    fn records_in_order() {
        let trace = EventTrace::new();
        assert!(trace.is_empty());
        trace.record(TestEvent::Slot(1));
        trace.record(TestEvent::check("head", "abc"));
        trace.record(TestEvent::Slot(2));
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.events()[2], TestEvent::Slot(2));
    }

    #[test]
    fn json_shape_is_tagged() {
        let trace = EventTrace::new();
        trace.record(TestEvent::Slot(7));
        trace.record(TestEvent::check("root", "0xff"));
        let value: serde_json::Value = serde_json::from_str(&trace.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"type": "slot", "value": 7},
                {"type": "check", "value": {"root": "0xff"}}
            ])
        );
    }

    #[test]
    fn json_restores_trace() {
        let trace = EventTrace::new();
        trace.record(TestEvent::Slot(1));
        trace.record(TestEvent::block(&block()).unwrap());
        let restored = EventTrace::from_json(&trace.to_json().unwrap()).unwrap();
        assert_eq!(restored.events(), trace.events());
    }

    #[test]
    fn payloads_decode_back_to_messages() {
        let event = TestEvent::block(&block()).unwrap();
        assert_eq!(event.decode_block().unwrap().unwrap(), block());
        assert!(event.decode_attestation().is_none());

        let attestation = Attestation {
            aggregation_bits: vec![false, true],
            data: AttestationData::default().with_slot(4),
            signature: Signature::ZERO,
        };
        let event = TestEvent::attestation(&attestation).unwrap();
        assert_eq!(event.decode_attestation().unwrap().unwrap(), attestation);
    }

    #[test]
    fn corrupt_payload_fails_to_decode() {
        let event = TestEvent::Block("zz".into());
        assert!(matches!(event.decode_block(), Some(Err(CodecError::Decode(_)))));
    }

    #[test]
    fn compare_reports_first_difference() {
        let trace = EventTrace::new();
        trace.record(TestEvent::Slot(1));
        trace.record(TestEvent::Slot(3));
        let expected = [TestEvent::Slot(1), TestEvent::Slot(2)];
        assert_eq!(
            trace.compare(&expected),
            Err(TraceMismatch::Event {
                index: 1,
                expected: TestEvent::Slot(2),
                actual: TestEvent::Slot(3),
            })
        );
    }

    #[test]
    fn compare_reports_length() {
        let trace = EventTrace::new();
        trace.record(TestEvent::Slot(1));
        assert_eq!(
            trace.compare(&[TestEvent::Slot(1), TestEvent::Slot(2)]),
            Err(TraceMismatch::Length { expected: 2, actual: 1 })
        );
        assert_eq!(trace.compare(&[TestEvent::Slot(1)]), Ok(()));
    }
}
