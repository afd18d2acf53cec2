//! Node Codec (C5): binary record layout for a stored node.
//!
//! A node's on-disk representation is exactly two fields: the opaque value
//! string and its expire-at instant. Field order is fixed so that a future
//! codec change that only appends fields still decodes today's records.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The decoded contents of a stored node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Field 0: opaque value bytes (any UTF-8 string).
    pub value: String,
    /// Field 1: expiry instant. [`Timestamp::NEVER`] (or zero) means
    /// "no expiry".
    pub expire_at: Timestamp,
}

impl NodeRecord {
    /// Build a record, normalizing a zero/absent expiry to the sentinel.
    pub fn new(value: impl Into<String>, expire_at: Timestamp) -> Self {
        NodeRecord {
            value: value.into(),
            expire_at: if expire_at == Timestamp::EPOCH {
                Timestamp::NEVER
            } else {
                expire_at
            },
        }
    }

    /// True iff `now` is at or past a real (non-sentinel) expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expire_at.has_elapsed(now)
    }
}

/// Failure to decode a previously-encoded node record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stored bytes did not deserialize as a [`NodeRecord`].
    #[error("failed to decode node record: {0}")]
    Decode(String),
    /// The value could not be serialized to bytes.
    #[error("failed to encode node record: {0}")]
    Encode(String),
}

/// Encode a node record to its on-disk byte representation.
///
/// ```
/// use stratakv_core::codec::{encode, decode, NodeRecord};
/// use stratakv_core::Timestamp;
///
/// let record = NodeRecord::new("hello", Timestamp::from_secs(10));
/// let bytes = encode(&record).unwrap();
/// let decoded = decode(&bytes).unwrap();
/// assert_eq!(record, decoded);
/// ```
pub fn encode(record: &NodeRecord) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(record).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a node record from its on-disk byte representation.
pub fn decode(bytes: &[u8]) -> Result<NodeRecord, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
