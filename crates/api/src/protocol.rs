//! Remote Protocol (C10): the request/response message set every façade
//! operation is mirrored by, plus the wire-safe stand-ins for the core
//! option and node types (core types carry no `serde` impls of their own;
//! this module is the only place that needs them to).
//!
//! Every method name is prefixed by the service identifier [`SERVICE_NAME`],
//! matching the source protocol's `"KVDB.Get"`-style dispatch strings.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use stratakv_core::{DeleteOptions, Error as CoreError, GetOptions, Node, SetOptions, Timestamp};

/// Service name prefixing every method in the catalogue below.
pub const SERVICE_NAME: &str = "KVDB";

/// Wire form of [`GetOptions`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireGetter {
    /// Whether to enumerate children alongside the node itself.
    pub children: bool,
    /// Pagination cursor.
    pub start: String,
    /// Page size; see [`GetOptions`] for the zero/negative convention.
    pub limit: i64,
}

impl From<&GetOptions> for WireGetter {
    fn from(opts: &GetOptions) -> Self {
        WireGetter {
            children: opts.children,
            start: opts.start.clone(),
            limit: opts.limit,
        }
    }
}

impl From<WireGetter> for GetOptions {
    fn from(wire: WireGetter) -> Self {
        GetOptions {
            children: wire.children,
            start: wire.start,
            limit: wire.limit,
        }
    }
}

/// Wire form of [`SetOptions`]: the expire-at instant as raw microseconds,
/// since [`Timestamp`] itself has no `serde` impl exposed across the
/// protocol boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireSetter {
    /// Expiry instant in microseconds since epoch; 0 means "never expires".
    pub expire_at_micros: u64,
}

impl From<&SetOptions> for WireSetter {
    fn from(opts: &SetOptions) -> Self {
        WireSetter {
            expire_at_micros: opts.expire_at.as_micros(),
        }
    }
}

impl From<WireSetter> for SetOptions {
    fn from(wire: WireSetter) -> Self {
        SetOptions {
            expire_at: Timestamp::from_micros(wire.expire_at_micros),
        }
    }
}

/// Wire form of [`DeleteOptions`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WireDeleter {
    /// Also delete every descendant of the targeted key(s).
    pub children: bool,
}

impl From<&DeleteOptions> for WireDeleter {
    fn from(opts: &DeleteOptions) -> Self {
        WireDeleter { children: opts.children }
    }
}

impl From<WireDeleter> for DeleteOptions {
    fn from(wire: WireDeleter) -> Self {
        DeleteOptions { children: wire.children }
    }
}

/// Wire form of [`Node`]: `{value, children}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNode {
    /// The node's own value.
    pub value: String,
    /// Present only when the caller requested children.
    pub children: Option<BTreeMap<String, String>>,
}

impl From<Node> for WireNode {
    fn from(node: Node) -> Self {
        WireNode {
            value: node.value,
            children: node.children,
        }
    }
}

impl From<WireNode> for Node {
    fn from(wire: WireNode) -> Self {
        Node {
            value: wire.value,
            children: wire.children,
        }
    }
}

/// One request per façade operation (§4.9), carrying the caller's argument
/// list verbatim with option groups embedded as records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// `GetReq{key, getter}`.
    Get {
        /// Key to fetch.
        key: String,
        /// Child-listing options.
        getter: WireGetter,
    },
    /// `GetMultiReq{keys, getter}`.
    GetMulti {
        /// Keys to fetch.
        keys: Vec<String>,
        /// Child-listing options, applied per the cursor-matching rule
        /// (§4.6.3).
        getter: WireGetter,
    },
    /// `SetReq{key, value, setter}`.
    Set {
        /// Key to write.
        key: String,
        /// New value.
        value: String,
        /// Expiry options.
        setter: WireSetter,
    },
    /// `SetMultiReq{kvPairs, setter}`. `kv_pairs` is the flat
    /// `[k0, v0, k1, v1, ...]` sequence.
    SetMulti {
        /// Flat key/value sequence.
        kv_pairs: Vec<String>,
        /// Expiry options shared by every pair.
        setter: WireSetter,
    },
    /// `DeleteReq{key, deleter}`.
    Delete {
        /// Key to delete.
        key: String,
        /// Cascade options.
        deleter: WireDeleter,
    },
    /// `DeleteMultiReq{keys, deleter}`.
    DeleteMulti {
        /// Keys to delete.
        keys: Vec<String>,
        /// Cascade options, shared by every key.
        deleter: WireDeleter,
    },
    /// `ExistReq{key}`.
    Exists {
        /// Key to test.
        key: String,
    },
    /// `CleanupReq{}`.
    Cleanup,
}

impl Request {
    /// The `"KVDB.<Method>"` dispatch string for logging and the method
    /// catalogue.
    pub fn method_name(&self) -> &'static str {
        match self {
            Request::Get { .. } => "KVDB.Get",
            Request::GetMulti { .. } => "KVDB.GetMulti",
            Request::Set { .. } => "KVDB.Set",
            Request::SetMulti { .. } => "KVDB.SetMulti",
            Request::Delete { .. } => "KVDB.Delete",
            Request::DeleteMulti { .. } => "KVDB.DeleteMulti",
            Request::Exists { .. } => "KVDB.Exists",
            Request::Cleanup => "KVDB.Cleanup",
        }
    }
}

/// The corresponding payload for each [`Request`] variant, on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// `GetResp{node?}`.
    Get(Option<WireNode>),
    /// `GetMultiResp{nodes}`.
    GetMulti(HashMap<String, WireNode>),
    /// `ExistResp{has}`.
    Exists(bool),
    /// Every empty-bodied response (`Set`, `SetMulti`, `Delete`,
    /// `DeleteMulti`, `Cleanup`).
    Unit,
}

/// Wire-safe mirror of the façade error taxonomy (§7). `Transport` is
/// deliberately absent: a transport failure never makes it into a decoded
/// response, it is detected by the client before a response exists at all.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum WireError {
    /// `set-multi` given an odd-length pair list.
    #[error("set-multi requires an even number of key/value entries, got {0}")]
    InvalidPairs(usize),
    /// Unrecognized relational driver tag.
    #[error("unknown relational driver '{0}'")]
    InvalidDriver(String),
    /// A stored record failed to decode.
    #[error("codec error: {0}")]
    Codec(String),
    /// An error surfaced verbatim from the underlying store.
    #[error("backend error: {0}")]
    Backend(String),
    /// A call was made on a façade after `close()` already succeeded once.
    #[error("façade is already closed")]
    AlreadyClosed,
}

impl From<&CoreError> for WireError {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::InvalidPairs(n) => WireError::InvalidPairs(*n),
            CoreError::InvalidDriver(d) => WireError::InvalidDriver(d.clone()),
            CoreError::Codec(e) => WireError::Codec(e.to_string()),
            CoreError::Backend(msg) => WireError::Backend(msg.clone()),
            CoreError::Transport(msg) => WireError::Backend(msg.clone()),
            CoreError::AlreadyClosed => WireError::AlreadyClosed,
        }
    }
}

impl From<WireError> for CoreError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::InvalidPairs(n) => CoreError::InvalidPairs(n),
            WireError::InvalidDriver(d) => CoreError::InvalidDriver(d),
            WireError::Codec(msg) => CoreError::Backend(msg),
            WireError::Backend(msg) => CoreError::Backend(msg),
            WireError::AlreadyClosed => CoreError::AlreadyClosed,
        }
    }
}

/// A request tagged with a correlation id so a single connection can have
/// several calls in flight at once (the id is echoed back on the matching
/// [`ResponseFrame`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id, assigned by the caller.
    pub id: u64,
    /// The request payload.
    pub request: Request,
}

/// A response tagged with the id of the request it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Correlation id, copied from the originating [`RequestFrame`].
    pub id: u64,
    /// The outcome: the response payload, or a façade error.
    pub result: Result<Response, WireError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_are_prefixed_by_the_service_name() {
        let req = Request::Get {
            key: "k".into(),
            getter: WireGetter::default(),
        };
        assert!(req.method_name().starts_with(SERVICE_NAME));
    }

    #[test]
    fn getter_round_trips_through_core_options() {
        let opts = GetOptions {
            children: true,
            start: "group.g".into(),
            limit: 5,
        };
        let wire: WireGetter = (&opts).into();
        let back: GetOptions = wire.into();
        assert_eq!(back.children, opts.children);
        assert_eq!(back.start, opts.start);
        assert_eq!(back.limit, opts.limit);
    }

    #[test]
    fn setter_round_trips_expiry_through_micros() {
        let mut opts = SetOptions::default();
        opts.expire_at = Timestamp::from_secs(42);
        let wire: WireSetter = (&opts).into();
        let back: SetOptions = wire.into();
        assert_eq!(back.expire_at, opts.expire_at);
    }

    #[test]
    fn wire_error_round_trips_variant_shape() {
        let err = CoreError::InvalidPairs(3);
        let wire: WireError = (&err).into();
        assert!(matches!(wire, WireError::InvalidPairs(3)));
        let back: CoreError = wire.into();
        assert!(matches!(back, CoreError::InvalidPairs(3)));
    }
}
