//! Façade Interface (C9): the capability contract every storage engine
//! implements. One concrete type per backend ([`crate::engines::byteordered`],
//! [`crate::engines::document`], [`crate::engines::relational`]); dispatch
//! across them is static, decided once at construction time by the factory
//! in `stratakv-engine`.

use std::collections::HashMap;
use stratakv_core::{DeleteOptions, GetOptions, Node, Result, SetOptions};

/// The operation surface shared by every backend.
///
/// Object-safe by construction: the remote protocol and the self-healing
/// client both hold this behind a `dyn` reference.
pub trait Engine: Send + Sync {
    /// Fetch a single node, optionally with a page of its children.
    fn get(&self, key: &str, opts: &GetOptions) -> Result<Option<Node>>;

    /// Fetch several nodes in one call, omitting absent keys from the map.
    fn get_multi(&self, keys: &[String], opts: &GetOptions) -> Result<HashMap<String, Node>>;

    /// Create or replace a single node.
    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<()>;

    /// Create or replace many nodes atomically. `pairs` is a flat
    /// `[k0, v0, k1, v1, ...]` sequence; an odd length is `InvalidPairs`.
    fn set_multi(&self, pairs: &[String], opts: &SetOptions) -> Result<()>;

    /// Delete a single key. A nonexistent key is success.
    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<()>;

    /// Delete several keys in one call. An empty list is a no-op.
    fn delete_multi(&self, keys: &[String], opts: &DeleteOptions) -> Result<()>;

    /// Test for presence. See the crate-level docs for the logical-vs-physical
    /// presence distinction this implements for the byte-ordered engine.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Force a full, synchronous sweep of expired nodes.
    fn cleanup(&self) -> Result<()>;

    /// Release resources. Idempotent on the first call; every call after the
    /// first returns `AlreadyClosed`.
    fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn Engine) {}
    }
}
