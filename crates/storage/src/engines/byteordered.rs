//! Byte-Ordered Engine (C6): a `sled`-backed implementation of the capability
//! contract that makes child enumeration a plain range scan instead of a
//! secondary index.
//!
//! ## Physical key encoding
//!
//! Every logical key `K` lives at the physical key `node:<depth>:<K>`, where
//! `depth` is `K`'s segment count. All direct children of `K` therefore share
//! the contiguous prefix `node:<depth(K)+1>:<K><sep>`, while deeper
//! descendants land in a different numeric bucket entirely and are excluded
//! from a child-level scan without any filtering.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use stratakv_core::{bare, depth, is_bare, parent, DeleteOptions, Error, GetOptions, Node, NodeRecord, Result, SetOptions, Timestamp};

use crate::engine::Engine;
use crate::sampler::LoadSampler;

/// `sled`-backed byte-ordered engine.
pub struct ByteOrderedEngine {
    db: sled::Db,
    separator: String,
    default_limit: i64,
    auto_clean: bool,
    debug: bool,
    sampler: Arc<LoadSampler>,
    closed: AtomicBool,
}

impl ByteOrderedEngine {
    /// Open (creating if absent) a `sled` database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        separator: impl Into<String>,
        default_limit: i64,
        auto_clean: bool,
        debug: bool,
        sampler: Arc<LoadSampler>,
    ) -> Result<Self> {
        let db = sled::open(path).map_err(Error::backend)?;
        Ok(ByteOrderedEngine {
            db,
            separator: separator.into(),
            default_limit,
            auto_clean,
            debug,
            sampler,
            closed: AtomicBool::new(false),
        })
    }

    /// In-memory variant, useful for tests and the `cache` construction mode.
    pub fn temporary(
        separator: impl Into<String>,
        default_limit: i64,
        auto_clean: bool,
        debug: bool,
        sampler: Arc<LoadSampler>,
    ) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(Error::backend)?;
        Ok(ByteOrderedEngine {
            db,
            separator: separator.into(),
            default_limit,
            auto_clean,
            debug,
            sampler,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    /// Log an operation at debug level when the `debug` option is set
    /// (§4.2); the byte-ordered analogue of the relational backend's
    /// verbose statement log.
    fn log_op(&self, op: &str, key: &str) {
        if self.debug {
            debug!(op, key, "byte-ordered engine operation");
        }
    }

    fn record_cost(&self, started: Instant) {
        if self.auto_clean {
            self.sampler.record(started.elapsed().as_micros() as i64);
        }
    }

    fn physical_key(&self, key: &str) -> Vec<u8> {
        physical_key(key, &self.separator)
    }

    /// Decode a raw record; if it is logically expired, queue its physical
    /// key for deferred deletion and report it as absent.
    fn retrieve(
        &self,
        physical: &[u8],
        raw: &[u8],
        now: Timestamp,
        deferred: &mut Vec<Vec<u8>>,
    ) -> Result<Option<String>> {
        let record = stratakv_core::decode(raw)?;
        if record.is_expired(now) {
            deferred.push(physical.to_vec());
            return Ok(None);
        }
        Ok(Some(record.value))
    }

    fn get_one(
        &self,
        key: &str,
        opts: &GetOptions,
        deferred: &mut Vec<Vec<u8>>,
    ) -> Result<Option<Node>> {
        let physical = self.physical_key(key);
        let raw = match self.db.get(&physical).map_err(Error::backend)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let now = Timestamp::now();
        let value = match self.retrieve(&physical, &raw, now, deferred)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let mut node = Node::leaf(value);
        if opts.children {
            node.children = Some(self.collect_children(key, opts, now, deferred)?);
        }
        Ok(Some(node))
    }

    fn collect_children(
        &self,
        key: &str,
        opts: &GetOptions,
        now: Timestamp,
        deferred: &mut Vec<Vec<u8>>,
    ) -> Result<BTreeMap<String, String>> {
        let mut children = BTreeMap::new();
        let cap = opts.effective_limit(self.default_limit);
        if cap == Some(0) {
            return Ok(children);
        }
        let cursor_bare = bare(&opts.start, &self.separator);
        let range = match children_range(key, &cursor_bare, &self.separator) {
            Some(range) => range,
            None => return Ok(children),
        };
        for item in self.db.range(range.0..range.1) {
            let (physical, raw) = item.map_err(Error::backend)?;
            let full_key = unmask(&physical);
            if let Some(value) = self.retrieve(&physical, &raw, now, deferred)? {
                children.insert(full_key, value);
                if let Some(limit) = cap {
                    if children.len() as i64 >= limit {
                        break;
                    }
                }
            }
        }
        Ok(children)
    }

    fn spawn_deferred_delete(&self, deferred: Vec<Vec<u8>>) {
        if deferred.is_empty() {
            return;
        }
        let db = self.db.clone();
        std::thread::spawn(move || {
            let mut batch = sled::Batch::default();
            for key in &deferred {
                batch.remove(key.as_slice());
            }
            if let Err(err) = db.apply_batch(batch) {
                warn!(error = %err, "deferred lazy-deletion batch failed");
            }
        });
    }
}

impl Engine for ByteOrderedEngine {
    fn get(&self, key: &str, opts: &GetOptions) -> Result<Option<Node>> {
        self.check_open()?;
        self.log_op("get", key);
        let started = Instant::now();
        let mut deferred = Vec::new();
        let result = self.get_one(key, opts, &mut deferred);
        self.spawn_deferred_delete(deferred);
        self.record_cost(started);
        result
    }

    fn get_multi(&self, keys: &[String], opts: &GetOptions) -> Result<HashMap<String, Node>> {
        self.check_open()?;
        let started = Instant::now();
        let mut deferred = Vec::new();
        let cursor_is_bare = is_bare(&opts.start, &self.separator);
        let cursor_parent = parent(&opts.start, &self.separator);

        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            let mut single_opts = opts.clone();
            single_opts.children = opts.children && (cursor_is_bare || cursor_parent == *key);
            match self.get_one(key, &single_opts, &mut deferred) {
                Ok(Some(node)) => {
                    result.insert(key.clone(), node);
                }
                Ok(None) => {}
                Err(err) => {
                    self.spawn_deferred_delete(deferred);
                    self.record_cost(started);
                    return Err(err);
                }
            }
        }
        self.spawn_deferred_delete(deferred);
        self.record_cost(started);
        Ok(result)
    }

    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<()> {
        self.check_open()?;
        self.log_op("set", key);
        let started = Instant::now();
        let record = NodeRecord::new(value, opts.expire_at);
        let bytes = stratakv_core::encode(&record)?;
        let result = self
            .db
            .insert(self.physical_key(key), bytes)
            .map(|_| ())
            .map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn set_multi(&self, pairs: &[String], opts: &SetOptions) -> Result<()> {
        self.check_open()?;
        if pairs.len() % 2 != 0 {
            return Err(Error::InvalidPairs(pairs.len()));
        }
        let started = Instant::now();
        let mut batch = sled::Batch::default();
        for chunk in pairs.chunks(2) {
            let record = NodeRecord::new(chunk[1].as_str(), opts.expire_at);
            let bytes = stratakv_core::encode(&record)?;
            batch.insert(self.physical_key(&chunk[0]), bytes);
        }
        let result = self.db.apply_batch(batch).map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<()> {
        self.check_open()?;
        self.log_op("delete", key);
        let started = Instant::now();
        let mut batch = sled::Batch::default();
        batch.remove(self.physical_key(key));
        if opts.children {
            if let Some(range) = children_range(key, "", &self.separator) {
                for item in self.db.range(range.0..range.1) {
                    let (physical, _) = item.map_err(Error::backend)?;
                    batch.remove(physical);
                }
            }
        }
        let result = self.db.apply_batch(batch).map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn delete_multi(&self, keys: &[String], opts: &DeleteOptions) -> Result<()> {
        self.check_open()?;
        if keys.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(self.physical_key(key));
            if opts.children {
                if let Some(range) = children_range(key, "", &self.separator) {
                    for item in self.db.range(range.0..range.1) {
                        let (physical, _) = item.map_err(Error::backend)?;
                        batch.remove(physical);
                    }
                }
            }
        }
        let result = self.db.apply_batch(batch).map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        // Tests physical presence only: an expired-but-unswept node still
        // answers true here. See the crate docs for the rationale.
        self.db
            .contains_key(self.physical_key(key))
            .map_err(Error::backend)
    }

    fn cleanup(&self) -> Result<()> {
        self.check_open()?;
        self.log_op("cleanup", "*");
        let now = Timestamp::now();
        let mut batch = sled::Batch::default();
        for item in self.db.iter() {
            let (physical, raw) = item.map_err(Error::backend)?;
            let record = stratakv_core::decode(&raw)?;
            if record.is_expired(now) {
                batch.remove(physical);
            }
        }
        self.db.apply_batch(batch).map_err(Error::backend)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        self.db.flush().map_err(Error::backend)?;
        Ok(())
    }
}

fn physical_key(key: &str, separator: &str) -> Vec<u8> {
    format!("node:{}:{}", depth(key, separator), key).into_bytes()
}

/// Recover the logical key from a physical key of the form `node:<depth>:<key>`.
fn unmask(physical: &[u8]) -> String {
    let text = String::from_utf8_lossy(physical);
    match text.splitn(3, ':').nth(2) {
        Some(key) => key.to_string(),
        None => text.into_owned(),
    }
}

/// Increment the last byte below `0xFF`, truncating and propagating
/// right-to-left when trailing bytes are already `0xFF`. `None` iff every
/// byte is `0xFF` (there is no successor).
fn lex_next(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    for i in (0..out.len()).rev() {
        if out[i] < 0xFF {
            out[i] += 1;
            out.truncate(i + 1);
            return Some(out);
        }
    }
    None
}

/// Compute the `[start, limit)` physical-key range covering the direct
/// children of `parent_key`, strictly after `cursor_bare` (empty meaning
/// "from the beginning"). `None` iff the range is empty.
fn children_range(parent_key: &str, cursor_bare: &str, separator: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let child_depth = depth(parent_key, separator) + 1;
    let prefix = format!("node:{}:", child_depth);

    let mut start = prefix.clone().into_bytes();
    start.extend_from_slice(parent_key.as_bytes());
    start.extend_from_slice(separator.as_bytes());
    if !cursor_bare.is_empty() {
        start.extend_from_slice(&lex_next(cursor_bare.as_bytes())?);
    }

    let parent_next = lex_next(parent_key.as_bytes())?;
    let mut limit = prefix.into_bytes();
    limit.extend_from_slice(&parent_next);
    limit.extend_from_slice(separator.as_bytes());

    Some((start, limit))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use stratakv_core::{GetOptions, SetOptions};

    /// Pagination monotone (§8): walking child pages with the cursor set to
    /// the previous page's last key visits the entire child set exactly
    /// once, in ascending order, with no duplication and no gaps, whatever
    /// the page size and however many distinct children there are.
    proptest! {
        #[test]
        fn pagination_walks_every_child_exactly_once(
            count in 1usize..30,
            page_size in 1i64..8,
        ) {
            let engine = ByteOrderedEngine::temporary(".", 10, false, false, Arc::new(LoadSampler::new())).unwrap();
            engine.set("root", "v", &SetOptions::default()).unwrap();
            let mut expected: Vec<String> = Vec::new();
            for i in 0..count {
                let child = format!("root.c{i:03}");
                engine.set(&child, &i.to_string(), &SetOptions::default()).unwrap();
                expected.push(child);
            }
            expected.sort();

            let mut visited: Vec<String> = Vec::new();
            let mut cursor = String::new();
            loop {
                let opts = GetOptions {
                    children: true,
                    start: cursor.clone(),
                    limit: page_size,
                };
                let node = engine.get("root", &opts).unwrap().unwrap();
                let page = node.children.unwrap();
                if page.is_empty() {
                    break;
                }
                for key in page.keys() {
                    visited.push(key.clone());
                }
                cursor = page.keys().last().unwrap().clone();
                if (page.len() as i64) < page_size {
                    break;
                }
            }
            prop_assert_eq!(visited, expected);
        }
    }
}
