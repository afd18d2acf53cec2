//! Document Engine (C7): a MongoDB-backed implementation, using parent
//! pointers and an expiry index instead of a physical key scheme.
//!
//! Each document has exactly four fields: `_id` (the key), `v` (the value),
//! `pid` (`parent(key)`), `exp` (expire-at, or the sentinel). Two indices
//! make child enumeration and sweeping backend-native operations instead of
//! full scans: ascending on `pid`, descending on `exp`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bson::{doc, Bson, Document};
use mongodb::options::{
    CreateIndexOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
    UpdateOptions,
};
use mongodb::sync::{Client, Collection};
use mongodb::IndexModel;
use tracing::debug;

use stratakv_core::{bare, compose, is_bare, parent, DeleteOptions, Error, GetOptions, Node, Result, SetOptions, Timestamp};

use crate::engine::Engine;
use crate::sampler::LoadSampler;

/// `mongodb` (sync driver) backed document engine.
pub struct DocumentEngine {
    collection: Collection<Document>,
    separator: String,
    default_limit: i64,
    auto_clean: bool,
    debug: bool,
    sampler: Arc<LoadSampler>,
    closed: AtomicBool,
}

fn to_bson_timestamp(ts: Timestamp) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(ts.as_millis() as i64))
}

fn from_bson_timestamp(bson: &Bson) -> Timestamp {
    match bson {
        Bson::DateTime(dt) => Timestamp::from_millis(dt.timestamp_millis().max(0) as u64),
        _ => Timestamp::NEVER,
    }
}

impl DocumentEngine {
    /// Connect to `uri`, select `database.collection`, and ensure the
    /// required indices exist.
    pub fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        separator: impl Into<String>,
        default_limit: i64,
        auto_clean: bool,
        debug: bool,
        sampler: Arc<LoadSampler>,
    ) -> Result<Self> {
        let client = Client::with_uri_str(uri).map_err(Error::backend)?;
        let collection = client
            .database(database)
            .collection::<Document>(collection);
        collection
            .create_indexes(
                vec![
                    IndexModel::builder()
                        .keys(doc! { "exp": -1 })
                        .options(IndexOptions::builder().build())
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "pid": 1 })
                        .options(IndexOptions::builder().build())
                        .build(),
                ],
                CreateIndexOptions::builder().build(),
            )
            .map_err(Error::backend)?;
        Ok(DocumentEngine {
            collection,
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

    /// Log a query at debug level when the `debug` option is set (§4.2).
    fn log_query(&self, op: &str, filter: &Document) {
        if self.debug {
            debug!(op, filter = %filter, "executing MongoDB query");
        }
    }

    fn record_cost(&self, started: Instant) {
        if self.auto_clean {
            self.sampler.record(started.elapsed().as_micros() as i64);
        }
    }

    fn get_children(&self, key: &str, opts: &GetOptions, now: Timestamp) -> Result<BTreeMap<String, String>> {
        let cap = opts.effective_limit(self.default_limit);
        if cap == Some(0) {
            return Ok(BTreeMap::new());
        }
        let cursor_full = compose(&bare(&opts.start, &self.separator), key, &self.separator);
        let filter = doc! {
            "pid": key,
            "exp": { "$gt": to_bson_timestamp(now) },
            "_id": { "$gt": &cursor_full },
        };
        let mut find_opts = FindOptions::default();
        if let Some(limit) = cap {
            find_opts.limit = Some(limit);
        }
        find_opts.sort = Some(doc! { "_id": 1 });
        let cursor = self
            .collection
            .find(filter, find_opts)
            .map_err(Error::backend)?;
        let mut children = BTreeMap::new();
        for doc in cursor {
            let doc = doc.map_err(Error::backend)?;
            let id = doc.get_str("_id").unwrap_or_default().to_string();
            let v = doc.get_str("v").unwrap_or_default().to_string();
            children.insert(id, v);
        }
        Ok(children)
    }
}

impl Engine for DocumentEngine {
    fn get(&self, key: &str, opts: &GetOptions) -> Result<Option<Node>> {
        self.check_open()?;
        let started = Instant::now();
        let now = Timestamp::now();
        let filter = doc! { "_id": key, "exp": { "$gt": to_bson_timestamp(now) } };
        self.log_query("get", &filter);
        let found = self.collection.find_one(filter, None).map_err(Error::backend)?;
        let result = match found {
            None => Ok(None),
            Some(document) => {
                let value = document.get_str("v").unwrap_or_default().to_string();
                let mut node = Node::leaf(value);
                if opts.children {
                    node.children = Some(self.get_children(key, opts, now)?);
                }
                Ok(Some(node))
            }
        };
        self.record_cost(started);
        result
    }

    fn get_multi(&self, keys: &[String], opts: &GetOptions) -> Result<HashMap<String, Node>> {
        self.check_open()?;
        let started = Instant::now();
        let now = Timestamp::now();
        let filter = doc! {
            "_id": { "$in": keys },
            "exp": { "$gt": to_bson_timestamp(now) },
        };
        self.log_query("get_multi", &filter);
        let cursor = self.collection.find(filter, None).map_err(Error::backend)?;
        let cursor_is_bare = is_bare(&opts.start, &self.separator);
        let cursor_parent = parent(&opts.start, &self.separator);

        let mut result = HashMap::with_capacity(keys.len());
        for document in cursor {
            let document = document.map_err(Error::backend)?;
            let id = document.get_str("_id").unwrap_or_default().to_string();
            let value = document.get_str("v").unwrap_or_default().to_string();
            let mut node = Node::leaf(value);
            if opts.children && (cursor_is_bare || cursor_parent == id) {
                node.children = Some(self.get_children(&id, opts, now)?);
            }
            result.insert(id, node);
        }
        self.record_cost(started);
        Ok(result)
    }

    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<()> {
        self.check_open()?;
        let started = Instant::now();
        let expire_at = if opts.expire_at.is_sentinel() {
            Timestamp::NEVER
        } else {
            opts.expire_at
        };
        let update = doc! {
            "$set": {
                "v": value,
                "pid": parent(key, &self.separator),
                "exp": to_bson_timestamp(expire_at),
            }
        };
        self.log_query("set", &doc! { "_id": key });
        let result = self
            .collection
            .find_one_and_update(
                doc! { "_id": key },
                update,
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
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
        let expire_at = if opts.expire_at.is_sentinel() {
            Timestamp::NEVER
        } else {
            opts.expire_at
        };
        for chunk in pairs.chunks(2) {
            let key = &chunk[0];
            let value = &chunk[1];
            self.collection
                .update_one(
                    doc! { "_id": key },
                    doc! { "$set": {
                        "v": value,
                        "pid": parent(key, &self.separator),
                        "exp": to_bson_timestamp(expire_at),
                    }},
                    UpdateOptions::builder().upsert(true).build(),
                )
                .map_err(Error::backend)?;
        }
        self.record_cost(started);
        Ok(())
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<()> {
        self.check_open()?;
        let started = Instant::now();
        let filter = if opts.children {
            doc! { "$or": [ { "_id": key }, { "pid": key } ] }
        } else {
            doc! { "_id": key }
        };
        self.log_query("delete", &filter);
        let result = self
            .collection
            .delete_many(filter, None)
            .map(|_| ())
            .map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn delete_multi(&self, keys: &[String], opts: &DeleteOptions) -> Result<()> {
        self.check_open()?;
        if keys.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let filter = if opts.children {
            doc! { "$or": [
                { "_id": { "$in": keys } },
                { "pid": { "$in": keys } },
            ] }
        } else {
            doc! { "_id": { "$in": keys } }
        };
        self.log_query("delete_multi", &filter);
        let result = self
            .collection
            .delete_many(filter, None)
            .map(|_| ())
            .map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        let found = self
            .collection
            .find_one(doc! { "_id": key }, None)
            .map_err(Error::backend)?;
        Ok(found.is_some())
    }

    fn cleanup(&self) -> Result<()> {
        self.check_open()?;
        let now = Timestamp::now();
        let filter = doc! { "exp": { "$lte": to_bson_timestamp(now) } };
        self.log_query("cleanup", &filter);
        self.collection
            .delete_many(filter, None)
            .map(|_| ())
            .map_err(Error::backend)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bson_timestamp_round_trips_through_millis() {
        let ts = Timestamp::from_secs(1_700_000_000);
        let bson = to_bson_timestamp(ts);
        let back = from_bson_timestamp(&bson);
        assert_eq!(back.as_secs(), ts.as_secs());
    }
}
