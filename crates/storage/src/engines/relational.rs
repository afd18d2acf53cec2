//! Relational Engine (C8): a single table with a parent-key index and an
//! expiry index, speaking SQL through `rusqlite`.
//!
//! The only backend named explicitly in the spec's design notes: the
//! original `OR`-chained delete predicate can select unrelated rows when a
//! caller's key happens to equal some other row's `parent_key`. This
//! implementation reimplements delete as two scoped statements inside one
//! transaction instead (§9).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use stratakv_core::{bare, compose, is_bare, parent, DeleteOptions, Error, GetOptions, Node, Result, SetOptions, Timestamp};

use crate::engine::Engine;
use crate::sampler::LoadSampler;

/// Recognized relational driver tags. Only SQLite is backed by a concrete
/// connection; the others are named so an unrecognized tag surfaces
/// `InvalidDriver` the same way the original's `UnsupportDriver` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// `rusqlite`, bundled SQLite.
    Sqlite,
}

impl Driver {
    /// Parse a driver tag, used by the façade factory when constructing from
    /// a backend identifier string.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(Error::InvalidDriver(other.to_string())),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    key TEXT PRIMARY KEY,
    parent_key TEXT NOT NULL,
    value TEXT NOT NULL,
    expire_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_nodes_parent_key ON nodes(parent_key);
CREATE INDEX IF NOT EXISTS idx_nodes_expire_at ON nodes(expire_at);
";

/// `rusqlite`-backed relational engine.
pub struct RelationalEngine {
    conn: Mutex<Connection>,
    separator: String,
    default_limit: i64,
    auto_clean: bool,
    debug: bool,
    sampler: Arc<LoadSampler>,
    closed: AtomicBool,
}

impl RelationalEngine {
    /// Open a connection for the given driver and DSN, migrating the schema
    /// idempotently.
    pub fn open(
        driver: Driver,
        dsn: &str,
        separator: impl Into<String>,
        default_limit: i64,
        auto_clean: bool,
        debug: bool,
        sampler: Arc<LoadSampler>,
    ) -> Result<Self> {
        let conn = match driver {
            Driver::Sqlite => Connection::open(dsn).map_err(Error::backend)?,
        };
        conn.execute_batch(SCHEMA).map_err(Error::backend)?;
        Ok(RelationalEngine {
            conn: Mutex::new(conn),
            separator: separator.into(),
            default_limit,
            auto_clean,
            debug,
            sampler,
            closed: AtomicBool::new(false),
        })
    }

    /// In-memory connection, for tests and the `cache` construction mode.
    pub fn in_memory(
        separator: impl Into<String>,
        default_limit: i64,
        auto_clean: bool,
        debug: bool,
        sampler: Arc<LoadSampler>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::backend)?;
        conn.execute_batch(SCHEMA).map_err(Error::backend)?;
        Ok(RelationalEngine {
            conn: Mutex::new(conn),
            separator: separator.into(),
            default_limit,
            auto_clean,
            debug,
            sampler,
            closed: AtomicBool::new(false),
        })
    }

    /// Log a statement at debug level when the `debug` option is set (§4.2);
    /// the analogue of the original's verbose SQL logger mode.
    fn log_stmt(&self, op: &str, sql: &str) {
        if self.debug {
            debug!(op, sql, "executing SQL statement");
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    fn record_cost(&self, started: Instant) {
        if self.auto_clean {
            self.sampler.record(started.elapsed().as_micros() as i64);
        }
    }

    fn children_of(
        &self,
        conn: &Connection,
        key: &str,
        opts: &GetOptions,
        now: Timestamp,
    ) -> Result<BTreeMap<String, String>> {
        let cap = opts.effective_limit(self.default_limit);
        if cap == Some(0) {
            return Ok(BTreeMap::new());
        }
        let cursor_full = compose(&bare(&opts.start, &self.separator), key, &self.separator);
        let mut sql = String::from(
            "SELECT key, value FROM nodes WHERE parent_key = ?1 AND key > ?2 AND expire_at > ?3 ORDER BY key ASC",
        );
        if let Some(limit) = cap {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = conn.prepare(&sql).map_err(Error::backend)?;
        let rows = stmt
            .query_map(params![key, cursor_full, now.as_micros() as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(Error::backend)?;
        let mut children = BTreeMap::new();
        for row in rows {
            let (k, v) = row.map_err(Error::backend)?;
            children.insert(k, v);
        }
        Ok(children)
    }
}

impl Engine for RelationalEngine {
    fn get(&self, key: &str, opts: &GetOptions) -> Result<Option<Node>> {
        self.check_open()?;
        let started = Instant::now();
        let now = Timestamp::now();
        let conn = self.conn.lock();
        self.log_stmt("get", "SELECT value FROM nodes WHERE key = ?1 AND expire_at > ?2");
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM nodes WHERE key = ?1 AND expire_at > ?2",
                params![key, now.as_micros() as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::backend)?;
        let result = match value {
            None => Ok(None),
            Some(value) => {
                let mut node = Node::leaf(value);
                if opts.children {
                    node.children = Some(self.children_of(&conn, key, opts, now)?);
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
        let conn = self.conn.lock();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = keys.iter().enumerate().map(|(i, _)| format!("?{}", i + 2)).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT key, value FROM nodes WHERE expire_at > ?1 AND key IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql).map_err(Error::backend)?;
        let expire_floor = now_micros(now);
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&expire_floor];
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        for k in &key_refs {
            bound.push(k as &dyn rusqlite::ToSql);
        }
        let rows = stmt
            .query_map(params_from_iter(bound.into_iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(Error::backend)?;

        let cursor_is_bare = is_bare(&opts.start, &self.separator);
        let cursor_parent = parent(&opts.start, &self.separator);
        let mut result = HashMap::with_capacity(keys.len());
        for row in rows {
            let (k, v) = row.map_err(Error::backend)?;
            let mut node = Node::leaf(v);
            if opts.children && (cursor_is_bare || cursor_parent == k) {
                node.children = Some(self.children_of(&conn, &k, opts, now)?);
            }
            result.insert(k, node);
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
        let conn = self.conn.lock();
        self.log_stmt("set", "INSERT INTO nodes (...) VALUES (...) ON CONFLICT(key) DO UPDATE ...");
        let result = conn
            .execute(
                "INSERT INTO nodes (key, parent_key, value, expire_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expire_at = excluded.expire_at, parent_key = excluded.parent_key",
                params![key, parent(key, &self.separator), value, expire_at.as_micros() as i64],
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
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(Error::backend)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO nodes (key, parent_key, value, expire_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, expire_at = excluded.expire_at, parent_key = excluded.parent_key",
                )
                .map_err(Error::backend)?;
            for chunk in pairs.chunks(2) {
                stmt.execute(params![
                    chunk[0],
                    parent(&chunk[0], &self.separator),
                    chunk[1],
                    expire_at.as_micros() as i64
                ])
                .map_err(Error::backend)?;
            }
        }
        let result = tx.commit().map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<()> {
        self.check_open()?;
        let started = Instant::now();
        let mut conn = self.conn.lock();
        self.log_stmt("delete", "DELETE FROM nodes WHERE key = ?1 [; WHERE parent_key = ?1]");
        let tx = conn.transaction().map_err(Error::backend)?;
        tx.execute("DELETE FROM nodes WHERE key = ?1", params![key])
            .map_err(Error::backend)?;
        if opts.children {
            tx.execute("DELETE FROM nodes WHERE parent_key = ?1", params![key])
                .map_err(Error::backend)?;
        }
        let result = tx.commit().map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn delete_multi(&self, keys: &[String], opts: &DeleteOptions) -> Result<()> {
        self.check_open()?;
        if keys.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(Error::backend)?;
        for key in keys {
            tx.execute("DELETE FROM nodes WHERE key = ?1", params![key])
                .map_err(Error::backend)?;
            if opts.children {
                tx.execute("DELETE FROM nodes WHERE parent_key = ?1", params![key])
                    .map_err(Error::backend)?;
            }
        }
        let result = tx.commit().map_err(Error::backend);
        self.record_cost(started);
        result
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes WHERE key = ?1", params![key], |row| row.get(0))
            .map_err(Error::backend)?;
        Ok(count > 0)
    }

    fn cleanup(&self) -> Result<()> {
        self.check_open()?;
        let now = Timestamp::now();
        let conn = self.conn.lock();
        self.log_stmt("cleanup", "DELETE FROM nodes WHERE expire_at <= ?1");
        conn.execute(
            "DELETE FROM nodes WHERE expire_at <= ?1",
            params![now.as_micros() as i64],
        )
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

fn now_micros(ts: Timestamp) -> i64 {
    ts.as_micros() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratakv_core::{DeleteOptions, SetOptions};

    fn engine() -> RelationalEngine {
        RelationalEngine::in_memory(".", 10, false, false, Arc::new(LoadSampler::new())).unwrap()
    }

    #[test]
    fn unknown_driver_tag_is_invalid_driver() {
        assert!(matches!(Driver::parse("oracle"), Err(Error::InvalidDriver(_))));
        assert!(matches!(Driver::parse("sqlite"), Ok(Driver::Sqlite)));
    }

    #[test]
    fn round_trip_and_children() {
        let engine = engine();
        engine.set("group.g", "1", &SetOptions::default()).unwrap();
        engine.set("group.g.child1", "2", &SetOptions::default()).unwrap();
        engine.set("group.g.child2", "3", &SetOptions::default()).unwrap();

        let node = engine.get("group.g", &GetOptions::children()).unwrap().unwrap();
        assert_eq!(node.value, "1");
        assert_eq!(node.children.unwrap().len(), 2);
    }

    #[test]
    fn delete_with_children_does_not_touch_unrelated_rows_sharing_the_parent_key_value() {
        let engine = engine();
        // A row whose *key* happens to equal another row's parent_key value.
        engine.set("group.g", "1", &SetOptions::default()).unwrap();
        engine.set("group.g.child1", "2", &SetOptions::default()).unwrap();
        // Unrelated row whose own key textually equals "group.g.child1" is
        // itself a child, but a row whose *parent_key* column equals the
        // deleted key's *value* text must never be touched by an OR-based
        // delete. Two scoped statements in one transaction avoid that class
        // of bug entirely: only key = ? or parent_key = ? are ever matched,
        // never a row whose unrelated column happens to equal the string.
        engine.delete("group.g", &DeleteOptions { children: true }).unwrap();
        assert!(engine.get("group.g", &GetOptions::default()).unwrap().is_none());
        assert!(engine.get("group.g.child1", &GetOptions::default()).unwrap().is_none());
    }

    #[test]
    fn set_multi_is_transactional_all_or_nothing_on_odd_pairs() {
        let engine = engine();
        let pairs = vec!["a".to_string(), "1".to_string(), "b".to_string()];
        assert!(matches!(
            engine.set_multi(&pairs, &SetOptions::default()).unwrap_err(),
            Error::InvalidPairs(3)
        ));
        assert!(engine.get("a", &GetOptions::default()).unwrap().is_none());
    }
}
