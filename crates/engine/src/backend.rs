//! Backend selection: the factory that builds a concrete [`Engine`] from a
//! construction-time identifier (§9, "Polymorphism").
//!
//! Dispatch across backends is static and decided once, here, at
//! construction time. Nothing downstream of [`build`] ever match on which
//! backend it is talking to; everything flows through the `Engine` trait
//! object.

use std::path::PathBuf;
use std::sync::Arc;

use stratakv_core::Options;
use stratakv_storage::{ByteOrderedEngine, DocumentEngine, Driver, Engine, LoadSampler, RelationalEngine};

/// Construction-time choice of storage backend and its connection details.
///
/// Each variant carries exactly what its concrete engine needs to open;
/// `Options` (separator, default limit, auto-clean) is supplied separately
/// since it is shared by every backend.
#[derive(Debug, Clone)]
pub enum Backend {
    /// `sled`-backed byte-ordered engine (C6), persisted at `path`.
    ByteOrdered {
        /// Directory `sled` should open or create.
        path: PathBuf,
    },
    /// `sled`-backed byte-ordered engine, in-memory only. Useful for tests
    /// and short-lived caches.
    ByteOrderedTemporary,
    /// `mongodb`-backed document engine (C7).
    Document {
        /// Connection URI, e.g. `mongodb://localhost:27017`.
        uri: String,
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
    },
    /// SQL-backed relational engine (C8).
    Relational {
        /// Driver tag, parsed via [`Driver::parse`]. `InvalidDriver` if
        /// unrecognized.
        driver: String,
        /// Driver-specific connection string (a filesystem path for SQLite).
        dsn: String,
    },
    /// SQL-backed relational engine, in-memory only.
    RelationalInMemory,
}

/// Build the concrete engine named by `backend`, wiring in the shared
/// [`Options`] and a fresh [`LoadSampler`] for cost reporting (§2, "Control
/// flow").
pub fn build(backend: Backend, options: &Options, sampler: Arc<LoadSampler>) -> stratakv_core::Result<Arc<dyn Engine>> {
    let separator = options.separator().to_string();
    let default_limit = options.default_limit();
    let auto_clean = options.auto_clean();
    let debug = options.debug();

    let engine: Arc<dyn Engine> = match backend {
        Backend::ByteOrdered { path } => Arc::new(ByteOrderedEngine::open(
            path,
            separator,
            default_limit,
            auto_clean,
            debug,
            sampler,
        )?),
        Backend::ByteOrderedTemporary => Arc::new(ByteOrderedEngine::temporary(
            separator,
            default_limit,
            auto_clean,
            debug,
            sampler,
        )?),
        Backend::Document {
            uri,
            database,
            collection,
        } => Arc::new(DocumentEngine::connect(
            &uri,
            &database,
            &collection,
            separator,
            default_limit,
            auto_clean,
            debug,
            sampler,
        )?),
        Backend::Relational { driver, dsn } => {
            let driver = Driver::parse(&driver)?;
            Arc::new(RelationalEngine::open(
                driver,
                &dsn,
                separator,
                default_limit,
                auto_clean,
                debug,
                sampler,
            )?)
        }
        Backend::RelationalInMemory => Arc::new(RelationalEngine::in_memory(
            separator,
            default_limit,
            auto_clean,
            debug,
            sampler,
        )?),
    };
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_relational_driver_is_invalid_driver() {
        let options = Options::default();
        let sampler = Arc::new(LoadSampler::new());
        let err = build(
            Backend::Relational {
                driver: "oracle".to_string(),
                dsn: ":memory:".to_string(),
            },
            &options,
            sampler,
        )
        .unwrap_err();
        assert!(matches!(err, stratakv_core::Error::InvalidDriver(_)));
    }

    #[test]
    fn byte_ordered_temporary_builds_a_usable_engine() {
        let options = Options::default();
        let sampler = Arc::new(LoadSampler::new());
        let engine = build(Backend::ByteOrderedTemporary, &options, sampler).unwrap();
        engine
            .set("k", "v", &stratakv_core::SetOptions::default())
            .unwrap();
        assert!(engine.exists("k").unwrap());
    }
}
