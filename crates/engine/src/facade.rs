//! Façade Interface (C9): the unified capability surface over a concrete
//! backend, with the cleanup scheduler wired in when auto-clean is enabled.
//!
//! A [`Facade`] owns exactly one [`Engine`] trait object (picked by
//! [`crate::backend::build`]) plus the background scheduler that drives it.
//! Every method here is a thin pass-through to the engine; the interesting
//! logic already lives in C1-C8.

use std::sync::Arc;
use std::time::Duration;

use stratakv_core::{DeleteOptions, GetOptions, Node, Options, Result, SetOptions};
use stratakv_storage::{Engine, LoadSampler, SchedulerConfig, ShutdownHandle};
use std::collections::HashMap;
use std::thread::JoinHandle;

use crate::backend::Backend;

/// A hierarchical key-value façade bound to one storage backend.
///
/// Constructed via [`FacadeBuilder`]. Implements every operation in §4.9
/// by delegating to the underlying [`Engine`]; the only logic it adds is
/// owning and shutting down the background cleanup scheduler.
pub struct Facade {
    engine: Arc<dyn Engine>,
    scheduler: Option<(ShutdownHandle, JoinHandle<()>)>,
}

impl Facade {
    /// Start building a façade over `backend`.
    pub fn builder(backend: Backend) -> FacadeBuilder {
        FacadeBuilder {
            backend,
            options: Options::default(),
            scheduler_config: SchedulerConfig::default(),
        }
    }

    /// Fetch a single node, optionally with a page of its children.
    pub fn get(&self, key: &str, opts: &GetOptions) -> Result<Option<Node>> {
        self.engine.get(key, opts)
    }

    /// Fetch several nodes in one call, omitting absent keys from the map.
    pub fn get_multi(&self, keys: &[String], opts: &GetOptions) -> Result<HashMap<String, Node>> {
        self.engine.get_multi(keys, opts)
    }

    /// Create or replace a single node.
    pub fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<()> {
        self.engine.set(key, value, opts)
    }

    /// Create or replace many nodes atomically. `pairs` is a flat
    /// `[k0, v0, k1, v1, ...]` sequence.
    pub fn set_multi(&self, pairs: &[String], opts: &SetOptions) -> Result<()> {
        self.engine.set_multi(pairs, opts)
    }

    /// Delete a single key. A nonexistent key is success.
    pub fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<()> {
        self.engine.delete(key, opts)
    }

    /// Delete several keys in one call. An empty list is a no-op.
    pub fn delete_multi(&self, keys: &[String], opts: &DeleteOptions) -> Result<()> {
        self.engine.delete_multi(keys, opts)
    }

    /// Test for presence (see the backend's own docs for the logical-vs-
    /// physical presence distinction: §9 open question).
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.engine.exists(key)
    }

    /// Force a full, synchronous sweep of expired nodes.
    pub fn cleanup(&self) -> Result<()> {
        self.engine.cleanup()
    }

    /// Release resources: stop the background scheduler (if any) and close
    /// the underlying engine. Idempotent on the first call; every call
    /// after the first returns `AlreadyClosed`, mirroring the engine.
    pub fn close(&mut self) -> Result<()> {
        if let Some((shutdown, handle)) = self.scheduler.take() {
            shutdown.shutdown();
            let _ = handle.join();
        }
        self.engine.close()
    }
}

/// Builder for [`Facade`]: picks a backend, customizes [`Options`] and the
/// scheduler cadence, then opens everything in one shot.
pub struct FacadeBuilder {
    backend: Backend,
    options: Options,
    scheduler_config: SchedulerConfig,
}

impl FacadeBuilder {
    /// Override the construction-time option set (separator, default
    /// limit, auto-clean, debug).
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Override the scheduler's cycle length.
    pub fn scheduler_cycle(mut self, cycle: Duration) -> Self {
        self.scheduler_config.cycle = cycle;
        self
    }

    /// Override the scheduler's off-peak period (minimum ticks between
    /// sweeps).
    pub fn scheduler_period(mut self, period: u32) -> Self {
        self.scheduler_config.period = period;
        self
    }

    /// Open the backend and, if `options.auto_clean()` is set, start the
    /// background cleanup scheduler.
    pub fn build(self) -> Result<Facade> {
        let sampler = Arc::new(LoadSampler::new());
        let engine = crate::backend::build(self.backend, &self.options, Arc::clone(&sampler))?;

        let scheduler = if self.options.auto_clean() {
            let cleanup_engine = Arc::clone(&engine);
            let (handle, shutdown) = stratakv_storage::scheduler::start(
                self.scheduler_config,
                sampler,
                move || cleanup_engine.cleanup(),
            );
            Some((shutdown, handle))
        } else {
            None
        };

        Ok(Facade { engine, scheduler })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratakv_core::{DeleteOptions, GetOptions, SetOptions};

    #[test]
    fn round_trip_through_the_facade() {
        let mut facade = Facade::builder(Backend::ByteOrderedTemporary).build().unwrap();
        facade.set("group.g", "1", &SetOptions::default()).unwrap();
        facade
            .set("group.g.child1", "2", &SetOptions::default())
            .unwrap();
        let node = facade.get("group.g", &GetOptions::children()).unwrap().unwrap();
        assert_eq!(node.value, "1");
        assert_eq!(node.children.unwrap()["group.g.child1"], "2");
        facade.close().unwrap();
    }

    #[test]
    fn close_is_idempotent_once_then_fails() {
        let mut facade = Facade::builder(Backend::ByteOrderedTemporary).build().unwrap();
        assert!(facade.close().is_ok());
        assert!(matches!(
            facade.close().unwrap_err(),
            stratakv_core::Error::AlreadyClosed
        ));
    }

    #[test]
    fn cascade_delete_leaves_grandchildren() {
        let facade = Facade::builder(Backend::ByteOrderedTemporary).build().unwrap();
        facade.set("k", "v", &SetOptions::default()).unwrap();
        facade.set("k.c", "v1", &SetOptions::default()).unwrap();
        facade.set("k.c.g", "v2", &SetOptions::default()).unwrap();
        facade
            .delete("k", &DeleteOptions { children: true })
            .unwrap();
        assert!(facade.get("k", &GetOptions::default()).unwrap().is_none());
        assert!(facade.get("k.c", &GetOptions::default()).unwrap().is_none());
        assert_eq!(
            facade.get("k.c.g", &GetOptions::default()).unwrap().unwrap().value,
            "v2"
        );
    }

    #[test]
    fn auto_clean_starts_and_stops_a_scheduler() {
        let options = Options::builder().auto_clean(true).build();
        let mut facade = Facade::builder(Backend::ByteOrderedTemporary)
            .options(options)
            .scheduler_cycle(Duration::from_millis(10))
            .build()
            .unwrap();
        assert!(facade.scheduler.is_some());
        facade.close().unwrap();
    }
}
