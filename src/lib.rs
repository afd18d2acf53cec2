//! # StrataKV
//!
//! A hierarchical key-value façade over byte-ordered, document, and
//! relational backends: dotted-path keys, per-record expiry, paginated
//! child listings, and a remote protocol with a self-healing client.
//!
//! ```no_run
//! use stratakv::{Backend, Facade, GetOptions, SetOptions};
//!
//! fn main() -> stratakv::Result<()> {
//!     let mut db = Facade::builder(Backend::ByteOrdered { path: "./data".into() }).build()?;
//!     db.set("group.g", "1", &SetOptions::default())?;
//!     db.set("group.g.child1", "2", &SetOptions::default())?;
//!     let node = db.get("group.g", &GetOptions::children())?.unwrap();
//!     assert_eq!(node.value, "1");
//!     db.close()?;
//!     Ok(())
//! }
//! ```
//!
//! Internal crates (`stratakv-storage`, the individual engines) are not
//! exposed directly; the façade and the remote client/server in this crate
//! are the stable surface.

pub use stratakv_core::{
    bare, compose, depth, is_bare, parent, parent_bare, validate_key, DeleteOptions, Error,
    GetOptions, KeyError, Node, Options, OptionsBuilder, Result, SetOptions, Timestamp,
};
pub use stratakv_engine::{Backend, Facade, FacadeBuilder};

pub use stratakv_api::{serve, Client, Request, RequestFrame, Response, ResponseFrame, WireError, SERVICE_NAME};
