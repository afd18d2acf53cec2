//! Remote access layer: the wire protocol (C10) and the self-healing
//! client (C11) that sit in front of the local [`stratakv_engine::Facade`].
//!
//! - [`protocol`]: the request/response message set and method catalogue.
//! - [`framing`]: length-prefixed message framing shared by server and
//!   client.
//! - [`server`]: the accept loop that serves requests against a façade.
//! - [`client`]: the bounded-retry, transparently-reconnecting caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use protocol::{Request, RequestFrame, Response, ResponseFrame, WireError, SERVICE_NAME};
pub use server::serve;
