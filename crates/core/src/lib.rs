//! Core types shared by every engine, the wire protocol, and the client:
//! - [`key`]: dotted-path key algebra (C1)
//! - [`options`]: construction-time and per-call option records (C2)
//! - [`codec`]: binary node record layout (C5)
//! - [`error`]: the façade-wide error taxonomy
//! - [`Timestamp`]: microsecond-precision instants with a sentinel "never expires"

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod key;
pub mod model;
pub mod options;
mod timestamp;

pub use codec::{decode, encode, CodecError, NodeRecord};
pub use error::{Error, Result};
pub use key::{bare, compose, depth, is_bare, parent, parent_bare, validate_key, KeyError};
pub use model::Node;
pub use options::{DeleteOptions, GetOptions, Options, OptionsBuilder, SetOptions};
pub use timestamp::Timestamp;
