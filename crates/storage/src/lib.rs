//! Storage backends for the hierarchical key-value façade.
//!
//! - [`engine`]: the [`engine::Engine`] capability contract every backend implements (C9)
//! - [`engines`]: the three concrete backends — byte-ordered ([`engines::byteordered`]),
//!   document ([`engines::document`]), relational ([`engines::relational`]) (C6/C7/C8)
//! - [`sampler`]: the load sampler driving off-peak detection (C3)
//! - [`scheduler`]: the background cleanup scheduler (C4)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod engines;
pub mod sampler;
pub mod scheduler;

pub use engine::Engine;
pub use engines::byteordered::ByteOrderedEngine;
pub use engines::document::DocumentEngine;
pub use engines::relational::{Driver, RelationalEngine};
pub use sampler::LoadSampler;
pub use scheduler::{SchedulerConfig, ShutdownHandle};
