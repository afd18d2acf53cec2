//! Concrete backends implementing the [`crate::engine::Engine`] contract.

pub mod byteordered;
pub mod document;
pub mod relational;
