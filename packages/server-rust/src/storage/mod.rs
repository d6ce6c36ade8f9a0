//! Repository implementations.
//!
//! Production deployments plug a relational store in through
//! [`Repository`](crate::traits::Repository); this module ships the
//! in-memory one used by tests and the demo binary.

pub mod memory;

pub use memory::{MemoryRepository, RepositoryStats};
