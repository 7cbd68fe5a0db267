//! seatwatch core - shared domain types for seat tracking
//!
//! This crate provides the identity and state types shared between
//! the protocol layer and the tracking client:
//! - canonical key encoding (`key`)
//! - the watcher state machine (`watcher`)
//! - task status codes (`status`)
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod key;
pub mod status;
pub mod watcher;

// Re-exports for convenience
pub use error::{KeyError, KeyResult};
pub use key::{decode, encode, TaskIdentity, TaskKey, TaskKind, TrainKey, WatcherKey};
pub use status::TaskStatus;
pub use watcher::{Watcher, WatcherSpec, WatcherStatus, ANY_SEAT};
