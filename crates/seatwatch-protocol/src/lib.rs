//! seatwatch protocol - line protocol spoken with the tracking server
//!
//! This crate provides the outgoing command lines, the classification of
//! session-level server lines, and the ordered grammar that turns a task
//! report into a typed [`Report`].

pub mod error;
pub mod grammar;
pub mod message;
pub mod parse;
pub mod schedule;

pub use error::ProtocolError;
pub use grammar::{Grammar, Report};
pub use message::{Command, SessionMessage};
pub use parse::{FoundPayload, LostPayload, TrainDetails};
pub use schedule::{filter_departed, ScheduleEntry, StoredRow, StoredSchedule};
