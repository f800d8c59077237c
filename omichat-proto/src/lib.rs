//! Wire and snapshot definitions for the OMI Chat message store.

pub mod api;
pub mod message;
pub mod snapshot;
