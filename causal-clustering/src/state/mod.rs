//! Crash-safe storage for cluster state.
//!
//! - [`SimpleStorage`]: one value written whole, used for identities such as
//!   the cluster id and database name
//! - [`DurableStateStorage`]: two files used alternately as append logs of
//!   full state snapshots, recovered by picking the higher ordinal

mod durable;
mod simple;

pub use durable::{DurableState, DurableStateStorage};
pub use simple::{InMemorySimpleStorage, SimpleFileStorage, SimpleStorage};
