//! Bounded containers for recently appended Raft log entries.
//!
//! None of these types are synchronized. The log append path is the single
//! writer; anyone else reading must coordinate with it externally.
//!
//! - [`CircularBuffer`]: fixed capacity FIFO window, overwrites the oldest
//! - [`ConsecutiveCache`]: window addressed by consecutive log index
//! - [`ConsecutiveInFlightCache`]: index-keyed cache bounded by entry count
//!   and total marshalled bytes

mod circular;
mod consecutive;
mod in_flight;

pub use circular::CircularBuffer;
pub use consecutive::ConsecutiveCache;
pub use in_flight::{
    ConsecutiveInFlightCache, EntrySize, InFlightCacheMonitor, NoopInFlightCacheMonitor,
};
