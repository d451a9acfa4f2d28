//! Raft membership: who votes, who receives replicated entries, and at which
//! log index that knowledge was last recorded.
//!
//! Replication members are always the union of voting members and the
//! additional members that are still catching up. The union is derived after
//! every mutation and cannot be set directly.

mod durable;
mod in_memory;

use std::collections::BTreeSet;
use std::io;

pub use durable::{DurableRaftMembershipState, MembershipRecord, MEMBERSHIP_STATE_NAME};
pub use in_memory::InMemoryRaftMembershipState;

use crate::identity::MemberId;

/// Callback fired after every membership mutation.
pub type MembershipListener = Box<dyn Fn() + Send + Sync>;

/// Handle returned by [`MembershipState::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Read and update access to the membership of the local Raft group.
///
/// Mutators are serialized. Listeners run synchronously on the mutating
/// thread once per mutating call, after the new sets are visible to readers.
pub trait MembershipState: Send + Sync {
    fn set_voting_members(&self, members: BTreeSet<MemberId>);

    fn add_additional_replication_member(&self, member: MemberId);

    fn remove_additional_replication_member(&self, member: &MemberId);

    /// Records the log index the current membership corresponds to.
    fn set_log_index(&self, log_index: i64) -> io::Result<()>;

    fn log_index(&self) -> i64;

    fn voting_members(&self) -> BTreeSet<MemberId>;

    fn replication_members(&self) -> BTreeSet<MemberId>;

    fn register_listener(&self, listener: MembershipListener) -> ListenerId;

    /// Returns `false` if the listener was not registered.
    fn deregister_listener(&self, id: ListenerId) -> bool;
}
