use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::debug;

use super::{ListenerId, MembershipListener, MembershipState};
use crate::identity::MemberId;

#[derive(Debug, Default)]
struct Members {
    voting: BTreeSet<MemberId>,
    additional: BTreeSet<MemberId>,
    replication: BTreeSet<MemberId>,
    log_index: i64,
}

impl Members {
    fn recompute(&mut self) {
        self.replication = self.voting.union(&self.additional).copied().collect();
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    registered: BTreeMap<ListenerId, Arc<dyn Fn() + Send + Sync>>,
}

/// Membership kept only in memory.
///
/// Two locks are involved. `mutation` serializes whole mutating calls
/// including listener notification, and is re-entrant so a listener may read
/// state, mutate again or deregister itself. `members` guards the sets and is
/// never held while a listener runs.
pub struct InMemoryRaftMembershipState {
    mutation: ReentrantMutex<()>,
    members: Mutex<Members>,
    listeners: Mutex<Listeners>,
}

impl InMemoryRaftMembershipState {
    pub fn new() -> Self {
        Self::with_state(BTreeSet::new(), -1)
    }

    pub fn with_state(voting: BTreeSet<MemberId>, log_index: i64) -> Self {
        let mut members = Members {
            voting,
            log_index,
            ..Members::default()
        };
        members.recompute();
        Self {
            mutation: ReentrantMutex::new(()),
            members: Mutex::new(members),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    /// Applies `change`, recomputes the replication set and notifies listeners.
    fn mutate(&self, change: impl FnOnce(&mut Members)) {
        let _serial = self.mutation.lock();
        {
            let mut members = self.members.lock();
            change(&mut members);
            members.recompute();
            debug!(
                voting = members.voting.len(),
                replication = members.replication.len(),
                "membership changed"
            );
        }
        self.notify();
    }

    /// Records `log_index` once `persist` has accepted the voting set it
    /// belongs to. Runs under the mutation lock, so no other mutator can slip
    /// in between reading the voting set and recording the index.
    pub(super) fn set_log_index_with(
        &self,
        log_index: i64,
        persist: impl FnOnce(&BTreeSet<MemberId>) -> io::Result<()>,
    ) -> io::Result<()> {
        let _serial = self.mutation.lock();
        let voting = self.members.lock().voting.clone();
        persist(&voting)?;
        self.members.lock().log_index = log_index;
        Ok(())
    }

    fn notify(&self) {
        let listeners: Vec<_> = self.listeners.lock().registered.values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl Default for InMemoryRaftMembershipState {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipState for InMemoryRaftMembershipState {
    fn set_voting_members(&self, members: BTreeSet<MemberId>) {
        self.mutate(|state| state.voting = members);
    }

    fn add_additional_replication_member(&self, member: MemberId) {
        self.mutate(|state| {
            state.additional.insert(member);
        });
    }

    fn remove_additional_replication_member(&self, member: &MemberId) {
        self.mutate(|state| {
            state.additional.remove(member);
        });
    }

    fn set_log_index(&self, log_index: i64) -> io::Result<()> {
        self.set_log_index_with(log_index, |_| Ok(()))
    }

    fn log_index(&self) -> i64 {
        self.members.lock().log_index
    }

    fn voting_members(&self) -> BTreeSet<MemberId> {
        self.members.lock().voting.clone()
    }

    fn replication_members(&self) -> BTreeSet<MemberId> {
        self.members.lock().replication.clone()
    }

    fn register_listener(&self, listener: MembershipListener) -> ListenerId {
        let _serial = self.mutation.lock();
        let mut listeners = self.listeners.lock();
        let id = ListenerId::new(listeners.next_id);
        listeners.next_id += 1;
        listeners.registered.insert(id, Arc::from(listener));
        id
    }

    fn deregister_listener(&self, id: ListenerId) -> bool {
        // Waits out any notification in progress on another thread.
        let _serial = self.mutation.lock();
        self.listeners.lock().registered.remove(&id).is_some()
    }
}
