use std::collections::BTreeSet;
use std::io::{self, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::info;

use super::{InMemoryRaftMembershipState, ListenerId, MembershipListener, MembershipState};
use crate::config::ClusterConfig;
use crate::identity::MemberId;
use crate::marshal::{self, Marshal};
use crate::state::{DurableState, DurableStateStorage};

/// Base file name of the membership log; the two slots are `.a` and `.b`.
pub const MEMBERSHIP_STATE_NAME: &str = "membership.state";

/// Upper bound on the member count of a decoded record.
const MAX_MEMBERS: i32 = 1 << 16;

/// What is persisted for membership: the voting set and the log index it was
/// recorded at. Catching-up members are not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
    pub log_index: i64,
    pub voting_members: BTreeSet<MemberId>,
}

/// Layout: `[i64 log_index] [i32 count] [count x MemberId]`.
impl Marshal for MembershipRecord {
    fn marshal<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        marshal::write_i64(writer, self.log_index)?;
        marshal::write_i32(writer, self.voting_members.len() as i32)?;
        for member in &self.voting_members {
            member.marshal(writer)?;
        }
        Ok(())
    }

    fn unmarshal<R: Read>(reader: &mut R) -> io::Result<Self> {
        let log_index = marshal::read_i64(reader)?;
        let count = marshal::read_i32(reader)?;
        if !(0..=MAX_MEMBERS).contains(&count) {
            return Err(marshal::invalid_data(format!("bad member count {count}")));
        }
        let voting_members = (0..count)
            .map(|_| MemberId::unmarshal(reader))
            .collect::<io::Result<_>>()?;
        Ok(Self {
            log_index,
            voting_members,
        })
    }
}

impl DurableState for MembershipRecord {
    fn start_state() -> Self {
        Self {
            log_index: -1,
            voting_members: BTreeSet::new(),
        }
    }

    fn ordinal(&self) -> i64 {
        self.log_index
    }
}

/// Membership that survives restarts.
///
/// Recovery happens in [`open`](Self::open). Every [`set_log_index`]
/// appends the current voting set and index to the rotating state files
/// before returning.
///
/// [`set_log_index`]: MembershipState::set_log_index
pub struct DurableRaftMembershipState {
    state: InMemoryRaftMembershipState,
    storage: Mutex<DurableStateStorage<MembershipRecord>>,
}

impl DurableRaftMembershipState {
    pub fn open(dir: &Path, rotation_size: usize) -> io::Result<Self> {
        let storage = DurableStateStorage::<MembershipRecord>::open(
            dir,
            MEMBERSHIP_STATE_NAME,
            rotation_size,
        )?;
        let recovered = storage.initial_state().clone();
        info!(
            log_index = recovered.log_index,
            voting = recovered.voting_members.len(),
            "recovered raft membership"
        );
        Ok(Self {
            state: InMemoryRaftMembershipState::with_state(
                recovered.voting_members,
                recovered.log_index,
            ),
            storage: Mutex::new(storage),
        })
    }

    pub fn open_with_config(dir: &Path, config: &ClusterConfig) -> io::Result<Self> {
        Self::open(dir, config.raft_membership_state_size)
    }
}

impl MembershipState for DurableRaftMembershipState {
    fn set_voting_members(&self, members: BTreeSet<MemberId>) {
        self.state.set_voting_members(members);
    }

    fn add_additional_replication_member(&self, member: MemberId) {
        self.state.add_additional_replication_member(member);
    }

    fn remove_additional_replication_member(&self, member: &MemberId) {
        self.state.remove_additional_replication_member(member);
    }

    fn set_log_index(&self, log_index: i64) -> io::Result<()> {
        // storage is only ever locked inside the membership mutation lock
        self.state.set_log_index_with(log_index, |voting_members| {
            let record = MembershipRecord {
                log_index,
                voting_members: voting_members.clone(),
            };
            self.storage.lock().persist_store_data(&record)
        })
    }

    fn log_index(&self) -> i64 {
        self.state.log_index()
    }

    fn voting_members(&self) -> BTreeSet<MemberId> {
        self.state.voting_members()
    }

    fn replication_members(&self) -> BTreeSet<MemberId> {
        self.state.replication_members()
    }

    fn register_listener(&self, listener: MembershipListener) -> ListenerId {
        self.state.register_listener(listener)
    }

    fn deregister_listener(&self, id: ListenerId) -> bool {
        self.state.deregister_listener(id)
    }
}
