//! Raft messages exchanged between core members.
//!
//! Messages are plain data encoded with `bincode` when they leave the
//! process. Every message on the wire is wrapped in a
//! [`StoreIdAwareMessage`] so receivers can reject traffic from a member
//! whose store belongs to a different database.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::EntrySize;
use crate::identity::{MemberId, StoreId};

/// A replicated log entry: the term it was appended in and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftLogEntry {
    pub term: i64,
    pub content: Vec<u8>,
}

impl RaftLogEntry {
    pub fn new(term: i64, content: impl Into<Vec<u8>>) -> Self {
        Self {
            term,
            content: content.into(),
        }
    }
}

impl EntrySize for RaftLogEntry {
    /// Term plus payload length prefix plus payload.
    fn size_in_bytes(&self) -> u64 {
        8 + 4 + self.content.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaftMessageType {
    VoteRequest,
    VoteResponse,
    PreVoteRequest,
    PreVoteResponse,
    AppendEntriesRequest,
    AppendEntriesResponse,
    Heartbeat,
    HeartbeatResponse,
    LogCompactionInfo,
    PruneRequest,
}

/// Every message a Raft member sends to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftMessage {
    VoteRequest {
        from: MemberId,
        term: i64,
        candidate: MemberId,
        last_log_index: i64,
        last_log_term: i64,
    },
    VoteResponse {
        from: MemberId,
        term: i64,
        vote_granted: bool,
    },
    PreVoteRequest {
        from: MemberId,
        term: i64,
        candidate: MemberId,
        last_log_index: i64,
        last_log_term: i64,
    },
    PreVoteResponse {
        from: MemberId,
        term: i64,
        vote_granted: bool,
    },
    AppendEntriesRequest {
        from: MemberId,
        leader_term: i64,
        prev_log_index: i64,
        prev_log_term: i64,
        entries: Vec<RaftLogEntry>,
        leader_commit: i64,
    },
    AppendEntriesResponse {
        from: MemberId,
        term: i64,
        success: bool,
        match_index: i64,
        append_index: i64,
    },
    Heartbeat {
        from: MemberId,
        leader_term: i64,
        commit_index: i64,
        commit_index_term: i64,
    },
    HeartbeatResponse {
        from: MemberId,
    },
    /// Tells a follower the leader's log now starts after `prev_index`.
    LogCompactionInfo {
        from: MemberId,
        leader_term: i64,
        prev_index: i64,
    },
    /// Local request to prune the log up to `prune_index`.
    PruneRequest {
        from: MemberId,
        prune_index: i64,
    },
}

impl RaftMessage {
    pub fn from(&self) -> MemberId {
        match self {
            RaftMessage::VoteRequest { from, .. }
            | RaftMessage::VoteResponse { from, .. }
            | RaftMessage::PreVoteRequest { from, .. }
            | RaftMessage::PreVoteResponse { from, .. }
            | RaftMessage::AppendEntriesRequest { from, .. }
            | RaftMessage::AppendEntriesResponse { from, .. }
            | RaftMessage::Heartbeat { from, .. }
            | RaftMessage::HeartbeatResponse { from }
            | RaftMessage::LogCompactionInfo { from, .. }
            | RaftMessage::PruneRequest { from, .. } => *from,
        }
    }

    pub fn message_type(&self) -> RaftMessageType {
        match self {
            RaftMessage::VoteRequest { .. } => RaftMessageType::VoteRequest,
            RaftMessage::VoteResponse { .. } => RaftMessageType::VoteResponse,
            RaftMessage::PreVoteRequest { .. } => RaftMessageType::PreVoteRequest,
            RaftMessage::PreVoteResponse { .. } => RaftMessageType::PreVoteResponse,
            RaftMessage::AppendEntriesRequest { .. } => RaftMessageType::AppendEntriesRequest,
            RaftMessage::AppendEntriesResponse { .. } => RaftMessageType::AppendEntriesResponse,
            RaftMessage::Heartbeat { .. } => RaftMessageType::Heartbeat,
            RaftMessage::HeartbeatResponse { .. } => RaftMessageType::HeartbeatResponse,
            RaftMessage::LogCompactionInfo { .. } => RaftMessageType::LogCompactionInfo,
            RaftMessage::PruneRequest { .. } => RaftMessageType::PruneRequest,
        }
    }

    /// Term carried by the message, if its type has one.
    pub fn term(&self) -> Option<i64> {
        match self {
            RaftMessage::VoteRequest { term, .. }
            | RaftMessage::VoteResponse { term, .. }
            | RaftMessage::PreVoteRequest { term, .. }
            | RaftMessage::PreVoteResponse { term, .. }
            | RaftMessage::AppendEntriesResponse { term, .. } => Some(*term),
            RaftMessage::AppendEntriesRequest { leader_term, .. }
            | RaftMessage::Heartbeat { leader_term, .. }
            | RaftMessage::LogCompactionInfo { leader_term, .. } => Some(*leader_term),
            RaftMessage::HeartbeatResponse { .. } | RaftMessage::PruneRequest { .. } => None,
        }
    }
}

impl fmt::Display for RaftMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.term() {
            Some(term) => write!(
                f,
                "{:?}{{from: {}, term: {term}}}",
                self.message_type(),
                self.from()
            ),
            None => write!(f, "{:?}{{from: {}}}", self.message_type(), self.from()),
        }
    }
}

/// A message tagged with the sender's store identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreIdAwareMessage {
    pub store_id: StoreId,
    pub message: RaftMessage,
}

impl StoreIdAwareMessage {
    pub fn new(store_id: StoreId, message: RaftMessage) -> Self {
        Self { store_id, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bincode_round_trip_keeps_entries() -> anyhow::Result<()> {
        let from = MemberId::random();
        let message = StoreIdAwareMessage::new(
            StoreId::new(1, 2, 3, 4),
            RaftMessage::AppendEntriesRequest {
                from,
                leader_term: 3,
                prev_log_index: 9,
                prev_log_term: 2,
                entries: vec![
                    RaftLogEntry::new(3, b"a".to_vec()),
                    RaftLogEntry::new(3, b"bc".to_vec()),
                ],
                leader_commit: 8,
            },
        );
        let bytes = bincode::serialize(&message)?;
        let decoded: StoreIdAwareMessage = bincode::deserialize(&bytes)?;
        assert_eq!(decoded, message);
        assert_eq!(decoded.message.from(), from);
        Ok(())
    }

    #[test]
    fn term_and_type_accessors() {
        let from = MemberId::random();
        let heartbeat = RaftMessage::Heartbeat {
            from,
            leader_term: 7,
            commit_index: 10,
            commit_index_term: 6,
        };
        assert_eq!(heartbeat.term(), Some(7));
        assert_eq!(heartbeat.message_type(), RaftMessageType::Heartbeat);
        assert!(heartbeat.to_string().starts_with("Heartbeat{"));

        let response = RaftMessage::HeartbeatResponse { from };
        assert_eq!(response.term(), None);
    }

    #[test]
    fn entry_size_counts_payload() {
        assert_eq!(RaftLogEntry::new(1, Vec::new()).size_in_bytes(), 12);
        assert_eq!(RaftLogEntry::new(1, vec![0u8; 100]).size_in_bytes(), 112);
    }
}
