//! Asynchronous delivery of messages to peers.
//!
//! Senders never block and never see delivery errors. Each destination gets
//! a bounded queue drained by its own thread; when the queue is full new
//! messages are dropped and reported to the [`MessageQueueMonitor`]. Raft
//! tolerates lost messages, so back-pressure is never pushed onto the caller.

mod channel;
mod channels;
pub mod codec;
mod raft_outbound;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

pub use channel::{Connector, NonBlockingChannel, TcpConnector};
pub use channels::NonBlockingChannels;
pub use raft_outbound::{RaftOutbound, StoreIdSource};

use crate::config::ClusterConfig;
use crate::discovery::AdvertisedSocketAddress;

/// Best-effort, non-blocking delivery of `T` to destinations named by `M`.
pub trait Outbound<M, T>: Send + Sync {
    fn send(&self, to: &M, message: T);

    fn send_all(&self, to: &M, messages: Vec<T>) {
        for message in messages {
            self.send(to, message);
        }
    }
}

/// Observes per-destination queues.
pub trait MessageQueueMonitor: Send + Sync {
    /// A message to `to` was dropped because its queue was full.
    fn dropped(&self, to: &AdvertisedSocketAddress);

    fn queue_size(&self, _to: &AdvertisedSocketAddress, _size: usize) {}
}

pub struct NoopMessageQueueMonitor;

impl MessageQueueMonitor for NoopMessageQueueMonitor {
    fn dropped(&self, _to: &AdvertisedSocketAddress) {}
}

/// Counts dropped messages per destination.
#[derive(Default)]
pub struct CountingMessageQueueMonitor {
    total: AtomicU64,
    per_destination: Mutex<HashMap<AdvertisedSocketAddress, u64>>,
}

impl CountingMessageQueueMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped_total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn dropped_for(&self, to: &AdvertisedSocketAddress) -> u64 {
        self.per_destination.lock().get(to).copied().unwrap_or(0)
    }
}

impl MessageQueueMonitor for CountingMessageQueueMonitor {
    fn dropped(&self, to: &AdvertisedSocketAddress) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.per_destination.lock().entry(to.clone()).or_insert(0) += 1;
    }
}

/// Sizing and timing of outbound channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    pub queue_size: usize,
    pub connect_backoff: Duration,
}

impl ChannelSettings {
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            queue_size: config.outgoing_queue_size,
            connect_backoff: config.connect_backoff(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::from_config(&ClusterConfig::default())
    }
}
