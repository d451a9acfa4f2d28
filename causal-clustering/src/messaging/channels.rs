use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ChannelSettings, Connector, MessageQueueMonitor, NonBlockingChannel, Outbound};
use crate::discovery::AdvertisedSocketAddress;

/// One [`NonBlockingChannel`] per destination, created on first send.
pub struct NonBlockingChannels<T> {
    channels: Mutex<HashMap<AdvertisedSocketAddress, NonBlockingChannel<T>>>,
    connector: Arc<dyn Connector>,
    settings: ChannelSettings,
    monitor: Arc<dyn MessageQueueMonitor>,
    stopped: AtomicBool,
}

impl<T: Serialize + Send + 'static> NonBlockingChannels<T> {
    pub fn new(
        connector: Arc<dyn Connector>,
        settings: ChannelSettings,
        monitor: Arc<dyn MessageQueueMonitor>,
    ) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            connector,
            settings,
            monitor,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Closes the channel to `to`, e.g. after the peer left the cluster.
    /// A later send opens a fresh one.
    pub fn dispose(&self, to: &AdvertisedSocketAddress) {
        let removed = self.channels.lock().remove(to);
        if let Some(mut channel) = removed {
            channel.dispose();
        }
    }

    /// Disposes every channel. Messages sent afterwards are dropped.
    pub fn stop(&self) {
        let drained: Vec<_> = {
            let mut channels = self.channels.lock();
            self.stopped.store(true, Ordering::Release);
            channels.drain().map(|(_, channel)| channel).collect()
        };
        info!(channels = drained.len(), "stopping outbound channels");
        for mut channel in drained {
            channel.dispose();
        }
    }
}

impl<T> Outbound<AdvertisedSocketAddress, T> for NonBlockingChannels<T>
where
    T: Serialize + Send + 'static,
{
    fn send(&self, to: &AdvertisedSocketAddress, message: T) {
        // checked under the lock so that stop() cannot drain in between
        let mut channels = self.channels.lock();
        if self.stopped.load(Ordering::Acquire) {
            debug!(destination = %to, "outbound channels stopped, dropping message");
            return;
        }

        if !channels.contains_key(to) {
            let spawned = NonBlockingChannel::spawn(
                to.clone(),
                self.connector.clone(),
                self.settings,
                self.monitor.clone(),
            );
            match spawned {
                Ok(channel) => {
                    channels.insert(to.clone(), channel);
                }
                Err(err) => {
                    warn!(
                        destination = %to,
                        error = %err,
                        "failed to start outbound channel, dropping message"
                    );
                    return;
                }
            }
        }
        if let Some(channel) = channels.get(to) {
            channel.send(message);
        }
    }
}
