use std::io::{self, BufWriter, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::codec::write_frame;
use super::{ChannelSettings, MessageQueueMonitor};
use crate::discovery::AdvertisedSocketAddress;
use crate::throttle::LogThrottle;

/// How long the delivery thread waits for a message before rechecking the
/// disposal flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on how long `dispose` waits for the delivery thread.
const DISPOSE_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Opens the byte stream behind a channel.
pub trait Connector: Send + Sync {
    fn connect(&self, to: &AdvertisedSocketAddress) -> io::Result<Box<dyn Write + Send>>;
}

/// Plain TCP with Nagle disabled and a buffered writer on top.
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Connector for TcpConnector {
    fn connect(&self, to: &AdvertisedSocketAddress) -> io::Result<Box<dyn Write + Send>> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, format!("{to} did not resolve"));
        for addr in to.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(BufWriter::new(stream)));
                }
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

/// Outbound channel to one destination.
///
/// `send` only enqueues. A dedicated thread connects lazily, writes queued
/// messages as frames and reconnects after failures with a fixed backoff
/// until the channel is disposed.
pub struct NonBlockingChannel<T> {
    destination: AdvertisedSocketAddress,
    sender: Sender<T>,
    disposed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    monitor: Arc<dyn MessageQueueMonitor>,
}

impl<T: Serialize + Send + 'static> NonBlockingChannel<T> {
    pub fn spawn(
        destination: AdvertisedSocketAddress,
        connector: Arc<dyn Connector>,
        settings: ChannelSettings,
        monitor: Arc<dyn MessageQueueMonitor>,
    ) -> io::Result<Self> {
        let (sender, receiver) = bounded(settings.queue_size.max(1));
        let disposed = Arc::new(AtomicBool::new(false));

        let delivery = Delivery {
            destination: destination.clone(),
            receiver,
            connector,
            disposed: disposed.clone(),
            backoff: settings.connect_backoff,
            connect_failures: LogThrottle::new(CONNECT_FAILURE_LOG_INTERVAL),
        };
        let worker = thread::Builder::new()
            .name(format!("raft-outbound-{destination}"))
            .spawn(move || delivery.run())?;

        debug!(%destination, queue_size = settings.queue_size, "opened outbound channel");
        Ok(Self {
            destination,
            sender,
            disposed,
            worker: Some(worker),
            monitor,
        })
    }

    /// Enqueues `message`, dropping it if the queue is full.
    pub fn send(&self, message: T) {
        match self.sender.try_send(message) {
            Ok(()) => self.monitor.queue_size(&self.destination, self.sender.len()),
            Err(TrySendError::Full(_)) => {
                debug!(destination = %self.destination, "outbound queue full, dropping message");
                self.monitor.dropped(&self.destination);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(
                    destination = %self.destination,
                    "outbound channel closed, dropping message"
                );
            }
        }
    }
}

impl<T> NonBlockingChannel<T> {
    pub fn destination(&self) -> &AdvertisedSocketAddress {
        &self.destination
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stops the delivery thread and waits a bounded time for it to exit.
    /// Queued messages that were not yet written are discarded.
    pub fn dispose(&mut self) {
        self.disposed.store(true, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return;
        };

        let deadline = Instant::now() + DISPOSE_TIMEOUT;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if worker.is_finished() {
            if worker.join().is_err() {
                warn!(destination = %self.destination, "outbound delivery thread panicked");
            }
        } else {
            warn!(
                destination = %self.destination,
                "outbound delivery thread did not stop in time, detaching"
            );
        }
        info!(destination = %self.destination, "disposed outbound channel");
    }
}

impl<T> Drop for NonBlockingChannel<T> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.dispose();
        }
    }
}

struct Delivery<T> {
    destination: AdvertisedSocketAddress,
    receiver: Receiver<T>,
    connector: Arc<dyn Connector>,
    disposed: Arc<AtomicBool>,
    backoff: Duration,
    connect_failures: LogThrottle,
}

impl<T: Serialize> Delivery<T> {
    fn run(self) {
        let mut connection: Option<Box<dyn Write + Send>> = None;
        while !self.is_disposed() {
            let message = match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if connection.is_none() {
                connection = self.connect();
            }
            let Some(stream) = connection.as_mut() else {
                break;
            };

            if let Err(err) = self.write_batch(stream, message) {
                warn!(
                    destination = %self.destination,
                    error = %err,
                    "failed writing to peer, reconnecting"
                );
                connection = None;
            }
        }
        debug!(destination = %self.destination, "outbound delivery thread exiting");
    }

    /// Writes `first` and everything already queued behind it, then flushes.
    fn write_batch(&self, stream: &mut Box<dyn Write + Send>, first: T) -> io::Result<()> {
        write_frame(stream, &first)?;
        while let Ok(message) = self.receiver.try_recv() {
            write_frame(stream, &message)?;
        }
        stream.flush()
    }

    /// Retries until connected. Returns `None` only once disposed.
    fn connect(&self) -> Option<Box<dyn Write + Send>> {
        loop {
            if self.is_disposed() {
                return None;
            }
            match self.connector.connect(&self.destination) {
                Ok(stream) => {
                    info!(destination = %self.destination, "connected to peer");
                    return Some(stream);
                }
                Err(err) => {
                    self.connect_failures.invoke(|| {
                        warn!(
                            destination = %self.destination,
                            error = %err,
                            "failed to connect to peer"
                        );
                    });
                    thread::sleep(self.backoff);
                }
            }
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
