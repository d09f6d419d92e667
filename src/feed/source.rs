//! Live telemetry sources.
//!
//! A live source is consumed through a single subscribe call that registers a
//! data callback and an error callback and hands back a [`Subscription`].
//! Dropping or cancelling the subscription stops delivery.

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};
use crate::telemetry::RawSample;

/// Receives every raw sample delivered by a live source.
pub type DataCallback = Arc<dyn Fn(RawSample) + Send + Sync>;

/// Receives the error that ended a source.
pub type ErrorCallback = Arc<dyn Fn(TelemetryError) + Send + Sync>;

/// Message pushed into a [`ChannelSource`]; `Err` carries the failure reason.
pub type SourceMessage = std::result::Result<RawSample, String>;

/// Lines buffered between a blocking reader thread and the delivery task.
const READER_BUFFER: usize = 64;

/// Idempotent cancellation handle.
///
/// The first call to [`cancel`](Subscription::cancel) (or drop) runs the
/// cancel action; later calls do nothing.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use station_telemetry::feed::Subscription;
///
/// let count = Arc::new(AtomicUsize::new(0));
/// let counter = count.clone();
/// let mut subscription = Subscription::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// subscription.cancel();
/// subscription.cancel();
/// drop(subscription);
/// assert_eq!(count.load(Ordering::SeqCst), 1);
/// ```
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription that aborts a delivery task.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A source of live raw samples.
pub trait LiveSource: Send {
    /// Starts delivery. `on_error` fires at most once and no data follows it.
    fn subscribe(&mut self, on_data: DataCallback, on_error: ErrorCallback) -> Result<Subscription>;

    /// Human-readable origin, used in logs.
    fn description(&self) -> &str;
}

fn spawn_delivery<F>(task: F) -> Result<Subscription>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = Handle::try_current()
        .map_err(|e| TelemetryError::SourceUnavailable(format!("no async runtime: {}", e)))?;
    Ok(Subscription::from_task(handle.spawn(task)))
}

/// Live source fed through a tokio mpsc channel.
///
/// Producers push `Ok(sample)` for data and `Err(reason)` to report a source
/// failure. Closing every sender also ends the source with an error.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Option<mpsc::Receiver<SourceMessage>>,
    description: String,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::Receiver<SourceMessage>, source_description: &str) -> Self {
        Self {
            receiver: Some(receiver),
            description: format!("channel: {}", source_description),
        }
    }

    /// Creates a sender and the source reading from it.
    pub fn create(source_description: &str, buffer: usize) -> (mpsc::Sender<SourceMessage>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx, source_description))
    }

    /// Reads JSON lines from a blocking reader on a dedicated thread.
    ///
    /// The thread is detached from the async runtime, so shutting the runtime
    /// down never waits on a pending read. Once the source is dropped the
    /// thread exits after its next line.
    pub fn from_blocking_reader<R>(reader: R, source_description: &str) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, source) = Self::create(source_description, READER_BUFFER);
        let description = source.description.clone();
        thread::Builder::new()
            .name("line-reader".to_string())
            .spawn(move || forward_lines(reader, &tx, &description))?;
        Ok(source)
    }
}

/// Forwards parsed lines until end of stream, a read error, or the receiver
/// going away.
fn forward_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<SourceMessage>, description: &str) {
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = tx.blocking_send(Err(format!("{} read failed: {}", description, e)));
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match RawSample::from_json(line) {
            Ok(sample) => {
                if tx.blocking_send(Ok(sample)).is_err() {
                    debug!("{} released, reader exiting", description);
                    return;
                }
            }
            Err(e) => warn!("Skipping line {} from {}: {}", index + 1, description, e),
        }
    }
    let _ = tx.blocking_send(Err(format!("{} reached end of stream", description)));
}

impl LiveSource for ChannelSource {
    fn subscribe(&mut self, on_data: DataCallback, on_error: ErrorCallback) -> Result<Subscription> {
        let mut receiver = self.receiver.take().ok_or_else(|| {
            TelemetryError::SourceUnavailable(format!("{} is already subscribed", self.description))
        })?;
        let description = self.description.clone();

        spawn_delivery(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    Ok(sample) => on_data(sample),
                    Err(reason) => {
                        on_error(TelemetryError::Source(reason));
                        return;
                    }
                }
            }
            debug!("{} closed", description);
            on_error(TelemetryError::Source(format!("{} closed", description)));
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Live source reading one JSON document per line.
///
/// Unparseable lines are skipped. End of stream or a read error ends the
/// source with an error.
pub struct LineSource<R> {
    reader: Option<R>,
    description: String,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, source_description: &str) -> Self {
        Self {
            reader: Some(reader),
            description: format!("lines: {}", source_description),
        }
    }
}

impl<R> fmt::Debug for LineSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSource")
            .field("description", &self.description)
            .field("subscribed", &self.reader.is_none())
            .finish()
    }
}

impl<R> LiveSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn subscribe(&mut self, on_data: DataCallback, on_error: ErrorCallback) -> Result<Subscription> {
        let reader = self.reader.take().ok_or_else(|| {
            TelemetryError::SourceUnavailable(format!("{} is already subscribed", self.description))
        })?;
        let description = self.description.clone();

        spawn_delivery(async move {
            let mut lines = reader.lines();
            let mut line_number: u64 = 0;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        line_number += 1;
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match RawSample::from_json(line) {
                            Ok(sample) => on_data(sample),
                            Err(e) => warn!("Skipping line {} from {}: {}", line_number, description, e),
                        }
                    }
                    Ok(None) => {
                        on_error(TelemetryError::Source(format!("{} reached end of stream", description)));
                        return;
                    }
                    Err(e) => {
                        on_error(TelemetryError::Source(format!("{} read failed: {}", description, e)));
                        return;
                    }
                }
            }
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}
