//! Connection supervisor.
//!
//! A single task owns the link and walks it through
//! `Closed -> Connecting -> Open -> Reconnecting -> Connecting -> ...`
//! until shutdown. Reads happen on a dedicated blocking thread per connection;
//! every thread is tagged with a generation so events from a link that has
//! already been torn down are dropped instead of triggering a second reconnect.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{BoardStream, Connector};

/// Lifecycle of the link to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Connecting,
    Open,
    Reconnecting,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the layer above hears from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection was (re)established. Any partial frame from before is gone.
    Opened,
    /// Bytes read from the board, in arrival order.
    Data(Bytes),
    /// The connection dropped; a reconnect is scheduled.
    Lost,
}

/// Transport tuning.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Pause between a failure and the next connection attempt.
    pub reconnect_delay: Duration,
    /// How long a blocking read waits before rechecking for teardown.
    pub read_timeout: Duration,
    /// Size of the per-read buffer.
    pub read_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            read_timeout: Duration::from_millis(100),
            read_buffer: 256,
        }
    }
}

/// Cloneable handle for queueing bytes onto the link.
#[derive(Debug, Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl WriteHandle {
    /// Queue bytes for the board.
    ///
    /// Never blocks. While the link is down the bytes are held and flushed,
    /// in order, once it reopens. Fails only after shutdown.
    pub fn write(&self, bytes: Bytes) -> Result<()> {
        self.tx.send(bytes).map_err(|_| TransportError::Shutdown)
    }
}

/// Self-healing link to the board.
pub struct SerialTransport {
    writes: WriteHandle,
    state: watch::Receiver<LinkState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Start connecting in the background.
    ///
    /// Must be called from within a Tokio runtime. Returns the transport and
    /// the stream of [`LinkEvent`]s it produces.
    pub fn start<C: Connector>(
        connector: C,
        config: TransportConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Closed);
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            endpoint: connector.describe(),
            connector: Arc::new(connector),
            config,
            state: state_tx,
            events: event_tx,
            writes: write_rx,
            deferred: VecDeque::new(),
            reader_tx,
            reader_rx,
            cancel: cancel.clone(),
            generation: 0,
        };
        let task = tokio::spawn(supervisor.run());

        let transport = Self {
            writes: WriteHandle { tx: write_tx },
            state: state_rx,
            cancel,
            task: Some(task),
        };
        (transport, event_rx)
    }

    /// Queue bytes for the board. See [`WriteHandle::write`].
    pub fn write(&self, bytes: Bytes) -> Result<()> {
        self.writes.write(bytes)
    }

    /// A cloneable write handle, independent of this value's lifetime.
    pub fn write_handle(&self) -> WriteHandle {
        self.writes.clone()
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Subscribe to link state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Stop reconnecting, close the link and wait for the supervisor to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "transport supervisor ended abnormally");
            }
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("state", &self.state())
            .finish()
    }
}

enum ReaderEvent {
    Data(Bytes),
    Closed(String),
}

enum Outcome {
    Lost(String),
    Stopped,
}

/// An open connection: the write half plus the stop flag of its reader thread.
struct Link {
    writer: Option<BoardStream>,
    stop: Arc<AtomicBool>,
}

impl Link {
    async fn write(&mut self, bytes: Bytes) -> std::io::Result<()> {
        let mut stream = self
            .writer
            .take()
            .ok_or_else(|| std::io::Error::from(ErrorKind::NotConnected))?;
        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = stream.write_all(&bytes).and_then(|()| stream.flush());
            (stream, result)
        })
        .await
        .map_err(std::io::Error::other)?;
        self.writer = Some(stream);
        result
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

struct Supervisor<C> {
    connector: Arc<C>,
    endpoint: String,
    config: TransportConfig,
    state: watch::Sender<LinkState>,
    events: mpsc::UnboundedSender<LinkEvent>,
    writes: mpsc::UnboundedReceiver<Bytes>,
    deferred: VecDeque<Bytes>,
    reader_tx: mpsc::UnboundedSender<(u64, ReaderEvent)>,
    reader_rx: mpsc::UnboundedReceiver<(u64, ReaderEvent)>,
    cancel: CancellationToken,
    generation: u64,
}

impl<C: Connector> Supervisor<C> {
    async fn run(mut self) {
        while !self.cancel.is_cancelled() {
            self.set_state(LinkState::Connecting);
            match self.open().await {
                Ok(link) => {
                    self.set_state(LinkState::Open);
                    info!(endpoint = %self.endpoint, generation = self.generation, "board link open");
                    let _ = self.events.send(LinkEvent::Opened);
                    match self.serve(link).await {
                        Outcome::Stopped => break,
                        Outcome::Lost(reason) => {
                            warn!(
                                endpoint = %self.endpoint,
                                %reason,
                                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                                "board link lost; reconnecting"
                            );
                            let _ = self.events.send(LinkEvent::Lost);
                        }
                    }
                }
                Err(TransportError::Shutdown) => break,
                Err(err) => {
                    warn!(
                        endpoint = %self.endpoint,
                        error = %err,
                        delay_ms = self.config.reconnect_delay.as_millis() as u64,
                        "failed to open board link; retrying"
                    );
                }
            }

            self.set_state(LinkState::Reconnecting);
            if !self.wait_reconnect_delay().await {
                break;
            }
        }

        self.set_state(LinkState::Closed);
        if !self.deferred.is_empty() {
            debug!(dropped = self.deferred.len(), "discarding deferred writes");
        }
        info!(endpoint = %self.endpoint, "board transport stopped");
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "link state");
        }
    }

    async fn open(&mut self) -> Result<Link> {
        let connector = Arc::clone(&self.connector);
        let read_timeout = self.config.read_timeout;
        let opening = tokio::task::spawn_blocking(move || -> Result<(BoardStream, BoardStream)> {
            let mut stream = connector.connect()?;
            stream.set_read_timeout(read_timeout)?;
            let reader = stream.try_clone()?;
            Ok((stream, reader))
        });

        let (writer, reader) = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransportError::Shutdown),
            joined = opening => joined.map_err(|err| TransportError::Io(std::io::Error::other(err)))??,
        };

        self.generation += 1;
        let stop = Arc::new(AtomicBool::new(false));
        spawn_reader(
            reader,
            self.generation,
            Arc::clone(&stop),
            self.reader_tx.clone(),
            self.config.read_buffer,
        )?;

        Ok(Link {
            writer: Some(writer),
            stop,
        })
    }

    async fn serve(&mut self, mut link: Link) -> Outcome {
        while let Some(bytes) = self.deferred.pop_front() {
            debug!(len = bytes.len(), "flushing deferred write");
            if let Err(err) = link.write(bytes.clone()).await {
                self.deferred.push_front(bytes);
                return Outcome::Lost(err.to_string());
            }
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Outcome::Stopped,
                Some((generation, event)) = self.reader_rx.recv() => {
                    if generation != self.generation {
                        debug!(generation, current = self.generation, "ignoring event from a closed link");
                        continue;
                    }
                    match event {
                        ReaderEvent::Data(bytes) => {
                            let _ = self.events.send(LinkEvent::Data(bytes));
                        }
                        ReaderEvent::Closed(reason) => return Outcome::Lost(reason),
                    }
                }
                write = self.writes.recv() => match write {
                    Some(bytes) => {
                        // A partial write is resent whole: reopening the port
                        // resets the board, so its parser starts clean.
                        if let Err(err) = link.write(bytes.clone()).await {
                            self.deferred.push_front(bytes);
                            return Outcome::Lost(err.to_string());
                        }
                    }
                    None => return Outcome::Stopped,
                },
            }
        }
    }

    /// Sleep out the reconnect delay, holding any writes that arrive.
    /// Returns false if the transport should stop instead.
    async fn wait_reconnect_delay(&mut self) -> bool {
        let delay = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut delay => return true,
                write = self.writes.recv() => match write {
                    Some(bytes) => {
                        debug!(len = bytes.len(), "link down; deferring write");
                        self.deferred.push_back(bytes);
                    }
                    None => return false,
                },
            }
        }
    }
}

fn spawn_reader(
    mut stream: BoardStream,
    generation: u64,
    stop: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<(u64, ReaderEvent)>,
    buffer: usize,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("daisy-reader-{generation}"))
        .spawn(move || {
            let mut buf = vec![0u8; buffer.max(1)];
            while !stop.load(Ordering::Relaxed) {
                let event = match stream.read(&mut buf) {
                    Ok(0) => ReaderEvent::Closed("end of stream".to_string()),
                    Ok(n) => ReaderEvent::Data(Bytes::copy_from_slice(&buf[..n])),
                    Err(err)
                        if matches!(
                            err.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) =>
                    {
                        continue
                    }
                    Err(err) => ReaderEvent::Closed(err.to_string()),
                };
                let closed = matches!(event, ReaderEvent::Closed(_));
                if tx.send((generation, event)).is_err() || closed {
                    return;
                }
            }
        })?;
    Ok(())
}
