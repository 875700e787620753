use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use daisy_protocol::{
    encode_request, FrameDecoder, PacketSink, ProtocolError, Reply, Request, RequestArgs,
    RequestSubject, Response, Telemetry,
};
use daisy_transport::{
    Connector, LinkEvent, SerialTransport, TransportConfig, TransportError, WriteHandle,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::correlator::Correlator;
use crate::error::{BoardError, Result};

/// Where encoded requests go. Implemented by the transport's write handle.
pub trait ByteSink: Send + 'static {
    fn send(&self, bytes: Bytes) -> std::result::Result<(), TransportError>;
}

impl ByteSink for WriteHandle {
    fn send(&self, bytes: Bytes) -> std::result::Result<(), TransportError> {
        self.write(bytes)
    }
}

impl ByteSink for mpsc::UnboundedSender<Bytes> {
    fn send(&self, bytes: Bytes) -> std::result::Result<(), TransportError> {
        mpsc::UnboundedSender::send(self, bytes).map_err(|_| TransportError::Shutdown)
    }
}

/// Board behavior configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// How long a dispatched request may wait for its response. `None`
    /// waits forever, which stalls the queue if a response is lost.
    pub request_timeout: Option<Duration>,
    /// Telemetry events buffered per subscriber before it starts lagging.
    pub telemetry_capacity: usize,
    /// Requests buffered between callers and the board task.
    pub command_capacity: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
            telemetry_capacity: 64,
            command_capacity: 32,
        }
    }
}

type Waiter = oneshot::Sender<Result<Reply>>;

enum Command {
    Request {
        subject: RequestSubject,
        payload: Bytes,
        reply: Waiter,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a running board conversation. Cheap to clone.
#[derive(Clone)]
pub struct Board {
    commands: mpsc::Sender<Command>,
    telemetry: broadcast::Sender<Telemetry>,
    desyncs: Arc<AtomicU64>,
}

impl Board {
    /// Start the board task over an existing byte sink and link event stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S: ByteSink>(
        sink: S,
        link: mpsc::UnboundedReceiver<LinkEvent>,
        config: BoardConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (telemetry, _) = broadcast::channel(config.telemetry_capacity.max(1));
        let desyncs = Arc::new(AtomicU64::new(0));
        let (redispatch, redispatch_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            sink,
            commands: command_rx,
            link,
            redispatch,
            redispatch_rx,
            decoder: FrameDecoder::new(),
            answering: Cell::new(None),
            correlator: Correlator::new(),
            telemetry: telemetry.clone(),
            desyncs: Arc::clone(&desyncs),
            config,
            deadline: None,
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            telemetry,
            desyncs,
        }
    }

    /// Start a transport for `connector` and a board on top of it.
    pub fn open<C: Connector>(
        connector: C,
        transport: TransportConfig,
        config: BoardConfig,
    ) -> (Self, SerialTransport) {
        let (transport, link) = SerialTransport::start(connector, transport);
        let board = Self::spawn(transport.write_handle(), link, config);
        (board, transport)
    }

    /// Send a request and wait for the board's answer.
    ///
    /// Arguments are validated before anything is queued. Requests are
    /// answered strictly in the order they were submitted.
    pub async fn request(&self, request: Request) -> Result<Reply> {
        let payload = encode_request(&request)?;
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Command::Request {
                subject: request.subject(),
                payload,
                reply,
            })
            .await
            .map_err(|_| BoardError::Closed)?;
        answer.await.map_err(|_| BoardError::Closed)?
    }

    /// Like [`Board::request`], taking a subject name such as `"getDHT"`.
    pub async fn request_named(&self, name: &str, args: RequestArgs) -> Result<Reply> {
        let subject = RequestSubject::from_name(name)?;
        self.request(Request::from_args(subject, args)?).await
    }

    /// Receive every telemetry event decoded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    /// Packets dropped because of protocol violations so far.
    pub fn desync_count(&self) -> u64 {
        self.desyncs.load(Ordering::Relaxed)
    }

    /// Stop the board task. Outstanding requests fail with [`BoardError::Closed`].
    pub async fn shutdown(&self) {
        let (done, stopped) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_ok() {
            let _ = stopped.await;
        }
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("subscribers", &self.telemetry.receiver_count())
            .field("desyncs", &self.desync_count())
            .finish()
    }
}

struct Actor<S> {
    sink: S,
    commands: mpsc::Receiver<Command>,
    link: mpsc::UnboundedReceiver<LinkEvent>,
    redispatch: mpsc::UnboundedSender<()>,
    redispatch_rx: mpsc::UnboundedReceiver<()>,
    decoder: FrameDecoder,
    /// Dispatch id that was pending when the decoder started the current response.
    answering: Cell<Option<u64>>,
    correlator: Correlator<Waiter>,
    telemetry: broadcast::Sender<Telemetry>,
    desyncs: Arc<AtomicU64>,
    config: BoardConfig,
    /// Dispatch id and expiry of the pending request.
    deadline: Option<(u64, Instant)>,
}

impl<S: ByteSink> Actor<S> {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline.map(|(_, at)| at);
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Request { subject, payload, reply }) => {
                        self.correlator.enqueue(subject, payload, reply);
                        self.try_dispatch();
                    }
                    Some(Command::Shutdown { done }) => {
                        self.close();
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.close();
                        return;
                    }
                },
                Some(()) = self.redispatch_rx.recv() => self.try_dispatch(),
                event = self.link.recv() => match event {
                    Some(LinkEvent::Data(bytes)) => self.on_data(&bytes),
                    Some(LinkEvent::Opened) | Some(LinkEvent::Lost) => self.decoder.reset(),
                    None => {
                        info!("board link gone; stopping");
                        self.close();
                        return;
                    }
                },
                _ = sleep_until(deadline) => self.expire(),
            }
        }
    }

    /// Settlement never dispatches inline; the next request goes out on a
    /// later turn of the loop.
    fn schedule_dispatch(&self) {
        let _ = self.redispatch.send(());
    }

    fn try_dispatch(&mut self) {
        let Some(dispatched) = self.correlator.dispatch() else {
            return;
        };
        debug!(
            subject = %dispatched.subject,
            id = dispatched.id,
            bytes = ?dispatched.payload.as_ref(),
            queued = self.correlator.queued(),
            "dispatching request"
        );

        if let Err(err) = self.sink.send(dispatched.payload) {
            warn!(subject = %dispatched.subject, error = %err, "could not hand request to transport");
            if let Some((_, waiter)) = self.correlator.settle() {
                let _ = waiter.send(Err(err.into()));
            }
            self.schedule_dispatch();
            return;
        }

        self.deadline = self
            .config
            .request_timeout
            .map(|timeout| (dispatched.id, Instant::now() + timeout));
    }

    fn on_data(&mut self, bytes: &[u8]) {
        let mut sink = Settlement {
            correlator: &mut self.correlator,
            answering: &self.answering,
            telemetry: &self.telemetry,
            desyncs: &self.desyncs,
            settled: false,
        };
        self.decoder.feed(bytes, &mut sink);
        let settled = sink.settled;

        if settled {
            self.deadline = None;
            self.schedule_dispatch();
        }
    }

    fn expire(&mut self) {
        let Some((id, _)) = self.deadline.take() else {
            return;
        };
        let Some(timeout) = self.config.request_timeout else {
            return;
        };
        if let Some((subject, waiter)) = self.correlator.take(id) {
            warn!(%subject, ?timeout, "request timed out; releasing queue");
            let _ = waiter.send(Err(BoardError::Timeout(timeout)));
            self.schedule_dispatch();
        }
    }

    fn close(&mut self) {
        let outstanding = self.correlator.drain();
        if !outstanding.is_empty() {
            info!(count = outstanding.len(), "failing outstanding requests");
        }
        for (_, waiter) in outstanding {
            let _ = waiter.send(Err(BoardError::Closed));
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Decoder output routed into the correlator and telemetry channel.
struct Settlement<'a> {
    correlator: &'a mut Correlator<Waiter>,
    answering: &'a Cell<Option<u64>>,
    telemetry: &'a broadcast::Sender<Telemetry>,
    desyncs: &'a AtomicU64,
    settled: bool,
}

impl PacketSink for Settlement<'_> {
    fn pending_subject(&self) -> Option<RequestSubject> {
        self.answering.set(self.correlator.pending_id());
        self.correlator.pending_subject()
    }

    fn on_telemetry(&mut self, telemetry: Telemetry) {
        debug!(?telemetry, subscribers = self.telemetry.receiver_count(), "telemetry");
        let _ = self.telemetry.send(telemetry);
    }

    fn on_response(&mut self, response: Response) {
        let taken = self
            .answering
            .take()
            .and_then(|id| self.correlator.take(id));
        let Some((_, waiter)) = taken else {
            // Its request timed out mid-packet and a newer one is pending.
            warn!(
                subject = %response.subject(),
                pending = ?self.correlator.pending_subject(),
                "dropping response to an expired request"
            );
            self.desyncs.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let result = match response {
            Response::Success { reply, .. } => Ok(reply),
            Response::Failure { subject, code } => Err(BoardError::Failure {
                subject,
                code,
                message: subject.failure_message(code),
            }),
        };
        if waiter.send(result).is_err() {
            debug!("requester went away before the response arrived");
        }
        self.settled = true;
    }

    fn on_protocol_error(&mut self, _error: ProtocolError) {
        self.desyncs.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daisy_protocol::EncodeError;

    struct Harness {
        board: Board,
        wire: mpsc::UnboundedReceiver<Bytes>,
        link: mpsc::UnboundedSender<LinkEvent>,
    }

    impl Harness {
        fn new(config: BoardConfig) -> Self {
            let (sink, wire) = mpsc::unbounded_channel::<Bytes>();
            let (link, link_rx) = mpsc::unbounded_channel();
            let board = Board::spawn(sink, link_rx, config);
            Self { board, wire, link }
        }

        fn feed(&self, bytes: &[u8]) {
            self.link
                .send(LinkEvent::Data(Bytes::copy_from_slice(bytes)))
                .unwrap();
        }

        async fn next_write(&mut self) -> Bytes {
            tokio::time::timeout(Duration::from_secs(1), self.wire.recv())
                .await
                .expect("nothing written")
                .expect("sink closed")
        }

        fn send(&self, request: Request) -> tokio::task::JoinHandle<Result<Reply>> {
            let board = self.board.clone();
            tokio::spawn(async move { board.request(request).await })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_waits_for_first_response() {
        let mut h = Harness::new(BoardConfig::default());

        let first = h.send(Request::SetRelay {
            relay_id: 3,
            state: true,
        });
        assert_eq!(h.next_write().await.as_ref(), &[0b0100_0001, 0b1100_0000]);

        let second = h.send(Request::GetDht { sensor_id: 1 });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.wire.try_recv().is_err(), "second request went out early");

        h.feed(&[0b1000_0000]);
        assert_eq!(first.await.unwrap().unwrap(), Reply::Done);

        assert_eq!(h.next_write().await.as_ref(), &[0b0101_0000, 0b1000_0000]);
        h.feed(&[0b1001_0101, 0b0101_0101, 0b0000_0000]);
        assert_eq!(
            second.await.unwrap().unwrap(),
            Reply::Dht {
                humidity: 42,
                temperature: 45.0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_response_rejects_and_releases_queue() {
        let mut h = Harness::new(BoardConfig::default());

        let first = h.send(Request::SetRelay {
            relay_id: 7,
            state: false,
        });
        h.next_write().await;
        let second = h.send(Request::GetRelay { relay_id: 5 });

        h.feed(&[0b1100_0000]);
        match first.await.unwrap() {
            Err(BoardError::Failure {
                subject,
                code,
                message,
            }) => {
                assert_eq!(subject, RequestSubject::SetRelay);
                assert_eq!(code, 0);
                assert_eq!(message, "Invalid relay ID.");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        assert_eq!(h.next_write().await.as_ref(), &[0b0100_0110, 0b1000_0000]);
        h.feed(&[0b1010_0000]);
        assert_eq!(second.await.unwrap().unwrap(), Reply::RelayState { on: true });
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_failure_message() {
        let mut h = Harness::new(BoardConfig::default());
        let pending = h.send(Request::GetSoilMoisture { sensor_id: 9 });
        h.next_write().await;
        h.feed(&[0b1100_0000]);

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "getSoilMoisture failed: Invalid sensor ID.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_response_is_counted_and_stream_continues() {
        let h = Harness::new(BoardConfig::default());
        let mut telemetry = h.board.subscribe();

        h.feed(&[0b1000_0000]);
        h.feed(&[0b0000_0000, 0b1010_0000, 0b0000_0000]);

        let event = tokio::time::timeout(Duration::from_secs(1), telemetry.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Telemetry::SoilMoisture {
                sensor_id: 2,
                moisture: 64
            }
        );
        assert_eq!(h.board.desync_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_discards_partial_packet() {
        let h = Harness::new(BoardConfig::default());
        let mut telemetry = h.board.subscribe();

        // First byte of a dht event, then the link drops.
        h.feed(&[0b0000_0110]);
        h.link.send(LinkEvent::Lost).unwrap();
        h.link.send(LinkEvent::Opened).unwrap();
        h.feed(&[0b0000_0000, 0b1010_0000, 0b0000_0000]);

        let event = telemetry.recv().await.unwrap();
        assert_eq!(event.sensor_id(), 2);
        assert_eq!(h.board.desync_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out() {
        let mut h = Harness::new(BoardConfig::default());

        let first = h.send(Request::GetRelay { relay_id: 1 });
        h.next_write().await;
        let second = h.send(Request::GetRelay { relay_id: 2 });

        match first.await.unwrap() {
            Err(BoardError::Timeout(after)) => assert_eq!(after, Duration::from_secs(10)),
            other => panic!("expected timeout, got {other:?}"),
        }

        assert_eq!(h.next_write().await.as_ref(), &[0b0100_0101, 0b0000_0000]);
        h.feed(&[0b1000_0000]);
        assert_eq!(second.await.unwrap().unwrap(), Reply::RelayState { on: false });
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_tail_does_not_settle_next_request() {
        let mut h = Harness::new(BoardConfig::default());

        let first = h.send(Request::GetDht { sensor_id: 1 });
        h.next_write().await;
        let second = h.send(Request::GetRelay { relay_id: 2 });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // First byte of the dht reply, then the deadline passes.
        h.feed(&[0b1001_0101]);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(matches!(first.await.unwrap(), Err(BoardError::Timeout(_))));
        assert_eq!(h.next_write().await.as_ref(), &[0b0100_0101, 0b0000_0000]);

        h.feed(&[0b0101_0101, 0b0000_0000]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!second.is_finished(), "getRelay settled by a dht reply");
        assert_eq!(h.board.desync_count(), 1);

        h.feed(&[0b1010_0000]);
        assert_eq!(second.await.unwrap().unwrap(), Reply::RelayState { on: true });
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_arguments_never_reach_the_wire() {
        let mut h = Harness::new(BoardConfig::default());

        let err = h
            .board
            .request(Request::SetRelay {
                relay_id: 9,
                state: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BoardError::Encode(EncodeError::OutOfRange { .. })
        ));

        let err = h
            .board
            .request_named("openValve", RequestArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BoardError::Encode(EncodeError::InvalidSubject(_))
        ));

        assert!(h.wire.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_named() {
        let mut h = Harness::new(BoardConfig::default());
        let board = h.board.clone();
        let pending = tokio::spawn(async move {
            board
                .request_named(
                    "toggleRelay",
                    RequestArgs {
                        id: Some(3),
                        state: None,
                    },
                )
                .await
        });

        assert_eq!(h.next_write().await.as_ref(), &[0b0100_1001, 0b1000_0000]);
        h.feed(&[0b1000_0000]);
        assert_eq!(pending.await.unwrap().unwrap(), Reply::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_outstanding_requests() {
        let mut h = Harness::new(BoardConfig {
            request_timeout: None,
            ..BoardConfig::default()
        });

        let first = h.send(Request::GetDs18b20 { sensor_id: 2 });
        h.next_write().await;
        let second = h.send(Request::GetDs18b20 { sensor_id: 3 });
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.board.shutdown().await;
        assert!(matches!(first.await.unwrap(), Err(BoardError::Closed)));
        assert!(matches!(second.await.unwrap(), Err(BoardError::Closed)));
        assert!(matches!(
            h.board.request(Request::GetDs18b20 { sensor_id: 0 }).await,
            Err(BoardError::Closed)
        ));
    }
}
