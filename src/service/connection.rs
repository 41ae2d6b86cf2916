//! # Connection
//!
//! One accepted stream and the three tasks that serve it.
//!
//! ## Tasks
//! - **reader**: pulls packets through the [`Protocol`] into the inbound queue
//! - **writer**: drains the outbound queue onto the socket
//! - **dispatcher**: drains the inbound queue into [`ConnCallback::on_message`]
//!
//! Both queues are bounded. A full inbound queue parks the reader, which stops
//! reading from the socket until the dispatcher catches up. A full outbound
//! queue is reported to the sender as [`ServerError::SendBufferFull`].
//!
//! ## Close Path
//! Every task calls [`Connection::close`] on its way out, and so may the
//! application. A compare-and-swap on the state elects one caller, which then
//! cancels the close token, drops the queue senders, shuts the socket down and
//! finally runs `on_close`, in that order.
//!
//! [`ConnCallback::on_message`]: crate::service::callback::ConnCallback::on_message

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream as StdTcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, Instrument};

use crate::core::packet::Packet;
use crate::core::protocol::{PacketReader, Protocol};
use crate::error::{constants, Result, ServerError};
use crate::service::server::Server;

type PacketOf<P> = <P as Protocol>::Packet;
type ExtraData = Arc<dyn Any + Send + Sync>;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle of a connection. Moves forward only, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Teardown is running
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_OPEN => ConnectionState::Open,
            STATE_CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TaskKind {
    Reader,
    Writer,
    Dispatcher,
}

impl TaskKind {
    fn as_str(self) -> &'static str {
        match self {
            TaskKind::Reader => "reader",
            TaskKind::Writer => "writer",
            TaskKind::Dispatcher => "dispatcher",
        }
    }
}

/// Stream halves and queue receivers, moved into the tasks by `handle`
pub(crate) struct ConnectionIo<P: Protocol> {
    reader: PacketReader,
    writer: OwnedWriteHalf,
    outbound_rx: mpsc::Receiver<PacketOf<P>>,
    inbound_rx: mpsc::Receiver<PacketOf<P>>,
}

/// A live client connection
pub struct Connection<P: Protocol> {
    id: u64,
    server: Server<P>,
    /// Second handle on the socket, kept so `close` can shut it down while
    /// the tasks still own the tokio halves.
    raw: StdTcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: AtomicU8,
    closed: CancellationToken,
    outbound: Mutex<Option<mpsc::Sender<PacketOf<P>>>>,
    inbound: Mutex<Option<mpsc::Sender<PacketOf<P>>>>,
    extra: Mutex<Option<ExtraData>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: Protocol> Connection<P> {
    pub(crate) fn new(
        id: u64,
        stream: TcpStream,
        server: Server<P>,
    ) -> io::Result<(Arc<Self>, ConnectionIo<P>)> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        let std_stream = stream.into_std()?;
        let raw = std_stream.try_clone()?;
        let (read_half, write_half) = TcpStream::from_std(std_stream)?.into_split();

        // mpsc::channel panics on a zero capacity
        let config = server.config();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_limit.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.receive_queue_limit.max(1));

        let conn = Arc::new(Self {
            id,
            server,
            raw,
            peer_addr,
            local_addr,
            state: AtomicU8::new(STATE_OPEN),
            closed: CancellationToken::new(),
            outbound: Mutex::new(Some(outbound_tx)),
            inbound: Mutex::new(Some(inbound_tx)),
            extra: Mutex::new(None),
        });

        let io = ConnectionIo {
            reader: BufReader::new(read_half),
            writer: write_half,
            outbound_rx,
            inbound_rx,
        };

        Ok((conn, io))
    }

    /// Server-unique id, assigned in accept order starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Raw socket handle for transport-level operations the server does not
    /// cover, such as socket options.
    ///
    /// Reading or writing through it bypasses the protocol and the queues.
    /// After close the socket is shut down but this descriptor stays open
    /// until the last `Arc<Connection>` is dropped, so applications should
    /// not hold connections past `on_close`.
    pub fn raw_stream(&self) -> &StdTcpStream {
        &self.raw
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// True once the close path has started
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_OPEN
    }

    /// Attach application data, replacing any previous value
    pub fn set_extra_data<T: Any + Send + Sync>(&self, data: T) {
        *lock(&self.extra) = Some(Arc::new(data));
    }

    /// Application data previously attached, if it has type `T`
    pub fn extra_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = lock(&self.extra).clone()?;
        data.downcast::<T>().ok()
    }

    pub fn clear_extra_data(&self) {
        lock(&self.extra).take();
    }

    /// Queue a packet for the writer.
    ///
    /// A zero `timeout` never waits: a full queue fails at once with
    /// [`ServerError::SendBufferFull`]. Otherwise the call waits up to
    /// `timeout` for room, failing with `SendBufferFull` when the time runs
    /// out or [`ServerError::ConnectionClosed`] if the connection closes first.
    pub async fn send(&self, packet: PacketOf<P>, timeout: Duration) -> Result<()> {
        let tx = self.outbound_sender()?;
        if timeout.is_zero() {
            return self.offer(&tx, packet);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ServerError::ConnectionClosed),
            sent = tokio::time::timeout(timeout, tx.send(packet)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ServerError::ConnectionClosed),
                Err(_) => {
                    self.server.metrics().send_rejected();
                    Err(ServerError::SendBufferFull)
                }
            },
        }
    }

    /// Non-blocking send, the same as `send(packet, Duration::ZERO)`
    pub fn try_send(&self, packet: PacketOf<P>) -> Result<()> {
        let tx = self.outbound_sender()?;
        self.offer(&tx, packet)
    }

    fn offer(&self, tx: &mpsc::Sender<PacketOf<P>>, packet: PacketOf<P>) -> Result<()> {
        match tx.try_send(packet) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.server.metrics().send_rejected();
                Err(ServerError::SendBufferFull)
            }
            Err(TrySendError::Closed(_)) => Err(ServerError::ConnectionClosed),
        }
    }

    fn outbound_sender(&self) -> Result<mpsc::Sender<PacketOf<P>>> {
        if self.is_closed() {
            return Err(ServerError::ConnectionClosed);
        }
        lock(&self.outbound)
            .clone()
            .ok_or(ServerError::ConnectionClosed)
    }

    fn inbound_sender(&self) -> Option<mpsc::Sender<PacketOf<P>>> {
        lock(&self.inbound).clone()
    }

    /// Close the connection. Safe to call any number of times from any task;
    /// only the first call does anything.
    pub fn close(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.closed.cancel();
        self.release();
        self.server.metrics().connection_closed();

        let callback = self.server.callback();
        if panic::catch_unwind(AssertUnwindSafe(|| callback.on_close(self))).is_err() {
            self.server.metrics().task_panicked();
            error!(conn_id = self.id, "on_close panicked");
        }

        self.state.store(STATE_CLOSED, Ordering::Release);
        debug!(conn_id = self.id, peer = %self.peer_addr, "Connection closed");
    }

    /// Tear down a connection refused by `on_connect`; `on_close` is skipped
    fn abort(&self) {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.closed.cancel();
        self.release();
    }

    /// Close both queues, then the socket
    fn release(&self) {
        lock(&self.outbound).take();
        lock(&self.inbound).take();

        if let Err(e) = self.raw.shutdown(Shutdown::Both) {
            // the peer may already have reset the connection
            if e.kind() != io::ErrorKind::NotConnected {
                debug!(conn_id = self.id, error = %e, "Socket shutdown failed");
            }
        }
    }

    /// Run `on_connect`, then start the task triad
    #[instrument(skip_all, fields(conn_id = self.id, peer = %self.peer_addr))]
    pub(crate) async fn handle(self: Arc<Self>, io: ConnectionIo<P>) {
        let callback = self.server.callback();
        let accepted = AssertUnwindSafe(callback.on_connect(&self))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                self.server.metrics().task_panicked();
                error!("on_connect panicked, dropping connection");
                false
            });

        if !accepted {
            debug!("Connection refused by on_connect");
            self.server.metrics().connection_rejected();
            self.abort();
            return;
        }

        let ConnectionIo {
            reader,
            writer,
            outbound_rx,
            inbound_rx,
        } = io;

        let tracker = self.server.tracker();
        tracker.spawn(
            supervise(
                self.clone(),
                TaskKind::Dispatcher,
                self.clone().dispatch_loop(inbound_rx),
            )
            .in_current_span(),
        );
        tracker.spawn(
            supervise(self.clone(), TaskKind::Reader, self.clone().read_loop(reader))
                .in_current_span(),
        );
        tracker.spawn(
            supervise(
                self.clone(),
                TaskKind::Writer,
                self.clone().write_loop(writer, outbound_rx),
            )
            .in_current_span(),
        );
    }

    async fn read_loop(self: Arc<Self>, mut reader: PacketReader) {
        let shutdown = self.server.shutdown_token();
        let protocol = self.server.protocol();

        loop {
            if shutdown.is_cancelled() || self.closed.is_cancelled() {
                return;
            }

            let packet = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.closed.cancelled() => return,
                read = protocol.read_packet(&mut reader) => match read {
                    Ok(packet) => packet,
                    Err(e) => {
                        debug!(error = %e, "Read failed");
                        return;
                    }
                },
            };
            self.server.metrics().packet_received();

            let Some(tx) = self.inbound_sender() else {
                return;
            };

            // park here while the dispatcher is behind, but never past a close
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.closed.cancelled() => return,
                sent = tx.send(packet) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::Receiver<PacketOf<P>>,
    ) {
        let shutdown = self.server.shutdown_token();

        loop {
            let packet = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.closed.cancelled() => return,
                next = outbound.recv() => match next {
                    Some(packet) => packet,
                    None => return,
                },
            };

            // queued just before the close won the race
            if self.is_closed() {
                return;
            }

            let bytes = packet.to_bytes();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.closed.cancelled() => return,
                written = writer.write_all(&bytes) => {
                    if let Err(e) = written {
                        debug!(error = %e, "Write failed");
                        return;
                    }
                }
            }
            self.server.metrics().packet_sent(bytes.len() as u64);
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut inbound: mpsc::Receiver<PacketOf<P>>) {
        let shutdown = self.server.shutdown_token();
        let callback = self.server.callback();

        loop {
            let packet = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.closed.cancelled() => return,
                next = inbound.recv() => match next {
                    Some(packet) => packet,
                    None => return,
                },
            };

            if self.is_closed() {
                return;
            }

            if !callback.on_message(&self, packet).await {
                debug!("on_message asked to close the connection");
                return;
            }
        }
    }
}

/// Fault barrier around one connection task. Whatever way the task ends,
/// the connection is closed afterwards.
async fn supervise<P, F>(conn: Arc<Connection<P>>, task: TaskKind, body: F)
where
    P: Protocol,
    F: Future<Output = ()> + Send,
{
    if AssertUnwindSafe(body).catch_unwind().await.is_err() {
        conn.server.metrics().task_panicked();
        error!(task = task.as_str(), "{}", constants::ERR_TASK_PANICKED);
    }

    trace!(task = task.as_str(), "Connection task exited");
    conn.close();
}

impl<P: Protocol> fmt::Debug for Connection<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .finish()
    }
}
