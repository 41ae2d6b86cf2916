//! Shared fixtures for the integration tests: a newline-delimited protocol,
//! a callback that records every event, and server/client helpers.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use seeker::error::{Result, ServerError};
use seeker::{ConnCallback, Connection, PacketReader, Protocol, Server, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One packet per `\n`-terminated line, newline included
pub struct LineProtocol;

#[async_trait]
impl Protocol for LineProtocol {
    type Packet = String;

    async fn read_packet(&self, reader: &mut PacketReader) -> Result<String> {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ServerError::UnexpectedEof);
        }
        Ok(line)
    }
}

pub type Conn = Arc<Connection<LineProtocol>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(u64),
    Message(u64, String),
    Close(u64),
}

/// Records every callback invocation.
///
/// - `on_connect` returns `accept` and publishes the connection on `conns`
/// - `on_message` echoes the line; `quit` closes, `panic` panics,
///   `slow` sleeps for `slow_for` before echoing
/// - `on_close` records the close, then panics if `panic_on_close` is set
pub struct Recorder {
    pub events: Mutex<Vec<Event>>,
    pub closes: AtomicUsize,
    pub accept: AtomicBool,
    pub panic_on_close: AtomicBool,
    pub slow_for: Duration,
    conns: mpsc::UnboundedSender<Conn>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Conn>) {
        Self::with_slow(Duration::from_millis(200))
    }

    pub fn with_slow(slow_for: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Conn>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Self {
            events: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            accept: AtomicBool::new(true),
            panic_on_close: AtomicBool::new(false),
            slow_for,
            conns: tx,
        });
        (recorder, rx)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn closes_for(&self, id: u64) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Close(id))
            .count()
    }

    pub fn messages_for(&self, id: u64) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Message(conn, line) if conn == id => Some(line),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ConnCallback<LineProtocol> for Recorder {
    async fn on_connect(&self, conn: &Conn) -> bool {
        self.push(Event::Connect(conn.id()));
        let _ = self.conns.send(Arc::clone(conn));
        self.accept.load(Ordering::SeqCst)
    }

    async fn on_message(&self, conn: &Conn, line: String) -> bool {
        self.push(Event::Message(conn.id(), line.clone()));
        match line.trim_end() {
            "quit" => false,
            "panic" => panic!("on_message asked to panic"),
            "slow" => {
                tokio::time::sleep(self.slow_for).await;
                self.push(Event::Message(conn.id(), "slow-done".into()));
                true
            }
            _ => conn.send(line, Duration::from_millis(500)).await.is_ok(),
        }
    }

    fn on_close(&self, conn: &Conn) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.push(Event::Close(conn.id()));
        if self.panic_on_close.load(Ordering::SeqCst) {
            panic!("on_close asked to panic");
        }
    }
}

/// Config with short deadlines where idle accept timeouts never end the server
pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".into(),
        accept_timeout: Duration::from_millis(50),
        accept_error_limit: 3,
        count_accept_timeouts: false,
        send_queue_limit: 8,
        receive_queue_limit: 8,
        ..ServerConfig::default()
    }
}

pub struct Running {
    pub server: Server<LineProtocol>,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<()>>,
}

/// Bind an ephemeral port and run the accept loop in the background
pub async fn spawn_server(config: ServerConfig, callback: Arc<Recorder>) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(config, callback, LineProtocol);
    let task = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });
    Running { server, addr, task }
}

pub struct Client {
    pub reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    pub writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::from_stream(TcpStream::connect(addr).await.unwrap())
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Next line, or `None` at end of stream. Panics after two seconds.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for the server");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

/// Poll `check` every 10ms until it holds, panicking after `limit`
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, check: F) {
    let deadline = tokio::time::Instant::now() + limit;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receive the next connection published by the recorder
pub async fn next_conn(conns: &mut mpsc::UnboundedReceiver<Conn>) -> Conn {
    tokio::time::timeout(Duration::from_secs(2), conns.recv())
        .await
        .expect("no connection within 2s")
        .expect("recorder dropped")
}
