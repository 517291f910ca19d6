//! A single DNS-over-TLS connection.
//!
//! The socket owns a driver task that performs the TCP connect and TLS
//! handshake, then pumps length-prefixed frames in both directions.
//! Observers receive frames through an event channel; the channel
//! delivers exactly one terminal [`SocketEvent::Closed`].
//!
//! Teardown is prompt: dropping the socket (or calling `shutdown`)
//! aborts an in-flight handshake through a cancellation channel rather
//! than waiting out the handshake timeout.

use crate::identity::DotServerConfig;
use crate::tls;
use crate::{Result, TransportError};
use bytes::Bytes;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Lifecycle of a socket. Transitions are monotonic; `Closed` is
/// terminal and the socket is inert once it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketState {
    /// Created, driver not yet connecting.
    Initializing = 0,
    /// TCP connect / TLS handshake in flight.
    Handshaking = 1,
    /// Ready to carry queries.
    Connected = 2,
    /// Torn down; no further events will be emitted after `Closed`.
    Closed = 3,
}

impl SocketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initializing,
            1 => Self::Handshaking,
            2 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

/// Events emitted by the driver task.
#[derive(Debug)]
pub enum SocketEvent {
    /// One response frame (raw DNS message, prefix stripped).
    Response(Bytes),
    /// Terminal: the connection is gone. Emitted exactly once.
    Closed,
}

/// Handle to one TLS connection.
pub struct DotSocket {
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: watch::Sender<bool>,
    state: Arc<AtomicU8>,
}

impl DotSocket {
    /// Starts connecting to `config.addr` with the given socket mark.
    /// Events are delivered on `events`; queries sent before the
    /// handshake completes are queued and flushed once connected.
    pub fn connect(
        config: DotServerConfig,
        mark: u32,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Arc::new(AtomicU8::new(SocketState::Initializing as u8));

        tokio::spawn(run(
            config,
            mark,
            events,
            outbound_rx,
            cancel_rx,
            state.clone(),
        ));

        Self {
            outbound: outbound_tx,
            cancel: cancel_tx,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SocketState {
        SocketState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Enqueues one DNS message (no length prefix; framing is applied
    /// on the wire). Returns false once the socket is closed.
    pub fn query(&self, message: Bytes) -> bool {
        self.outbound.send(message).is_ok()
    }

    /// Requests teardown. Idempotent; the terminal `Closed` event
    /// still fires.
    pub fn shutdown(&self) {
        let _ = self.cancel.send(true);
    }
}

// Dropping the handle drops the cancellation sender, which the driver
// observes immediately, aborting even a blocked handshake.

async fn run(
    config: DotServerConfig,
    mark: u32,
    events: mpsc::UnboundedSender<SocketEvent>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    mut cancel: watch::Receiver<bool>,
    state: Arc<AtomicU8>,
) {
    state.store(SocketState::Handshaking as u8, Ordering::Release);

    let established = tokio::select! {
        _ = cancel.changed() => {
            trace!(server = %config.addr, "handshake cancelled");
            None
        }
        result = timeout(config.connect_timeout, establish(&config, mark)) => match result {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(e)) => {
                debug!(server = %config.addr, error = %e, "connection failed");
                None
            }
            Err(_) => {
                debug!(server = %config.addr, "connection timed out");
                None
            }
        },
    };

    let stream = match established {
        Some(stream) => stream,
        None => {
            state.store(SocketState::Closed as u8, Ordering::Release);
            let _ = events.send(SocketEvent::Closed);
            return;
        }
    };

    state.store(SocketState::Connected as u8, Ordering::Release);
    trace!(server = %config.addr, "connected");

    let (mut reader, writer) = tokio::io::split(stream);
    let writer_task = tokio::spawn(write_loop(writer, outbound, cancel.clone()));

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            frame = read_frame(&mut reader) => match frame {
                Ok(bytes) => {
                    if events.send(SocketEvent::Response(bytes)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    trace!(server = %config.addr, error = %e, "read side closed");
                    break;
                }
            },
        }
    }

    writer_task.abort();
    state.store(SocketState::Closed as u8, Ordering::Release);
    let _ = events.send(SocketEvent::Closed);
}

async fn establish(config: &DotServerConfig, mark: u32) -> Result<TlsStream<TcpStream>> {
    let socket = if config.addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    apply_mark(&socket, mark)?;

    let tcp = socket.connect(config.addr).await?;
    let _ = tcp.set_nodelay(true);

    let tls_config = tls::client_config(config)?;
    let name = tls::server_name(config)?;
    TlsConnector::from(tls_config)
        .connect(name, tcp)
        .await
        .map_err(|e| TransportError::Handshake {
            server: config.addr.to_string(),
            reason: e.to_string(),
        })
}

/// Tags the socket with the network's routing mark before any traffic
/// leaves it.
#[cfg(target_os = "linux")]
fn apply_mark(socket: &TcpSocket, mark: u32) -> Result<()> {
    if mark != 0 {
        socket2::SockRef::from(socket).set_mark(mark)?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn apply_mark(_socket: &TcpSocket, _mark: u32) -> Result<()> {
    Ok(())
}

async fn write_loop(
    mut writer: WriteHalf<TlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            message = outbound.recv() => match message {
                None => break,
                Some(bytes) => {
                    if write_frame(&mut writer, &bytes).await.is_err() {
                        break;
                    }
                }
            },
        }
    }
    let _ = writer.shutdown().await;
}

/// Reads one length-prefixed DNS message (RFC 7858 framing).
async fn read_frame(
    reader: &mut ReadHalf<TlsStream<TcpStream>>,
) -> std::io::Result<Bytes> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await?;
    let len = usize::from(u16::from_be_bytes(len_buf));
    if len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "zero-length frame",
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

async fn write_frame(
    writer: &mut WriteHalf<TlsStream<TcpStream>>,
    message: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&(message.len() as u16).to_be_bytes()).await?;
    writer.write_all(message).await?;
    writer.flush().await
}
