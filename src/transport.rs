//! Byte transports carrying the Telnet stream
//!
//! A [`Transport`] opens a connection and hands back a [`TransportLink`]:
//! an outbound byte channel plus a receiver of [`TransportEvent`]s. Socket
//! I/O runs in background tasks; protocol logic never sees the socket.

use std::fmt;
use std::io;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

const READ_BUFFER_SIZE: usize = 4096;
const INBOUND_CAPACITY: usize = 64;

/// What the transport reports back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Data(Vec<u8>),
    Error(String),
    Closed,
}

/// Channels to and from one open connection
///
/// Writer tasks exit once the link, and with it the outbound sender, is
/// dropped, so queued bytes still reach the host.
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Option<mpsc::Receiver<TransportEvent>>,
    tasks: Vec<AbortHandle>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::Receiver<TransportEvent>,
        tasks: Vec<AbortHandle>,
    ) -> Self {
        Self {
            outbound,
            inbound: Some(inbound),
            tasks,
        }
    }

    /// Queue bytes for the host
    pub fn send(&self, bytes: Vec<u8>) -> io::Result<()> {
        self.outbound
            .send(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "transport writer closed"))
    }

    /// Inbound event receiver; available once
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.inbound.take()
    }

    /// Stop the reader tasks; no further events are delivered
    pub fn close(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLink")
            .field("tasks", &self.tasks.len())
            .field("inbound_taken", &self.inbound.is_none())
            .finish()
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.close();
    }
}

pub trait Transport: Send + Sync + fmt::Debug {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<TransportLink>>;
}

/// Plain TCP via tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<TransportLink>> {
        async move {
            log::debug!("connecting to {}:{}", host, port);
            let stream = TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;
            let (mut reader, mut writer) = stream.into_split();

            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

            let events = inbound_tx.clone();
            let read_task = tokio::spawn(async move {
                let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                loop {
                    match reader.read(&mut buffer).await {
                        Ok(0) => break,
                        Ok(n) => {
                            if events.send(TransportEvent::Data(buffer[..n].to_vec())).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            log::error!("socket read failed: {}", e);
                            let _ = events.send(TransportEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
                let _ = events.send(TransportEvent::Closed).await;
            });

            tokio::spawn(async move {
                while let Some(bytes) = outbound_rx.recv().await {
                    if let Err(e) = writer.write_all(&bytes).await {
                        log::error!("socket write failed: {}", e);
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
                let _ = writer.shutdown().await;
            });

            Ok(TransportLink::new(
                outbound_tx,
                inbound_rx,
                vec![read_task.abort_handle()],
            ))
        }
        .boxed()
    }
}

/// Host side of an in-memory connection made through [`ChannelTransport`]
#[derive(Debug)]
pub struct HostEnd {
    pub host: String,
    pub port: u16,
    to_client: mpsc::Sender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl HostEnd {
    /// Deliver a chunk to the client; false once the client went away
    pub async fn send(&self, bytes: &[u8]) -> bool {
        self.to_client
            .send(TransportEvent::Data(bytes.to_vec()))
            .await
            .is_ok()
    }

    pub async fn send_error(&self, message: &str) -> bool {
        self.to_client
            .send(TransportEvent::Error(message.to_string()))
            .await
            .is_ok()
    }

    /// Simulate the host closing the socket
    pub async fn close(&self) -> bool {
        self.to_client.send(TransportEvent::Closed).await.is_ok()
    }

    /// Next write from the client
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.try_recv().ok()
    }
}

/// In-memory transport; each connect hands a [`HostEnd`] to the test
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    hosts: mpsc::UnboundedSender<HostEnd>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEnd>) {
        let (hosts, accepted) = mpsc::unbounded_channel();
        (Self { hosts }, accepted)
    }
}

impl Transport for ChannelTransport {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<TransportLink>> {
        async move {
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
            let end = HostEnd {
                host: host.to_string(),
                port,
                to_client: inbound_tx,
                from_client: outbound_rx,
            };
            self.hosts.send(end).map_err(|_| {
                io::Error::new(io::ErrorKind::ConnectionRefused, "no host accepting connections")
            })?;
            Ok(TransportLink::new(outbound_tx, inbound_rx, Vec::new()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_channel_transport_round_trip() {
        let (transport, mut accepted) = ChannelTransport::new();
        let mut link = transport.connect("mainframe", 23).await.unwrap();
        let mut host = accepted.recv().await.unwrap();
        assert_eq!(host.host, "mainframe");

        link.send(vec![1, 2, 3]).unwrap();
        assert_eq!(host.recv().await, Some(vec![1, 2, 3]));

        let mut inbound = link.take_inbound().unwrap();
        assert!(link.take_inbound().is_none());
        assert!(host.send(&[0xFF]).await);
        assert_eq!(inbound.recv().await, Some(TransportEvent::Data(vec![0xFF])));
        assert!(host.close().await);
        assert_eq!(inbound.recv().await, Some(TransportEvent::Closed));
    }

    #[tokio::test]
    async fn test_channel_transport_refused_without_acceptor() {
        let (transport, accepted) = ChannelTransport::new();
        drop(accepted);
        let err = transport.connect("mainframe", 23).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_tcp_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[0xFF, 0xFD, 0x00]).await.unwrap();
            let mut buf = [0u8; 3];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut link = TcpTransport.connect("127.0.0.1", port).await.unwrap();
        let mut inbound = link.take_inbound().unwrap();
        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Data(vec![0xFF, 0xFD, 0x00]))
        );
        link.send(vec![0xFF, 0xFB, 0x00]).unwrap();
        assert_eq!(server.await.unwrap(), [0xFF, 0xFB, 0x00]);
        assert_eq!(inbound.recv().await, Some(TransportEvent::Closed));
    }
}
