//! TCP and UDP receive loops
//!
//! Each transport decodes packets on the async side and hands them to one
//! blocking worker, so messages of a transport are dispatched one at a time
//! in arrival order. TCP packets carry a big-endian `u32` length prefix.
//!
//! The worker queues are bounded. A full queue stops TCP reads until the
//! worker catches up; UDP datagrams that find it full are dropped.

use crate::config::HostConfig;
use crate::control::{Dispatcher, Transport};
use rosc::OscPacket;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Largest TCP frame accepted before the connection is dropped
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Packets waiting for a transport's worker
pub const QUEUE_LEN: usize = 256;

const UDP_BUFFER_LEN: usize = 65536;

/// Decode one OSC packet, logging failures
fn decode_packet(bytes: &[u8], transport: Transport, peer: SocketAddr) -> Option<OscPacket> {
    match rosc::decoder::decode_udp(bytes) {
        Ok((_, packet)) => Some(packet),
        Err(e) => {
            warn!("Failed to decode {} packet from {}: {:?}", transport, peer, e);
            None
        }
    }
}

/// Drain a queue on a blocking thread, dispatching packets in order
fn spawn_worker(
    dispatcher: Arc<Dispatcher>,
    transport: Transport,
    mut rx: mpsc::Receiver<OscPacket>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(packet) = rx.blocking_recv() {
            dispatcher.handle_packet(transport, &packet);
        }
        debug!("{} worker finished", transport);
    })
}

/// Listeners bound to their ports, ready to run
pub struct ControlServer {
    dispatcher: Arc<Dispatcher>,
    tcp: Option<TcpListener>,
    udp: Option<UdpSocket>,
}

impl ControlServer {
    /// Bind the enabled listeners on all interfaces
    pub async fn bind(dispatcher: Arc<Dispatcher>, config: &HostConfig) -> io::Result<Self> {
        let tcp = if config.tcp.enabled {
            let listener =
                TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.tcp.bind_port())).await?;
            info!("TCP control listener on {}", listener.local_addr()?);
            Some(listener)
        } else {
            None
        };

        let udp = if config.udp.enabled {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.udp.bind_port())).await?;
            info!("UDP control listener on {}", socket.local_addr()?);
            Some(socket)
        } else {
            None
        };

        Ok(Self {
            dispatcher,
            tcp,
            udp,
        })
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Serve until a listener fails
    pub async fn run(self) -> io::Result<()> {
        let Self {
            dispatcher,
            tcp,
            udp,
        } = self;

        let tcp_dispatcher = dispatcher.clone();
        let tcp = async move {
            match tcp {
                Some(listener) => tcp_loop(listener, tcp_dispatcher).await,
                None => Ok(()),
            }
        };
        let udp = async move {
            match udp {
                Some(socket) => udp_loop(socket, dispatcher).await,
                None => Ok(()),
            }
        };
        until_first_failure(tcp, udp).await
    }
}

/// Drive both loops together, returning as soon as either fails
async fn until_first_failure<T, U>(tcp: T, udp: U) -> io::Result<()>
where
    T: Future<Output = io::Result<()>>,
    U: Future<Output = io::Result<()>>,
{
    tokio::try_join!(tcp, udp).map(|_| ())
}

/// Queue a datagram for the worker, dropping it if the worker is behind
fn enqueue_datagram(
    tx: &mpsc::Sender<OscPacket>,
    packet: OscPacket,
    peer: SocketAddr,
) -> io::Result<()> {
    match tx.try_send(packet) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            warn!("UDP queue full, dropping packet from {}", peer);
            Ok(())
        }
        Err(TrySendError::Closed(_)) => Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "UDP worker stopped",
        )),
    }
}

async fn udp_loop(socket: UdpSocket, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    let (tx, rx) = mpsc::channel(QUEUE_LEN);
    let _worker = spawn_worker(dispatcher, Transport::Udp, rx);
    let mut buf = vec![0u8; UDP_BUFFER_LEN];

    loop {
        let (size, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // Port-unreachable and friends surface here on some platforms
                error!("UDP receive error: {}", e);
                continue;
            }
        };
        debug!("Received {} bytes from {}", size, peer);

        if let Some(packet) = decode_packet(&buf[..size], Transport::Udp, peer) {
            enqueue_datagram(&tx, packet, peer)?;
        }
    }
}

async fn tcp_loop(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    let (tx, rx) = mpsc::channel(QUEUE_LEN);
    let _worker = spawn_worker(dispatcher, Transport::Tcp, rx);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("TCP connection from {}", peer);

        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = read_frames(stream, peer, tx).await {
                debug!("TCP connection from {} closed: {}", peer, e);
            } else {
                info!("TCP connection from {} closed", peer);
            }
        });
    }
}

/// Read length-prefixed packets until the peer hangs up
///
/// Waits for queue space before reading the next frame, so a busy worker
/// pushes back on the sender through TCP flow control.
async fn read_frames<R: AsyncRead + Unpin>(
    mut stream: R,
    peer: SocketAddr,
    tx: mpsc::Sender<OscPacket>,
) -> io::Result<()> {
    let mut frame = Vec::new();

    loop {
        let mut header = [0u8; 4];
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds limit", len),
            ));
        }

        frame.resize(len, 0);
        stream.read_exact(&mut frame).await?;

        if let Some(packet) = decode_packet(&frame, Transport::Tcp, peer) {
            if tx.send(packet).await.is_err() {
                return Ok(());
            }
        }
    }
}
