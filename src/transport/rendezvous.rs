//! TCP rendezvous: a small relay that lets a joiner reach a host by endpoint
//! id, plus the client side implementing [`Transport`].
//!
//! Handshake lines (newline-terminated, client to relay unless noted):
//!
//! - `LISTEN <id>`: register as host. Relay replies `OK` or `ERR in-use` and
//!   keeps this control connection open; closing it unregisters `<id>`.
//! - relay to host, on the control connection: `INCOMING <ticket>` when a
//!   joiner arrives.
//! - `ACCEPT <ticket>`: host opens a fresh connection for that joiner. The
//!   relay splices it with the joiner and forwards bytes both ways.
//! - `CONNECT <id>`: join. Relay replies `OK` once the host accepted, or
//!   `ERR unavailable`.
//!
//! Game traffic after the handshake is never inspected by the relay.
//! Handshake lines are read one byte at a time so that no game bytes get
//! buffered away before a stream is handed to the session.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Listener, PeerStream, Transport, TransportError, lock};
use crate::constants::MAX_HANDSHAKE_LINE;

const REPLY_OK: &str = "OK";
const REPLY_IN_USE: &str = "ERR in-use";
const REPLY_UNAVAILABLE: &str = "ERR unavailable";
const REPLY_BAD_REQUEST: &str = "ERR bad-request";

/// Read one handshake line without buffering past its newline.
///
/// Returns `None` if the stream ends before any byte is read.
async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Err(e) => return Err(e),
        };
        if byte == b'\n' {
            break;
        }
        if buf.len() >= MAX_HANDSHAKE_LINE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "handshake line too long",
            ));
        }
        buf.push(byte);
    }
    let line = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(line.trim_end_matches('\r').to_string()))
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(format!("{line}\n").as_bytes()).await?;
    writer.flush().await
}

// =============================================================================
// Client
// =============================================================================

/// [`Transport`] backed by a [`RendezvousServer`] at `addr`.
#[derive(Debug, Clone)]
pub struct RendezvousTransport {
    addr: String,
}

impl RendezvousTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn dial(&self) -> Result<TcpStream, TransportError> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

fn unexpected(reply: Option<String>) -> TransportError {
    TransportError::Protocol {
        message: match reply {
            Some(line) => format!("unexpected reply {line:?}"),
            None => "relay closed the connection".to_string(),
        },
    }
}

#[async_trait]
impl Transport for RendezvousTransport {
    async fn listen(&self, endpoint: &str) -> Result<Box<dyn Listener>, TransportError> {
        let mut control = self.dial().await?;
        write_line(&mut control, &format!("LISTEN {endpoint}")).await?;

        match read_line(&mut control).await? {
            Some(reply) if reply == REPLY_OK => {
                debug!(endpoint, addr = %self.addr, "Registered with rendezvous");
                Ok(Box::new(RendezvousListener {
                    addr: self.addr.clone(),
                    endpoint: endpoint.to_string(),
                    control,
                }))
            }
            Some(reply) if reply == REPLY_IN_USE => Err(TransportError::AddressInUse {
                endpoint: endpoint.to_string(),
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn connect(&self, endpoint: &str) -> Result<PeerStream, TransportError> {
        let mut stream = self.dial().await?;
        write_line(&mut stream, &format!("CONNECT {endpoint}")).await?;

        match read_line(&mut stream).await? {
            Some(reply) if reply == REPLY_OK => Ok(PeerStream::new(stream)),
            Some(reply) if reply == REPLY_UNAVAILABLE => Err(TransportError::PeerUnavailable {
                endpoint: endpoint.to_string(),
            }),
            // The relay drops a parked joiner when the host goes away.
            None => Err(TransportError::PeerUnavailable {
                endpoint: endpoint.to_string(),
            }),
            other => Err(unexpected(other)),
        }
    }
}

struct RendezvousListener {
    addr: String,
    endpoint: String,
    control: TcpStream,
}

#[async_trait]
impl Listener for RendezvousListener {
    async fn accept(&mut self) -> Result<PeerStream, TransportError> {
        loop {
            let Some(line) = read_line(&mut self.control).await? else {
                return Err(TransportError::ListenerClosed {
                    endpoint: self.endpoint.clone(),
                });
            };
            let Some(ticket) = line.strip_prefix("INCOMING ") else {
                warn!(line, "Ignoring unexpected rendezvous line");
                continue;
            };

            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.set_nodelay(true)?;
            write_line(&mut stream, &format!("ACCEPT {ticket}")).await?;
            return Ok(PeerStream::new(stream));
        }
    }
}

// =============================================================================
// Relay
// =============================================================================

struct Parked {
    endpoint: String,
    joiner: TcpStream,
}

#[derive(Default)]
struct Relay {
    hosts: Mutex<HashMap<String, mpsc::UnboundedSender<u64>>>,
    parked: Mutex<HashMap<u64, Parked>>,
    next_ticket: AtomicU64,
}

/// The rendezvous relay.
pub struct RendezvousServer {
    listener: TcpListener,
    relay: Arc<Relay>,
}

impl RendezvousServer {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            relay: Arc::new(Relay::default()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until the listener fails.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "Rendezvous relay listening");
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let relay = Arc::clone(&self.relay);
            tokio::spawn(async move {
                if let Err(e) = relay.handle(socket).await {
                    debug!(%peer, error = %e, "Rendezvous connection ended with error");
                }
            });
        }
    }
}

impl Relay {
    async fn handle(&self, mut socket: TcpStream) -> io::Result<()> {
        socket.set_nodelay(true)?;
        let Some(line) = read_line(&mut socket).await? else {
            return Ok(());
        };
        let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let arg = arg.trim().to_string();
        if arg.is_empty() {
            return write_line(&mut socket, REPLY_BAD_REQUEST).await;
        }

        match verb {
            "LISTEN" => self.serve_host(arg, socket).await,
            "CONNECT" => self.park_joiner(arg, socket).await,
            "ACCEPT" => self.splice(&arg, socket).await,
            _ => write_line(&mut socket, REPLY_BAD_REQUEST).await,
        }
    }

    async fn serve_host(&self, endpoint: String, mut control: TcpStream) -> io::Result<()> {
        let (tx, mut tickets) = mpsc::unbounded_channel();
        let registered = {
            let mut hosts = lock(&self.hosts);
            if hosts.get(&endpoint).is_some_and(|h| !h.is_closed()) {
                false
            } else {
                hosts.insert(endpoint.clone(), tx);
                true
            }
        };
        if !registered {
            debug!(endpoint, "Rejecting duplicate registration");
            return write_line(&mut control, REPLY_IN_USE).await;
        }
        info!(endpoint, "Host registered");

        let result = self.host_loop(&mut control, &mut tickets).await;
        self.unregister(&endpoint);
        result
    }

    async fn host_loop(
        &self,
        control: &mut TcpStream,
        tickets: &mut mpsc::UnboundedReceiver<u64>,
    ) -> io::Result<()> {
        write_line(control, REPLY_OK).await?;
        let mut scratch = [0u8; 64];
        loop {
            tokio::select! {
                ticket = tickets.recv() => match ticket {
                    Some(ticket) => write_line(control, &format!("INCOMING {ticket}")).await?,
                    None => return Ok(()),
                },
                read = control.read(&mut scratch) => match read {
                    Ok(0) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(e),
                },
            }
        }
    }

    fn unregister(&self, endpoint: &str) {
        lock(&self.hosts).remove(endpoint);
        lock(&self.parked).retain(|_, parked| parked.endpoint != endpoint);
        info!(endpoint, "Host unregistered");
    }

    async fn park_joiner(&self, endpoint: String, mut joiner: TcpStream) -> io::Result<()> {
        let host = lock(&self.hosts).get(&endpoint).cloned();
        let Some(host) = host else {
            debug!(endpoint, "Joiner asked for unknown endpoint");
            return write_line(&mut joiner, REPLY_UNAVAILABLE).await;
        };

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        lock(&self.parked).insert(ticket, Parked { endpoint, joiner });
        if host.send(ticket).is_err() {
            let parked = lock(&self.parked).remove(&ticket);
            if let Some(mut parked) = parked {
                write_line(&mut parked.joiner, REPLY_UNAVAILABLE).await?;
            }
        }
        Ok(())
    }

    async fn splice(&self, ticket: &str, mut host: TcpStream) -> io::Result<()> {
        let parked = ticket
            .parse::<u64>()
            .ok()
            .and_then(|ticket| lock(&self.parked).remove(&ticket));
        let Some(Parked {
            endpoint,
            mut joiner,
        }) = parked
        else {
            debug!(ticket, "Accept for unknown ticket");
            return Ok(());
        };

        write_line(&mut joiner, REPLY_OK).await?;
        debug!(endpoint, "Peers spliced");
        match tokio::io::copy_bidirectional(&mut host, &mut joiner).await {
            Ok((up, down)) => debug!(endpoint, up, down, "Splice finished"),
            Err(e) => debug!(endpoint, error = %e, "Splice ended with error"),
        }
        Ok(())
    }
}
