//! Discovery transport: how two peers find each other by endpoint id and get
//! a byte stream between them.
//!
//! A host registers an endpoint with [`Transport::listen`] and receives
//! incoming streams from the returned [`Listener`]; dropping the listener
//! unregisters the endpoint. A joiner calls [`Transport::connect`] with the
//! same id. What flows over the stream is the business of
//! [`crate::session`].
//!
//! Implementations:
//! - [`memory::MemoryTransport`] - in-process registry, for tests and demos
//! - [`rendezvous::RendezvousTransport`] - TCP client for the relay served by
//!   [`rendezvous::RendezvousServer`]

pub mod memory;
pub mod rendezvous;

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use derive_more::{Display, Error};
use tokio::io::{AsyncRead, AsyncWrite};

pub use memory::MemoryTransport;
pub use rendezvous::{RendezvousServer, RendezvousTransport};

/// Anything a peer connection can run over.
pub trait PeerIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PeerIo for T {}

/// An established bidirectional byte stream to the other peer.
pub struct PeerStream(Box<dyn PeerIo>);

impl PeerStream {
    pub fn new(io: impl PeerIo + 'static) -> Self {
        Self(Box::new(io))
    }

    pub fn into_inner(self) -> Box<dyn PeerIo> {
        self.0
    }
}

impl fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PeerStream")
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Register `endpoint` as discoverable.
    ///
    /// Fails with [`TransportError::AddressInUse`] if someone else holds it.
    async fn listen(&self, endpoint: &str) -> Result<Box<dyn Listener>, TransportError>;

    /// Open a stream to whoever listens on `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<PeerStream, TransportError>;
}

#[async_trait]
pub trait Listener: Send {
    /// Wait for the next incoming stream.
    async fn accept(&mut self) -> Result<PeerStream, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransportError {
    #[display("endpoint {endpoint} is already registered")]
    AddressInUse { endpoint: String },
    #[display("no peer is listening on {endpoint}")]
    PeerUnavailable { endpoint: String },
    #[display("listener for {endpoint} was closed")]
    ListenerClosed { endpoint: String },
    #[display("rendezvous protocol error: {message}")]
    Protocol { message: String },
    #[display("i/o error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io {
            message: err.to_string(),
        }
    }
}

/// Lock a registry mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
