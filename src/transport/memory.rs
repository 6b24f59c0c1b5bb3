//! In-process transport. Clones share one registry, so two sessions built
//! from clones of the same [`MemoryTransport`] can find each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Listener, PeerStream, Transport, TransportError, lock};

/// Per-direction buffer of each in-memory stream.
const STREAM_BUFFER: usize = 64 * 1024;

type Registry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<DuplexStream>>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    registry: Registry,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live listener currently holds `endpoint`.
    pub fn is_registered(&self, endpoint: &str) -> bool {
        lock(&self.registry)
            .get(endpoint)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self, endpoint: &str) -> Result<Box<dyn Listener>, TransportError> {
        let mut registry = lock(&self.registry);
        if registry.get(endpoint).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::AddressInUse {
                endpoint: endpoint.to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(endpoint.to_string(), tx);
        debug!(endpoint, "Registered in-memory endpoint");

        Ok(Box::new(MemoryListener {
            endpoint: endpoint.to_string(),
            incoming: rx,
            registry: Arc::clone(&self.registry),
        }))
    }

    async fn connect(&self, endpoint: &str) -> Result<PeerStream, TransportError> {
        let unavailable = || TransportError::PeerUnavailable {
            endpoint: endpoint.to_string(),
        };
        let host = lock(&self.registry).get(endpoint).cloned().ok_or_else(unavailable)?;

        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        host.send(remote).map_err(|_| unavailable())?;
        Ok(PeerStream::new(local))
    }
}

struct MemoryListener {
    endpoint: String,
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
    registry: Registry,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&mut self) -> Result<PeerStream, TransportError> {
        match self.incoming.recv().await {
            Some(stream) => Ok(PeerStream::new(stream)),
            None => Err(TransportError::ListenerClosed {
                endpoint: self.endpoint.clone(),
            }),
        }
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.incoming.close();
        let mut registry = lock(&self.registry);
        // Only remove the entry if it is still ours (closed), not a newer listener's.
        if registry.get(&self.endpoint).is_some_and(|tx| tx.is_closed()) {
            registry.remove(&self.endpoint);
            debug!(endpoint = %self.endpoint, "Unregistered in-memory endpoint");
        }
    }
}
