// TCP transport.
//
// Architecture: thread-per-reader, one thread per live connection.
//
// - **Accept thread**: polls a non-blocking `TcpListener`, checking the
//   `keep_running` flag between polls. Each accepted socket gets its own
//   thread, which first reads the dialler's `Hello` frame (bounded by
//   `HANDSHAKE_TIMEOUT`) and then becomes that link's reader.
// - **Reader threads** (one per link, either direction): `read_frame` in a
//   loop, pushing `MessageReceived` into the event sink. On EOF or error the
//   link is removed and `ConnectionClosed` raised.
// - **Writers**: the owning controller writes frames directly on its own
//   thread through `send`/`broadcast`. Reader threads never write. Writes
//   happen outside the link table lock and are bounded by the network's
//   write timeout; a peer that stops reading loses its link instead of
//   stalling the writer.
//
// A `Directory` maps endpoint identities to socket addresses. It stands in
// for a signaling service: binding an identity registers it, shutting down
// unregisters it, and a failing listener counts as lost presence.
// `StaticDirectory` is an in-process map that can also be pre-seeded with a
// remote address (how a joining player in another process finds the GM).

use std::collections::HashMap;
use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use peerplay_protocol::{EndpointId, read_frame, write_frame};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EventSink, Network, Transport, TransportEvent};
use crate::error::TransportError;

/// Bound on reading the dialler's `Hello` frame.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on writing one frame to a peer.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between non-blocking accept polls.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Maps endpoint identities to listening addresses.
pub trait Directory: Send + Sync {
    /// Claim `endpoint`. Fails if it is already registered.
    fn register(&self, endpoint: &EndpointId, addr: SocketAddr) -> Result<(), TransportError>;
    fn lookup(&self, endpoint: &EndpointId) -> Option<SocketAddr>;
    fn unregister(&self, endpoint: &EndpointId);
}

/// In-process directory shared by cloning.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    entries: Arc<Mutex<HashMap<EndpointId, SocketAddr>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a peer that lives outside this process.
    #[must_use]
    pub fn with_entry(self, endpoint: EndpointId, addr: SocketAddr) -> Self {
        self.entries().insert(endpoint, addr);
        self
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<EndpointId, SocketAddr>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Directory for StaticDirectory {
    fn register(&self, endpoint: &EndpointId, addr: SocketAddr) -> Result<(), TransportError> {
        let mut entries = self.entries();
        if entries.contains_key(endpoint) {
            return Err(TransportError::IdentityTaken(endpoint.clone()));
        }
        entries.insert(endpoint.clone(), addr);
        Ok(())
    }

    fn lookup(&self, endpoint: &EndpointId) -> Option<SocketAddr> {
        self.entries().get(endpoint).copied()
    }

    fn unregister(&self, endpoint: &EndpointId) {
        self.entries().remove(endpoint);
    }
}

/// First frame on every connection: who is dialling.
#[derive(Serialize, Deserialize)]
struct Hello {
    endpoint: EndpointId,
}

/// Binds endpoints to TCP listeners registered in a directory.
#[derive(Clone)]
pub struct TcpNetwork {
    directory: Arc<dyn Directory>,
    bind_addr: SocketAddr,
    write_timeout: Duration,
}

impl TcpNetwork {
    /// Listeners bind to an ephemeral loopback port by default.
    pub fn new(directory: impl Directory + 'static) -> Self {
        Self {
            directory: Arc::new(directory),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            write_timeout: WRITE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

impl Network for TcpNetwork {
    type Transport = TcpTransport;

    fn connect_as_endpoint(
        &self,
        endpoint: &EndpointId,
        sink: EventSink,
    ) -> Result<TcpTransport, TransportError> {
        let listener = TcpListener::bind(self.bind_addr)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        self.directory.register(endpoint, local_addr)?;

        let shared = Arc::new(Shared {
            endpoint: endpoint.clone(),
            sink,
            links: Mutex::new(HashMap::new()),
            next_link: AtomicU64::new(0),
            keep_running: AtomicBool::new(true),
            write_timeout: self.write_timeout,
        });

        let accept_shared = shared.clone();
        let accept_directory = self.directory.clone();
        thread::spawn(move || accept_loop(listener, accept_shared, accept_directory));

        debug!(%endpoint, %local_addr, "tcp endpoint listening");
        Ok(TcpTransport {
            shared,
            directory: self.directory.clone(),
        })
    }
}

struct Link {
    id: u64,
    stream: Arc<TcpStream>,
}

/// State shared between the transport handle and its threads.
struct Shared {
    endpoint: EndpointId,
    sink: EventSink,
    links: Mutex<HashMap<EndpointId, Link>>,
    next_link: AtomicU64,
    keep_running: AtomicBool,
    write_timeout: Duration,
}

impl Shared {
    fn links(&self) -> MutexGuard<'_, HashMap<EndpointId, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    /// Record the write half of a new link and announce it. A previous link
    /// to the same peer is replaced and torn down.
    fn register_link(&self, remote: &EndpointId, stream: TcpStream) -> u64 {
        stream.set_write_timeout(Some(self.write_timeout)).ok();
        let id = self.next_link.fetch_add(1, Ordering::SeqCst);
        let link = Link {
            id,
            stream: Arc::new(stream),
        };
        let previous = self.links().insert(remote.clone(), link);
        if let Some(old) = previous {
            old.stream.shutdown(Shutdown::Both).ok();
        }
        (self.sink)(TransportEvent::ConnectionOpened {
            remote: remote.clone(),
        });
        id
    }

    /// Write one frame on a link. The table lock is not held during the
    /// write. A failed or timed-out write drops the link; its reader thread
    /// then raises `ConnectionClosed`.
    fn write_to(&self, remote: &EndpointId, id: u64, stream: &TcpStream, payload: &[u8]) -> bool {
        match write_frame(&mut &*stream, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(%remote, error = %e, "tcp write failed, dropping link");
                self.drop_link(remote, id);
                false
            }
        }
    }

    /// Remove `remote`'s link if it is still link `id`, and shut it down.
    fn drop_link(&self, remote: &EndpointId, id: u64) {
        let removed = {
            let mut links = self.links();
            match links.get(remote) {
                Some(link) if link.id == id => links.remove(remote),
                _ => None,
            }
        };
        if let Some(link) = removed {
            link.stream.shutdown(Shutdown::Both).ok();
        }
    }
}

/// Accept thread. Exits when the transport shuts down or the listener fails.
fn accept_loop(listener: TcpListener, shared: Arc<Shared>, directory: Arc<dyn Directory>) {
    while shared.running() {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                stream.set_nonblocking(false).ok();
                let shared = shared.clone();
                thread::spawn(move || inbound(stream, peer_addr, shared));
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!(endpoint = %shared.endpoint, error = %e, "listener failed");
                if shared.running() {
                    directory.unregister(&shared.endpoint);
                    (shared.sink)(TransportEvent::PresenceLost);
                }
                break;
            }
        }
    }
}

/// Per-connection thread for accepted sockets: handshake, then read.
fn inbound(stream: TcpStream, peer_addr: SocketAddr, shared: Arc<Shared>) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
    let mut reader = BufReader::new(stream);
    let hello = match read_frame(&mut reader) {
        Ok(bytes) => serde_json::from_slice::<Hello>(&bytes),
        Err(e) => {
            debug!(%peer_addr, error = %e, "handshake read failed");
            return;
        }
    };
    let remote = match hello {
        Ok(hello) => hello.endpoint,
        Err(e) => {
            debug!(%peer_addr, error = %e, "malformed hello");
            return;
        }
    };

    reader.get_ref().set_read_timeout(None).ok();
    reader.get_ref().set_nodelay(true).ok();
    let write_half = match reader.get_ref().try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    if !shared.running() {
        return;
    }
    let id = shared.register_link(&remote, write_half);
    reader_loop(reader, remote, id, shared);
}

/// Reader loop for one link. Runs in its own thread.
fn reader_loop(mut reader: BufReader<TcpStream>, remote: EndpointId, id: u64, shared: Arc<Shared>) {
    while let Ok(payload) = read_frame(&mut reader) {
        let delivered = (shared.sink)(TransportEvent::MessageReceived {
            from: remote.clone(),
            payload,
        });
        if !delivered {
            break;
        }
    }

    // A newer link to the same peer may have replaced this one.
    let superseded = {
        let mut links = shared.links();
        match links.get(&remote) {
            Some(link) if link.id == id => {
                links.remove(&remote);
                false
            }
            Some(_) => true,
            None => false,
        }
    };
    if !superseded {
        (shared.sink)(TransportEvent::ConnectionClosed { remote });
    }
}

/// One bound endpoint. Dropping it shuts it down.
pub struct TcpTransport {
    shared: Arc<Shared>,
    directory: Arc<dyn Directory>,
}

impl Transport for TcpTransport {
    fn local_endpoint(&self) -> &EndpointId {
        &self.shared.endpoint
    }

    fn connect_to(&self, remote: &EndpointId, timeout: Duration) -> Result<(), TransportError> {
        if !self.shared.running() {
            return Err(TransportError::Shutdown);
        }
        if self.shared.links().contains_key(remote) {
            return Ok(());
        }
        let addr = self
            .directory
            .lookup(remote)
            .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::ConnectTimeout {
                remote: remote.clone(),
                timeout,
            },
            io::ErrorKind::ConnectionRefused => TransportError::PeerUnavailable(remote.clone()),
            _ => TransportError::Io(e),
        })?;
        stream.set_nodelay(true).ok();

        let hello = serde_json::to_vec(&Hello {
            endpoint: self.shared.endpoint.clone(),
        })
        .map_err(io::Error::from)?;
        write_frame(&mut &stream, &hello)?;

        let write_half = stream.try_clone()?;
        let id = self.shared.register_link(remote, write_half);
        let shared = self.shared.clone();
        let remote = remote.clone();
        thread::spawn(move || reader_loop(BufReader::new(stream), remote, id, shared));
        Ok(())
    }

    fn send(&self, to: &EndpointId, payload: &[u8]) -> bool {
        let link = self
            .shared
            .links()
            .get(to)
            .map(|link| (link.id, link.stream.clone()));
        let Some((id, stream)) = link else {
            return false;
        };
        self.shared.write_to(to, id, &stream, payload)
    }

    fn broadcast(&self, payload: &[u8]) -> usize {
        let targets: Vec<(EndpointId, u64, Arc<TcpStream>)> = self
            .shared
            .links()
            .iter()
            .map(|(to, link)| (to.clone(), link.id, link.stream.clone()))
            .collect();
        targets
            .iter()
            .filter(|(to, id, stream)| self.shared.write_to(to, *id, stream, payload))
            .count()
    }

    fn peers(&self) -> Vec<EndpointId> {
        self.shared.links().keys().cloned().collect()
    }

    fn close(&self, remote: &EndpointId) {
        // The reader thread notices the shutdown and raises ConnectionClosed.
        if let Some(link) = self.shared.links().remove(remote) {
            link.stream.shutdown(Shutdown::Both).ok();
        }
    }

    fn shutdown(&self) {
        if !self.shared.keep_running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.directory.unregister(&self.shared.endpoint);
        let links: Vec<Link> = self.shared.links().drain().map(|(_, link)| link).collect();
        for link in links {
            link.stream.shutdown(Shutdown::Both).ok();
        }
        debug!(endpoint = %self.shared.endpoint, "tcp endpoint shut down");
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
