// In-process network for tests and embedding.
//
// `MemoryNetwork` is a cheaply cloneable handle on a shared hub holding the
// directory (endpoint -> event sink) and the set of live links. Delivery is
// synchronous: `send` calls the receiver's sink on the caller's thread, so
// per-link ordering is the caller's ordering. Sinks are always invoked after
// the hub lock is released, so a sink may call back into the network.
//
// Fault injection:
// - `sever(a, b)` drops one link, raising `ConnectionClosed` on both ends.
// - `drop_presence(endpoint)` unlists an endpoint from the directory and
//   raises `PresenceLost` on it; its existing links stay up.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use peerplay_protocol::EndpointId;
use tracing::debug;

use super::{EventSink, Network, Transport, TransportEvent};
use crate::error::TransportError;

struct Peer {
    sink: EventSink,
    listed: bool,
}

#[derive(Default)]
struct Hub {
    peers: HashMap<EndpointId, Peer>,
    /// Unordered pairs stored as (smaller, larger).
    links: BTreeSet<(EndpointId, EndpointId)>,
}

fn link_key(a: &EndpointId, b: &EndpointId) -> (EndpointId, EndpointId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl Hub {
    fn sink(&self, endpoint: &EndpointId) -> Option<EventSink> {
        self.peers.get(endpoint).map(|p| p.sink.clone())
    }

    fn linked_to(&self, endpoint: &EndpointId) -> Vec<EndpointId> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if a == endpoint {
                    Some(b.clone())
                } else if b == endpoint {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Remove a link and return the sinks to notify, paired with the
    /// endpoint each should hear about.
    fn unlink(&mut self, a: &EndpointId, b: &EndpointId) -> Vec<(EventSink, EndpointId)> {
        if !self.links.remove(&link_key(a, b)) {
            return Vec::new();
        }
        let mut notify = Vec::new();
        if let Some(sink) = self.sink(a) {
            notify.push((sink, b.clone()));
        }
        if let Some(sink) = self.sink(b) {
            notify.push((sink, a.clone()));
        }
        notify
    }
}

fn notify_closed(notify: Vec<(EventSink, EndpointId)>) {
    for (sink, remote) in notify {
        sink(TransportEvent::ConnectionClosed { remote });
    }
}

/// Shared in-memory directory and link table.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `endpoint` is currently reachable through the directory.
    pub fn is_listed(&self, endpoint: &EndpointId) -> bool {
        self.hub().peers.get(endpoint).is_some_and(|p| p.listed)
    }

    pub fn is_linked(&self, a: &EndpointId, b: &EndpointId) -> bool {
        self.hub().links.contains(&link_key(a, b))
    }

    /// Drop the link between `a` and `b` as if the connection failed.
    pub fn sever(&self, a: &EndpointId, b: &EndpointId) {
        let notify = self.hub().unlink(a, b);
        debug!(%a, %b, "severing memory link");
        notify_closed(notify);
    }

    /// Unlist `endpoint` as if it lost its signaling connection.
    pub fn drop_presence(&self, endpoint: &EndpointId) {
        let sink = {
            let mut hub = self.hub();
            match hub.peers.get_mut(endpoint) {
                Some(peer) if peer.listed => {
                    peer.listed = false;
                    Some(peer.sink.clone())
                }
                _ => None,
            }
        };
        if let Some(sink) = sink {
            sink(TransportEvent::PresenceLost);
        }
    }
}

impl Network for MemoryNetwork {
    type Transport = MemoryTransport;

    fn connect_as_endpoint(
        &self,
        endpoint: &EndpointId,
        sink: EventSink,
    ) -> Result<MemoryTransport, TransportError> {
        let mut hub = self.hub();
        if hub.peers.contains_key(endpoint) {
            return Err(TransportError::IdentityTaken(endpoint.clone()));
        }
        hub.peers
            .insert(endpoint.clone(), Peer { sink, listed: true });
        debug!(%endpoint, "memory endpoint registered");
        Ok(MemoryTransport {
            endpoint: endpoint.clone(),
            network: self.clone(),
        })
    }
}

/// One bound endpoint on a `MemoryNetwork`. Dropping it shuts it down.
pub struct MemoryTransport {
    endpoint: EndpointId,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn local_endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    fn connect_to(&self, remote: &EndpointId, _timeout: Duration) -> Result<(), TransportError> {
        let (local_sink, remote_sink) = {
            let mut hub = self.network.hub();
            let Some(local_sink) = hub.sink(&self.endpoint) else {
                return Err(TransportError::Shutdown);
            };
            let remote_sink = match hub.peers.get(remote) {
                Some(peer) if peer.listed => peer.sink.clone(),
                _ => return Err(TransportError::PeerUnavailable(remote.clone())),
            };
            if !hub.links.insert(link_key(&self.endpoint, remote)) {
                return Ok(());
            }
            (local_sink, remote_sink)
        };
        remote_sink(TransportEvent::ConnectionOpened {
            remote: self.endpoint.clone(),
        });
        local_sink(TransportEvent::ConnectionOpened {
            remote: remote.clone(),
        });
        Ok(())
    }

    fn send(&self, to: &EndpointId, payload: &[u8]) -> bool {
        let sink = {
            let hub = self.network.hub();
            if !hub.links.contains(&link_key(&self.endpoint, to)) {
                return false;
            }
            hub.sink(to)
        };
        sink.is_some_and(|sink| {
            sink(TransportEvent::MessageReceived {
                from: self.endpoint.clone(),
                payload: payload.to_vec(),
            })
        })
    }

    fn broadcast(&self, payload: &[u8]) -> usize {
        let sinks: Vec<EventSink> = {
            let hub = self.network.hub();
            hub.linked_to(&self.endpoint)
                .iter()
                .filter_map(|peer| hub.sink(peer))
                .collect()
        };
        sinks
            .into_iter()
            .filter(|sink| {
                sink(TransportEvent::MessageReceived {
                    from: self.endpoint.clone(),
                    payload: payload.to_vec(),
                })
            })
            .count()
    }

    fn peers(&self) -> Vec<EndpointId> {
        self.network.hub().linked_to(&self.endpoint)
    }

    fn close(&self, remote: &EndpointId) {
        let notify = self.network.hub().unlink(&self.endpoint, remote);
        notify_closed(notify);
    }

    fn shutdown(&self) {
        let notify = {
            let mut hub = self.network.hub();
            if hub.peers.remove(&self.endpoint).is_none() {
                return;
            }
            let mut notify = Vec::new();
            for peer in hub.linked_to(&self.endpoint) {
                notify.extend(hub.unlink(&self.endpoint, &peer));
            }
            notify
        };
        debug!(endpoint = %self.endpoint, "memory endpoint shut down");
        notify_closed(notify);
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
