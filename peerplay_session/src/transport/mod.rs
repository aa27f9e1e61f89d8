// Transport adapter seam.
//
// A `Network` binds an endpoint identity and hands back a `Transport`: a set
// of reliable, ordered, point-to-point links to other named endpoints. The
// controllers only ever see raw payload bytes and `TransportEvent`s; they
// encode and decode protocol messages themselves.
//
// Events are pushed through an `EventSink` callback, normally built from the
// sending half of the consumer's channel with `channel_sink`. A sink returns
// `false` once its consumer is gone, which transports treat as "stop
// delivering".
//
// Implementations:
// - `memory.rs`: in-process network with a shared directory and fault
//   injection, used by the tests.
// - `tcp.rs`:    real sockets, thread-per-reader, length-delimited frames,
//   with a pluggable `Directory` standing in for a signaling service.

pub mod memory;
pub mod tcp;

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use peerplay_protocol::EndpointId;

use crate::error::TransportError;

/// Lifecycle and data events raised by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A link to `remote` is up, whichever side dialled.
    ConnectionOpened { remote: EndpointId },
    /// The link to `remote` is gone.
    ConnectionClosed { remote: EndpointId },
    /// One payload from `from`, in send order.
    MessageReceived { from: EndpointId, payload: Vec<u8> },
    /// This endpoint is no longer listed in the directory. Existing links
    /// keep working but nobody new can reach it.
    PresenceLost,
}

/// Callback receiving transport events. Returns `false` when the consumer
/// has gone away.
pub type EventSink = Arc<dyn Fn(TransportEvent) -> bool + Send + Sync>;

/// Sink that forwards events into a channel, wrapping them with `From`.
pub fn channel_sink<E>(tx: Sender<E>) -> EventSink
where
    E: From<TransportEvent> + Send + 'static,
{
    Arc::new(move |event| tx.send(E::from(event)).is_ok())
}

/// Links of one bound endpoint.
///
/// `send` and `broadcast` are fire-and-forget: a missing or broken link is
/// reported through the return value and never aborts the caller.
pub trait Transport: Send + 'static {
    fn local_endpoint(&self) -> &EndpointId;

    /// Open a link to `remote`. No-op if one already exists.
    fn connect_to(&self, remote: &EndpointId, timeout: Duration) -> Result<(), TransportError>;

    /// `false` if there is no live link to `to`.
    fn send(&self, to: &EndpointId, payload: &[u8]) -> bool;

    /// Send to every linked peer. Returns how many deliveries succeeded.
    fn broadcast(&self, payload: &[u8]) -> usize;

    /// Peers with a live link, in no particular order.
    fn peers(&self) -> Vec<EndpointId>;

    /// Drop the link to `remote`, if any.
    fn close(&self, remote: &EndpointId);

    /// Drop every link and give up the identity. Idempotent.
    fn shutdown(&self);
}

/// Something that can bind endpoint identities.
pub trait Network {
    type Transport: Transport;

    /// Claim `endpoint` and start delivering its events to `sink`.
    fn connect_as_endpoint(
        &self,
        endpoint: &EndpointId,
        sink: EventSink,
    ) -> Result<Self::Transport, TransportError>;
}
