/// Opaque handle the host transport assigns to a connected peer.
pub type PeerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    Reliable,
    Unreliable,
}

/// An encoded message waiting to be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub peer: PeerId,
    pub delivery: Delivery,
    pub payload: Vec<u8>,
}

impl Outgoing {
    pub fn new(peer: PeerId, delivery: Delivery, payload: Vec<u8>) -> Self {
        Self {
            peer,
            delivery,
            payload,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is not connected")]
    UnknownPeer(PeerId),
    #[error("transport channel closed")]
    Closed,
}
