use tether::PeerId;

use crate::replicator::SendKind;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PeerConnected {
        peer: PeerId,
        entity_id: u32,
    },
    PeerDisconnected {
        peer: PeerId,
        entity_id: Option<u32>,
    },
    DecodeError {
        peer: PeerId,
        message: String,
    },
    SnapshotSent {
        peer: PeerId,
        tick: u32,
        kind: SendKind,
        bytes: usize,
    },
}

impl ServerEvent {
    pub fn peer(&self) -> PeerId {
        match self {
            ServerEvent::PeerConnected { peer, .. }
            | ServerEvent::PeerDisconnected { peer, .. }
            | ServerEvent::DecodeError { peer, .. }
            | ServerEvent::SnapshotSent { peer, .. } => *peer,
        }
    }
}
