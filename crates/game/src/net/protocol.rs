use rkyv::util::AlignedVec;
use rkyv::{rancor, Archive, Deserialize, Serialize};

use super::transport::Delivery;
use crate::simulation::CommandSnapshot;
use crate::snapshot::{DeltaStateSnapshot, StateSnapshot};

pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x54455448;
pub const DEFAULT_TICK_RATE: u32 = 60;
/// Snapshots the server keeps as delta baselines. Clients keep at least as
/// many so every baseline the server may pick is still decodable.
pub const DEFAULT_SNAPSHOT_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketHeader {
    pub fn new() -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Message {
    SyncRequest {
        client_send_time: u32,
    },
    Sync {
        client_send_time: u32,
        server_tick: u32,
        /// Seconds elapsed inside `server_tick` when the reply was built.
        server_tick_elapsed: f32,
    },
    SyncInfoRequest,
    SyncInfo {
        server_ticks_per_second: u32,
    },
    StateSnapshot(StateSnapshot),
    DeltaStateSnapshot(DeltaStateSnapshot),
    StateSnapshotAck {
        tick: u32,
    },
    RecentCommandSnapshots(Vec<CommandSnapshot>),
}

impl Message {
    pub fn delivery(&self) -> Delivery {
        match self {
            Self::SyncInfoRequest | Self::SyncInfo { .. } => Delivery::Reliable,
            _ => Delivery::Unreliable,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SyncRequest { .. } => "SyncRequest",
            Self::Sync { .. } => "Sync",
            Self::SyncInfoRequest => "SyncInfoRequest",
            Self::SyncInfo { .. } => "SyncInfo",
            Self::StateSnapshot(_) => "StateSnapshot",
            Self::DeltaStateSnapshot(_) => "DeltaStateSnapshot",
            Self::StateSnapshotAck { .. } => "StateSnapshotAck",
            Self::RecentCommandSnapshots(_) => "RecentCommandSnapshots",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Message,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad packet header (magic {magic:#x}, version {version})")]
    InvalidHeader { magic: u32, version: u32 },
}

impl Packet {
    pub fn new(payload: Message) -> Self {
        Self {
            header: PacketHeader::new(),
            payload,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    /// Validates and deserializes a packet. Transports hand over arbitrary
    /// byte slices, so the data is first copied into an aligned buffer.
    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let packet =
            rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)?;
        if !packet.header.is_valid() {
            return Err(PacketError::InvalidHeader {
                magic: packet.header.magic,
                version: packet.header.version,
            });
        }
        Ok(packet)
    }
}

pub fn encode_message(message: Message) -> Result<Vec<u8>, PacketError> {
    Packet::new(message).serialize()
}

pub fn decode_message(data: &[u8]) -> Result<Message, PacketError> {
    Packet::deserialize(data).map(|packet| packet.payload)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Vec2, Vec3};

    use super::*;
    use crate::simulation::Command;
    use crate::snapshot::{CharacterState, DeltaCodec, EntityState, Meta};

    #[test]
    fn sync_messages_survive_the_wire() {
        let message = Message::Sync {
            client_send_time: 1234,
            server_tick: 99,
            server_tick_elapsed: 0.004,
        };
        let bytes = encode_message(message.clone()).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), message);
    }

    #[test]
    fn snapshots_keep_shared_states() {
        let mut snapshot = StateSnapshot::with_states(
            12,
            [EntityState::Character(CharacterState::new(3, "player", Vec3::new(1.0, 2.0, 3.0)))],
        );
        let shared = Arc::clone(&snapshot.states[0]);
        snapshot.states.push(shared);
        snapshot.meta.push(Meta::PlayerPossession {
            player_id: 1,
            entity_id: 3,
        });

        let bytes = encode_message(Message::StateSnapshot(snapshot.clone())).unwrap();
        match decode_message(&bytes).unwrap() {
            Message::StateSnapshot(decoded) => assert_eq!(decoded, snapshot),
            other => panic!("unexpected message {}", other.name()),
        }
    }

    #[test]
    fn delta_and_commands_survive_the_wire() {
        let baseline = StateSnapshot::with_states(
            1,
            [EntityState::Character(CharacterState::new(3, "player", Vec3::ZERO))],
        );
        let target = StateSnapshot::with_states(
            2,
            [EntityState::Character(CharacterState::new(3, "player", Vec3::X))],
        );
        let delta = Message::DeltaStateSnapshot(DeltaCodec::encode(&baseline, &target));
        let bytes = encode_message(delta.clone()).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), delta);

        let commands = Message::RecentCommandSnapshots(vec![CommandSnapshot::new(
            5,
            vec![Command::Jump, Command::move_towards(Vec2::Y, true)],
        )]);
        let bytes = encode_message(commands.clone()).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), commands);
    }

    #[test]
    fn unaligned_input_is_accepted() {
        let bytes = encode_message(Message::StateSnapshotAck { tick: 8 }).unwrap();
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        assert_eq!(
            decode_message(&shifted[1..]).unwrap(),
            Message::StateSnapshotAck { tick: 8 }
        );
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let mut packet = Packet::new(Message::SyncInfoRequest);
        packet.header.magic = 0xDEADBEEF;
        let bytes = packet.serialize().unwrap();
        assert!(matches!(
            Packet::deserialize(&bytes),
            Err(PacketError::InvalidHeader { magic: 0xDEADBEEF, .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_message(&[1, 2, 3]).is_err());
    }

    #[test]
    fn snapshot_traffic_is_unreliable() {
        assert_eq!(Message::SyncInfoRequest.delivery(), Delivery::Reliable);
        assert_eq!(
            Message::StateSnapshotAck { tick: 1 }.delivery(),
            Delivery::Unreliable
        );
    }
}
