mod latency;
mod protocol;
mod simulator;
mod transport;

pub use latency::{LatencyEstimator, DEFAULT_MIN_SAMPLES, DEFAULT_SAMPLE_WINDOW};
pub use protocol::{
    decode_message, encode_message, ArchivedMessage, ArchivedPacket, Message, Packet,
    PacketError, PacketHeader, DEFAULT_SNAPSHOT_HISTORY, DEFAULT_TICK_RATE, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};
pub use simulator::{LinkConditions, LinkSimulator, LinkStats};
pub use transport::{Delivery, Outgoing, PeerId, TransportError};
