//! Packet values and the top-level wire codec.
//!
//! Every packet is one kind byte followed by a kind-specific body; the body
//! length is implicit in the grammar, there is no outer framing. Multi-byte
//! integers are little-endian.

use std::time::Duration;

use crate::RemoteDisplayError;
use crate::chunk::ChunkReader;
use crate::frame::{self, AllocBudget, Frame};

/// Wire identifiers for every packet kind the protocol defines.
///
/// The endpoint only handles a subset on each path, but all ten are valid
/// first bytes and the dispatch must be able to name the ones it rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    QueryDeviceInfo = 0,
    DeviceInfo = 1,
    TouchEvent = 2,
    AccelerationEvent = 3,
    PhysicalButtonEvent = 4,
    Backlight = 5,
    Vibration = 6,
    Ping = 7,
    Pong = 8,
    Frame = 9,
}

impl TryFrom<u8> for PacketKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::QueryDeviceInfo),
            1 => Ok(Self::DeviceInfo),
            2 => Ok(Self::TouchEvent),
            3 => Ok(Self::AccelerationEvent),
            4 => Ok(Self::PhysicalButtonEvent),
            5 => Ok(Self::Backlight),
            6 => Ok(Self::Vibration),
            7 => Ok(Self::Ping),
            8 => Ok(Self::Pong),
            9 => Ok(Self::Frame),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchPhase {
    Down = 0,
    Move = 1,
    Up = 2,
}

impl TryFrom<u8> for TouchPhase {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Down),
            1 => Ok(Self::Move),
            2 => Ok(Self::Up),
            _ => Err(()),
        }
    }
}

/// A touch report for the host. 9 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub pointer: u8,
    pub timestamp: u32,
    pub phase: TouchPhase,
    pub x: u8,
    pub y: u8,
}

/// A decoded protocol packet.
///
/// Frames own their pixel buffers, run lists, and rectangle lists; dropping
/// a packet releases all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Set the panel backlight, 0..=255 linear.
    Backlight { intensity: u8 },
    /// Run the vibration motor. The duration travels in 10 ms units.
    Vibration { duration_cs: u8 },
    Ping,
    Pong,
    TouchEvent(TouchEvent),
    Frame(Frame),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Backlight { .. } => PacketKind::Backlight,
            Packet::Vibration { .. } => PacketKind::Vibration,
            Packet::Ping => PacketKind::Ping,
            Packet::Pong => PacketKind::Pong,
            Packet::TouchEvent(_) => PacketKind::TouchEvent,
            Packet::Frame(_) => PacketKind::Frame,
        }
    }

    /// Vibration length for a [`Packet::Vibration`], decoded from its
    /// 10 ms wire units. `None` for every other kind.
    pub fn vibration_duration(&self) -> Option<Duration> {
        match self {
            Packet::Vibration { duration_cs } => {
                Some(Duration::from_millis(u64::from(*duration_cs) * 10))
            }
            _ => None,
        }
    }

    /// Encode the packet for the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.kind() as u8);

        match self {
            Packet::Backlight { intensity } => out.push(*intensity),
            Packet::Vibration { duration_cs } => out.push(*duration_cs),
            Packet::Ping | Packet::Pong => {}
            Packet::TouchEvent(event) => {
                out.push(event.pointer);
                out.extend_from_slice(&event.timestamp.to_le_bytes());
                out.push(event.phase as u8);
                out.push(event.x);
                out.push(event.y);
            }
            Packet::Frame(frame) => frame.serialize_into(&mut out),
        }

        out
    }
}

/// Streaming packet decoder: one linear descent per packet, no lookahead,
/// no buffering beyond the chunk in hand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Decoder {
    pub width: u16,
    pub height: u16,
    pub memory_limit: Option<usize>,
}

impl Decoder {
    /// Parse the next packet from the stream.
    ///
    /// `Ok(None)` means a packet was dropped for lack of memory; its bytes
    /// were consumed, the stream is still in sync, and the caller should
    /// just go around again. Errors are fatal for the stream: past an
    /// unknown tag there is no way to find the next packet boundary.
    pub async fn read_packet(
        &self,
        reader: &mut ChunkReader,
    ) -> Result<Option<Packet>, RemoteDisplayError> {
        let kind = reader.read_u8().await?;
        let kind =
            PacketKind::try_from(kind).map_err(|_| RemoteDisplayError::UnknownPacketKind(kind))?;

        match kind {
            PacketKind::Backlight => Ok(Some(Packet::Backlight {
                intensity: reader.read_u8().await?,
            })),
            PacketKind::Vibration => Ok(Some(Packet::Vibration {
                duration_cs: reader.read_u8().await?,
            })),
            PacketKind::Ping => Ok(Some(Packet::Ping)),
            PacketKind::Frame => {
                let mut budget = AllocBudget::new(self.memory_limit);
                let frame = frame::read_frame(reader, self.width, self.height, &mut budget).await?;
                Ok(frame.map(Packet::Frame))
            }
            other => Err(RemoteDisplayError::UnhandledPacketKind(other)),
        }
    }
}
