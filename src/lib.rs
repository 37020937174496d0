#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations)]

mod chunk;
pub mod frame;
pub mod packet;
pub mod presenter;
pub mod session;

pub use frame::{Frame, FrameEncoding, RawRect, RleRect, RleRun};
pub use packet::{Packet, PacketKind, TouchEvent, TouchPhase};
pub use presenter::{DisplayDriver, Rect};
pub use session::{RemoteDisplay, TransportSender};

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDisplayError {
    /// The other end of a session queue is gone: the parser task has
    /// terminated, or the session was torn down under a pending call.
    #[error("session queue disconnected")]
    Disconnected,
    /// First byte of a packet is not a known kind identifier. The stream
    /// position past it is unrecoverable, so the session terminates.
    #[error("unknown packet kind {0:#04x}")]
    UnknownPacketKind(u8),
    /// A reserved kind this endpoint does not handle on the receive path.
    /// Its body length is unknown here, so this is as fatal as an unknown
    /// kind.
    #[error("no receive handler for {0:?} packets")]
    UnhandledPacketKind(PacketKind),
    /// A frame packet with an encoding tag outside the four defined
    /// encodings.
    #[error("unknown frame encoding {0:#04x}")]
    UnknownFrameEncoding(u8),
    /// An RLE run covering zero pixels. Conforming encoders never emit
    /// these; treated as stream corruption.
    #[error("RLE run with zero pixels")]
    EmptyRleRun,
}
