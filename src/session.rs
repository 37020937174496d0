//! The session facade: queues, the parser task, and the outbound path.
//!
//! Bytes from the transport go in through [`RemoteDisplay::push_bytes`];
//! decoded packets come out of [`RemoteDisplay::wait_for_packet`] in wire
//! order. A dedicated parser task sits between the two, spawned lazily so a
//! session that never receives anything costs no worker.

use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::RemoteDisplayError;
use crate::chunk::{Chunk, ChunkReader};
use crate::frame::Frame;
use crate::packet::{Decoder, Packet, TouchEvent};
use crate::presenter::{self, DisplayDriver};

/// Slots in each of the two session queues. A full queue blocks its
/// producer; that is the backpressure signal all the way up to the
/// transport.
const QUEUE_DEPTH: usize = 32;

/// Outbound half of the transport link.
///
/// The link is ordered and reliable (Bluetooth SPP in the reference
/// deployment), so the core hands each serialized packet over in a single
/// call and does not retry; delivery is the transport's concern.
pub trait TransportSender {
    fn send_bytes(&mut self, bytes: &[u8]);
}

/// A remote display session.
///
/// Owns the ingress queue, the parser task, and the packet queue, plus the
/// outbound transport. Three contexts touch it: the transport's receive
/// callback ([`push_bytes`](Self::push_bytes)), the parser task (internal),
/// and the application ([`wait_for_packet`](Self::wait_for_packet),
/// [`present`](Self::present), the send operations).
///
/// Dropping the session stops the parser and releases any packets still in
/// flight.
#[derive(Debug)]
pub struct RemoteDisplay<T> {
    width: u16,
    height: u16,
    memory_limit: Option<usize>,
    transport: T,
    chunk_tx: mpsc::Sender<Chunk>,
    packet_rx: mpsc::Receiver<Packet>,
    /// Queue ends the parser task takes over when it is spawned.
    parser_inputs: Option<(mpsc::Receiver<Chunk>, mpsc::Sender<Packet>)>,
    parser: Option<JoinHandle<()>>,
}

impl<T: TransportSender> RemoteDisplay<T> {
    /// Create a session for a `width` x `height` RGB565 panel.
    pub fn new(width: u16, height: u16, transport: T) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::channel(QUEUE_DEPTH);
        let (packet_tx, packet_rx) = mpsc::channel(QUEUE_DEPTH);

        Self {
            width,
            height,
            memory_limit: None,
            transport,
            chunk_tx,
            packet_rx,
            parser_inputs: Some((chunk_rx, packet_tx)),
            parser: None,
        }
    }

    /// Cap the decoded payload a single packet may allocate. Packets over
    /// the cap are discarded whole without losing stream position.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Feed raw bytes received from the transport.
    ///
    /// Copies the bytes into an owned chunk and enqueues it for the parser,
    /// spawning the parser task on first use. Awaits when the ingress queue
    /// is full, which is how a slow parser pushes back on the link.
    ///
    /// Must run inside a tokio runtime (the first call spawns the parser
    /// onto it).
    ///
    /// # Errors
    /// [`RemoteDisplayError::Disconnected`] if the parser task has
    /// terminated and the queue is closed.
    pub async fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), RemoteDisplayError> {
        if self.parser.is_none() {
            self.spawn_parser();
        }

        if bytes.is_empty() {
            return Ok(());
        }

        let chunk = Chunk {
            received_at: Instant::now(),
            bytes: Bytes::copy_from_slice(bytes),
        };
        self.chunk_tx
            .send(chunk)
            .await
            .map_err(|_| RemoteDisplayError::Disconnected)
    }

    /// Next decoded packet, in wire order.
    ///
    /// Suspends until the parser produces one.
    ///
    /// # Errors
    /// [`RemoteDisplayError::Disconnected`] once the parser has terminated
    /// (fatal parse error or teardown) and the queue is drained.
    pub async fn wait_for_packet(&mut self) -> Result<Packet, RemoteDisplayError> {
        self.packet_rx
            .recv()
            .await
            .ok_or(RemoteDisplayError::Disconnected)
    }

    /// Replay a decoded frame onto the display using this session's screen
    /// geometry.
    pub fn present<D: DisplayDriver>(&self, frame: &Frame, driver: &mut D) {
        presenter::present(frame, self.width, self.height, driver);
    }

    /// Answer a [`Packet::Ping`].
    pub fn send_pong(&mut self) {
        self.transport.send_bytes(&Packet::Pong.serialize());
    }

    /// Report a touch to the host.
    pub fn send_touch_event(&mut self, event: TouchEvent) {
        self.transport.send_bytes(&Packet::TouchEvent(event).serialize());
    }

    /// Tear the session down: stop the parser task and close the queues.
    /// Undelivered packets are dropped. Equivalent to dropping the session;
    /// provided for call sites that want the teardown to be visible.
    pub fn shutdown(mut self) {
        self.stop_parser();
    }

    fn spawn_parser(&mut self) {
        let Some((chunk_rx, packet_tx)) = self.parser_inputs.take() else {
            return;
        };

        let decoder = Decoder {
            width: self.width,
            height: self.height,
            memory_limit: self.memory_limit,
        };
        self.parser = Some(tokio::spawn(packet_builder(decoder, chunk_rx, packet_tx)));
    }

    fn stop_parser(&mut self) {
        if let Some(parser) = self.parser.take() {
            parser.abort();
        }
    }
}

impl<T> Drop for RemoteDisplay<T> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            parser.abort();
        }
    }
}

/// Parser worker: one packet at a time off the byte stream, forwarded in
/// completion order. Completion order is stream order, so delivery order is
/// wire order.
async fn packet_builder(
    decoder: Decoder,
    chunks: mpsc::Receiver<Chunk>,
    packets: mpsc::Sender<Packet>,
) {
    let mut reader = ChunkReader::new(chunks);

    loop {
        match decoder.read_packet(&mut reader).await {
            Ok(Some(packet)) => {
                debug!(kind = ?packet.kind(), "decoded packet");
                if packets.send(packet).await.is_err() {
                    // Application side is gone; nothing left to do.
                    break;
                }
            }
            // Packet dropped for memory; the decoder kept the stream in
            // sync and already logged it.
            Ok(None) => continue,
            Err(RemoteDisplayError::Disconnected) => break,
            Err(e) => {
                // Past a bad tag the next packet boundary is unknowable, so
                // the stream cannot be resynced. Closing the packet queue
                // surfaces the teardown to the application.
                error!("unrecoverable parse error, closing session: {e}");
                break;
            }
        }
    }
}
