// Byte ingress: the transport callback hands over owned chunks, the parser
// reads them back as one continuous stream.

use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::RemoteDisplayError;

/// One batch of bytes delivered by the transport, stamped at ingress so the
/// queue dwell time can be measured on the far side.
#[derive(Debug)]
pub(crate) struct Chunk {
    pub received_at: Instant,
    pub bytes: Bytes,
}

/// Reads the ingress queue as a continuous byte stream.
///
/// A read may span any number of chunks. When the current chunk runs dry
/// mid-field the reader suspends on the queue and resumes exactly where it
/// left off, so callers can parse fields without caring where the transport
/// happened to split the stream.
#[derive(Debug)]
pub(crate) struct ChunkReader {
    queue: mpsc::Receiver<Chunk>,
    current: Option<Chunk>,
    offset: usize,
    consumed: u64,
    last_receive: Option<Instant>,
}

impl ChunkReader {
    pub fn new(queue: mpsc::Receiver<Chunk>) -> Self {
        Self {
            queue,
            current: None,
            offset: 0,
            consumed: 0,
            last_receive: None,
        }
    }

    /// Fill `dest` completely, suspending on the queue as needed.
    pub async fn read_exact(&mut self, dest: &mut [u8]) -> Result<(), RemoteDisplayError> {
        self.read_inner(dest.len(), Some(dest)).await
    }

    /// Consume and throw away `n` bytes. Used to stay in sync with the
    /// stream after a packet has been dropped.
    pub async fn discard(&mut self, n: usize) -> Result<(), RemoteDisplayError> {
        self.read_inner(n, None).await
    }

    pub async fn read_u8(&mut self) -> Result<u8, RemoteDisplayError> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte).await?;
        Ok(byte[0])
    }

    pub async fn read_u16_le(&mut self) -> Result<u16, RemoteDisplayError> {
        let mut word = [0u8; 2];
        self.read_exact(&mut word).await?;
        Ok(u16::from_le_bytes(word))
    }

    /// Total bytes consumed over the reader's lifetime, reads and discards
    /// alike.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    async fn read_inner(
        &mut self,
        mut remaining: usize,
        mut dest: Option<&mut [u8]>,
    ) -> Result<(), RemoteDisplayError> {
        let mut filled = 0;

        while remaining > 0 {
            let chunk = match self.current.take() {
                Some(chunk) => chunk,
                None => {
                    let chunk = self
                        .queue
                        .recv()
                        .await
                        .ok_or(RemoteDisplayError::Disconnected)?;

                    let now = Instant::now();
                    trace!(
                        dwell_us = now.duration_since(chunk.received_at).as_micros() as u64,
                        "acquired chunk from ingress queue"
                    );
                    self.last_receive = Some(now);
                    self.offset = 0;
                    chunk
                }
            };

            let available = chunk.bytes.len() - self.offset;
            let to_copy = remaining.min(available);

            if let Some(dest) = dest.as_deref_mut() {
                dest[filled..filled + to_copy]
                    .copy_from_slice(&chunk.bytes[self.offset..self.offset + to_copy]);
            }

            filled += to_copy;
            self.offset += to_copy;
            remaining -= to_copy;
            self.consumed += to_copy as u64;

            if self.offset < chunk.bytes.len() {
                self.current = Some(chunk);
            } else if let Some(last_receive) = self.last_receive {
                debug!(
                    elapsed_us = last_receive.elapsed().as_micros() as u64,
                    "chunk fully consumed"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_for(parts: &[&[u8]]) -> ChunkReader {
        let (tx, rx) = mpsc::channel(32);
        for part in parts {
            tx.try_send(Chunk {
                received_at: Instant::now(),
                bytes: Bytes::copy_from_slice(part),
            })
            .unwrap();
        }
        // Closing the queue makes reads past the end fail instead of hang.
        drop(tx);
        ChunkReader::new(rx)
    }

    #[tokio::test]
    async fn read_spans_chunk_boundaries() {
        let mut reader = reader_for(&[&[1, 2], &[3], &[4, 5, 6]]);

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(reader.read_u8().await.unwrap(), 6);
        assert_eq!(reader.bytes_consumed(), 6);
    }

    #[tokio::test]
    async fn word_split_across_chunks() {
        let mut reader = reader_for(&[&[0x34], &[0x12]]);
        assert_eq!(reader.read_u16_le().await.unwrap(), 0x1234);
    }

    #[tokio::test]
    async fn discard_advances_the_stream() {
        let mut reader = reader_for(&[&[9, 9, 9], &[9, 7]]);
        reader.discard(4).await.unwrap();
        assert_eq!(reader.read_u8().await.unwrap(), 7);
        assert_eq!(reader.bytes_consumed(), 5);
    }

    #[tokio::test]
    async fn closed_queue_is_disconnected() {
        let mut reader = reader_for(&[&[1]]);
        assert_eq!(reader.read_u8().await.unwrap(), 1);
        assert_eq!(
            reader.read_u8().await.unwrap_err(),
            RemoteDisplayError::Disconnected
        );
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let mut reader = reader_for(&[&[], &[42], &[]]);
        assert_eq!(reader.read_u8().await.unwrap(), 42);
    }
}
