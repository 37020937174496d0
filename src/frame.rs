//! Frame values and the frame-body wire codec.
//!
//! A frame is either a keyframe replacing the whole screen or a deltaframe
//! patching damaged rectangles over previous content, with pixel data
//! carried raw or as RLE runs of RGB565 words.

use tracing::warn;

use crate::RemoteDisplayError;
use crate::chunk::ChunkReader;

/// How a frame's pixel data is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameEncoding {
    KeyframeRaw = 0,
    KeyframeRle = 1,
    DeltaframeRaw = 2,
    DeltaframeRle = 3,
}

impl TryFrom<u8> for FrameEncoding {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::KeyframeRaw),
            1 => Ok(Self::KeyframeRle),
            2 => Ok(Self::DeltaframeRaw),
            3 => Ok(Self::DeltaframeRle),
            _ => Err(()),
        }
    }
}

/// A run of identical pixels. `count` is 1..=255 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleRun {
    pub count: u8,
    pub rgb565: u16,
}

/// A damaged rectangle carrying its replacement pixels row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRect {
    pub x: u8,
    pub y: u8,
    pub width: u8,
    pub height: u8,
    pub pixels: Vec<u16>,
}

/// A damaged rectangle carrying its replacement pixels as RLE runs whose
/// counts sum to `width * height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RleRect {
    pub x: u8,
    pub y: u8,
    pub width: u8,
    pub height: u8,
    pub runs: Vec<RleRun>,
}

/// One decoded frame. Keyframe pixel data always covers the full screen in
/// raster order; deltaframe rectangles apply in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    KeyframeRaw { pixels: Vec<u16> },
    KeyframeRle { runs: Vec<RleRun> },
    DeltaframeRaw { rects: Vec<RawRect> },
    DeltaframeRle { rects: Vec<RleRect> },
}

impl Frame {
    pub fn encoding(&self) -> FrameEncoding {
        match self {
            Frame::KeyframeRaw { .. } => FrameEncoding::KeyframeRaw,
            Frame::KeyframeRle { .. } => FrameEncoding::KeyframeRle,
            Frame::DeltaframeRaw { .. } => FrameEncoding::DeltaframeRaw,
            Frame::DeltaframeRle { .. } => FrameEncoding::DeltaframeRle,
        }
    }

    pub(crate) fn serialize_into(&self, out: &mut Vec<u8>) {
        out.push(self.encoding() as u8);
        match self {
            Frame::KeyframeRaw { pixels } => {
                for pixel in pixels {
                    out.extend_from_slice(&pixel.to_le_bytes());
                }
            }
            Frame::KeyframeRle { runs } => serialize_runs(runs, out),
            Frame::DeltaframeRaw { rects } => {
                out.push(rects.len() as u8);
                for rect in rects {
                    out.extend_from_slice(&[rect.x, rect.y, rect.width, rect.height]);
                    for pixel in &rect.pixels {
                        out.extend_from_slice(&pixel.to_le_bytes());
                    }
                }
            }
            Frame::DeltaframeRle { rects } => {
                out.extend_from_slice(&(rects.len() as u16).to_le_bytes());
                for rect in rects {
                    out.extend_from_slice(&[rect.x, rect.y, rect.width, rect.height]);
                    serialize_runs(&rect.runs, out);
                }
            }
        }
    }
}

fn serialize_runs(runs: &[RleRun], out: &mut Vec<u8>) {
    out.extend_from_slice(&(runs.len() as u16).to_le_bytes());
    for run in runs {
        out.push(run.count);
        out.extend_from_slice(&run.rgb565.to_le_bytes());
    }
}

/// Per-packet allowance for decoded payload.
///
/// Real allocation failure surfaces through `try_reserve_exact`; the
/// session's configured limit bounds how much one packet may hold. Either
/// way a failed reservation turns the rest of the packet into a discard,
/// never into a stream desync.
#[derive(Debug)]
pub(crate) struct AllocBudget {
    remaining: usize,
}

impl AllocBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            remaining: limit.unwrap_or(usize::MAX),
        }
    }

    /// Reserve a vector of `len` elements against the budget, or `None` if
    /// the budget or the allocator says no.
    pub fn try_vec<T>(&mut self, len: usize) -> Option<Vec<T>> {
        let bytes = len.checked_mul(size_of::<T>())?;
        if bytes > self.remaining {
            return None;
        }

        let mut vec = Vec::new();
        vec.try_reserve_exact(len).ok()?;
        self.remaining -= bytes;
        Some(vec)
    }
}

/// Parse one frame body (encoding tag onward).
///
/// `Ok(None)` means the frame was dropped for lack of memory; its bytes
/// have still been consumed, so the stream stays in sync.
pub(crate) async fn read_frame(
    reader: &mut ChunkReader,
    width: u16,
    height: u16,
    budget: &mut AllocBudget,
) -> Result<Option<Frame>, RemoteDisplayError> {
    let tag = reader.read_u8().await?;
    let encoding =
        FrameEncoding::try_from(tag).map_err(|_| RemoteDisplayError::UnknownFrameEncoding(tag))?;

    match encoding {
        FrameEncoding::KeyframeRaw => {
            read_keyframe_raw(reader, width as usize * height as usize, budget).await
        }
        FrameEncoding::KeyframeRle => read_keyframe_rle(reader, budget).await,
        FrameEncoding::DeltaframeRaw => read_deltaframe_raw(reader, budget).await,
        FrameEncoding::DeltaframeRle => read_deltaframe_rle(reader, budget).await,
    }
}

async fn read_keyframe_raw(
    reader: &mut ChunkReader,
    n_pixels: usize,
    budget: &mut AllocBudget,
) -> Result<Option<Frame>, RemoteDisplayError> {
    let Some(mut pixels) = budget.try_vec::<u16>(n_pixels) else {
        warn!(n_pixels, "out of memory reading raw keyframe, discarding");
        reader.discard(n_pixels * 2).await?;
        return Ok(None);
    };

    for _ in 0..n_pixels {
        pixels.push(reader.read_u16_le().await?);
    }

    Ok(Some(Frame::KeyframeRaw { pixels }))
}

async fn read_keyframe_rle(
    reader: &mut ChunkReader,
    budget: &mut AllocBudget,
) -> Result<Option<Frame>, RemoteDisplayError> {
    match read_rle_runs(reader, budget, true).await? {
        Some(runs) => Ok(Some(Frame::KeyframeRle { runs })),
        None => {
            warn!("out of memory reading RLE keyframe, discarding");
            Ok(None)
        }
    }
}

async fn read_deltaframe_raw(
    reader: &mut ChunkReader,
    budget: &mut AllocBudget,
) -> Result<Option<Frame>, RemoteDisplayError> {
    let n_rects = reader.read_u8().await? as usize;

    let mut rects = budget.try_vec::<RawRect>(n_rects);
    if rects.is_none() {
        warn!(n_rects, "out of memory reading raw deltaframe, discarding");
    }

    for _ in 0..n_rects {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await?;
        let [x, y, width, height] = header;
        let n_pixels = width as usize * height as usize;

        let pixels = match &rects {
            Some(_) => budget.try_vec::<u16>(n_pixels),
            None => None,
        };
        match pixels {
            Some(mut pixels) => {
                for _ in 0..n_pixels {
                    pixels.push(reader.read_u16_le().await?);
                }
                if let Some(rects) = &mut rects {
                    rects.push(RawRect {
                        x,
                        y,
                        width,
                        height,
                        pixels,
                    });
                }
            }
            None => {
                // Dropping the vector frees every rectangle parsed so far;
                // the remaining bytes are consumed to keep the stream in
                // sync.
                if rects.take().is_some() {
                    warn!("out of memory mid raw deltaframe, discarding the rest");
                }
                reader.discard(n_pixels * 2).await?;
            }
        }
    }

    Ok(rects.map(|rects| Frame::DeltaframeRaw { rects }))
}

async fn read_deltaframe_rle(
    reader: &mut ChunkReader,
    budget: &mut AllocBudget,
) -> Result<Option<Frame>, RemoteDisplayError> {
    let n_rects = reader.read_u16_le().await? as usize;

    let mut rects = budget.try_vec::<RleRect>(n_rects);
    if rects.is_none() {
        warn!(n_rects, "out of memory reading RLE deltaframe, discarding");
    }

    for _ in 0..n_rects {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await?;
        let [x, y, width, height] = header;

        match read_rle_runs(reader, budget, rects.is_some()).await? {
            Some(runs) => {
                if let Some(rects) = &mut rects {
                    rects.push(RleRect {
                        x,
                        y,
                        width,
                        height,
                        runs,
                    });
                }
            }
            None => {
                if rects.take().is_some() {
                    warn!("out of memory mid RLE deltaframe, discarding the rest");
                }
            }
        }
    }

    Ok(rects.map(|rects| Frame::DeltaframeRle { rects }))
}

/// Parse one run list (u16le count, then (count, rgb565) pairs).
///
/// With `keep` false, or when the reservation fails, the runs' bytes are
/// consumed in discard mode and `None` comes back.
async fn read_rle_runs(
    reader: &mut ChunkReader,
    budget: &mut AllocBudget,
    keep: bool,
) -> Result<Option<Vec<RleRun>>, RemoteDisplayError> {
    let n_runs = reader.read_u16_le().await? as usize;

    let runs = if keep {
        budget.try_vec::<RleRun>(n_runs)
    } else {
        None
    };

    match runs {
        Some(mut runs) => {
            for _ in 0..n_runs {
                let count = reader.read_u8().await?;
                let rgb565 = reader.read_u16_le().await?;
                if count == 0 {
                    return Err(RemoteDisplayError::EmptyRleRun);
                }
                runs.push(RleRun { count, rgb565 });
            }
            Ok(Some(runs))
        }
        None => {
            reader.discard(n_runs * 3).await?;
            Ok(None)
        }
    }
}
