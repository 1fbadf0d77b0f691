//! # Stream
//!
//! Reads and writes single envelopes over async byte streams. An envelope is
//! one polypack Variant, so its own length header is the frame: no extra
//! length prefix goes on the wire.

use polypack::FRAME_HEADER_LEN;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::envelope::RequestEnvelope;
use crate::error::WireError;

/// Upper bound on an envelope accepted from the network.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Failures while moving envelopes over a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// The peer closed the stream before sending anything.
    #[error("stream closed by peer")]
    Closed,
}

impl From<polypack::Error> for StreamError {
    fn from(e: polypack::Error) -> Self {
        StreamError::Wire(WireError::Codec(e))
    }
}

/// Reads exactly one envelope.
pub async fn read_envelope<R>(reader: &mut R, max_frame_len: usize) -> Result<RequestEnvelope, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let first = reader.read(&mut header[..1]).await?;
    if first == 0 {
        return Err(StreamError::Closed);
    }
    reader.read_exact(&mut header[1..]).await?;

    let body_len = polypack::frame_body_len(&header)?;
    let total = FRAME_HEADER_LEN + body_len;
    if total > max_frame_len {
        return Err(StreamError::FrameTooLarge { len: total, max: max_frame_len });
    }

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&header);
    frame.resize(total, 0);
    reader.read_exact(&mut frame[FRAME_HEADER_LEN..]).await?;

    Ok(RequestEnvelope::decode(&frame)?)
}

/// Writes one envelope and flushes.
pub async fn write_envelope<W>(writer: &mut W, envelope: &RequestEnvelope) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = envelope.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
