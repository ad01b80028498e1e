/// Framing for the live event channel
///
/// Every frame is a u32 big-endian length prefix followed by a JSON
/// payload. One frame carries exactly one event.
use crate::error::{ChatError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Refuse frames larger than this; a legitimate event never comes close
const MAX_FRAME_LEN: usize = 256 * 1024;

/// Protocol frame with length prefix
#[derive(Debug)]
pub struct Frame {
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame from any serializable event
    pub fn from_event<T: Serialize>(event: &T) -> Result<Self> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self {
            length: payload.len() as u32,
            payload,
        })
    }

    /// Serialize frame to bytes (length prefix + payload)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode the payload into an event
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(ChatError::Serialization)
    }
}

/// Read one frame off the stream. `Ok(None)` means the peer closed cleanly.
pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ChatError::Io(e)),
    }

    let length = u32::from_be_bytes(len_buf) as usize;
    if length > MAX_FRAME_LEN {
        return Err(ChatError::Protocol(format!(
            "Frame too large: {} bytes",
            length
        )));
    }

    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await.map_err(ChatError::Io)?;

    Ok(Some(Frame {
        length: length as u32,
        payload,
    }))
}

/// Write one event as a frame
pub async fn write_event<W, T>(stream: &mut W, event: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = Frame::from_event(event)?;
    stream.write_all(&frame.to_bytes()).await.map_err(ChatError::Io)?;
    Ok(())
}
