// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Length-prefixed JSON framing shared by data edges and the control channel.
//!
//! Every frame is a big-endian `u32` byte count followed by a JSON body.

use crate::errors::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body accepted in either direction.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value).map_err(|e| TransportError::Codec {
        type_name: "frame".to_string(),
        reason: e.to_string(),
    })?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame; `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_BYTES,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| TransportError::Codec {
            type_name: "frame".to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[tokio::test]
    async fn test_frames_are_length_prefixed() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &Ping { seq: 9 }).await.unwrap();
        let body = br#"{"seq":9}"#;
        assert_eq!(&buffer[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&buffer[4..], body);

        let mut reader = buffer.as_slice();
        let ping: Option<Ping> = read_frame(&mut reader).await.unwrap();
        assert_eq!(ping, Some(Ping { seq: 9 }));
        let end: Option<Ping> = read_frame(&mut reader).await.unwrap();
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let header = ((MAX_FRAME_BYTES + 1) as u32).to_be_bytes();
        let mut reader = &header[..];
        let result: Result<Option<Ping>, _> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_garbage_body_is_a_codec_error() {
        let mut frame = 3u32.to_be_bytes().to_vec();
        frame.extend_from_slice(b"{{{");
        let mut reader = frame.as_slice();
        let result: Result<Option<Ping>, _> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(TransportError::Codec { .. })));
    }
}
