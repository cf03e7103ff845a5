//! Binary frame decoding.
//!
//! ComfyUI pushes images over the WebSocket as binary frames: an 8-byte
//! header (big-endian `u32` event type, big-endian `u32` image format)
//! followed by the encoded image. [`decode_artifact`] strips the header,
//! validates the payload as an image, and normalises it to PNG.

use std::io::Cursor;

use image::ImageFormat;

/// Length of the framing prefix in front of every binary payload.
pub const FRAME_HEADER_LEN: usize = 8;

/// Event type used by ComfyUI for encoded image frames.
pub const EVENT_PREVIEW_IMAGE: u32 = 1;

/// Image format code for JPEG payloads.
pub const FORMAT_JPEG: u32 = 1;

/// Image format code for PNG payloads.
pub const FORMAT_PNG: u32 = 2;

/// The decoded 8-byte framing prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub event_type: u32,
    pub image_format: u32,
}

/// A validated image received from the backend, normalised to PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub header: FrameHeader,
    /// PNG-encoded image bytes.
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Errors produced while decoding a binary frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The frame is too short to even hold the header.
    #[error("Binary frame of {len} bytes is shorter than the 8-byte header")]
    TooShort { len: usize },

    /// The payload after the header is not a decodable image.
    #[error("Binary frame payload is not a valid image: {0}")]
    InvalidImage(String),

    /// The image decoded but could not be re-encoded as PNG.
    #[error("Failed to re-encode image as PNG: {0}")]
    Encode(String),
}

/// Split a binary frame into its header and image payload.
pub fn split_frame(data: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(FrameError::TooShort { len: data.len() });
    }

    let (head, payload) = data.split_at(FRAME_HEADER_LEN);
    let header = FrameHeader {
        event_type: u32::from_be_bytes([head[0], head[1], head[2], head[3]]),
        image_format: u32::from_be_bytes([head[4], head[5], head[6], head[7]]),
    };
    Ok((header, payload))
}

/// Decode a full binary frame into a PNG [`Artifact`].
///
/// PNG payloads are kept byte-for-byte; any other supported format is
/// re-encoded so the stored artifact always matches `image/png`.
pub fn decode_artifact(data: &[u8]) -> Result<Artifact, FrameError> {
    let (header, payload) = split_frame(data)?;

    let format =
        image::guess_format(payload).map_err(|e| FrameError::InvalidImage(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(payload, format)
        .map_err(|e| FrameError::InvalidImage(e.to_string()))?;

    let png = if format == ImageFormat::Png {
        payload.to_vec()
    } else {
        let mut buf = Cursor::new(Vec::new());
        decoded
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        buf.into_inner()
    };

    Ok(Artifact {
        header,
        png,
        width: decoded.width(),
        height: decoded.height(),
    })
}
