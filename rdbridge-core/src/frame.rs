//! Updates-channel wire format.
//!
//! Two message shapes travel down the updates channel, both prefixed by a
//! little-endian `u32` length:
//!
//! ```text
//! text message:  [len][utf-8 payload]                      len = payload len, > 0
//! image frame:   [total_len][tag=0][idx][pos_x][pos_y]
//!                [width][height][format][quality][fullscreen][payload]
//! ```
//!
//! `total_len = 36 + payload_len` covers the nine metadata words plus the
//! encoded image. Every integer is a little-endian `u32`. Readers that peek
//! the word after the length prefix can discriminate the two shapes: it is
//! `0` for an image frame, and never `0` for a text message (the bridge only
//! sends non-empty NUL-free text).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BridgeError;
use crate::policy::ImageQuality;

/// Bytes of fixed metadata in an image frame after the length prefix.
pub const FRAME_META_LEN: usize = 36;

/// Tag word distinguishing image frames from text messages.
const IMAGE_TAG: u32 = 0;

// ── FrameFormat ──────────────────────────────────────────────────

/// On-wire format id of an encoded frame payload.
///
/// `Cur` payloads are PNG bytes carrying a pointer image; the separate id
/// tells the browser to treat position as a hot-spot instead of a blit
/// origin.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Cur = 0,
    Png = 1,
    Jpeg = 2,
    Webp = 3,
}

impl TryFrom<u32> for FrameFormat {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameFormat::Cur),
            1 => Ok(FrameFormat::Png),
            2 => Ok(FrameFormat::Jpeg),
            3 => Ok(FrameFormat::Webp),
            _ => Err(BridgeError::UnknownValue {
                type_name: "FrameFormat",
                value,
            }),
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FrameFormat::Cur => "cursor",
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpeg",
            FrameFormat::Webp => "webp",
        };
        f.write_str(s)
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One encoded image with its placement metadata, produced per capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Monotonic image index, wrapping to 0 past `i32::MAX`.
    pub idx: u32,
    /// Blit origin in client coordinates, or the hot-spot for `Cur` frames.
    pub pos_x: u32,
    pub pos_y: u32,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Quality the payload was encoded at (always `Highest` for PNG).
    pub quality: ImageQuality,
    pub fullscreen: bool,
    pub payload: Bytes,
}

impl Frame {
    /// Serialize into a single contiguous buffer, written with one call.
    pub fn to_bytes(&self) -> Bytes {
        let total_len = FRAME_META_LEN + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + total_len);
        buf.put_u32_le(total_len as u32);
        buf.put_u32_le(IMAGE_TAG);
        buf.put_u32_le(self.idx);
        buf.put_u32_le(self.pos_x);
        buf.put_u32_le(self.pos_y);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.format as u32);
        buf.put_u32_le(self.quality.percent());
        buf.put_u32_le(u32::from(self.fullscreen));
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

/// Serialize a text message into its framed form.
///
/// The bridge never sends empty text, which keeps the length prefix nonzero
/// and the two wire shapes distinguishable.
pub fn encode_text(text: &str) -> Bytes {
    debug_assert!(!text.is_empty());
    let mut buf = BytesMut::with_capacity(4 + text.len());
    buf.put_u32_le(text.len() as u32);
    buf.extend_from_slice(text.as_bytes());
    buf.freeze()
}

// ── WireMessage ──────────────────────────────────────────────────

/// A decoded updates-channel message, as the gateway side sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Image(Frame),
    Text(String),
}

impl WireMessage {
    /// Decode one message body (the bytes following the length prefix).
    ///
    /// A body starting with a zero word is an image frame; anything else is
    /// UTF-8 text.
    pub fn from_body(body: &[u8]) -> Result<Self, BridgeError> {
        if body.len() >= FRAME_META_LEN && body[0..4] == [0, 0, 0, 0] {
            return Ok(WireMessage::Image(decode_frame_body(body)?));
        }
        let text = std::str::from_utf8(body)
            .map_err(|_| BridgeError::Parse { tag: "TXT" })?
            .to_owned();
        Ok(WireMessage::Text(text))
    }
}

fn decode_frame_body(body: &[u8]) -> Result<Frame, BridgeError> {
    let word = |i: usize| -> u32 {
        u32::from_le_bytes(body[i * 4..i * 4 + 4].try_into().expect("word slice"))
    };
    Ok(Frame {
        idx: word(1),
        pos_x: word(2),
        pos_y: word(3),
        width: word(4),
        height: word(5),
        format: FrameFormat::try_from(word(6))?,
        quality: ImageQuality::try_from(word(7))?,
        fullscreen: word(8) != 0,
        payload: Bytes::copy_from_slice(&body[FRAME_META_LEN..]),
    })
}
