//! Protocol definitions shared by the bridge service and the gateway side.
//!
//! The bridge speaks two wire formats over a pair of local IPC channels:
//!
//! - **inputs** (gateway → bridge): ASCII records separated by `\t`, each a
//!   3-character tag followed by tag-specific arguments ([`Command`]).
//! - **updates** (bridge → gateway): length-prefixed binary messages, either
//!   an encoded image frame or a UTF-8 text message ([`WireMessage`]).

mod command;
mod error;
mod frame;
mod policy;

pub use command::{Command, MouseButton, WheelDirection, parse_record, split_batch};
pub use error::{BridgeError, IpcErrorKind, SpoolerOp};
pub use frame::{FRAME_META_LEN, Frame, FrameFormat, WireMessage, encode_text};
pub use policy::{ImageEncoding, ImagePolicy, ImageQuality, ImageQuantity};

/// Maximum bytes consumed from the inputs channel per read.
pub const INPUTS_READ_CHUNK: usize = 4096;

/// Encoded image payloads above this size are dropped rather than sent, so a
/// single frame can never overload the updates channel or the browser.
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;
