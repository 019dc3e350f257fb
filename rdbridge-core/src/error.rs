//! Domain-specific error types for the session bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::io;

use thiserror::Error;

use crate::frame::FrameFormat;

// ── IpcErrorKind ─────────────────────────────────────────────────

/// Classified cause of an IPC channel failure.
///
/// Mirrors the error codes a local named channel can report; anything
/// unclassified maps to [`IpcErrorKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcErrorKind {
    /// The channel handle is no longer valid.
    InvalidHandle,
    /// The peer endpoint never connected or went away before connecting.
    NotConnected,
    /// The channel is busy with another client.
    Busy,
    /// The channel exists but is in an unusable state.
    BadChannel,
    /// The peer closed its end mid-session.
    BrokenChannel,
    /// Any other I/O failure.
    Other,
}

impl IpcErrorKind {
    /// Classify a raw I/O error into a channel error kind.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => IpcErrorKind::InvalidHandle,
            io::ErrorKind::NotConnected | io::ErrorKind::ConnectionRefused => {
                IpcErrorKind::NotConnected
            }
            io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy => IpcErrorKind::Busy,
            io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => IpcErrorKind::BadChannel,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => IpcErrorKind::BrokenChannel,
            _ => IpcErrorKind::Other,
        }
    }
}

impl std::fmt::Display for IpcErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IpcErrorKind::InvalidHandle => "invalid handle",
            IpcErrorKind::NotConnected => "not connected",
            IpcErrorKind::Busy => "busy",
            IpcErrorKind::BadChannel => "bad channel",
            IpcErrorKind::BrokenChannel => "broken channel",
            IpcErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

// ── SpoolerOp ────────────────────────────────────────────────────

/// The spooler call that failed, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoolerOp {
    Open,
    StartDoc,
    StartPage,
    Write,
    EndPage,
    EndDoc,
    Close,
    Enumerate,
}

impl std::fmt::Display for SpoolerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpoolerOp::Open => "open",
            SpoolerOp::StartDoc => "start-doc",
            SpoolerOp::StartPage => "start-page",
            SpoolerOp::Write => "write",
            SpoolerOp::EndPage => "end-page",
            SpoolerOp::EndDoc => "end-doc",
            SpoolerOp::Close => "close",
            SpoolerOp::Enumerate => "enumerate",
        };
        f.write_str(s)
    }
}

// ── BridgeError ──────────────────────────────────────────────────

/// The canonical error type for the session bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── IPC errors (terminal for the session) ────────────────────
    /// Reading from the inputs channel failed.
    #[error("inputs channel read failed ({kind}): {source}")]
    IpcRead {
        kind: IpcErrorKind,
        #[source]
        source: io::Error,
    },

    /// Writing to the updates channel failed.
    #[error("updates channel write failed ({kind}): {source}")]
    IpcWrite {
        kind: IpcErrorKind,
        #[source]
        source: io::Error,
    },

    /// Connecting an IPC channel failed at session start.
    #[error("failed to connect channel '{name}': {source}")]
    IpcConnect {
        name: String,
        #[source]
        source: io::Error,
    },

    // ── Pipeline errors (non-terminal, frame is dropped) ─────────
    /// An image encoder failed; the affected frame is dropped.
    #[error("{format} encoding failed: {reason}")]
    Encode { format: FrameFormat, reason: String },

    // ── Parse errors (non-terminal, record is skipped) ───────────
    /// A known command tag carried arguments that could not be parsed.
    /// Deliberately does not capture the argument text.
    #[error("malformed arguments for command tag {tag}")]
    Parse { tag: &'static str },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} value: {value}")]
    UnknownValue { type_name: &'static str, value: u32 },

    // ── Printer errors ───────────────────────────────────────────
    /// A spooler call failed; the print job is considered closed.
    #[error("spooler {op} failed: {source}")]
    Spooler {
        op: SpoolerOp,
        #[source]
        source: io::Error,
    },

    /// A print job was requested while another is active on the printer.
    #[error("printer '{printer}' is busy with another print job")]
    PrinterBusy { printer: String },

    /// The referenced printer is not registered.
    #[error("unknown printer id {0}")]
    UnknownPrinter(u32),

    // ── Lifecycle errors ─────────────────────────────────────────
    /// A lifecycle transition was requested from the wrong phase.
    #[error("invalid session phase transition: {0}")]
    InvalidPhase(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Build an inputs-channel read error, classifying the cause.
    pub fn ipc_read(source: io::Error) -> Self {
        BridgeError::IpcRead {
            kind: IpcErrorKind::classify(&source),
            source,
        }
    }

    /// Build an updates-channel write error, classifying the cause.
    pub fn ipc_write(source: io::Error) -> Self {
        BridgeError::IpcWrite {
            kind: IpcErrorKind::classify(&source),
            source,
        }
    }

    /// Whether this error must tear the session down.
    ///
    /// Only IPC failures are terminal; encode, parse and spooler errors
    /// drop the affected work item and the session carries on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BridgeError::IpcRead { .. }
                | BridgeError::IpcWrite { .. }
                | BridgeError::IpcConnect { .. }
        )
    }
}
