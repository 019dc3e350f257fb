//! Single-writer actor for the updates channel.
//!
//! The input reader, the capture callbacks and the printer relay all emit
//! into one queue; only the actor task touches the channel handle, so a
//! frame and a text message can never interleave on the wire. Each message
//! goes out as one contiguous buffer.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use rdbridge_core::{BridgeError, Frame, encode_text};

use crate::session::SessionState;

/// A queued updates-channel emission.
#[derive(Debug)]
pub enum Emit {
    Frame(Frame),
    Text(String),
}

/// Build the emission queue shared by every producer in the session.
pub fn queue() -> (UpdatesSender, mpsc::UnboundedReceiver<Emit>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdatesSender { tx }, rx)
}

// ── UpdatesSender ────────────────────────────────────────────────

/// Cloneable handle pushing emissions into the writer actor.
///
/// Sends are non-blocking and callable from synchronous RDP callbacks; a
/// send after the actor exited is silently dropped (the session is already
/// tearing down).
#[derive(Clone)]
pub struct UpdatesSender {
    tx: mpsc::UnboundedSender<Emit>,
}

impl UpdatesSender {
    pub fn send_frame(&self, frame: Frame) {
        let _ = self.tx.send(Emit::Frame(frame));
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        let _ = self.tx.send(Emit::Text(text));
    }
}

// ── UpdatesWriter ────────────────────────────────────────────────

/// The actor owning the updates channel handle.
pub struct UpdatesWriter<W> {
    channel: W,
    rx: mpsc::UnboundedReceiver<Emit>,
    state: Arc<SessionState>,
}

impl<W: AsyncWrite + Unpin> UpdatesWriter<W> {
    pub fn new(channel: W, rx: mpsc::UnboundedReceiver<Emit>, state: Arc<SessionState>) -> Self {
        Self { channel, rx, state }
    }

    /// Drain the queue until the session shuts down or a write fails.
    ///
    /// A write failure is terminal for the session: `process_inputs` is
    /// cleared and the reader is woken so it can exit. On shutdown,
    /// already-queued emissions are flushed before the channel closes.
    pub async fn run(mut self) {
        loop {
            let emit = tokio::select! {
                emit = self.rx.recv() => match emit {
                    Some(emit) => emit,
                    None => break,
                },
                _ = self.state.cancelled() => {
                    self.drain().await;
                    break;
                }
            };
            if self.write(emit).await.is_err() {
                break;
            }
        }
        let _ = self.channel.shutdown().await;
    }

    /// Flush emissions queued before the shutdown signal.
    async fn drain(&mut self) {
        while let Ok(emit) = self.rx.try_recv() {
            if self.write(emit).await.is_err() {
                return;
            }
        }
    }

    async fn write(&mut self, emit: Emit) -> Result<(), ()> {
        let buf = match &emit {
            Emit::Frame(frame) => frame.to_bytes(),
            Emit::Text(text) => encode_text(text),
        };
        if let Err(source) = self.channel.write_all(&buf).await {
            let err = BridgeError::ipc_write(source);
            error!("{err}; closing session");
            self.state.shutdown();
            return Err(());
        }
        match emit {
            Emit::Frame(frame) => {
                debug!(
                    idx = frame.idx,
                    format = %frame.format,
                    len = frame.payload.len(),
                    "sent frame"
                );
            }
            Emit::Text(text) => debug!(len = text.len(), "sent text message"),
        }
        Ok(())
    }
}
