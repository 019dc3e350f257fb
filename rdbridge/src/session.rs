//! Session state and the bridge lifecycle.
//!
//! One `Bridge` serves one remote session. The shared [`SessionState`] is
//! mutated by the input reader task and read by capture callbacks arriving
//! on the RDP client's threads; scalar policy fields and counters are
//! atomics, the clipboard and the client dimensions (which mutate together)
//! sit behind mutexes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use rdbridge_core::{
    BridgeError, INPUTS_READ_CHUNK, ImageEncoding, ImagePolicy, ImageQuality, ImageQuantity,
    parse_record, split_batch,
};

use crate::capture::{CaptureHooks, CapturePipeline};
use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::printer::{PrinterRegistry, Spooler};
use crate::rdp::RdpClient;
use crate::surface::{DesktopSurface, PointerSource};
use crate::writer::{Emit, UpdatesSender, UpdatesWriter, queue};

/// Idle wait after an empty inputs read, so a closed peer cannot spin the
/// reader. An empty read is not a failure and never terminates the session.
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);

// ── Phase ────────────────────────────────────────────────────────

/// Lifecycle phase of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Settings staged, channels not yet open.
    #[default]
    Configured,
    /// Both IPC channels are open.
    Connected,
    /// The input reader and updates writer are live.
    Running,
    /// Teardown has begun; the process is expected to exit soon after.
    Terminating,
}

impl Phase {
    fn connect(&mut self) -> Result<(), BridgeError> {
        match self {
            Phase::Configured => {
                *self = Phase::Connected;
                Ok(())
            }
            _ => Err(BridgeError::InvalidPhase("connect requires Configured")),
        }
    }

    fn start(&mut self) -> Result<(), BridgeError> {
        match self {
            Phase::Connected => {
                *self = Phase::Running;
                Ok(())
            }
            _ => Err(BridgeError::InvalidPhase("start requires Connected")),
        }
    }

    fn terminate(&mut self) {
        *self = Phase::Terminating;
    }
}

// ── ClipboardState ───────────────────────────────────────────────

/// Last known remote clipboard text, already carrying the wire prefix.
#[derive(Debug)]
struct ClipboardState {
    text: String,
    /// Set when the remote clipboard changed since the text was last
    /// transmitted; cleared once it has been fetched and sent.
    updated: bool,
}

const CLIPBOARD_PREFIX: &str = "clipboard|";

impl Default for ClipboardState {
    fn default() -> Self {
        Self {
            text: CLIPBOARD_PREFIX.to_owned(),
            updated: false,
        }
    }
}

// ── SessionState ─────────────────────────────────────────────────

/// State shared between the reader task and the RDP-thread callbacks.
pub struct SessionState {
    id: u32,
    encoding: AtomicU32,
    quality: AtomicU32,
    quantity: AtomicU32,
    scale_display: AtomicBool,
    client_size: Mutex<(u32, u32)>,
    image_idx: AtomicU32,
    process_inputs: AtomicBool,
    cancel: CancellationToken,
    clipboard: Mutex<ClipboardState>,
}

impl SessionState {
    pub fn new(id: u32) -> Self {
        let policy = ImagePolicy::default();
        Self {
            id,
            encoding: AtomicU32::new(policy.encoding as u32),
            quality: AtomicU32::new(policy.quality.percent()),
            quantity: AtomicU32::new(policy.quantity as u32),
            scale_display: AtomicBool::new(policy.scale_display),
            client_size: Mutex::new((policy.client_width, policy.client_height)),
            image_idx: AtomicU32::new(0),
            process_inputs: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            clipboard: Mutex::new(ClipboardState::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// A consistent snapshot of the image policy, read once per frame.
    pub fn policy(&self) -> ImagePolicy {
        let (client_width, client_height) = *self.client_size.lock().expect("client size lock");
        ImagePolicy {
            encoding: ImageEncoding::try_from(self.encoding.load(Ordering::SeqCst))
                .unwrap_or_default(),
            quality: ImageQuality::try_from(self.quality.load(Ordering::SeqCst))
                .unwrap_or_default(),
            quantity: ImageQuantity::try_from(self.quantity.load(Ordering::SeqCst))
                .unwrap_or_default(),
            scale_display: self.scale_display.load(Ordering::SeqCst),
            client_width,
            client_height,
        }
    }

    /// `ECD`: a new encoding resets the quality to its default.
    pub fn set_encoding(&self, encoding: ImageEncoding) {
        self.encoding.store(encoding as u32, Ordering::SeqCst);
        self.quality
            .store(ImageQuality::default().percent(), Ordering::SeqCst);
    }

    pub fn set_quality(&self, quality: ImageQuality) {
        self.quality.store(quality.percent(), Ordering::SeqCst);
    }

    pub fn set_quantity(&self, quantity: ImageQuantity) {
        self.quantity.store(quantity as u32, Ordering::SeqCst);
    }

    pub fn set_client_size(&self, width: u32, height: u32) {
        *self.client_size.lock().expect("client size lock") = (width, height);
    }

    pub fn set_scaling(&self, dimensions: Option<(u32, u32)>) {
        match dimensions {
            Some((w, h)) => {
                self.set_client_size(w, h);
                self.scale_display.store(true, Ordering::SeqCst);
            }
            None => self.scale_display.store(false, Ordering::SeqCst),
        }
    }

    /// Allocate the next image index, wrapping to 0 past `i32::MAX`.
    pub fn next_image_idx(&self) -> u32 {
        let previous = self
            .image_idx
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idx| {
                Some(if idx >= i32::MAX as u32 { 0 } else { idx + 1 })
            })
            .expect("idx update never fails");
        if previous >= i32::MAX as u32 {
            0
        } else {
            previous + 1
        }
    }

    pub fn process_inputs(&self) -> bool {
        self.process_inputs.load(Ordering::SeqCst)
    }

    /// Cooperative teardown: stop the reader and wake anything blocked.
    pub fn shutdown(&self) {
        self.process_inputs.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    // ── Clipboard ────────────────────────────────────────────────

    /// Remote clipboard changed but the text is not here yet.
    pub fn reset_clipboard(&self) {
        let mut clipboard = self.clipboard.lock().expect("clipboard lock");
        clipboard.text = CLIPBOARD_PREFIX.to_owned();
        clipboard.updated = true;
    }

    /// Store freshly received clipboard text and return the wire form.
    pub fn store_clipboard(&self, data: &str) -> String {
        let mut text = String::with_capacity(CLIPBOARD_PREFIX.len() + data.len());
        text.push_str(CLIPBOARD_PREFIX);
        text.extend(data.chars().filter(|&c| c != '\0'));
        let mut clipboard = self.clipboard.lock().expect("clipboard lock");
        clipboard.text = text.clone();
        clipboard.updated = false;
        text
    }

    /// The cached clipboard text, unless an update is pending (in which
    /// case the remote value must be fetched first).
    pub fn cached_clipboard(&self) -> Option<String> {
        let clipboard = self.clipboard.lock().expect("clipboard lock");
        if clipboard.updated {
            None
        } else {
            Some(clipboard.text.clone())
        }
    }
}

// ── Bridge ───────────────────────────────────────────────────────

/// The per-process session bridge.
///
/// Owns the shared state, the capture pipeline, the printer relay and the
/// emission queue; `run` drives the IPC side until the session ends.
pub struct Bridge {
    config: BridgeConfig,
    state: Arc<SessionState>,
    rdp: Arc<dyn RdpClient>,
    capture: Arc<CapturePipeline>,
    printers: Arc<PrinterRegistry>,
    updates: UpdatesSender,
    emit_rx: Mutex<Option<mpsc::UnboundedReceiver<Emit>>>,
    phase: Mutex<Phase>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        rdp: Arc<dyn RdpClient>,
        surface: Arc<dyn DesktopSurface>,
        pointer: Arc<dyn PointerSource>,
        spooler: Arc<dyn Spooler>,
    ) -> Self {
        let state = Arc::new(SessionState::new(config.session.id));
        let (updates, emit_rx) = queue();
        let capture = Arc::new(CapturePipeline::new(
            state.clone(),
            surface,
            pointer,
            updates.clone(),
            &config,
        ));
        let printers = Arc::new(PrinterRegistry::new(spooler, updates.clone()));
        Self {
            config,
            state,
            rdp,
            capture,
            printers,
            updates,
            emit_rx: Mutex::new(Some(emit_rx)),
            phase: Mutex::new(Phase::default()),
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("phase lock")
    }

    /// The capture entry points, for injection into the RDP client.
    pub fn capture_hooks(&self) -> Arc<dyn CaptureHooks> {
        self.capture.clone()
    }

    /// The printer relay, for injection into the print virtual channel.
    pub fn printers(&self) -> &Arc<PrinterRegistry> {
        &self.printers
    }

    // ── Clipboard entry points (called from the RDP client) ─────

    /// The remote clipboard changed; the text will be requested on demand.
    pub fn reset_clipboard(&self) {
        if self.state.id() == 0 {
            return;
        }
        self.state.reset_clipboard();
    }

    /// Remote clipboard text arrived; cache it and echo it to the gateway.
    pub fn push_clipboard(&self, data: &str) {
        if self.state.id() == 0 {
            return;
        }
        let text = self.state.store_clipboard(data);
        self.updates.send_text(text);
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Connect the session's IPC channels and run until teardown.
    pub async fn run(&self) -> Result<(), BridgeError> {
        if self.state.id() == 0 {
            info!("session id 0: bridge disabled");
            return Ok(());
        }
        let (inputs, updates) = crate::ipc::connect(self.state.id(), &self.config.ipc).await?;
        self.run_with_channels(inputs, updates).await
    }

    /// Run against already-open channel endpoints.
    pub async fn run_with_channels<I, U>(&self, inputs: I, updates: U) -> Result<(), BridgeError>
    where
        I: AsyncRead + Unpin,
        U: AsyncWrite + Unpin + Send + 'static,
    {
        if self.state.id() == 0 {
            info!("session id 0: bridge disabled");
            return Ok(());
        }
        self.phase.lock().expect("phase lock").connect()?;
        info!(session = self.state.id(), "session channels connected");

        let emit_rx = self
            .emit_rx
            .lock()
            .expect("emit queue lock")
            .take()
            .ok_or(BridgeError::InvalidPhase("bridge already ran"))?;
        let writer = UpdatesWriter::new(updates, emit_rx, self.state.clone());
        let writer_task = tokio::spawn(writer.run());

        // Handshake so the gateway knows the bridge is live.
        self.updates.send_text("Hello server");

        self.phase.lock().expect("phase lock").start()?;
        self.read_inputs(inputs).await;

        // Teardown: stop the writer, close both channels, drop the client.
        self.phase.lock().expect("phase lock").terminate();
        self.state.shutdown();
        let _ = writer_task.await;
        self.rdp.disconnect();
        info!(session = self.state.id(), "session ended");
        Ok(())
    }

    /// The input reader: block on channel reads, split each batch on `\t`,
    /// dispatch records in order. Read failures are terminal.
    async fn read_inputs<I: AsyncRead + Unpin>(&self, mut inputs: I) {
        let dispatcher = Dispatcher::new(
            self.state.clone(),
            self.rdp.clone(),
            self.capture.clone(),
            self.updates.clone(),
        );
        let mut buf = vec![0u8; INPUTS_READ_CHUNK];

        while self.state.process_inputs() {
            let read = tokio::select! {
                read = inputs.read(&mut buf) => read,
                _ = self.state.cancelled() => break,
            };
            let n = match read {
                Ok(n) => n,
                Err(source) => {
                    error!("{}", BridgeError::ipc_read(source));
                    break;
                }
            };
            if n == 0 {
                tokio::time::sleep(EMPTY_READ_BACKOFF).await;
                continue;
            }

            let batch = String::from_utf8_lossy(&buf[..n]);
            debug!(batch = %redact_batch(&batch), "inputs batch");

            // Records are applied in receive order. A CLO inside the batch
            // does not stop the remaining records; the loop condition ends
            // the reader after the batch.
            for record in split_batch(&batch) {
                match parse_record(record) {
                    Ok(Some(command)) => dispatcher.apply(command),
                    Ok(None) => trace!(record, "ignored unknown tag"),
                    Err(err) => debug!("{err}; record skipped"),
                }
            }
        }
        self.state.shutdown();
    }
}

/// Render a batch for the log with password arguments masked.
fn redact_batch(batch: &str) -> String {
    batch
        .split('\t')
        .map(|record| if record.starts_with("PWD") { "PWD***" } else { record })
        .collect::<Vec<_>>()
        .join("\t")
}
