//! Command application.
//!
//! The dispatcher turns parsed inputs-channel commands into RDP input
//! events, policy mutations and session control. It runs on the input
//! reader task; everything it touches is either owned here (the staged
//! connection settings) or safe to share with the RDP threads.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use rdbridge_core::{Command, MouseButton, WheelDirection};

use crate::capture::{CaptureHooks, CapturePipeline};
use crate::rdp::{
    self, ConnectionSettings, EXTENDED_SCANCODES, KBD_FLAGS_DOWN, KBD_FLAGS_EXTENDED,
    KBD_FLAGS_RELEASE, PTR_FLAGS_DOWN, PTR_FLAGS_MOVE, PTR_FLAGS_WHEEL,
    PTR_FLAGS_WHEEL_NEGATIVE, RdpClient,
};
use crate::session::SessionState;
use crate::writer::UpdatesSender;

pub struct Dispatcher {
    state: Arc<SessionState>,
    rdp: Arc<dyn RdpClient>,
    capture: Arc<CapturePipeline>,
    updates: UpdatesSender,
    /// Connection parameters staged until `CON`.
    settings: Mutex<ConnectionSettings>,
}

impl Dispatcher {
    pub fn new(
        state: Arc<SessionState>,
        rdp: Arc<dyn RdpClient>,
        capture: Arc<CapturePipeline>,
        updates: UpdatesSender,
    ) -> Self {
        Self {
            state,
            rdp,
            capture,
            updates,
            settings: Mutex::new(ConnectionSettings::new()),
        }
    }

    /// Apply one command. Never terminal except for `CLO`, which flips the
    /// session's `process_inputs` flag.
    pub fn apply(&self, command: Command) {
        match command {
            // ── Connection staging ───────────────────────────────
            Command::ServerAddress { host, port } => {
                self.settings().set_server(host, port);
            }
            Command::VmGuid(guid) => self.settings().set_vm_guid(guid),
            Command::Domain(domain) => self.settings().domain = Some(domain),
            Command::Username(raw) => self.settings().set_username(&raw),
            Command::Password(password) => self.settings().password = password,
            Command::StartProgram(program) => {
                self.settings().start_program = Some(program);
            }
            Command::Connect => {
                let settings = self.settings().clone();
                info!(?settings, "starting RDP client");
                if let Err(err) = self.rdp.connect(settings) {
                    warn!("RDP connect failed: {err}");
                }
            }

            // ── Keyboard ─────────────────────────────────────────
            Command::UnicodeKey { code, down } => {
                self.rdp.unicode_keyboard_event(key_flags(down), code);
            }
            Command::ScancodeKey { code, down } => {
                let mut flags = key_flags(down);
                // The navigation cluster needs the extended flag, but only
                // key-down carries it on this path.
                if down && EXTENDED_SCANCODES.contains(&code) {
                    flags |= KBD_FLAGS_EXTENDED;
                }
                self.rdp.keyboard_event(flags, code);
            }

            // ── Pointer ──────────────────────────────────────────
            Command::MouseMove { x, y } => {
                let (x, y) = self.to_desktop(x, y);
                self.rdp.mouse_event(PTR_FLAGS_MOVE, x, y);
            }
            Command::MouseButton { button, down, x, y } => {
                let mut flags = button_flags(button);
                if down {
                    flags |= PTR_FLAGS_DOWN;
                }
                let (x, y) = self.to_desktop(x, y);
                self.rdp.mouse_event(flags, x, y);
            }
            Command::MouseWheel { direction, x, y } => {
                let flags = match direction {
                    WheelDirection::Up => PTR_FLAGS_WHEEL | rdp::WHEEL_ROTATION_UP,
                    WheelDirection::Down => {
                        PTR_FLAGS_WHEEL | PTR_FLAGS_WHEEL_NEGATIVE | rdp::WHEEL_ROTATION_DOWN
                    }
                };
                let (x, y) = self.to_desktop(x, y);
                self.rdp.mouse_event(flags, x, y);
            }

            // ── Display policy ───────────────────────────────────
            Command::BrowserResize { width, height } => {
                self.state.set_client_size(width, height);
            }
            Command::ScaleDisplay(dimensions) => {
                self.state.set_scaling(dimensions);
                self.updates.send_text("reload");
            }
            Command::ModeToggle => self.updates.send_text("reload"),
            Command::SetEncoding(encoding) => {
                debug!(?encoding, "image encoding changed");
                self.state.set_encoding(encoding);
            }
            Command::SetQuality(quality) => self.state.set_quality(quality),
            Command::SetQuantity(quantity) => self.state.set_quantity(quantity),

            // ── Session control ──────────────────────────────────
            Command::FullscreenRequest => {
                let capture = self.capture.clone();
                tokio::task::spawn_blocking(move || capture.send_screen());
            }
            Command::ClipboardRequest => match self.state.cached_clipboard() {
                Some(text) => self.updates.send_text(text),
                // An update is pending: fetch the remote value; it will be
                // echoed when it arrives.
                None => self.rdp.request_clipboard(),
            },
            Command::CloseClient => {
                info!("close requested by gateway");
                self.state.shutdown();
            }
        }
    }

    fn settings(&self) -> std::sync::MutexGuard<'_, ConnectionSettings> {
        self.settings.lock().expect("settings lock")
    }

    /// Remap a client-space pointer position to desktop space when scaling
    /// is active.
    fn to_desktop(&self, x: u16, y: u16) -> (u16, u16) {
        let policy = self.state.policy();
        let Some((desktop_w, desktop_h)) = self.capture.desktop_size() else {
            return (x, y);
        };
        if !policy.scales_from((desktop_w, desktop_h)) {
            return (x, y);
        }
        let scale = |v: u16, desktop: u32, client: u32| -> u16 {
            (v as u64 * desktop as u64 / client as u64).min(u16::MAX as u64) as u16
        };
        (
            scale(x, desktop_w, policy.client_width),
            scale(y, desktop_h, policy.client_height),
        )
    }
}

fn key_flags(down: bool) -> u16 {
    if down { KBD_FLAGS_DOWN } else { KBD_FLAGS_RELEASE }
}

fn button_flags(button: MouseButton) -> u16 {
    match button {
        MouseButton::Left => rdp::PTR_FLAGS_BUTTON1,
        MouseButton::Right => rdp::PTR_FLAGS_BUTTON2,
        MouseButton::Middle => rdp::PTR_FLAGS_BUTTON3,
    }
}
