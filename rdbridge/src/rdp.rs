//! RDP client facade and connection staging.
//!
//! The protocol stack itself (connection, security negotiation, graphics
//! pipeline, input encoding) lives outside this crate; the bridge drives it
//! through [`RdpClient`] and stages credentials in [`ConnectionSettings`]
//! until the `CON` command fires.

use std::fmt;

use rdbridge_core::BridgeError;

// ── Input event flags (MS-RDPBCGR) ───────────────────────────────

pub const KBD_FLAGS_EXTENDED: u16 = 0x0100;
pub const KBD_FLAGS_DOWN: u16 = 0x4000;
pub const KBD_FLAGS_RELEASE: u16 = 0x8000;

pub const PTR_FLAGS_WHEEL_NEGATIVE: u16 = 0x0100;
pub const PTR_FLAGS_WHEEL: u16 = 0x0200;
pub const PTR_FLAGS_MOVE: u16 = 0x0800;
pub const PTR_FLAGS_DOWN: u16 = 0x8000;
pub const PTR_FLAGS_BUTTON1: u16 = 0x1000;
pub const PTR_FLAGS_BUTTON2: u16 = 0x2000;
pub const PTR_FLAGS_BUTTON3: u16 = 0x4000;

/// Wheel rotation magnitude for one browser wheel notch, upward.
pub const WHEEL_ROTATION_UP: u16 = 0x0078;
/// Rotation magnitude paired with `PTR_FLAGS_WHEEL_NEGATIVE`, downward.
pub const WHEEL_ROTATION_DOWN: u16 = 0x0088;

/// Scancodes that must carry `KBD_FLAGS_EXTENDED` on key-down: the
/// navigation cluster (home, arrows, insert, delete, page keys), which
/// otherwise collides with the numeric keypad.
///
/// Key-up for the same codes is dispatched without the flag; the servers in
/// the field tolerate the asymmetry.
pub const EXTENDED_SCANCODES: [u16; 8] = [71, 72, 73, 75, 77, 79, 80, 81];

/// TCP port of the Hyper-V VM-connect endpoint.
pub const VMCONNECT_PORT: u16 = 2179;

const DEFAULT_RDP_PORT: u16 = 3389;

// ── ConnectionSettings ───────────────────────────────────────────

/// Connection parameters staged by `SRV` / `VMG` / `DOM` / `USR` / `PWD` /
/// `PRG` before `CON` hands them to the RDP client.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    port: Option<u16>,
    pub domain: Option<String>,
    pub username: String,
    pub password: String,
    /// Alternate shell to start instead of the desktop.
    pub start_program: Option<String>,
    /// VM GUID sent in a preconnection PDU when targeting Hyper-V.
    pub vm_guid: Option<String>,
    /// Security negotiation is disabled in VM-connect mode.
    pub negotiate_security: bool,
}

impl ConnectionSettings {
    pub fn new() -> Self {
        Self {
            negotiate_security: true,
            ..Self::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_RDP_PORT)
    }

    /// `SRV`: update the host, keeping the current port when none is given.
    pub fn set_server(&mut self, host: String, port: Option<u16>) {
        self.host = host;
        if port.is_some() {
            self.port = port;
        }
    }

    /// `VMG`: target a Hyper-V VM through the VM-connect endpoint with a
    /// preconnection blob, skipping security negotiation.
    pub fn set_vm_guid(&mut self, guid: String) {
        self.vm_guid = Some(guid);
        self.port = Some(VMCONNECT_PORT);
        self.negotiate_security = false;
    }

    /// `USR`: when no domain was staged yet, split `user@domain` or
    /// `domain\user` forms; otherwise take the name verbatim.
    pub fn set_username(&mut self, raw: &str) {
        if self.domain.is_none() {
            if let Some((user, domain)) = raw.split_once('@') {
                self.username = user.to_owned();
                self.domain = Some(domain.to_owned());
                return;
            }
            if let Some((domain, user)) = raw.split_once('\\') {
                self.username = user.to_owned();
                self.domain = Some(domain.to_owned());
                return;
            }
        }
        self.username = raw.to_owned();
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port())
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("start_program", &self.start_program)
            .field("vm_guid", &self.vm_guid)
            .field("negotiate_security", &self.negotiate_security)
            .finish()
    }
}

// ── RdpClient ────────────────────────────────────────────────────

/// The RDP protocol stack, as the bridge sees it.
///
/// Input injection is fire-and-forget: the stack logs and swallows its own
/// transport errors, and session teardown is signalled back through the
/// bridge's capture/disconnect hooks rather than through return values.
pub trait RdpClient: Send + Sync {
    /// Spawn the client against the staged settings.
    fn connect(&self, settings: ConnectionSettings) -> Result<(), BridgeError>;

    /// Inject a scancode keyboard event.
    fn keyboard_event(&self, flags: u16, code: u16);

    /// Inject a unicode keyboard event.
    fn unicode_keyboard_event(&self, flags: u16, code: u16);

    /// Inject a pointer event at desktop coordinates.
    fn mouse_event(&self, flags: u16, x: u16, y: u16);

    /// Ask the server for the current clipboard as unicode text. The reply
    /// arrives asynchronously through [`crate::session::Bridge::push_clipboard`].
    fn request_clipboard(&self);

    /// Tear the connection down.
    fn disconnect(&self);
}
