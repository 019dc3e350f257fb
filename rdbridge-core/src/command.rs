//! Inputs-channel command set.
//!
//! The gateway writes a stream of records separated by `\t`; each record is
//! a 3-character tag followed by tag-specific ASCII arguments. Records are
//! parsed into [`Command`] values here and applied by the bridge dispatcher.
//!
//! Unknown tags are ignored for forward compatibility. Malformed arguments
//! for a known tag skip the record without terminating the session. The
//! `PWD` argument is carried verbatim but must never reach a log sink.

use crate::error::BridgeError;
use crate::policy::{ImageEncoding, ImageQuality, ImageQuantity};

// ── Command ──────────────────────────────────────────────────────

/// All commands understood on the inputs channel.
///
/// Organized by category:
/// - connection staging (`SRV`, `VMG`, `DOM`, `USR`, `PWD`, `PRG`, `CON`)
/// - user input (`KUC`, `KSC`, `MMO`, `MLB`, `MMB`, `MRB`, `MWU`, `MWD`)
/// - display policy (`RSZ`, `SCA`, `ECD`, `QLT`, `QNT`)
/// - session control (`STA`, `DBG`, `CMP`, `FSU`, `CLP`, `CLO`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SRV` — RDP server address, optionally with a port.
    ServerAddress { host: String, port: Option<u16> },
    /// `VMG` — Hyper-V VM GUID; switches the connection to VM-connect mode.
    VmGuid(String),
    /// `DOM` — user domain.
    Domain(String),
    /// `USR` — username, possibly carrying an embedded domain.
    Username(String),
    /// `PWD` — password. Never logged.
    Password(String),
    /// `PRG` — program to start instead of the default shell.
    StartProgram(String),
    /// `CON` — start the RDP client.
    Connect,
    /// `RSZ` — browser window resized.
    BrowserResize { width: u32, height: u32 },
    /// `KUC` — unicode keyboard event.
    UnicodeKey { code: u16, down: bool },
    /// `KSC` — scancode keyboard event.
    ScancodeKey { code: u16, down: bool },
    /// `MMO` — pointer move.
    MouseMove { x: u16, y: u16 },
    /// `MLB` / `MMB` / `MRB` — pointer button change.
    MouseButton {
        button: MouseButton,
        down: bool,
        x: u16,
        y: u16,
    },
    /// `MWU` / `MWD` — wheel rotation.
    MouseWheel {
        direction: WheelDirection,
        x: u16,
        y: u16,
    },
    /// `STA` / `DBG` / `CMP` — gateway-side mode toggle; the bridge only
    /// acknowledges with a `"reload"` text message.
    ModeToggle,
    /// `SCA` — disable scaling, or enable it with new client dimensions.
    ScaleDisplay(Option<(u32, u32)>),
    /// `ECD` — select the image encoding; resets quality to the default.
    SetEncoding(ImageEncoding),
    /// `QLT` — select the image quality.
    SetQuality(ImageQuality),
    /// `QNT` — select the image quantity (IPS ratio).
    SetQuantity(ImageQuantity),
    /// `FSU` — full-screen update request.
    FullscreenRequest,
    /// `CLP` — clipboard value request.
    ClipboardRequest,
    /// `CLO` — close the client; the reader exits after the current batch.
    CloseClient,
}

/// Pointer button named by a mouse record tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// Wheel rotation direction named by a wheel record tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
}

// ── Batch splitting ──────────────────────────────────────────────

/// Split one inputs-channel read into its records.
///
/// Records are processed in receive order within the batch; empty records
/// (from consecutive separators) are dropped here.
pub fn split_batch(batch: &str) -> impl Iterator<Item = &str> {
    batch.split('\t').filter(|r| !r.is_empty())
}

// ── Record parsing ───────────────────────────────────────────────

/// Parse one record into a command.
///
/// Returns `Ok(None)` for an unknown tag (ignored for forward
/// compatibility) and `Err` when a known tag carries malformed arguments
/// (the record is skipped, never terminal).
pub fn parse_record(record: &str) -> Result<Option<Command>, BridgeError> {
    if record.len() < 3 || !record.is_char_boundary(3) {
        return Ok(None);
    }
    let (tag, args) = record.split_at(3);

    let cmd = match tag {
        "SRV" => parse_server_address(args)?,
        "VMG" => Command::VmGuid(args.to_owned()),
        "DOM" => Command::Domain(args.to_owned()),
        "USR" => Command::Username(args.to_owned()),
        "PWD" => Command::Password(args.to_owned()),
        "PRG" => Command::StartProgram(args.to_owned()),
        "CON" => Command::Connect,
        "RSZ" => {
            let (w, h) = parse_dimensions(args, "RSZ")?;
            Command::BrowserResize {
                width: w,
                height: h,
            }
        }
        "KUC" => {
            let (code, down) = parse_key(args, "KUC")?;
            Command::UnicodeKey { code, down }
        }
        "KSC" => {
            let (code, down) = parse_key(args, "KSC")?;
            Command::ScancodeKey { code, down }
        }
        "MMO" => {
            let (x, y) = parse_position(args, "MMO")?;
            Command::MouseMove { x, y }
        }
        "MLB" => parse_button(args, MouseButton::Left, "MLB")?,
        "MMB" => parse_button(args, MouseButton::Middle, "MMB")?,
        "MRB" => parse_button(args, MouseButton::Right, "MRB")?,
        "MWU" => {
            let (x, y) = parse_position(args, "MWU")?;
            Command::MouseWheel {
                direction: WheelDirection::Up,
                x,
                y,
            }
        }
        "MWD" => {
            let (x, y) = parse_position(args, "MWD")?;
            Command::MouseWheel {
                direction: WheelDirection::Down,
                x,
                y,
            }
        }
        "STA" | "DBG" | "CMP" => Command::ModeToggle,
        "SCA" => {
            if args == "0" {
                Command::ScaleDisplay(None)
            } else {
                Command::ScaleDisplay(Some(parse_dimensions(args, "SCA")?))
            }
        }
        "ECD" => Command::SetEncoding(parse_numeric(args, "ECD")?),
        "QLT" => Command::SetQuality(parse_numeric(args, "QLT")?),
        "QNT" => Command::SetQuantity(parse_numeric(args, "QNT")?),
        "FSU" => Command::FullscreenRequest,
        "CLP" => Command::ClipboardRequest,
        "CLO" => Command::CloseClient,
        _ => return Ok(None),
    };
    Ok(Some(cmd))
}

/// `host`, `host:port` or `[v6]:port`.
fn parse_server_address(args: &str) -> Result<Command, BridgeError> {
    let malformed = BridgeError::Parse { tag: "SRV" };
    if args.is_empty() {
        return Err(malformed);
    }

    if let Some(rest) = args.strip_prefix('[') {
        // Bracketed IPv6, optionally followed by a port.
        let (host, tail) = rest.split_once(']').ok_or(malformed)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().map_err(|_| BridgeError::Parse { tag: "SRV" })?),
            None if tail.is_empty() => None,
            None => return Err(BridgeError::Parse { tag: "SRV" }),
        };
        return Ok(Command::ServerAddress {
            host: host.to_owned(),
            port,
        });
    }

    // A single colon separates host and port; more than one means a bare
    // IPv6 address with no port.
    match args.match_indices(':').count() {
        0 => Ok(Command::ServerAddress {
            host: args.to_owned(),
            port: None,
        }),
        1 => {
            let (host, port) = args.split_once(':').expect("single colon");
            let port = port.parse().map_err(|_| BridgeError::Parse { tag: "SRV" })?;
            Ok(Command::ServerAddress {
                host: host.to_owned(),
                port: Some(port),
            })
        }
        _ => Ok(Command::ServerAddress {
            host: args.to_owned(),
            port: None,
        }),
    }
}

/// `code-1` (down) or `code-0` (up).
fn parse_key(args: &str, tag: &'static str) -> Result<(u16, bool), BridgeError> {
    let (code, state) = args.split_once('-').ok_or(BridgeError::Parse { tag })?;
    let code = code.parse().map_err(|_| BridgeError::Parse { tag })?;
    let down = parse_state(state, tag)?;
    Ok((code, down))
}

/// `x-y`, both non-negative.
fn parse_position(args: &str, tag: &'static str) -> Result<(u16, u16), BridgeError> {
    let (x, y) = args.split_once('-').ok_or(BridgeError::Parse { tag })?;
    let x = x.parse().map_err(|_| BridgeError::Parse { tag })?;
    let y = y.parse().map_err(|_| BridgeError::Parse { tag })?;
    Ok((x, y))
}

/// `s` then `x-y`, the state digit glued to the position.
fn parse_button(
    args: &str,
    button: MouseButton,
    tag: &'static str,
) -> Result<Command, BridgeError> {
    let (state, position) = args.split_at_checked(1).ok_or(BridgeError::Parse { tag })?;
    let down = parse_state(state, tag)?;
    let (x, y) = parse_position(position, tag)?;
    Ok(Command::MouseButton { button, down, x, y })
}

fn parse_state(state: &str, tag: &'static str) -> Result<bool, BridgeError> {
    match state {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(BridgeError::Parse { tag }),
    }
}

/// `WxH`, both positive.
fn parse_dimensions(args: &str, tag: &'static str) -> Result<(u32, u32), BridgeError> {
    let (w, h) = args.split_once('x').ok_or(BridgeError::Parse { tag })?;
    let w: u32 = w.parse().map_err(|_| BridgeError::Parse { tag })?;
    let h: u32 = h.parse().map_err(|_| BridgeError::Parse { tag })?;
    if w == 0 || h == 0 {
        return Err(BridgeError::Parse { tag });
    }
    Ok((w, h))
}

fn parse_numeric<T>(args: &str, tag: &'static str) -> Result<T, BridgeError>
where
    T: TryFrom<u32, Error = BridgeError>,
{
    let value: u32 = args.parse().map_err(|_| BridgeError::Parse { tag })?;
    T::try_from(value).map_err(|_| BridgeError::Parse { tag })
}
