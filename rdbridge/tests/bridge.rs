//! Integration tests — full session lifecycle, command round-trips and the
//! capture pipeline over in-memory channel pairs with mock facades.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use rdbridge::config::BridgeConfig;
use rdbridge::printer::{PDF_PRINTER_NAME, PrinterDescription, Spooler, SpoolerHandle};
use rdbridge::rdp::{
    ConnectionSettings, KBD_FLAGS_DOWN, KBD_FLAGS_EXTENDED, KBD_FLAGS_RELEASE, PTR_FLAGS_MOVE,
    PTR_FLAGS_WHEEL, PTR_FLAGS_WHEEL_NEGATIVE, RdpClient,
};
use rdbridge::session::Bridge;
use rdbridge::surface::{Bitmap, DesktopSurface, PointerSource, PointerSprite, Rect};
use rdbridge_core::{
    BridgeError, FrameFormat, ImageQuantity, WireMessage,
};

// ── Mock facades ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum RdpEvent {
    Connect(ConnectionSettings),
    Keyboard { flags: u16, code: u16 },
    Unicode { flags: u16, code: u16 },
    Mouse { flags: u16, x: u16, y: u16 },
    ClipboardRequest,
    Disconnect,
}

#[derive(Default)]
struct MockRdp {
    events: Mutex<Vec<RdpEvent>>,
}

impl MockRdp {
    fn events(&self) -> Vec<RdpEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: RdpEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RdpClient for MockRdp {
    fn connect(&self, settings: ConnectionSettings) -> Result<(), BridgeError> {
        self.push(RdpEvent::Connect(settings));
        Ok(())
    }

    fn keyboard_event(&self, flags: u16, code: u16) {
        self.push(RdpEvent::Keyboard { flags, code });
    }

    fn unicode_keyboard_event(&self, flags: u16, code: u16) {
        self.push(RdpEvent::Unicode { flags, code });
    }

    fn mouse_event(&self, flags: u16, x: u16, y: u16) {
        self.push(RdpEvent::Mouse { flags, x, y });
    }

    fn request_clipboard(&self) {
        self.push(RdpEvent::ClipboardRequest);
    }

    fn disconnect(&self) {
        self.push(RdpEvent::Disconnect);
    }
}

struct MockSurface {
    width: u32,
    height: u32,
}

impl DesktopSurface for MockSurface {
    fn size(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn grab(&self, rect: Rect) -> Option<Bitmap> {
        Some(Bitmap::from_pixel(
            rect.width(),
            rect.height(),
            image::Rgba([30, 60, 90, 255]),
        ))
    }
}

/// A pointer sprite over the blue chroma key with a black arrow stroke.
struct MockPointer;

impl PointerSource for MockPointer {
    fn render(&self) -> Option<PointerSprite> {
        let mut image = Bitmap::from_pixel(8, 8, image::Rgba([0, 0, 255, 255]));
        for i in 0..4 {
            image.put_pixel(i, i, image::Rgba([0, 0, 0, 255]));
        }
        Some(PointerSprite {
            image,
            hotspot_x: 1,
            hotspot_y: 2,
        })
    }
}

struct NullSpooler;

impl Spooler for NullSpooler {
    fn open_printer(&self, _: &str) -> io::Result<SpoolerHandle> {
        Ok(1)
    }
    fn start_document(&self, _: SpoolerHandle, _: &str) -> io::Result<()> {
        Ok(())
    }
    fn start_page(&self, _: SpoolerHandle) -> io::Result<()> {
        Ok(())
    }
    fn write(&self, _: SpoolerHandle, data: &[u8]) -> io::Result<usize> {
        Ok(data.len())
    }
    fn end_page(&self, _: SpoolerHandle) -> io::Result<()> {
        Ok(())
    }
    fn end_document(&self, _: SpoolerHandle) -> io::Result<()> {
        Ok(())
    }
    fn close_printer(&self, _: SpoolerHandle) -> io::Result<()> {
        Ok(())
    }
    fn enumerate(&self) -> io::Result<Vec<PrinterDescription>> {
        Ok(Vec::new())
    }
}

// ── Harness ──────────────────────────────────────────────────────

struct TestSession {
    bridge: Arc<Bridge>,
    rdp: Arc<MockRdp>,
    inputs: DuplexStream,
    updates: DuplexStream,
    task: JoinHandle<Result<(), BridgeError>>,
}

/// Start a bridge over duplex channel pairs and consume the handshake.
async fn start_session(desktop: (u32, u32)) -> TestSession {
    let rdp = Arc::new(MockRdp::default());
    let surface = Arc::new(MockSurface {
        width: desktop.0,
        height: desktop.1,
    });

    let mut config = BridgeConfig::default();
    config.session.id = 7;

    let bridge = Arc::new(Bridge::new(
        config,
        rdp.clone(),
        surface,
        Arc::new(MockPointer),
        Arc::new(NullSpooler),
    ));

    let (inputs, inputs_bridge) = tokio::io::duplex(16 * 1024);
    let (updates_bridge, updates) = tokio::io::duplex(4 * 1024 * 1024);

    let runner = bridge.clone();
    let task =
        tokio::spawn(async move { runner.run_with_channels(inputs_bridge, updates_bridge).await });

    let mut session = TestSession {
        bridge,
        rdp,
        inputs,
        updates,
        task,
    };
    assert_eq!(
        session.read_message().await,
        WireMessage::Text("Hello server".into())
    );
    session
}

impl TestSession {
    /// Write one inputs batch.
    async fn send(&mut self, batch: &str) {
        self.inputs.write_all(batch.as_bytes()).await.unwrap();
        self.inputs.flush().await.unwrap();
    }

    /// Read the next updates-channel message, with a timeout guard.
    async fn read_message(&mut self) -> WireMessage {
        tokio::time::timeout(Duration::from_secs(5), read_message(&mut self.updates))
            .await
            .expect("timeout waiting for updates message")
    }

    /// Read messages until the channel closes, returning everything seen.
    async fn drain_messages(&mut self) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        loop {
            let len = match self.updates.read_u32_le().await {
                Ok(len) => len as usize,
                Err(_) => break,
            };
            let mut body = vec![0u8; len];
            if self.updates.read_exact(&mut body).await.is_err() {
                break;
            }
            messages.push(WireMessage::from_body(&body).unwrap());
        }
        messages
    }

    /// Close the session with `CLO` and wait for the run to finish.
    async fn close(mut self) -> Vec<RdpEvent> {
        self.send("CLO").await;
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("timeout waiting for session end")
            .unwrap()
            .unwrap();
        self.rdp.events()
    }

    /// Poll until the recorded RDP events satisfy the predicate.
    async fn wait_for_events(&self, check: impl Fn(&[RdpEvent]) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if check(&self.rdp.events()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout waiting for RDP events");
    }
}

async fn read_message(reader: &mut (impl tokio::io::AsyncRead + Unpin)) -> WireMessage {
    let len = reader.read_u32_le().await.unwrap() as usize;
    assert!(len > 0, "length prefix must be nonzero");
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.unwrap();
    WireMessage::from_body(&body).unwrap()
}

fn frames(messages: &[WireMessage]) -> Vec<&rdbridge_core::Frame> {
    messages
        .iter()
        .filter_map(|m| match m {
            WireMessage::Image(frame) => Some(frame),
            WireMessage::Text(_) => None,
        })
        .collect()
}

// ── Command round-trips ──────────────────────────────────────────

#[tokio::test]
async fn unicode_keystroke_round_trip() {
    let mut session = start_session((1024, 768)).await;
    session.send("KUC65-1\tKUC65-0").await;
    session
        .wait_for_events(|events| events.len() >= 2)
        .await;

    let events = session.close().await;
    assert_eq!(
        events[0],
        RdpEvent::Unicode {
            flags: KBD_FLAGS_DOWN,
            code: 65
        }
    );
    assert_eq!(
        events[1],
        RdpEvent::Unicode {
            flags: KBD_FLAGS_RELEASE,
            code: 65
        }
    );
}

#[tokio::test]
async fn extended_scancode_flag_on_key_down_only() {
    let mut session = start_session((1024, 768)).await;
    // 75 (left arrow) is in the extended set; 30 is not.
    session.send("KSC75-1\tKSC75-0\tKSC30-1").await;
    session.wait_for_events(|events| events.len() >= 3).await;

    let events = session.close().await;
    assert_eq!(
        events[0],
        RdpEvent::Keyboard {
            flags: KBD_FLAGS_DOWN | KBD_FLAGS_EXTENDED,
            code: 75
        }
    );
    // Key-up goes out without the extended flag.
    assert_eq!(
        events[1],
        RdpEvent::Keyboard {
            flags: KBD_FLAGS_RELEASE,
            code: 75
        }
    );
    assert_eq!(
        events[2],
        RdpEvent::Keyboard {
            flags: KBD_FLAGS_DOWN,
            code: 30
        }
    );
}

#[tokio::test]
async fn wheel_down_round_trip() {
    let mut session = start_session((1024, 768)).await;
    session.send("MWD120-200").await;
    session.wait_for_events(|events| !events.is_empty()).await;

    let events = session.close().await;
    assert_eq!(
        events[0],
        RdpEvent::Mouse {
            flags: PTR_FLAGS_WHEEL | PTR_FLAGS_WHEEL_NEGATIVE | 0x0088,
            x: 120,
            y: 200
        }
    );
}

#[tokio::test]
async fn pointer_moves_are_rescaled_under_scaling() {
    let mut session = start_session((1600, 1200)).await;
    session.send("SCA800x600").await;
    assert_eq!(session.read_message().await, WireMessage::Text("reload".into()));

    session.send("MMO100-50").await;
    session.wait_for_events(|events| !events.is_empty()).await;

    let events = session.close().await;
    assert_eq!(
        events[0],
        RdpEvent::Mouse {
            flags: PTR_FLAGS_MOVE,
            x: 200,
            y: 100
        }
    );
}

#[tokio::test]
async fn connection_staging_round_trip() {
    let mut session = start_session((1024, 768)).await;
    session
        .send("SRVrdp.example.net:13389\tDOMCORP\tUSRalice\tPWDs3cret\tPRGnotepad\tCON")
        .await;
    session
        .wait_for_events(|events| {
            events
                .iter()
                .any(|e| matches!(e, RdpEvent::Connect(_)))
        })
        .await;

    let events = session.close().await;
    let RdpEvent::Connect(settings) = &events[0] else {
        panic!("expected a connect event, got {:?}", events[0]);
    };
    assert_eq!(settings.host, "rdp.example.net");
    assert_eq!(settings.port(), 13389);
    assert_eq!(settings.domain.as_deref(), Some("CORP"));
    assert_eq!(settings.username, "alice");
    assert_eq!(settings.password, "s3cret");
    assert_eq!(settings.start_program.as_deref(), Some("notepad"));
}

#[tokio::test]
async fn clipboard_request_serves_cache_or_fetches() {
    let mut session = start_session((1024, 768)).await;

    // Nothing pending: the cached (empty) clipboard is echoed.
    session.send("CLP").await;
    assert_eq!(
        session.read_message().await,
        WireMessage::Text("clipboard|".into())
    );

    // Remote clipboard changed: the next request fetches from the server.
    session.bridge.reset_clipboard();
    session.send("CLP").await;
    session
        .wait_for_events(|events| events.contains(&RdpEvent::ClipboardRequest))
        .await;

    // The reply is cached and echoed immediately.
    session.bridge.push_clipboard("copied text");
    assert_eq!(
        session.read_message().await,
        WireMessage::Text("clipboard|copied text".into())
    );

    session.close().await;
}

#[tokio::test]
async fn close_mid_batch_still_applies_later_records() {
    let mut session = start_session((1024, 768)).await;
    session.send("KUC65-1\tCLO\tKUC66-1").await;

    tokio::time::timeout(Duration::from_secs(5), session.task)
        .await
        .expect("session should end after the batch")
        .unwrap()
        .unwrap();

    let events = session.rdp.events();
    assert_eq!(
        events[0],
        RdpEvent::Unicode {
            flags: KBD_FLAGS_DOWN,
            code: 65
        }
    );
    // The record after CLO in the same batch is still applied.
    assert_eq!(
        events[1],
        RdpEvent::Unicode {
            flags: KBD_FLAGS_DOWN,
            code: 66
        }
    );
    // Teardown hands the disconnect to the RDP client.
    assert!(events.contains(&RdpEvent::Disconnect));
}

#[tokio::test]
async fn unknown_tags_are_ignored() {
    let mut session = start_session((1024, 768)).await;
    session.send("XYZnonsense\tKUC65-1").await;
    session.wait_for_events(|events| !events.is_empty()).await;
    let events = session.close().await;
    assert_eq!(
        events[0],
        RdpEvent::Unicode {
            flags: KBD_FLAGS_DOWN,
            code: 65
        }
    );
}

// ── Capture pipeline ─────────────────────────────────────────────

#[tokio::test]
async fn quality_update_then_fullscreen() {
    let mut session = start_session((64, 48)).await;
    session.send("ECD1\tQLT75\tFSU").await;

    let message = session.read_message().await;
    let WireMessage::Image(frame) = message else {
        panic!("expected an image frame, got {message:?}");
    };
    // Forced PNG reports lossless quality whatever the policy says.
    assert_eq!(frame.format, FrameFormat::Png);
    assert_eq!(frame.quality.percent(), 100);
    assert!(frame.fullscreen);
    assert_eq!((frame.width, frame.height), (64, 48));
    assert_eq!(frame.idx, 1);

    // The payload decodes back to the solid surface color, losslessly.
    let decoded = image::load_from_memory_with_format(&frame.payload, image::ImageFormat::Png)
        .unwrap()
        .to_rgba8();
    assert_eq!(*decoded.get_pixel(0, 0), image::Rgba([30, 60, 90, 255]));

    session.close().await;
}

#[tokio::test]
async fn fullscreen_raises_lossy_quality() {
    let mut session = start_session((64, 48)).await;
    // JPEG encoding at default quality; the full-screen path upgrades it.
    session.send("ECD2\tFSU").await;

    let message = session.read_message().await;
    let WireMessage::Image(frame) = message else {
        panic!("expected an image frame, got {message:?}");
    };
    assert_eq!(frame.format, FrameFormat::Jpeg);
    assert_eq!(frame.quality.percent(), 75);
    assert!(frame.fullscreen);

    session.close().await;
}

#[tokio::test]
async fn scaled_region_maps_to_client_coordinates() {
    let mut session = start_session((1600, 1200)).await;
    session.send("SCA800x600").await;
    assert_eq!(session.read_message().await, WireMessage::Text("reload".into()));

    session
        .bridge
        .capture_hooks()
        .send_region(Rect::new(400, 300, 800, 600));

    let message = session.read_message().await;
    let WireMessage::Image(frame) = message else {
        panic!("expected an image frame, got {message:?}");
    };
    assert_eq!((frame.pos_x, frame.pos_y), (200, 150));
    assert_eq!((frame.width, frame.height), (200, 150));
    assert!(!frame.fullscreen);

    session.close().await;
}

#[tokio::test]
async fn invalid_regions_emit_nothing() {
    let mut session = start_session((1600, 1200)).await;
    let hooks = session.bridge.capture_hooks();
    hooks.send_region(Rect::new(800, 0, 400, 600)); // inverted
    hooks.send_region(Rect::new(0, 0, 1700, 600)); // out of bounds

    session.send("CLO").await;
    tokio::time::timeout(Duration::from_secs(5), &mut session.task)
        .await
        .expect("timeout")
        .unwrap()
        .unwrap();
    assert!(frames(&session.drain_messages().await).is_empty());
}

#[tokio::test]
async fn rate_control_emits_every_fourth_region() {
    let mut session = start_session((320, 200)).await;
    session.send("QNT25").await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.bridge.state().policy().quantity != ImageQuantity::TwentyFive {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("quantity change not applied");

    let hooks = session.bridge.capture_hooks();
    for _ in 0..8 {
        hooks.send_region(Rect::new(0, 0, 32, 32));
    }

    session.send("CLO").await;
    tokio::time::timeout(Duration::from_secs(5), &mut session.task)
        .await
        .expect("timeout")
        .unwrap()
        .unwrap();

    let messages = session.drain_messages().await;
    let region_frames = frames(&messages);
    assert_eq!(region_frames.len(), 2, "4th and 8th region calls emit");
    // Frame indices stay monotonic across the drops.
    assert_eq!(region_frames[0].idx + 1, region_frames[1].idx);
}

#[tokio::test]
async fn cursor_frames_carry_hotspot_and_format() {
    let mut session = start_session((1024, 768)).await;
    session.bridge.capture_hooks().send_cursor();

    let message = session.read_message().await;
    let WireMessage::Image(frame) = message else {
        panic!("expected a cursor frame, got {message:?}");
    };
    assert_eq!(frame.format, FrameFormat::Cur);
    assert_eq!(frame.quality.percent(), 100);
    assert_eq!((frame.pos_x, frame.pos_y), (1, 2));

    // The payload is PNG with the chroma key turned transparent.
    let decoded = image::load_from_memory_with_format(&frame.payload, image::ImageFormat::Png)
        .unwrap()
        .to_rgba8();
    assert_eq!(decoded.get_pixel(7, 0)[3], 0);
    assert_eq!(*decoded.get_pixel(2, 2), image::Rgba([0, 0, 0, 255]));

    session.close().await;
}

// ── Printer relay ────────────────────────────────────────────────

#[tokio::test]
async fn pdf_print_job_close_notifies_the_gateway() {
    let mut session = start_session((1024, 768)).await;

    let printers = session.bridge.printers();
    let id = printers.register(PDF_PRINTER_NAME, "PDF").unwrap();
    printers.create_job(id, 1).unwrap();
    let doc_name = printers.current_job(id).unwrap().doc_name;
    printers.write_job(id, b"%PDF-1.7 ...").unwrap();
    printers.close_job(id).unwrap();

    assert_eq!(
        session.read_message().await,
        WireMessage::Text(format!("printjob|{doc_name}.pdf"))
    );
    session.close().await;
}

// ── Wire invariants ──────────────────────────────────────────────

#[tokio::test]
async fn emitted_frames_satisfy_the_length_invariant() {
    let mut session = start_session((64, 48)).await;
    session.send("FSU").await;

    // Read raw bytes and check the prefix relation by hand.
    let total_len = session.updates.read_u32_le().await.unwrap() as usize;
    let mut body = vec![0u8; total_len];
    session.updates.read_exact(&mut body).await.unwrap();
    assert_eq!(&body[0..4], &[0, 0, 0, 0], "image tag word");

    let WireMessage::Image(frame) = WireMessage::from_body(&body).unwrap() else {
        panic!("expected an image frame");
    };
    assert_eq!(total_len, 36 + frame.payload.len());

    session.close().await;
}
