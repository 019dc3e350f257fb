//! Redirected printer relay.
//!
//! The print virtual channel drives one document at a time per printer:
//! `create_job` opens a host document, `write_job` streams page data into
//! the spooler, `close_job` finishes the document. Closing the document
//! must NOT close the printer — a shared printer closed mid-session breaks
//! every subsequent job — so the spooler handle survives until
//! [`PrinterRegistry::free_printer`].
//!
//! Jobs against the gateway's PDF printer get a unique document name, and
//! closing one notifies the gateway over the updates channel so it can
//! fetch the finished file.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use rdbridge_core::{BridgeError, SpoolerOp};

use crate::writer::UpdatesSender;

/// The printer the gateway redirects into PDF files.
pub const PDF_PRINTER_NAME: &str = "Myrtille PDF";

const DEFAULT_DOC_NAME: &str = "FREERDPjob";

// ── Spooler facade ───────────────────────────────────────────────

/// Opaque host spooler handle.
pub type SpoolerHandle = u64;

/// Basic description of a host printer, as enumeration returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterDescription {
    pub name: String,
    pub driver_name: String,
}

/// The host printing subsystem, as the relay sees it.
pub trait Spooler: Send + Sync {
    fn open_printer(&self, name: &str) -> io::Result<SpoolerHandle>;
    fn start_document(&self, handle: SpoolerHandle, doc_name: &str) -> io::Result<()>;
    fn start_page(&self, handle: SpoolerHandle) -> io::Result<()>;
    fn write(&self, handle: SpoolerHandle, data: &[u8]) -> io::Result<usize>;
    fn end_page(&self, handle: SpoolerHandle) -> io::Result<()>;
    fn end_document(&self, handle: SpoolerHandle) -> io::Result<()>;
    fn close_printer(&self, handle: SpoolerHandle) -> io::Result<()>;
    fn enumerate(&self) -> io::Result<Vec<PrinterDescription>>;
}

// ── Printer ──────────────────────────────────────────────────────

/// One active print job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub id: u32,
    pub doc_name: String,
}

/// Job slot: a printer is either idle or busy with exactly one job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum JobState {
    #[default]
    Idle,
    Busy(PrintJob),
}

/// A redirected printer and its at-most-one active job.
#[derive(Debug)]
pub struct Printer {
    pub id: u32,
    pub name: String,
    pub driver_name: String,
    pub is_default: bool,
    handle: SpoolerHandle,
    state: JobState,
}

// ── PrinterRegistry ──────────────────────────────────────────────

/// All printers redirected into the session.
pub struct PrinterRegistry {
    spooler: Arc<dyn Spooler>,
    updates: UpdatesSender,
    printers: Mutex<HashMap<u32, Printer>>,
    id_sequence: Mutex<u32>,
}

impl PrinterRegistry {
    pub fn new(spooler: Arc<dyn Spooler>, updates: UpdatesSender) -> Self {
        Self {
            spooler,
            updates,
            printers: Mutex::new(HashMap::new()),
            id_sequence: Mutex::new(1),
        }
    }

    /// Open one host printer and register it. The first registered printer
    /// becomes the session default.
    pub fn register(&self, name: &str, driver_name: &str) -> Result<u32, BridgeError> {
        let handle = self
            .spooler
            .open_printer(name)
            .map_err(|source| BridgeError::Spooler {
                op: SpoolerOp::Open,
                source,
            })?;

        let mut seq = self.id_sequence.lock().expect("id sequence lock");
        let id = *seq;
        *seq += 1;

        let printer = Printer {
            id,
            name: name.to_owned(),
            driver_name: driver_name.to_owned(),
            is_default: id == 1,
            handle,
            state: JobState::Idle,
        };
        self.printers
            .lock()
            .expect("printers lock")
            .insert(id, printer);
        info!(id, name, "printer registered");
        Ok(id)
    }

    /// Query the host for its printers and register each of them.
    pub fn enumerate(&self) -> Result<Vec<u32>, BridgeError> {
        let described = self
            .spooler
            .enumerate()
            .map_err(|source| BridgeError::Spooler {
                op: SpoolerOp::Enumerate,
                source,
            })?;
        let mut ids = Vec::with_capacity(described.len());
        for description in described {
            match self.register(&description.name, &description.driver_name) {
                Ok(id) => ids.push(id),
                Err(err) => warn!("skipping printer '{}': {err}", description.name),
            }
        }
        Ok(ids)
    }

    /// Start a print job. Fails with a busy error, without side effects,
    /// while another job is active on the printer.
    pub fn create_job(&self, printer_id: u32, job_id: u32) -> Result<(), BridgeError> {
        let mut printers = self.printers.lock().expect("printers lock");
        let printer = printers
            .get_mut(&printer_id)
            .ok_or(BridgeError::UnknownPrinter(printer_id))?;

        if let JobState::Busy(_) = printer.state {
            return Err(BridgeError::PrinterBusy {
                printer: printer.name.clone(),
            });
        }

        // The PDF printer needs a unique document name; the job id is only
        // an auto-incremented value, not safe across processes.
        let doc_name = if printer.name == PDF_PRINTER_NAME {
            format!("{DEFAULT_DOC_NAME}{}{}", std::process::id(), tick_count())
        } else {
            DEFAULT_DOC_NAME.to_owned()
        };

        self.spooler
            .start_document(printer.handle, &doc_name)
            .map_err(|source| BridgeError::Spooler {
                op: SpoolerOp::StartDoc,
                source,
            })?;
        self.spooler
            .start_page(printer.handle)
            .map_err(|source| BridgeError::Spooler {
                op: SpoolerOp::StartPage,
                source,
            })?;

        printer.state = JobState::Busy(PrintJob {
            id: job_id,
            doc_name,
        });
        Ok(())
    }

    /// Stream document data into the active job.
    pub fn write_job(&self, printer_id: u32, data: &[u8]) -> Result<usize, BridgeError> {
        let printers = self.printers.lock().expect("printers lock");
        let printer = printers
            .get(&printer_id)
            .ok_or(BridgeError::UnknownPrinter(printer_id))?;
        match &printer.state {
            JobState::Idle => Err(BridgeError::Spooler {
                op: SpoolerOp::Write,
                source: io::Error::new(io::ErrorKind::NotFound, "no active print job"),
            }),
            JobState::Busy(_) => {
                self.spooler
                    .write(printer.handle, data)
                    .map_err(|source| BridgeError::Spooler {
                        op: SpoolerOp::Write,
                        source,
                    })
            }
        }
    }

    /// Finish the active job: end the page and the document, keep the
    /// printer open. Safe to call twice; the second close is a no-op.
    ///
    /// Closing a job against the PDF printer notifies the gateway that a
    /// new document is available.
    pub fn close_job(&self, printer_id: u32) -> Result<(), BridgeError> {
        let mut printers = self.printers.lock().expect("printers lock");
        let printer = printers
            .get_mut(&printer_id)
            .ok_or(BridgeError::UnknownPrinter(printer_id))?;

        let job = match std::mem::take(&mut printer.state) {
            JobState::Idle => return Ok(()),
            JobState::Busy(job) => job,
        };

        // Spooler failures here are logged, not propagated: the job is
        // considered closed either way.
        if let Err(source) = self.spooler.end_page(printer.handle) {
            warn!(
                "{}",
                BridgeError::Spooler {
                    op: SpoolerOp::EndPage,
                    source
                }
            );
        }
        if let Err(source) = self.spooler.end_document(printer.handle) {
            warn!(
                "{}",
                BridgeError::Spooler {
                    op: SpoolerOp::EndDoc,
                    source
                }
            );
        }

        if printer.name == PDF_PRINTER_NAME {
            self.updates
                .send_text(format!("printjob|{}.pdf", job.doc_name));
        }
        info!(printer = %printer.name, job = job.id, "print job closed");
        Ok(())
    }

    /// Release a printer: close any active job first, then the handle.
    pub fn free_printer(&self, printer_id: u32) -> Result<(), BridgeError> {
        self.close_job(printer_id)?;
        let mut printers = self.printers.lock().expect("printers lock");
        let printer = printers
            .remove(&printer_id)
            .ok_or(BridgeError::UnknownPrinter(printer_id))?;
        if let Err(source) = self.spooler.close_printer(printer.handle) {
            warn!(
                "{}",
                BridgeError::Spooler {
                    op: SpoolerOp::Close,
                    source
                }
            );
        }
        Ok(())
    }

    /// The active job on a printer, if any.
    pub fn current_job(&self, printer_id: u32) -> Option<PrintJob> {
        let printers = self.printers.lock().expect("printers lock");
        match &printers.get(&printer_id)?.state {
            JobState::Idle => None,
            JobState::Busy(job) => Some(job.clone()),
        }
    }
}

/// Millisecond tick used to make PDF document names unique.
fn tick_count() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct RecordingSpooler {
        next_handle: AtomicU64,
        ops: Mutex<Vec<String>>,
    }

    impl RecordingSpooler {
        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn record(&self, op: &str) {
            self.ops.lock().unwrap().push(op.to_owned());
        }
    }

    impl Spooler for RecordingSpooler {
        fn open_printer(&self, name: &str) -> io::Result<SpoolerHandle> {
            self.record(&format!("open:{name}"));
            Ok(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn start_document(&self, _: SpoolerHandle, doc_name: &str) -> io::Result<()> {
            self.record(&format!("start-doc:{doc_name}"));
            Ok(())
        }

        fn start_page(&self, _: SpoolerHandle) -> io::Result<()> {
            self.record("start-page");
            Ok(())
        }

        fn write(&self, _: SpoolerHandle, data: &[u8]) -> io::Result<usize> {
            self.record(&format!("write:{}", data.len()));
            Ok(data.len())
        }

        fn end_page(&self, _: SpoolerHandle) -> io::Result<()> {
            self.record("end-page");
            Ok(())
        }

        fn end_document(&self, _: SpoolerHandle) -> io::Result<()> {
            self.record("end-doc");
            Ok(())
        }

        fn close_printer(&self, _: SpoolerHandle) -> io::Result<()> {
            self.record("close-printer");
            Ok(())
        }

        fn enumerate(&self) -> io::Result<Vec<PrinterDescription>> {
            Ok(vec![
                PrinterDescription {
                    name: "Office Laser".into(),
                    driver_name: "Generic".into(),
                },
                PrinterDescription {
                    name: PDF_PRINTER_NAME.into(),
                    driver_name: "PDF".into(),
                },
            ])
        }
    }

    fn registry() -> (PrinterRegistry, Arc<RecordingSpooler>) {
        let spooler = Arc::new(RecordingSpooler::default());
        let (updates, _rx) = crate::writer::queue();
        (PrinterRegistry::new(spooler.clone(), updates), spooler)
    }

    #[test]
    fn first_registered_printer_is_default() {
        let (registry, _) = registry();
        let ids = registry.enumerate().unwrap();
        assert_eq!(ids, [1, 2]);
        let printers = registry.printers.lock().unwrap();
        assert!(printers[&1].is_default);
        assert!(!printers[&2].is_default);
    }

    #[test]
    fn one_job_per_printer() {
        let (registry, _) = registry();
        let id = registry.register("Office Laser", "Generic").unwrap();

        registry.create_job(id, 10).unwrap();
        // A second job while one is active fails without side effects.
        let err = registry.create_job(id, 11).unwrap_err();
        assert!(matches!(err, BridgeError::PrinterBusy { .. }));
        assert_eq!(registry.current_job(id).unwrap().id, 10);

        registry.close_job(id).unwrap();
        assert!(registry.current_job(id).is_none());
        // The slot is free again.
        registry.create_job(id, 11).unwrap();
    }

    #[test]
    fn close_ends_document_but_not_printer() {
        let (registry, spooler) = registry();
        let id = registry.register("Office Laser", "Generic").unwrap();
        registry.create_job(id, 1).unwrap();
        registry.write_job(id, b"page data").unwrap();
        registry.close_job(id).unwrap();

        let ops = spooler.ops();
        assert!(ops.contains(&"end-page".to_owned()));
        assert!(ops.contains(&"end-doc".to_owned()));
        assert!(!ops.contains(&"close-printer".to_owned()));
    }

    #[test]
    fn double_close_is_idempotent() {
        let (registry, spooler) = registry();
        let id = registry.register("Office Laser", "Generic").unwrap();
        registry.create_job(id, 1).unwrap();
        registry.close_job(id).unwrap();
        registry.close_job(id).unwrap();
        let ends = spooler.ops().iter().filter(|op| *op == "end-doc").count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn write_without_job_fails() {
        let (registry, _) = registry();
        let id = registry.register("Office Laser", "Generic").unwrap();
        assert!(registry.write_job(id, b"data").is_err());
    }

    #[test]
    fn pdf_jobs_get_unique_doc_names() {
        let (registry, _spooler) = registry();
        let id = registry.register(PDF_PRINTER_NAME, "PDF").unwrap();
        registry.create_job(id, 1).unwrap();
        let doc_name = registry.current_job(id).unwrap().doc_name;
        assert!(doc_name.starts_with(DEFAULT_DOC_NAME));
        assert!(doc_name.len() > DEFAULT_DOC_NAME.len());

        // Plain printers keep the fixed name.
        let plain = registry.register("Office Laser", "Generic").unwrap();
        registry.create_job(plain, 2).unwrap();
        assert_eq!(registry.current_job(plain).unwrap().doc_name, DEFAULT_DOC_NAME);
    }

    #[test]
    fn free_printer_closes_job_and_handle() {
        let (registry, spooler) = registry();
        let id = registry.register("Office Laser", "Generic").unwrap();
        registry.create_job(id, 1).unwrap();
        registry.free_printer(id).unwrap();

        let ops = spooler.ops();
        assert!(ops.contains(&"end-doc".to_owned()));
        assert!(ops.contains(&"close-printer".to_owned()));
        assert!(registry.current_job(id).is_none());
    }
}
