//! Audit trail for accepted operations and redemptions.
//!
//! Every accepted operation produces a [`LedgerEvent`](crate::ledger::LedgerEvent)
//! that is handed to the installed [`AuditLogger`]. The default logger is a
//! no-op; installing one is a process-wide decision made once at startup.

use crate::ledger::LedgerEvent;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tracing::error;

/// Sink for ledger audit events.
///
/// Implementations must be cheap and non-blocking; the ledger calls them
/// inline on the operation path.
pub trait AuditLogger: Send + Sync {
    /// Record one accepted event.
    fn log(&self, event: &LedgerEvent);
}

/// Discards all events. The default.
#[derive(Debug, Default)]
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&self, _event: &LedgerEvent) {}
}

/// Writes one JSON object per event to stdout.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl AuditLogger for StdoutLogger {
    fn log(&self, event: &LedgerEvent) {
        let record = serde_json::json!({
            "ts": Utc::now().to_rfc3339(),
            "audit": event,
        });
        println!("{}", record);
    }
}

static AUDIT_LOGGER: RwLock<Option<Arc<dyn AuditLogger>>> = RwLock::new(None);

/// Install the process-wide audit logger. Replaces any previous one.
pub fn set_audit_logger(logger: Arc<dyn AuditLogger>) {
    match AUDIT_LOGGER.write() {
        Ok(mut slot) => *slot = Some(logger),
        Err(e) => error!("audit logger lock poisoned: {}", e),
    }
}

/// Remove the installed logger, reverting to the no-op default.
pub fn clear_audit_logger() {
    if let Ok(mut slot) = AUDIT_LOGGER.write() {
        *slot = None;
    }
}

/// Hand an event to the installed logger, if any.
pub fn log_event(event: &LedgerEvent) {
    if let Ok(slot) = AUDIT_LOGGER.read() {
        if let Some(logger) = slot.as_ref() {
            logger.log(event);
        }
    }
}
