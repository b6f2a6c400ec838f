//! # Scan Events
//!
//! Callbacks from the engine to the host screen.
//!
//! ```text
//! engine ──► ScanEventSink::on_barcode_detected(&DecodeResult)   at most once per session
//!        └─► ScanEventSink::on_error(ErrorKind, message)         once per surfaced failure
//! ```
//!
//! Callbacks run on whichever task resolved the race and are never invoked
//! while engine locks are held, so a sink may call the synchronous
//! [`Scanner`](crate::Scanner) methods (`status`, `toggle_torch`) from
//! inside a callback. Async controls must be spawned rather than awaited
//! there, since the router delivering a verdict is one of the tasks a stop
//! waits on.

use optiscan_core::{DecodeResult, ErrorKind, ScanError};
use tracing::warn;

/// Trait for delivering scan events (implemented by the host integration).
pub trait ScanEventSink: Send + Sync {
    /// The single accepted result of a session.
    fn on_barcode_detected(&self, result: &DecodeResult);

    /// A surfaced failure.
    fn on_error(&self, kind: ErrorKind, message: &str);
}

/// No-op sink for headless use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl ScanEventSink for NoOpSink {
    fn on_barcode_detected(&self, _result: &DecodeResult) {}
    fn on_error(&self, _kind: ErrorKind, _message: &str) {}
}

/// What a terminal race transition tells the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A report won.
    Detected(DecodeResult),
    /// The session ended in a surfaced failure.
    Failed(ScanError),
}

impl Verdict {
    /// Hands the verdict to the host.
    pub fn deliver(&self, sink: &dyn ScanEventSink) {
        match self {
            Verdict::Detected(result) => sink.on_barcode_detected(result),
            Verdict::Failed(err) => {
                warn!(kind = %err.kind(), error = %err, "Scan failed");
                sink.on_error(err.kind(), &err.to_string());
            }
        }
    }
}
