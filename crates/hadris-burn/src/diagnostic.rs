//! Structured diagnostic records and the abort-threshold lattice.
//!
//! The engine never prints directly; every human-visible line is a
//! [`DiagnosticRecord`] handed to a [`DiagnosticSink`]. Severity crossing the
//! configured abort threshold is the engine's only signal to unwind the
//! current operation.

/// Severity lattice, low to high. Ordered so `severity >= abort_threshold`
/// is a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Update,
    Note,
    Warning,
    Sorry,
    Failure,
    Fatal,
    Abort,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Update => "UPDATE",
            Severity::Note => "NOTE",
            Severity::Warning => "WARNING",
            Severity::Sorry => "SORRY",
            Severity::Failure => "FAILURE",
            Severity::Fatal => "FATAL",
            Severity::Abort => "ABORT",
        }
    }
}

/// A single structured diagnostic message.
#[derive(Debug, Clone)]
pub struct DiagnosticRecord {
    pub severity: Severity,
    pub origin: &'static str,
    pub text: String,
    pub errno: Option<i32>,
}

impl DiagnosticRecord {
    pub fn new(severity: Severity, origin: &'static str, text: impl Into<String>) -> Self {
        Self {
            severity,
            origin,
            text: text.into(),
            errno: None,
        }
    }

    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }
}

/// Sink of structured diagnostic messages. Synchronous and lock-free from
/// the engine's perspective; any buffering is the sink's own concern.
/// `Sync` so the same sink reference can be shared with the media check
/// engine's asynchronous hashing worker.
pub trait DiagnosticSink: Sync {
    fn emit(&self, record: DiagnosticRecord);

    /// True if `severity` has crossed `threshold`; the caller decides what
    /// unwinding means for the operation in progress.
    fn crosses(&self, severity: Severity, threshold: Severity) -> bool {
        severity >= threshold
    }
}

/// Test double that records every emitted diagnostic in order.
#[derive(Debug, Default)]
pub struct VecSink {
    records: std::sync::Mutex<Vec<DiagnosticRecord>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<DiagnosticRecord> {
        std::mem::take(&mut self.records.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for VecSink {
    fn emit(&self, record: DiagnosticRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Forwards records to the `log` facade at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, record: DiagnosticRecord) {
        let text = match record.errno {
            Some(errno) => format!("{}: {} (errno {})", record.origin, record.text, errno),
            None => format!("{}: {}", record.origin, record.text),
        };
        match record.severity {
            Severity::Abort | Severity::Fatal | Severity::Failure => log::error!("{text}"),
            Severity::Sorry | Severity::Warning => log::warn!("{text}"),
            Severity::Note | Severity::Update => log::info!("{text}"),
            Severity::Debug => log::trace!("{text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_ordering() {
        assert!(Severity::Debug < Severity::Update);
        assert!(Severity::Warning < Severity::Sorry);
        assert!(Severity::Fatal < Severity::Abort);
    }

    #[test]
    fn vec_sink_records_in_order() {
        let sink = VecSink::new();
        sink.emit(DiagnosticRecord::new(Severity::Warning, "test", "first"));
        sink.emit(DiagnosticRecord::new(Severity::Failure, "test", "second"));
        let records = sink.take();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "first");
        assert_eq!(records[1].severity, Severity::Failure);
        assert!(sink.is_empty());
    }

    #[test]
    fn abort_threshold_comparison() {
        let sink = VecSink::new();
        assert!(sink.crosses(Severity::Fatal, Severity::Failure));
        assert!(!sink.crosses(Severity::Warning, Severity::Failure));
    }
}
