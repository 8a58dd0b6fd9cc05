use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;

use crate::error::Error;

/// Immutable record of a security decision made during extraction.
///
/// Emitted for every rejection, skip, clamp, and fallback. The archive hash
/// is a correlation token (first 64 KiB of the archive), not an integrity
/// check.
#[derive(Clone, Debug, Serialize)]
pub struct SecurityEvent {
    /// Tag such as `tar_slip_detected` or `ratio_exceeded`.
    pub event_type: String,
    pub archive_hash: String,
    pub member_path: Option<String>,
    pub detail: BTreeMap<String, String>,
    pub timestamp: SystemTime,
}

/// Dispatches events to the caller's callback.
///
/// The callback contract forbids it from panicking; if it panics anyway the
/// panic is swallowed and a single `event_callback_panicked` warning is
/// produced, after which dispatch continues.
pub struct EventSink<'a> {
    callback: Option<&'a dyn Fn(&SecurityEvent)>,
    archive_hash: String,
    callback_warned: bool,
}

impl<'a> EventSink<'a> {
    pub fn new(callback: Option<&'a dyn Fn(&SecurityEvent)>, archive_hash: String) -> Self {
        Self {
            callback,
            archive_hash,
            callback_warned: false,
        }
    }

    pub fn emit(
        &mut self,
        event_type: &str,
        member_path: Option<&str>,
        detail: impl IntoIterator<Item = (&'static str, String)>,
    ) {
        let event = SecurityEvent {
            event_type: event_type.to_string(),
            archive_hash: self.archive_hash.clone(),
            member_path: member_path.map(str::to_string),
            detail: detail
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            timestamp: SystemTime::now(),
        };

        warn!(
            event_type = %event.event_type,
            archive_hash = %event.archive_hash,
            member_path = event.member_path.as_deref().unwrap_or("-"),
            "security event"
        );

        self.dispatch(&event);
    }

    /// Emit the event matching a fatal extraction error.
    pub fn emit_error(&mut self, err: &Error, member_path: Option<&str>) {
        self.emit(
            event_type_for(err),
            member_path,
            [("error", err.to_string())],
        );
    }

    fn dispatch(&mut self, event: &SecurityEvent) {
        let Some(callback) = self.callback else {
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() && !self.callback_warned {
            self.callback_warned = true;
            warn!("security event callback panicked; panic swallowed");
            let warning = SecurityEvent {
                event_type: "event_callback_panicked".to_string(),
                archive_hash: self.archive_hash.clone(),
                member_path: None,
                detail: BTreeMap::new(),
                timestamp: SystemTime::now(),
            };
            let _ = catch_unwind(AssertUnwindSafe(|| callback(&warning)));
        }
    }
}

fn event_type_for(err: &Error) -> &'static str {
    match err {
        Error::UnsafePath { .. } => "tar_slip_detected",
        Error::ForbiddenType { .. } => "forbidden_type",
        Error::FileTooLarge { .. } => "file_too_large",
        Error::TotalSizeExceeded { .. } => "total_size_exceeded",
        Error::MaxFilesExceeded { .. } => "max_files_exceeded",
        Error::RatioExceeded { .. } => "ratio_exceeded",
        Error::SymlinkPolicy { .. } => "symlink_violation",
        Error::HardlinkPolicy { .. } => "hardlink_violation",
        Error::SparsePolicy { .. } => "sparse_violation",
        Error::LinkEscape { .. } => "link_escape",
        Error::AtomicWrite { .. } | Error::Sandbox { .. } => "sandbox_error",
        Error::UnsupportedFormat => "unsupported_format",
        Error::ArchiveOpen { .. } => "archive_open_failed",
        Error::MalformedArchive { .. } => "malformed_archive",
        Error::Policy { .. } => "invalid_policy",
        Error::Cancelled => "cancelled",
        Error::Io(_) => "io_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_invokes_callback() {
        let count = AtomicUsize::new(0);
        let callback = |event: &SecurityEvent| {
            assert_eq!(event.event_type, "ratio_exceeded");
            assert_eq!(event.archive_hash, "abcd");
            count.fetch_add(1, Ordering::SeqCst);
        };

        let mut sink = EventSink::new(Some(&callback), "abcd".to_string());
        sink.emit("ratio_exceeded", None, [("limit", "200".to_string())]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_is_swallowed() {
        let count = AtomicUsize::new(0);
        let callback = |_: &SecurityEvent| {
            count.fetch_add(1, Ordering::SeqCst);
            panic!("misbehaving callback");
        };

        let mut sink = EventSink::new(Some(&callback), "abcd".to_string());
        sink.emit("tar_slip_detected", Some("../etc/passwd"), []);
        sink.emit("tar_slip_detected", Some("../etc/shadow"), []);

        // Both events plus one internal-warning attempt, no propagated panic.
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn no_callback_is_fine() {
        let mut sink = EventSink::new(None, "abcd".to_string());
        sink.emit("forbidden_type", Some("dev/null"), []);
    }

    #[test]
    fn error_event_carries_detail() {
        let captured = std::sync::Mutex::new(Vec::new());
        let callback = |event: &SecurityEvent| {
            captured.lock().unwrap().push(event.clone());
        };

        let mut sink = EventSink::new(Some(&callback), "abcd".to_string());
        let err = Error::FileTooLarge {
            path: "big.bin".to_string(),
            limit: 10,
            observed: 20,
        };
        sink.emit_error(&err, Some("big.bin"));

        let events = captured.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "file_too_large");
        assert_eq!(events[0].member_path.as_deref(), Some("big.bin"));
        assert!(events[0].detail["error"].contains("max_file_size"));
    }
}
