//! Alert channel for load diagnostics
//!
//! Loading LDraw content is tolerant: a malformed line, a contradictory
//! BFC command or a missing sub-model marks the affected region invalid
//! and the load keeps going. Every such condition is reported as an
//! [`Alert`] on the session's [`AlertChannel`], where a GUI, CLI or logger
//! can pick it up.
//!
//! Alerts that refer to a specific line carry an [`AlertOrigin`] with the
//! file name, 1-based line number and the line's text. Library-wide alerts
//! (a corrupt archive, a rate-limited substitute flow) omit the origin.
//!
//! Cancellation uses the same channel: a [`CancelHandle`] is a shared atomic
//! flag that another thread may set while a load runs. The loader polls it
//! once per parsed line and before opening each file.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What subsystem produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// Malformed line syntax; the line was marked invalid
    Parse,
    /// Violation of the BFC certification protocol
    Bfc,
    /// Malformed or unrecognized meta-command arguments
    MetaCommand,
    /// Bad texture projection syntax or a missing/corrupt image
    Texmap,
    /// Multi-part document structure problem (e.g. duplicate sub-file)
    Mpd,
    /// A referenced file could not be resolved
    FindFile,
    /// A parts-library archive could not be read
    Archive,
    /// The interactive substitute flow was rate-limited
    TooManyRequests,
}

/// How serious an alert is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The condition was recovered; output may differ from intent
    Warning,
    /// The affected line or region was dropped or invalidated
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// The line an alert refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertOrigin {
    /// Name of the file the line came from
    pub file: String,
    /// 1-based line number within that file
    pub line_number: usize,
    /// The line's text as read
    pub line_text: String,
}

/// A structured diagnostic event emitted during a load
#[derive(Debug, Clone)]
pub struct Alert {
    /// Producing subsystem
    pub kind: AlertKind,
    /// Warning or error
    pub severity: Severity,
    /// Primary one-line message
    pub message: String,
    /// Additional detail lines attached to the same event
    pub details: Vec<String>,
    /// The originating line, when the alert refers to one
    pub origin: Option<AlertOrigin>,
}

impl Alert {
    /// Create an alert from a formatted message.
    ///
    /// Multi-line messages are split on newline: the first line becomes the
    /// primary message, the remaining lines become detail entries.
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut lines = message.lines().map(str::to_string);
        let primary = lines.next().unwrap_or_default();
        Self {
            kind,
            severity,
            message: primary,
            details: lines.collect(),
            origin: None,
        }
    }

    /// Shorthand for a warning
    pub fn warning(kind: AlertKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    /// Shorthand for an error
    pub fn error(kind: AlertKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    /// Attach the originating line
    pub fn with_origin(
        mut self,
        file: impl Into<String>,
        line_number: usize,
        line_text: impl Into<String>,
    ) -> Self {
        self.origin = Some(AlertOrigin {
            file: file.into(),
            line_number,
            line_text: line_text.into(),
        });
        self
    }

    /// Append a detail line
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(ref origin) = self.origin {
            write!(f, " ({}:{})", origin.file, origin.line_number)?;
        }
        Ok(())
    }
}

/// Callback invoked for every emitted alert
pub type AlertObserver = Arc<dyn Fn(&Alert) + Send + Sync>;

/// Shared cancellation flag for an in-progress load.
///
/// Clones observe the same flag. The loader polls the handle once per parsed
/// line and before opening each file; setting it makes the load return
/// [`Error::LoadCanceled`](crate::error::Error::LoadCanceled) at the next
/// poll point.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a new, unset handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the load observing this handle
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear the flag so the handle can be reused for another load
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Collects alerts for one load session and forwards them to an observer
pub struct AlertChannel {
    alerts: Vec<Alert>,
    observer: Option<AlertObserver>,
    cancel: CancelHandle,
}

impl AlertChannel {
    /// Create a channel with no observer and a fresh cancel handle
    pub fn new() -> Self {
        Self {
            alerts: Vec::new(),
            observer: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Create a channel forwarding to `observer`, polling `cancel`
    pub fn with_observer(observer: Option<AlertObserver>, cancel: CancelHandle) -> Self {
        Self {
            alerts: Vec::new(),
            observer,
            cancel,
        }
    }

    /// Record an alert, log it, and notify the observer
    pub fn emit(&mut self, alert: Alert) {
        match alert.severity {
            Severity::Warning => log::warn!("{}", alert),
            Severity::Error => log::error!("{}", alert),
        }
        if let Some(ref observer) = self.observer {
            observer(&alert);
        }
        self.alerts.push(alert);
    }

    /// All alerts emitted so far, in emission order
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Whether any alert with `Severity::Error` was emitted
    pub fn has_errors(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| a.severity == Severity::Error)
    }

    /// The cancel handle polled by loads using this channel
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether cancellation has been requested
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }
}

impl Default for AlertChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertChannel")
            .field("alerts", &self.alerts.len())
            .field("observer", &self.observer.is_some())
            .field("canceled", &self.cancel.is_canceled())
            .finish()
    }
}
