//! Live progress reporting for sync runs
//!
//! Two layers:
//!
//! - [`ProgressUpdate`]: one per successfully processed action, handed to the
//!   engine's progress callback
//! - [`SyncEvent`]: the push stream consumed by a UI or the CLI, delivered
//!   through an [`EventSink`]

use crate::engine::SyncResult;
use invsync_types::{ActionReason, SyncOperation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Progress of one processed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Executed operation
    pub operation: SyncOperation,
    /// Resource name
    pub resource_name: String,
    /// Planner reason
    pub reason: ActionReason,
}

/// Callback receiving a [`ProgressUpdate`] per processed action
pub type ProgressCallback<'a> = &'a (dyn Fn(&ProgressUpdate) + Send + Sync);

/// Severity of a streamed log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Step started
    Info,
    /// Step finished
    Success,
    /// Something the operator should look at
    Warning,
    /// A step or action failed
    Error,
    /// Chatter (heartbeats)
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Event pushed to a live consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncEvent {
    /// Log line
    Log {
        /// Severity
        level: LogLevel,
        /// Text
        message: String,
        /// Resource the line is about
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource: Option<String>,
        /// Operation the line is about
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<SyncOperation>,
    },
    /// The run finished
    Complete(SyncResult),
    /// The run aborted before or during setup
    Error {
        /// Error message
        error: String,
    },
}

/// Sending half of the event stream.
///
/// Cloning is cheap. Events sent after the receiver is gone are dropped;
/// a disconnected consumer never fails a run.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl EventSink {
    /// Connected sink and its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether nobody is listening
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, mpsc::UnboundedSender::is_closed)
    }

    /// Push an event
    pub fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("Event consumer disconnected, dropping event");
            }
        }
    }

    /// Push a log line
    pub fn log<S: Into<String>>(&self, level: LogLevel, message: S) {
        self.emit(SyncEvent::Log {
            level,
            message: message.into(),
            resource: None,
            operation: None,
        });
    }

    /// Push a log line about one resource
    pub fn log_action<S: Into<String>>(
        &self,
        level: LogLevel,
        message: S,
        resource: &str,
        operation: SyncOperation,
    ) {
        self.emit(SyncEvent::Log {
            level,
            message: message.into(),
            resource: Some(resource.to_string()),
            operation: Some(operation),
        });
    }

    /// Info line
    pub fn info<S: Into<String>>(&self, message: S) {
        self.log(LogLevel::Info, message);
    }

    /// Success line
    pub fn success<S: Into<String>>(&self, message: S) {
        self.log(LogLevel::Success, message);
    }

    /// Warning line
    pub fn warning<S: Into<String>>(&self, message: S) {
        self.log(LogLevel::Warning, message);
    }

    /// Error line
    pub fn error<S: Into<String>>(&self, message: S) {
        self.log(LogLevel::Error, message);
    }

    /// Debug line
    pub fn debug<S: Into<String>>(&self, message: S) {
        self.log(LogLevel::Debug, message);
    }

    /// Final event of a finished run
    pub fn complete(&self, result: SyncResult) {
        self.emit(SyncEvent::Complete(result));
    }

    /// Final event of an aborted run
    pub fn fail<E: fmt::Display>(&self, error: &E) {
        self.emit(SyncEvent::Error {
            error: error.to_string(),
        });
    }
}
