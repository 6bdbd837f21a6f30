//! Structured events emitted while collecting and coordinating.
//!
//! The collector and coordinator never log directly; they push [`Event`]s
//! into an injected [`EventSink`]. The process decides where they go.

use serde::Serialize;
use std::sync::Arc;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    /// Monitoring was halted.
    Fatal,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Warning => write!(f, "warning"),
            EventLevel::Error => write!(f, "error"),
            EventLevel::Fatal => write!(f, "fatal"),
        }
    }
}

/// One structured event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub level: EventLevel,
    pub message: String,
    /// Device the event is about, if any.
    pub device: Option<String>,
    /// Sub-device of `device` the event is about, if any.
    pub sub_device: Option<String>,
}

impl Event {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            device: None,
            sub_device: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Fatal, message)
    }

    /// Scopes the event to a device.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Scopes the event to a sub-device of the current device.
    pub fn with_sub_device(mut self, sub_device: impl Into<String>) -> Self {
        self.sub_device = Some(sub_device.into());
        self
    }
}

/// Receiver of structured events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: Event) {
        (**self).emit(event)
    }
}

/// Writes an event to `tracing` at the matching level.
pub fn trace_event(event: &Event) {
    let device = event.device.as_deref().unwrap_or("");
    let sub_device = event.sub_device.as_deref().unwrap_or("");
    match event.level {
        EventLevel::Info => tracing::info!(device, sub_device, "{}", event.message),
        EventLevel::Warning => tracing::warn!(device, sub_device, "{}", event.message),
        EventLevel::Error => tracing::error!(device, sub_device, "{}", event.message),
        EventLevel::Fatal => tracing::error!(device, sub_device, fatal = true, "{}", event.message),
    }
}
