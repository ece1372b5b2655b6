//! Deterministic doubles for exercising delivery paths without a real
//! connection framework.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::connections::ConnectionHandle;

/// Connection double that records every delivery it receives.
pub struct RecordingConnection {
    send_capable: bool,
    writes: Mutex<Vec<Value>>,
    sends: Mutex<Vec<Value>>,
}

impl RecordingConnection {
    /// A connection with both `write` and `send` capabilities.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            send_capable: true,
            writes: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        })
    }

    /// A connection without the `send` capability.
    pub fn write_only() -> Arc<Self> {
        Arc::new(Self {
            send_capable: false,
            writes: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        })
    }

    pub fn writes(&self) -> Vec<Value> {
        self.writes.lock().clone()
    }

    pub fn sends(&self) -> Vec<Value> {
        self.sends.lock().clone()
    }

    /// Total deliveries of either kind.
    pub fn total(&self) -> usize {
        self.writes.lock().len() + self.sends.lock().len()
    }
}

impl ConnectionHandle for RecordingConnection {
    fn write(&self, data: &Value) {
        self.writes.lock().push(data.clone());
    }

    fn send(&self, data: &Value) -> bool {
        if !self.send_capable {
            return false;
        }
        self.sends.lock().push(data.clone());
        true
    }
}
