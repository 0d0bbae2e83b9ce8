//! Recording providers shared by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use coffer_common::{Error, Result};
use crate::provider::StorageProvider;

/// Shared, ordered event log.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Provider that appends every call to an event log.
pub struct RecordingProvider {
    pub log: EventLog,
    pub fail_init: AtomicBool,
    pub fail_exit: bool,
}

impl RecordingProvider {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_init: AtomicBool::new(false),
            fail_exit: false,
        }
    }

    pub fn failing_exit(log: EventLog) -> Self {
        Self {
            fail_exit: true,
            ..Self::new(log)
        }
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl StorageProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn init(&self) -> Result<()> {
        self.record("init".to_string());
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(Error::Storage("connection refused".to_string()));
        }
        Ok(())
    }

    async fn exit(&self) -> Result<()> {
        self.record("exit".to_string());
        if self.fail_exit {
            return Err(Error::Storage("close failed".to_string()));
        }
        Ok(())
    }

    async fn upload(&self, file: &str, filename: &str) -> Result<()> {
        self.record(format!("upload {} {}", file, filename));
        Ok(())
    }

    async fn remove(&self, filename: &str) -> Result<()> {
        self.record(format!("remove {}", filename));
        Ok(())
    }

    async fn exists(&self, filename: &str) -> Result<bool> {
        self.record(format!("exists {}", filename));
        Ok(filename == "present.txt")
    }
}
