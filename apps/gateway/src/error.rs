use std::fmt;

/// Error surfaced by the gateway's external collaborators: the event log, the
/// presence store, and the persistence reads/writes.
///
/// Downstream failures never reach the client as structured errors; they are
/// logged at the call site and the operation is abandoned.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unavailable(what: &str) -> Self {
        Self::new(format!("{what} unavailable"))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreError {}
