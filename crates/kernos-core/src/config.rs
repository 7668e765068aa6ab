//! Kernel timing and execution settings.

use std::time::Duration;

/// Default time a kernel gets to report ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time to wait for each message while draining output.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by every kernel session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Bound on kernel startup.
    pub ready_timeout: Duration,
    /// Bound on each receive while draining an execution.
    pub message_timeout: Duration,
    /// Write drained outputs back into the executed cell.
    pub record_outputs: bool,
}

impl KernelConfig {
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    pub fn with_record_outputs(mut self, record: bool) -> Self {
        self.record_outputs = record;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            record_outputs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.ready_timeout, Duration::from_secs(60));
        assert_eq!(config.message_timeout, Duration::from_secs(60));
        assert!(!config.record_outputs);
    }
}
