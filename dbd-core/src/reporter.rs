use tracing::{debug, error, info, warn};

/// Leveled reporting handle handed to every plugin invocation.
///
/// A `Reporter` forwards to the tracing subscriber. Plugin bodies get a
/// muted sub-handle so that routine chatter from fan-out commands does not
/// reach the user; warnings and errors always pass through.
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    muted: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Reporter { muted: false }
    }

    /// Derives the muted child handle used for the duration of one
    /// plugin invocation.
    pub fn sub(&self) -> Reporter {
        Reporter { muted: true }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn verbose(&self, msg: &str) {
        debug!("{}", msg);
    }

    pub fn info(&self, msg: &str) {
        if !self.muted {
            info!("{}", msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        warn!("{}", msg);
    }

    pub fn error(&self, msg: &str) {
        error!("{}", msg);
    }

    /// Reports a captured plugin fault. Never suppressed by muting.
    pub fn exception(&self, msg: &str) {
        error!("{}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_handle_is_muted() {
        let reporter = Reporter::new();
        assert!(!reporter.is_muted());
        assert!(reporter.sub().is_muted());
        // Muting is sticky across further derivation.
        assert!(reporter.sub().sub().is_muted());
    }
}
