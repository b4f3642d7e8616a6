//! Session configuration

use std::time::Duration;

/// Default time a session may spend before reaching `connected`
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session settings shared by every session of a manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Close sessions that are not connected within this time (None = never)
    pub negotiation_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Some(DEFAULT_NEGOTIATION_TIMEOUT),
        }
    }
}

impl SessionConfig {
    /// Set the negotiation timeout
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = Some(timeout);
        self
    }

    /// Never time out negotiation
    pub fn disable_negotiation_timeout(mut self) -> Self {
        self.negotiation_timeout = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(
            SessionConfig::default().negotiation_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default().negotiation_timeout(Duration::from_secs(5));
        assert_eq!(config.negotiation_timeout, Some(Duration::from_secs(5)));

        let config = config.disable_negotiation_timeout();
        assert!(config.negotiation_timeout.is_none());
    }
}
