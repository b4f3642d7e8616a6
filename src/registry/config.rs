//! Registry configuration

/// What happens when a second session publishes a kind that is already owned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// The newest publisher replaces the current owner
    #[default]
    Preempt,
    /// The slot stays with its owner until released
    Reject,
}

/// Configuration for [`TrackRegistry`](super::TrackRegistry)
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Pre-emption policy for occupied slots
    pub publish_policy: PublishPolicy,
}

impl RegistryConfig {
    /// Set the publish policy
    pub fn publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }
}
