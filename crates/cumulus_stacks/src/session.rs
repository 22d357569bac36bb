//! Per-run context shared by the stack operations.

use std::sync::Arc;
use std::time::Duration;

use cumulus_providers::ProviderContext;
use cumulus_templates::{ReferenceResolver, TemplateFetcher, TemplateRenderer};

use crate::change_set::ChangeSetDecider;

/// Manual polling settings for providers without native waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Number of polls that fit in the timeout.
    pub fn attempts(&self) -> u128 {
        if self.interval.is_zero() {
            return 1;
        }
        self.timeout.as_nanos() / self.interval.as_nanos()
    }
}

/// Provider clients, resolver caches and operator hooks for one run.
pub struct Session {
    pub providers: ProviderContext,
    pub resolver: Arc<ReferenceResolver>,
    pub renderer: TemplateRenderer,
    pub fetcher: TemplateFetcher,
    pub decider: Arc<dyn ChangeSetDecider>,
    pub poll: PollConfig,
}

impl Session {
    /// Build a session around `providers`. The template URL prefix is read
    /// from the environment.
    pub fn new(providers: ProviderContext, decider: Arc<dyn ChangeSetDecider>) -> Self {
        let resolver = Arc::new(ReferenceResolver::new(providers.clone()));
        Self {
            renderer: TemplateRenderer::new(resolver.clone()),
            fetcher: TemplateFetcher::from_env(providers.aws.clone()),
            resolver,
            providers,
            decider,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_fetcher(mut self, fetcher: TemplateFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("resolver", &self.resolver)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts() {
        assert_eq!(PollConfig::default().attempts(), 60);
        let poll = PollConfig::new(Duration::from_millis(5), Duration::from_millis(10));
        assert_eq!(poll.attempts(), 2);
        let poll = PollConfig::new(Duration::from_millis(4), Duration::from_millis(10));
        assert_eq!(poll.attempts(), 2);
    }
}
