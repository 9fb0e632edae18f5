//! Durable session configuration.

use crate::error::{DurableError, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Upper bound on the minimum self-signal delay.
pub const MAX_SIGNAL_DELAY: Duration = Duration::from_secs(5 * 60);

/// Default session time-to-live: 14 days.
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Configuration of durable sessions: TTLs and self-signal pacing.
///
/// TTL resolution order: a per-agent override (matched case-insensitively)
/// wins over the default; `None` at either level disables eviction.
#[derive(Debug, Clone)]
pub struct DurableSessionOptions {
    default_time_to_live: Option<Duration>,
    min_signal_delay: Duration,
    ttl_overrides: HashMap<String, Option<Duration>>,
}

impl Default for DurableSessionOptions {
    fn default() -> Self {
        Self {
            default_time_to_live: Some(DEFAULT_TIME_TO_LIVE),
            min_signal_delay: Duration::from_secs(60),
            ttl_overrides: HashMap::new(),
        }
    }
}

impl DurableSessionOptions {
    /// Options with the defaults: 14-day TTL, one-minute minimum signal
    /// delay, no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default time-to-live; `None` disables eviction.
    pub fn with_default_time_to_live(mut self, ttl: Option<Duration>) -> Self {
        self.default_time_to_live = ttl;
        self
    }

    /// Set the minimum delay before a scheduled self-signal may fire.
    ///
    /// Rejected at configuration time when above five minutes.
    pub fn with_min_signal_delay(mut self, delay: Duration) -> Result<Self> {
        if delay > MAX_SIGNAL_DELAY {
            return Err(DurableError::configuration(format!(
                "min signal delay of {}s exceeds the {}s maximum",
                delay.as_secs(),
                MAX_SIGNAL_DELAY.as_secs()
            )));
        }
        self.min_signal_delay = delay;
        Ok(self)
    }

    /// Override the TTL for one agent; `None` disables eviction for it.
    pub fn with_agent_time_to_live(
        mut self,
        agent_name: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        self.ttl_overrides
            .insert(agent_name.into().to_lowercase(), ttl);
        self
    }

    /// Effective TTL for an agent.
    pub fn time_to_live_for(&self, agent_name: &str) -> Option<Duration> {
        match self.ttl_overrides.get(&agent_name.to_lowercase()) {
            Some(overridden) => *overridden,
            None => self.default_time_to_live,
        }
    }

    /// The minimum self-signal delay.
    pub fn min_signal_delay(&self) -> Duration {
        self.min_signal_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_contract() {
        let options = DurableSessionOptions::new();
        assert_eq!(options.time_to_live_for("any"), Some(DEFAULT_TIME_TO_LIVE));
    }

    #[test]
    fn six_minutes_of_signal_delay_is_rejected() {
        let err = DurableSessionOptions::new()
            .with_min_signal_delay(Duration::from_secs(6 * 60))
            .unwrap_err();
        assert!(matches!(err, DurableError::Configuration(_)));

        // The boundary itself is allowed.
        DurableSessionOptions::new()
            .with_min_signal_delay(MAX_SIGNAL_DELAY)
            .unwrap();
    }

    #[test]
    fn per_agent_overrides_win_case_insensitively() {
        let options = DurableSessionOptions::new()
            .with_agent_time_to_live("Scribe", Some(Duration::from_secs(60)))
            .with_agent_time_to_live("ephemeral", None);

        assert_eq!(
            options.time_to_live_for("scribe"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(options.time_to_live_for("EPHEMERAL"), None);
        assert_eq!(options.time_to_live_for("other"), Some(DEFAULT_TIME_TO_LIVE));
    }
}
