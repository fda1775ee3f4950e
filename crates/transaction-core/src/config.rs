use serde::{Deserialize, Serialize};

use crate::timer::TimerSettings;

/// Default capacity of the event channel handed to the TU
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;
/// Default capacity of each transaction's command channel
pub const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Configuration for a [`TransactionProvider`](crate::TransactionProvider)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Timer durations for every transaction
    pub timers: TimerSettings,
    pub event_channel_capacity: usize,
    pub command_channel_capacity: usize,
    /// Report responses that match no transaction as
    /// `TransactionEvent::UnmatchedMessage` instead of only logging them
    pub report_unmatched_messages: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timers: TimerSettings::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
            report_unmatched_messages: false,
        }
    }
}

impl ProviderConfig {
    pub fn with_timers(mut self, timers: TimerSettings) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_unmatched_messages(mut self, report: bool) -> Self {
        self.report_unmatched_messages = report;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_config_json_round_trip() {
        let config = ProviderConfig::default()
            .with_timers(TimerSettings::from_t1_t2_t4(
                Duration::from_millis(100),
                Duration::from_secs(1),
                Duration::from_secs(2),
            ))
            .with_unmatched_messages(true);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: ProviderConfig = serde_json::from_str(r#"{"report_unmatched_messages":true}"#).unwrap();
        assert!(parsed.report_unmatched_messages);
        assert_eq!(parsed.timers, TimerSettings::default());
        assert_eq!(parsed.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }
}
