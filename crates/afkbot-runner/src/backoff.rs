use std::time::Duration;

use afkbot_client::config::ReconnectConfig;

/// How long to wait before the next session cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub delay: Duration,
    pub throttled: bool,
}

/// Whether a disconnect cause says the server is rate-limiting us.
///
/// Case-insensitive. An empty marker never matches.
pub fn is_throttled(cause: &str, config: &ReconnectConfig) -> bool {
    let marker = config.throttle_marker.to_lowercase();
    !marker.is_empty() && cause.to_lowercase().contains(&marker)
}

/// Pick the reconnect delay for a disconnect cause: long when throttled,
/// short otherwise. Never grows with repeated failures.
pub fn calculate_delay(cause: &str, config: &ReconnectConfig) -> Backoff {
    if is_throttled(cause, config) {
        Backoff {
            delay: config.long_delay(),
            throttled: true,
        }
    } else {
        Backoff {
            delay: config.short_delay(),
            throttled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_marker_selects_long_delay() {
        let config = ReconnectConfig::default();
        let backoff = calculate_delay("Connection THROTTLED! Please wait", &config);
        assert_eq!(backoff.delay, Duration::from_secs(600));
        assert!(backoff.throttled);
    }

    #[test]
    fn test_ordinary_reason_selects_short_delay() {
        let config = ReconnectConfig::default();
        for cause in ["Kicked for idling", "", "Server closed"] {
            let backoff = calculate_delay(cause, &config);
            assert_eq!(backoff.delay, Duration::from_secs(120));
            assert!(!backoff.throttled);
        }
    }

    #[test]
    fn test_custom_marker_and_delays() {
        let config = ReconnectConfig {
            short_delay_secs: 5,
            long_delay_secs: 50,
            throttle_marker: "Too Fast".to_string(),
        };
        assert_eq!(
            calculate_delay("you are logging in too fast", &config).delay,
            Duration::from_secs(50)
        );
        assert_eq!(
            calculate_delay("throttled", &config).delay,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_empty_marker_never_matches() {
        let config = ReconnectConfig {
            throttle_marker: String::new(),
            ..ReconnectConfig::default()
        };
        assert!(!is_throttled("throttled", &config));
    }
}
