//! Emergency halt state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted halt singleton. While `active`, every mutation is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltState {
    pub active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl HaltState {
    #[must_use]
    pub fn activated(reason: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            active: true,
            reason,
            activated_at: Some(now),
        }
    }

    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Human-readable reason for error messages.
    #[must_use]
    pub fn reason_or_default(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| "emergency halt active".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_inactive() {
        let state = HaltState::default();
        assert!(!state.active);
        assert_eq!(state.reason_or_default(), "emergency halt active");
    }

    #[test]
    fn json_roundtrip_keeps_reason() {
        let state = HaltState::activated(Some("oracle outage".into()), Utc::now());
        let back: HaltState = serde_json::from_str(&serde_json::to_string(&state).unwrap()).unwrap();
        assert_eq!(back, state);
    }
}
