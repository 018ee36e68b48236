//! Status events published by the lifecycle engine.
//!
//! Every transition produces one [`StatusEvent`]. Hosts either register a
//! [`StatusObserver`] or subscribe to the broadcast stream returned by
//! `PhoneEngine::subscribe_status`.

use serde::{Deserialize, Serialize};

/// Phone lifecycle state. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Engine constructed, collaborators not yet initialized.
    Initializing,
    OnHook,
    /// Receiver lifted, no dialog and no call.
    OffHookIdle,
    /// Incoming call, bell ringing.
    RingingPending,
    DialogInProgress,
    CallActive,
    /// Initialization failed. Terminal.
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::OnHook => "on_hook",
            LifecycleState::OffHookIdle => "off_hook_idle",
            LifecycleState::RingingPending => "ringing_pending",
            LifecycleState::DialogInProgress => "dialog_in_progress",
            LifecycleState::CallActive => "call_active",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Human-readable status line, e.g. "Phone Off Hook".
    pub status: String,
    pub state: LifecycleState,
}

/// Receives every status event in publication order.
pub trait StatusObserver: Send + Sync {
    fn status_updated(&self, event: &StatusEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_snake_case_state() {
        let event = StatusEvent {
            seq: 3,
            status: "Incoming call from alice".into(),
            state: LifecycleState::RingingPending,
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["status"], "Incoming call from alice");
        assert_eq!(json["state"], "ringing_pending");

        let round_trip: StatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip, event);
    }

    #[test]
    fn display_matches_wire_name() {
        for state in [
            LifecycleState::Initializing,
            LifecycleState::OffHookIdle,
            LifecycleState::DialogInProgress,
            LifecycleState::Failed,
        ] {
            let json = serde_json::to_value(state).expect("serialize state");
            assert_eq!(json, state.to_string());
        }
    }

    #[test]
    fn lifecycle_state_rejects_unknown_values() {
        let parsed = serde_json::from_str::<LifecycleState>("\"OnHook\"");
        assert!(parsed.is_err(), "PascalCase state should not deserialize");
    }
}
