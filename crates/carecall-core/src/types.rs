use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable external identifier of a record: the source spreadsheet row.
pub type RowNumber = u32;

// ---------------------------------------------------------------------------
// CallState
// ---------------------------------------------------------------------------

/// Per-record call progress.
///
/// Transitions: `Pending → Dialing → InProgress → Completed | Failed | Skipped`,
/// plus `Dialing → Failed | Skipped` for dispatches that never got acknowledged.
/// Only `QueueStore::reset_all` moves a record back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Pending,
    Dialing,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl CallState {
    pub fn all() -> &'static [CallState] {
        &[
            CallState::Pending,
            CallState::Dialing,
            CallState::InProgress,
            CallState::Completed,
            CallState::Skipped,
            CallState::Failed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallState::Pending => "pending",
            CallState::Dialing => "dialing",
            CallState::InProgress => "in_progress",
            CallState::Completed => "completed",
            CallState::Skipped => "skipped",
            CallState::Failed => "failed",
        }
    }

    /// A call is in flight while dialing or connected.
    pub fn is_active(self) -> bool {
        matches!(self, CallState::Dialing | CallState::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Skipped | CallState::Failed
        )
    }

    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Pending, Dialing)
                | (Dialing, InProgress)
                | (Dialing, Failed)
                | (Dialing, Skipped)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Skipped)
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CallOutcome
// ---------------------------------------------------------------------------

/// Classification of a finished call, set once when the record turns terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    AppointmentBooked,
    RescheduleRequested,
    Incomplete,
    Failed,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::AppointmentBooked => "appointment_booked",
            CallOutcome::RescheduleRequested => "reschedule_requested",
            CallOutcome::Incomplete => "incomplete",
            CallOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallOutcome {
    type Err = crate::error::CarecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appointment_booked" | "appointment-booked" => Ok(CallOutcome::AppointmentBooked),
            "reschedule_requested" | "reschedule-requested" => {
                Ok(CallOutcome::RescheduleRequested)
            }
            "incomplete" => Ok(CallOutcome::Incomplete),
            "failed" => Ok(CallOutcome::Failed),
            _ => Err(crate::error::CarecallError::InvalidOutcome(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Queue-wide running state, distinct from a single record's `CallState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running => "running",
            Lifecycle::Paused => "paused",
            Lifecycle::Stopped => "stopped",
            Lifecycle::Completed => "completed",
        }
    }

    /// States from which `reset` is accepted.
    pub fn accepts_reset(self) -> bool {
        matches!(
            self,
            Lifecycle::Idle | Lifecycle::Stopped | Lifecycle::Completed
        )
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProviderEvent
// ---------------------------------------------------------------------------

/// Status reported by the telephony/AI collaborator for the active call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// The callee picked up.
    Answered,
    NoAnswer,
    Busy,
    Failed { reason: String },
    Completed { outcome: CallOutcome },
}

impl ProviderEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEvent::Answered => "answered",
            ProviderEvent::NoAnswer => "no_answer",
            ProviderEvent::Busy => "busy",
            ProviderEvent::Failed { .. } => "failed",
            ProviderEvent::Completed { .. } => "completed",
        }
    }
}

impl fmt::Display for ProviderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_graph_is_the_only_way() {
        use CallState::*;
        assert!(Pending.can_transition_to(Dialing));
        assert!(Dialing.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Skipped));
        assert!(Dialing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Dialing.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states_have_no_exit() {
        for &from in CallState::all().iter().filter(|s| s.is_terminal()) {
            for &to in CallState::all() {
                assert!(
                    !from.can_transition_to(to),
                    "{from} must not move to {to}"
                );
            }
        }
    }

    #[test]
    fn outcome_parses_both_spellings() {
        assert_eq!(
            "appointment-booked".parse::<CallOutcome>().unwrap(),
            CallOutcome::AppointmentBooked
        );
        assert_eq!(
            "reschedule_requested".parse::<CallOutcome>().unwrap(),
            CallOutcome::RescheduleRequested
        );
        assert!("booked".parse::<CallOutcome>().is_err());
    }

    #[test]
    fn provider_event_wire_shape() {
        let json = serde_json::to_value(ProviderEvent::Completed {
            outcome: CallOutcome::Incomplete,
        })
        .unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["outcome"], "incomplete");

        let parsed: ProviderEvent = serde_json::from_str(r#"{"type":"no_answer"}"#).unwrap();
        assert_eq!(parsed, ProviderEvent::NoAnswer);
    }
}
