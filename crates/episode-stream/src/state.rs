use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::classify::ClassifiedEvent;

/// Lifecycle of a generation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationStatus {
    /// No event has been applied yet.
    #[default]
    Idle,
    /// At least one event applied, no terminal event yet.
    Streaming,
    /// The server reported success. Terminal.
    Completed,
    /// The server or the transport reported a failure. Terminal.
    Failed,
}

impl GenerationStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Observable result of a generation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub status: GenerationStatus,
    /// Percent complete, `0..=100`.
    pub percent: u8,
    /// Every notification message, in arrival order.
    pub messages: Vec<String>,
    pub final_payload: Option<Map<String, Value>>,
    pub error: Option<String>,
}

impl GenerationState {
    /// The most recent progress message, if any.
    pub fn latest_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True while the run has not reached a terminal status.
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }
}

/// Applies classified events, in order, to a `GenerationState`.
///
/// `Idle -> Streaming -> {Completed, Failed}`. Events after a terminal
/// status are ignored.
#[derive(Debug, Default)]
pub struct ProgressStateMachine {
    state: GenerationState,
}

impl ProgressStateMachine {
    /// Starts at `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn into_state(self) -> GenerationState {
        self.state
    }

    /// Applies one event. Returns whether any field of the state changed.
    pub fn apply(&mut self, event: ClassifiedEvent) -> bool {
        if self.state.is_terminal() {
            debug!(kind = event.kind(), "ignoring event after terminal status");
            return false;
        }
        if let ClassifiedEvent::Unrecognized { raw } = &event {
            debug!(event_name = %raw.event_name, data = %raw.data, "unrecognized frame");
            return false;
        }

        if self.state.status == GenerationStatus::Idle {
            self.state.status = GenerationStatus::Streaming;
        }

        match event {
            ClassifiedEvent::Notification {
                message,
                index,
                total,
            } => {
                self.state.messages.push(message);
                if let Some(percent) = progress_percent(index, total) {
                    self.state.percent = percent;
                }
                true
            }
            ClassifiedEvent::Completed { payload } => {
                self.state.final_payload = Some(payload);
                self.state.percent = 100;
                self.state.status = GenerationStatus::Completed;
                true
            }
            ClassifiedEvent::Failed { message } => {
                self.state.error = Some(message);
                self.state.status = GenerationStatus::Failed;
                true
            }
            ClassifiedEvent::Unrecognized { .. } => false,
        }
    }
}

/// `round((index + 1) / total * 100)` clamped to `0..=100`, or `None` when
/// either field is missing or `total` is not positive.
fn progress_percent(index: Option<f64>, total: Option<f64>) -> Option<u8> {
    let (index, total) = (index?, total?);
    if total <= 0.0 {
        return None;
    }
    let percent = ((index + 1.0) / total * 100.0).round();
    if percent.is_nan() {
        return None;
    }
    Some(percent.clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use serde_json::json;

    fn note(message: &str, index: Option<f64>, total: Option<f64>) -> ClassifiedEvent {
        ClassifiedEvent::Notification {
            message: message.into(),
            index,
            total,
        }
    }

    fn completed(value: Value) -> ClassifiedEvent {
        match value {
            Value::Object(payload) => ClassifiedEvent::Completed { payload },
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn first_notification_starts_streaming_and_sets_percent() {
        let mut machine = ProgressStateMachine::new();
        assert_eq!(machine.state().status, GenerationStatus::Idle);
        assert!(machine.apply(note("step1", Some(0.0), Some(4.0))));
        let state = machine.state();
        assert_eq!(state.status, GenerationStatus::Streaming);
        assert_eq!(state.messages, vec!["step1".to_string()]);
        assert_eq!(state.percent, 25);
        assert_eq!(state.latest_message(), Some("step1"));
    }

    #[test]
    fn notification_without_total_keeps_percent() {
        let mut machine = ProgressStateMachine::new();
        machine.apply(note("a", Some(1.0), Some(3.0)));
        machine.apply(note("", None, None));
        machine.apply(note("b", Some(2.0), Some(0.0)));
        machine.apply(note("c", None, Some(3.0)));
        let state = machine.state();
        assert_eq!(state.percent, 67);
        assert_eq!(state.messages, vec!["a", "", "b", "c"]);
    }

    #[test]
    fn percent_is_clamped_and_may_regress() {
        let mut machine = ProgressStateMachine::new();
        machine.apply(note("overshoot", Some(9.0), Some(4.0)));
        assert_eq!(machine.state().percent, 100);
        machine.apply(note("back", Some(0.0), Some(2.0)));
        assert_eq!(machine.state().percent, 50);
        machine.apply(note("negative", Some(-5.0), Some(2.0)));
        assert_eq!(machine.state().percent, 0);
    }

    #[test]
    fn completed_is_terminal_and_forces_full_percent() {
        let mut machine = ProgressStateMachine::new();
        machine.apply(note("step1", Some(0.0), Some(4.0)));
        assert!(machine.apply(completed(json!({"url": "x.mp4"}))));
        let snapshot = machine.state().clone();
        assert_eq!(snapshot.status, GenerationStatus::Completed);
        assert_eq!(snapshot.percent, 100);
        assert_eq!(
            snapshot.final_payload.as_ref().and_then(|p| p.get("url")),
            Some(&json!("x.mp4"))
        );

        assert!(!machine.apply(note("late", Some(0.0), Some(4.0))));
        assert!(!machine.apply(ClassifiedEvent::Failed {
            message: "late".into()
        }));
        assert_eq!(machine.state(), &snapshot);
    }

    #[test]
    fn failed_is_terminal() {
        let mut machine = ProgressStateMachine::new();
        assert!(machine.apply(ClassifiedEvent::Failed {
            message: "boom".into()
        }));
        let snapshot = machine.state().clone();
        assert_eq!(snapshot.status, GenerationStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert!(!machine.apply(completed(json!({"url": "x.mp4"}))));
        assert_eq!(machine.into_state(), snapshot);
    }

    #[test]
    fn unrecognized_never_changes_state() {
        let mut machine = ProgressStateMachine::new();
        let raw = RawFrame::new("ping", "");
        assert!(!machine.apply(ClassifiedEvent::Unrecognized { raw: raw.clone() }));
        assert_eq!(machine.state(), &GenerationState::default());

        machine.apply(note("step", Some(1.0), Some(4.0)));
        let snapshot = machine.state().clone();
        assert!(!machine.apply(ClassifiedEvent::Unrecognized { raw }));
        assert_eq!(machine.state(), &snapshot);
    }

    #[test]
    fn state_serializes_in_camel_case() {
        let mut machine = ProgressStateMachine::new();
        machine.apply(completed(json!({"url": "x.mp4"})));
        let value = serde_json::to_value(machine.state()).expect("serialize");
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["finalPayload"], json!({"url": "x.mp4"}));
        assert_eq!(value["percent"], json!(100));
    }
}
