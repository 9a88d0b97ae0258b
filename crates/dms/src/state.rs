//! Driver state tracking
//!
//! Turns the noisy stream of per-frame verdicts into a stable status message,
//! an alert dialog flag, and rate-limited alert dispatches.

use std::fmt;
use std::time::{Duration, Instant};

use alerting::{AlertManager, AlertState, AlertTrigger};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::FrameVerdict;
use crate::config::{DebounceConfig, DmsConfig};

/// Status line shown to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusMessage {
    #[default]
    Awake,
    Drowsy,
    EyesClosed { seconds: u64 },
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Awake => write!(f, "Driver is awake"),
            StatusMessage::Drowsy => write!(f, "Drowsiness detected, stay alert"),
            StatusMessage::EyesClosed { seconds } => {
                write!(f, "Eyes closed for {} s, wake up!", seconds)
            }
        }
    }
}

/// Observable state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    StatusChanged(StatusMessage),
    AlertDialogShown { closed_for_ms: u64 },
    AlertDialogCleared,
    DispatchAlert(AlertTrigger),
    CooldownReleased,
}

/// Debounce counters and closure timer
#[derive(Debug, Clone, Default)]
pub struct DebounceState {
    /// Consecutive drowsy frames
    pub drowsy_streak: u32,
    /// Consecutive awake frames
    pub awake_streak: u32,
    /// Start of the current both-eyes-closed run; set iff the timer runs
    pub eyes_closed_since: Option<Instant>,
    /// Alert dialog currently shown
    pub alert_dialog_visible: bool,
    /// Current status line
    pub status: StatusMessage,
}

/// Debouncing and alerting state machine
pub struct DrowsinessStateMachine {
    config: DebounceConfig,
    state: DebounceState,
    alerts: AlertManager,
}

impl DrowsinessStateMachine {
    pub fn new(config: &DmsConfig) -> Self {
        Self {
            config: config.debounce,
            state: DebounceState::default(),
            alerts: AlertManager::new(config.alert.clone()),
        }
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn alert_state(&self) -> AlertState {
        self.alerts.state()
    }

    pub fn alerts_dispatched(&self) -> u64 {
        self.alerts.dispatch_count()
    }

    /// Feed one frame verdict observed at `now`
    pub fn on_verdict(
        &mut self,
        verdict: &FrameVerdict,
        frame_sequence: u64,
        now: Instant,
    ) -> Vec<StateEvent> {
        let mut events = self.tick(now);

        // Closure timer
        if verdict.both_eyes_closed {
            let since = *self.state.eyes_closed_since.get_or_insert(now);
            let closed_for = now.saturating_duration_since(since);
            if closed_for >= self.config.closure_alert() {
                self.on_sustained_closure(closed_for, frame_sequence, now, &mut events);
            }
        } else {
            self.state.eyes_closed_since = None;
            if self.state.alert_dialog_visible {
                self.state.alert_dialog_visible = false;
                events.push(StateEvent::AlertDialogCleared);
            }
        }

        // Debounce streaks
        if verdict.is_drowsy {
            self.state.drowsy_streak = self.state.drowsy_streak.saturating_add(1);
            self.state.awake_streak = 0;
        } else {
            self.state.awake_streak = self.state.awake_streak.saturating_add(1);
            self.state.drowsy_streak = 0;
        }

        if !self.state.alert_dialog_visible {
            if self.state.drowsy_streak >= self.config.drowsy_streak {
                self.set_status(StatusMessage::Drowsy, &mut events);
            } else if self.state.awake_streak >= self.config.awake_streak {
                self.set_status(StatusMessage::Awake, &mut events);
            }
        }

        events
    }

    fn on_sustained_closure(
        &mut self,
        closed_for: Duration,
        frame_sequence: u64,
        now: Instant,
        events: &mut Vec<StateEvent>,
    ) {
        let closed_for_ms = closed_for.as_millis() as u64;

        if !self.state.alert_dialog_visible {
            self.state.alert_dialog_visible = true;
            info!("Eyes closed for {}ms, showing alert", closed_for_ms);
            events.push(StateEvent::AlertDialogShown { closed_for_ms });
            self.set_status(
                StatusMessage::EyesClosed {
                    seconds: closed_for.as_secs(),
                },
                events,
            );
        }

        if self.alerts.request(now) {
            self.alerts.commit();
            let trigger = AlertTrigger {
                sequence: self.alerts.dispatch_count(),
                closed_for_ms,
                frame_sequence,
            };
            warn!(
                "Dispatching drowsiness alert #{} (eyes closed {}ms)",
                trigger.sequence, closed_for_ms
            );
            metrics::counter!("dms_alerts_dispatched_total").increment(1);
            events.push(StateEvent::DispatchAlert(trigger));
        }
    }

    /// Time-driven step: release an expired alert cooldown
    pub fn tick(&mut self, now: Instant) -> Vec<StateEvent> {
        if self.alerts.release_expired(now) {
            vec![StateEvent::CooldownReleased]
        } else {
            Vec::new()
        }
    }

    /// External acknowledgment of the alert dialog.
    ///
    /// Streaks and the alert cooldown are left untouched.
    pub fn dismiss(&mut self) -> Vec<StateEvent> {
        let mut events = Vec::new();
        self.state.eyes_closed_since = None;
        if self.state.alert_dialog_visible {
            self.state.alert_dialog_visible = false;
            events.push(StateEvent::AlertDialogCleared);
        }
        self.set_status(StatusMessage::Awake, &mut events);
        debug!("Alert dismissed");
        events
    }

    fn set_status(&mut self, status: StatusMessage, events: &mut Vec<StateEvent>) {
        if self.state.status != status {
            debug!("Status: {} -> {}", self.state.status, status);
            self.state.status = status;
            events.push(StateEvent::StatusChanged(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(33);

    fn closed() -> FrameVerdict {
        FrameVerdict {
            is_drowsy: true,
            both_eyes_closed: true,
            both_partially_closed: true,
            one_eye_closed: false,
            face_present: true,
            left_percent: 5.0,
            right_percent: 5.0,
        }
    }

    fn squint() -> FrameVerdict {
        FrameVerdict {
            is_drowsy: true,
            both_eyes_closed: false,
            one_eye_closed: true,
            face_present: true,
            ..FrameVerdict::no_face()
        }
    }

    fn open() -> FrameVerdict {
        FrameVerdict {
            face_present: true,
            ..FrameVerdict::no_face()
        }
    }

    fn machine() -> DrowsinessStateMachine {
        DrowsinessStateMachine::new(&DmsConfig::default())
    }

    fn dispatches(events: &[StateEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, StateEvent::DispatchAlert(_)))
            .count()
    }

    #[test]
    fn test_initial_state() {
        let m = machine();
        assert_eq!(m.state().drowsy_streak, 0);
        assert_eq!(m.state().awake_streak, 0);
        assert!(m.state().eyes_closed_since.is_none());
        assert_eq!(m.alert_state(), AlertState::Idle);
        assert_eq!(m.state().status, StatusMessage::Awake);
    }

    #[test]
    fn test_drowsy_message_on_third_frame() {
        let mut m = machine();
        let t0 = Instant::now();

        assert!(m.on_verdict(&squint(), 0, t0).is_empty());
        assert!(m.on_verdict(&squint(), 1, t0 + FRAME).is_empty());
        assert_eq!(m.state().status, StatusMessage::Awake);

        let events = m.on_verdict(&squint(), 2, t0 + FRAME * 2);
        assert_eq!(events, vec![StateEvent::StatusChanged(StatusMessage::Drowsy)]);
        assert_eq!(m.state().drowsy_streak, 3);
    }

    #[test]
    fn test_single_frame_false_positive_rejected() {
        let mut m = machine();
        let t0 = Instant::now();
        m.on_verdict(&squint(), 0, t0);
        m.on_verdict(&squint(), 1, t0 + FRAME);
        m.on_verdict(&open(), 2, t0 + FRAME * 2);
        m.on_verdict(&squint(), 3, t0 + FRAME * 3);
        assert_eq!(m.state().status, StatusMessage::Awake);
        assert_eq!(m.state().drowsy_streak, 1);
    }

    #[test]
    fn test_awake_needs_five_frames() {
        let mut m = machine();
        let mut t = Instant::now();
        for seq in 0..3 {
            m.on_verdict(&squint(), seq, t);
            t += FRAME;
        }
        assert_eq!(m.state().status, StatusMessage::Drowsy);

        for seq in 3..7 {
            m.on_verdict(&open(), seq, t);
            t += FRAME;
            assert_eq!(m.state().status, StatusMessage::Drowsy);
        }
        let events = m.on_verdict(&open(), 7, t);
        assert_eq!(events, vec![StateEvent::StatusChanged(StatusMessage::Awake)]);
    }

    #[test]
    fn test_closure_timer_fires_after_two_seconds() {
        let mut m = machine();
        let t0 = Instant::now();

        m.on_verdict(&closed(), 0, t0);
        assert_eq!(m.state().eyes_closed_since, Some(t0));

        let events = m.on_verdict(&closed(), 1, t0 + Duration::from_millis(1999));
        assert!(!m.state().alert_dialog_visible);
        assert_eq!(dispatches(&events), 0);

        let events = m.on_verdict(&closed(), 2, t0 + Duration::from_millis(2000));
        assert!(m.state().alert_dialog_visible);
        assert_eq!(m.state().status, StatusMessage::EyesClosed { seconds: 2 });
        assert!(events.contains(&StateEvent::AlertDialogShown { closed_for_ms: 2000 }));
        assert_eq!(dispatches(&events), 1);
        assert!(matches!(m.alert_state(), AlertState::Cooldown { .. }));
    }

    #[test]
    fn test_open_eyes_clear_timer_and_dialog() {
        let mut m = machine();
        let t0 = Instant::now();
        m.on_verdict(&closed(), 0, t0);
        m.on_verdict(&closed(), 1, t0 + Duration::from_millis(2100));
        assert!(m.state().alert_dialog_visible);

        let events = m.on_verdict(&open(), 2, t0 + Duration::from_millis(2133));
        assert!(events.contains(&StateEvent::AlertDialogCleared));
        assert!(m.state().eyes_closed_since.is_none());
        assert!(!m.state().alert_dialog_visible);
    }

    #[test]
    fn test_dialog_suppresses_streak_messages() {
        let mut m = machine();
        let t0 = Instant::now();
        m.on_verdict(&closed(), 0, t0);
        m.on_verdict(&closed(), 1, t0 + Duration::from_millis(1000));
        m.on_verdict(&closed(), 2, t0 + Duration::from_millis(2000));
        // drowsy streak is 3, but the closure message wins
        assert_eq!(m.state().drowsy_streak, 3);
        assert_eq!(m.state().status, StatusMessage::EyesClosed { seconds: 2 });
    }

    #[test]
    fn test_ten_second_closure_dispatches_twice() {
        let mut m = machine();
        let t0 = Instant::now();
        let mut at = Vec::new();

        let mut elapsed = Duration::ZERO;
        let mut seq = 0;
        while elapsed <= Duration::from_secs(10) {
            let events = m.on_verdict(&closed(), seq, t0 + elapsed);
            if dispatches(&events) > 0 {
                at.push(elapsed);
            }
            elapsed += FRAME;
            seq += 1;
        }

        assert_eq!(at.len(), 2);
        assert!(at[0] >= Duration::from_millis(2000) && at[0] < Duration::from_millis(2040));
        assert!(at[1] >= Duration::from_millis(8000) && at[1] < Duration::from_millis(8080));
        assert_eq!(m.alerts_dispatched(), 2);
    }

    #[test]
    fn test_dismiss_restarts_countdown() {
        let mut m = machine();
        let t0 = Instant::now();
        m.on_verdict(&closed(), 0, t0);
        m.on_verdict(&closed(), 1, t0 + Duration::from_millis(2500));
        assert!(m.state().alert_dialog_visible);
        let streak = m.state().drowsy_streak;

        let events = m.dismiss();
        assert!(events.contains(&StateEvent::AlertDialogCleared));
        assert!(events.contains(&StateEvent::StatusChanged(StatusMessage::Awake)));
        assert!(m.state().eyes_closed_since.is_none());
        assert_eq!(m.state().drowsy_streak, streak);

        let restart = t0 + Duration::from_millis(2600);
        m.on_verdict(&closed(), 2, restart);
        assert_eq!(m.state().eyes_closed_since, Some(restart));

        m.on_verdict(&closed(), 3, restart + Duration::from_millis(1900));
        assert!(!m.state().alert_dialog_visible);

        m.on_verdict(&closed(), 4, restart + Duration::from_millis(2000));
        assert!(m.state().alert_dialog_visible);
    }

    #[test]
    fn test_tick_releases_cooldown() {
        let mut m = machine();
        let t0 = Instant::now();
        m.on_verdict(&closed(), 0, t0);
        m.on_verdict(&closed(), 1, t0 + Duration::from_secs(2));
        assert!(matches!(m.alert_state(), AlertState::Cooldown { .. }));

        assert!(m.tick(t0 + Duration::from_secs(5)).is_empty());
        assert_eq!(
            m.tick(t0 + Duration::from_secs(8)),
            vec![StateEvent::CooldownReleased]
        );
        assert_eq!(m.alert_state(), AlertState::Idle);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            StatusMessage::EyesClosed { seconds: 3 }.to_string(),
            "Eyes closed for 3 s, wake up!"
        );
        assert_eq!(StatusMessage::Awake.to_string(), "Driver is awake");
    }
}
