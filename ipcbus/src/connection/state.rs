//! Connection lifecycle state machine (§4.7).

use std::sync::Mutex;

use tracing::info;

/// The externally observable lifecycle state of a [`super::Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Unhealthy,
    Failed,
    Reconnecting,
}

/// Events fired as the state machine transitions, for listener
/// notification (§4.7, §8 scenario 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Entered(ConnectionState),
}

/// Exponential backoff policy for the optional automatic-reconnection
/// hook (§4.7, §9): spec.md leaves the exact curve unspecified, so this
/// exposes base/max/multiplier rather than hardcoding constants.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    pub base: std::time::Duration,
    pub max: std::time::Duration,
    pub multiplier: f64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        ReconnectBackoff {
            base: std::time::Duration::from_millis(500),
            max: std::time::Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectBackoff {
    /// The delay before reconnection attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32);
        std::time::Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }
}

#[derive(Debug)]
pub struct StateMachine {
    current: Mutex<ConnectionState>,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine { current: Mutex::new(ConnectionState::Disconnected) }
    }

    pub fn current(&self) -> ConnectionState {
        *self.current.lock().expect("lock poisoned")
    }

    fn transition(&self, to: ConnectionState) -> Option<StateEvent> {
        let mut current = self.current.lock().expect("lock poisoned");
        if *current == to {
            return None;
        }
        info!(from = ?*current, to = ?to, "connection state transition");
        *current = to;
        Some(StateEvent::Entered(to))
    }

    pub fn begin_connecting(&self) -> Option<StateEvent> {
        self.transition(ConnectionState::Connecting)
    }

    pub fn begin_authenticating(&self) -> Option<StateEvent> {
        self.transition(ConnectionState::Authenticating)
    }

    /// The `active` event fires once SASL + Hello() both succeed (§4.7).
    pub fn on_active(&self) -> Option<StateEvent> {
        self.transition(ConnectionState::Connected)
    }

    /// A health probe failed while connected.
    pub fn on_probe_failure(&self) -> Option<StateEvent> {
        let current = self.current();
        if current == ConnectionState::Connected {
            self.transition(ConnectionState::Unhealthy)
        } else {
            None
        }
    }

    /// A health probe succeeded while unhealthy.
    pub fn on_probe_success(&self) -> Option<StateEvent> {
        let current = self.current();
        if current == ConnectionState::Unhealthy {
            self.transition(ConnectionState::Connected)
        } else {
            None
        }
    }

    /// Inactive or fatal failure (transport/protocol-fatal/auth error, or
    /// the consecutive-probe-failure bound being exceeded).
    pub fn on_fatal_failure(&self) -> Option<StateEvent> {
        self.transition(ConnectionState::Failed)
    }

    pub fn begin_reconnecting(&self) -> Option<StateEvent> {
        self.transition(ConnectionState::Reconnecting)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_backoff_grows_and_caps() {
        let backoff = ReconnectBackoff::default();
        let d0 = backoff.delay_for(0);
        let d1 = backoff.delay_for(1);
        let d2 = backoff.delay_for(2);
        assert_eq!(d0, std::time::Duration::from_millis(500));
        assert!(d1 > d0);
        assert!(d2 > d1);
        let d_far = backoff.delay_for(20);
        assert_eq!(d_far, backoff.max);
    }

    #[test]
    fn probe_failure_only_applies_when_connected() {
        let sm = StateMachine::new();
        assert!(sm.on_probe_failure().is_none());
        sm.begin_connecting();
        sm.begin_authenticating();
        sm.on_active();
        assert_eq!(sm.current(), ConnectionState::Connected);
        assert!(sm.on_probe_failure().is_some());
        assert_eq!(sm.current(), ConnectionState::Unhealthy);
    }

    #[test]
    fn probe_success_recovers_from_unhealthy() {
        let sm = StateMachine::new();
        sm.begin_connecting();
        sm.on_active();
        sm.on_probe_failure();
        assert!(sm.on_probe_success().is_some());
        assert_eq!(sm.current(), ConnectionState::Connected);
    }

    #[test]
    fn scenario_two_full_sequence() {
        let sm = StateMachine::new();
        sm.begin_connecting();
        sm.on_active();
        assert_eq!(sm.current(), ConnectionState::Connected);
        sm.on_probe_failure();
        assert_eq!(sm.current(), ConnectionState::Unhealthy);
        sm.on_fatal_failure();
        assert_eq!(sm.current(), ConnectionState::Failed);
    }
}
