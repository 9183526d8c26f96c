use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    /// Terminal: no further retries.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSignal {
    ConnectRequested,
    FrameReceived,
    SocketClosed,
    RetryTimerFired,
    ForegroundRestored,
    DisposeRequested,
}

impl ConnectionState {
    /// Next state for `signal`. Signals that mean nothing in the current state
    /// leave it unchanged.
    pub fn on_signal(self, signal: ConnectionSignal) -> ConnectionState {
        use ConnectionSignal::*;
        use ConnectionState::*;

        match (self, signal) {
            (Closed, _) => Closed,
            (_, DisposeRequested) => Closed,
            (Idle, ConnectRequested) => Connecting,
            (Connecting | Reconnecting | Connected, FrameReceived) => Connected,
            (Connecting | Reconnecting | Connected, SocketClosed) => Disconnected,
            (Disconnected, RetryTimerFired | ForegroundRestored) => Reconnecting,
            (state, _) => state,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Full jitter: each delay is drawn uniformly from `[0, computed]`.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Exponential backoff: `initial * 2^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Upper bound for the current attempt, before jitter.
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        self.policy
            .initial
            .checked_mul(factor)
            .unwrap_or(self.policy.max)
            .min(self.policy.max)
    }

    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);
        if !self.policy.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = ceiling.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}
