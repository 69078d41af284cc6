//! Reconnection Policy
//!
//! Exponential backoff: attempt `n` (1-indexed) waits
//! `base_delay * 2^(n-1)`. With the defaults that is 1s, 2s, 4s, 8s, 16s,
//! after which automatic retries stop until a manual reconnect.

use std::time::Duration;

use super::timer::ScheduledTask;

/// Attempt cap and backoff base
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Automatic attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before attempt `attempt` (1-indexed)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Retry bookkeeping owned by the connection manager
///
/// `generation` changes whenever the pending timer is armed or dropped, so
/// a timer message that was already in flight can be recognised as stale.
#[derive(Debug)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
    current_delay: Option<Duration>,
    generation: u64,
    timer: Option<ScheduledTask>,
}

impl ReconnectState {
    /// Fresh state: zero attempts, nothing pending
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            current_delay: None,
            generation: 0,
            timer: None,
        }
    }

    /// The policy in force
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Attempts made since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay of the attempt currently waiting on its timer
    #[must_use]
    pub fn pending_delay(&self) -> Option<Duration> {
        self.timer.as_ref().and(self.current_delay)
    }

    /// Whether a retry timer is armed
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Count a new attempt if under the cap
    ///
    /// Returns the attempt number and its delay, or `None` once the cap
    /// has been reached.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.policy.delay_for_attempt(self.attempts);
        self.current_delay = Some(delay);
        Some((self.attempts, delay))
    }

    /// Hold the timer for the scheduled attempt; returns its generation
    ///
    /// Any previously armed timer is cancelled.
    pub fn arm(&mut self, make_timer: impl FnOnce(u64) -> ScheduledTask) -> u64 {
        self.generation += 1;
        self.timer = Some(make_timer(self.generation));
        self.generation
    }

    /// Consume the fire notification for `generation`
    ///
    /// Returns `false` if the notification is stale.
    pub fn fired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.timer.is_none() {
            return false;
        }
        self.timer = None;
        true
    }

    /// Cancel any pending timer, keeping the attempt count
    pub fn cancel_timer(&mut self) {
        if self.timer.take().is_some() {
            self.generation += 1;
            tracing::debug!("Cancelled pending reconnect");
        }
    }

    /// Cancel any pending timer and zero the counter
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.attempts = 0;
        self.current_delay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_backoff_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = ReconnectPolicy {
            max_attempts: 100,
            base_delay: Duration::from_secs(1),
        };
        // Must not panic on overflow
        let _ = policy.delay_for_attempt(64);
        let _ = policy.delay_for_attempt(u32::MAX);
    }

    #[test]
    fn test_counter_caps() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        for expected in 1..=5 {
            let (attempt, _) = state.next_attempt().unwrap();
            assert_eq!(attempt, expected);
        }
        assert_eq!(state.next_attempt(), None);
        assert_eq!(state.attempts(), 5);

        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(
            state.next_attempt(),
            Some((1, Duration::from_secs(1)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_rejected() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        let first = state.arm(|_| ScheduledTask::after(Duration::from_secs(1), || {}));
        let second = state.arm(|_| ScheduledTask::after(Duration::from_secs(1), || {}));

        assert!(!state.fired(first));
        assert!(state.fired(second));
        assert!(!state.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_invalidates_generation() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        let generation = state.arm(|_| ScheduledTask::after(Duration::from_secs(1), || {}));

        state.cancel_timer();
        assert!(!state.is_pending());
        assert!(!state.fired(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_delay_tracks_armed_timer() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        assert_eq!(state.pending_delay(), None);

        state.next_attempt();
        state.next_attempt();
        let generation = state.arm(|_| ScheduledTask::after(Duration::from_secs(2), || {}));
        assert_eq!(state.pending_delay(), Some(Duration::from_secs(2)));

        assert!(state.fired(generation));
        assert_eq!(state.pending_delay(), None);
        assert_eq!(state.attempts(), 2);
    }
}
