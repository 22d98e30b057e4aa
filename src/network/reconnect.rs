//! Single-shot reconnect timer

use std::time::Duration;
use tokio::time::Instant;

/// At most one pending reconnect at a time. Fixed delay, no backoff.
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer. Returns false if a reconnect is already pending.
    pub fn schedule(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + self.delay);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the pending reconnect fires
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolve when the pending reconnect is due. Never resolves while idle.
    ///
    /// Cancel safe: dropping the future leaves the deadline armed.
    pub async fn wait(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let mut timer = ReconnectTimer::new(Duration::from_secs(15));
        assert!(timer.schedule());
        assert!(timer.is_pending());

        let start = Instant::now();
        timer.wait().await;
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_schedule_is_ignored() {
        let mut timer = ReconnectTimer::new(Duration::from_secs(15));
        assert!(timer.schedule());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!timer.schedule());
        assert_eq!(timer.remaining(), Some(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_never_fires() {
        let mut timer = ReconnectTimer::new(Duration::from_millis(10));
        timer.schedule();
        timer.cancel();

        let fired = tokio::time::timeout(Duration::from_secs(60), timer.wait()).await;
        assert!(fired.is_err());
    }
}
