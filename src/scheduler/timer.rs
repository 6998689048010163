use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::runtime::SchedulerEvent;

/// Names one armed timer. A firing only counts if its token is still the
/// pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub(crate) u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// One-shot delayed trigger.
pub trait Timer {
    fn arm(&mut self, token: TimerToken, delay: Duration);
    fn cancel(&mut self, token: TimerToken);
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timer backed by tokio tasks. Each arm spawns a sleeper that posts
/// [`SchedulerEvent::TimerFired`] back into the scheduler loop.
pub struct TokioTimer {
    events: mpsc::Sender<SchedulerEvent>,
    pending: Option<(TimerToken, JoinHandle<()>)>,
}

impl TokioTimer {
    pub fn new(events: mpsc::Sender<SchedulerEvent>) -> Self {
        Self {
            events,
            pending: None,
        }
    }
}

impl Timer for TokioTimer {
    fn arm(&mut self, token: TimerToken, delay: Duration) {
        if let Some((previous, handle)) = self.pending.take() {
            log::debug!("Replacing {} with {}", previous, token);
            handle.abort();
        }

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(SchedulerEvent::TimerFired(token)).await.is_err() {
                log::debug!("Scheduler loop gone, dropping {}", token);
            }
        });
        self.pending = Some((token, handle));
    }

    fn cancel(&mut self, token: TimerToken) {
        match self.pending.take() {
            Some((pending, handle)) if pending == token => handle.abort(),
            other => self.pending = other,
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod tokio_timer_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn fires_after_delay() {
            let (tx, mut rx) = mpsc::channel(4);
            let mut timer = TokioTimer::new(tx);

            timer.arm(TimerToken(1), Duration::from_secs(30));

            let start = tokio::time::Instant::now();
            match rx.recv().await {
                Some(SchedulerEvent::TimerFired(token)) => assert_eq!(token, TimerToken(1)),
                other => panic!("Expected TimerFired, got {:?}", other),
            }
            assert!(start.elapsed() >= Duration::from_secs(30));
        }

        #[tokio::test(start_paused = true)]
        async fn cancelled_timer_never_fires() {
            let (tx, mut rx) = mpsc::channel(4);
            let mut timer = TokioTimer::new(tx);

            timer.arm(TimerToken(1), Duration::from_secs(5));
            timer.cancel(TimerToken(1));

            let waited = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
            assert!(waited.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn cancel_with_stale_token_keeps_pending() {
            let (tx, mut rx) = mpsc::channel(4);
            let mut timer = TokioTimer::new(tx);

            timer.arm(TimerToken(2), Duration::from_secs(5));
            timer.cancel(TimerToken(1));

            match rx.recv().await {
                Some(SchedulerEvent::TimerFired(token)) => assert_eq!(token, TimerToken(2)),
                other => panic!("Expected TimerFired, got {:?}", other),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn rearm_replaces_previous() {
            let (tx, mut rx) = mpsc::channel(4);
            let mut timer = TokioTimer::new(tx);

            timer.arm(TimerToken(1), Duration::from_secs(5));
            timer.arm(TimerToken(2), Duration::from_secs(10));

            match rx.recv().await {
                Some(SchedulerEvent::TimerFired(token)) => assert_eq!(token, TimerToken(2)),
                other => panic!("Expected TimerFired, got {:?}", other),
            }
            let waited = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
            assert!(waited.is_err());
        }
    }

    #[test]
    fn token_display() {
        assert_eq!(TimerToken(7).to_string(), "timer#7");
    }
}
