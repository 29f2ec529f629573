// src/timer.rs

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Not armed, or already expired.
    Idle,
    Running { remaining: u64 },
    /// Reached zero on this tick. Reported once.
    Expired,
}

/// Single exam countdown. No pause; once expired it never re-arms.
#[derive(Debug, Clone)]
pub struct ExamTimer {
    remaining: u64,
    armed: bool,
    expired: bool,
}

impl ExamTimer {
    pub fn new(remaining: u64) -> Self {
        Self {
            remaining,
            armed: false,
            expired: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn arm(&mut self) {
        if !self.expired {
            self.armed = true;
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// One second elapsed.
    pub fn tick(&mut self) -> TimerOutcome {
        if !self.armed {
            return TimerOutcome::Idle;
        }

        if self.remaining <= 1 {
            self.remaining = 0;
            self.armed = false;
            self.expired = true;
            tracing::info!("Exam time expired");
            return TimerOutcome::Expired;
        }

        self.remaining -= 1;
        TimerOutcome::Running {
            remaining: self.remaining,
        }
    }
}

/// Sends `make_tick()` into `events` once per `period` until the receiver is gone
/// or the returned handle is aborted.
pub fn spawn_ticker<E, F>(
    events: mpsc::UnboundedSender<E>,
    period: Duration,
    make_tick: F,
) -> JoinHandle<()>
where
    E: Send + 'static,
    F: Fn() -> E + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if events.send(make_tick()).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_then_expires_once() {
        let mut timer = ExamTimer::new(3);
        timer.arm();

        assert_eq!(timer.tick(), TimerOutcome::Running { remaining: 2 });
        assert_eq!(timer.tick(), TimerOutcome::Running { remaining: 1 });
        assert_eq!(timer.tick(), TimerOutcome::Expired);
        assert_eq!(timer.tick(), TimerOutcome::Idle);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn expired_timer_does_not_rearm() {
        let mut timer = ExamTimer::new(1);
        timer.arm();
        assert_eq!(timer.tick(), TimerOutcome::Expired);

        timer.arm();
        assert_eq!(timer.tick(), TimerOutcome::Idle);
    }

    #[test]
    fn zero_remaining_expires_on_first_tick() {
        let mut timer = ExamTimer::new(0);
        timer.arm();
        assert_eq!(timer.tick(), TimerOutcome::Expired);
    }

    #[test]
    fn unarmed_timer_does_not_move() {
        let mut timer = ExamTimer::new(10);
        assert_eq!(timer.tick(), TimerOutcome::Idle);
        assert_eq!(timer.remaining(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_ticker(tx, Duration::from_secs(1), || ());

        time::sleep(Duration::from_millis(3500)).await;
        handle.abort();

        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
