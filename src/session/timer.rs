// src/session/timer.rs

//! Countdown for an active attempt.
//!
//! Remaining time is derived from a deadline on the monotonic clock, so a
//! late or skipped tick never drifts the display.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

const TICK: Duration = Duration::from_secs(1);

/// Seconds left of `budget_secs` after `time_spent`.
pub fn remaining_secs(budget_secs: u32, time_spent: u32) -> u32 {
    budget_secs.saturating_sub(time_spent)
}

/// What one countdown step observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Remaining(u32),
    Expired,
}

/// How `Countdown::run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEnd {
    Expired,
    Cancelled,
}

pub struct Countdown {
    deadline: Instant,
    ticker: Interval,
}

impl Countdown {
    /// Starts counting down `remaining_secs` from now.
    pub fn new(remaining_secs: u32) -> Self {
        let now = Instant::now();
        let mut ticker = interval_at(now + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            deadline: now + Duration::from_secs(u64::from(remaining_secs)),
            ticker,
        }
    }

    /// Whole seconds left, rounded up.
    pub fn remaining(&self) -> u32 {
        let left = self.deadline.saturating_duration_since(Instant::now());
        left.as_millis().div_ceil(1000) as u32
    }

    /// Waits for the next one-second tick. Returns immediately once expired.
    pub async fn tick(&mut self) -> Tick {
        if self.remaining() == 0 {
            return Tick::Expired;
        }
        self.ticker.tick().await;
        match self.remaining() {
            0 => Tick::Expired,
            left => Tick::Remaining(left),
        }
    }

    /// Runs to completion, calling `on_tick` with the seconds left after each
    /// tick and `on_expire` once at zero.
    ///
    /// Setting `cancel` to `true` (or dropping its sender) stops the loop;
    /// `on_expire` is never called after cancellation was observed.
    pub async fn run<T, E>(
        mut self,
        mut cancel: watch::Receiver<bool>,
        mut on_tick: T,
        on_expire: E,
    ) -> CountdownEnd
    where
        T: FnMut(u32),
        E: FnOnce(),
    {
        loop {
            if *cancel.borrow() {
                return CountdownEnd::Cancelled;
            }

            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return CountdownEnd::Cancelled;
                    }
                }
                tick = self.tick() => match tick {
                    Tick::Remaining(left) => on_tick(left),
                    Tick::Expired => {
                        if *cancel.borrow() {
                            return CountdownEnd::Cancelled;
                        }
                        on_tick(0);
                        on_expire();
                        return CountdownEnd::Expired;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_remaining_secs() {
        assert_eq!(remaining_secs(1800, 100), 1700);
        assert_eq!(remaining_secs(60, 90), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_down_to_expiry() {
        let (_tx, rx) = watch::channel(false);
        let mut seen = Vec::new();
        let fired = AtomicBool::new(false);

        let end = Countdown::new(3)
            .run(rx, |left| seen.push(left), || fired.store(true, Ordering::SeqCst))
            .await;

        assert_eq!(end, CountdownEnd::Expired);
        assert_eq!(seen, vec![2, 1, 0]);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_expires_immediately() {
        let mut countdown = Countdown::new(0);
        assert_eq!(countdown.tick().await, Tick::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_expiry() {
        let (tx, rx) = watch::channel(false);
        let fired = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU32::new(0));

        let task = {
            let fired = fired.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                Countdown::new(5)
                    .run(
                        rx,
                        move |_| {
                            ticks.fetch_add(1, Ordering::SeqCst);
                        },
                        move || fired.store(true, Ordering::SeqCst),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        tx.send(true).unwrap();

        assert_eq!(task.await.unwrap(), CountdownEnd::Cancelled);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_sender_cancels() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let end = Countdown::new(5).run(rx, |_| {}, || panic!("must not expire")).await;
        assert_eq!(end, CountdownEnd::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_poll_does_not_drift() {
        let mut countdown = Countdown::new(10);
        tokio::time::sleep(Duration::from_millis(4200)).await;
        // The overdue tick fires at once and reports from the deadline, not a tick count.
        assert_eq!(countdown.tick().await, Tick::Remaining(6));
        assert_eq!(countdown.tick().await, Tick::Remaining(5));
    }
}
