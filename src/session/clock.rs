use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Shortest period a timer task will run at
pub(crate) const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Owned, cancelable budget clock for one session
///
/// Calls `on_tick` once per period, first after one full period has elapsed.
pub struct BudgetClock {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BudgetClock {
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if period.is_zero() {
            warn!("Zero budget clock period, using {:?}", MIN_PERIOD);
        }
        let period = period.max(MIN_PERIOD);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            // Late ticks are delivered, not merged: every second is billed.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if token.is_cancelled() || !on_tick() {
                            break;
                        }
                    }
                }
            }

            debug!("Budget clock stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the timer task (idempotent)
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Budget clock task panicked: {}", e);
            }
        }
    }
}

impl Drop for BudgetClock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut clock = BudgetClock::spawn(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        clock.stop().await;
        assert!(!clock.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_stop_clock() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let clock = BudgetClock::spawn(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst) < 1
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut clock = BudgetClock::spawn(Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(clock.is_running());
        assert!(ticks.load(Ordering::SeqCst) >= 1);
        clock.stop().await;
    }
}
