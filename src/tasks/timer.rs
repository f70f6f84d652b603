//! Cancellable one-shot and periodic timers
//!
//! Both variants own a [`CancellationToken`]. Cancelling (explicitly or by
//! dropping the timer) stops a pending sleep immediately. Work that already
//! fired receives the token so it can re-check it after any await of its own.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs a task once after a delay unless cancelled first
#[derive(Debug)]
pub struct OneShotTimer {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl OneShotTimer {
    /// Arm a timer. `work` receives the timer's token.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(delay: Duration, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    work(child).await;
                }
            }
        });

        Self { token, task }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the sleep elapsed and the work ran to completion, or the
    /// timer was cancelled before firing
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Runs a task on every period until cancelled
#[derive(Debug)]
pub struct PeriodicTimer {
    token: CancellationToken,
    period: Duration,
}

impl PeriodicTimer {
    /// Start ticking. The first tick fires one full `period` after start.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip immediate first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
        });

        Self { token, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let timer = OneShotTimer::schedule(Duration::from_millis(500), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_cancel_prevents_work() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let timer = OneShotTimer::schedule(Duration::from_millis(100), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_drop_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        drop(OneShotTimer::schedule(Duration::from_millis(100), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let timer = PeriodicTimer::start(Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        timer.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
