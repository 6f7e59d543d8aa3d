use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A recurring timer running on its own task.
///
/// The tick callback decides whether the timer keeps going. Dropping the
/// scheduler cancels the task; [`Scheduler::detach`] lets a callback that is
/// ending the timer itself release the handle without cancelling its own
/// task mid-tick.
pub(crate) struct Scheduler {
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl Scheduler {
    /// Arm the timer. The first tick fires one `period` from now.
    pub(crate) fn arm<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            // a slow tick pushes the next one back instead of bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if on_tick().await.is_break() {
                    break;
                }
            }
        });
        Self {
            handle: Some(handle),
            period,
        }
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
