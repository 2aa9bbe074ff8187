//! Queued delivery — appended tasks drained by a single consumer

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::dispatch::{DispatchFn, DispatchTask, Dispatcher, ListenerFilter, Snapshot, TaskFailure};
use crate::error::Result;
use crate::types::Event;

const MAX_DEFAULT_BUDGET: Duration = Duration::from_millis(50);

/// Appends one task per filtered listener to an internal queue; `dispatch`
/// never blocks.
///
/// Draining is the job of a single consumer, in one of two modes:
///
/// - **Continuous**: a [`QueueConsumer`] loop takes tasks strictly in
///   enqueue order, one at a time, until cancelled via [`shutdown`] or until
///   every producer is gone. Spawn it on a runtime with
///   [`spawn_consumer`](Self::spawn_consumer), or run it on an execution
///   context of your own with [`with_consumer`](Self::with_consumer).
/// - **Periodic**: a [`QueueDrain`] empties the queue in order on every
///   trigger, stopping early once a wall-clock budget has elapsed; leftovers
///   wait for the next trigger. Drive it from a runtime timer with
///   [`spawn_periodic`](Self::spawn_periodic), or call
///   [`QueueDrain::run_once`] from any periodic facility you own via
///   [`with_drain`](Self::with_drain).
///
/// Concurrent `fire` calls may append concurrently; per-producer enqueue
/// order is preserved. Listener invocation lags `fire` by up to one period
/// in periodic mode.
///
/// [`shutdown`]: Self::shutdown
pub struct QueuedDispatcher {
    queue: mpsc::UnboundedSender<DispatchTask>,
    cancel: CancellationToken,
}

impl QueuedDispatcher {
    /// Continuous mode, consumer loop returned to the caller.
    ///
    /// The returned [`QueueConsumer`] must be run for any delivery to
    /// happen; place it on whatever execution context should own it.
    pub fn with_consumer() -> (Self, QueueConsumer) {
        let (queue, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let consumer = QueueConsumer {
            queue: rx,
            cancel: cancel.clone(),
        };
        (Self { queue, cancel }, consumer)
    }

    /// Continuous mode on a dedicated background task of the given runtime
    pub fn spawn_consumer(handle: &Handle) -> Self {
        let (dispatcher, consumer) = Self::with_consumer();
        handle.spawn(consumer.run());
        dispatcher
    }

    /// Periodic mode, drain handle returned to the caller.
    ///
    /// The caller arranges for [`QueueDrain::run_once`] to be invoked
    /// repeatedly; each invocation drains for at most `budget`.
    pub fn with_drain(budget: Duration) -> (Self, QueueDrain) {
        let (queue, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let drain = QueueDrain { queue: rx, budget };
        (Self { queue, cancel }, drain)
    }

    /// Periodic mode on the given runtime's timer, with the default budget
    /// of `min(period / 2, 50ms)`
    pub fn spawn_periodic(handle: &Handle, period: Duration) -> Self {
        Self::spawn_periodic_with_budget(handle, period, default_budget(period))
    }

    /// Periodic mode on the given runtime's timer with an explicit budget
    pub fn spawn_periodic_with_budget(
        handle: &Handle,
        period: Duration,
        budget: Duration,
    ) -> Self {
        let (dispatcher, mut drain) = Self::with_drain(budget);
        let cancel = dispatcher.cancel.clone();
        handle.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => drain.run_once(),
                }
            }
            debug!("Periodic drain cancelled");
        });
        dispatcher
    }

    /// Cooperatively cancel the consumer or periodic timer loop.
    ///
    /// An in-flight listener call is never interrupted; cancellation only
    /// stops future dequeues. Tasks still queued at that point are dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Dispatcher for QueuedDispatcher {
    async fn dispatch(
        &self,
        listeners: Snapshot,
        filter: ListenerFilter,
        event: Arc<dyn Event>,
        call: DispatchFn,
    ) -> Result<()> {
        for entry in listeners.iter() {
            if !filter(entry.as_ref()) {
                continue;
            }
            let task = DispatchTask::new(entry.clone(), event.clone(), call.clone());
            if self.queue.send(task).is_err() {
                warn!("Queue consumer is gone; dropping dispatch task");
            }
        }
        Ok(())
    }
}

fn default_budget(period: Duration) -> Duration {
    (period / 2).min(MAX_DEFAULT_BUDGET)
}

/// Runs one queued task, keeping the consumer alive through failures.
fn run_task(task: DispatchTask) {
    match task.run_caught() {
        Ok(()) => {}
        Err(TaskFailure::Error(err)) => {
            warn!(error = %err, "Listener failed during queued dispatch");
        }
        Err(TaskFailure::Panic(message)) => {
            warn!(panic = %message, "Listener panicked during queued dispatch");
        }
    }
}

/// Continuous single-consumer drain loop.
pub struct QueueConsumer {
    queue: mpsc::UnboundedReceiver<DispatchTask>,
    cancel: CancellationToken,
}

impl QueueConsumer {
    /// Consume tasks in enqueue order until cancelled or all producers are
    /// dropped.
    ///
    /// Cancellation is checked on every iteration; a task failure or panic
    /// is logged and never terminates the loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(task) => {
                        trace!("Running queued task");
                        run_task(task);
                    }
                    None => break,
                },
            }
        }
        debug!("Queue consumer stopped");
    }
}

/// Budgeted periodic drain of the task queue.
pub struct QueueDrain {
    queue: mpsc::UnboundedReceiver<DispatchTask>,
    budget: Duration,
}

impl QueueDrain {
    /// Drain queued tasks in order until the queue is empty or the budget
    /// has elapsed, whichever comes first.
    ///
    /// The budget is checked before each dequeue, so a long-running task may
    /// overrun it; anything still queued stays for the next call.
    pub fn run_once(&mut self) {
        let started = Instant::now();
        while started.elapsed() < self.budget {
            match self.queue.try_recv() {
                Ok(task) => run_task(task),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::types::Listener;

    struct Tick;

    impl Event for Tick {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Recorder {
        position: usize,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl Listener for Recorder {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Listener for Counting {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn recorder_snapshot(log: &Arc<Mutex<Vec<usize>>>, count: usize) -> Snapshot {
        Arc::new(
            (0..count)
                .map(|position| {
                    Arc::new(Recorder {
                        position,
                        log: log.clone(),
                    }) as Arc<dyn Listener>
                })
                .collect(),
        )
    }

    fn recorder_call() -> DispatchFn {
        Arc::new(|listener, _| {
            let recorder = listener.downcast_ref::<Recorder>().unwrap();
            recorder.log.lock().unwrap().push(recorder.position);
            Ok(())
        })
    }

    fn counting_snapshot(calls: &Arc<AtomicUsize>, count: usize, delay: Duration) -> Snapshot {
        Arc::new(
            (0..count)
                .map(|_| {
                    Arc::new(Counting {
                        calls: calls.clone(),
                        delay,
                    }) as Arc<dyn Listener>
                })
                .collect(),
        )
    }

    fn counting_call() -> DispatchFn {
        Arc::new(|listener, _| {
            let counting = listener.downcast_ref::<Counting>().unwrap();
            if !counting.delay.is_zero() {
                std::thread::sleep(counting.delay);
            }
            counting.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    async fn wait_for(calls: &Arc<AtomicUsize>, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) < expected {
            assert!(Instant::now() < deadline, "queued tasks never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn default_budget_is_half_the_period_capped_at_50ms() {
        assert_eq!(default_budget(Duration::from_millis(20)), Duration::from_millis(10));
        assert_eq!(default_budget(Duration::from_millis(500)), Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn continuous_consumer_delivers_in_enqueue_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = QueuedDispatcher::spawn_consumer(&Handle::current());

        dispatcher
            .dispatch(
                recorder_snapshot(&log, 5),
                Box::new(|_| true),
                Arc::new(Tick),
                recorder_call(),
            )
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while log.lock().unwrap().len() < 5 {
            assert!(Instant::now() < deadline, "queued tasks never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_failing_task_does_not_kill_the_consumer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = QueuedDispatcher::spawn_consumer(&Handle::current());
        let poisoned: DispatchFn = {
            let calls = calls.clone();
            Arc::new(move |_, _| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first task explodes");
                }
                Ok(())
            })
        };

        dispatcher
            .dispatch(
                counting_snapshot(&Arc::new(AtomicUsize::new(0)), 3, Duration::ZERO),
                Box::new(|_| true),
                Arc::new(Tick),
                poisoned,
            )
            .await
            .unwrap();

        wait_for(&calls, 3).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_stops_future_dequeues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = QueuedDispatcher::spawn_consumer(&Handle::current());

        dispatcher.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        dispatcher
            .dispatch(
                counting_snapshot(&calls, 3, Duration::ZERO),
                Box::new(|_| true),
                Arc::new(Tick),
                counting_call(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn budgeted_drain_leaves_the_remainder_for_the_next_period() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (dispatcher, mut drain) = QueuedDispatcher::with_drain(Duration::from_millis(10));

        dispatcher
            .dispatch(
                counting_snapshot(&calls, 100, Duration::from_millis(2)),
                Box::new(|_| true),
                Arc::new(Tick),
                counting_call(),
            )
            .await
            .unwrap();

        drain.run_once();
        let after_first = calls.load(Ordering::SeqCst);
        assert!(after_first > 0, "first period delivered nothing");
        assert!(after_first < 100, "budget did not limit the first period");

        // subsequent periods pick up exactly where the budget stopped
        let deadline = Instant::now() + Duration::from_secs(10);
        while calls.load(Ordering::SeqCst) < 100 {
            assert!(Instant::now() < deadline, "drain never finished");
            drain.run_once();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn periodic_timer_drives_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            QueuedDispatcher::spawn_periodic(&Handle::current(), Duration::from_millis(20));

        dispatcher
            .dispatch(
                counting_snapshot(&calls, 10, Duration::ZERO),
                Box::new(|_| true),
                Arc::new(Tick),
                counting_call(),
            )
            .await
            .unwrap();

        wait_for(&calls, 10).await;
        dispatcher.shutdown();
    }
}
