//! Repeating task executor shared by every monitored entity.
//!
//! A [`Looper`] owns one tokio task that runs [`LoopTask::run_once`] over and
//! over. Each iteration returns how long to sleep before the next one; the
//! sleep ends early when [`Looper::request_wake`] is called. Wake requests are
//! stored in a single [`Notify`] permit, so any number of them collapse into
//! one early wake. Iterations never overlap and are never interrupted.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;

/// Delay before retrying after an iteration failed or panicked.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// One iteration of a repeating job.
#[async_trait]
pub trait LoopTask: Send + 'static {
    /// Runs a single iteration and returns the delay until the next one.
    async fn run_once(&mut self) -> Result<Duration>;
}

/// Handle to a running loop.
#[derive(Debug)]
pub struct Looper {
    name: String,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Looper {
    /// Spawn `task` on the current tokio runtime and start iterating.
    pub fn start<T: LoopTask>(name: impl Into<String>, task: T) -> Self {
        let name = name.into();
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            name.clone(),
            task,
            Arc::clone(&wake),
            shutdown.clone(),
        ));

        Self {
            name,
            wake,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Cut the current wait short. Idempotent; pending requests coalesce.
    pub fn request_wake(&self) {
        self.wake.notify_one();
    }

    /// Ask the loop to exit and wait for the in-flight iteration to finish.
    pub async fn stop(&self) {
        info!(looper = %self.name, "Initiating stop");
        self.shutdown.cancel();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(looper = %self.name, "Loop task ended abnormally: {}", e);
        }
    }

    /// Whether the loop task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn run_loop<T: LoopTask>(
    name: String,
    mut task: T,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
) {
    debug!(looper = %name, "Loop started");

    while !shutdown.is_cancelled() {
        // A wake that arrived before this iteration is already served by it.
        let _ = wake.notified().now_or_never();

        let wait = match AssertUnwindSafe(task.run_once()).catch_unwind().await {
            Ok(Ok(wait)) => wait,
            Ok(Err(e)) => {
                error!(looper = %name, "Broken loop: {}", e);
                FAILURE_BACKOFF
            }
            Err(panic) => {
                error!(
                    looper = %name,
                    "Loop iteration panicked: {}",
                    panic_message(panic.as_ref())
                );
                FAILURE_BACKOFF
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = wake.notified() => {
                debug!(looper = %name, "Woken early");
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!(looper = %name, "Stopped");
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::WatchError;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct Counting {
        iterations: u32,
        wait: Duration,
        fail_first: bool,
        panic_first: bool,
        tx: mpsc::UnboundedSender<u32>,
    }

    impl Counting {
        fn new(wait: Duration) -> (Self, mpsc::UnboundedReceiver<u32>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    iterations: 0,
                    wait,
                    fail_first: false,
                    panic_first: false,
                    tx,
                },
                rx,
            )
        }
    }

    #[async_trait]
    impl LoopTask for Counting {
        async fn run_once(&mut self) -> Result<Duration> {
            self.iterations += 1;
            let _ = self.tx.send(self.iterations);
            if self.iterations == 1 && self.fail_first {
                return Err(WatchError::EmptyRemoteState);
            }
            if self.iterations == 1 && self.panic_first {
                panic!("first iteration panics");
            }
            Ok(self.wait)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_requested_delay() {
        let (task, mut rx) = Counting::new(Duration::from_secs(60));
        let looper = Looper::start("sleeps", task);

        assert_eq!(rx.recv().await, Some(1));
        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(2));
        assert!(started.elapsed() >= Duration::from_secs(60));

        looper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wake_requests_coalesce_into_one_early_iteration() {
        let (task, mut rx) = Counting::new(Duration::from_secs(60));
        let looper = Looper::start("coalesce", task);

        assert_eq!(rx.recv().await, Some(1));
        let started = Instant::now();
        looper.request_wake();
        looper.request_wake();
        looper.request_wake();

        assert_eq!(rx.recv().await, Some(2));
        assert!(started.elapsed() < Duration::from_secs(60));

        let second = Instant::now();
        assert_eq!(rx.recv().await, Some(3));
        assert!(second.elapsed() >= Duration::from_secs(60));

        looper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_iteration_backs_off_and_retries() {
        let (mut task, mut rx) = Counting::new(Duration::from_secs(600));
        task.fail_first = true;
        let looper = Looper::start("fails", task);

        assert_eq!(rx.recv().await, Some(1));
        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(2));
        let elapsed = started.elapsed();
        assert!(elapsed >= FAILURE_BACKOFF);
        assert!(elapsed < Duration::from_secs(600));

        looper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_iteration_does_not_end_the_loop() {
        let (mut task, mut rx) = Counting::new(Duration::from_secs(600));
        task.panic_first = true;
        let looper = Looper::start("panics", task);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert!(looper.is_running());

        looper.stop().await;
    }

    /// Holds its first iteration open until released.
    struct Gated {
        started: mpsc::UnboundedSender<()>,
        release: Arc<Notify>,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LoopTask for Gated {
        async fn run_once(&mut self) -> Result<Duration> {
            let _ = self.started.send(());
            self.release.notified().await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(Duration::from_secs(3600))
        }
    }

    #[tokio::test]
    async fn stop_lets_the_current_iteration_finish() {
        let (started_tx, mut started) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicBool::new(false));
        let looper = Looper::start(
            "in-flight",
            Gated {
                started: started_tx,
                release: Arc::clone(&release),
                finished: Arc::clone(&finished),
            },
        );

        assert_eq!(started.recv().await, Some(()));
        let stopping = tokio::spawn(async move {
            looper.stop().await;
            looper
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!stopping.is_finished());
        assert!(!finished.load(Ordering::SeqCst));

        release.notify_one();
        let looper = stopping.await.expect("stop task");

        assert!(finished.load(Ordering::SeqCst));
        assert!(!looper.is_running());
        assert_eq!(started.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_joins_the_loop() {
        let (task, mut rx) = Counting::new(Duration::from_secs(3600));
        let looper = Looper::start("stops", task);

        assert_eq!(rx.recv().await, Some(1));
        looper.stop().await;

        assert!(!looper.is_running());
        assert_eq!(rx.recv().await, None);
    }
}
