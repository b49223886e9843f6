//! Fixed-interval trigger for ingestion runs.
//!
//! The job runs once immediately, then every `interval` on a background
//! thread until stopped. Stopping wakes the thread right away; a run already in
//! progress is allowed to finish.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::AppError;

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.wake.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless stopped first. Returns true when stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wake
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

/// Cloneable handle that stops a running scheduler from another thread.
#[derive(Debug, Clone)]
pub struct Stopper(Arc<StopSignal>);

impl Stopper {
    pub fn stop(&self) {
        self.0.stop();
    }
}

pub struct IntervalScheduler {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl IntervalScheduler {
    pub fn spawn<F>(name: &str, interval: Duration, mut job: F) -> Result<Self, AppError>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(AppError::new(2, "Scheduler interval must be greater than zero"));
        }

        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                info!(scheduler = %thread_name, interval_secs = interval.as_secs(), "Scheduler started");
                let mut runs: u64 = 0;
                while !thread_signal.is_stopped() {
                    runs += 1;
                    debug!(scheduler = %thread_name, run = runs, "Scheduled run");
                    job();
                    if thread_signal.wait(interval) {
                        break;
                    }
                }
                info!(scheduler = %thread_name, runs, "Scheduler stopped");
            })
            .map_err(|e| AppError::new(4, format!("Failed to start scheduler thread: {e}")))?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    pub fn stopper(&self) -> Stopper {
        Stopper(Arc::clone(&self.signal))
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.signal.stop();
        self.join();
    }

    /// Block until the scheduler is stopped through a `Stopper`.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            // A panicking job already reported itself on stderr.
            let _ = handle.join();
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.signal.stop();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    fn wait_for(counter: &AtomicUsize, at_least: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) >= at_least {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn runs_immediately_then_stops_without_waiting_out_the_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let scheduler = IntervalScheduler::spawn("test", Duration::from_secs(3600), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(wait_for(&runs, 1));
        let started = Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeats_every_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let scheduler = IntervalScheduler::spawn("test", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(wait_for(&runs, 3));
        scheduler.stop();
    }

    #[test]
    fn stopper_releases_a_waiting_caller() {
        let scheduler = IntervalScheduler::spawn("test", Duration::from_secs(3600), || {}).unwrap();
        let stopper = scheduler.stopper();
        let remote = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stopper.stop();
        });
        scheduler.wait();
        remote.join().unwrap();
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = IntervalScheduler::spawn("test", Duration::ZERO, || {}).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
