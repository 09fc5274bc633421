//! Timer thread that stands in for a hardware audio callback
//!
//! Calls a closure once per buffer period on a dedicated thread until
//! stopped. Used by [`NullAudioSink`](super::NullAudioSink) and by the
//! silent-sink suspender while the real device is paused.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared state between the owner and the worker thread
struct WorkerShared {
    stop_requested: Mutex<bool>,
    condvar: Condvar,
}

struct RunningWorker {
    shared: Arc<WorkerShared>,
    handle: JoinHandle<()>,
}

/// Periodic callback thread
pub struct FakeRenderWorker {
    name: String,
    period: Duration,
    running: Mutex<Option<RunningWorker>>,
    worker_thread: Mutex<Option<ThreadId>>,
}

impl FakeRenderWorker {
    /// Create a stopped worker.
    ///
    /// # Arguments
    /// - `name`: Thread name (shows up in debuggers and logs)
    /// - `period`: Time between callbacks, normally one buffer duration
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            running: Mutex::new(None),
            worker_thread: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start calling `tick` every period.
    ///
    /// `tick` receives the scheduled time of the callback. The first call
    /// happens immediately. If the worker is already running this does
    /// nothing and returns `false`.
    pub fn start<F>(&self, mut tick: F) -> bool
    where
        F: FnMut(Instant) + Send + 'static,
    {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return false;
        }

        let shared = Arc::new(WorkerShared {
            stop_requested: Mutex::new(false),
            condvar: Condvar::new(),
        });

        let shared_clone = Arc::clone(&shared);
        let period = self.period;
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || Self::worker_loop(&shared_clone, period, &mut tick));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to spawn {} thread: {}", self.name, e);
                return false;
            }
        };

        *self.worker_thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.thread().id());
        *running = Some(RunningWorker { shared, handle });

        debug!("{} started ({:?} period)", self.name, self.period);
        true
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Called from the worker's own thread (from inside `tick`), the stop is
    /// requested but not waited for; the loop exits once `tick` returns.
    pub fn stop(&self) {
        if let Some(pending) = self.request_stop() {
            pending.wait();
        }
    }

    /// Signal the worker to stop without waiting for it.
    ///
    /// Once this returns, `start` launches a fresh thread. The returned handle
    /// joins the old one; callers holding locks the tick might need should
    /// drop them before calling [`PendingStop::wait`].
    pub fn request_stop(&self) -> Option<PendingStop> {
        let worker = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        {
            let mut stop = worker
                .shared
                .stop_requested
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *stop = true;
        }
        worker.shared.condvar.notify_all();

        let mut worker_thread = self.worker_thread.lock().unwrap_or_else(PoisonError::into_inner);
        if *worker_thread == Some(worker.handle.thread().id()) {
            *worker_thread = None;
        }

        Some(PendingStop {
            name: self.name.clone(),
            handle: worker.handle,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// True when called from inside `tick`
    pub fn is_worker_thread(&self) -> bool {
        let worker_thread = *self.worker_thread.lock().unwrap_or_else(PoisonError::into_inner);
        worker_thread == Some(thread::current().id())
    }

    fn worker_loop<F>(shared: &WorkerShared, period: Duration, tick: &mut F)
    where
        F: FnMut(Instant),
    {
        let mut next = Instant::now();

        loop {
            if *shared.stop_requested.lock().unwrap_or_else(PoisonError::into_inner) {
                break;
            }

            tick(next);

            next += period;
            let now = Instant::now();
            if next < now {
                // Fell behind; skip the missed periods instead of bursting
                next = now;
            }

            let mut stop = shared.stop_requested.lock().unwrap_or_else(PoisonError::into_inner);
            while !*stop {
                let now = Instant::now();
                if now >= next {
                    break;
                }
                let (guard, _) = shared
                    .condvar
                    .wait_timeout(stop, next - now)
                    .unwrap_or_else(PoisonError::into_inner);
                stop = guard;
            }
            if *stop {
                break;
            }
        }
    }
}

/// A stop that has been signalled but not yet joined
#[must_use = "dropping a PendingStop detaches the worker thread"]
pub struct PendingStop {
    name: String,
    handle: JoinHandle<()>,
}

impl PendingStop {
    /// Wait for the worker thread to exit
    pub fn wait(self) {
        if self.handle.thread().id() == thread::current().id() {
            // Joining ourselves would deadlock; the loop exits after this tick
            debug!("{} stop requested from its own thread", self.name);
        } else if self.handle.join().is_err() {
            warn!("{} thread panicked", self.name);
        } else {
            debug!("{} stopped", self.name);
        }
    }
}

impl Drop for FakeRenderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FakeRenderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRenderWorker")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}
