//! Suspends the output device during sustained silence
//!
//! Sits between the sink and the mixer as the sink's render callback. When
//! the mixer has produced nothing but silence for `silence_timeout`, the real
//! sink is paused and a [`FakeRenderWorker`] keeps calling the mixer on a
//! timer, so inputs keep advancing without holding the device. The first
//! audible buffer from the fake worker swaps back to the real sink.
//!
//! **Transitions** (pausing/playing the real sink, starting/stopping the fake
//! worker) block, so they run on a dedicated thread fed by a channel. The
//! render path only decides and posts.
//!
//! **Threading:** no suspender lock is held while calling into the mixer, and
//! the mixer may call [`SilentSinkSuspender::on_paused`] with its own lock
//! held.

use crate::audio::AudioBus;
use crate::sink::{AudioRendererSink, FakeRenderWorker, RenderCallback};
use chrono::TimeDelta;
use rendermix_common::{AudioParameters, Clock};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Pause the real sink, start the fake worker
    Suspend,
    /// Stop the fake worker, play the real sink
    Resume,
    /// Stop the fake worker, leave the real sink paused
    StopFake,
}

#[derive(Debug, Default)]
struct SuspenderState {
    first_silence_time: Option<Instant>,
    using_fake_sink: bool,
    transition_pending: bool,
}

/// Render-callback wrapper that swaps to a fake sink on silence
pub struct SilentSinkSuspender {
    callback: Weak<dyn RenderCallback>,
    silence_timeout: Duration,
    params: AudioParameters,
    sink: Arc<dyn AudioRendererSink>,
    clock: Arc<dyn Clock>,
    fake_worker: FakeRenderWorker,
    state: Mutex<SuspenderState>,
    transitions: Mutex<Option<Sender<Transition>>>,
    transition_thread: Mutex<Option<JoinHandle<()>>>,
    self_weak: Weak<SilentSinkSuspender>,
}

impl SilentSinkSuspender {
    /// Create a suspender and its transition thread.
    ///
    /// # Arguments
    /// - `callback`: The real producer (normally the mixer)
    /// - `silence_timeout`: Continuous silence required before suspending
    /// - `params`: Output format; sizes the fake worker's buffer and period
    /// - `sink`: Real sink to pause and resume
    /// - `clock`: Time source for silence measurement
    pub fn new(
        callback: Weak<dyn RenderCallback>,
        silence_timeout: Duration,
        params: &AudioParameters,
        sink: Arc<dyn AudioRendererSink>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();

        let suspender = Arc::new_cyclic(|weak: &Weak<SilentSinkSuspender>| SilentSinkSuspender {
            callback,
            silence_timeout,
            params: *params,
            sink,
            clock,
            fake_worker: FakeRenderWorker::new("silent-sink-fake", params.buffer_duration()),
            state: Mutex::new(SuspenderState::default()),
            transitions: Mutex::new(Some(tx)),
            transition_thread: Mutex::new(None),
            self_weak: weak.clone(),
        });

        let weak = Arc::downgrade(&suspender);
        match thread::Builder::new()
            .name("silent-sink-transitions".to_string())
            .spawn(move || Self::transition_loop(weak, rx))
        {
            Ok(handle) => {
                *suspender.lock_thread() = Some(handle);
            }
            Err(e) => {
                // Without the thread, posted transitions are dropped and the
                // real sink simply stays active
                warn!("Failed to spawn silent sink transition thread: {}", e);
            }
        }

        debug!("Silent sink suspender created (timeout {:?})", silence_timeout);
        suspender
    }

    pub fn silence_timeout(&self) -> Duration {
        self.silence_timeout
    }

    /// True while the fake worker stands in for the real sink
    pub fn is_using_fake_sink(&self) -> bool {
        self.lock_state().using_fake_sink
    }

    pub fn is_transition_pending(&self) -> bool {
        self.lock_state().transition_pending
    }

    /// The owner paused the real sink on purpose.
    ///
    /// Stops the fake worker (asynchronously) without resuming the real
    /// sink. May be called with the mixer lock held.
    pub fn on_paused(&self) {
        let mut state = self.lock_state();
        state.first_silence_time = None;
        if !state.using_fake_sink && !state.transition_pending {
            return;
        }
        state.transition_pending = true;
        drop(state);
        self.post(Transition::StopFake);
    }

    /// Stop the fake worker and the transition thread. Idempotent.
    pub fn shutdown(&self) {
        let sender = self
            .transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        self.fake_worker.stop();

        let handle = self.lock_thread().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Silent sink transition thread panicked");
            }
        }
        debug!("Silent sink suspender shut down");
    }

    fn lock_state(&self) -> MutexGuard<'_, SuspenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_thread(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.transition_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, transition: Transition) {
        let transitions = self.transitions.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = transitions
            .as_ref()
            .map(|tx| tx.send(transition).is_ok())
            .unwrap_or(false);
        drop(transitions);

        if !sent {
            self.lock_state().transition_pending = false;
        }
    }

    fn transition_loop(weak: Weak<SilentSinkSuspender>, rx: Receiver<Transition>) {
        while let Ok(transition) = rx.recv() {
            let Some(suspender) = weak.upgrade() else {
                break;
            };
            suspender.apply(transition);
        }
    }

    fn apply(&self, transition: Transition) {
        match transition {
            Transition::Suspend => {
                info!(
                    "Output silent for {:?}, suspending audio sink",
                    self.silence_timeout
                );
                self.sink.pause();
                self.lock_state().using_fake_sink = true;
                self.start_fake_worker();
            }
            Transition::Resume => {
                info!("Audible output, resuming audio sink");
                self.fake_worker.stop();
                self.sink.play();
                self.lock_state().using_fake_sink = false;
            }
            Transition::StopFake => {
                debug!("Sink paused by owner, stopping fake sink");
                self.fake_worker.stop();
                let mut state = self.lock_state();
                state.using_fake_sink = false;
                state.first_silence_time = None;
            }
        }
        self.lock_state().transition_pending = false;
    }

    fn start_fake_worker(&self) {
        let weak = self.self_weak.clone();
        let mut bus = AudioBus::for_params(&self.params);
        self.fake_worker.start(move |scheduled| {
            if let Some(suspender) = weak.upgrade() {
                suspender.render(TimeDelta::zero(), scheduled, 0, &mut bus);
            }
        });
    }
}

impl RenderCallback for SilentSinkSuspender {
    fn render(
        &self,
        delay: TimeDelta,
        delay_timestamp: Instant,
        prior_frames_skipped: u32,
        dest: &mut AudioBus,
    ) -> usize {
        let from_fake_sink = self.fake_worker.is_worker_thread();

        // The real sink may still call us between the switch and its pause
        if self.lock_state().using_fake_sink && !from_fake_sink {
            dest.zero();
            return dest.frames();
        }

        let Some(callback) = self.callback.upgrade() else {
            dest.zero();
            return dest.frames();
        };
        let frames = callback.render(delay, delay_timestamp, prior_frames_skipped, dest);
        drop(callback);

        let silent = dest.are_frames_zero();
        let now = self.clock.now();

        let mut state = self.lock_state();
        if silent {
            state.first_silence_time.get_or_insert(now);
        } else {
            state.first_silence_time = None;
        }

        if state.transition_pending {
            return frames;
        }

        let transition = if state.using_fake_sink {
            (!silent).then_some(Transition::Resume)
        } else {
            state
                .first_silence_time
                .filter(|&start| now.saturating_duration_since(start) >= self.silence_timeout)
                .map(|_| Transition::Suspend)
        };

        if let Some(transition) = transition {
            state.transition_pending = true;
            drop(state);
            self.post(transition);
        }

        frames
    }

    fn on_render_error(&self) {
        if let Some(callback) = self.callback.upgrade() {
            callback.on_render_error();
        }
    }
}

impl Drop for SilentSinkSuspender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SilentSinkSuspender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("SilentSinkSuspender")
            .field("silence_timeout", &self.silence_timeout)
            .field("using_fake_sink", &state.using_fake_sink)
            .field("transition_pending", &state.transition_pending)
            .finish()
    }
}
