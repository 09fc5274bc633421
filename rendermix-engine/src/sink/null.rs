//! Sink that renders on a timer and discards the audio
//!
//! Behaves like a real device from the mixer's point of view: it calls the
//! render callback once per buffer period on its own thread. The output is
//! metered (frames, calls, peak) and then dropped. Useful headless, in
//! tests, and as the stand-in device while the real sink is suspended.

use super::fake_worker::{FakeRenderWorker, PendingStop};
use super::{AudioRendererSink, RenderCallback};
use crate::audio::AudioBus;
use chrono::TimeDelta;
use rendermix_common::AudioParameters;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Render statistics collected by [`NullAudioSink`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SinkMetrics {
    /// Number of render callbacks made
    pub render_calls: u64,
    /// Total frames reported rendered by the callback
    pub frames_rendered: u64,
    /// Largest absolute sample value seen
    pub peak: f32,
}

#[derive(Default)]
struct Meter {
    render_calls: AtomicU64,
    frames_rendered: AtomicU64,
    peak_bits: AtomicU32,
}

impl Meter {
    fn record(&self, frames: usize, peak: f32) {
        self.render_calls.fetch_add(1, Ordering::Relaxed);
        self.frames_rendered.fetch_add(frames as u64, Ordering::Relaxed);
        // Non-negative f32 bit patterns order the same as the values
        self.peak_bits.fetch_max(peak.to_bits(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> SinkMetrics {
        SinkMetrics {
            render_calls: self.render_calls.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            peak: f32::from_bits(self.peak_bits.load(Ordering::Relaxed)),
        }
    }
}

struct SinkState {
    params: Option<AudioParameters>,
    callback: Option<Weak<dyn RenderCallback>>,
    started: bool,
    playing: bool,
}

/// Timer-driven sink with no audible output
pub struct NullAudioSink {
    state: Mutex<SinkState>,
    worker: Mutex<Option<Arc<FakeRenderWorker>>>,
    meter: Arc<Meter>,
}

impl NullAudioSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                params: None,
                callback: None,
                started: false,
                playing: false,
            }),
            worker: Mutex::new(None),
            meter: Arc::new(Meter::default()),
        }
    }

    pub fn metrics(&self) -> SinkMetrics {
        self.meter.snapshot()
    }

    /// True while the render thread is running
    pub fn is_playing(&self) -> bool {
        self.lock_state().playing
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_worker(&self) -> Option<Arc<FakeRenderWorker>> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Launch the render thread if initialized and not already rendering
    fn begin_rendering(&self, state: &mut SinkState) {
        if state.playing {
            return;
        }
        let (Some(params), Some(callback), Some(worker)) =
            (state.params, state.callback.clone(), self.current_worker())
        else {
            return;
        };

        let meter = Arc::clone(&self.meter);
        let mut bus = AudioBus::for_params(&params);
        worker.start(move |scheduled| {
            let Some(callback) = callback.upgrade() else {
                return;
            };
            let frames = callback.render(TimeDelta::zero(), scheduled, 0, &mut bus);
            meter.record(frames, bus.peak());
        });
        state.playing = true;
    }

    /// Mark rendering halted and signal the thread. The caller joins it after
    /// releasing the state lock, since the thread may be waiting on a lock
    /// held by whoever is blocked on ours.
    fn halt_rendering(&self, state: &mut SinkState) -> Option<PendingStop> {
        if !state.playing {
            return None;
        }
        state.playing = false;
        self.current_worker().and_then(|w| w.request_stop())
    }
}

impl Default for NullAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRendererSink for NullAudioSink {
    fn initialize(&self, params: &AudioParameters, callback: Weak<dyn RenderCallback>) {
        let mut state = self.lock_state();
        debug_assert!(!state.started, "initialize after start");

        let period = if params.buffer_duration().is_zero() {
            Duration::from_millis(1)
        } else {
            params.buffer_duration()
        };
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(FakeRenderWorker::new("null-audio-sink", period)));

        state.params = Some(*params);
        state.callback = Some(callback);
        debug!("Null sink initialized: {}", params);
    }

    fn start(&self) {
        let mut state = self.lock_state();
        if state.started {
            return;
        }
        state.started = true;
        self.begin_rendering(&mut state);
        info!("Null sink started");
    }

    fn play(&self) {
        let mut state = self.lock_state();
        if state.started {
            self.begin_rendering(&mut state);
        }
    }

    fn pause(&self) {
        let pending = self.halt_rendering(&mut self.lock_state());
        if let Some(pending) = pending {
            pending.wait();
        }
    }

    fn stop(&self) {
        let pending = {
            let mut state = self.lock_state();
            state.started = false;
            state.callback = None;
            self.halt_rendering(&mut state)
        };
        if let Some(pending) = pending {
            pending.wait();
            debug!("Null sink stopped");
        }
    }

    fn current_thread_is_rendering_thread(&self) -> bool {
        self.current_worker()
            .map(|w| w.is_worker_thread())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for NullAudioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullAudioSink")
            .field("playing", &self.is_playing())
            .field("metrics", &self.metrics())
            .finish()
    }
}
