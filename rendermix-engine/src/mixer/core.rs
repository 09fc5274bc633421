//! Mixer: routing, stage pool, idle pause and error fan-out
//!
//! **Locking:** one `Mutex<MixerState>` guards the whole graph. Add, remove,
//! listener registration, render and error notification all take it. The
//! render path holds it for one buffer's worth of mixing and never logs or
//! allocates (beyond scratch growth when a sink asks for a larger buffer than
//! negotiated).
//!
//! **Lock order:** mixer → stage → input. Sinks and the suspender are called
//! with the mixer lock held and must not call back into the mixer.

use super::combiner::Combiner;
use super::input::{InputKey, RenderErrorListener, SharedInput};
use super::stage::ResamplingStage;
use super::suspender::SilentSinkSuspender;
use crate::audio::AudioBus;
use crate::error::Result;
use crate::sink::{AudioRendererSink, RenderCallback};
use chrono::TimeDelta;
use rendermix_common::timing::time_to_frames;
use rendermix_common::{AudioParameters, Clock, MixerConfig, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Pool entry for one non-native sample rate
struct StageEntry {
    id: u64,
    stage: Arc<Mutex<ResamplingStage>>,
}

struct MixerState {
    /// Inputs at the output rate plus one entry per stage
    master: Combiner,

    /// Keyed by source sample rate; never holds an empty stage
    stages: HashMap<u32, StageEntry>,

    pause_delay: Duration,

    /// Last render that saw at least one input
    last_play_time: Instant,

    /// Whether the sink is expected to be rendering
    playing: bool,

    error_listeners: Vec<Weak<dyn RenderErrorListener>>,

    next_stage_id: u64,
}

/// Mixes any number of inputs, at any sample rates, into one sink
///
/// # Examples
///
/// ```rust
/// use rendermix_engine::{AudioParameters, ChannelLayout, Mixer, MixerConfig, NullAudioSink};
/// use std::sync::Arc;
///
/// let params = AudioParameters::new(48_000, ChannelLayout::Stereo, 480).unwrap();
/// let mixer = Mixer::new(params, Arc::new(NullAudioSink::new()), &MixerConfig::default());
/// assert_eq!(mixer.master_input_count(), 0);
/// ```
pub struct Mixer {
    output_params: AudioParameters,
    sink: Arc<dyn AudioRendererSink>,
    clock: Arc<dyn Clock>,
    suspender: Option<Arc<SilentSinkSuspender>>,
    state: Mutex<MixerState>,
}

impl Mixer {
    /// Create a mixer and start its sink.
    ///
    /// # Arguments
    /// - `output_params`: Format the sink renders; fixed for the mixer's life
    /// - `sink`: Output device. Initialized with this mixer (or its
    ///   suspender) as the render callback, then started
    /// - `config`: Pause delay and muted-audio suspension settings
    pub fn new(output_params: AudioParameters, sink: Arc<dyn AudioRendererSink>, config: &MixerConfig) -> Arc<Self> {
        Self::with_clock(output_params, sink, config, Arc::new(SystemClock))
    }

    /// Same as [`Mixer::new`] with an explicit time source
    pub fn with_clock(
        output_params: AudioParameters,
        sink: Arc<dyn AudioRendererSink>,
        config: &MixerConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let mixer = Arc::new_cyclic(|weak: &Weak<Mixer>| {
            let suspender = config.suspend_muted_audio.then(|| {
                let callback: Weak<dyn RenderCallback> = weak.clone();
                SilentSinkSuspender::new(
                    callback,
                    config.silence_timeout(),
                    &output_params,
                    Arc::clone(&sink),
                    Arc::clone(&clock),
                )
            });

            Mixer {
                output_params,
                sink: Arc::clone(&sink),
                clock: Arc::clone(&clock),
                suspender,
                state: Mutex::new(MixerState {
                    master: Combiner::new(output_params.frames_per_buffer()),
                    stages: HashMap::new(),
                    pause_delay: config.pause_delay(),
                    last_play_time: clock.now(),
                    // start() auto-plays
                    playing: true,
                    error_listeners: Vec::new(),
                    next_stage_id: 0,
                }),
            }
        });

        let callback: Weak<dyn RenderCallback> = match &mixer.suspender {
            Some(suspender) => Arc::downgrade(suspender) as Weak<dyn RenderCallback>,
            None => Arc::downgrade(&mixer) as Weak<dyn RenderCallback>,
        };
        sink.initialize(&output_params, callback);
        sink.start();

        info!(
            "Mixer created: {} (pause delay {:?}, muted suspension {})",
            output_params,
            config.pause_delay(),
            if config.suspend_muted_audio { "on" } else { "off" }
        );

        mixer
    }

    fn lock_state(&self) -> MutexGuard<'_, MixerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an input producing audio in `input_params`' format.
    ///
    /// Inputs at the output rate are summed directly. Others go through the
    /// resampling stage for their rate, created on first use. Resumes the
    /// sink if the mixer had paused it.
    ///
    /// Adding an input that is already registered is a programming error
    /// (debug assertion, ignored in release builds).
    ///
    /// # Errors
    /// `Error::Resampler` if a new stage cannot be built for the rate. The
    /// graph is left unchanged.
    pub fn add_mixer_input(&self, input_params: &AudioParameters, input: &SharedInput) -> Result<()> {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        if !state.playing {
            state.playing = true;
            state.last_play_time = self.clock.now();
            self.sink.play();
            debug!("Mixer resumed sink");
        }

        let rate = input_params.sample_rate();

        if rate == self.output_params.sample_rate() {
            let added = state.master.add_input(input, input_params.channels());
            debug_assert!(added, "mixer input added twice");
            return Ok(());
        }

        if let Some(entry) = state.stages.get(&rate) {
            let mut stage = entry.stage.lock().unwrap_or_else(PoisonError::into_inner);
            let added = stage.add_input(input, input_params.channels());
            debug_assert!(added, "mixer input added twice");
            return Ok(());
        }

        let id = state.next_stage_id;
        let stage = Arc::new(Mutex::new(ResamplingStage::new(id, input_params, &self.output_params)?));
        state.next_stage_id += 1;

        // The stage joins the master combiner before any input joins it
        let stage_input: SharedInput = stage.clone();
        state.master.add_input(&stage_input, self.output_params.channels());
        stage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_input(input, input_params.channels());
        state.stages.insert(rate, StageEntry { id, stage });

        debug!(
            "Created resampling stage {} for {}Hz -> {}Hz",
            id,
            rate,
            self.output_params.sample_rate()
        );
        Ok(())
    }

    /// Unregister an input added with the same `input_params`.
    ///
    /// A stage left without inputs is detached and dropped immediately.
    /// Never changes the playing state; idling is decided by the render path.
    /// Removing an input that is not registered is a programming error
    /// (debug assertion, ignored in release builds).
    pub fn remove_mixer_input(&self, input_params: &AudioParameters, input: &SharedInput) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let key = InputKey::of(input);
        let rate = input_params.sample_rate();

        if rate == self.output_params.sample_rate() {
            let removed = state.master.remove_input(key);
            debug_assert!(removed, "removed a mixer input that was never added");
            return;
        }

        debug_assert!(
            state.stages.contains_key(&rate),
            "no resampling stage for {}Hz",
            rate
        );
        let Some(entry) = state.stages.get(&rate) else {
            return;
        };

        let (removed, now_empty) = {
            let mut stage = entry.stage.lock().unwrap_or_else(PoisonError::into_inner);
            (stage.remove_input(key), stage.is_empty())
        };
        debug_assert!(removed, "removed a mixer input that was never added");

        if now_empty {
            if let Some(entry) = state.stages.remove(&rate) {
                state.master.remove_input(InputKey::of(&entry.stage));
                debug!("Destroyed resampling stage {} for {}Hz", entry.id, rate);
            }
        }
    }

    /// Register `listener` for sink error notifications. Adding the same
    /// listener twice has no effect.
    pub fn add_error_callback(&self, listener: &Arc<dyn RenderErrorListener>) {
        let mut state = self.lock_state();
        let key = InputKey::of(listener);
        if !state.error_listeners.iter().any(|l| InputKey::of_weak(l) == key) {
            state.error_listeners.push(Arc::downgrade(listener));
        }
    }

    pub fn remove_error_callback(&self, listener: &Arc<dyn RenderErrorListener>) {
        let mut state = self.lock_state();
        let key = InputKey::of(listener);
        state.error_listeners.retain(|l| InputKey::of_weak(l) != key);
    }

    pub fn current_thread_is_rendering_thread(&self) -> bool {
        self.sink.current_thread_is_rendering_thread()
    }

    /// Override the idle time before the sink is paused
    ///
    /// Does not change the muted-audio suspender's timeout.
    pub fn set_pause_delay_for_testing(&self, delay: Duration) {
        self.lock_state().pause_delay = delay;
    }

    pub fn output_params(&self) -> AudioParameters {
        self.output_params
    }

    /// The muted-audio suspender, when enabled by the config
    pub fn silent_sink_suspender(&self) -> Option<&Arc<SilentSinkSuspender>> {
        self.suspender.as_ref()
    }

    /// Inputs attached directly to the master combiner, stages included
    pub fn master_input_count(&self) -> usize {
        self.lock_state().master.len()
    }

    pub fn resampler_stage_count(&self) -> usize {
        self.lock_state().stages.len()
    }

    pub fn has_resampler_stage(&self, sample_rate: u32) -> bool {
        self.lock_state().stages.contains_key(&sample_rate)
    }

    /// Creation id of the stage for `sample_rate`, if one exists
    pub fn resampler_stage_id(&self, sample_rate: u32) -> Option<u64> {
        self.lock_state().stages.get(&sample_rate).map(|entry| entry.id)
    }

    pub fn error_listener_count(&self) -> usize {
        self.lock_state().error_listeners.len()
    }

    /// Whether the mixer expects the sink to be rendering
    pub fn is_playing(&self) -> bool {
        self.lock_state().playing
    }
}

impl RenderCallback for Mixer {
    fn render(
        &self,
        delay: TimeDelta,
        _delay_timestamp: Instant,
        _prior_frames_skipped: u32,
        dest: &mut AudioBus,
    ) -> usize {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        // Pause the sink once nothing has been attached for a while, so idle
        // media does not keep the device busy
        let now = self.clock.now();
        if !state.master.is_empty() {
            state.last_play_time = now;
        } else if state.playing && now.saturating_duration_since(state.last_play_time) >= state.pause_delay {
            self.sink.pause();
            if let Some(suspender) = &self.suspender {
                suspender.on_paused();
            }
            state.playing = false;
        }

        // time_to_frames clamps negative delay to zero
        let frames_delayed = time_to_frames(delay, self.output_params.sample_rate());
        state.master.convert_with_delay(frames_delayed, dest);
        dest.frames()
    }

    fn on_render_error(&self) {
        let state = self.lock_state();
        error!(
            "Audio sink reported a render error, notifying {} listener(s)",
            state.error_listeners.len()
        );
        for listener in state.error_listeners.iter().filter_map(Weak::upgrade) {
            listener.on_render_error();
        }
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        // The sink must not call render once teardown starts
        self.sink.stop();
        if let Some(suspender) = self.suspender.take() {
            suspender.shutdown();
        }

        if std::thread::panicking() {
            return;
        }

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(state.master.is_empty(), "mixer dropped with inputs attached");
        debug_assert!(state.stages.is_empty(), "mixer dropped with resampling stages alive");
        debug_assert!(
            state.error_listeners.is_empty(),
            "mixer dropped with error listeners registered"
        );
        debug!("Mixer destroyed");
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Mixer")
            .field("output_params", &self.output_params)
            .field("master_inputs", &state.master.len())
            .field("stages", &state.stages.len())
            .field("playing", &state.playing)
            .finish()
    }
}
