//! Test helper modules for rendermix integration tests
//!
//! Provides reusable test infrastructure components:
//! - RecordingSink: sink that records every call and renders only on demand
//! - ConstantInput: input producing fixed per-channel levels
//! - CountingListener: error listener counting notifications

#![allow(dead_code)]

use chrono::TimeDelta;
use rendermix_engine::{
    AudioBus, AudioParameters, AudioRendererSink, ChannelLayout, MixerInput, RenderCallback,
    RenderErrorListener, SharedInput,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Sink method invocations, in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCall {
    Initialize,
    Start,
    Play,
    Pause,
    Stop,
}

/// Sink that never renders by itself
///
/// Tests drive rendering explicitly with `render_once`, so the mixer's
/// behaviour is fully deterministic.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    callback: Mutex<Option<Weak<dyn RenderCallback>>>,
    params: Mutex<Option<AudioParameters>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: SinkCall) -> usize {
        self.calls().iter().filter(|&&c| c == call).count()
    }

    /// True while the registered render callback is still alive
    pub fn has_live_callback(&self) -> bool {
        self.callback
            .lock()
            .unwrap()
            .as_ref()
            .map(|cb| cb.upgrade().is_some())
            .unwrap_or(false)
    }

    /// Render one buffer through the registered callback
    pub fn render_once(&self, delay: TimeDelta) -> Option<AudioBus> {
        let callback = self.callback.lock().unwrap().as_ref()?.upgrade()?;
        let params = (*self.params.lock().unwrap())?;
        let mut bus = AudioBus::for_params(&params);
        let frames = callback.render(delay, Instant::now(), 0, &mut bus);
        assert_eq!(frames, params.frames_per_buffer());
        Some(bus)
    }

    /// Render `count` buffers and return the last one
    pub fn render_many(&self, count: usize) -> Option<AudioBus> {
        let mut last = None;
        for _ in 0..count {
            last = self.render_once(TimeDelta::zero());
        }
        last
    }

    /// Report a fatal device error to the callback
    pub fn trigger_error(&self) {
        let callback = self.callback.lock().unwrap().as_ref().and_then(Weak::upgrade);
        if let Some(callback) = callback {
            callback.on_render_error();
        }
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AudioRendererSink for RecordingSink {
    fn initialize(&self, params: &AudioParameters, callback: Weak<dyn RenderCallback>) {
        *self.params.lock().unwrap() = Some(*params);
        *self.callback.lock().unwrap() = Some(callback);
        self.record(SinkCall::Initialize);
    }

    fn start(&self) {
        self.record(SinkCall::Start);
    }

    fn play(&self) {
        self.record(SinkCall::Play);
    }

    fn pause(&self) {
        self.record(SinkCall::Pause);
    }

    fn stop(&self) {
        self.record(SinkCall::Stop);
    }

    fn current_thread_is_rendering_thread(&self) -> bool {
        false
    }
}

/// Input producing fixed levels, channel `n` at `levels[n % levels.len()]`
pub struct ConstantInput {
    pub levels: Vec<f32>,
    pub volume: f32,
    pub delays: Vec<u32>,
}

impl ConstantInput {
    /// Same level on every channel; returns the concrete handle (for
    /// inspection) and the handle to register
    pub fn shared(level: f32) -> (Arc<Mutex<ConstantInput>>, SharedInput) {
        Self::per_channel(vec![level])
    }

    pub fn per_channel(levels: Vec<f32>) -> (Arc<Mutex<ConstantInput>>, SharedInput) {
        let input = Arc::new(Mutex::new(ConstantInput {
            levels,
            volume: 1.0,
            delays: Vec::new(),
        }));
        let shared: SharedInput = input.clone();
        (input, shared)
    }
}

impl MixerInput for ConstantInput {
    fn provide_input(&mut self, dest: &mut AudioBus, frames_delayed: u32) -> f32 {
        self.delays.push(frames_delayed);
        for ch in 0..dest.channels() {
            let level = self.levels[ch % self.levels.len()];
            dest.channel_mut(ch).fill(level);
        }
        self.volume
    }
}

/// Error listener that counts notifications
#[derive(Default)]
pub struct CountingListener {
    count: AtomicUsize,
}

impl CountingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RenderErrorListener for CountingListener {
    fn on_render_error(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn params(sample_rate: u32, layout: ChannelLayout) -> AudioParameters {
    AudioParameters::new(sample_rate, layout, 480).unwrap()
}

pub fn stereo(sample_rate: u32) -> AudioParameters {
    params(sample_rate, ChannelLayout::Stereo)
}

/// Poll `condition` for up to two seconds
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
