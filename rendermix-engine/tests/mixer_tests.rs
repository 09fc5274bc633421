//! Mixer integration tests
//!
//! Routing, stage pool lifecycle, idle pause, error fan-out and teardown,
//! driven through a recording sink and a manual clock.

mod helpers;

use chrono::TimeDelta;
use helpers::*;
use rendermix_engine::{
    AudioParameters, ChannelLayout, ManualClock, Mixer, MixerConfig, RenderErrorListener, SharedInput,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
    mixer: Arc<Mixer>,
}

fn fixture_with(output: AudioParameters) -> Fixture {
    let sink = RecordingSink::new();
    let clock = Arc::new(ManualClock::new());
    let mixer = Mixer::with_clock(output, sink.clone(), &MixerConfig::default(), clock.clone());
    Fixture { sink, clock, mixer }
}

fn fixture() -> Fixture {
    fixture_with(stereo(48_000))
}

fn approx(samples: &[f32], expected: f32) -> bool {
    samples.iter().all(|&s| (s - expected).abs() < 1e-3)
}

// ========================================
// Construction and teardown
// ========================================

#[test]
fn test_construction_initializes_and_starts_sink() {
    let f = fixture();

    assert_eq!(f.sink.calls(), vec![SinkCall::Initialize, SinkCall::Start]);
    assert!(f.mixer.is_playing());
    assert!(f.sink.has_live_callback());
    assert_eq!(f.mixer.output_params(), stereo(48_000));
    assert!(f.mixer.silent_sink_suspender().is_none());
}

#[test]
fn test_clean_drop_stops_sink_first() {
    let f = fixture();
    let sink = f.sink.clone();
    drop(f);

    let calls = sink.calls();
    assert_eq!(calls.last(), Some(&SinkCall::Stop));
    assert_eq!(sink.count(SinkCall::Stop), 1);
    assert!(!sink.has_live_callback());
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "mixer dropped with inputs attached")]
fn test_drop_with_inputs_attached_panics_in_debug() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(1.0);
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    drop(f);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "mixer dropped with error listeners registered")]
fn test_drop_with_listener_registered_panics_in_debug() {
    let f = fixture();
    let listener: Arc<dyn RenderErrorListener> = CountingListener::new();
    f.mixer.add_error_callback(&listener);
    drop(f);
}

// ========================================
// Routing
// ========================================

#[test]
fn test_native_rate_input_changes_output_only_while_attached() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.5);

    assert!(f.sink.render_once(TimeDelta::zero()).unwrap().are_frames_zero());

    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    let mixed = f.sink.render_once(TimeDelta::zero()).unwrap();
    assert!(approx(mixed.channel(0), 0.5));
    assert!(approx(mixed.channel(1), 0.5));
    assert_eq!(f.mixer.resampler_stage_count(), 0);

    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
    assert!(f.sink.render_once(TimeDelta::zero()).unwrap().are_frames_zero());
}

#[test]
fn test_scenario_a_all_ones_input() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(1.0);

    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    let out = f.sink.render_once(TimeDelta::zero()).unwrap();
    assert!(!out.are_frames_zero());
    assert!(approx(out.channel(0), 1.0));

    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
    assert_eq!(f.mixer.master_input_count(), 0);
}

#[test]
fn test_scenario_b_one_stage_for_foreign_rate() {
    let f = fixture();
    let (_a, native) = ConstantInput::shared(0.1);
    let (_b, foreign) = ConstantInput::shared(0.1);

    f.mixer.add_mixer_input(&stereo(44_100), &foreign).unwrap();
    f.mixer.add_mixer_input(&stereo(48_000), &native).unwrap();

    assert_eq!(f.mixer.resampler_stage_count(), 1);
    assert!(f.mixer.has_resampler_stage(44_100));
    assert!(!f.mixer.has_resampler_stage(48_000));
    assert_eq!(f.mixer.master_input_count(), 2);

    f.mixer.remove_mixer_input(&stereo(44_100), &foreign);
    f.mixer.remove_mixer_input(&stereo(48_000), &native);
}

#[test]
fn test_inputs_at_same_foreign_rate_share_a_stage() {
    let f = fixture();
    let (_a, first) = ConstantInput::shared(0.1);
    let (_b, second) = ConstantInput::shared(0.1);

    f.mixer.add_mixer_input(&stereo(22_050), &first).unwrap();
    let stage_id = f.mixer.resampler_stage_id(22_050);
    f.mixer.add_mixer_input(&params(22_050, ChannelLayout::Mono), &second).unwrap();

    assert_eq!(f.mixer.resampler_stage_count(), 1);
    assert_eq!(f.mixer.resampler_stage_id(22_050), stage_id);
    assert_eq!(f.mixer.master_input_count(), 1);

    // Removing one input keeps the stage alive
    f.mixer.remove_mixer_input(&stereo(22_050), &first);
    assert_eq!(f.mixer.resampler_stage_id(22_050), stage_id);

    f.mixer.remove_mixer_input(&params(22_050, ChannelLayout::Mono), &second);
    assert_eq!(f.mixer.resampler_stage_count(), 0);
}

#[test]
fn test_scenario_d_stage_recreated_not_reused() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.2);

    f.mixer.add_mixer_input(&stereo(44_100), &shared).unwrap();
    let first_id = f.mixer.resampler_stage_id(44_100).unwrap();

    f.mixer.remove_mixer_input(&stereo(44_100), &shared);
    assert!(!f.mixer.has_resampler_stage(44_100));
    assert_eq!(f.mixer.master_input_count(), 0);

    f.mixer.add_mixer_input(&stereo(44_100), &shared).unwrap();
    let second_id = f.mixer.resampler_stage_id(44_100).unwrap();
    assert_ne!(first_id, second_id);

    f.mixer.remove_mixer_input(&stereo(44_100), &shared);
}

#[test]
fn test_stage_count_tracks_distinct_foreign_rates() {
    let f = fixture();
    let rates = [44_100u32, 22_050, 96_000, 48_000, 32_000];
    let mut attached: Vec<(AudioParameters, SharedInput)> = Vec::new();

    // Deterministic pseudo-random add/remove sequence
    let mut seed = 0x2545_f491u32;
    for _ in 0..200 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let choice = (seed >> 16) as usize;

        if attached.is_empty() || choice % 3 != 0 {
            let rate = rates[choice % rates.len()];
            let (_input, shared) = ConstantInput::shared(0.01);
            f.mixer.add_mixer_input(&stereo(rate), &shared).unwrap();
            attached.push((stereo(rate), shared));
        } else {
            let (params, shared) = attached.remove(choice % attached.len());
            f.mixer.remove_mixer_input(&params, &shared);
        }

        let mut foreign: Vec<u32> = attached
            .iter()
            .map(|(p, _)| p.sample_rate())
            .filter(|&r| r != 48_000)
            .collect();
        foreign.sort_unstable();
        foreign.dedup();

        assert_eq!(f.mixer.resampler_stage_count(), foreign.len());
        for rate in &foreign {
            assert!(f.mixer.has_resampler_stage(*rate));
        }
    }

    for (params, shared) in attached.drain(..) {
        f.mixer.remove_mixer_input(&params, &shared);
    }
    assert_eq!(f.mixer.resampler_stage_count(), 0);
    assert_eq!(f.mixer.master_input_count(), 0);
}

#[test]
fn test_resampled_input_is_audible() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.5);
    f.mixer.add_mixer_input(&params(44_100, ChannelLayout::Mono), &shared).unwrap();

    let out = f.sink.render_many(6).unwrap();
    assert!(out.peak() > 0.4);
    assert!(approx(out.channel(0), 0.5));
    assert!(approx(out.channel(1), 0.5));

    f.mixer.remove_mixer_input(&params(44_100, ChannelLayout::Mono), &shared);
}

#[test]
fn test_native_and_resampled_inputs_sum() {
    let f = fixture();
    let (_a, native) = ConstantInput::shared(0.25);
    let (_b, foreign) = ConstantInput::shared(0.25);
    f.mixer.add_mixer_input(&stereo(48_000), &native).unwrap();
    f.mixer.add_mixer_input(&stereo(96_000), &foreign).unwrap();

    let out = f.sink.render_many(6).unwrap();
    assert!(approx(out.channel(0), 0.5));

    f.mixer.remove_mixer_input(&stereo(48_000), &native);
    f.mixer.remove_mixer_input(&stereo(96_000), &foreign);
}

// ========================================
// Channel mapping
// ========================================

#[test]
fn test_mono_input_duplicated_to_every_channel() {
    let f = fixture_with(params(48_000, ChannelLayout::Quad));
    let (_input, shared) = ConstantInput::shared(0.3);
    f.mixer.add_mixer_input(&params(48_000, ChannelLayout::Mono), &shared).unwrap();

    let out = f.sink.render_once(TimeDelta::zero()).unwrap();
    for ch in 0..4 {
        assert!(approx(out.channel(ch), 0.3), "channel {}", ch);
    }

    f.mixer.remove_mixer_input(&params(48_000, ChannelLayout::Mono), &shared);
}

#[test]
fn test_stereo_input_averaged_into_mono_output() {
    let f = fixture_with(params(48_000, ChannelLayout::Mono));
    let (_input, shared) = ConstantInput::per_channel(vec![1.0, 0.0]);
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();

    let out = f.sink.render_once(TimeDelta::zero()).unwrap();
    assert!(approx(out.channel(0), 0.5));

    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
}

#[test]
fn test_input_volume_applied() {
    let f = fixture();
    let (input, shared) = ConstantInput::shared(0.8);
    input.lock().unwrap().volume = 0.5;
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();

    let out = f.sink.render_once(TimeDelta::zero()).unwrap();
    assert!(approx(out.channel(1), 0.4));

    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
}

// ========================================
// Delay
// ========================================

#[test]
fn test_delay_converted_to_output_frames() {
    let f = fixture();
    let (input, shared) = ConstantInput::shared(0.1);
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();

    f.sink.render_once(TimeDelta::milliseconds(10));
    f.sink.render_once(TimeDelta::milliseconds(-5));
    f.sink.render_once(TimeDelta::zero());

    assert_eq!(input.lock().unwrap().delays, vec![480, 0, 0]);
    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
}

// ========================================
// Idle pause
// ========================================

#[test]
fn test_idle_pause_after_delay_then_resume() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);

    // Adding while already playing does not call play
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    assert_eq!(f.sink.count(SinkCall::Play), 0);
    f.sink.render_once(TimeDelta::zero());
    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
    assert!(f.mixer.is_playing());

    f.clock.advance(Duration::from_millis(9_999));
    f.sink.render_once(TimeDelta::zero());
    assert_eq!(f.sink.count(SinkCall::Pause), 0);
    assert!(f.mixer.is_playing());

    f.clock.advance(Duration::from_millis(1));
    f.sink.render_once(TimeDelta::zero());
    assert_eq!(f.sink.count(SinkCall::Pause), 1);
    assert!(!f.mixer.is_playing());

    // Still idle: no second pause
    f.clock.advance(Duration::from_secs(30));
    f.sink.render_once(TimeDelta::zero());
    assert_eq!(f.sink.count(SinkCall::Pause), 1);

    // Re-adding resumes the sink and the next render does not pause again
    f.mixer.add_mixer_input(&stereo(44_100), &shared).unwrap();
    assert_eq!(f.sink.count(SinkCall::Play), 1);
    assert!(f.mixer.is_playing());
    f.sink.render_once(TimeDelta::zero());
    assert_eq!(f.sink.count(SinkCall::Pause), 1);

    f.mixer.remove_mixer_input(&stereo(44_100), &shared);
}

#[test]
fn test_removal_alone_never_pauses() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);
    f.mixer.set_pause_delay_for_testing(Duration::ZERO);

    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    f.mixer.remove_mixer_input(&stereo(48_000), &shared);

    assert!(f.mixer.is_playing());
    assert_eq!(f.sink.count(SinkCall::Pause), 0);
}

#[test]
fn test_scenario_c_zero_pause_delay() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);
    f.mixer.set_pause_delay_for_testing(Duration::ZERO);

    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
    f.sink.render_once(TimeDelta::zero());

    assert_eq!(f.sink.count(SinkCall::Pause), 1);
    assert!(!f.mixer.is_playing());
}

#[test]
fn test_pause_delay_from_config() {
    let sink = RecordingSink::new();
    let clock = Arc::new(ManualClock::new());
    let config = MixerConfig {
        pause_delay_ms: 250,
        ..MixerConfig::default()
    };
    let mixer = Mixer::with_clock(stereo(48_000), sink.clone(), &config, clock.clone());

    clock.advance(Duration::from_millis(249));
    sink.render_once(TimeDelta::zero());
    assert_eq!(sink.count(SinkCall::Pause), 0);

    clock.advance(Duration::from_millis(1));
    sink.render_once(TimeDelta::zero());
    assert_eq!(sink.count(SinkCall::Pause), 1);
    drop(mixer);
}

// ========================================
// Error fan-out
// ========================================

#[test]
fn test_error_reaches_every_registered_listener_once() {
    let f = fixture();
    let listeners: Vec<Arc<CountingListener>> = (0..3).map(|_| CountingListener::new()).collect();
    let handles: Vec<Arc<dyn RenderErrorListener>> = listeners
        .iter()
        .map(|l| l.clone() as Arc<dyn RenderErrorListener>)
        .collect();

    for handle in &handles {
        f.mixer.add_error_callback(handle);
    }
    f.mixer.remove_error_callback(&handles[2]);
    assert_eq!(f.mixer.error_listener_count(), 2);

    f.sink.trigger_error();

    assert_eq!(listeners[0].count(), 1);
    assert_eq!(listeners[1].count(), 1);
    assert_eq!(listeners[2].count(), 0);

    for handle in &handles[..2] {
        f.mixer.remove_error_callback(handle);
    }
}

#[test]
fn test_error_listeners_independent_of_inputs() {
    let f = fixture();
    let listener = CountingListener::new();
    let handle: Arc<dyn RenderErrorListener> = listener.clone();

    // Registered without ever being an audio input
    f.mixer.add_error_callback(&handle);
    f.mixer.add_error_callback(&handle);
    f.sink.trigger_error();
    f.sink.trigger_error();

    assert_eq!(listener.count(), 2);
    f.mixer.remove_error_callback(&handle);
}

// ========================================
// Contract violations
// ========================================

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "never added")]
fn test_remove_unknown_native_input_panics_in_debug() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);
    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "no resampling stage")]
fn test_remove_unknown_foreign_input_panics_in_debug() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);
    f.mixer.remove_mixer_input(&stereo(44_100), &shared);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "added twice")]
fn test_double_add_panics_in_debug() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
    f.mixer.add_mixer_input(&stereo(48_000), &shared).unwrap();
}

#[test]
#[cfg(not(debug_assertions))]
fn test_remove_unknown_input_is_noop_in_release() {
    let f = fixture();
    let (_input, shared) = ConstantInput::shared(0.1);
    f.mixer.remove_mixer_input(&stereo(48_000), &shared);
    f.mixer.remove_mixer_input(&stereo(44_100), &shared);
    assert_eq!(f.mixer.master_input_count(), 0);
}
