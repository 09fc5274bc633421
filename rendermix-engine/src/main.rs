//! rendermix demo - Main entry point
//!
//! Mixes one sine tone per requested sample rate into a single output and
//! reports what the sink received. Without the `cpal-output` feature the
//! output is a `NullAudioSink` (headless, metered); with it, `--device` picks
//! a physical device.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rendermix_engine::{
    AudioBus, AudioParameters, AudioRendererSink, ChannelLayout, Mixer, MixerConfig, MixerInput,
    NullAudioSink, SharedInput,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rendermix-demo
#[derive(Parser, Debug)]
#[command(name = "rendermix-demo")]
#[command(about = "Mix sine inputs at several sample rates into one sink")]
#[command(version)]
struct Args {
    /// Input sample rates, one sine input per entry
    #[arg(short, long, value_delimiter = ',', default_value = "48000,44100,22050")]
    rates: Vec<u32>,

    /// Output sample rate
    #[arg(long, default_value = "48000")]
    output_rate: u32,

    /// Output channel layout (mono, stereo, quad, 5.1, 7.1 or a count)
    #[arg(long, default_value = "stereo")]
    layout: ChannelLayout,

    /// Frames per output buffer
    #[arg(long, default_value = "480")]
    frames: usize,

    /// Base tone frequency in Hz; each further input is a fifth higher
    #[arg(long, default_value = "220")]
    frequency: f32,

    /// How long to play, in seconds
    #[arg(short, long, default_value = "2")]
    duration: f64,

    /// Mixer configuration file
    #[arg(short, long, env = "RENDERMIX_CONFIG")]
    config: Option<PathBuf>,

    /// Suspend the sink during sustained silence (overrides the config file)
    #[arg(long)]
    suspend_muted_audio: bool,

    /// Output device name; requires the cpal-output feature
    #[arg(long)]
    device: Option<String>,
}

/// Sine tone generator at a fixed sample rate
struct SineInput {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl SineInput {
    fn new(frequency: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: frequency * std::f32::consts::TAU / sample_rate as f32,
            amplitude,
        }
    }
}

impl MixerInput for SineInput {
    fn provide_input(&mut self, dest: &mut AudioBus, _frames_delayed: u32) -> f32 {
        let frames = dest.frames();
        for frame in 0..frames {
            let sample = self.phase.sin() * self.amplitude;
            for ch in 0..dest.channels() {
                dest.channel_mut(ch)[frame] = sample;
            }
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        }
        1.0
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendermix_engine=debug,rendermix_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let mut config = MixerConfig::load(args.config.as_deref()).context("Failed to load mixer configuration")?;
    if args.suspend_muted_audio {
        config.suspend_muted_audio = true;
    }

    let output_params = AudioParameters::new(args.output_rate, args.layout, args.frames)
        .context("Invalid output parameters")?;

    info!("Starting rendermix demo: {} for {:.1}s", output_params, args.duration);

    let null_sink = Arc::new(NullAudioSink::new());
    let sink = select_sink(&args, &null_sink)?;
    let mixer = Mixer::new(output_params, sink, &config);

    // Keep the amplitude sum below full scale
    let amplitude = 0.8 / args.rates.len().max(1) as f32;
    let mut inputs: Vec<(AudioParameters, SharedInput)> = Vec::new();
    for (index, &rate) in args.rates.iter().enumerate() {
        let params = output_params
            .with_sample_rate(rate)
            .with_context(|| format!("Invalid input sample rate {}", rate))?;
        let frequency = args.frequency * 1.5f32.powi(index as i32);
        let input: SharedInput = Arc::new(Mutex::new(SineInput::new(frequency, rate, amplitude)));

        mixer
            .add_mixer_input(&params, &input)
            .with_context(|| format!("Failed to add {}Hz input", rate))?;
        info!("Added {:.1}Hz tone at {}Hz", frequency, rate);
        inputs.push((params, input));
    }

    info!(
        "{} master inputs, {} resampling stages",
        mixer.master_input_count(),
        mixer.resampler_stage_count()
    );

    std::thread::sleep(Duration::from_secs_f64(args.duration.max(0.0)));

    for (params, input) in &inputs {
        mixer.remove_mixer_input(params, input);
    }
    drop(mixer);

    let metrics = null_sink.metrics();
    if metrics.render_calls > 0 {
        info!(
            "Rendered {} buffers ({} frames, {:.2}s), peak {:.3}",
            metrics.render_calls,
            metrics.frames_rendered,
            metrics.frames_rendered as f64 / output_params.sample_rate() as f64,
            metrics.peak
        );
    }

    info!("Demo complete");
    Ok(())
}

#[cfg(feature = "cpal-output")]
fn select_sink(args: &Args, null_sink: &Arc<NullAudioSink>) -> Result<Arc<dyn AudioRendererSink>> {
    use rendermix_engine::sink::CpalSink;

    match &args.device {
        Some(name) => {
            let devices = CpalSink::list_devices().context("Failed to list audio devices")?;
            info!("Available devices: {:?}", devices);
            Ok(Arc::new(CpalSink::new(Some(name.clone()))))
        }
        None => Ok(null_sink.clone()),
    }
}

#[cfg(not(feature = "cpal-output"))]
fn select_sink(args: &Args, null_sink: &Arc<NullAudioSink>) -> Result<Arc<dyn AudioRendererSink>> {
    if let Some(name) = &args.device {
        tracing::warn!(
            "Ignoring --device {}: built without the cpal-output feature, using the null sink",
            name
        );
    }
    Ok(null_sink.clone())
}
