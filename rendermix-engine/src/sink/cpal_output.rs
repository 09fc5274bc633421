//! Physical output device sink using cpal
//!
//! cpal streams are not `Send`, so the stream lives on a control thread that
//! owns it for its whole life. `start`/`play`/`pause`/`stop` become commands
//! on a channel to that thread.
//!
//! The device pulls interleaved samples in whatever chunk size it likes; the
//! data callback renders whole mixer buffers and hands them out across device
//! callbacks as needed.

use super::{AudioRendererSink, RenderCallback};
use crate::audio::AudioBus;
use crate::error::{Error, Result};
use chrono::TimeDelta;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use rendermix_common::AudioParameters;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkCommand {
    Play,
    Pause,
    Stop,
}

/// Sink rendering to a cpal output device
pub struct CpalSink {
    requested_device: Option<String>,
    commands: Mutex<Option<Sender<SinkCommand>>>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
    render_thread: Arc<Mutex<Option<ThreadId>>>,
}

impl CpalSink {
    /// Create a sink for `device_name` (None = default device).
    ///
    /// The device is opened in `initialize`. A missing named device falls
    /// back to the default one.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            requested_device: device_name,
            commands: Mutex::new(None),
            control_thread: Mutex::new(None),
            render_thread: Arc::new(Mutex::new(None)),
        }
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn open_device(requested: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = requested {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(device);
            }
            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(device)
    }

    /// Open the device and build a paused stream for `params`
    fn build_stream(
        requested: Option<&str>,
        params: &AudioParameters,
        callback: Weak<dyn RenderCallback>,
        render_thread: Arc<Mutex<Option<ThreadId>>>,
    ) -> Result<Stream> {
        let device = Self::open_device(requested)?;

        let sample_format = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?
            .sample_format();

        let config = StreamConfig {
            channels: params.channels() as u16,
            sample_rate: cpal::SampleRate(params.sample_rate()),
            buffer_size: cpal::BufferSize::Fixed(params.frames_per_buffer() as u32),
        };

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        match sample_format {
            SampleFormat::F32 => Self::build_typed_stream::<f32>(&device, &config, params, callback, render_thread),
            SampleFormat::I16 => Self::build_typed_stream::<i16>(&device, &config, params, callback, render_thread),
            SampleFormat::U16 => Self::build_typed_stream::<u16>(&device, &config, params, callback, render_thread),
            sample_format => Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                sample_format
            ))),
        }
    }

    fn build_typed_stream<T>(
        device: &Device,
        config: &StreamConfig,
        params: &AudioParameters,
        callback: Weak<dyn RenderCallback>,
        render_thread: Arc<Mutex<Option<ThreadId>>>,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = params.channels();
        let mut bus = AudioBus::for_params(params);
        // Frames of `bus` already written to the device
        let mut bus_pos = bus.frames();
        let error_callback = callback.clone();

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                    if let Ok(mut thread_id) = render_thread.try_lock() {
                        if thread_id.is_none() {
                            *thread_id = Some(thread::current().id());
                        }
                    }

                    let timestamp = info.timestamp();
                    let delay = timestamp
                        .playback
                        .duration_since(&timestamp.callback)
                        .and_then(|d| TimeDelta::from_std(d).ok())
                        .unwrap_or_else(TimeDelta::zero);

                    for frame in data.chunks_mut(channels) {
                        if bus_pos >= bus.frames() {
                            match callback.upgrade() {
                                Some(callback) => {
                                    callback.render(delay, Instant::now(), 0, &mut bus);
                                }
                                None => bus.zero(),
                            }
                            bus_pos = 0;
                        }
                        for (ch, sample) in frame.iter_mut().enumerate() {
                            let value = bus.channel(ch)[bus_pos].clamp(-1.0, 1.0);
                            *sample = T::from_sample(value);
                        }
                        bus_pos += 1;
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    if let Some(callback) = error_callback.upgrade() {
                        callback.on_render_error();
                    }
                },
                None, // No timeout
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    fn control_loop(stream: Stream, commands: Receiver<SinkCommand>) {
        while let Ok(command) = commands.recv() {
            let result = match command {
                SinkCommand::Play => stream.play().map_err(|e| e.to_string()),
                SinkCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                SinkCommand::Stop => break,
            };
            if let Err(e) = result {
                warn!("Audio stream {:?} failed: {}", command, e);
            }
        }
        drop(stream);
        debug!("Audio stream closed");
    }

    fn send(&self, command: SinkCommand) {
        let commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = commands.as_ref() {
            if tx.send(command).is_err() {
                warn!("Audio control thread gone, dropping {:?}", command);
            }
        }
    }
}

impl AudioRendererSink for CpalSink {
    fn initialize(&self, params: &AudioParameters, callback: Weak<dyn RenderCallback>) {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let requested = self.requested_device.clone();
        let params = *params;
        let render_thread = Arc::clone(&self.render_thread);
        let error_callback = callback.clone();

        let spawned = thread::Builder::new()
            .name("cpal-sink-control".to_string())
            .spawn(move || {
                match Self::build_stream(requested.as_deref(), &params, callback, render_thread) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        Self::control_loop(stream, rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn audio control thread: {}", e);
                return;
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Audio output initialized: {}", params);
                *self.commands.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
                *self.control_thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Ok(Err(e)) => {
                error!("Failed to open audio output: {}", e);
                let _ = handle.join();
                if let Some(callback) = error_callback.upgrade() {
                    callback.on_render_error();
                }
            }
            Err(_) => {
                error!("Audio control thread exited during initialization");
                let _ = handle.join();
            }
        }
    }

    fn start(&self) {
        info!("Starting audio stream");
        self.send(SinkCommand::Play);
    }

    fn play(&self) {
        self.send(SinkCommand::Play);
    }

    fn pause(&self) {
        self.send(SinkCommand::Pause);
    }

    fn stop(&self) {
        self.send(SinkCommand::Stop);
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = self
            .control_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        // Closing the stream from inside its own callback would deadlock
        if !self.current_thread_is_rendering_thread() && handle.join().is_err() {
            warn!("Audio control thread panicked");
        }
        info!("Audio stream stopped");
    }

    fn current_thread_is_rendering_thread(&self) -> bool {
        *self.render_thread.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CpalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSink")
            .field("requested_device", &self.requested_device)
            .finish()
    }
}
