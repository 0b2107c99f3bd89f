use crate::playback::clock::ClockReading;
use crate::playback::output::{AudioOutput, DecodedClip};
use crate::playback::symphonia_decoder::to_device_format;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No output device found")]
    DeviceNotFound,
    #[error("Stream config error: {0}")]
    StreamConfigError(String),
    #[error("Stream build error: {0}")]
    StreamBuildError(String),
    #[error("Stream play error: {0}")]
    StreamPlayError(String),
    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("Device enumeration failed: {0}")]
    Devices(String),
}

/// Output device as shown in the audio channel settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// cpal has no stable device ids, so derive one from the name
pub fn device_id(name: &str) -> String {
    format!("device_{}", name.replace(' ', "_").to_lowercase())
}

pub fn list_output_devices() -> Result<Vec<OutputDevice>, AudioError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Devices(e.to_string()))?;

    let mut result = Vec::new();
    for device in devices {
        let name = device
            .name()
            .map_err(|e| AudioError::Devices(e.to_string()))?;
        result.push(OutputDevice {
            id: device_id(&name),
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        });
    }
    Ok(result)
}

// Each stream gets its own clock epoch
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

struct Voice {
    samples: Arc<Vec<f32>>,
    position: usize,
}

/// Audio output on a cpal stream
///
/// The stream runs for the lifetime of this value and counts every frame it renders;
/// that count is the hardware clock. One clip plays at a time.
pub struct CpalAudioOutput {
    _stream: Stream,
    sample_rate: u32,
    channels: u16,
    epoch: u64,
    frames_played: Arc<AtomicU64>,
    voice: Arc<Mutex<Option<Voice>>>,
    volume: Arc<AtomicU32>, // 0-10000 (0.0-1.0 scaled)
    clips: HashMap<String, Arc<Vec<f32>>>,
}

impl CpalAudioOutput {
    /// Open the default output device
    pub fn new() -> Result<Self, AudioError> {
        Self::open(None)
    }

    /// Open the device with the given `device_id`, or the default device
    pub fn open(device_id_filter: Option<&str>) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = match device_id_filter {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| AudioError::Devices(e.to_string()))?
                .find(|d| d.name().map(|n| device_id(&n) == wanted).unwrap_or(false))
                .ok_or(AudioError::DeviceNotFound)?,
            None => host
                .default_output_device()
                .ok_or(AudioError::DeviceNotFound)?,
        };

        Self::with_device(device)
    }

    fn with_device(device: Device) -> Result<Self, AudioError> {
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::StreamConfigError(e.to_string()))?;

        let sample_format = default_config.sample_format();
        let stream_config: StreamConfig = default_config.config();

        info!(
            "Audio device: {} channels, {} Hz, {:?}",
            stream_config.channels, stream_config.sample_rate.0, sample_format
        );

        let frames_played = Arc::new(AtomicU64::new(0));
        let voice: Arc<Mutex<Option<Voice>>> = Arc::new(Mutex::new(None));
        let volume = Arc::new(AtomicU32::new(10000));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(
                &device,
                &stream_config,
                frames_played.clone(),
                voice.clone(),
                volume.clone(),
            )?,
            SampleFormat::I16 => build_stream::<i16>(
                &device,
                &stream_config,
                frames_played.clone(),
                voice.clone(),
                volume.clone(),
            )?,
            SampleFormat::U16 => build_stream::<u16>(
                &device,
                &stream_config,
                frames_played.clone(),
                voice.clone(),
                volume.clone(),
            )?,
            other => return Err(AudioError::UnsupportedSampleFormat(format!("{:?}", other))),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            frames_played,
            voice,
            volume,
            clips: HashMap::new(),
        })
    }

    /// Output gain, clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store((volume.clamp(0.0, 1.0) * 10000.0) as u32, Ordering::Relaxed);
    }

    fn set_voice(&self, voice: Option<Voice>) {
        match self.voice.lock() {
            Ok(mut current) => *current = voice,
            Err(poisoned) => *poisoned.into_inner() = voice,
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    frames_played: Arc<AtomicU64>,
    voice: Arc<Mutex<Option<Voice>>>,
    volume: Arc<AtomicU32>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let vol = volume.load(Ordering::Relaxed) as f32 / 10000.0;

                // Never block the audio thread; a contended lock renders one buffer of silence
                match voice.try_lock() {
                    Ok(mut guard) => match guard.as_mut() {
                        Some(v) => {
                            for out in data.iter_mut() {
                                let sample = v.samples.get(v.position).copied().unwrap_or(0.0);
                                if v.position < v.samples.len() {
                                    v.position += 1;
                                }
                                *out = T::from_sample(sample * vol);
                            }
                        }
                        None => data.fill(T::EQUILIBRIUM),
                    },
                    Err(_) => data.fill(T::EQUILIBRIUM),
                }

                frames_played.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
            },
            |err| {
                error!("Audio stream error: {:?}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

impl AudioOutput for CpalAudioOutput {
    fn clock(&self) -> Option<ClockReading> {
        let frames = self.frames_played.load(Ordering::Relaxed);
        if frames == 0 {
            return None;
        }
        Some(ClockReading::new(
            self.epoch,
            frames as f64 / self.sample_rate as f64,
        ))
    }

    fn has_clip(&self, generation_id: &str) -> bool {
        self.clips.contains_key(generation_id)
    }

    fn load_clip(&mut self, generation_id: &str, clip: DecodedClip) {
        let samples = to_device_format(&clip, self.sample_rate, self.channels);
        self.clips
            .insert(generation_id.to_string(), Arc::new(samples));
    }

    fn play_clip(&mut self, generation_id: &str, offset_ms: f64) {
        let Some(samples) = self.clips.get(generation_id).cloned() else {
            warn!("Clip {} not loaded, playing silence", generation_id);
            self.set_voice(None);
            return;
        };

        let offset_frames = (offset_ms.max(0.0) / 1000.0 * self.sample_rate as f64) as usize;
        self.set_voice(Some(Voice {
            samples,
            position: offset_frames * self.channels as usize,
        }));
    }

    fn stop(&mut self) {
        self.set_voice(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_is_stable_slug() {
        assert_eq!(device_id("MacBook Pro Speakers"), "device_macbook_pro_speakers");
        assert_eq!(device_id("default"), "device_default");
    }
}
