use crate::playback::output::DecodedClip;
use std::io::Cursor;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("No audio tracks found")]
    NoAudioTracks,
    #[error("Missing {0} in codec parameters")]
    MissingParameter(&'static str),
}

/// Decode a generated clip (WAV from the backend) into interleaved f32 PCM
pub fn decode_clip(audio_data: Vec<u8>) -> Result<DecodedClip, DecoderError> {
    let cursor = Cursor::new(audio_data);
    let media_source = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe().format(
        &hint,
        media_source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecoderError::NoAudioTracks)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecoderError::MissingParameter("sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or(DecoderError::MissingParameter("channels"))?
        .count() as u16;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecoderError::Symphonia(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecoderError::Symphonia(e)),
        };

        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, *audio_buf.spec());
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    debug!(
        "Decoded clip: {} samples, {} Hz, {} channels",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(DecodedClip {
        samples,
        sample_rate,
        channels,
    })
}

/// Nearest-sample resampling of interleaved audio
pub fn resample(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || channels == 0 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    let in_frames = samples.len() / channels;
    let ratio = to_rate as f64 / from_rate as f64;
    let out_frames = (in_frames as f64 * ratio) as usize;

    let mut resampled = Vec::with_capacity(out_frames * channels);
    for frame in 0..out_frames {
        let src_frame = ((frame as f64 / ratio) as usize).min(in_frames.saturating_sub(1));
        let base = src_frame * channels;
        resampled.extend_from_slice(&samples[base..base + channels]);
    }
    resampled
}

/// Map interleaved audio from `src_channels` to `dst_channels`
///
/// Extra destination channels repeat the last source channel; extra source channels
/// are dropped.
pub fn remap_channels(samples: &[f32], src_channels: u16, dst_channels: u16) -> Vec<f32> {
    if src_channels == dst_channels || src_channels == 0 {
        return samples.to_vec();
    }

    let src = src_channels as usize;
    let dst = dst_channels as usize;
    let frames = samples.len() / src;

    let mut remapped = Vec::with_capacity(frames * dst);
    for frame in 0..frames {
        for ch in 0..dst {
            remapped.push(samples[frame * src + ch.min(src - 1)]);
        }
    }
    remapped
}

/// Convert a decoded clip to the output device's rate and channel count
pub fn to_device_format(clip: &DecodedClip, sample_rate: u32, channels: u16) -> Vec<f32> {
    let resampled = resample(&clip.samples, clip.channels, clip.sample_rate, sample_rate);
    remap_channels(&resampled, clip.channels, channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wav_bytes;

    #[test]
    fn test_decode_mono_wav() {
        let pcm: Vec<i16> = vec![0, 16384, -16384, 32767];
        let clip = decode_clip(wav_bytes(8000, 1, &pcm)).unwrap();

        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.channels, 1);
        assert_eq!(clip.samples.len(), 4);
        assert!((clip.samples[1] - 0.5).abs() < 1e-3);
        assert!((clip.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stereo_duration() {
        let pcm = vec![0i16; 2 * 4000];
        let clip = decode_clip(wav_bytes(8000, 2, &pcm)).unwrap();
        assert_eq!(clip.frames(), 4000);
        assert_eq!(clip.duration_secs(), 0.5);
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode_clip(b"definitely not audio".to_vec()).is_err());
    }

    #[test]
    fn test_resample_doubles_frames() {
        let stereo = vec![0.1, 0.2, 0.3, 0.4];
        let out = resample(&stereo, 2, 100, 200);
        assert_eq!(out, vec![0.1, 0.2, 0.1, 0.2, 0.3, 0.4, 0.3, 0.4]);
    }

    #[test]
    fn test_remap_mono_to_stereo_and_back() {
        let mono = vec![0.1, 0.2];
        let stereo = remap_channels(&mono, 1, 2);
        assert_eq!(stereo, vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(remap_channels(&stereo, 2, 1), mono);
    }
}
