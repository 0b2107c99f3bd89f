use crate::playback::clock::ClockReading;

/// Decoded PCM for one generation, interleaved f32
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Audio sink the playback controller drives
///
/// Implementations own decode/mix/output. `clock` is `None` until output is actually
/// running; the controller anchors story time to the first reading it gets.
pub trait AudioOutput {
    fn clock(&self) -> Option<ClockReading>;
    fn has_clip(&self, generation_id: &str) -> bool;
    fn load_clip(&mut self, generation_id: &str, clip: DecodedClip);
    /// Start `generation_id` at `offset_ms` into the clip, replacing whatever is playing
    fn play_clip(&mut self, generation_id: &str, offset_ms: f64);
    /// Silence output; the clock keeps running
    fn stop(&mut self);
}
