use crate::error::{ApcpError, Result};
use serde::Deserialize;

/// Largest symbol width a channel can carry.
pub const MAX_BITS_PER_TONE: usize = 16;

/// Protocol parameters shared by sender and receiver.
///
/// Both ends must agree on every field. Keys follow the `config.json` layout
/// (snake_case); missing keys fall back to [`ProtocolConfig::default`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// PCM sample rate used for generation and capture
    pub sample_rate: u32,
    /// Seconds per rendered tone
    pub tone_duration: f32,
    /// Seconds per captured analysis segment
    pub duration_per_sample: f32,
    /// FFT peak magnitude below which a control detection is treated as noise
    pub min_magnitude: f32,
    /// Frames per read from the audio source
    pub chunk_size: usize,
    /// Transform size used by the spectral analyzer
    pub fft_size: usize,
    /// Amplitude applied to every rendered tone
    pub volume: f32,
    pub num_channels: usize,
    pub bits_per_tone: usize,
    /// Spacing between adjacent tones in Hz
    pub freq_steps: u32,
    /// Frequency of the start control tone in Hz
    pub starting_frequency: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            tone_duration: 0.2,
            duration_per_sample: 0.1,
            min_magnitude: 50.0,
            chunk_size: 960,
            fft_size: 8192,
            volume: 0.5,
            num_channels: 4,
            bits_per_tone: 2,
            freq_steps: 100,
            starting_frequency: 1000,
        }
    }
}

impl ProtocolConfig {
    /// Number of samples in one rendered tone
    pub fn tone_samples(&self) -> usize {
        (self.sample_rate as f32 * self.tone_duration).round() as usize
    }

    /// Number of chunk reads that make up one analysis segment
    pub fn chunks_per_segment(&self) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        let frames = (self.sample_rate as f32 * self.duration_per_sample).round() as usize;
        frames / self.chunk_size
    }

    /// Number of samples in one analysis segment (whole chunks only)
    pub fn segment_samples(&self) -> usize {
        self.chunks_per_segment() * self.chunk_size
    }

    /// Highest frequency the plan will assign for these parameters
    pub fn highest_frequency(&self) -> u64 {
        planned_highest_frequency(
            self.num_channels,
            self.bits_per_tone,
            self.freq_steps,
            self.starting_frequency,
        )
    }

    /// Check every field, naming the first offending one.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be positive"));
        }
        if !self.tone_duration.is_finite() || self.tone_duration <= 0.0 {
            return Err(invalid("tone_duration must be a positive number of seconds"));
        }
        if !self.duration_per_sample.is_finite() || self.duration_per_sample <= 0.0 {
            return Err(invalid("duration_per_sample must be a positive number of seconds"));
        }
        if self.tone_samples() == 0 {
            return Err(invalid("tone_duration is shorter than one sample"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be positive"));
        }
        if self.segment_samples() == 0 {
            return Err(invalid(format!(
                "duration_per_sample covers less than one chunk of {} frames",
                self.chunk_size
            )));
        }
        if self.fft_size < 2 {
            return Err(invalid("fft_size must be at least 2"));
        }
        if !self.volume.is_finite() || self.volume <= 0.0 || self.volume > 1.0 {
            return Err(invalid("volume must be in (0, 1]"));
        }
        if !self.min_magnitude.is_finite() || self.min_magnitude < 0.0 {
            return Err(invalid("min_magnitude must be a non-negative number"));
        }
        check_plan_parameters(
            self.num_channels,
            self.bits_per_tone,
            self.freq_steps,
            self.starting_frequency,
        )?;

        let nyquist = self.sample_rate as u64 / 2;
        let highest = self.highest_frequency();
        if highest >= nyquist {
            return Err(invalid(format!(
                "highest planned frequency {} Hz is at or above the Nyquist limit {} Hz",
                highest, nyquist
            )));
        }
        Ok(())
    }
}

/// Highest tone of a plan: START, END, then every channel's tones.
/// Saturates instead of overflowing.
pub(crate) fn planned_highest_frequency(
    num_channels: usize,
    bits_per_tone: usize,
    freq_steps: u32,
    starting_frequency: u32,
) -> u64 {
    let tones_per_channel = (1u64 << bits_per_tone.min(MAX_BITS_PER_TONE)) + 1;
    let steps = (num_channels as u64)
        .saturating_mul(tones_per_channel)
        .saturating_add(1);
    u64::from(starting_frequency)
        .saturating_add(steps.saturating_mul(u64::from(freq_steps)))
}

/// Shared checks for the frequency plan parameters. Every planned tone must
/// be representable in Hz as a `u32`.
pub(crate) fn check_plan_parameters(
    num_channels: usize,
    bits_per_tone: usize,
    freq_steps: u32,
    starting_frequency: u32,
) -> Result<()> {
    if num_channels == 0 {
        return Err(invalid("num_channels must be positive"));
    }
    if bits_per_tone == 0 || bits_per_tone > MAX_BITS_PER_TONE {
        return Err(invalid(format!(
            "bits_per_tone must be between 1 and {}",
            MAX_BITS_PER_TONE
        )));
    }
    if freq_steps == 0 {
        return Err(invalid("freq_steps must be positive"));
    }
    let highest =
        planned_highest_frequency(num_channels, bits_per_tone, freq_steps, starting_frequency);
    if highest > u64::from(u32::MAX) {
        return Err(invalid(format!(
            "highest planned frequency {} Hz does not fit in a u32",
            highest
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ApcpError {
    ApcpError::InvalidConfig(message.into())
}
