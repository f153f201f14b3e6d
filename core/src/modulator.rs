use crate::audio::AudioSink;
use crate::config::ProtocolConfig;
use crate::error::{ApcpError, Result};
use crate::plan::{ChannelPlan, FrequencyPlan, Symbol};
use std::f32::consts::PI;
use std::sync::Arc;

/// Bits per transmitted character
pub const BITS_PER_CHAR: usize = 8;

/// Convert text to its bit stream, eight bits per character, MSB first.
///
/// Every character must fit in a single byte (code points 0-255).
pub fn text_to_bits(text: &str) -> Result<Vec<bool>> {
    let mut bits = Vec::with_capacity(text.len() * BITS_PER_CHAR);
    for (position, character) in text.chars().enumerate() {
        let code = character as u32;
        if code > 0xFF {
            return Err(ApcpError::UnsupportedCharacter {
                character,
                position,
            });
        }
        for shift in (0..BITS_PER_CHAR).rev() {
            bits.push((code >> shift) & 1 == 1);
        }
    }
    Ok(bits)
}

/// Group bits into `bits_per_tone`-wide symbol values and hand them out to
/// channels in consecutive runs.
///
/// With `n` groups and `c` channels every channel gets `n / c` groups and the
/// first `n % c` channels one more.
pub fn split_channels(
    bits: &[bool],
    bits_per_tone: usize,
    num_channels: usize,
) -> Result<Vec<Vec<u16>>> {
    if bits_per_tone == 0 || num_channels == 0 {
        return Err(ApcpError::InvalidConfig(
            "bits_per_tone and num_channels must be positive".into(),
        ));
    }
    if bits.len() % bits_per_tone != 0 {
        return Err(ApcpError::Misaligned {
            bits: bits.len(),
            bits_per_tone,
        });
    }

    let groups: Vec<u16> = bits
        .chunks(bits_per_tone)
        .map(|chunk| chunk.iter().fold(0u16, |acc, &bit| (acc << 1) | bit as u16))
        .collect();

    let base = groups.len() / num_channels;
    let extra = groups.len() % num_channels;

    let mut channels = Vec::with_capacity(num_channels);
    let mut offset = 0;
    for channel in 0..num_channels {
        let count = base + usize::from(channel < extra);
        channels.push(groups[offset..offset + count].to_vec());
        offset += count;
    }
    Ok(channels)
}

/// Map a channel's symbols to tone frequencies, putting the separator tone
/// between two equal neighbours.
pub fn channel_frequencies(channel: &ChannelPlan, symbols: &[u16]) -> Result<Vec<u32>> {
    let separate = channel.separate_frequency();
    let mut frequencies = Vec::with_capacity(symbols.len());
    for &value in symbols {
        let frequency = channel.frequency(Symbol::Bits(value)).ok_or_else(|| {
            ApcpError::InvalidConfig(format!(
                "symbol {} does not fit in {} bits",
                value,
                channel.bits_per_tone()
            ))
        })?;
        if frequencies.last() == Some(&frequency) {
            frequencies.push(separate);
        }
        frequencies.push(frequency);
    }
    Ok(frequencies)
}

/// Text to multi-channel tone frames.
///
/// Frame layout:
/// ```text
/// START | ch0 tones + ch1 tones + ... (summed, peak-normalized) | END
/// ```
/// Shorter channels are padded with their separator tone so every channel
/// spans the same number of samples.
pub struct Modulator {
    plan: Arc<FrequencyPlan>,
    sample_rate: u32,
    tone_samples: usize,
    volume: f32,
}

impl Modulator {
    pub fn new(config: &ProtocolConfig, plan: Arc<FrequencyPlan>) -> Result<Self> {
        config.validate()?;
        if !plan.matches_config(config) {
            return Err(ApcpError::InvalidConfig(
                "frequency plan was not built from this configuration".into(),
            ));
        }
        Ok(Self {
            plan,
            sample_rate: config.sample_rate,
            tone_samples: config.tone_samples(),
            volume: config.volume,
        })
    }

    pub fn plan(&self) -> &FrequencyPlan {
        &self.plan
    }

    pub fn tone_samples(&self) -> usize {
        self.tone_samples
    }

    /// Tone sequence for every channel, separators included, before padding
    pub fn channel_tones(&self, text: &str) -> Result<Vec<Vec<u32>>> {
        let bits = text_to_bits(text)?;
        let chunks = split_channels(&bits, self.plan.bits_per_tone(), self.plan.num_channels())?;
        self.plan
            .channels()
            .iter()
            .zip(chunks.iter())
            .map(|(channel, symbols)| channel_frequencies(channel, symbols))
            .collect()
    }

    /// Pure sine at `frequency` lasting one tone
    pub fn tone(&self, frequency: u32) -> Vec<f32> {
        let angular = 2.0 * PI * frequency as f32 / self.sample_rate as f32;
        (0..self.tone_samples)
            .map(|i| self.volume * (angular * i as f32).sin())
            .collect()
    }

    /// Tones back to back, no gaps
    pub fn render(&self, frequencies: &[u32]) -> Vec<f32> {
        let mut samples = Vec::with_capacity(frequencies.len() * self.tone_samples);
        for &frequency in frequencies {
            samples.extend(self.tone(frequency));
        }
        samples
    }

    /// Sum channel waveforms after padding each with its own separator tone,
    /// then scale the peak to 1.
    pub fn layer(&self, tones: &[Vec<u32>]) -> Vec<f32> {
        let waveforms: Vec<Vec<f32>> = tones.iter().map(|t| self.render(t)).collect();
        let max_len = waveforms.iter().map(Vec::len).max().unwrap_or(0);

        let mut combined = vec![0.0f32; max_len];
        for (channel, waveform) in self.plan.channels().iter().zip(waveforms.iter()) {
            for (slot, &sample) in combined.iter_mut().zip(waveform.iter()) {
                *slot += sample;
            }

            let pad_len = max_len - waveform.len();
            if pad_len > 0 {
                let separator = self.tone(channel.separate_frequency());
                let padding = separator.iter().cycle().take(pad_len);
                for (slot, &sample) in combined[waveform.len()..].iter_mut().zip(padding) {
                    *slot += sample;
                }
            }
        }

        let peak = combined.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak > 0.0 {
            for sample in combined.iter_mut() {
                *sample /= peak;
            }
        }
        combined
    }

    /// Complete frame for `text`
    pub fn modulate(&self, text: &str) -> Result<Vec<f32>> {
        let tones = self.channel_tones(text)?;
        let body = self.layer(&tones);

        let mut samples = Vec::with_capacity(body.len() + 2 * self.tone_samples);
        samples.extend(self.tone(self.plan.start_frequency()));
        samples.extend_from_slice(&body);
        samples.extend(self.tone(self.plan.end_frequency()));

        log::debug!(
            "Modulated {} chars into {} tone slots ({} samples)",
            text.chars().count(),
            body.len() / self.tone_samples.max(1),
            samples.len()
        );
        Ok(samples)
    }

    /// Modulate `text` and hand the frame to `sink`. Nothing is written when
    /// the text cannot be encoded.
    pub fn encode<S: AudioSink>(&self, text: &str, mut sink: S) -> Result<usize> {
        let samples = self.modulate(text)?;
        sink.write(&samples, self.sample_rate)?;
        Ok(samples.len())
    }
}
