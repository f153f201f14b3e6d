use crate::config::{check_plan_parameters, ProtocolConfig};
use crate::error::Result;
use std::collections::HashMap;
use std::fmt;

// Frequency layout
//
//   START  END | ch0: 0..0  0..1  ...  1..1  SEP | ch1: 0..0  ...  SEP | ...
//
// Every tone sits on the grid `starting_frequency + k * freq_steps`. Ranges
// extend half a step beyond the outermost tone of their group, so adjacent
// groups meet at a guard-band midpoint. Ranges are half-open to keep that
// shared midpoint in exactly one group.

/// One channel symbol: a `bits_per_tone`-bit value, or the separator sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Bits(u16),
    Separate,
}

/// Half-open frequency interval `[low, high)` in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub low: f32,
    pub high: f32,
}

impl FrequencyRange {
    pub fn contains(&self, frequency: f32) -> bool {
        frequency >= self.low && frequency < self.high
    }

    pub fn overlaps(&self, other: &FrequencyRange) -> bool {
        self.low < other.high && other.low < self.high
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) Hz", self.low, self.high)
    }
}

/// Symbol/frequency tables for one channel
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    index: usize,
    bits_per_tone: usize,
    /// Indexed by symbol value; the last entry is the separator
    tones: Vec<u32>,
    lookup: HashMap<u32, Symbol>,
    range: FrequencyRange,
}

impl ChannelPlan {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn range(&self) -> FrequencyRange {
        self.range
    }

    /// All tones of the channel in ascending order, separator last
    pub fn tones(&self) -> &[u32] {
        &self.tones
    }

    pub fn separate_frequency(&self) -> u32 {
        self.tones[self.tones.len() - 1]
    }

    /// Forward map. Data symbols wider than the channel fall outside the table
    /// and yield `None`.
    pub fn frequency(&self, symbol: Symbol) -> Option<u32> {
        match symbol {
            Symbol::Separate => Some(self.separate_frequency()),
            Symbol::Bits(value) => {
                let value = value as usize;
                if value < self.tones.len() - 1 {
                    Some(self.tones[value])
                } else {
                    None
                }
            }
        }
    }

    /// Inverse map
    pub fn symbol(&self, frequency: u32) -> Option<Symbol> {
        self.lookup.get(&frequency).copied()
    }

    pub fn bits_per_tone(&self) -> usize {
        self.bits_per_tone
    }
}

/// Immutable frequency assignment for the control band and every channel.
#[derive(Debug, Clone)]
pub struct FrequencyPlan {
    start_freq: u32,
    freq_steps: u32,
    bits_per_tone: usize,
    control_range: FrequencyRange,
    channels: Vec<ChannelPlan>,
}

impl FrequencyPlan {
    pub fn new(
        num_channels: usize,
        bits_per_tone: usize,
        freq_steps: u32,
        starting_frequency: u32,
    ) -> Result<Self> {
        check_plan_parameters(num_channels, bits_per_tone, freq_steps, starting_frequency)?;

        let half_step = freq_steps as f32 / 2.0;
        let start_freq = starting_frequency;
        let end_freq = start_freq + freq_steps;
        let control_range = FrequencyRange {
            low: start_freq as f32 - half_step,
            high: end_freq as f32 + half_step,
        };

        let data_symbols = 1usize << bits_per_tone;
        let mut last_assigned = end_freq;
        let mut channels = Vec::with_capacity(num_channels);

        for index in 0..num_channels {
            let mut tones = Vec::with_capacity(data_symbols + 1);
            let mut lookup = HashMap::with_capacity(data_symbols + 1);

            for value in 0..=data_symbols {
                last_assigned += freq_steps;
                let symbol = if value == data_symbols {
                    Symbol::Separate
                } else {
                    Symbol::Bits(value as u16)
                };
                tones.push(last_assigned);
                lookup.insert(last_assigned, symbol);
            }

            let range = FrequencyRange {
                low: tones[0] as f32 - half_step,
                high: last_assigned as f32 + half_step,
            };
            channels.push(ChannelPlan {
                index,
                bits_per_tone,
                tones,
                lookup,
                range,
            });
        }

        log::debug!(
            "Frequency plan: {} channels x {} tones, {} Hz to {} Hz",
            num_channels,
            data_symbols + 1,
            start_freq,
            last_assigned
        );

        Ok(Self {
            start_freq,
            freq_steps,
            bits_per_tone,
            control_range,
            channels,
        })
    }

    pub fn from_config(config: &ProtocolConfig) -> Result<Self> {
        Self::new(
            config.num_channels,
            config.bits_per_tone,
            config.freq_steps,
            config.starting_frequency,
        )
    }

    /// Whether this plan was built from the plan parameters of `config`
    pub fn matches_config(&self, config: &ProtocolConfig) -> bool {
        self.num_channels() == config.num_channels
            && self.bits_per_tone == config.bits_per_tone
            && self.freq_steps == config.freq_steps
            && self.start_freq == config.starting_frequency
    }

    pub fn start_frequency(&self) -> u32 {
        self.start_freq
    }

    pub fn end_frequency(&self) -> u32 {
        self.start_freq + self.freq_steps
    }

    pub fn freq_steps(&self) -> u32 {
        self.freq_steps
    }

    pub fn bits_per_tone(&self) -> usize {
        self.bits_per_tone
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn control_range(&self) -> FrequencyRange {
        self.control_range
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelPlan> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> &[ChannelPlan] {
        &self.channels
    }

    /// Control range first, then one range per channel
    pub fn ranges(&self) -> Vec<FrequencyRange> {
        std::iter::once(self.control_range)
            .chain(self.channels.iter().map(|c| c.range))
            .collect()
    }

    pub fn highest_frequency(&self) -> u32 {
        self.channels
            .last()
            .map(|c| c.separate_frequency())
            .unwrap_or_else(|| self.end_frequency())
    }

    /// Round a measured frequency to the nearest tone on the plan's grid.
    pub fn snap(&self, frequency: f32) -> u32 {
        let step = self.freq_steps as f32;
        let k = ((frequency - self.start_freq as f32) / step).round();
        let snapped = self.start_freq as f32 + k * step;
        snapped.max(0.0) as u32
    }
}
