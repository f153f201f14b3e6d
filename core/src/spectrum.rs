use crate::error::{ApcpError, Result};
use crate::plan::FrequencyRange;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Dominant tone inside a frequency range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frequency: f32,
    pub magnitude: f32,
}

/// Magnitude spectrum of one segment over the non-negative frequency bins
#[derive(Debug, Clone)]
pub struct Spectrum<'a> {
    frequencies: &'a [f32],
    magnitudes: Vec<f32>,
}

impl<'a> Spectrum<'a> {
    pub fn frequencies(&self) -> &[f32] {
        self.frequencies
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Strongest bin inside `range`, or `None` when no bin falls in it.
    /// Ties go to the lowest frequency.
    pub fn peak_in(&self, range: FrequencyRange) -> Option<Peak> {
        let mut best: Option<Peak> = None;
        for (&frequency, &magnitude) in self.frequencies.iter().zip(self.magnitudes.iter()) {
            if !range.contains(frequency) {
                continue;
            }
            let stronger = match best {
                Some(peak) => magnitude > peak.magnitude,
                None => true,
            };
            if stronger {
                best = Some(Peak {
                    frequency,
                    magnitude,
                });
            }
        }
        best
    }
}

/// Hann-windowed FFT analysis at a fixed transform size.
///
/// Segments shorter than the transform are zero-padded; longer ones are cut
/// to the first `fft_size` samples. Only the `fft_size / 2` bins from DC up
/// to (excluding) Nyquist are reported.
pub struct SpectralAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    fft_size: usize,
    sample_rate: u32,
    bin_frequencies: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32, fft_size: usize) -> Result<Self> {
        if fft_size < 2 {
            return Err(ApcpError::InvalidConfig(format!(
                "fft_size must be at least 2, got {}",
                fft_size
            )));
        }
        if sample_rate == 0 {
            return Err(ApcpError::InvalidConfig("sample_rate must be positive".into()));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let resolution = sample_rate as f32 / fft_size as f32;
        let bin_frequencies = (0..fft_size / 2).map(|k| k as f32 * resolution).collect();

        Ok(Self {
            fft,
            fft_size,
            sample_rate,
            bin_frequencies,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Hz between adjacent bins
    pub fn resolution(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    pub fn spectrum(&self, samples: &[f32]) -> Result<Spectrum<'_>> {
        let used = samples.len().min(self.fft_size);
        let window = hann_window(used);

        let mut input = self.fft.make_input_vec();
        for (slot, (&sample, &weight)) in input.iter_mut().zip(samples.iter().zip(window.iter())) {
            *slot = sample * weight;
        }

        let mut output = self.fft.make_output_vec();
        self.fft
            .process(&mut input, &mut output)
            .map_err(|e| ApcpError::FftError(format!("forward transform failed: {:?}", e)))?;

        let magnitudes = output
            .iter()
            .take(self.bin_frequencies.len())
            .map(|c| c.norm())
            .collect();

        Ok(Spectrum {
            frequencies: &self.bin_frequencies,
            magnitudes,
        })
    }

    /// Dominant frequency and its magnitude inside `range`
    pub fn analyze(&self, samples: &[f32], range: FrequencyRange) -> Result<Option<Peak>> {
        Ok(self.spectrum(samples)?.peak_in(range))
    }
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("fft_size", &self.fft_size)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Symmetric Hann window of length `len`
pub fn hann_window(len: usize) -> Vec<f32> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f32;
            (0..len)
                .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / denom).cos())
                .collect()
        }
    }
}
