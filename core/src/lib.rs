//! Acoustic text transmission over layered multi-tone channels
//!
//! A message is split across several frequency channels, each symbol sent as
//! a pure tone, and the whole frame bracketed by start/end control tones.
//! The receiver finds the control tones with an FFT over fixed-length
//! segments, then reads each channel's dominant tone per segment.

pub mod audio;
pub mod config;
pub mod demodulator;
pub mod error;
pub mod modulator;
pub mod plan;
pub mod spectrum;

pub use audio::{AudioSink, AudioSource, MemorySink, MemorySource};
pub use config::ProtocolConfig;
pub use demodulator::{
    bits_to_text, filter_frequencies, ControlTone, Demodulator, DetectorState, FrameDetector,
    MessageStream,
};
pub use error::{ApcpError, Result};
pub use modulator::{channel_frequencies, split_channels, text_to_bits, Modulator};
pub use plan::{ChannelPlan, FrequencyPlan, FrequencyRange, Symbol};
pub use spectrum::{Peak, SpectralAnalyzer, Spectrum};

use std::sync::Arc;

/// Modulator and demodulator sharing one frequency plan
pub struct Codec {
    pub plan: Arc<FrequencyPlan>,
    pub modulator: Modulator,
    pub demodulator: Demodulator,
}

impl Codec {
    /// Validate `config` and build both directions from it.
    pub fn new(config: &ProtocolConfig) -> Result<Self> {
        config.validate()?;
        let plan = Arc::new(FrequencyPlan::from_config(config)?);
        Ok(Self {
            modulator: Modulator::new(config, Arc::clone(&plan))?,
            demodulator: Demodulator::new(config, Arc::clone(&plan))?,
            plan,
        })
    }
}
