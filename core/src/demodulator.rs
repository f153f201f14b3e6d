use crate::audio::AudioSource;
use crate::config::ProtocolConfig;
use crate::error::{ApcpError, Result};
use crate::modulator::BITS_PER_CHAR;
use crate::plan::{FrequencyPlan, Symbol};
use crate::spectrum::SpectralAnalyzer;
use std::sync::Arc;

/// Progress of the control-tone state machine for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for a start tone
    Idle,
    /// Start tone heard, no message audio yet
    Armed,
    /// Collecting message segments
    Capturing,
    /// End tone heard
    Done,
}

/// Control-band detection above the magnitude threshold, snapped to the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTone {
    Start,
    End,
    Other(u32),
}

/// Drop separator tones and collapse runs of one frequency.
///
/// A value is kept when it differs from the value received just before it, so
/// `A SEP A` keeps both `A`s while `A A` (one tone spanning two segments)
/// keeps one.
pub fn filter_frequencies(frequencies: &[u32], separate: u32) -> Vec<u32> {
    frequencies
        .iter()
        .enumerate()
        .filter(|&(i, &f)| f != separate && (i == 0 || frequencies[i - 1] != f))
        .map(|(_, &f)| f)
        .collect()
}

/// Regroup bits into 8-bit characters. Bits that do not fill a whole
/// character are dropped.
pub fn bits_to_text(bits: &[bool]) -> String {
    let remainder = bits.len() % BITS_PER_CHAR;
    if remainder != 0 {
        log::warn!("Dropping {} trailing bits that do not form a character", remainder);
    }
    bits.chunks_exact(BITS_PER_CHAR)
        .map(|byte| {
            let code = byte.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8);
            char::from(code)
        })
        .collect()
}

/// Recovers text from captured audio.
///
/// Audio is read one segment at a time. The control band decides where a
/// frame starts and ends; the segments in between are analyzed once more per
/// channel after the end tone arrives.
pub struct Demodulator {
    plan: Arc<FrequencyPlan>,
    analyzer: SpectralAnalyzer,
    min_magnitude: f32,
    chunk_size: usize,
    segment_samples: usize,
}

impl Demodulator {
    pub fn new(config: &ProtocolConfig, plan: Arc<FrequencyPlan>) -> Result<Self> {
        config.validate()?;
        if !plan.matches_config(config) {
            return Err(ApcpError::InvalidConfig(
                "frequency plan was not built from this configuration".into(),
            ));
        }
        Ok(Self {
            plan,
            analyzer: SpectralAnalyzer::new(config.sample_rate, config.fft_size)?,
            min_magnitude: config.min_magnitude,
            chunk_size: config.chunk_size,
            segment_samples: config.segment_samples(),
        })
    }

    pub fn plan(&self) -> &FrequencyPlan {
        &self.plan
    }

    pub fn analyzer(&self) -> &SpectralAnalyzer {
        &self.analyzer
    }

    pub fn segment_samples(&self) -> usize {
        self.segment_samples
    }

    /// Read one analysis segment as a series of chunk reads. Returns `None`
    /// when the source runs out; a partial segment is discarded.
    pub fn read_segment<S: AudioSource>(&self, source: &mut S) -> Result<Option<Vec<f32>>> {
        let mut segment = Vec::with_capacity(self.segment_samples);
        while segment.len() < self.segment_samples {
            let wanted = (self.segment_samples - segment.len()).min(self.chunk_size);
            match source.read_chunk(wanted)? {
                Some(chunk) if !chunk.is_empty() => segment.extend_from_slice(&chunk),
                _ => {
                    if !segment.is_empty() {
                        log::trace!("Discarding partial segment of {} samples", segment.len());
                    }
                    return Ok(None);
                }
            }
        }
        segment.truncate(self.segment_samples);
        Ok(Some(segment))
    }

    /// Classify the control band of a segment. Peaks below `min_magnitude`
    /// are noise and yield `None`.
    pub fn detect_control(&self, segment: &[f32]) -> Result<Option<ControlTone>> {
        let peak = self.analyzer.analyze(segment, self.plan.control_range())?;
        Ok(peak
            .filter(|p| p.magnitude >= self.min_magnitude)
            .map(|p| {
                let frequency = self.plan.snap(p.frequency);
                if frequency == self.plan.start_frequency() {
                    ControlTone::Start
                } else if frequency == self.plan.end_frequency() {
                    ControlTone::End
                } else {
                    ControlTone::Other(frequency)
                }
            }))
    }

    pub fn detector(&self) -> FrameDetector<'_> {
        FrameDetector {
            demodulator: self,
            state: DetectorState::Idle,
            segments: Vec::new(),
        }
    }

    /// Block until one complete frame has been captured and return its
    /// message segments.
    pub fn capture<S: AudioSource>(&self, source: &mut S) -> Result<Vec<Vec<f32>>> {
        let mut detector = self.detector();
        loop {
            let segment = match self.read_segment(source)? {
                Some(segment) => segment,
                None => return Err(detector.exhausted_error()),
            };
            if detector.push(segment)? == DetectorState::Done {
                return Ok(detector.take_frame());
            }
        }
    }

    /// Snapped dominant frequency per channel for every segment. A segment
    /// without any bin in a channel's range adds nothing to that channel.
    pub fn channel_frequencies(&self, segments: &[Vec<f32>]) -> Result<Vec<Vec<u32>>> {
        let mut channels = vec![Vec::with_capacity(segments.len()); self.plan.num_channels()];
        for segment in segments {
            let spectrum = self.analyzer.spectrum(segment)?;
            for (channel, received) in self.plan.channels().iter().zip(channels.iter_mut()) {
                if let Some(peak) = spectrum.peak_in(channel.range()) {
                    received.push(self.plan.snap(peak.frequency));
                }
            }
        }
        Ok(channels)
    }

    /// Look filtered frequencies up in each channel's inverse table and
    /// concatenate the symbol bits channel by channel.
    pub fn frequencies_to_bits(&self, channels: &[Vec<u32>]) -> Result<Vec<bool>> {
        let width = self.plan.bits_per_tone();
        let mut bits = Vec::new();
        for (channel, frequencies) in self.plan.channels().iter().zip(channels.iter()) {
            for &frequency in frequencies {
                match channel.symbol(frequency) {
                    Some(Symbol::Bits(value)) => {
                        for shift in (0..width).rev() {
                            bits.push((value >> shift) & 1 == 1);
                        }
                    }
                    Some(Symbol::Separate) => {}
                    None => {
                        return Err(ApcpError::UnknownTone {
                            channel: channel.index(),
                            frequency,
                        })
                    }
                }
            }
        }
        Ok(bits)
    }

    /// Decode the message segments of one frame
    pub fn decode_segments(&self, segments: &[Vec<f32>]) -> Result<String> {
        let received = self.channel_frequencies(segments)?;
        let filtered: Vec<Vec<u32>> = self
            .plan
            .channels()
            .iter()
            .zip(received.iter())
            .map(|(channel, frequencies)| {
                filter_frequencies(frequencies, channel.separate_frequency())
            })
            .collect();

        let bits = self.frequencies_to_bits(&filtered)?;
        let text = bits_to_text(&bits);
        log::debug!(
            "Decoded {} segments into {} symbols, {} chars",
            segments.len(),
            filtered.iter().map(Vec::len).sum::<usize>(),
            text.chars().count()
        );
        Ok(text)
    }

    /// Listen for the first frame on `source` and return its text.
    ///
    /// A live source blocks here until a frame arrives; there is no timeout.
    pub fn decode<S: AudioSource>(&self, mut source: S) -> Result<String> {
        let segments = self.capture(&mut source)?;
        self.decode_segments(&segments)
    }

    /// Decode every frame on `source`, one item per end tone.
    pub fn stream<S: AudioSource>(&self, source: S) -> MessageStream<'_, S> {
        MessageStream {
            demodulator: self,
            source,
            detector: self.detector(),
            finished: false,
        }
    }
}

/// Control-tone state machine, fed one segment at a time.
///
/// Any control detection other than the one that moves the machine forward
/// is treated as control audio and not stored, so a start tone spanning
/// several segments is consumed whole.
pub struct FrameDetector<'a> {
    demodulator: &'a Demodulator,
    state: DetectorState,
    segments: Vec<Vec<f32>>,
}

impl<'a> FrameDetector<'a> {
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Message segments collected so far
    pub fn captured(&self) -> usize {
        self.segments.len()
    }

    /// Advance with the next segment. Segments pushed after `Done` are
    /// ignored until the frame is taken.
    pub fn push(&mut self, segment: Vec<f32>) -> Result<DetectorState> {
        if self.state == DetectorState::Done {
            return Ok(self.state);
        }

        let control = self.demodulator.detect_control(&segment)?;
        let next = match (self.state, control) {
            (DetectorState::Idle, Some(ControlTone::Start)) => DetectorState::Armed,
            (DetectorState::Idle, _) => DetectorState::Idle,
            (_, Some(ControlTone::End)) => DetectorState::Done,
            (state, Some(tone)) => {
                log::trace!("Skipping control segment {:?}", tone);
                state
            }
            (_, None) => {
                self.segments.push(segment);
                DetectorState::Capturing
            }
        };

        if next != self.state {
            log::debug!(
                "Frame detector {:?} -> {:?} ({} segments captured)",
                self.state,
                next,
                self.segments.len()
            );
        }
        self.state = next;
        Ok(next)
    }

    /// Hand over the captured segments and start listening for a new frame
    pub fn take_frame(&mut self) -> Vec<Vec<f32>> {
        self.state = DetectorState::Idle;
        std::mem::take(&mut self.segments)
    }

    /// Error to report when the source ends in the current state
    fn exhausted_error(&self) -> ApcpError {
        match self.state {
            DetectorState::Idle => ApcpError::StartToneNotFound,
            _ => ApcpError::EndToneNotFound,
        }
    }
}

/// Iterator over the frames of a source, built by [`Demodulator::stream`].
///
/// Each item is the decode of one frame. A frame that fails to decode yields
/// its error and listening continues. The iterator ends when the source does;
/// a frame cut off by the end of the source yields `EndToneNotFound` first.
pub struct MessageStream<'a, S> {
    demodulator: &'a Demodulator,
    source: S,
    detector: FrameDetector<'a>,
    finished: bool,
}

impl<'a, S: AudioSource> Iterator for MessageStream<'a, S> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let segment = match self.demodulator.read_segment(&mut self.source) {
                Ok(Some(segment)) => segment,
                Ok(None) => {
                    self.finished = true;
                    return match self.detector.state() {
                        DetectorState::Armed | DetectorState::Capturing => {
                            Some(Err(ApcpError::EndToneNotFound))
                        }
                        _ => None,
                    };
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            match self.detector.push(segment) {
                Ok(DetectorState::Done) => {
                    let frame = self.detector.take_frame();
                    return Some(self.demodulator.decode_segments(&frame));
                }
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
