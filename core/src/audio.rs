//! Boundaries between the protocol and whatever carries the audio.
//!
//! Samples are mono `f32` in [-1, 1]. Converting to a device or container
//! format is the job of the implementation on the other side of the trait.

use crate::error::Result;

/// Consumer of generated audio (WAV writer, speaker, test buffer)
pub trait AudioSink {
    fn write(&mut self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

/// Producer of captured audio (microphone, WAV reader, test buffer)
pub trait AudioSource {
    /// Read up to `frames` samples. A live source blocks until they are
    /// available; a finite source returns `Ok(None)` once exhausted. A short
    /// final block is allowed.
    fn read_chunk(&mut self, frames: usize) -> Result<Option<Vec<f32>>>;
}

impl<T: AudioSink + ?Sized> AudioSink for &mut T {
    fn write(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        (**self).write(samples, sample_rate)
    }
}

impl<T: AudioSource + ?Sized> AudioSource for &mut T {
    fn read_chunk(&mut self, frames: usize) -> Result<Option<Vec<f32>>> {
        (**self).read_chunk(frames)
    }
}

/// Finite source over an in-memory recording
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    samples: Vec<f32>,
    position: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }

    /// Samples not yet read
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for MemorySource {
    fn read_chunk(&mut self, frames: usize) -> Result<Option<Vec<f32>>> {
        if self.position >= self.samples.len() || frames == 0 {
            return Ok(None);
        }
        let end = (self.position + frames).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}

/// Sink that keeps everything written to it
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    samples: Vec<f32>,
    sample_rate: Option<u32>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        self.sample_rate = Some(sample_rate);
        self.samples.extend_from_slice(samples);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_chunks() {
        let mut source = MemorySource::new((0..10).map(|i| i as f32).collect());
        assert_eq!(source.read_chunk(4).unwrap(), Some(vec![0.0, 1.0, 2.0, 3.0]));
        assert_eq!(source.remaining(), 6);
        assert_eq!(source.read_chunk(4).unwrap(), Some(vec![4.0, 5.0, 6.0, 7.0]));
        // Short final block
        assert_eq!(source.read_chunk(4).unwrap(), Some(vec![8.0, 9.0]));
        assert_eq!(source.read_chunk(4).unwrap(), None);
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        sink.write(&[0.1, 0.2], 8000).unwrap();
        sink.write(&[0.3], 8000).unwrap();
        assert_eq!(sink.samples(), &[0.1, 0.2, 0.3]);
        assert_eq!(sink.sample_rate(), Some(8000));
    }

    #[test]
    fn test_mutable_reference_forwards() {
        fn fill<S: AudioSink>(mut sink: S) {
            sink.write(&[1.0], 16000).unwrap();
        }

        let mut sink = MemorySink::new();
        fill(&mut sink);
        assert_eq!(sink.into_samples(), vec![1.0]);
    }
}
