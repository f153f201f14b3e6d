//! WAV container adapters for the core audio traits

use crate::error::CliError;
use apcp_core::{ApcpError, AudioSink, AudioSource};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const MAX_INT16: f32 = 32767.0;
const INT16_SCALE: f32 = 32768.0;

fn audio_error(e: hound::Error) -> ApcpError {
    ApcpError::Audio(e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Int16,
    Float32,
}

/// Reads a WAV file chunk by chunk. Multi-channel files are reduced to their
/// first channel.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    encoding: Encoding,
    channels: usize,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self, CliError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let encoding = match (spec.bits_per_sample, spec.sample_format) {
            (16, SampleFormat::Int) => Encoding::Int16,
            (32, SampleFormat::Float) => Encoding::Float32,
            (bits_per_sample, format) => {
                return Err(CliError::UnsupportedWav {
                    bits_per_sample,
                    format: format!("{:?}", format).to_lowercase(),
                })
            }
        };
        log::info!(
            "Read WAV: {} Hz, {} channels, {} bits, {} frames",
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            reader.duration()
        );

        Ok(Self {
            reader,
            encoding,
            channels: usize::from(spec.channels.max(1)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }
}

impl AudioSource for WavSource {
    fn read_chunk(&mut self, frames: usize) -> apcp_core::Result<Option<Vec<f32>>> {
        let wanted = frames * self.channels;
        let mut interleaved = Vec::with_capacity(wanted);
        match self.encoding {
            Encoding::Int16 => {
                for sample in self.reader.samples::<i16>().take(wanted) {
                    interleaved.push(sample.map_err(audio_error)? as f32 / INT16_SCALE);
                }
            }
            Encoding::Float32 => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    interleaved.push(sample.map_err(audio_error)?);
                }
            }
        }

        if interleaved.is_empty() {
            return Ok(None);
        }
        Ok(Some(interleaved.into_iter().step_by(self.channels).collect()))
    }
}

/// Writes 16-bit mono PCM. The file is created on the first write, with the
/// sample rate that write reports.
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    written: usize,
}

impl WavSink {
    pub fn create(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: None,
            sample_rate: 0,
            written: 0,
        }
    }

    /// Flush the WAV header and return the number of samples written
    pub fn finalize(self) -> Result<usize, CliError> {
        if let Some(writer) = self.writer {
            writer.finalize()?;
        }
        Ok(self.written)
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, samples: &[f32], sample_rate: u32) -> apcp_core::Result<()> {
        let writer = match self.writer {
            Some(ref mut writer) => {
                if sample_rate != self.sample_rate {
                    return Err(ApcpError::Audio(format!(
                        "sample rate changed from {} to {} Hz mid-file",
                        self.sample_rate, sample_rate
                    )));
                }
                writer
            }
            None => {
                let spec = WavSpec {
                    channels: 1,
                    sample_rate,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                };
                self.sample_rate = sample_rate;
                self.writer
                    .insert(WavWriter::create(&self.path, spec).map_err(audio_error)?)
            }
        };

        for &sample in samples {
            // Clamp to [-1.0, 1.0] so the scaled value fits in i16
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * MAX_INT16) as i16)
                .map_err(audio_error)?;
        }
        self.written += samples.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_then_source() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("tone.wav");

        let mut sink = WavSink::create(&path);
        sink.write(&[0.0, 0.5, -0.5, 1.0], 8000).unwrap();
        sink.write(&[2.0, -2.0], 8000).unwrap();
        assert_eq!(sink.finalize().unwrap(), 6);

        let mut source = WavSource::open(&path).unwrap();
        assert_eq!(source.sample_rate(), 8000);
        let first = source.read_chunk(4).unwrap().unwrap();
        assert_eq!(first.len(), 4);
        assert!((first[1] - 0.5).abs() < 1e-3);
        assert!((first[3] - 32767.0 / 32768.0).abs() < 1e-6);

        // Out-of-range samples were clamped, short final block
        let rest = source.read_chunk(4).unwrap().unwrap();
        assert_eq!(rest.len(), 2);
        assert!((rest[0] - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((rest[1] + 32767.0 / 32768.0).abs() < 1e-6);
        assert_eq!(source.read_chunk(4).unwrap(), None);
    }

    #[test]
    fn test_sink_rejects_rate_change() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut sink = WavSink::create(&dir.path().join("rate.wav"));
        sink.write(&[0.1], 8000).unwrap();
        assert!(matches!(sink.write(&[0.1], 16000), Err(ApcpError::Audio(_))));
    }

    #[test]
    fn test_stereo_float_takes_first_channel() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).expect("Failed to create WAV");
        for i in 0..5 {
            writer.write_sample(i as f32 * 0.1).expect("Failed to write sample");
            writer.write_sample(-1.0f32).expect("Failed to write sample");
        }
        writer.finalize().expect("Failed to finalize WAV");

        let mut source = WavSource::open(&path).unwrap();
        let samples = source.read_chunk(10).unwrap().unwrap();
        assert_eq!(samples.len(), 5);
        for (i, s) in samples.iter().enumerate() {
            assert!((s - i as f32 * 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_8_bit_wav() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("u8.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("Failed to create WAV");
        writer.write_sample(0i8).expect("Failed to write sample");
        writer.finalize().expect("Failed to finalize WAV");

        assert!(matches!(
            WavSource::open(&path),
            Err(CliError::UnsupportedWav {
                bits_per_sample: 8,
                ..
            })
        ));
    }
}
