// End-to-end tests: text -> frame samples -> MemorySource -> text.
//
// Frames are fed to the demodulator sample-exact, standing in for a noiseless
// speaker-to-microphone path. Tests that shift or disturb the frame use the
// default configuration, where every tone spans two analysis segments.

use apcp_core::{
    ApcpError, Codec, FrequencyPlan, MemorySink, MemorySource, ProtocolConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Two channels, two bits per tone, one segment per tone
fn scenario_config() -> ProtocolConfig {
    ProtocolConfig {
        sample_rate: 8000,
        tone_duration: 0.1,
        duration_per_sample: 0.1,
        min_magnitude: 10.0,
        chunk_size: 160,
        fft_size: 2048,
        volume: 0.5,
        num_channels: 2,
        bits_per_tone: 2,
        freq_steps: 100,
        starting_frequency: 1000,
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn round_trip(codec: &Codec, text: &str) -> String {
    let samples = codec.modulator.modulate(text).expect("Failed to encode");
    codec
        .demodulator
        .decode(MemorySource::new(samples))
        .expect("Failed to decode")
}

fn dominant_frequency(codec: &Codec, segment: &[f32]) -> u32 {
    let plan = &codec.plan;
    let peak = codec
        .demodulator
        .analyzer()
        .analyze(segment, plan.control_range())
        .unwrap()
        .expect("No bin in control range");
    plan.snap(peak.frequency)
}

#[test]
fn test_hi_scenario() {
    let codec = Codec::new(&scenario_config()).unwrap();
    let tone_samples = codec.modulator.tone_samples();

    let tones = codec.modulator.channel_tones("Hi").unwrap();
    let separator_counts: Vec<usize> = codec
        .plan
        .channels()
        .iter()
        .zip(tones.iter())
        .map(|(ch, t)| t.iter().filter(|&&f| f == ch.separate_frequency()).count())
        .collect();
    let message_tones: usize = tones.iter().map(Vec::len).sum::<usize>()
        - separator_counts.iter().sum::<usize>();
    assert_eq!(message_tones, 8, "16 bits at 2 bits per tone");
    assert_eq!(separator_counts, vec![0, 1]);

    let samples = codec.modulator.modulate("Hi").unwrap();
    assert_eq!(samples.len() % tone_samples, 0);
    assert_eq!(dominant_frequency(&codec, &samples[..tone_samples]), 1000);
    assert_eq!(dominant_frequency(&codec, &samples[samples.len() - tone_samples..]), 1100);

    let decoded = codec.demodulator.decode(MemorySource::new(samples)).unwrap();
    assert_eq!(decoded, "Hi");
}

#[test]
fn test_round_trip_scenario_config() {
    let codec = Codec::new(&scenario_config()).unwrap();
    for text in ["", "A", "Hi", "aa", "zzzz", "Hello, Audio Modem!", "\u{0}\u{ff}\u{80}\u{7f}"] {
        assert_eq!(round_trip(&codec, text), text, "Failed for {:?}", text);
    }
}

#[test]
fn test_round_trip_default_config() {
    init_logging();
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    let text = "The quick brown fox jumps over the lazy dog";
    assert_eq!(round_trip(&codec, text), text);
}

#[test]
fn test_round_trip_repeating_symbols() {
    // Runs of identical symbols on every channel lean on the separator tone
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    for text in ["\u{0}\u{0}\u{0}\u{0}", "\u{ff}\u{ff}\u{ff}", "UUUUUUUU", "ppppqqqq"] {
        assert_eq!(round_trip(&codec, text), text, "Failed for {:?}", text);
    }
}

#[test]
fn test_round_trip_other_layouts() {
    // 8-bit symbols need a narrower step to stay under Nyquist
    let layouts = [(1, 1, 100), (1, 8, 80), (2, 4, 100), (5, 2, 100), (8, 1, 100)];
    for (num_channels, bits_per_tone, freq_steps) in layouts {
        let config = ProtocolConfig {
            num_channels,
            bits_per_tone,
            freq_steps,
            ..ProtocolConfig::default()
        };
        let codec = Codec::new(&config).unwrap();
        let text = "Layered tones!";
        assert_eq!(
            round_trip(&codec, text),
            text,
            "Failed for {} channels x {} bits",
            num_channels,
            bits_per_tone
        );
    }
}

#[test]
fn test_leading_and_trailing_silence() {
    init_logging();
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    let text = "Hello, Audio Modem!";
    let frame = codec.modulator.modulate(text).unwrap();

    // Offsets that do not line up with segment boundaries
    for lead in [0usize, 1234, 4799, 12000] {
        let mut samples = vec![0.0; lead];
        samples.extend_from_slice(&frame);
        samples.extend_from_slice(&vec![0.0; 48000]);

        let decoded = codec.demodulator.decode(MemorySource::new(samples)).unwrap();
        assert_eq!(decoded, text, "Failed with {} samples of leading silence", lead);
    }
}

#[test]
fn test_gaussian_noise() {
    init_logging();
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    let text = "Noisy channel test";
    let mut rng = StdRng::seed_from_u64(7);
    let noise = Normal::new(0.0f32, 0.02).unwrap();

    let mut samples: Vec<f32> = (0..24000).map(|_| noise.sample(&mut rng)).collect();
    for s in codec.modulator.modulate(text).unwrap() {
        samples.push(s * 0.8 + noise.sample(&mut rng));
    }
    samples.extend((0..24000).map(|_| noise.sample(&mut rng)));

    let decoded = codec.demodulator.decode(MemorySource::new(samples)).unwrap();
    assert_eq!(decoded, text);
}

#[test]
fn test_noise_only_never_starts() {
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let noise = Normal::new(0.0f32, 0.05).unwrap();
    let samples: Vec<f32> = (0..96000).map(|_| noise.sample(&mut rng)).collect();

    let err = codec.demodulator.decode(MemorySource::new(samples)).unwrap_err();
    assert!(matches!(err, ApcpError::StartToneNotFound));
}

#[test]
fn test_streaming_matches_one_shot() {
    init_logging();
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    let texts = ["first", "second frame", "3rd"];

    let mut samples = vec![0.0; 3000];
    for text in texts {
        samples.extend(codec.modulator.modulate(text).unwrap());
        samples.extend(vec![0.0; 20000]);
    }

    let streamed: Vec<String> = codec
        .demodulator
        .stream(MemorySource::new(samples.clone()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(streamed, texts);

    // The one-shot decode sees the same first frame
    let first = codec.demodulator.decode(MemorySource::new(samples)).unwrap();
    assert_eq!(first, streamed[0]);
}

#[test]
fn test_encode_through_sink() {
    let codec = Codec::new(&scenario_config()).unwrap();
    let mut sink = MemorySink::new();
    codec.modulator.encode("Hi", &mut sink).unwrap();

    let samples = sink.into_samples();
    assert!(samples.iter().all(|s| s.abs() <= 1.0));
    assert_eq!(codec.demodulator.decode(MemorySource::new(samples)).unwrap(), "Hi");
}

#[test]
fn test_rejects_misaligned_message() {
    let config = ProtocolConfig {
        bits_per_tone: 3,
        ..scenario_config()
    };
    let codec = Codec::new(&config).unwrap();
    let mut sink = MemorySink::new();

    let err = codec.modulator.encode("Hi", &mut sink).unwrap_err();
    assert!(matches!(
        err,
        ApcpError::Misaligned {
            bits: 16,
            bits_per_tone: 3,
        }
    ));
    assert!(sink.samples().is_empty());

    // 24 bits divide evenly
    assert_eq!(round_trip(&codec, "Hey"), "Hey");
}

#[test]
fn test_rejects_wide_characters() {
    let codec = Codec::new(&scenario_config()).unwrap();
    let err = codec.modulator.modulate("caf\u{e9} \u{263a}").unwrap_err();
    assert!(matches!(
        err,
        ApcpError::UnsupportedCharacter {
            character: '\u{263a}',
            position: 5,
        }
    ));
}

#[test]
fn test_plan_shared_across_threads() {
    let codec = Codec::new(&ProtocolConfig::default()).unwrap();
    let texts = ["alpha", "bravo", "charlie", "delta"];

    std::thread::scope(|scope| {
        let handles: Vec<_> = texts
            .iter()
            .map(|&text| {
                let codec = &codec;
                scope.spawn(move || round_trip(codec, text))
            })
            .collect();
        for (handle, text) in handles.into_iter().zip(texts) {
            assert_eq!(handle.join().unwrap(), text);
        }
    });
}

#[test]
fn test_mismatched_plan_is_rejected() {
    let config = ProtocolConfig::default();
    let plan = std::sync::Arc::new(FrequencyPlan::new(2, 3, 100, 1000).unwrap());
    assert!(matches!(
        apcp_core::Demodulator::new(&config, plan),
        Err(ApcpError::InvalidConfig(_))
    ));
}
