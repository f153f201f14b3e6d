use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApcpError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Character {character:?} at position {position} does not fit in 8 bits")]
    UnsupportedCharacter { character: char, position: usize },

    #[error("Message has {bits} bits, which is not a multiple of {bits_per_tone} bits per tone")]
    Misaligned { bits: usize, bits_per_tone: usize },

    #[error("Frequency {frequency} Hz is not a tone of channel {channel}")]
    UnknownTone { channel: usize, frequency: u32 },

    #[error("Audio ended before a start tone was detected")]
    StartToneNotFound,

    #[error("Audio ended before an end tone was detected")]
    EndToneNotFound,

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("Audio I/O error: {0}")]
    Audio(String),
}

pub type Result<T> = std::result::Result<T, ApcpError>;
