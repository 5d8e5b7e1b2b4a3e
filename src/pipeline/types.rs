//! Data types flowing between the decoder stations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A chunk of raw samples handed to the tone detector.
#[derive(Debug, Clone)]
pub struct SampleChunk {
    /// Signed integer samples. Must be non-empty.
    pub samples: Vec<i32>,
    /// Sequence number for ordering and error reporting.
    pub sequence: u64,
}

impl SampleChunk {
    /// Creates a new sample chunk.
    pub fn new(samples: Vec<i32>, sequence: u64) -> Self {
        Self { samples, sequence }
    }
}

/// A maximal stretch of tone events sharing the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// True for tone, false for silence.
    pub tone: bool,
    /// Number of consecutive events in this state (always >= 1).
    pub duration: u32,
}

impl Run {
    pub fn new(tone: bool, duration: u32) -> Self {
        Self { tone, duration }
    }

    pub fn tone(duration: u32) -> Self {
        Self::new(true, duration)
    }

    pub fn silence(duration: u32) -> Self {
        Self::new(false, duration)
    }
}

/// A run duration expressed in Morse units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Canonical {
    One,
    Three,
    Seven,
    Ten,
    /// The duration fell outside every band valid for its position.
    Unclassifiable,
}

impl Canonical {
    /// Unit count, or `None` for [`Canonical::Unclassifiable`].
    pub fn units(self) -> Option<u32> {
        match self {
            Canonical::One => Some(1),
            Canonical::Three => Some(3),
            Canonical::Seven => Some(7),
            Canonical::Ten => Some(10),
            Canonical::Unclassifiable => None,
        }
    }

    /// Maps an exact unit count onto a canonical value.
    pub fn from_units(units: u32) -> Self {
        match units {
            1 => Canonical::One,
            3 => Canonical::Three,
            7 => Canonical::Seven,
            10 => Canonical::Ten,
            _ => Canonical::Unclassifiable,
        }
    }
}

/// One symbol of decoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Token {
    Dit,
    Dah,
    EndLetter,
    EndWord,
    Pause,
    /// Intra-character gap: valid, but prints nothing.
    NoOp,
    Error,
}

impl Token {
    /// True for tokens carrying a tone (dit or dah).
    pub fn is_tone(self) -> bool {
        matches!(self, Token::Dit | Token::Dah)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Token::Dit => "dit",
            Token::Dah => "dah",
            Token::EndLetter => "end-letter",
            Token::EndWord => "end-word",
            Token::Pause => "pause",
            Token::NoOp => "no-op",
            Token::Error => "error",
        };
        f.write_str(name)
    }
}

/// What to do with a partial window or group at end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
    /// Classify the partial data using statistics from what is there.
    #[default]
    Flush,
    /// Drop the partial data.
    Discard,
}

impl std::str::FromStr for TrailingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flush" => Ok(TrailingPolicy::Flush),
            "discard" => Ok(TrailingPolicy::Discard),
            other => Err(format!(
                "unknown trailing policy '{}' (expected flush or discard)",
                other
            )),
        }
    }
}
