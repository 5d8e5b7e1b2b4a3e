//! Token classification: canonical durations in, Morse tokens out.

use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{Canonical, Token};

/// Which kind of duration the classifier expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
    #[default]
    Tone,
    Silence,
}

/// Two-state machine alternating between tone and silence durations.
///
/// Every input yields exactly one token. An invalid duration becomes
/// [`Token::Error`] and the machine moves on regardless, so one bad run costs
/// one token and the stream resynchronizes on the next.
#[derive(Debug, Clone, Default)]
pub struct TokenClassifier {
    state: Expect,
}

impl TokenClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> Expect {
        self.state
    }

    /// Classifies one duration and advances the state.
    pub fn classify(&mut self, duration: Canonical) -> Token {
        match self.state {
            Expect::Tone => {
                self.state = Expect::Silence;
                match duration {
                    Canonical::One => Token::Dit,
                    Canonical::Three => Token::Dah,
                    _ => Token::Error,
                }
            }
            Expect::Silence => {
                self.state = Expect::Tone;
                match duration {
                    Canonical::One => Token::NoOp,
                    Canonical::Three => Token::EndLetter,
                    Canonical::Seven => Token::EndWord,
                    Canonical::Ten => Token::Pause,
                    Canonical::Unclassifiable => Token::Error,
                }
            }
        }
    }
}

/// Classifies a whole sequence starting from a fresh machine.
pub fn classify_all(durations: &[Canonical]) -> Vec<Token> {
    let mut classifier = TokenClassifier::new();
    durations.iter().map(|&d| classifier.classify(d)).collect()
}

/// Station wrapping a [`TokenClassifier`].
#[derive(Default)]
pub struct ClassifierStation {
    classifier: TokenClassifier,
}

impl ClassifierStation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Station for ClassifierStation {
    type Input = Canonical;
    type Output = Token;

    fn name(&self) -> &'static str {
        "classifier"
    }

    fn process(&mut self, duration: Canonical, out: &mut Vec<Token>) -> Result<(), StationError> {
        out.push(self.classifier.classify(duration));
        Ok(())
    }
}
