//! Utterance classification.
//!
//! Recognized phrases:
//!
//! ```text
//! call <name>                 → Person(name)
//! dial <digit> [<digit> ...]  → Number(digits)   digit ∈ zero..nine | oh | plus
//! ... stop ...                → Stop
//! ... no ...                  → negative answer (confirmation only)
//! ```

use serde::{Deserialize, Serialize};

/// What a listening window resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DialogOutcome {
    Number(String),
    Person(String),
    Stop,
    None,
}

/// Everything heard during one listening window. Hypotheses accumulate; a
/// later partial can add to what an earlier one established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heard {
    pub number: Option<String>,
    pub person: Option<String>,
    pub stop: bool,
    pub negative: bool,
}

impl Heard {
    /// Fold one hypothesis in. Returns `true` if the text matched any phrase.
    pub fn absorb(&mut self, text: &str) -> bool {
        let lowered = text.trim().to_lowercase();
        let words: Vec<&str> = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();
        let mut matched = false;

        if lowered.contains("stop") {
            self.stop = true;
            matched = true;
        }
        if words.iter().any(|w| *w == "no") {
            self.negative = true;
            matched = true;
        }
        match words.split_first() {
            Some((&"call", [name])) if name.chars().all(|c| c.is_ascii_alphabetic()) => {
                self.person = Some((*name).to_string());
                matched = true;
            }
            Some((&"dial", digits)) if !digits.is_empty() => {
                if let Some(number) = spoken_digits(digits) {
                    self.number = Some(number);
                    matched = true;
                }
            }
            _ => {}
        }
        matched
    }

    /// Precedence: stop, then number, then person.
    pub fn outcome(&self) -> DialogOutcome {
        if self.stop {
            DialogOutcome::Stop
        } else if let Some(number) = &self.number {
            DialogOutcome::Number(number.clone())
        } else if let Some(name) = &self.person {
            DialogOutcome::Person(name.clone())
        } else {
            DialogOutcome::None
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Heard::default()
    }
}

/// Convert digit words to a dialable string; `None` if any word is not a digit.
pub fn spoken_digits(words: &[&str]) -> Option<String> {
    words.iter().map(|w| digit_for(w)).collect()
}

fn digit_for(word: &str) -> Option<char> {
    Some(match word {
        "zero" | "oh" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "plus" => '+',
        _ => return None,
    })
}
