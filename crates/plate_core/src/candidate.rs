use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest plate the remote form accepts; also the number of positional fields.
pub const MAX_CANDIDATE_LEN: usize = 7;

/// Characters accepted when no alphabet is configured.
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateError {
    #[error("candidate is empty")]
    Empty,
    #[error("candidate {value:?} has length {len}, expected {min}..={max}")]
    Length {
        value: String,
        len: usize,
        min: usize,
        max: usize,
    },
    #[error("candidate {value:?} contains non-alphanumeric character {found:?}")]
    InvalidChar { value: String, found: char },
    #[error("invalid length bounds {min}..={max} (must satisfy 1 <= min <= max <= {MAX_CANDIDATE_LEN})")]
    Bounds { min: usize, max: usize },
    #[error("alphabet must contain at least one uppercase letter or digit")]
    EmptyAlphabet,
    #[error("alphabet contains non-alphanumeric character {0:?}")]
    AlphabetChar(char),
}

/// Inclusive candidate length range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    min: usize,
    max: usize,
}

impl LengthBounds {
    pub fn new(min: usize, max: usize) -> Result<Self, CandidateError> {
        if min == 0 || min > max || max > MAX_CANDIDATE_LEN {
            return Err(CandidateError::Bounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }

    pub fn range(&self) -> RangeInclusive<usize> {
        self.min..=self.max
    }
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self {
            min: 1,
            max: MAX_CANDIDATE_LEN,
        }
    }
}

/// A validated plate string: uppercase ASCII letters and digits only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(String);

impl Candidate {
    /// Trims and uppercases `raw`, then validates it against `bounds`.
    pub fn parse(raw: &str, bounds: LengthBounds) -> Result<Self, CandidateError> {
        let value = raw.trim().to_ascii_uppercase();
        if value.is_empty() {
            return Err(CandidateError::Empty);
        }
        if let Some(found) = value.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CandidateError::InvalidChar { value, found });
        }
        // All chars are ASCII past this point, so byte length == char count.
        let len = value.len();
        if !bounds.contains(len) {
            return Err(CandidateError::Length {
                value,
                len,
                min: bounds.min(),
                max: bounds.max(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Candidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered, de-duplicated set of characters used for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Uppercases `raw` and keeps the first occurrence of each character.
    /// Whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, CandidateError> {
        let mut symbols = Vec::new();
        for c in raw.chars().filter(|c| !c.is_whitespace()) {
            let c = c.to_ascii_uppercase();
            if !c.is_ascii_alphanumeric() {
                return Err(CandidateError::AlphabetChar(c));
            }
            if !symbols.contains(&c) {
                symbols.push(c);
            }
        }
        if symbols.is_empty() {
            return Err(CandidateError::EmptyAlphabet);
        }
        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.symbols.contains(&c)
    }

    /// Whether every character of `candidate` belongs to this alphabet.
    pub fn admits(&self, candidate: &Candidate) -> bool {
        candidate.chars().all(|c| self.contains(c))
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_ALPHABET.chars().collect(),
        }
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.symbols.iter().try_for_each(|c| write!(f, "{c}"))
    }
}
