use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use engine_logging::{engine_debug, engine_trace};
use plate_core::{Alphabet, Candidate, CandidateError, LengthBounds};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read candidates: {0}")]
    Read(#[from] io::Error),
    #[error("invalid generated candidate: {0}")]
    Generated(#[from] CandidateError),
}

/// A lazily produced sequence of candidates.
pub trait CandidateSource: Send {
    /// `Ok(None)` signals exhaustion.
    fn next_candidate(&mut self) -> Result<Option<Candidate>, SourceError>;
}

/// Candidates read line by line from a user-supplied list.
///
/// Lines outside the length bounds or the optional alphabet are skipped.
/// After a read error the error is reported once and the source is exhausted.
pub struct LineSource<R> {
    lines: io::Lines<R>,
    bounds: LengthBounds,
    alphabet: Option<Alphabet>,
    line_no: usize,
    finished: bool,
}

impl LineSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, bounds: LengthBounds) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file), bounds))
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R, bounds: LengthBounds) -> Self {
        Self {
            lines: reader.lines(),
            bounds,
            alphabet: None,
            line_no: 0,
            finished: false,
        }
    }

    pub fn with_alphabet(mut self, alphabet: Alphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }
}

impl<R: BufRead + Send> CandidateSource for LineSource<R> {
    fn next_candidate(&mut self) -> Result<Option<Candidate>, SourceError> {
        while !self.finished {
            let line = match self.lines.next() {
                None => {
                    self.finished = true;
                    break;
                }
                Some(Err(err)) => {
                    self.finished = true;
                    return Err(err.into());
                }
                Some(Ok(line)) => line,
            };
            self.line_no += 1;

            match Candidate::parse(&line, self.bounds) {
                Ok(candidate) => match &self.alphabet {
                    Some(alphabet) if !alphabet.admits(&candidate) => {
                        engine_debug!("line {} skipped: {} outside alphabet", self.line_no, candidate);
                    }
                    _ => return Ok(Some(candidate)),
                },
                Err(CandidateError::Empty) => {
                    engine_trace!("line {} is blank", self.line_no);
                }
                Err(err) => {
                    engine_debug!("line {} skipped: {}", self.line_no, err);
                }
            }
        }
        Ok(None)
    }
}

/// Every string over an alphabet, shortest lengths first, odometer order
/// within a length.
#[derive(Debug, Clone)]
pub struct CombinationSource {
    alphabet: Alphabet,
    bounds: LengthBounds,
    indices: Vec<usize>,
    exhausted: bool,
}

impl CombinationSource {
    /// All strings of exactly `length` characters.
    pub fn new(alphabet: Alphabet, length: usize) -> Result<Self, CandidateError> {
        Ok(Self::for_bounds(alphabet, LengthBounds::new(length, length)?))
    }

    pub fn for_bounds(alphabet: Alphabet, bounds: LengthBounds) -> Self {
        Self {
            indices: vec![0; bounds.min()],
            alphabet,
            bounds,
            exhausted: false,
        }
    }

    /// Number of candidates the source produces in total.
    pub fn total(&self) -> u128 {
        let base = self.alphabet.len() as u128;
        self.bounds
            .range()
            .map(|len| base.pow(len as u32))
            .sum()
    }

    fn advance(&mut self) {
        let base = self.alphabet.len();
        for slot in self.indices.iter_mut().rev() {
            *slot += 1;
            if *slot < base {
                return;
            }
            *slot = 0;
        }
        // Every position wrapped: move on to the next length.
        let next_len = self.indices.len() + 1;
        if self.bounds.contains(next_len) {
            self.indices = vec![0; next_len];
        } else {
            self.exhausted = true;
        }
    }
}

impl CandidateSource for CombinationSource {
    fn next_candidate(&mut self) -> Result<Option<Candidate>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        let symbols = self.alphabet.symbols();
        let raw: String = self.indices.iter().map(|&i| symbols[i]).collect();
        self.advance();
        Ok(Some(Candidate::parse(&raw, self.bounds)?))
    }
}

/// Result of one guarded pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Candidate(Candidate),
    Exhausted,
    Cancelled,
    Failed(String),
}

/// The single source all workers race to pull from.
///
/// Pulls are serialized by an async mutex, so each produced candidate is
/// handed to exactly one caller.
pub struct SharedSource {
    inner: Mutex<Box<dyn CandidateSource>>,
    pulled: AtomicU64,
}

impl SharedSource {
    pub fn new(source: Box<dyn CandidateSource>) -> Self {
        Self {
            inner: Mutex::new(source),
            pulled: AtomicU64::new(0),
        }
    }

    /// Cancellation is re-checked under the lock, so nothing is pulled once
    /// it has been observed.
    pub async fn pull(&self, cancel: &CancellationToken) -> Pull {
        let mut source = self.inner.lock().await;
        if cancel.is_cancelled() {
            return Pull::Cancelled;
        }
        match source.next_candidate() {
            Ok(Some(candidate)) => {
                self.pulled.fetch_add(1, Ordering::Relaxed);
                Pull::Candidate(candidate)
            }
            Ok(None) => Pull::Exhausted,
            Err(err) => Pull::Failed(err.to_string()),
        }
    }

    /// Candidates handed out so far.
    pub fn pulled(&self) -> u64 {
        self.pulled.load(Ordering::Relaxed)
    }
}
