//! Word-level Markov chain model.
//!
//! A chain maps a state (the last `state_size` words) to the words seen
//! after it, with counts. Sentences start from a state made of
//! [`BEGIN`] markers and stop when [`END`] is drawn.
//!
//! Two on-disk representations are understood by [`MarkovLoader`]:
//!
//! - newline-delimited text, one sentence per line;
//! - a serialized chain, `{"state_size": 2, "chain": "<json>"}`, where
//!   the inner string holds `[[state...], {next: count}]` pairs. This is
//!   what [`MarkovChain::to_json`] and the `markov-train` tool produce.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use super::{ModelLoader, SentenceModel};
use crate::{MarkovError, Result};

/// Marker filling the initial state of every sentence.
pub const BEGIN: &str = "___BEGIN__";

/// Marker terminating a sentence.
pub const END: &str = "___END__";

/// State size used when none is configured.
pub const DEFAULT_STATE_SIZE: usize = 2;

/// Walks longer than this are treated as a failed attempt.
const MAX_WORDS: usize = 256;

/// Errors building a chain from corpus data.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("state size must be at least 1")]
    InvalidStateSize,

    #[error("state has {found} words, expected {expected}")]
    StateLength { expected: usize, found: usize },

    #[error("state {0:?} has no successors")]
    EmptyTransitions(Vec<String>),

    #[error("malformed chain: {0}")]
    Json(#[from] serde_json::Error),
}

type ChainEntries = Vec<(Vec<String>, BTreeMap<String, u32>)>;

#[derive(Serialize, Deserialize)]
struct SerializedChain {
    state_size: usize,
    chain: String,
}

#[derive(Debug)]
struct Transitions {
    words: Vec<String>,
    counts: Vec<u32>,
    dist: WeightedIndex<u32>,
}

/// A compiled, immutable Markov chain.
#[derive(Debug)]
pub struct MarkovChain {
    state_size: usize,
    transitions: HashMap<Vec<String>, Transitions>,
}

impl MarkovChain {
    /// Build a chain from newline-delimited text.
    ///
    /// Blank lines are skipped. An empty corpus yields an empty chain,
    /// which never produces a sentence.
    pub fn from_text(text: &str, state_size: usize) -> std::result::Result<Self, ChainError> {
        if state_size == 0 {
            return Err(ChainError::InvalidStateSize);
        }

        let mut counts: HashMap<Vec<String>, BTreeMap<String, u32>> = HashMap::new();
        for line in text.lines() {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }

            let mut state = vec![BEGIN.to_owned(); state_size];
            for word in words.into_iter().chain([END]) {
                *counts
                    .entry(state.clone())
                    .or_default()
                    .entry(word.to_owned())
                    .or_insert(0) += 1;
                state.remove(0);
                state.push(word.to_owned());
            }
        }

        Self::from_entries(state_size, counts)
    }

    /// Parse a serialized chain.
    pub fn from_json(json: &str) -> std::result::Result<Self, ChainError> {
        let serialized: SerializedChain = serde_json::from_str(json)?;
        if serialized.state_size == 0 {
            return Err(ChainError::InvalidStateSize);
        }
        let entries: ChainEntries = serde_json::from_str(&serialized.chain)?;
        Self::from_entries(serialized.state_size, entries)
    }

    /// Serialize the chain; [`from_json`](Self::from_json) reads it back.
    pub fn to_json(&self) -> std::result::Result<String, ChainError> {
        let mut entries: ChainEntries = self
            .transitions
            .iter()
            .map(|(state, t)| {
                let next = t.words.iter().cloned().zip(t.counts.iter().copied()).collect();
                (state.clone(), next)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let serialized = SerializedChain {
            state_size: self.state_size,
            chain: serde_json::to_string(&entries)?,
        };
        Ok(serde_json::to_string(&serialized)?)
    }

    /// Number of words in a state.
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Number of distinct states.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether the chain has no states at all.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    fn from_entries<I>(state_size: usize, entries: I) -> std::result::Result<Self, ChainError>
    where
        I: IntoIterator<Item = (Vec<String>, BTreeMap<String, u32>)>,
    {
        let mut transitions = HashMap::new();
        for (state, next) in entries {
            if state.len() != state_size {
                return Err(ChainError::StateLength {
                    expected: state_size,
                    found: state.len(),
                });
            }
            let (words, counts): (Vec<String>, Vec<u32>) = next.into_iter().unzip();
            let dist = WeightedIndex::new(counts.iter().copied())
                .map_err(|_| ChainError::EmptyTransitions(state.clone()))?;
            transitions.insert(
                state,
                Transitions {
                    words,
                    counts,
                    dist,
                },
            );
        }
        Ok(Self {
            state_size,
            transitions,
        })
    }

    /// One generation attempt.
    fn walk<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let mut state = vec![BEGIN.to_owned(); self.state_size];
        let mut words: Vec<String> = Vec::new();

        loop {
            let t = self.transitions.get(state.as_slice())?;
            let next = &t.words[t.dist.sample(rng)];
            if next == END {
                break;
            }
            if words.len() >= MAX_WORDS {
                return None;
            }
            words.push(next.clone());
            state.remove(0);
            state.push(next.clone());
        }

        if words.is_empty() {
            None
        } else {
            Some(words.join(" "))
        }
    }
}

impl SentenceModel for MarkovChain {
    fn generate_sentence(&self, max_attempts: usize) -> Option<String> {
        let mut rng = rand::thread_rng();
        (0..max_attempts).find_map(|_| self.walk(&mut rng))
    }
}

/// Loads [`MarkovChain`]s from text corpora or serialized chains.
#[derive(Debug, Clone)]
pub struct MarkovLoader {
    state_size: usize,
}

impl MarkovLoader {
    /// Create a loader building text corpora with the given state size.
    pub fn new(state_size: usize) -> Self {
        Self { state_size }
    }
}

impl Default for MarkovLoader {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_SIZE)
    }
}

impl ModelLoader for MarkovLoader {
    type Model = MarkovChain;

    fn load(&self, path: &Path) -> Result<MarkovChain> {
        let load_error = |reason: String| MarkovError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let chain = if is_serialized(path, &text) {
            MarkovChain::from_json(&text)
        } else {
            MarkovChain::from_text(&text, self.state_size)
        };
        chain.map_err(|e| load_error(e.to_string()))
    }
}

fn is_serialized(path: &Path, text: &str) -> bool {
    path.extension().is_some_and(|ext| ext == "json") || text.trim_start().starts_with('{')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_corpus_reproduces_line() {
        let chain = MarkovChain::from_text("the cat sat down", 2).unwrap();
        assert_eq!(
            chain.generate_sentence(1).as_deref(),
            Some("the cat sat down")
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let chain = MarkovChain::from_text("\n\n  \nhello world\n\n", 2).unwrap();
        assert_eq!(chain.generate_sentence(5).as_deref(), Some("hello world"));
    }

    #[test]
    fn empty_corpus_never_generates() {
        let chain = MarkovChain::from_text("", 2).unwrap();
        assert!(chain.is_empty());
        assert!(chain.generate_sentence(100).is_none());
    }

    #[test]
    fn zero_attempts_generates_nothing() {
        let chain = MarkovChain::from_text("a b c", 2).unwrap();
        assert!(chain.generate_sentence(0).is_none());
    }

    #[test]
    fn zero_state_size_rejected() {
        assert!(matches!(
            MarkovChain::from_text("a b", 0),
            Err(ChainError::InvalidStateSize)
        ));
    }

    #[test]
    fn serialized_chain_keeps_behaviour() {
        let chain = MarkovChain::from_text("one two three", 2).unwrap();
        let json = chain.to_json().unwrap();
        let restored = MarkovChain::from_json(&json).unwrap();

        assert_eq!(restored.state_size(), 2);
        assert_eq!(restored.len(), chain.len());
        assert_eq!(
            restored.generate_sentence(1).as_deref(),
            Some("one two three")
        );
    }

    #[test]
    fn state_length_mismatch_rejected() {
        let json = r#"{"state_size": 2, "chain": "[[[\"a\"], {\"b\": 1}]]"}"#;
        assert!(matches!(
            MarkovChain::from_json(json),
            Err(ChainError::StateLength {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn zero_weight_transitions_rejected() {
        let json = r#"{"state_size": 1, "chain": "[[[\"a\"], {\"b\": 0}]]"}"#;
        assert!(matches!(
            MarkovChain::from_json(json),
            Err(ChainError::EmptyTransitions(_))
        ));
    }

    #[test]
    fn serialized_detection() {
        assert!(is_serialized(Path::new("model.json"), "anything"));
        assert!(is_serialized(Path::new("model"), "  {\"state_size\": 2}"));
        assert!(!is_serialized(Path::new("corpus.txt"), "hello there"));
    }
}
