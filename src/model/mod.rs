//! Generative models and the loaders that build them from disk.
//!
//! The cache and router only ever see a model through [`SentenceModel`]
//! and a loader through [`ModelLoader`]; [`markov`] provides the concrete
//! chain used by the binaries.

pub mod markov;

use std::path::Path;

use crate::Result;

pub use markov::{MarkovChain, MarkovLoader};

/// An immutable handle that can produce sentences.
///
/// Handles are shared between concurrent requests behind an `Arc`, so
/// generation must not need `&mut self`.
pub trait SentenceModel: Send + Sync + 'static {
    /// Try up to `max_attempts` times to produce a sentence.
    ///
    /// Returns `None` if no attempt succeeded. This is an expected
    /// outcome for sparse corpora, not an error.
    fn generate_sentence(&self, max_attempts: usize) -> Option<String>;
}

/// Builds a model from a file.
///
/// Called from a blocking task, possibly from several tasks at once for
/// different paths. Loading the same path twice yields two independent
/// handles with equivalent behaviour.
pub trait ModelLoader: Send + Sync + 'static {
    type Model: SentenceModel;

    fn load(&self, path: &Path) -> Result<Self::Model>;
}
