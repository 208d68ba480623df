//! Estimated language models and everything that reads them.
//!
//! This module provides:
//! - The back-off model and its scorer (`Model`)
//! - Estimation from counts (`builder`)
//! - ARPA text and binary persistence
//! - Perplexity statistics, static mixtures and random generation

/// ARPA text format reader and writer, as `Model` methods.
mod arpa;

/// Two-phase estimation of a `Model` from `NgramCounts`.
///
/// Discounting runs from the highest order down, backoff weights from
/// unigrams up.
pub mod builder;

/// Random sentence generation by weighted sampling.
pub mod generator;

/// Linear interpolation of several models.
pub mod mixture;

/// The back-off model: context trie, scorer and binary snapshots.
pub mod ngram_model;

/// Log probability and perplexity over sentences and texts.
pub mod stats;

use crate::vocab::SpecialTokens;
pub use builder::{BuildOutcome, CancelToken, EstimationReport, Fallback};
pub use generator::SentenceGenerator;
pub use mixture::Mixture;
pub use ngram_model::{ContextEntry, LOG_ZERO, LogP, Model};
pub use stats::TextStats;

/// Word-level query surface shared by single models and mixtures.
pub trait LanguageModel {
	/// Longest n-gram the model can use.
	fn order(&self) -> usize;

	fn specials(&self) -> &SpecialTokens;

	/// Whether `word` is in the vocabulary (otherwise it scores as `<unk>`).
	fn is_known(&self, word: &str) -> bool;

	/// Log10 probability of `word` after `history`, never failing.
	fn score_words(&self, history: &[&str], word: &str) -> LogP;
}
