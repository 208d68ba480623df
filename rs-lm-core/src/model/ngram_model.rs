use std::fs;
use std::path::Path;

use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::LanguageModel;
use crate::error::{LmError, Result};
use crate::io::{build_output_path, write_atomic};
use crate::trie::{NodeId, ROOT, Trie};
use crate::vocab::{SpecialTokens, UNKNOWN_INDEX, Vocabulary, WordIndex};

/// Base-10 log probability.
pub type LogP = f64;

/// Log probability standing for "impossible". Always finite.
pub const LOG_ZERO: LogP = -99.0;

/// Everything stored for one context `h`: the backoff weight `bow(h)` and
/// the explicit probabilities `p(w | h)` of the words seen after it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ContextEntry {
	bow: LogP,
	probs: FxHashMap<WordIndex, LogP>,
}

impl ContextEntry {
	pub fn backoff_weight(&self) -> LogP {
		self.bow
	}

	pub fn prob(&self, word: WordIndex) -> Option<LogP> {
		self.probs.get(&word).copied()
	}

	pub fn len(&self) -> usize {
		self.probs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.probs.is_empty()
	}

	/// Explicit probabilities in ascending word-index order.
	pub fn sorted_probs(&self) -> Vec<(WordIndex, LogP)> {
		let mut probs: Vec<(WordIndex, LogP)> = self.probs.iter().map(|(&w, &p)| (w, p)).collect();
		probs.sort_unstable_by_key(|&(w, _)| w);
		probs
	}
}

/// A back-off n-gram language model.
///
/// Contexts are stored in a [`Trie`] keyed by the *reversed* history (most
/// recent word first), so that scoring walks from the unigram context
/// towards longer contexts in a single descent.
///
/// # Invariants
/// - Every stored n-gram has length `1..=order`
/// - A context node exists for every prefix of a stored n-gram's history
/// - A model is immutable once built or loaded; scoring takes `&self` and is
///   safe to share across threads
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Model {
	order: usize,
	vocab: Vocabulary,
	contexts: Trie<ContextEntry>,
}

impl Model {
	/// Creates an empty model.
	///
	/// # Errors
	/// `InvalidConfig` if `order` is zero.
	pub fn new(order: usize, vocab: Vocabulary) -> Result<Self> {
		if order == 0 {
			return Err(LmError::InvalidConfig("order must be at least 1".to_owned()));
		}
		Ok(Self {
			order,
			vocab,
			contexts: Trie::new(),
		})
	}

	pub fn order(&self) -> usize {
		self.order
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocab
	}

	/// Number of allocated vocabulary entries, special tokens included.
	pub fn vocabulary_size(&self) -> usize {
		self.vocab.len()
	}

	pub(crate) fn vocabulary_mut(&mut self) -> &mut Vocabulary {
		&mut self.vocab
	}

	/// Finds the node of a forward-ordered context, walking it backwards.
	fn find_context(&self, context: &[WordIndex]) -> Option<NodeId> {
		let mut id = ROOT;
		for &word in context.iter().rev() {
			id = self.contexts.child(id, word)?;
		}
		Some(id)
	}

	fn reversed(context: &[WordIndex]) -> Vec<WordIndex> {
		context.iter().rev().copied().collect()
	}

	/// Log probability of `word` following `history`.
	///
	/// # Behavior
	/// - Only the last `order - 1` words of `history` are used.
	/// - The longest stored n-gram ending in `word` wins; the backoff weights
	///   of every longer stored context are added to it.
	/// - A word absent at every order falls back to the `<unk>` unigram,
	///   then to [`LOG_ZERO`]. Indices outside the vocabulary are `<unk>`.
	/// - Non-event words (`<s>`, pause) score [`LOG_ZERO`].
	///
	/// Never fails and never allocates.
	pub fn score(&self, history: &[WordIndex], word: WordIndex) -> LogP {
		let word = if (word as usize) < self.vocab.len() { word } else { UNKNOWN_INDEX };
		if !self.vocab.is_event(word) {
			return LOG_ZERO;
		}
		let history = &history[history.len().saturating_sub(self.order - 1)..];

		let mut logp = self.contexts.root().value().prob(word);
		let mut bow = 0.0;
		let mut id = ROOT;
		for &previous in history.iter().rev() {
			let Some(next) = self.contexts.child(id, previous) else {
				break;
			};
			id = next;
			let entry = self.contexts.node(id).value();
			bow += entry.bow;
			if let Some(p) = entry.prob(word) {
				logp = Some(p);
				bow = 0.0;
			}
		}

		match logp {
			Some(p) => p + bow,
			None => self.contexts.root().value().prob(UNKNOWN_INDEX).unwrap_or(LOG_ZERO),
		}
	}

	/// [`Model::score`] with words given as strings; unknown words map to
	/// `<unk>`.
	pub fn score_words<S: AsRef<str>>(&self, history: &[S], word: &str) -> LogP {
		let history: Vec<WordIndex> = history.iter().map(|w| self.vocab.index_of(w.as_ref())).collect();
		self.score(&history, self.vocab.index_of(word))
	}

	/// Whether `ngram` has an explicitly stored probability.
	pub fn contains(&self, ngram: &[WordIndex]) -> bool {
		self.ngram_prob(ngram).is_some()
	}

	/// Stored probability of `ngram`, without backoff.
	pub fn ngram_prob(&self, ngram: &[WordIndex]) -> Option<LogP> {
		let (&word, context) = ngram.split_last()?;
		let id = self.find_context(context)?;
		self.contexts.node(id).value().prob(word)
	}

	/// Backoff weight of a forward-ordered context; `0` (log of one) when
	/// the context is not stored.
	pub fn backoff_weight(&self, context: &[WordIndex]) -> LogP {
		self.find_context(context)
			.map_or(0.0, |id| self.contexts.node(id).value().bow)
	}

	/// Stores `p(ngram[last] | ngram[..last])`.
	pub(crate) fn set_prob(&mut self, ngram: &[WordIndex], logp: LogP) {
		if let Some((&word, context)) = ngram.split_last() {
			self.contexts
				.get_or_insert_mut(&Self::reversed(context))
				.probs
				.insert(word, logp);
		}
	}

	pub(crate) fn set_backoff_weight(&mut self, context: &[WordIndex], bow: LogP) {
		self.contexts.get_or_insert_mut(&Self::reversed(context)).bow = bow;
	}

	/// Scales the stored probabilities of `context` by `factor` (in linear
	/// space).
	pub(crate) fn rescale_context(&mut self, context: &[WordIndex], factor: f64) {
		if let Some(entry) = self.contexts.lookup_mut(&Self::reversed(context)) {
			let shift = factor.log10();
			for logp in entry.probs.values_mut() {
				*logp += shift;
			}
		}
	}

	/// Number of stored n-grams of length `order`.
	pub fn ngram_count(&self, order: usize) -> usize {
		if order == 0 {
			return 0;
		}
		self.contexts
			.iter_depth(order - 1)
			.map(|(_, _, node)| node.value().len())
			.sum()
	}

	/// Stored n-grams of length `order` with their probabilities, sorted by
	/// forward word order.
	pub fn ngrams(&self, order: usize) -> Vec<(Vec<WordIndex>, LogP)> {
		if order == 0 {
			return Vec::new();
		}
		let mut ngrams = Vec::with_capacity(self.ngram_count(order));
		for (key, _, node) in self.contexts.iter_depth(order - 1) {
			let context = Self::reversed(&key);
			for (word, logp) in node.value().sorted_probs() {
				let mut ngram = context.clone();
				ngram.push(word);
				ngrams.push((ngram, logp));
			}
		}
		ngrams.sort_unstable_by(|a, b| a.0.cmp(&b.0));
		ngrams
	}

	/// Writes a compact binary snapshot (postcard) to `path`, atomically.
	pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let bytes = postcard::to_stdvec(self)?;
		write_atomic(path, &bytes)
	}

	pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
		let bytes = fs::read(path)?;
		Ok(postcard::from_bytes(&bytes)?)
	}

	/// Loads an ARPA file, going through a binary cache stored beside it.
	///
	/// # Behavior
	/// - `data/model.arpa` is cached as `data/model.bin`.
	/// - If the cache exists it is loaded instead of parsing the text.
	/// - Otherwise the ARPA file is parsed and the cache is written.
	///
	/// # Notes
	/// The cache is not checked against the text file; delete it after
	/// editing the model.
	pub fn load_cached<P: AsRef<Path>>(path: P) -> Result<Self> {
		let binary_path = build_output_path(&path, "bin")?;
		if binary_path.exists() {
			debug!("loading cached model {}", binary_path.display());
			return Self::load_binary(binary_path);
		}
		let model = Self::load_arpa(&path)?;
		model.save_binary(&binary_path)?;
		Ok(model)
	}
}

impl LanguageModel for Model {
	fn order(&self) -> usize {
		self.order
	}

	fn specials(&self) -> &SpecialTokens {
		self.vocab.specials()
	}

	fn is_known(&self, word: &str) -> bool {
		self.vocab.get(word).is_some()
	}

	fn score_words(&self, history: &[&str], word: &str) -> LogP {
		Model::score_words(self, history, word)
	}
}
