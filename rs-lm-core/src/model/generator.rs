use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ngram_model::Model;
use crate::error::Result;
use crate::vocab::{END_INDEX, START_INDEX, WordIndex};

/// Random sentence generator over a [`Model`].
///
/// # Responsibilities
/// - Sample the next word from the full backoff distribution
/// - Produce sentences starting after `<s>` and stopping at `</s>`
///
/// Two generators built with [`SentenceGenerator::seeded`] and the same seed
/// produce the same sentences.
#[derive(Debug)]
pub struct SentenceGenerator<'a> {
	model: &'a Model,
	rng: StdRng,
	max_length: usize,
}

impl<'a> SentenceGenerator<'a> {
	/// Default cap on generated sentence length, in words.
	pub const MAX_LENGTH: usize = 100;

	/// Creates a generator seeded from the thread RNG.
	pub fn new(model: &'a Model) -> Self {
		Self::with_rng(model, StdRng::from_rng(&mut rand::rng()))
	}

	pub fn seeded(model: &'a Model, seed: u64) -> Self {
		Self::with_rng(model, StdRng::seed_from_u64(seed))
	}

	fn with_rng(model: &'a Model, rng: StdRng) -> Self {
		Self {
			model,
			rng,
			max_length: Self::MAX_LENGTH,
		}
	}

	#[must_use]
	pub fn with_max_length(mut self, max_length: usize) -> Self {
		self.max_length = max_length;
		self
	}

	/// Draws the word following `history`.
	///
	/// Performs an O(V) scan: every event is scored, then a bucket is picked
	/// by cumulative subtraction.
	///
	/// Returns `None` if the distribution is empty.
	pub fn next_word(&mut self, history: &[WordIndex]) -> Option<WordIndex> {
		let weights: Vec<(WordIndex, f64)> = self
			.model
			.vocabulary()
			.events()
			.map(|w| (w, 10f64.powf(self.model.score(history, w))))
			.collect();
		let total: f64 = weights.iter().map(|&(_, p)| p).sum();
		if !(total > 0.0) {
			return None;
		}

		let mut r = self.rng.random_range(0.0..total);
		let mut fallback = None;
		for (word, p) in weights {
			if r < p {
				return Some(word);
			}
			r -= p;
			fallback = Some(word);
		}

		// Rounding left `r` past the last bucket.
		fallback
	}

	/// Generates one sentence as vocabulary indices, boundaries excluded.
	pub fn sentence_indices(&mut self) -> Vec<WordIndex> {
		let mut history = vec![START_INDEX];
		while history.len() <= self.max_length {
			match self.next_word(&history) {
				Some(word) if word != END_INDEX => history.push(word),
				_ => break,
			}
		}
		history.remove(0);
		history
	}

	/// Generates one sentence as words.
	pub fn sentence(&mut self) -> Result<Vec<String>> {
		self.sentence_indices()
			.into_iter()
			.map(|w| self.model.vocabulary().word_of(w).map(str::to_owned))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vocab::Vocabulary;

	fn chain() -> Model {
		// a -> b -> </s>, deterministically
		let mut vocab = Vocabulary::default();
		let a = vocab.add("a");
		let b = vocab.add("b");
		let mut model = Model::new(2, vocab).unwrap();
		for w in [a, b, END_INDEX, crate::vocab::UNKNOWN_INDEX] {
			model.set_prob(&[w], -99.0);
		}
		model.set_prob(&[START_INDEX, a], 0.0);
		model.set_backoff_weight(&[START_INDEX], -99.0);
		model.set_prob(&[a, b], 0.0);
		model.set_backoff_weight(&[a], -99.0);
		model.set_prob(&[b, END_INDEX], 0.0);
		model.set_backoff_weight(&[b], -99.0);
		model
	}

	#[test]
	fn follows_certain_transitions() {
		let model = chain();
		let mut generator = SentenceGenerator::seeded(&model, 7);
		assert_eq!(generator.sentence().unwrap(), vec!["a", "b"]);
	}

	#[test]
	fn same_seed_same_sentences() {
		let model = chain();
		let mut first = SentenceGenerator::seeded(&model, 42).with_max_length(5);
		let mut second = SentenceGenerator::seeded(&model, 42).with_max_length(5);
		for _ in 0..3 {
			assert_eq!(first.sentence_indices(), second.sentence_indices());
		}
	}

	#[test]
	fn length_is_capped() {
		let mut vocab = Vocabulary::default();
		let a = vocab.add("a");
		let mut model = Model::new(1, vocab).unwrap();
		model.set_prob(&[a], 0.0);
		let mut generator = SentenceGenerator::seeded(&model, 1).with_max_length(4);
		assert_eq!(generator.sentence_indices().len(), 4);
	}
}
