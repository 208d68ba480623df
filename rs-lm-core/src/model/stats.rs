use std::fmt;

use super::LanguageModel;
use super::ngram_model::Model;
use crate::counts::BoundaryPolicy;

/// Running totals of a scoring pass over text.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextStats {
	pub sentences: u64,
	/// Words scored, `</s>` excluded.
	pub words: u64,
	/// Words missing from the vocabulary (scored as `<unk>`).
	pub oovs: u64,
	/// Scored tokens, `</s>` included.
	pub predictions: u64,
	/// Total base-10 log probability.
	pub logprob: f64,
}

impl TextStats {
	pub fn add(&mut self, other: &TextStats) {
		self.sentences += other.sentences;
		self.words += other.words;
		self.oovs += other.oovs;
		self.predictions += other.predictions;
		self.logprob += other.logprob;
	}

	/// Perplexity over every prediction, sentence ends included.
	pub fn ppl(&self) -> f64 {
		perplexity(self.logprob, self.predictions)
	}

	/// Perplexity per word, sentence ends not counted as words.
	pub fn ppl1(&self) -> f64 {
		perplexity(self.logprob, self.words)
	}
}

fn perplexity(logprob: f64, count: u64) -> f64 {
	if count == 0 {
		return f64::NAN;
	}
	10f64.powf(-logprob / count as f64)
}

impl fmt::Display for TextStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{} sentences, {} words, {} OOVs", self.sentences, self.words, self.oovs)?;
		write!(f, "logprob= {:.4} ppl= {:.4} ppl1= {:.4}", self.logprob, self.ppl(), self.ppl1())
	}
}

/// Scores one tokenized sentence with any [`LanguageModel`].
///
/// Pause tokens are skipped. With [`BoundaryPolicy::Include`] the history
/// starts at `<s>` and `</s>` is scored at the end.
pub fn sentence_stats<M: LanguageModel + ?Sized>(model: &M, words: &[&str], boundaries: BoundaryPolicy) -> TextStats {
	let specials = model.specials();
	let keep = model.order().saturating_sub(1);
	let mut stats = TextStats {
		sentences: 1,
		..TextStats::default()
	};
	let mut history: Vec<&str> = Vec::with_capacity(words.len() + 1);
	if boundaries == BoundaryPolicy::Include {
		history.push(specials.start.as_str());
	}

	for &word in words {
		if word == specials.pause {
			continue;
		}
		let recent = &history[history.len().saturating_sub(keep)..];
		stats.logprob += model.score_words(recent, word);
		stats.words += 1;
		stats.predictions += 1;
		if !model.is_known(word) {
			stats.oovs += 1;
		}
		history.push(word);
	}

	if boundaries == BoundaryPolicy::Include {
		let recent = &history[history.len().saturating_sub(keep)..];
		stats.logprob += model.score_words(recent, specials.end.as_str());
		stats.predictions += 1;
	}
	stats
}

/// Scores whitespace-tokenized lines; blank lines are skipped.
pub fn text_stats<M, I, S>(model: &M, lines: I, boundaries: BoundaryPolicy) -> TextStats
where
	M: LanguageModel + ?Sized,
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut total = TextStats::default();
	for line in lines {
		let words: Vec<&str> = line.as_ref().split_whitespace().collect();
		if !words.is_empty() {
			total.add(&sentence_stats(model, &words, boundaries));
		}
	}
	total
}

impl Model {
	pub fn sentence_stats(&self, words: &[&str], boundaries: BoundaryPolicy) -> TextStats {
		sentence_stats(self, words, boundaries)
	}

	pub fn text_stats<I: IntoIterator<Item = S>, S: AsRef<str>>(&self, lines: I, boundaries: BoundaryPolicy) -> TextStats {
		text_stats(self, lines, boundaries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vocab::{END_INDEX, Vocabulary};

	fn uniform() -> Model {
		let mut vocab = Vocabulary::default();
		let a = vocab.add("a");
		let mut model = Model::new(2, vocab).unwrap();
		for w in [a, END_INDEX, crate::vocab::UNKNOWN_INDEX] {
			model.set_prob(&[w], (1.0f64 / 3.0).log10());
		}
		model
	}

	#[test]
	fn uniform_model_perplexity_is_vocabulary_size() {
		let model = uniform();
		let stats = model.text_stats(["a a", "", "a zebra"], BoundaryPolicy::Include);
		assert_eq!(stats.sentences, 2);
		assert_eq!(stats.words, 4);
		assert_eq!(stats.oovs, 1);
		assert_eq!(stats.predictions, 6);
		assert!((stats.ppl() - 3.0).abs() < 1e-9);
		assert!(stats.ppl1() > stats.ppl());
	}

	#[test]
	fn pauses_are_not_scored() {
		let model = uniform();
		let with = model.sentence_stats(&["a", "-pau-", "a"], BoundaryPolicy::Exclude);
		let without = model.sentence_stats(&["a", "a"], BoundaryPolicy::Exclude);
		assert_eq!(with, without);
		assert_eq!(with.predictions, 2);
	}
}
