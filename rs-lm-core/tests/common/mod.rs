#![allow(dead_code)]

use rs_lm_core::model::BuildOutcome;
use rs_lm_core::vocab::WordIndex;
use rs_lm_core::{BoundaryPolicy, BuildConfig, LogP, Model, NgramCounts, Vocabulary};

pub const CORPUS: &[&str] = &[
	"the cat sat on the mat",
	"the dog sat on the log",
	"a cat saw the dog",
	"the dog saw a cat on the mat",
	"a dog sat",
	"the cat ate the fish",
	"the fish swam",
	"a fish saw the cat",
	"the cat sat",
	"the dog ate",
	"a fish sat",
	"the cat ate",
];

pub fn counts(order: usize, lines: &[&str]) -> NgramCounts {
	let mut counts = NgramCounts::new(order, Vocabulary::default(), BoundaryPolicy::Include, false).unwrap();
	for line in lines {
		counts.count_line(line);
	}
	counts
}

pub fn build(config: &BuildConfig, lines: &[&str]) -> Model {
	estimate(config, lines).model
}

pub fn estimate(config: &BuildConfig, lines: &[&str]) -> BuildOutcome {
	counts(config.order, lines).estimate(config, None).unwrap()
}

/// The empty context plus every stored n-gram below the maximum order.
pub fn contexts(model: &Model) -> Vec<Vec<WordIndex>> {
	let mut contexts = vec![Vec::new()];
	for k in 1..model.order() {
		contexts.extend(model.ngrams(k).into_iter().map(|(ngram, _)| ngram));
	}
	contexts
}

pub fn distribution_sum(model: &Model, context: &[WordIndex]) -> f64 {
	model
		.vocabulary()
		.events()
		.map(|w| 10f64.powf(model.score(context, w)))
		.sum()
}

/// Backoff recursion written directly from its definition.
pub fn recursive_score(model: &Model, history: &[WordIndex], word: WordIndex) -> LogP {
	let mut ngram = history.to_vec();
	ngram.push(word);
	if let Some(p) = model.ngram_prob(&ngram) {
		return p;
	}
	if history.is_empty() {
		return model.ngram_prob(&[rs_lm_core::vocab::UNKNOWN_INDEX]).unwrap_or(rs_lm_core::model::LOG_ZERO);
	}
	model.backoff_weight(history) + recursive_score(model, &history[1..], word)
}
