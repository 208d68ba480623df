mod common;

use std::thread;

use common::{CORPUS, build, contexts, counts, distribution_sum, estimate, recursive_score};
use rs_lm_core::model::{CancelToken, LOG_ZERO};
use rs_lm_core::{BoundaryPolicy, BuildConfig, DiscountMethod, LmError, NgramCounts, Vocabulary};

fn methods() -> Vec<DiscountMethod> {
	vec![
		DiscountMethod::Additive { delta: 1.0 },
		DiscountMethod::GoodTuring { max_count: 2 },
		DiscountMethod::WittenBell,
		DiscountMethod::Linear,
		DiscountMethod::Constant { discount: 0.5 },
		DiscountMethod::KneserNey { modified: false },
		DiscountMethod::KneserNey { modified: true },
		DiscountMethod::Natural,
	]
}

fn config(method: DiscountMethod, interpolate: bool) -> BuildConfig {
	let mut config = BuildConfig::new(3, method).with_interpolation(interpolate);
	for k in 1..=3 {
		config = config.with_fallback(k, DiscountMethod::WittenBell).unwrap();
	}
	config
}

#[test]
fn every_context_distribution_sums_to_one() {
	for method in methods() {
		for interpolate in [false, true] {
			let outcome = estimate(&config(method.clone(), interpolate), CORPUS);
			if matches!(method, DiscountMethod::KneserNey { .. }) {
				assert_eq!(outcome.report.fallbacks, vec![], "{} fell back", method.name());
			}
			let model = outcome.model;
			for context in contexts(&model) {
				let sum = distribution_sum(&model, &context);
				assert!(
					(sum - 1.0).abs() < 1e-5,
					"{} (interpolate {interpolate}): context {context:?} sums to {sum}",
					method.name()
				);
			}
		}
	}
}

#[test]
fn scores_follow_the_backoff_recursion() {
	for method in [DiscountMethod::WittenBell, DiscountMethod::KneserNey { modified: true }] {
		let model = build(&config(method, false), CORPUS);
		let events: Vec<_> = model.vocabulary().events().collect();
		for context in contexts(&model) {
			for &word in &events {
				let expected = recursive_score(&model, &context, word);
				assert!((model.score(&context, word) - expected).abs() < 1e-9, "{context:?} -> {word}");
			}
		}
	}
}

#[test]
fn history_is_truncated_to_order_minus_one() {
	let model = build(&config(DiscountMethod::WittenBell, false), CORPUS);
	let vocab = model.vocabulary();
	let long: Vec<_> = ["a", "dog", "saw", "the", "cat"].iter().map(|w| vocab.index_of(w)).collect();
	for word in vocab.events() {
		assert_eq!(model.score(&long, word), model.score(&long[3..], word));
	}
}

#[test]
fn the_cat_sat_with_additive_smoothing() {
	let config = BuildConfig::new(2, DiscountMethod::Additive { delta: 1.0 });
	let model = build(&config, &["the cat sat"]);
	let vocab = model.vocabulary();
	// </s> <unk> the cat sat
	assert_eq!(vocab.event_count(), 5);

	let the = vocab.index_of("the");
	let cat = vocab.index_of("cat");
	let sat = vocab.index_of("sat");
	assert!((model.score(&[the], cat) - (2.0f64 / 6.0).log10()).abs() < 1e-9);

	let backed_off = model.backoff_weight(&[sat]) + model.score(&[], the);
	assert!((model.score(&[sat], the) - backed_off).abs() < 1e-12);
	// leftover 4/6 over the unigram mass not taken by </s> (1 - 2/9)
	assert!((model.backoff_weight(&[sat]) - (6.0f64 / 7.0).log10()).abs() < 1e-9);
	assert!((model.score(&[], the) - (2.0f64 / 9.0).log10()).abs() < 1e-9);
}

#[test]
fn good_turing_without_doubletons_fails() {
	let config = BuildConfig::new(2, DiscountMethod::GoodTuring { max_count: 1 });
	match counts(2, &["the cat sat"]).estimate(&config, None) {
		Err(LmError::InsufficientData { method, order, .. }) => {
			assert_eq!(method, "good-turing");
			assert_eq!(order, 2);
		}
		other => panic!("expected InsufficientData, got {other:?}"),
	}
}

#[test]
fn unknown_words_score_finitely() {
	let model = build(&config(DiscountMethod::KneserNey { modified: false }, true), CORPUS);
	let score = model.score_words(&["the"], "zebra");
	assert!(score.is_finite());
	assert!(score > LOG_ZERO);
	assert_eq!(score, model.score_words(&["the"], "<unk>"));
}

#[test]
fn min_count_drops_rare_ngrams() {
	let config = BuildConfig::new(2, DiscountMethod::WittenBell).with_min_count(2, 2).unwrap();
	let model = build(&config, CORPUS);
	let vocab = model.vocabulary();
	let ngram = |a: &str, b: &str| [vocab.index_of(a), vocab.index_of(b)];
	assert!(model.contains(&ngram("the", "cat")));
	assert!(!model.contains(&ngram("fish", "swam")));
	for context in contexts(&model) {
		assert!((distribution_sum(&model, &context) - 1.0).abs() < 1e-5);
	}
}

#[test]
fn estimation_is_deterministic() {
	let config = config(DiscountMethod::KneserNey { modified: true }, true);
	let render = || {
		let outcome = estimate(&config, CORPUS);
		assert!(outcome.report.fallbacks.is_empty());
		let mut out = Vec::new();
		outcome.model.write_arpa(&mut out).unwrap();
		out
	};
	assert_eq!(render(), render());
}

#[test]
fn good_turing_with_a_crowded_cutoff_stays_normalized() {
	// n1 = 4, n2 = 1, n3 = 2: the cutoff bucket outweighs the singletons
	let config = BuildConfig::new(1, DiscountMethod::GoodTuring { max_count: 2 }).with_boundaries(BoundaryPolicy::Exclude);
	let mut counts = NgramCounts::new(1, Vocabulary::default(), BoundaryPolicy::Exclude, false).unwrap();
	counts.count_line("a b c d e e f f f g g g");
	let model = counts.estimate(&config, None).unwrap().model;
	let sum = distribution_sum(&model, &[]);
	assert!((sum - 1.0).abs() < 1e-9, "unigrams sum to {sum}");
}

#[test]
fn context_covering_every_event_gets_a_neutral_weight() {
	let mut vocab = Vocabulary::default();
	vocab.add("a");
	vocab.add("b");
	let mut counts = NgramCounts::new(2, vocab, BoundaryPolicy::Include, true).unwrap();
	// "a" is followed by </s>, <unk>, "a" and "b"; every unigram is seen too
	for line in ["a", "a zzz", "a a", "a b"] {
		counts.count_line(line);
	}
	let config = BuildConfig::new(2, DiscountMethod::WittenBell).with_closed_vocabulary(true);
	let outcome = counts.estimate(&config, None).unwrap();
	assert_eq!(outcome.report.degenerate_contexts, 1);

	let model = outcome.model;
	let a = model.vocabulary().index_of("a");
	assert_eq!(model.backoff_weight(&[a]), 0.0);
	assert!((distribution_sum(&model, &[a]) - 1.0).abs() < 1e-9);
	for context in contexts(&model) {
		assert!((distribution_sum(&model, &context) - 1.0).abs() < 1e-5);
	}
}

#[test]
fn merged_counts_give_the_same_model() {
	let config = config(DiscountMethod::WittenBell, false);
	let mut merged = counts(3, &CORPUS[..4]);
	merged.merge(&counts(3, &CORPUS[4..])).unwrap();

	let mut a = Vec::new();
	let mut b = Vec::new();
	merged.estimate(&config, None).unwrap().model.write_arpa(&mut a).unwrap();
	build(&config, CORPUS).write_arpa(&mut b).unwrap();
	assert_eq!(a, b);
}

#[test]
fn cancelled_estimation_stops() {
	let token = CancelToken::new();
	let canceller = token.clone();
	thread::spawn(move || canceller.cancel()).join().unwrap();
	let result = counts(3, CORPUS).estimate(&config(DiscountMethod::WittenBell, false), Some(&token));
	assert!(matches!(result, Err(LmError::Cancelled)));
}

#[test]
fn scoring_is_thread_safe() {
	let model = build(&config(DiscountMethod::WittenBell, true), CORPUS);
	let events: Vec<_> = model.vocabulary().events().collect();
	let contexts = contexts(&model);
	let expected: Vec<f64> = contexts
		.iter()
		.flat_map(|c| events.iter().map(|&w| model.score(c, w)))
		.collect();

	thread::scope(|scope| {
		let handles: Vec<_> = (0..4)
			.map(|_| {
				scope.spawn(|| {
					contexts
						.iter()
						.flat_map(|c| events.iter().map(|&w| model.score(c, w)))
						.collect::<Vec<f64>>()
				})
			})
			.collect();
		for handle in handles {
			assert_eq!(handle.join().unwrap(), expected);
		}
	});
}
