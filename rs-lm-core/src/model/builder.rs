use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::ngram_model::{LOG_ZERO, LogP, Model};
use crate::config::{BuildConfig, OrderConfig};
use crate::counts::{self, Count, NgramCounts};
use crate::discount::count_of_counts::CountOfCounts;
use crate::discount::kneser_ney::rewrite_with_distinct_contexts;
use crate::discount::{ContextCounts, Discount, Estimate, PROB_EPSILON};
use crate::error::{LmError, Result};
use crate::vocab::{START_INDEX, WordIndex};

/// Shared flag used to abort a running estimation from another thread.
///
/// Checked between contexts; a cancelled estimation returns
/// [`LmError::Cancelled`] and the counts it consumed are lost.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// A discount replaced by its configured fallback.
#[derive(Clone, Debug, PartialEq)]
pub struct Fallback {
	pub order: usize,
	pub from: &'static str,
	pub to: &'static str,
	pub reason: String,
}

/// What happened during estimation besides the model itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstimationReport {
	/// Stored n-grams per order, index 0 being unigrams.
	pub ngrams: Vec<usize>,
	/// Contexts whose backoff weight could not be computed and were given a
	/// neutral weight instead.
	pub degenerate_contexts: usize,
	/// Contexts dropped because their own n-gram was not kept at the lower
	/// order.
	pub skipped_contexts: usize,
	pub fallbacks: Vec<Fallback>,
}

#[derive(Debug)]
pub struct BuildOutcome {
	pub model: Model,
	pub report: EstimationReport,
}

struct Discounted {
	context: Vec<WordIndex>,
	estimate: Estimate,
}

struct Weighted<'a> {
	context: &'a [WordIndex],
	probs: Vec<(WordIndex, f64)>,
	bow: Result<LogP>,
	kept_mass: f64,
}

fn check(cancel: Option<&CancelToken>) -> Result<()> {
	match cancel {
		Some(token) if token.is_cancelled() => Err(LmError::Cancelled),
		_ => Ok(()),
	}
}

fn to_log(p: f64) -> LogP {
	if p > 0.0 { p.log10() } else { LOG_ZERO }
}

/// Estimates a back-off model from raw counts.
///
/// # Parameters
/// - `counts`: consumed; Kneser–Ney rewrites them in place.
/// - `config`: per-order discounts, cutoffs and interpolation. Its order may
///   be lower than the counts' order.
/// - `cancel`: optional token checked between contexts.
///
/// # Behavior
/// 1. Orders are discounted from the highest down: count-of-counts,
///    distinct-context rewriting for Kneser–Ney lower orders, discount
///    preparation (with the configured fallback on `InsufficientData`) and
///    per-context discounting, contexts in parallel.
/// 2. Probabilities and backoff weights are then fixed from unigrams up,
///    each order relying on the finished lower orders.
///
/// Results are identical from run to run: contexts are visited in index
/// order and parallel results are collected in that order.
///
/// # Errors
/// - `InvalidConfig` / `ConfigMismatch` for settings that do not fit the
///   counts
/// - `InsufficientData` from a discount without fallback
/// - `Cancelled`
pub fn estimate(counts: NgramCounts, config: &BuildConfig, cancel: Option<&CancelToken>) -> Result<BuildOutcome> {
	config.validate()?;
	if config.order > counts.order() {
		return Err(LmError::ConfigMismatch(format!(
			"cannot estimate order {} from order {} counts",
			config.order,
			counts.order()
		)));
	}
	if counts.vocabulary().specials() != &config.specials {
		return Err(LmError::ConfigMismatch("counts and configuration use different special tokens".to_owned()));
	}

	let order = config.order;
	let (vocab, mut trie, _) = counts.into_parts();
	let vocab_size = vocab.event_count();
	let mut report = EstimationReport::default();

	let mut discounted: Vec<Vec<Discounted>> = (0..=order).map(|_| Vec::new()).collect();
	for k in (1..=order).rev() {
		check(cancel)?;
		let settings = config.order_config(k);
		if k < order && settings.discount.uses_distinct_contexts() {
			rewrite_with_distinct_contexts(&mut trie, k);
		}
		let coc = counts::count_of_counts(&trie, &vocab, k);
		let discount = prepare(settings, k, &coc, &mut report)?;

		let contexts: Vec<(Vec<WordIndex>, Vec<(WordIndex, Count)>)> = trie
			.iter_depth(k - 1)
			.filter(|(_, _, node)| node.has_children())
			.map(|(key, _, node)| {
				let followers = node
					.sorted_children()
					.into_iter()
					.filter(|&(w, _)| vocab.is_event(w))
					.map(|(w, id)| (w, *trie.node(id).value()))
					.collect();
				(key, followers)
			})
			.collect();

		discounted[k] = contexts
			.into_par_iter()
			.map(|(context, followers)| {
				check(cancel)?;
				let estimate = discount.estimate(&ContextCounts {
					counts: &followers,
					min_count: settings.min_count,
					vocab_size,
				});
				Ok(Discounted { context, estimate })
			})
			.collect::<Result<Vec<_>>>()?;
		debug!("order {k}: discounted {} contexts with {}", discounted[k].len(), settings.discount.name());
	}
	drop(trie);

	let mut model = Model::new(order, vocab)?;
	check(cancel)?;
	let unigrams = discounted[1]
		.first()
		.map(|d| d.estimate.clone())
		.unwrap_or(Estimate { probs: Vec::new(), leftover: 1.0 });
	set_unigrams(&mut model, &unigrams);

	for k in 2..=order {
		check(cancel)?;
		let interpolate = config.order_config(k).interpolate;
		let level = std::mem::take(&mut discounted[k]);
		let (kept, skipped): (Vec<Discounted>, Vec<Discounted>) =
			level.into_iter().partition(|d| model.contains(&d.context));
		report.skipped_contexts += skipped.len();

		let weighted = kept
			.par_iter()
			.map(|d| {
				check(cancel)?;
				Ok(weigh(&model, d, interpolate))
			})
			.collect::<Result<Vec<_>>>()?;

		let mut ngram = Vec::with_capacity(k);
		for entry in weighted {
			for &(word, p) in &entry.probs {
				ngram.clear();
				ngram.extend_from_slice(entry.context);
				ngram.push(word);
				model.set_prob(&ngram, to_log(p));
			}
			let bow = match entry.bow {
				Ok(bow) => bow,
				Err(err) => {
					warn!("{err}; using a neutral backoff weight");
					report.degenerate_contexts += 1;
					if entry.kept_mass > 0.0 {
						model.rescale_context(entry.context, 1.0 / entry.kept_mass);
					}
					0.0
				}
			};
			model.set_backoff_weight(entry.context, bow);
		}
		debug!("order {k}: weighted {} contexts, skipped {}", kept.len(), skipped.len());
	}

	report.ngrams = (1..=order).map(|k| model.ngram_count(k)).collect();
	info!(
		"estimated order {order} model: {:?} n-grams, {} degenerate contexts, {} fallbacks",
		report.ngrams,
		report.degenerate_contexts,
		report.fallbacks.len()
	);
	Ok(BuildOutcome { model, report })
}

/// Prepares the configured discount, switching to the fallback when the
/// count-of-counts cannot support it.
fn prepare(settings: &OrderConfig, order: usize, coc: &CountOfCounts, report: &mut EstimationReport) -> Result<Discount> {
	let err = match Discount::prepare(&settings.discount, order, coc) {
		Ok(discount) => return Ok(discount),
		Err(err @ LmError::InsufficientData { .. }) => err,
		Err(err) => return Err(err),
	};
	let Some(fallback) = &settings.fallback else {
		return Err(err);
	};
	warn!("{err}; falling back to {}", fallback.name());
	report.fallbacks.push(Fallback {
		order,
		from: settings.discount.name(),
		to: fallback.name(),
		reason: err.to_string(),
	});
	Discount::prepare(fallback, order, coc)
}

/// Unigrams have no lower order: the leftover is shared evenly by the events
/// never kept, or, when every event was kept, the kept mass is scaled to one.
fn set_unigrams(model: &mut Model, estimate: &Estimate) {
	let seen: FxHashMap<WordIndex, f64> = estimate.probs.iter().copied().collect();
	let events: Vec<WordIndex> = model.vocabulary().events().collect();
	let unseen = events.iter().filter(|w| !seen.contains_key(w)).count();
	let (share, scale) = if unseen > 0 {
		(estimate.leftover / unseen as f64, 1.0)
	} else {
		(0.0, 1.0 / (1.0 - estimate.leftover))
	};
	for word in events {
		let p = seen.get(&word).map_or(share, |&p| p * scale);
		model.set_prob(&[word], to_log(p));
	}
	model.set_prob(&[START_INDEX], LOG_ZERO);
}

/// Final probabilities and backoff weight of one context, reading only
/// lower orders of `model`.
fn weigh<'a>(model: &Model, discounted: &'a Discounted, interpolate: bool) -> Weighted<'a> {
	let context = discounted.context.as_slice();
	let lower = &context[1..];
	let leftover = discounted.estimate.leftover;

	let mut probs = Vec::with_capacity(discounted.estimate.probs.len());
	let mut kept_mass = 0.0;
	let mut lower_mass = 0.0;
	for &(word, p) in &discounted.estimate.probs {
		let p_lower = 10f64.powf(model.score(lower, word));
		let p = if interpolate { p + leftover * p_lower } else { p };
		kept_mass += p;
		lower_mass += p_lower;
		probs.push((word, p));
	}

	Weighted {
		context,
		probs,
		bow: backoff_weight(context, 1.0 - kept_mass, 1.0 - lower_mass),
		kept_mass,
	}
}

/// `log10(numerator / denominator)`: the mass left at the context over the
/// lower-order mass of the words it did not see.
///
/// # Errors
/// `DegenerateContext` if mass is left but the lower order has none to
/// give.
fn backoff_weight(context: &[WordIndex], numerator: f64, denominator: f64) -> Result<LogP> {
	if numerator <= PROB_EPSILON && denominator <= PROB_EPSILON {
		return Ok(0.0);
	}
	if denominator <= PROB_EPSILON {
		return Err(LmError::DegenerateContext {
			context: context.to_vec(),
			numerator,
			denominator,
		});
	}
	if numerator <= 0.0 {
		return Ok(LOG_ZERO);
	}
	Ok((numerator / denominator).log10())
}
