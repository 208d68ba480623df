//! Discounting (smoothing) strategies.
//!
//! A strategy is configured per order with a [`DiscountMethod`], prepared
//! from that order's count-of-counts into a [`Discount`], then applied to
//! every context of the order through [`Discount::estimate`].
//!
//! Every estimate satisfies `sum(probs) + leftover == 1` (within
//! floating-point tolerance). The leftover is what the builder turns into the
//! context's backoff weight.

/// Count-of-counts statistics (`n_r`).
pub mod count_of_counts;

/// Katz-style Good–Turing coefficients.
pub mod good_turing;

/// (Modified) Kneser–Ney discounts and the distinct-context count pass.
pub mod kneser_ney;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::counts::Count;
use crate::error::{LmError, Result};
use crate::vocab::WordIndex;
use count_of_counts::CountOfCounts;
use good_turing::GoodTuring;
use kneser_ney::KneserNey;

/// Probabilities closer than this to zero are treated as zero.
pub const PROB_EPSILON: f64 = 3e-6;

/// Configured smoothing strategy for one order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum DiscountMethod {
	/// Add `delta` to every count of the event vocabulary (Laplace for 1).
	Additive { delta: f64 },
	/// Katz/Good–Turing with counts above `max_count` left undiscounted.
	GoodTuring { max_count: Count },
	/// Witten–Bell: mass for unseen words proportional to distinct followers.
	WittenBell,
	/// Ney's linear discounting: every count scaled by `1 - n1 / N`.
	Linear,
	/// Absolute discounting with a fixed `discount` in `[0, 1)`.
	Constant { discount: f64 },
	/// Kneser–Ney; `modified` selects three discount bands.
	KneserNey { modified: bool },
	/// Ristad's natural law of succession.
	Natural,
}

impl DiscountMethod {
	pub fn name(&self) -> &'static str {
		match self {
			DiscountMethod::Additive { .. } => "additive",
			DiscountMethod::GoodTuring { .. } => "good-turing",
			DiscountMethod::WittenBell => "witten-bell",
			DiscountMethod::Linear => "linear",
			DiscountMethod::Constant { .. } => "constant",
			DiscountMethod::KneserNey { modified: false } => "kneser-ney",
			DiscountMethod::KneserNey { modified: true } => "modified-kneser-ney",
			DiscountMethod::Natural => "natural",
		}
	}

	/// Whether lower orders must be estimated from distinct-context counts.
	pub fn uses_distinct_contexts(&self) -> bool {
		matches!(self, DiscountMethod::KneserNey { .. })
	}

	/// Checks parameters that do not depend on data.
	pub fn validate(&self) -> Result<()> {
		match *self {
			DiscountMethod::Additive { delta } if !(delta > 0.0 && delta.is_finite()) => {
				Err(LmError::InvalidConfig(format!("additive delta must be positive, got {delta}")))
			}
			DiscountMethod::Constant { discount } if !(0.0..1.0).contains(&discount) => {
				Err(LmError::InvalidConfig(format!("constant discount must be in [0, 1), got {discount}")))
			}
			DiscountMethod::GoodTuring { max_count } if max_count + 1 > CountOfCounts::MAX_BUCKET => Err(
				LmError::InvalidConfig(format!("Good-Turing cutoff {max_count} is too large")),
			),
			_ => Ok(()),
		}
	}
}

/// A strategy prepared with the global statistics of its order.
#[derive(Debug, Clone, PartialEq)]
pub enum Discount {
	Additive { delta: f64 },
	GoodTuring(GoodTuring),
	WittenBell,
	/// Fraction of each count removed.
	Linear { alpha: f64 },
	Constant { discount: f64 },
	KneserNey(KneserNey),
	Natural,
}

/// Observed event counts at one context.
///
/// `counts` must be sorted by word index; sums are accumulated in that order
/// so estimation is reproducible bit for bit.
#[derive(Debug, Clone, Copy)]
pub struct ContextCounts<'a> {
	pub counts: &'a [(WordIndex, Count)],
	/// N-grams below this count are left out of the explicit distribution.
	pub min_count: Count,
	/// Number of predictable words in the vocabulary.
	pub vocab_size: usize,
}

/// Result of discounting one context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Estimate {
	/// Discounted probabilities of the explicitly kept words, ascending index.
	pub probs: Vec<(WordIndex, f64)>,
	/// Mass left for words reached through backoff.
	pub leftover: f64,
}

struct Stats {
	total: f64,
	observed: f64,
	vocab_size: f64,
}

impl Discount {
	/// Prepares `method` for `order` from that order's count-of-counts.
	///
	/// # Errors
	/// `InsufficientData` when the statistics cannot support the method (see
	/// [`GoodTuring::new`] and [`KneserNey::new`]); `InvalidConfig` for bad
	/// parameters.
	pub fn prepare(method: &DiscountMethod, order: usize, coc: &CountOfCounts) -> Result<Self> {
		method.validate()?;
		Ok(match *method {
			DiscountMethod::Additive { delta } => Discount::Additive { delta },
			DiscountMethod::GoodTuring { max_count } => Discount::GoodTuring(GoodTuring::new(order, max_count, coc)?),
			DiscountMethod::WittenBell => Discount::WittenBell,
			DiscountMethod::Linear => Discount::Linear { alpha: linear_alpha(order, coc)? },
			DiscountMethod::Constant { discount } => Discount::Constant { discount },
			DiscountMethod::KneserNey { modified } => Discount::KneserNey(KneserNey::new(order, modified, coc)?),
			DiscountMethod::Natural => Discount::Natural,
		})
	}

	fn prob(&self, c: Count, denominator: f64, stats: &Stats) -> f64 {
		let cf = c as f64;
		match self {
			Discount::Additive { delta } => (cf + delta) / (denominator + delta * stats.vocab_size),
			Discount::GoodTuring(gt) => cf * gt.coefficient(c) / denominator,
			Discount::WittenBell => cf / (denominator + stats.observed),
			Discount::Linear { alpha } => (1.0 - alpha) * cf / denominator,
			Discount::Constant { discount } => (cf - discount).max(0.0) / denominator,
			Discount::KneserNey(kn) => (cf - kn.discount(c)).max(0.0) / denominator,
			Discount::Natural => {
				let n = denominator;
				let q = stats.observed;
				let factor = if q >= stats.vocab_size {
					1.0
				} else {
					(n * (n + 1.0) + q * (1.0 - q)) / (n * (n + 1.0 + 2.0 * q))
				};
				factor * cf / denominator
			}
		}
	}

	/// Discounts the counts observed at one context.
	///
	/// # Behavior
	/// - Words below `min_count` are dropped; their mass joins the leftover.
	/// - If no mass is left while some events were never seen here, the
	///   estimate is retried once with the denominator incremented by one.
	/// - An empty context yields `leftover == 1`.
	pub fn estimate(&self, context: &ContextCounts) -> Estimate {
		let total: Count = context.counts.iter().map(|&(_, c)| c).sum();
		if total == 0 {
			return Estimate { probs: Vec::new(), leftover: 1.0 };
		}

		let stats = Stats {
			total: total as f64,
			observed: context.counts.iter().filter(|&&(_, c)| c > 0).count() as f64,
			vocab_size: context.vocab_size as f64,
		};
		let kept: Vec<(WordIndex, Count)> = context
			.counts
			.iter()
			.copied()
			.filter(|&(_, c)| c > 0 && c >= context.min_count)
			.collect();

		let mut bump = 0.0;
		loop {
			let denominator = stats.total + bump;
			let probs: Vec<(WordIndex, f64)> = kept
				.iter()
				.map(|&(w, c)| (w, self.prob(c, denominator, &stats)))
				.filter(|&(_, p)| p > 0.0)
				.collect();
			let sum: f64 = probs.iter().map(|&(_, p)| p).sum();
			let leftover = 1.0 - sum;

			if leftover < PROB_EPSILON && kept.len() < context.vocab_size && bump == 0.0 {
				debug!("no backoff mass left ({leftover:e}), incrementing denominator");
				bump = 1.0;
				continue;
			}

			return Estimate {
				probs,
				leftover: leftover.max(0.0),
			};
		}
	}
}

/// `n1 / N` over the whole order: the share of tokens seen exactly once.
fn linear_alpha(order: usize, coc: &CountOfCounts) -> Result<f64> {
	if coc.get(1) == 0 || coc.total() == 0 {
		return Err(LmError::insufficient("linear", order, "no singleton n-grams"));
	}
	let alpha = coc.get(1) as f64 / coc.total() as f64;
	if alpha >= 1.0 {
		return Err(LmError::insufficient("linear", order, "every n-gram is a singleton"));
	}
	Ok(alpha)
}
