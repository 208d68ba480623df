use log::warn;

use super::PROB_EPSILON;
use super::count_of_counts::CountOfCounts;
use crate::counts::Count;
use crate::error::{LmError, Result};

/// Katz-style Good–Turing discount coefficients for one order.
///
/// A count `r <= max_count` is replaced by `r * coefficient(r)`; counts above
/// the cutoff are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct GoodTuring {
	max_count: Count,
	/// Index `r` holds the coefficient for count `r`; index 0 is unused.
	coefficients: Vec<f64>,
}

impl GoodTuring {
	/// Derives the coefficients from the count-of-counts of `order`.
	///
	/// # Errors
	/// `InsufficientData` if any bucket `n_1 ..= n_{max_count + 1}` is empty:
	/// the re-estimation formula divides by or scales with each of them.
	///
	/// # Notes
	/// Coefficients falling outside `(0, 1]` are clamped to `1` (no
	/// discounting for that count) with a warning. When
	/// `(max_count + 1) * n_{max_count + 1} >= n_1` no count is discounted.
	pub fn new(order: usize, max_count: Count, coc: &CountOfCounts) -> Result<Self> {
		if max_count + 1 > CountOfCounts::MAX_BUCKET {
			return Err(LmError::InvalidConfig(format!(
				"Good-Turing cutoff {} exceeds the tracked maximum {}",
				max_count,
				CountOfCounts::MAX_BUCKET - 1
			)));
		}

		let mut coefficients = vec![1.0; max_count as usize + 1];
		if max_count == 0 {
			return Ok(Self { max_count, coefficients });
		}

		for r in 1..=max_count + 1 {
			if coc.get(r) == 0 {
				return Err(LmError::insufficient(
					"good-turing",
					order,
					format!("count-of-counts n_{r} is zero"),
				));
			}
		}

		let n = |r: Count| coc.get(r) as f64;
		let k = max_count as f64;
		let common = (k + 1.0) * n(max_count + 1) / n(1);
		if common >= 1.0 {
			warn!("order {order}: Good-Turing cutoff {max_count} leaves no mass to redistribute ({common}), not discounting");
			return Ok(Self { max_count, coefficients });
		}

		for r in 1..=max_count {
			let rf = r as f64;
			let raw = (rf + 1.0) * n(r + 1) / (rf * n(r));
			let coefficient = (raw - common) / (1.0 - common);
			coefficients[r as usize] = if !coefficient.is_finite() || coefficient <= PROB_EPSILON || coefficient > 1.0 || raw > 1.0 {
				warn!("order {order}: Good-Turing coefficient for count {r} out of range ({coefficient}), not discounting");
				1.0
			} else {
				coefficient
			};
		}

		Ok(Self { max_count, coefficients })
	}

	pub fn max_count(&self) -> Count {
		self.max_count
	}

	/// Multiplier applied to a count of `r`.
	pub fn coefficient(&self, r: Count) -> f64 {
		if r > self.max_count {
			1.0
		} else {
			self.coefficients[r as usize]
		}
	}
}
