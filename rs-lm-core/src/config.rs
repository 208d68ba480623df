use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::counts::{BoundaryPolicy, Count};
use crate::discount::DiscountMethod;
use crate::error::{LmError, Result};
use crate::vocab::SpecialTokens;

fn default_min_count() -> Count {
	1
}

/// Estimation settings for a single order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderConfig {
	/// Discount applied to every context of the order.
	pub discount: DiscountMethod,

	/// Used instead of `discount` when the data cannot support it
	/// (`InsufficientData`). Without one, the error aborts estimation.
	#[serde(default)]
	pub fallback: Option<DiscountMethod>,

	/// N-grams seen fewer times are dropped; their mass goes to backoff.
	#[serde(default = "default_min_count")]
	pub min_count: Count,

	/// Interpolate with the lower order instead of pure backoff. Ignored for
	/// unigrams.
	#[serde(default)]
	pub interpolate: bool,
}

impl OrderConfig {
	pub fn new(discount: DiscountMethod) -> Self {
		Self {
			discount,
			fallback: None,
			min_count: default_min_count(),
			interpolate: false,
		}
	}
}

/// Everything needed to count a corpus and estimate a model from it.
///
/// # Responsibilities
/// - Hold the global settings (`order`, boundaries, vocabulary policy)
/// - Hold one [`OrderConfig`] per order, index 0 being unigrams
///
/// # Invariants (checked by [`BuildConfig::validate`])
/// - `order >= 1` and `orders.len() == order`
/// - Every discount method has valid parameters
///
/// Can be written by hand as JSON:
/// ```json
/// { "order": 3, "orders": [
///     { "discount": { "method": "witten-bell" } },
///     { "discount": { "method": "kneser-ney", "modified": true } },
///     { "discount": { "method": "kneser-ney", "modified": true }, "min_count": 2 } ] }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BuildConfig {
	pub order: usize,

	#[serde(default)]
	pub boundaries: BoundaryPolicy,

	/// Map words missing from the starting vocabulary to `<unk>`.
	#[serde(default)]
	pub closed_vocabulary: bool,

	/// Fold every word to lowercase.
	#[serde(default)]
	pub lowercase: bool,

	#[serde(default)]
	pub specials: SpecialTokens,

	pub orders: Vec<OrderConfig>,
}

impl BuildConfig {
	/// Same discount for every order, default settings otherwise.
	pub fn new(order: usize, discount: DiscountMethod) -> Self {
		Self {
			order,
			boundaries: BoundaryPolicy::default(),
			closed_vocabulary: false,
			lowercase: false,
			specials: SpecialTokens::default(),
			orders: vec![OrderConfig::new(discount); order],
		}
	}

	/// Reads a configuration from a JSON file and validates it.
	pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		Self::from_json_str(&fs::read_to_string(path)?)
	}

	pub fn from_json_str(json: &str) -> Result<Self> {
		let config: Self = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	/// # Errors
	/// `InvalidConfig` when an invariant listed on [`BuildConfig`] is broken.
	pub fn validate(&self) -> Result<()> {
		if self.order == 0 {
			return Err(LmError::InvalidConfig("order must be at least 1".to_owned()));
		}
		if self.orders.len() != self.order {
			return Err(LmError::InvalidConfig(format!(
				"{} order settings given for order {}",
				self.orders.len(),
				self.order
			)));
		}
		for settings in &self.orders {
			settings.discount.validate()?;
			if let Some(fallback) = &settings.fallback {
				fallback.validate()?;
			}
		}
		Ok(())
	}

	/// Settings of `order` (1-based).
	///
	/// # Panics
	/// If `order` is zero or above the configured order.
	pub fn order_config(&self, order: usize) -> &OrderConfig {
		&self.orders[order - 1]
	}

	fn order_config_mut(&mut self, order: usize) -> Result<&mut OrderConfig> {
		let max = self.order;
		order
			.checked_sub(1)
			.and_then(|i| self.orders.get_mut(i))
			.ok_or_else(|| LmError::InvalidConfig(format!("order {order} outside 1..={max}")))
	}

	#[must_use]
	pub fn with_boundaries(mut self, boundaries: BoundaryPolicy) -> Self {
		self.boundaries = boundaries;
		self
	}

	#[must_use]
	pub fn with_closed_vocabulary(mut self, closed: bool) -> Self {
		self.closed_vocabulary = closed;
		self
	}

	#[must_use]
	pub fn with_lowercase(mut self, lowercase: bool) -> Self {
		self.lowercase = lowercase;
		self
	}

	/// Turns interpolation on or off for every order.
	#[must_use]
	pub fn with_interpolation(mut self, interpolate: bool) -> Self {
		for settings in &mut self.orders {
			settings.interpolate = interpolate;
		}
		self
	}

	pub fn with_discount(mut self, order: usize, discount: DiscountMethod) -> Result<Self> {
		self.order_config_mut(order)?.discount = discount;
		Ok(self)
	}

	pub fn with_fallback(mut self, order: usize, fallback: DiscountMethod) -> Result<Self> {
		self.order_config_mut(order)?.fallback = Some(fallback);
		Ok(self)
	}

	pub fn with_min_count(mut self, order: usize, min_count: Count) -> Result<Self> {
		self.order_config_mut(order)?.min_count = min_count;
		Ok(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn json_defaults_are_filled() {
		let config = BuildConfig::from_json_str(
			r#"{ "order": 2, "orders": [
				{ "discount": { "method": "witten-bell" } },
				{ "discount": { "method": "good-turing", "max_count": 5 }, "min_count": 2,
				  "fallback": { "method": "witten-bell" } } ] }"#,
		)
		.unwrap();
		assert_eq!(config.boundaries, BoundaryPolicy::Include);
		assert_eq!(config.order_config(1).min_count, 1);
		assert_eq!(config.order_config(2).discount, DiscountMethod::GoodTuring { max_count: 5 });
		assert_eq!(config.order_config(2).fallback, Some(DiscountMethod::WittenBell));
		assert_eq!(config.specials, SpecialTokens::default());
	}

	#[test]
	fn json_round_trip() {
		let config = BuildConfig::new(3, DiscountMethod::KneserNey { modified: true })
			.with_interpolation(true)
			.with_min_count(3, 2)
			.unwrap();
		let back = BuildConfig::from_json_str(&config.to_json().unwrap()).unwrap();
		assert_eq!(config, back);
	}

	#[test]
	fn validation_catches_bad_settings() {
		let mut config = BuildConfig::new(2, DiscountMethod::WittenBell);
		config.orders.pop();
		assert!(matches!(config.validate(), Err(LmError::InvalidConfig(_))));

		let config = BuildConfig::new(1, DiscountMethod::Additive { delta: -1.0 });
		assert!(config.validate().is_err());
		assert!(BuildConfig::new(0, DiscountMethod::WittenBell).validate().is_err());
		assert!(BuildConfig::new(2, DiscountMethod::WittenBell).with_min_count(3, 2).is_err());
	}
}
