use super::LanguageModel;
use super::ngram_model::{LOG_ZERO, LogP, Model};
use crate::error::{LmError, Result};
use crate::vocab::SpecialTokens;

/// Static linear interpolation of several models.
///
/// `p(w | h) = sum_i weight_i * p_i(w | h)`, each component using its own
/// vocabulary and order. Words are passed as strings since components index
/// them differently.
///
/// # Invariants
/// - At least one component
/// - Weights are non-negative and sum to one
/// - All components share the same special tokens
#[derive(Debug, Clone)]
pub struct Mixture {
	components: Vec<(Model, f64)>,
}

impl Mixture {
	/// Builds a mixture from `(model, weight)` pairs; weights are normalized.
	///
	/// # Errors
	/// - `InvalidConfig` for no components, a negative weight or all-zero
	///   weights
	/// - `ConfigMismatch` when special tokens differ between components
	pub fn new(components: Vec<(Model, f64)>) -> Result<Self> {
		let Some((first, _)) = components.first() else {
			return Err(LmError::InvalidConfig("a mixture needs at least one model".to_owned()));
		};
		for (model, weight) in &components {
			if !(weight.is_finite() && *weight >= 0.0) {
				return Err(LmError::InvalidConfig(format!("invalid mixture weight {weight}")));
			}
			first.vocabulary().check_compatible(model.vocabulary())?;
		}
		let total: f64 = components.iter().map(|(_, w)| w).sum();
		if total <= 0.0 {
			return Err(LmError::InvalidConfig("mixture weights sum to zero".to_owned()));
		}

		let components = components.into_iter().map(|(model, w)| (model, w / total)).collect();
		Ok(Self { components })
	}

	pub fn weights(&self) -> Vec<f64> {
		self.components.iter().map(|(_, w)| *w).collect()
	}

	pub fn models(&self) -> impl Iterator<Item = &Model> {
		self.components.iter().map(|(model, _)| model)
	}

	/// Interpolated log probability; [`LOG_ZERO`] if every component gives
	/// zero.
	pub fn score_words(&self, history: &[&str], word: &str) -> LogP {
		let p: f64 = self
			.components
			.iter()
			.map(|(model, weight)| weight * 10f64.powf(model.score_words(history, word)))
			.sum();
		if p > 0.0 { p.log10().max(LOG_ZERO) } else { LOG_ZERO }
	}
}

impl LanguageModel for Mixture {
	fn order(&self) -> usize {
		self.models().map(Model::order).max().unwrap_or(1)
	}

	fn specials(&self) -> &SpecialTokens {
		self.components[0].0.vocabulary().specials()
	}

	fn is_known(&self, word: &str) -> bool {
		self.models().any(|model| model.vocabulary().get(word).is_some())
	}

	fn score_words(&self, history: &[&str], word: &str) -> LogP {
		Mixture::score_words(self, history, word)
	}
}
