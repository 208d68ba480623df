use thiserror::Error;

use crate::vocab::WordIndex;

/// Errors raised by the language-model engine.
///
/// # Propagation
/// - `ParseError`, `ConfigMismatch` and `InvalidConfig` abort the operation.
/// - `InsufficientData` aborts estimation unless a fallback discount is
///   configured for the affected order.
/// - `DegenerateContext` is recovered by the builder (neutral weight) and
///   only surfaces through the estimation report.
#[derive(Debug, Error)]
pub enum LmError {
	/// Malformed persisted model.
	#[error("{origin}:{line}: {message}")]
	ParseError {
		origin: String,
		line: usize,
		message: String,
	},

	/// Vocabulary index outside the allocated range.
	#[error("vocabulary index {index} out of range (size {size})")]
	OutOfRange { index: WordIndex, size: usize },

	/// A discounting strategy cannot be estimated from the available
	/// count-of-counts.
	#[error("insufficient data for {method} discounting at order {order}: {reason}")]
	InsufficientData {
		method: &'static str,
		order: usize,
		reason: String,
	},

	/// Zero or negative denominator while computing a backoff weight.
	#[error("degenerate context {context:?}: leftover {numerator:e}, lower-order remainder {denominator:e}")]
	DegenerateContext {
		context: Vec<WordIndex>,
		numerator: f64,
		denominator: f64,
	},

	/// Incompatible vocabularies or orders when combining models or counts.
	#[error("configuration mismatch: {0}")]
	ConfigMismatch(String),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("estimation cancelled")]
	Cancelled,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Serialization(#[from] postcard::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LmError>;

impl LmError {
	pub(crate) fn parse(origin: &str, line: usize, message: impl Into<String>) -> Self {
		LmError::ParseError {
			origin: origin.to_owned(),
			line,
			message: message.into(),
		}
	}

	pub(crate) fn insufficient(method: &'static str, order: usize, reason: impl Into<String>) -> Self {
		LmError::InsufficientData {
			method,
			order,
			reason: reason.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_error_names_origin_and_line() {
		let err = LmError::parse("model.arpa", 12, "expected 2 words");
		assert_eq!(err.to_string(), "model.arpa:12: expected 2 words");
	}

	#[test]
	fn io_errors_convert() {
		let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
		let err: LmError = io.into();
		assert!(matches!(err, LmError::Io(_)));
	}
}
