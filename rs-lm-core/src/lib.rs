//! Back-off n-gram language-model library.
//!
//! This crate provides a complete n-gram toolkit including:
//! - Vocabulary management with reserved boundary tokens
//! - Sparse arena tries for counts and estimated contexts
//! - Counting over text, with parallel sharding and merging
//! - Discounting strategies (Good–Turing, Witten–Bell, Kneser–Ney, ...)
//! - Model estimation, backoff scoring and ARPA persistence
//! - Perplexity, mixtures and random sentence generation
//!
//! Logs are base 10 everywhere; see [`model::LOG_ZERO`].

/// Build settings (`BuildConfig`), loadable from JSON.
pub mod config;

/// Raw n-gram counting (`NgramCounts`).
pub mod counts;

/// Smoothing strategies and their statistics.
pub mod discount;

/// Error type shared by the whole crate.
pub mod error;

/// File helpers (corpus reading, cache paths, atomic writes).
pub mod io;

/// Estimated models, scoring and everything built on them.
pub mod model;

/// Sparse trie over word-index sequences.
pub mod trie;

/// Word ↔ index mapping.
pub mod vocab;

pub use config::{BuildConfig, OrderConfig};
pub use counts::{BoundaryPolicy, Count, NgramCounts};
pub use discount::DiscountMethod;
pub use error::{LmError, Result};
pub use model::{LanguageModel, LogP, Model};
pub use vocab::{SpecialTokens, Vocabulary, WordIndex};
