use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{LmError, Result};

/// Dense index of a word in a [`Vocabulary`].
pub type WordIndex = u32;

/// Reserved index of the sentence-start token.
pub const START_INDEX: WordIndex = 0;
/// Reserved index of the sentence-end token.
pub const END_INDEX: WordIndex = 1;
/// Reserved index of the unknown-word token.
pub const UNKNOWN_INDEX: WordIndex = 2;
/// Reserved index of the pause token.
pub const PAUSE_INDEX: WordIndex = 3;

const RESERVED: usize = 4;

/// Spellings of the reserved tokens.
///
/// Indices are fixed (`<s>` = 0, `</s>` = 1, `<unk>` = 2, `-pau-` = 3); only
/// the spellings are configurable. Two vocabularies can only be combined when
/// their special tokens are identical.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpecialTokens {
	pub start: String,
	pub end: String,
	pub unknown: String,
	pub pause: String,
}

impl Default for SpecialTokens {
	fn default() -> Self {
		Self {
			start: "<s>".to_owned(),
			end: "</s>".to_owned(),
			unknown: "<unk>".to_owned(),
			pause: "-pau-".to_owned(),
		}
	}
}

/// Bidirectional mapping between word strings and dense indices.
///
/// # Invariants
/// - `words[index[w]] == w` for every stored word (bijection)
/// - Indices never change once allocated
/// - The four reserved tokens occupy indices `0..4`
///
/// `<s>` and the pause token are *non-events*: they may appear in a history
/// but are never predicted. Every other word is an event.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Vocabulary {
	specials: SpecialTokens,
	words: Vec<String>,
	index: FxHashMap<String, WordIndex>,
	lowercase: bool,
}

impl Default for Vocabulary {
	fn default() -> Self {
		Self::new(SpecialTokens::default(), false)
	}
}

impl Vocabulary {
	/// Creates a vocabulary holding only the reserved tokens.
	///
	/// With `lowercase` set, every lookup and insertion folds the word to
	/// lowercase first. Reserved spellings are stored as given.
	pub fn new(specials: SpecialTokens, lowercase: bool) -> Self {
		let mut vocab = Self {
			words: Vec::with_capacity(RESERVED),
			index: FxHashMap::default(),
			specials: specials.clone(),
			lowercase,
		};
		for word in [specials.start, specials.end, specials.unknown, specials.pause] {
			let next = vocab.words.len() as WordIndex;
			vocab.index.entry(word.clone()).or_insert(next);
			vocab.words.push(word);
		}
		vocab
	}

	pub fn specials(&self) -> &SpecialTokens {
		&self.specials
	}

	pub fn lowercase(&self) -> bool {
		self.lowercase
	}

	/// Number of allocated indices, reserved tokens included.
	pub fn len(&self) -> usize {
		self.words.len()
	}

	pub fn is_empty(&self) -> bool {
		self.words.len() <= RESERVED
	}

	/// Number of words that can be predicted (every word but `<s>` and pause).
	pub fn event_count(&self) -> usize {
		self.words.len() - 2
	}

	pub fn is_event(&self, index: WordIndex) -> bool {
		index != START_INDEX && index != PAUSE_INDEX && (index as usize) < self.words.len()
	}

	/// Iterates over the event indices in ascending order.
	pub fn events(&self) -> impl Iterator<Item = WordIndex> + '_ {
		(0..self.words.len() as WordIndex).filter(|&i| self.is_event(i))
	}

	/// Iterates over `(index, word)` pairs in index order.
	pub fn iter(&self) -> impl Iterator<Item = (WordIndex, &str)> {
		self.words.iter().enumerate().map(|(i, w)| (i as WordIndex, w.as_str()))
	}

	fn normalize<'a>(&self, word: &'a str) -> std::borrow::Cow<'a, str> {
		if self.lowercase && self.index.get(word).is_none_or(|&i| i as usize >= RESERVED) {
			std::borrow::Cow::Owned(word.to_lowercase())
		} else {
			std::borrow::Cow::Borrowed(word)
		}
	}

	/// Looks a word up without the unknown-word fallback.
	pub fn get(&self, word: &str) -> Option<WordIndex> {
		if let Some(&i) = self.index.get(word) {
			return Some(i);
		}
		if self.lowercase {
			return self.index.get(self.normalize(word).as_ref()).copied();
		}
		None
	}

	/// Returns the index of `word`, or the unknown-word index if absent.
	pub fn index_of(&self, word: &str) -> WordIndex {
		self.get(word).unwrap_or(UNKNOWN_INDEX)
	}

	/// Returns the word stored at `index`.
	///
	/// # Errors
	/// `OutOfRange` if the index was never allocated.
	pub fn word_of(&self, index: WordIndex) -> Result<&str> {
		self.words
			.get(index as usize)
			.map(String::as_str)
			.ok_or(LmError::OutOfRange { index, size: self.words.len() })
	}

	/// Adds a word, returning its index. Idempotent.
	pub fn add(&mut self, word: &str) -> WordIndex {
		if let Some(i) = self.get(word) {
			return i;
		}
		let word = self.normalize(word).into_owned();
		let next = self.words.len() as WordIndex;
		self.index.insert(word.clone(), next);
		self.words.push(word);
		next
	}

	/// Checks that two vocabularies agree on their reserved tokens.
	///
	/// # Errors
	/// `ConfigMismatch` when the special-token spellings differ.
	pub fn check_compatible(&self, other: &Self) -> Result<()> {
		if self.specials != other.specials {
			return Err(LmError::ConfigMismatch(format!(
				"special tokens differ: {:?} vs {:?}",
				self.specials, other.specials
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reserved_indices_are_fixed() {
		let vocab = Vocabulary::default();
		assert_eq!(vocab.index_of("<s>"), START_INDEX);
		assert_eq!(vocab.index_of("</s>"), END_INDEX);
		assert_eq!(vocab.index_of("<unk>"), UNKNOWN_INDEX);
		assert_eq!(vocab.index_of("-pau-"), PAUSE_INDEX);
		assert_eq!(vocab.len(), 4);
		assert_eq!(vocab.event_count(), 2);
	}

	#[test]
	fn add_is_idempotent() {
		let mut vocab = Vocabulary::default();
		let a = vocab.add("cat");
		let b = vocab.add("cat");
		assert_eq!(a, b);
		assert_eq!(vocab.word_of(a).unwrap(), "cat");
		assert_eq!(vocab.len(), 5);
	}

	#[test]
	fn unknown_words_resolve_to_unk() {
		let vocab = Vocabulary::default();
		assert_eq!(vocab.index_of("dog"), UNKNOWN_INDEX);
		assert_eq!(vocab.get("dog"), None);
	}

	#[test]
	fn word_of_out_of_range() {
		let vocab = Vocabulary::default();
		assert!(matches!(vocab.word_of(99), Err(LmError::OutOfRange { index: 99, size: 4 })));
	}

	#[test]
	fn lowercase_folds_words_but_not_specials() {
		let mut vocab = Vocabulary::new(SpecialTokens::default(), true);
		let the = vocab.add("The");
		assert_eq!(vocab.index_of("THE"), the);
		assert_eq!(vocab.word_of(the).unwrap(), "the");
		assert_eq!(vocab.index_of("<s>"), START_INDEX);
	}

	#[test]
	fn events_skip_start_and_pause() {
		let mut vocab = Vocabulary::default();
		vocab.add("a");
		let events: Vec<_> = vocab.events().collect();
		assert_eq!(events, vec![END_INDEX, UNKNOWN_INDEX, 4]);
	}

	#[test]
	fn mismatched_specials_are_rejected() {
		let a = Vocabulary::default();
		let b = Vocabulary::new(
			SpecialTokens { unknown: "<UNK>".to_owned(), ..SpecialTokens::default() },
			false,
		);
		assert!(matches!(a.check_compatible(&b), Err(LmError::ConfigMismatch(_))));
		assert!(a.check_compatible(&Vocabulary::default()).is_ok());
	}
}
