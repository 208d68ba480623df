use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::thread;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;
use crate::discount::count_of_counts::CountOfCounts;
use crate::error::{LmError, Result};
use crate::model::builder::{self, BuildOutcome, CancelToken};
use crate::trie::Trie;
use crate::vocab::{END_INDEX, PAUSE_INDEX, START_INDEX, Vocabulary, WordIndex};

/// Raw occurrence count of an n-gram.
pub type Count = u64;

/// Whether sentences are wrapped in `<s>` … `</s>` before counting.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
	#[default]
	Include,
	Exclude,
}

/// Raw n-gram counts for every order `1..=order`, gathered before estimation.
///
/// The counting trie is keyed forward: the node at `w1 .. wk` holds
/// `count(w1 .. wk)`. Counts are consumed by [`NgramCounts::estimate`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NgramCounts {
	order: usize,
	vocab: Vocabulary,
	counts: Trie<Count>,
	boundaries: BoundaryPolicy,
	closed_vocabulary: bool,
	sentences: u64,
}

impl NgramCounts {
	/// Creates an empty counter.
	///
	/// # Parameters
	/// - `order`: longest n-gram to count (at least 1).
	/// - `vocab`: starting vocabulary. With `closed_vocabulary`, it is final
	///   and unseen words are counted as `<unk>`.
	///
	/// # Errors
	/// `InvalidConfig` if `order` is zero.
	pub fn new(order: usize, vocab: Vocabulary, boundaries: BoundaryPolicy, closed_vocabulary: bool) -> Result<Self> {
		if order == 0 {
			return Err(LmError::InvalidConfig("order must be at least 1".to_owned()));
		}
		Ok(Self {
			order,
			vocab,
			counts: Trie::new(),
			boundaries,
			closed_vocabulary,
			sentences: 0,
		})
	}

	/// Creates an empty counter matching `config`, with an open vocabulary
	/// holding only the special tokens.
	pub fn from_config(config: &BuildConfig) -> Result<Self> {
		config.validate()?;
		let vocab = Vocabulary::new(config.specials.clone(), config.lowercase);
		Self::new(config.order, vocab, config.boundaries, config.closed_vocabulary)
	}

	/// Same settings and vocabulary, no counts. Used for counting shards.
	pub fn empty_like(&self) -> Self {
		Self {
			order: self.order,
			vocab: self.vocab.clone(),
			counts: Trie::new(),
			boundaries: self.boundaries,
			closed_vocabulary: self.closed_vocabulary,
			sentences: 0,
		}
	}

	pub fn order(&self) -> usize {
		self.order
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocab
	}

	pub fn boundaries(&self) -> BoundaryPolicy {
		self.boundaries
	}

	/// Number of sentences counted so far (merged shards included).
	pub fn sentences(&self) -> u64 {
		self.sentences
	}

	pub fn trie(&self) -> &Trie<Count> {
		&self.counts
	}

	/// Count of an n-gram, zero if never seen.
	pub fn get(&self, ngram: &[WordIndex]) -> Count {
		self.counts.lookup(ngram).copied().unwrap_or(0)
	}

	fn map_word(&mut self, word: &str) -> WordIndex {
		if self.closed_vocabulary {
			self.vocab.index_of(word)
		} else {
			self.vocab.add(word)
		}
	}

	/// Counts one tokenized sentence.
	///
	/// # Behavior
	/// - Pause tokens are dropped.
	/// - With [`BoundaryPolicy::Include`], the sentence is wrapped in `<s>` …
	///   `</s>`.
	/// - Every n-gram of every order `1..=order` in the window is counted.
	pub fn count_sentence<S: AsRef<str>>(&mut self, words: &[S]) {
		let mut indices = Vec::with_capacity(words.len() + 2);
		if self.boundaries == BoundaryPolicy::Include {
			indices.push(START_INDEX);
		}
		for word in words {
			let index = self.map_word(word.as_ref());
			if index != PAUSE_INDEX {
				indices.push(index);
			}
		}
		if self.boundaries == BoundaryPolicy::Include {
			indices.push(END_INDEX);
		}
		self.count_indices(&indices);
		self.sentences += 1;
	}

	/// Counts a whitespace-tokenized line. Blank lines are skipped.
	pub fn count_line(&mut self, line: &str) {
		let words: Vec<&str> = line.split_whitespace().collect();
		if !words.is_empty() {
			self.count_sentence(&words);
		}
	}

	/// Counts every n-gram of an already indexed sequence, boundaries and
	/// all, as given.
	pub fn count_indices(&mut self, indices: &[WordIndex]) {
		for start in 0..indices.len() {
			let end = (start + self.order).min(indices.len());
			self.counts.update_prefixes(&indices[start..end], |c| *c += 1);
		}
	}

	/// Adds `count` occurrences of the n-gram spelled by `words`.
	///
	/// # Errors
	/// `InvalidConfig` if the n-gram is empty or longer than the order.
	pub fn add_ngram<S: AsRef<str>>(&mut self, words: &[S], count: Count) -> Result<()> {
		if words.is_empty() || words.len() > self.order {
			return Err(LmError::InvalidConfig(format!(
				"n-gram of length {} does not fit order {}",
				words.len(),
				self.order
			)));
		}
		let key: Vec<WordIndex> = words.iter().map(|w| self.map_word(w.as_ref())).collect();
		*self.counts.get_or_insert_mut(&key) += count;
		Ok(())
	}

	/// Count-of-counts for `order`, over n-grams predicting an event word.
	pub fn count_of_counts(&self, order: usize) -> CountOfCounts {
		count_of_counts(&self.counts, &self.vocab, order)
	}

	/// Sums `other` into `self`.
	///
	/// Words are matched by spelling; words unknown to `self` are added (or
	/// mapped to `<unk>` when the vocabulary is closed). Shards merged in a
	/// fixed order yield the same indices as counting sequentially.
	///
	/// # Errors
	/// `ConfigMismatch` if orders or special tokens differ.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if self.order != other.order {
			return Err(LmError::ConfigMismatch(format!(
				"cannot merge order {} counts into order {}",
				other.order, self.order
			)));
		}
		self.vocab.check_compatible(&other.vocab)?;

		let remap: Vec<WordIndex> = other.vocab.iter().map(|(_, word)| self.map_word(word)).collect();
		for depth in 1..=other.order {
			for (key, _, node) in other.counts.iter_depth(depth) {
				let count = *node.value();
				if count == 0 {
					continue;
				}
				let key: Vec<WordIndex> = key.iter().map(|&w| remap[w as usize]).collect();
				*self.counts.get_or_insert_mut(&key) += count;
			}
		}
		self.sentences += other.sentences;
		Ok(())
	}

	/// Counts `lines` on every available CPU and merges the shards.
	///
	/// # Behavior
	/// - Lines are split into `cpus * 8` chunks, each counted on its own
	///   thread into an [`NgramCounts::empty_like`] copy of `self`.
	/// - Shards are sent back over a channel and merged in chunk order, so
	///   the result is identical to counting the lines one by one.
	pub fn count_parallel(&mut self, lines: &[String]) -> Result<()> {
		if lines.is_empty() {
			return Ok(());
		}
		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = lines.len().div_ceil(chunks);

		let (tx, rx) = mpsc::channel();
		let mut spawned = 0;
		for (id, chunk) in lines.chunks(chunk_size).enumerate() {
			let tx = tx.clone();
			let chunk: Vec<String> = chunk.to_vec();
			let mut shard = self.empty_like();

			thread::spawn(move || {
				for line in &chunk {
					shard.count_line(line);
				}
				if tx.send((id, shard)).is_err() {
					warn!("counting shard {id} finished after the receiver was dropped");
				}
			});
			spawned += 1;
		}
		drop(tx);

		let mut shards: Vec<(usize, NgramCounts)> = rx.iter().collect();
		if shards.len() != spawned {
			return Err(LmError::Io(std::io::Error::other(format!(
				"{} of {spawned} counting threads failed",
				spawned - shards.len()
			))));
		}
		shards.sort_unstable_by_key(|(id, _)| *id);
		for (_, shard) in &shards {
			self.merge(shard)?;
		}
		debug!("counted {} lines in {spawned} shards", lines.len());
		Ok(())
	}

	/// Writes one `w1 .. wk<TAB>count` line per non-zero n-gram, lower orders
	/// first and keys in index order.
	pub fn write_counts<W: Write>(&self, mut writer: W) -> Result<()> {
		for depth in 1..=self.order {
			for (key, _, node) in self.counts.iter_depth(depth) {
				let count = *node.value();
				if count == 0 {
					continue;
				}
				let words = key
					.iter()
					.map(|&w| self.vocab.word_of(w))
					.collect::<Result<Vec<&str>>>()?;
				writeln!(writer, "{}\t{}", words.join(" "), count)?;
			}
		}
		writer.flush()?;
		Ok(())
	}

	/// Reads a count file into `self`, adding to any existing counts.
	///
	/// # Errors
	/// `ParseError` (tagged with `origin` and the line number) for a line
	/// without a count, with a bad count, or with too many words.
	pub fn read_counts<R: BufRead>(&mut self, reader: R, origin: &str) -> Result<()> {
		for (number, line) in reader.lines().enumerate() {
			let line = line?;
			let line_no = number + 1;
			if line.trim().is_empty() {
				continue;
			}
			let (words, count) = line
				.rsplit_once('\t')
				.ok_or_else(|| LmError::parse(origin, line_no, "expected `words<TAB>count`"))?;
			let count: Count = count
				.trim()
				.parse()
				.map_err(|_| LmError::parse(origin, line_no, format!("invalid count `{}`", count.trim())))?;
			let words: Vec<&str> = words.split_whitespace().collect();
			if words.is_empty() || words.len() > self.order {
				return Err(LmError::parse(
					origin,
					line_no,
					format!("{}-gram does not fit order {}", words.len(), self.order),
				));
			}
			self.add_ngram(&words, count)?;
		}
		Ok(())
	}

	/// Estimates a model from these counts. See [`builder::estimate`].
	pub fn estimate(self, config: &BuildConfig, cancel: Option<&CancelToken>) -> Result<BuildOutcome> {
		builder::estimate(self, config, cancel)
	}

	pub(crate) fn into_parts(self) -> (Vocabulary, Trie<Count>, usize) {
		(self.vocab, self.counts, self.order)
	}
}

/// Count-of-counts of `order` in a counting trie, over n-grams whose last
/// word is an event.
pub(crate) fn count_of_counts(counts: &Trie<Count>, vocab: &Vocabulary, order: usize) -> CountOfCounts {
	CountOfCounts::from_counts(
		counts
			.iter_depth(order)
			.filter(|(key, _, _)| key.last().is_some_and(|&w| vocab.is_event(w)))
			.map(|(_, _, node)| *node.value()),
	)
}
