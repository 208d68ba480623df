use super::count_of_counts::CountOfCounts;
use crate::counts::Count;
use crate::error::{LmError, Result};
use crate::trie::Trie;
use crate::vocab::{START_INDEX, WordIndex};

/// Absolute discounts of (modified) Kneser–Ney smoothing for one order.
///
/// The plain variant subtracts a single `D = n1 / (n1 + 2 n2)`; the modified
/// variant (Chen & Goodman) uses `D1`, `D2` and `D3+` for counts of 1, 2 and
/// three or more.
#[derive(Debug, Clone, PartialEq)]
pub struct KneserNey {
	discounts: [f64; 3],
}

impl KneserNey {
	/// # Errors
	/// `InsufficientData` if a needed bucket (`n1`, `n2`, plus `n3`, `n4` for
	/// the modified variant) is empty or a derived discount is negative.
	pub fn new(order: usize, modified: bool, coc: &CountOfCounts) -> Result<Self> {
		let method = if modified { "modified-kneser-ney" } else { "kneser-ney" };
		let needed: Count = if modified { 4 } else { 2 };
		for r in 1..=needed {
			if coc.get(r) == 0 {
				return Err(LmError::insufficient(method, order, format!("count-of-counts n_{r} is zero")));
			}
		}

		let n = |r: Count| coc.get(r) as f64;
		let y = n(1) / (n(1) + 2.0 * n(2));
		let discounts = if modified {
			[
				1.0 - 2.0 * y * n(2) / n(1),
				2.0 - 3.0 * y * n(3) / n(2),
				3.0 - 4.0 * y * n(4) / n(3),
			]
		} else {
			[y, y, y]
		};

		if let Some(d) = discounts.iter().find(|d| **d < 0.0 || !d.is_finite()) {
			return Err(LmError::insufficient(method, order, format!("derived discount {d} is negative")));
		}
		Ok(Self { discounts })
	}

	/// Discount subtracted from a count of `c` (`c >= 1`).
	pub fn discount(&self, c: Count) -> f64 {
		match c {
			0 => 0.0,
			1 => self.discounts[0],
			2 => self.discounts[1],
			_ => self.discounts[2],
		}
	}
}

/// Replaces the counts of order `order` (`order < max order`) by
/// distinct-left-context counts derived from order `order + 1`.
///
/// For every n-gram `w2..wk` the new count is the number of distinct words
/// `w1` with `count(w1 w2..wk) > 0`. N-grams starting with `<s>` have no
/// left context and keep their raw counts.
///
/// With [`BoundaryPolicy::Exclude`](crate::counts::BoundaryPolicy) there is
/// no `<s>` to stand in for that context: an n-gram seen only at the start
/// of sentences ends up with a count of 0. Higher-order contexts built on it
/// are then skipped during estimation.
pub fn rewrite_with_distinct_contexts(counts: &mut Trie<Count>, order: usize) {
	let mut distinct: Vec<Vec<WordIndex>> = Vec::new();
	for (key, _, node) in counts.iter_depth(order + 1) {
		if *node.value() > 0 {
			distinct.push(key[1..].to_vec());
		}
	}

	let targets: Vec<Vec<WordIndex>> = counts
		.iter_depth(order)
		.filter(|(key, _, _)| key[0] != START_INDEX)
		.map(|(key, _, _)| key)
		.collect();
	for key in targets {
		if let Some(value) = counts.lookup_mut(&key) {
			*value = 0;
		}
	}

	for suffix in distinct {
		if suffix[0] == START_INDEX {
			continue;
		}
		*counts.get_or_insert_mut(&suffix) += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn modified_discounts_follow_chen_goodman() {
		let mut coc = CountOfCounts::new();
		for (r, n) in [(1, 10), (2, 5), (3, 3), (4, 2)] {
			for _ in 0..n {
				coc.add(r);
			}
		}
		let kn = KneserNey::new(2, true, &coc).unwrap();
		let y = 10.0 / 20.0;
		assert!((kn.discount(1) - (1.0 - 2.0 * y * 5.0 / 10.0)).abs() < 1e-12);
		assert!((kn.discount(2) - (2.0 - 3.0 * y * 3.0 / 5.0)).abs() < 1e-12);
		assert!((kn.discount(9) - (3.0 - 4.0 * y * 2.0 / 3.0)).abs() < 1e-12);
	}

	#[test]
	fn plain_discount_needs_two_buckets() {
		let coc = CountOfCounts::from_counts([1, 1, 1]);
		assert!(matches!(KneserNey::new(1, false, &coc), Err(LmError::InsufficientData { .. })));
	}

	#[test]
	fn distinct_context_rewrite() {
		let mut counts: Trie<Count> = Trie::new();
		// bigrams: (a b) x3, (c b) x1, (<s> a) x2
		for (key, c) in [
			(vec![4, 5], 3),
			(vec![6, 5], 1),
			(vec![START_INDEX, 4], 2),
			(vec![4], 5),
			(vec![5], 4),
			(vec![6], 1),
			(vec![START_INDEX], 2),
		] {
			counts.insert_or_update(&key, c);
		}
		rewrite_with_distinct_contexts(&mut counts, 1);
		assert_eq!(counts.lookup(&[5]), Some(&2));
		assert_eq!(counts.lookup(&[4]), Some(&1));
		assert_eq!(counts.lookup(&[6]), Some(&0));
		assert_eq!(counts.lookup(&[START_INDEX]), Some(&2));
		assert_eq!(counts.lookup(&[4, 5]), Some(&3));
	}
}
