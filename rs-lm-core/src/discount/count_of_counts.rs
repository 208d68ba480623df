use crate::counts::Count;

/// Count-of-counts statistics for one order: `n_r`, the number of n-grams
/// that occur exactly `r` times, for `1 <= r <= MAX_BUCKET`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountOfCounts {
	buckets: Vec<u64>,
	total: u64,
}

impl CountOfCounts {
	/// Largest tracked count. Larger counts are never needed by any discount.
	pub const MAX_BUCKET: Count = 64;

	pub fn new() -> Self {
		Self {
			buckets: vec![0; Self::MAX_BUCKET as usize + 1],
			total: 0,
		}
	}

	/// Builds the statistics from a sequence of n-gram counts.
	pub fn from_counts<I: IntoIterator<Item = Count>>(counts: I) -> Self {
		let mut coc = Self::new();
		for count in counts {
			coc.add(count);
		}
		coc
	}

	pub fn add(&mut self, count: Count) {
		self.total += count;
		if count >= 1 && count <= Self::MAX_BUCKET {
			self.buckets[count as usize] += 1;
		}
	}

	/// Returns `n_r`; zero for untracked or unseen buckets.
	pub fn get(&self, r: Count) -> u64 {
		self.buckets.get(r as usize).copied().unwrap_or(0)
	}

	/// Sum of every count added, including those above `MAX_BUCKET`.
	pub fn total(&self) -> u64 {
		self.total
	}
}
