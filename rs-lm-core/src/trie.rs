use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::vocab::WordIndex;

/// Position of a node in the trie arena.
pub type NodeId = u32;

/// The root node (empty key) always lives at id 0.
pub const ROOT: NodeId = 0;

/// One trie node: its own value plus the hashed next-index → child map.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Node<V> {
	children: FxHashMap<WordIndex, NodeId>,
	value: V,
}

impl<V> Node<V> {
	fn new(value: V) -> Self {
		Self {
			children: FxHashMap::default(),
			value,
		}
	}

	pub fn value(&self) -> &V {
		&self.value
	}

	pub fn child(&self, word: WordIndex) -> Option<NodeId> {
		self.children.get(&word).copied()
	}

	pub fn has_children(&self) -> bool {
		!self.children.is_empty()
	}

	pub fn child_count(&self) -> usize {
		self.children.len()
	}

	/// Children in ascending word-index order.
	pub fn sorted_children(&self) -> Vec<(WordIndex, NodeId)> {
		let mut children: Vec<(WordIndex, NodeId)> = self.children.iter().map(|(&w, &id)| (w, id)).collect();
		children.sort_unstable_by_key(|&(w, _)| w);
		children
	}
}

/// Sparse trie over vocabulary-index sequences.
///
/// Nodes live in a flat arena and refer to their children by [`NodeId`], so
/// the structure has no owning links and can be serialized as-is. Memory is
/// bounded by the number of observed keys, never by `|V|^order`.
///
/// # Invariants
/// - The root (id 0) represents the empty key
/// - A child's key is exactly one token longer than its parent's
/// - If a node exists, every proper prefix of its key exists too
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Trie<V> {
	nodes: Vec<Node<V>>,
}

impl<V: Default> Default for Trie<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V: Default> Trie<V> {
	pub fn new() -> Self {
		Self {
			nodes: vec![Node::new(V::default())],
		}
	}

	/// Returns the id of the node at `key`, creating missing nodes on the way.
	pub fn find_or_insert(&mut self, key: &[WordIndex]) -> NodeId {
		let mut id = ROOT;
		for &word in key {
			id = self.find_or_insert_from(id, word);
		}
		id
	}

	/// Mutable access to the value at `key`; intermediate nodes are created
	/// with `V::default()`.
	pub fn get_or_insert_mut(&mut self, key: &[WordIndex]) -> &mut V {
		let id = self.find_or_insert(key);
		&mut self.nodes[id as usize].value
	}

	/// Applies `f` to the value of every non-empty prefix of `key`, shortest
	/// first, creating missing nodes. One walk instead of one per prefix.
	pub fn update_prefixes<F: FnMut(&mut V)>(&mut self, key: &[WordIndex], mut f: F) {
		let mut id = ROOT;
		for &word in key {
			id = self.find_or_insert_from(id, word);
			f(&mut self.nodes[id as usize].value);
		}
	}

	fn find_or_insert_from(&mut self, parent: NodeId, word: WordIndex) -> NodeId {
		match self.nodes[parent as usize].children.get(&word).copied() {
			Some(child) => child,
			None => {
				let child = self.nodes.len() as NodeId;
				self.nodes.push(Node::new(V::default()));
				self.nodes[parent as usize].children.insert(word, child);
				child
			}
		}
	}

	/// Stores `value` at `key`, overwriting any previous value.
	pub fn insert_or_update(&mut self, key: &[WordIndex], value: V) {
		*self.get_or_insert_mut(key) = value;
	}
}

impl<V> Trie<V> {
	/// Walks `key` one level per token. Stops at the first missing child and
	/// never allocates.
	pub fn find(&self, key: &[WordIndex]) -> Option<NodeId> {
		let mut id = ROOT;
		for word in key {
			id = *self.nodes[id as usize].children.get(word)?;
		}
		Some(id)
	}

	pub fn lookup(&self, key: &[WordIndex]) -> Option<&V> {
		self.find(key).map(|id| &self.nodes[id as usize].value)
	}

	pub fn lookup_mut(&mut self, key: &[WordIndex]) -> Option<&mut V> {
		let id = self.find(key)?;
		Some(&mut self.nodes[id as usize].value)
	}

	pub fn contains(&self, key: &[WordIndex]) -> bool {
		self.find(key).is_some()
	}

	pub fn root(&self) -> &Node<V> {
		&self.nodes[ROOT as usize]
	}

	pub fn node(&self, id: NodeId) -> &Node<V> {
		&self.nodes[id as usize]
	}

	pub fn value_mut(&mut self, id: NodeId) -> &mut V {
		&mut self.nodes[id as usize].value
	}

	pub fn child(&self, id: NodeId, word: WordIndex) -> Option<NodeId> {
		self.nodes[id as usize].child(word)
	}

	/// Total number of nodes, root included.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.len() == 1
	}

	/// Lazily enumerates every node whose key has exactly `depth` tokens.
	///
	/// Keys come out in lexicographic index order, so two passes over the
	/// same trie visit nodes in the same order.
	pub fn iter_depth(&self, depth: usize) -> DepthIter<'_, V> {
		DepthIter {
			trie: self,
			depth,
			stack: vec![self.root().sorted_children().into_iter()],
			key: Vec::with_capacity(depth),
			root_pending: depth == 0,
		}
	}

	/// Number of nodes at `depth`.
	pub fn count_at_depth(&self, depth: usize) -> usize {
		self.iter_depth(depth).count()
	}
}

/// Single-pass iterator returned by [`Trie::iter_depth`].
pub struct DepthIter<'a, V> {
	trie: &'a Trie<V>,
	depth: usize,
	stack: Vec<std::vec::IntoIter<(WordIndex, NodeId)>>,
	key: Vec<WordIndex>,
	root_pending: bool,
}

impl<'a, V> Iterator for DepthIter<'a, V> {
	type Item = (Vec<WordIndex>, NodeId, &'a Node<V>);

	fn next(&mut self) -> Option<Self::Item> {
		if self.depth == 0 {
			if self.root_pending {
				self.root_pending = false;
				return Some((Vec::new(), ROOT, self.trie.root()));
			}
			return None;
		}

		loop {
			let frame = self.stack.last_mut()?;
			match frame.next() {
				Some((word, id)) => {
					if self.stack.len() == self.depth {
						let mut key = self.key.clone();
						key.push(word);
						return Some((key, id, self.trie.node(id)));
					}
					self.key.push(word);
					let children = self.trie.node(id).sorted_children();
					self.stack.push(children.into_iter());
				}
				None => {
					self.stack.pop();
					self.key.pop();
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> Trie<u64> {
		let mut trie = Trie::new();
		trie.insert_or_update(&[1, 2, 3], 7);
		trie.insert_or_update(&[1, 2], 4);
		trie.insert_or_update(&[5], 1);
		*trie.get_or_insert_mut(&[1, 4]) += 2;
		trie
	}

	#[test]
	fn lookup_walks_levels() {
		let trie = sample();
		assert_eq!(trie.lookup(&[1, 2, 3]), Some(&7));
		assert_eq!(trie.lookup(&[1, 2]), Some(&4));
		assert_eq!(trie.lookup(&[1]), Some(&0));
		assert_eq!(trie.lookup(&[1, 3]), None);
		assert_eq!(trie.lookup(&[9, 9, 9]), None);
	}

	#[test]
	fn lookup_does_not_allocate() {
		let trie = sample();
		let before = trie.len();
		let _ = trie.lookup(&[8, 8]);
		assert_eq!(trie.len(), before);
	}

	#[test]
	fn prefixes_exist_for_every_node() {
		let trie = sample();
		for depth in 1..=3 {
			for (key, _, _) in trie.iter_depth(depth) {
				for len in 0..key.len() {
					assert!(trie.contains(&key[..len]), "missing prefix of {key:?}");
				}
			}
		}
	}

	#[test]
	fn update_prefixes_touches_each_level() {
		let mut trie: Trie<u64> = Trie::new();
		trie.update_prefixes(&[3, 1, 2], |c| *c += 1);
		trie.update_prefixes(&[3, 1], |c| *c += 1);
		assert_eq!(trie.lookup(&[3]), Some(&2));
		assert_eq!(trie.lookup(&[3, 1]), Some(&2));
		assert_eq!(trie.lookup(&[3, 1, 2]), Some(&1));
		assert_eq!(*trie.root().value(), 0);
	}

	#[test]
	fn iter_depth_is_sorted_and_complete() {
		let trie = sample();
		let ones: Vec<_> = trie.iter_depth(1).map(|(k, _, _)| k).collect();
		assert_eq!(ones, vec![vec![1], vec![5]]);
		let twos: Vec<_> = trie.iter_depth(2).map(|(k, _, n)| (k, *n.value())).collect();
		assert_eq!(twos, vec![(vec![1, 2], 4), (vec![1, 4], 2)]);
		let threes: Vec<_> = trie.iter_depth(3).map(|(k, _, _)| k).collect();
		assert_eq!(threes, vec![vec![1, 2, 3]]);
		assert_eq!(trie.count_at_depth(4), 0);
		assert_eq!(trie.count_at_depth(0), 1);
	}
}
