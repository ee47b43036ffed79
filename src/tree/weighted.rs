//! The counted tree the semantic hierarchy is stored in.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A semantic unit
//! reachable through several ancestor paths is stored once per path, so a key
//! may map to several nodes; [`WeightedTree::hashtable`] gives the key to nodes
//! multimap. Every traversal here is iterative so that full size hierarchies
//! never hit the stack limit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index of a node inside its [`WeightedTree`]
pub type NodeId = usize;

/// Prefix of the synthetic child that stands for "this class, unqualified"
pub const SENSE_PREFIX: &str = "s.";

/// Key given to the root of a new tree
pub const ROOT_KEY: &str = "root";

/// A single node of a [`WeightedTree`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub(crate) key: String,
    pub(crate) value: f64,
    pub(crate) leaf_count: usize,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl TreeNode {
    fn new(key: String, parent: Option<NodeId>) -> Self {
        Self {
            key,
            value: 0.0,
            leaf_count: 0,
            parent,
            children: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cumulative frequency of the subtree rooted here
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Number of leaves under this node. Only valid after
    /// [`WeightedTree::update_counts`].
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Builds the key of the sense child of a class
pub fn sense_key(class_key: &str) -> String {
    format!("{SENSE_PREFIX}{class_key}")
}

/// A counted tree with parent links, cumulative frequencies and leaf counts
///
/// ```rust
/// use semantic_guesser_rs::tree::WeightedTree;
///
/// let mut tree = WeightedTree::new();
/// tree.insert(&["ANIMAL", "BIRD", "crow"], 2.0, true);
/// tree.insert(&["ANIMAL", "INSECT", "bee"], 2.0, true);
/// tree.update_counts();
///
/// let animal = tree.child(tree.root(), "ANIMAL").unwrap();
/// assert!(tree.node(animal).value() == 4.0);
/// assert!(tree.node(animal).leaf_count() == 2);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedTree {
    nodes: Vec<TreeNode>,
}

impl Default for WeightedTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightedTree {
    /// Creates a tree holding only a root named [`ROOT_KEY`]
    pub fn new() -> Self {
        Self::with_root(ROOT_KEY)
    }

    pub fn with_root(key: impl Into<String>) -> Self {
        Self {
            nodes: vec![TreeNode::new(key.into(), None)],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    /// Number of nodes held by the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Total frequency of the tree, i.e. the sample size
    pub fn sample_size(&self) -> f64 {
        self.nodes[self.root()].value
    }

    /// Finds the child of `parent` with the given key
    pub fn child(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].key == key)
    }

    /// The sense child of a class, if it has one
    pub fn sense_child(&self, class: NodeId) -> Option<NodeId> {
        self.child(class, &sense_key(&self.nodes[class].key))
    }

    /// Adds a child under `parent`. Children are unique by key, so inserting
    /// an existing key hands back the child already there.
    pub fn add_child(&mut self, parent: NodeId, key: &str) -> NodeId {
        if let Some(existing) = self.child(parent, key) {
            return existing;
        }
        let id = self.nodes.len();
        self.nodes.push(TreeNode::new(key.to_owned(), Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    /// Inserts or extends the path below the root and counts `freq` on it.
    ///
    /// With `cumulative` every node on the way (root included) receives `freq`,
    /// otherwise only the last node does. Returns the last node of the path.
    pub fn insert<K: AsRef<str>>(&mut self, path: &[K], freq: f64, cumulative: bool) -> NodeId {
        let mut current = self.root();
        for key in path {
            if cumulative {
                self.nodes[current].value += freq;
            }
            current = self.add_child(current, key.as_ref());
        }
        self.nodes[current].value += freq;
        current
    }

    /// Extends the tree along a path of classes keeping every leaf a sense.
    ///
    /// Whenever a node gains its first child a sense child is created for it,
    /// and every intermediate node of the path gets its own sense child. When
    /// `is_internal` is set the end of the path is a class as well and gets a
    /// sense child too.
    ///
    /// ```rust
    /// use semantic_guesser_rs::tree::WeightedTree;
    ///
    /// let mut tree = WeightedTree::new();
    /// tree.insert_class_path(&["person.n.01", "cripple.n.01"], false);
    ///
    /// let person = tree.child(tree.root(), "person.n.01").unwrap();
    /// assert!(tree.child(person, "s.person.n.01").is_some());
    /// assert!(tree.child(person, "cripple.n.01").is_some());
    /// ```
    pub fn insert_class_path<K: AsRef<str>>(&mut self, path: &[K], is_internal: bool) -> NodeId {
        let mut parent = self.root();
        for (depth, key) in path.iter().enumerate() {
            let key = key.as_ref();
            let node = match self.child(parent, key) {
                Some(node) => node,
                None => {
                    if parent != self.root() && self.nodes[parent].is_leaf() {
                        let parent_sense = sense_key(&self.nodes[parent].key);
                        self.add_child(parent, &parent_sense);
                    }
                    let node = self.add_child(parent, key);
                    if depth + 1 < path.len() {
                        self.add_child(node, &sense_key(key));
                    }
                    node
                },
            };
            parent = node;
        }
        if is_internal && parent != self.root() {
            let own_sense = sense_key(&self.nodes[parent].key);
            self.add_child(parent, &own_sense);
        }
        parent
    }

    /// Adds `delta` to a node, and to all of its ancestors when `cumulative`
    pub fn increment_value(&mut self, id: NodeId, delta: f64, cumulative: bool) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.nodes[node].value += delta;
            current = if cumulative {
                self.nodes[node].parent
            } else {
                None
            };
        }
    }

    /// Node ids in depth first order where parents always come before their
    /// children. Only nodes reachable from the root are listed.
    pub fn flat(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Maps every key to all the nodes that carry it
    pub fn hashtable(&self) -> HashMap<String, Vec<NodeId>> {
        let mut index: HashMap<String, Vec<NodeId>> = HashMap::new();
        for id in self.flat() {
            index
                .entry(self.nodes[id].key.clone())
                .or_default()
                .push(id);
        }
        index
    }

    /// Leaves reachable from the root, in depth first order
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.flat()
            .into_iter()
            .filter(move |&id| self.nodes[id].is_leaf())
    }

    /// Leaves under the given node
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.is_leaf() {
                leaves.push(current);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        leaves
    }

    /// The nodes from the root down to `id`
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Recomputes values and leaf counts bottom up.
    ///
    /// Internal nodes are reset and then rebuilt from their children, so only
    /// the counts held by leaves survive. Run this after incrementing nodes
    /// without ancestor propagation and before computing any cut.
    pub fn update_counts(&mut self) {
        let order = self.flat();
        for &id in &order {
            let node = &mut self.nodes[id];
            if node.is_leaf() {
                node.leaf_count = 1;
            } else {
                node.value = 0.0;
                node.leaf_count = 0;
            }
        }
        for &id in order.iter().rev() {
            if let Some(parent) = self.nodes[id].parent {
                let (value, leaf_count) = (self.nodes[id].value, self.nodes[id].leaf_count);
                self.nodes[parent].value += value;
                self.nodes[parent].leaf_count += leaf_count;
            }
        }
    }

    /// Removes every subtree whose cumulative value ends up at or below
    /// `threshold`. The root is never removed.
    ///
    /// When `update_values` is set the removed mass is subtracted from every
    /// ancestor. Node ids are reassigned afterwards. Returns the total value
    /// removed.
    pub fn trim(&mut self, threshold: f64, update_values: bool) -> f64 {
        let order = self.flat();
        let mut removed_below = vec![0.0; self.nodes.len()];

        for &id in order.iter().rev() {
            let mut subtract = 0.0;
            let children = std::mem::take(&mut self.nodes[id].children);
            let mut kept = Vec::with_capacity(children.len());
            for child in children {
                subtract += removed_below[child];
                if self.nodes[child].value <= threshold {
                    subtract += self.nodes[child].value;
                } else {
                    kept.push(child);
                }
            }
            self.nodes[id].children = kept;
            if update_values {
                self.nodes[id].value -= subtract;
            }
            removed_below[id] = subtract;
        }

        self.compact();
        removed_below[self.root()]
    }

    /// Drops nodes that are no longer reachable and renumbers the rest in
    /// depth first order
    pub fn compact(&mut self) {
        let order = self.flat();
        if order.len() == self.nodes.len() {
            return;
        }
        let mut remap = vec![usize::MAX; self.nodes.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id] = new_id;
        }
        let old_nodes = std::mem::take(&mut self.nodes);
        let mut slots: Vec<Option<TreeNode>> = old_nodes.into_iter().map(Some).collect();
        self.nodes = order
            .iter()
            .filter_map(|&old_id| slots[old_id].take())
            .map(|mut node| {
                node.parent = node.parent.map(|p| remap[p]);
                node.children = node.children.iter().map(|&c| remap[c]).collect();
                node
            })
            .collect();
    }

    /// Shannon entropy (bits) of the distribution of a node's value over its
    /// children
    pub fn entropy(&self, id: NodeId) -> f64 {
        let total = self.nodes[id].value;
        if total <= 0.0 {
            return 0.0;
        }
        self.nodes[id]
            .children
            .iter()
            .map(|&c| self.nodes[c].value / total)
            .filter(|&p| p > 0.0)
            .map(|p| -p * p.log2())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Table 4 of Li & Abe (1998)
    fn animal_tree() -> WeightedTree {
        let mut tree = WeightedTree::new();
        for (class, leaf, freq) in [
            ("INSECT", "bee", 2.0),
            ("INSECT", "bug", 0.0),
            ("INSECT", "insect", 0.0),
            ("BIRD", "bird", 4.0),
            ("BIRD", "crow", 2.0),
            ("BIRD", "eagle", 2.0),
            ("BIRD", "swallow", 0.0),
        ] {
            tree.insert(&["ANIMAL", class, leaf], freq, true);
        }
        tree
    }

    #[test]
    /// Cumulative insertion counts every node on the path
    fn test_cumulative_insert() {
        let tree = animal_tree();
        let animal = tree.child(tree.root(), "ANIMAL").unwrap();
        let bird = tree.child(animal, "BIRD").unwrap();
        assert!(tree.sample_size() == 10.0);
        assert!(tree.node(animal).value() == 10.0);
        assert!(tree.node(bird).value() == 8.0);
    }

    #[test]
    /// Re-inserting a key hands back the existing child
    fn test_unique_children() {
        let mut tree = animal_tree();
        let before = tree.len();
        let first = tree.insert(&["ANIMAL", "BIRD", "crow"], 1.0, false);
        let second = tree.insert(&["ANIMAL", "BIRD", "crow"], 1.0, false);
        assert!(first == second);
        assert!(tree.len() == before);
        assert!(tree.node(first).value() == 4.0);
    }

    #[test]
    /// Increments that bypass ancestors get reconciled by update_counts
    fn test_update_counts() {
        let mut tree = animal_tree();
        let animal = tree.child(tree.root(), "ANIMAL").unwrap();
        let insect = tree.child(animal, "INSECT").unwrap();
        let bug = tree.child(insect, "bug").unwrap();

        tree.increment_value(bug, 3.0, false);
        assert!(tree.node(insect).value() == 2.0);

        tree.update_counts();
        assert!(tree.node(insect).value() == 5.0);
        assert!(tree.node(insect).leaf_count() == 3);
        assert!(tree.node(tree.root()).leaf_count() == 7);
        assert!(tree.sample_size() == 13.0);
    }

    #[test]
    /// Cumulative increments walk up the parent links
    fn test_increment_cumulative() {
        let mut tree = animal_tree();
        let animal = tree.child(tree.root(), "ANIMAL").unwrap();
        let insect = tree.child(animal, "INSECT").unwrap();
        let bug = tree.child(insect, "bug").unwrap();

        tree.increment_value(bug, 1.5, true);
        assert!(tree.node(insect).value() == 3.5);
        assert!(tree.sample_size() == 11.5);
    }

    #[test]
    /// Parents always come before their children in the flat order
    fn test_flat_order() {
        let tree = animal_tree();
        let order = tree.flat();
        let mut position = vec![0; tree.len()];
        for (i, &id) in order.iter().enumerate() {
            position[id] = i;
        }
        assert!(order.len() == tree.len());
        for &id in &order {
            if let Some(parent) = tree.node(id).parent() {
                assert!(position[parent] < position[id]);
            }
        }
    }

    #[test]
    /// Duplicated keys map to every node that holds them
    fn test_hashtable_duplicates() {
        let mut tree = WeightedTree::new();
        tree.insert(&["a", "shared"], 1.0, true);
        tree.insert(&["b", "shared"], 1.0, true);
        let index = tree.hashtable();
        assert!(index["shared"].len() == 2);
        assert!(index["a"].len() == 1);
    }

    #[test]
    /// Sense children are created when a class gains members
    fn test_insert_class_path() {
        let mut tree = WeightedTree::new();
        tree.insert_class_path(&["entity.n.01", "animal.n.01"], false);
        tree.insert_class_path(&["entity.n.01", "animal.n.01", "bird.n.01"], true);

        let entity = tree.child(tree.root(), "entity.n.01").unwrap();
        let animal = tree.child(entity, "animal.n.01").unwrap();
        let bird = tree.child(animal, "bird.n.01").unwrap();

        assert!(tree.sense_child(entity).is_some());
        assert!(tree.sense_child(animal).is_some());
        assert!(tree.sense_child(bird).is_some());
        assert!(tree.leaves().all(|leaf| tree.node(leaf).key().starts_with(SENSE_PREFIX)));
    }

    #[test]
    /// Trimming drops light subtrees and keeps values consistent
    fn test_trim() {
        let mut tree = WeightedTree::new();
        tree.insert(&["object", "automobile", "car"], 10.0, true);
        tree.insert(&["object", "automobile", "truck"], 10.0, true);
        tree.insert(&["object", "house"], 30.0, true);
        tree.insert(&["building"], 5.0, true);

        let removed = tree.trim(10.0, true);
        assert!(removed == 25.0, "removed {removed}");
        assert!(tree.sample_size() == 30.0);

        let object = tree.child(tree.root(), "object").unwrap();
        assert!(tree.child(tree.root(), "building").is_none());
        assert!(tree.child(object, "automobile").is_none());
        assert!(tree.child(object, "house").is_some());
        assert!(tree.len() == 3);
    }

    #[test]
    /// Entropy of an even split is one bit
    fn test_entropy() {
        let mut tree = WeightedTree::new();
        tree.insert(&["a"], 5.0, true);
        tree.insert(&["b"], 5.0, true);
        assert!((tree.entropy(tree.root()) - 1.0).abs() < 1e-12);
    }

    #[test]
    /// Deep chains are handled without recursion
    fn test_deep_tree() {
        let path: Vec<String> = (0..200_000).map(|i| format!("n{i}")).collect();
        let mut tree = WeightedTree::new();
        tree.insert(&path, 1.0, false);
        tree.update_counts();
        assert!(tree.sample_size() == 1.0);
        assert!(tree.node(tree.root()).leaf_count() == 1);
    }
}
