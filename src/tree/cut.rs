//! The selected generalization level of a semantic tree.
//!
//! A [`TreeCut`] owns the tree it was computed on together with the set of cut
//! nodes. Looking up a key walks from every node carrying that key up to the
//! first cut node, so keys stored in several places of the hierarchy may be
//! abstracted into several classes.

use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::GrammarError,
    estimator::Estimator,
    tree::{
        mdl::{CutFinder, CutMethod},
        weighted::{NodeId, WeightedTree},
    },
};

/// What actually goes to disk. The flags and the key index are rebuilt on load.
#[derive(Deserialize)]
struct TreeCutRecord {
    tree: WeightedTree,
    cut: Vec<NodeId>,
}

/// An immutable cut over a [`WeightedTree`]
///
/// ```rust
/// use semantic_guesser_rs::{
///     estimator::Estimator,
///     tree::{CutMethod, TreeCut, WeightedTree},
/// };
///
/// let mut tree = WeightedTree::new();
/// tree.insert(&["ANIMAL", "BIRD", "crow"], 6.0, true);
/// tree.insert(&["ANIMAL", "BIRD", "eagle"], 6.0, true);
/// tree.insert(&["ANIMAL", "INSECT", "bee"], 1.0, true);
/// tree.update_counts();
///
/// let estimator = Estimator::mle(tree.sample_size());
/// let treecut = TreeCut::find(tree, estimator, CutMethod::LiAbe);
///
/// assert!(!treecut.abstract_keys("crow").is_empty());
/// assert!(treecut.abstract_keys("unicorn").is_empty());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "TreeCutRecord")]
pub struct TreeCut {
    tree: WeightedTree,
    cut: Vec<NodeId>,
    #[serde(skip)]
    flags: Vec<bool>,
    #[serde(skip)]
    index: HashMap<String, Vec<NodeId>>,
}

impl From<TreeCutRecord> for TreeCut {
    fn from(record: TreeCutRecord) -> Self {
        Self::new(record.tree, record.cut)
    }
}

impl TreeCut {
    /// Wraps an already selected cut. Ids outside of the tree are ignored.
    pub fn new(tree: WeightedTree, cut: Vec<NodeId>) -> Self {
        let mut flags = vec![false; tree.len()];
        let cut: Vec<NodeId> = cut.into_iter().filter(|&id| id < tree.len()).collect();
        for &id in &cut {
            flags[id] = true;
        }
        let index = tree.hashtable();
        Self {
            tree,
            cut,
            flags,
            index,
        }
    }

    /// Runs the MDL search on a tree with up to date counts and keeps the result
    pub fn find(tree: WeightedTree, estimator: Estimator, method: CutMethod) -> Self {
        let cut = CutFinder::new(&tree, estimator, method).find_cut();
        log::info!(
            "Selected a cut of {} nodes out of {} ({:?})",
            cut.len(),
            tree.len(),
            method
        );
        Self::new(tree, cut)
    }

    pub fn tree(&self) -> &WeightedTree {
        &self.tree
    }

    /// The cut nodes in selection order
    pub fn nodes(&self) -> &[NodeId] {
        &self.cut
    }

    pub fn len(&self) -> usize {
        self.cut.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cut.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.flags.get(id).copied().unwrap_or(false)
    }

    /// The cut nodes governing `key`.
    ///
    /// A key naming a class is looked up through its sense child, so a cut
    /// below the class still answers for it. Unknown keys give an empty set,
    /// semantic lookups being open vocabulary.
    pub fn abstract_key(&self, key: &str) -> BTreeSet<NodeId> {
        let Some(nodes) = self.index.get(key) else {
            return BTreeSet::new();
        };
        nodes
            .iter()
            .map(|&id| self.tree.sense_child(id).unwrap_or(id))
            .filter_map(|id| self.governing_node(id))
            .collect()
    }

    /// Same as [`TreeCut::abstract_key`] but gives the keys of the cut nodes
    pub fn abstract_keys(&self, key: &str) -> BTreeSet<&str> {
        self.abstract_key(key)
            .into_iter()
            .map(|id| self.tree.node(id).key())
            .collect()
    }

    /// First cut node found walking up from `id`, itself included
    fn governing_node(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.contains(node) {
                return Some(node);
            }
            current = self.tree.node(node).parent();
        }
        None
    }

    /// Writes the cut with bincode
    pub fn save(&self, path: &Path) -> Result<(), GrammarError> {
        let file = File::create(path).map_err(|e| GrammarError::io(path, e))?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Reads a cut written by [`TreeCut::save`]
    pub fn load(path: &Path) -> Result<Self, GrammarError> {
        let file = File::open(path).map_err(|e| GrammarError::io(path, e))?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal_cut() -> TreeCut {
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
        tree.update_counts();
        TreeCut::find(tree, Estimator::mle(10.0), CutMethod::LiAbe)
    }

    #[test]
    /// Leaves abstract to the class chosen by the cut
    fn test_abstract_leaf() {
        let treecut = animal_cut();
        assert!(treecut.abstract_keys("crow") == BTreeSet::from(["BIRD"]));
        assert!(treecut.abstract_keys("bee") == BTreeSet::from(["INSECT"]));
    }

    #[test]
    /// A cut node abstracts to itself, anything above it to nothing
    fn test_abstract_cut_node_and_above() {
        let treecut = animal_cut();
        assert!(treecut.abstract_keys("BIRD") == BTreeSet::from(["BIRD"]));
        assert!(treecut.abstract_keys("ANIMAL").is_empty());
    }

    #[test]
    /// Unknown keys are not an error
    fn test_abstract_unknown() {
        assert!(animal_cut().abstract_key("griffin").is_empty());
    }

    #[test]
    /// Keys present under several classes abstract to all of them
    fn test_multi_parent_leaf() {
        let mut tree = WeightedTree::new();
        tree.insert(&["PERSON", "mother"], 5.0, true);
        tree.insert(&["PERSON", "father"], 5.0, true);
        tree.insert(&["ANIMAL", "mother"], 5.0, true);
        tree.insert(&["ANIMAL", "cat"], 5.0, true);
        tree.update_counts();
        let person = tree.child(tree.root(), "PERSON").unwrap();
        let animal = tree.child(tree.root(), "ANIMAL").unwrap();

        let treecut = TreeCut::new(tree, vec![person, animal]);
        assert!(treecut.abstract_keys("mother") == BTreeSet::from(["ANIMAL", "PERSON"]));
    }

    #[test]
    /// A saved cut reloads with the same lookups
    fn test_save_and_load() {
        let treecut = animal_cut();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noun-treecut");

        treecut.save(&path).unwrap();
        let loaded = TreeCut::load(&path).unwrap();

        assert!(loaded.nodes() == treecut.nodes());
        assert!(loaded.tree() == treecut.tree());
        for key in ["bee", "crow", "swallow", "BIRD", "ANIMAL", "nothing"] {
            assert!(loaded.abstract_keys(key) == treecut.abstract_keys(key));
        }
    }
}
