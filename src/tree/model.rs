//! Fitting a [`TreeCut`] to the semantic classes observed in a password sample.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    estimator::{Estimator, EstimatorKind},
    tree::{
        cut::TreeCut,
        mdl::CutMethod,
        weighted::{SENSE_PREFIX, WeightedTree, sense_key},
    },
};

/// The hierarchies a [`TreeCutModel`] can be built over
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticPos {
    Noun,
    Verb,
}

impl SemanticPos {
    /// Reads the part of speech out of a WordNet style key such as
    /// `love.v.01`. Sense keys (`s.love.v.01`) are accepted as well.
    ///
    /// ```rust
    /// use semantic_guesser_rs::tree::SemanticPos;
    ///
    /// assert!(SemanticPos::of_key("dog.n.01") == Some(SemanticPos::Noun));
    /// assert!(SemanticPos::of_key("s.love.v.01") == Some(SemanticPos::Verb));
    /// assert!(SemanticPos::of_key("fast.r.01").is_none());
    /// assert!(SemanticPos::of_key("city").is_none());
    /// ```
    pub fn of_key(key: &str) -> Option<Self> {
        let key = key.strip_prefix(SENSE_PREFIX).unwrap_or(key);
        let mut parts = key.rsplitn(3, '.');
        let (_number, pos, _lemma) = (parts.next()?, parts.next()?, parts.next()?);
        match pos {
            "n" => Some(Self::Noun),
            "v" => Some(Self::Verb),
            _ => None,
        }
    }
}

/// Learns the generalization level of one part of speech
#[derive(Clone, Debug)]
pub struct TreeCutModel {
    pub pos: SemanticPos,
    pub estimator: EstimatorKind,
    /// Wagner weighting factor. Plain Li & Abe when unset.
    pub specificity: Option<f64>,
    treecut: Option<TreeCut>,
}

impl TreeCutModel {
    pub fn new(pos: SemanticPos, estimator: EstimatorKind, specificity: Option<f64>) -> Self {
        Self {
            pos,
            estimator,
            specificity,
            treecut: None,
        }
    }

    /// Counts the observed keys into `tree` and selects its cut.
    ///
    /// Keys of another part of speech are skipped. A key held by several nodes
    /// has its count split evenly between them, and a key naming a class is
    /// counted on that class's sense child, created if the class lacks one.
    /// Keys missing from the hierarchy are ignored.
    pub fn fit<I, K>(&mut self, mut tree: WeightedTree, observations: I) -> &TreeCut
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let index = tree.hashtable();
        let mut missing = 0_usize;

        for (key, count) in observations {
            let key = key.as_ref();
            if SemanticPos::of_key(key) != Some(self.pos) {
                continue;
            }
            let Some(nodes) = index.get(key) else {
                missing += 1;
                continue;
            };
            let share = count / nodes.len() as f64;
            for &node in nodes {
                let target = if tree.node(node).is_leaf() {
                    node
                } else {
                    match tree.sense_child(node) {
                        Some(sense) => sense,
                        None => {
                            let sense = sense_key(key);
                            log::debug!("Adding sense node {sense} for observed class");
                            tree.add_child(node, &sense)
                        },
                    }
                };
                tree.increment_value(target, share, false);
            }
        }
        if missing > 0 {
            log::debug!("{missing} observations of {:?} not found in the hierarchy", self.pos);
        }

        self.fit_tree(tree)
    }

    /// Selects the cut of a tree that already holds its counts
    pub fn fit_tree(&mut self, mut tree: WeightedTree) -> &TreeCut {
        tree.update_counts();
        let root = tree.node(tree.root());
        let estimator = Estimator::for_kind(self.estimator, root.value(), root.leaf_count());
        let method = CutMethod::from_specificity(self.specificity);
        self.treecut.insert(TreeCut::find(tree, estimator, method))
    }

    pub fn treecut(&self) -> Option<&TreeCut> {
        self.treecut.as_ref()
    }

    pub fn into_treecut(self) -> Option<TreeCut> {
        self.treecut
    }

    /// The classes representing `key` under the fitted cut
    pub fn predict(&self, key: &str) -> BTreeSet<String> {
        self.treecut
            .as_ref()
            .map(|treecut| {
                treecut
                    .abstract_keys(key)
                    .into_iter()
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> WeightedTree {
        let mut tree = WeightedTree::new();
        for path in [
            vec!["entity.n.01", "animal.n.01", "bird.n.01", "crow.n.01"],
            vec!["entity.n.01", "animal.n.01", "bird.n.01", "eagle.n.01"],
            vec!["entity.n.01", "animal.n.01", "insect.n.01", "bee.n.01"],
            vec!["entity.n.01", "animal.n.01", "insect.n.01", "bug.n.01"],
            vec!["entity.n.01", "artifact.n.01", "car.n.01"],
            vec!["entity.n.01", "artifact.n.01", "bike.n.01"],
        ] {
            tree.insert_class_path(&path, false);
        }
        tree
    }

    #[test]
    /// Counts land on sense nodes and the whole sample is kept
    fn test_fit_counts() {
        let mut model = TreeCutModel::new(SemanticPos::Noun, EstimatorKind::Mle, None);
        let treecut = model.fit(
            hierarchy(),
            [("crow.n.01", 3.0), ("bird.n.01", 2.0), ("love.v.01", 9.0)],
        );
        let tree = treecut.tree();
        assert!(tree.sample_size() == 5.0);

        let bird = tree.hashtable()["bird.n.01"][0];
        let bird_sense = tree.sense_child(bird).unwrap();
        assert!(tree.node(bird_sense).value() == 2.0);
    }

    #[test]
    /// Classes without a sense node get one instead of losing their count
    fn test_fit_creates_sense_nodes() {
        let mut tree = WeightedTree::new();
        tree.insert(&["animal.n.01", "dog.n.01"], 0.0, false);
        tree.insert(&["animal.n.01", "cat.n.01"], 0.0, false);

        let mut model = TreeCutModel::new(SemanticPos::Noun, EstimatorKind::Mle, None);
        let treecut = model.fit(tree, [("animal.n.01", 2.0), ("dog.n.01", 1.0)]);
        let tree = treecut.tree();
        assert!(tree.sample_size() == 3.0);

        let animal = tree.child(tree.root(), "animal.n.01").unwrap();
        let animal_sense = tree.sense_child(animal).unwrap();
        assert!(tree.node(animal_sense).value() == 2.0);
        assert!(tree.node(animal).leaf_count() == 3);
    }

    #[test]
    /// Every observed key predicts at least one class
    fn test_predict_covers_observations() {
        let mut model = TreeCutModel::new(SemanticPos::Noun, EstimatorKind::Laplace, None);
        model.fit(
            hierarchy(),
            [
                ("crow.n.01", 30.0),
                ("eagle.n.01", 28.0),
                ("bee.n.01", 2.0),
                ("car.n.01", 15.0),
            ],
        );
        for key in ["crow.n.01", "eagle.n.01", "bee.n.01", "car.n.01", "bird.n.01"] {
            assert!(!model.predict(key).is_empty(), "{key} has no class");
        }
        assert!(model.predict("zebra.n.01").is_empty());
    }

    #[test]
    /// Duplicated keys split their counts between their nodes
    fn test_multi_parent_split() {
        let mut tree = hierarchy();
        tree.insert_class_path(&["entity.n.01", "artifact.n.01", "crow.n.01"], false);

        let mut model = TreeCutModel::new(SemanticPos::Noun, EstimatorKind::Mle, None);
        let treecut = model.fit(tree, [("crow.n.01", 4.0)]);
        let tree = treecut.tree();
        for &node in &tree.hashtable()["crow.n.01"] {
            assert!(tree.node(node).value() == 2.0);
        }
    }

    #[test]
    /// Unfitted models predict nothing
    fn test_unfitted() {
        let model = TreeCutModel::new(SemanticPos::Verb, EstimatorKind::Mle, Some(50.0));
        assert!(model.predict("love.v.01").is_empty());
        assert!(model.treecut().is_none());
    }
}
