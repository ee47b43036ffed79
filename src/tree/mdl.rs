//! Minimum Description Length selection of a tree cut.
//!
//! A cut is an antichain of nodes covering every leaf. Following Li & Abe
//! (1998) the best cut minimizes
//!
//! ```math
//! L(cut) = \frac{(|cut| - 1) \log_2 |S|}{2} - W \sum_{C \in cut} f(C) \log_2 \frac{\hat{P}(C)}{|C|}
//! ```
//!
//! where the first term is the parameter description length, the sum is the
//! data description length and `|C|` is the number of leaves a class stands
//! for. `W` is 1 for Li & Abe. Wagner (2000) weights the data term with
//! `W = c log2(|S|) / |S|` so that the amount of generalization stops drifting
//! with the size of the sample.
//!
//! The search is a single bottom up pass over the tree. When a class and the
//! union of its children's cuts describe the data equally well, the class is
//! kept.

use serde::{Deserialize, Serialize};

use crate::estimator::Estimator;
use crate::tree::weighted::{NodeId, WeightedTree};

/// The weighting applied to the data description length
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CutMethod {
    /// Plain Li & Abe (1998)
    #[default]
    LiAbe,
    /// Wagner (2000) with the given weighting factor `c`
    Wagner { factor: f64 },
}

impl CutMethod {
    /// Weighting factor Wagner uses when none is given
    pub const DEFAULT_WAGNER_FACTOR: f64 = 50.0;

    /// Wagner weighting with [`CutMethod::DEFAULT_WAGNER_FACTOR`]
    pub fn wagner() -> Self {
        Self::Wagner {
            factor: Self::DEFAULT_WAGNER_FACTOR,
        }
    }

    /// Li & Abe without a specificity, Wagner with the specificity as factor
    pub fn from_specificity(specificity: Option<f64>) -> Self {
        match specificity {
            Some(factor) => Self::Wagner { factor },
            None => Self::LiAbe,
        }
    }

    /// Weight of the data description length for a sample of the given size
    pub fn data_weight(&self, sample_size: f64) -> f64 {
        match *self {
            Self::LiAbe => 1.0,
            Self::Wagner { factor } => factor * sample_size.log2() / sample_size,
        }
    }
}

/// Computes description lengths of cuts over a tree and finds the shortest
///
/// The tree must have had [`WeightedTree::update_counts`] run on it, since
/// both the sample size and the leaf counts are read from the nodes.
pub struct CutFinder<'t> {
    tree: &'t WeightedTree,
    estimator: Estimator,
    sample_size: f64,
    data_weight: f64,
}

impl<'t> CutFinder<'t> {
    pub fn new(tree: &'t WeightedTree, estimator: Estimator, method: CutMethod) -> Self {
        let sample_size = tree.sample_size();
        Self {
            tree,
            estimator,
            sample_size,
            data_weight: method.data_weight(sample_size),
        }
    }

    /// `(|cut| - 1) log2(|S|) / 2`
    pub fn parameter_dl(&self, cut_len: usize) -> f64 {
        cut_len.saturating_sub(1) as f64 * self.sample_size.log2() / 2.0
    }

    /// The contribution of one node to the data description length
    pub fn node_data_dl(&self, id: NodeId) -> f64 {
        let node = self.tree.node(id);
        let p = self.estimator.node_probability(node.value(), node.leaf_count());
        if p <= 0.0 || node.value() == 0.0 {
            return 0.0;
        }
        -node.value() * (p / node.leaf_count().max(1) as f64).log2()
    }

    pub fn data_dl(&self, cut: &[NodeId]) -> f64 {
        cut.iter().map(|&id| self.node_data_dl(id)).sum()
    }

    pub fn description_length(&self, cut: &[NodeId]) -> f64 {
        self.parameter_dl(cut.len()) + self.data_weight * self.data_dl(cut)
    }

    /// Selects the cut with the shortest description length.
    ///
    /// Children are visited before their parents, each node keeping the best
    /// cut of its subtree together with that cut's data description length.
    /// An empty sample has nothing to discriminate, so the whole tree collapses
    /// into the root.
    pub fn find_cut(&self) -> Vec<NodeId> {
        let root = self.tree.root();
        if self.sample_size <= 0.0 {
            log::warn!("Tree has an empty sample, cutting at the root");
            return vec![root];
        }

        let mut best: Vec<Option<(Vec<NodeId>, f64)>> = vec![None; self.tree.len()];

        for id in self.tree.flat().into_iter().rev() {
            let node = self.tree.node(id);
            let own_ddl = self.node_data_dl(id);

            if node.is_leaf() {
                best[id] = Some((vec![id], own_ddl));
                continue;
            }

            let mut children_cut = Vec::new();
            let mut children_ddl = 0.0;
            for &child in node.children() {
                if let Some((cut, ddl)) = best[child].take() {
                    children_cut.extend(cut);
                    children_ddl += ddl;
                }
            }

            let own_dl = self.parameter_dl(1) + self.data_weight * own_ddl;
            let children_dl =
                self.parameter_dl(children_cut.len()) + self.data_weight * children_ddl;

            // ties go to the coarser cut
            best[id] = if own_dl <= children_dl {
                Some((vec![id], own_ddl))
            } else {
                Some((children_cut, children_ddl))
            };
        }

        best[root]
            .take()
            .map(|(cut, _)| cut)
            .unwrap_or_else(|| vec![root])
    }
}
