//! Semantic hierarchies and their generalization.
//!
//! A [`WeightedTree`] holds the counts observed for every sense of a hierarchy,
//! [`CutFinder`] picks the level of abstraction the sample supports and the
//! result is kept as a [`TreeCut`]. [`TreeCutModel`] ties the three together
//! for one part of speech.

pub mod cut;
pub mod mdl;
pub mod model;
pub mod weighted;

pub use cut::TreeCut;
pub use mdl::{CutFinder, CutMethod};
pub use model::{SemanticPos, TreeCutModel};
pub use weighted::{NodeId, SENSE_PREFIX, TreeNode, WeightedTree, sense_key};
