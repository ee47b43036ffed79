//! Replacing raw semantic keys with the classes selected by the tree cuts.

use itertools::Itertools;

use crate::{
    grammar::Fragment,
    tree::{SemanticPos, TreeCut},
};

/// The noun and verb cuts a grammar abstracts semantic keys through
#[derive(Clone, Debug, Default)]
pub struct SemanticClasses {
    pub noun: Option<TreeCut>,
    pub verb: Option<TreeCut>,
}

impl SemanticClasses {
    pub fn new(noun: Option<TreeCut>, verb: Option<TreeCut>) -> Self {
        Self { noun, verb }
    }

    pub fn treecut(&self, pos: SemanticPos) -> Option<&TreeCut> {
        match pos {
            SemanticPos::Noun => self.noun.as_ref(),
            SemanticPos::Verb => self.verb.as_ref(),
        }
    }

    /// The alternatives a semantic key stands for.
    ///
    /// Keys with no cut for their part of speech are kept as they are. A key
    /// the cut does not know loses its class.
    pub fn classes(&self, key: &str) -> Vec<Option<String>> {
        let Some(treecut) = SemanticPos::of_key(key).and_then(|pos| self.treecut(pos)) else {
            return vec![Some(key.to_owned())];
        };
        let classes = treecut.abstract_keys(key);
        if classes.is_empty() {
            vec![None]
        } else {
            classes.into_iter().map(|c| Some(c.to_owned())).collect()
        }
    }

    /// Every combination of abstracted classes over a fragment sequence.
    ///
    /// Fragments without a semantic key only ever have one alternative, so a
    /// sequence of them comes back unchanged.
    ///
    /// ```rust
    /// use semantic_guesser_rs::grammar::{Fragment, semantics::SemanticClasses};
    ///
    /// let fragments = vec![
    ///     Fragment::new("love", Some("vv0"), Some("love.v.01")),
    ///     Fragment::gap("123"),
    /// ];
    /// let expanded = SemanticClasses::default().expand(&fragments);
    /// assert!(expanded == vec![fragments]);
    /// ```
    pub fn expand(&self, fragments: &[Fragment]) -> Vec<Vec<Fragment>> {
        if fragments.is_empty() {
            return Vec::new();
        }
        fragments
            .iter()
            .map(|fragment| match &fragment.semantic {
                Some(key) => self
                    .classes(key)
                    .into_iter()
                    .map(|class| Fragment {
                        semantic: class,
                        ..fragment.clone()
                    })
                    .collect_vec(),
                None => vec![fragment.clone()],
            })
            .multi_cartesian_product()
            .collect()
    }
}
