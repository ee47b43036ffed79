//! The semantic password grammar.
//!
//! Training goes through a [`GrammarBuilder`]: every password arrives already
//! split into [`Fragment`]s, each fragment is tagged and the sequence of tags
//! becomes the password's base structure. Once all samples are counted the
//! builder freezes into a [`Grammar`] holding sorted probability tables, which
//! is what gets scored, sampled, saved and enumerated.

pub mod builder;
pub mod count;
pub mod model;
pub mod persistence;
pub mod semantics;
pub mod tagging;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use builder::{GrammarBuilder, Tally};
pub use count::Count;
pub use model::{Grammar, Nonterminal, Rule, SampledPassword, Terminal};
pub use persistence::GrammarMetadata;
pub use semantics::SemanticClasses;
pub use tagging::{ProperNameKind, ProperNames, TagScheme, Tagger};

/// One piece of a segmented password
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    pub terminal: String,
    /// Syntactic tag, absent for anything that is not a word
    pub pos: Option<String>,
    /// Semantic key such as `love.v.01`
    pub semantic: Option<String>,
}

impl Fragment {
    pub fn new(terminal: &str, pos: Option<&str>, semantic: Option<&str>) -> Self {
        Self {
            terminal: terminal.to_owned(),
            pos: pos.map(ToOwned::to_owned),
            semantic: semantic.map(ToOwned::to_owned),
        }
    }

    /// A fragment that is not a word
    pub fn gap(terminal: &str) -> Self {
        Self::new(terminal, None, None)
    }
}

/// A segmented password together with how many times it was seen
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub fragments: Vec<Fragment>,
    pub count: f64,
}

impl TrainingSample {
    pub fn new(fragments: Vec<Fragment>, count: f64) -> Self {
        Self { fragments, count }
    }
}

/// Joins tags into a base structure string
///
/// ```rust
/// use semantic_guesser_rs::grammar::{pack, unpack};
///
/// let structure = pack(["vvd_love.v.01", "number3"]);
/// assert!(structure == "(vvd_love.v.01)(number3)");
/// assert!(unpack(&structure) == Some(vec!["vvd_love.v.01", "number3"]));
/// ```
pub fn pack<I, S>(tags: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| format!("({})", tag.as_ref()))
        .join("")
}

/// Splits a base structure string back into its tags. Malformed structures
/// give `None`.
pub fn unpack(structure: &str) -> Option<Vec<&str>> {
    let inner = structure.strip_prefix('(')?.strip_suffix(')')?;
    let tags = inner.split(")(").collect_vec();
    tags.iter()
        .all(|tag| !tag.is_empty() && !tag.contains(['(', ')']))
        .then_some(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Broken structures are refused
    fn test_unpack_malformed() {
        assert!(unpack("").is_none());
        assert!(unpack("nn1").is_none());
        assert!(unpack("(nn1").is_none());
        assert!(unpack("()").is_none());
        assert!(unpack("(nn1)x(number2)").is_none());
    }

    #[test]
    /// A single tag survives the trip
    fn test_unpack_single() {
        assert!(unpack(&pack(["special1"])) == Some(vec!["special1"]));
    }
}
