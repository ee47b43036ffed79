//! A trained grammar: sorted rule and terminal tables.

use std::collections::HashMap;

use itertools::Itertools;
use rand::{Rng, distributions::WeightedIndex, prelude::Distribution};

use crate::grammar::{
    Fragment, GrammarMetadata,
    builder::sorted_desc,
    semantics::SemanticClasses,
    pack,
    tagging::{ProperNames, Tagger},
    unpack,
};

/// A base structure with its probability
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub structure: String,
    pub tags: Vec<String>,
    pub probability: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Terminal {
    pub word: String,
    pub probability: f64,
}

/// The terminals of one tag, most probable first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Nonterminal {
    terminals: Vec<Terminal>,
    index: HashMap<String, usize>,
}

impl Nonterminal {
    /// Sorts the terminals by descending probability
    pub fn new(terminals: Vec<(String, f64)>) -> Self {
        let terminals = sorted_desc(terminals)
            .into_iter()
            .map(|(word, probability)| Terminal { word, probability })
            .collect_vec();
        let index = terminals
            .iter()
            .enumerate()
            .map(|(i, t)| (t.word.clone(), i))
            .collect();
        Self { terminals, index }
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    pub fn len(&self) -> usize {
        self.terminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty()
    }

    pub fn probability(&self, word: &str) -> f64 {
        self.index
            .get(word)
            .map(|&i| self.terminals[i].probability)
            .unwrap_or(0.0)
    }
}

/// A password drawn from the grammar
#[derive(Clone, Debug, PartialEq)]
pub struct SampledPassword {
    pub password: String,
    pub structure: String,
    pub probability: f64,
}

/// Probability tables of a trained grammar
#[derive(Clone, Debug)]
pub struct Grammar {
    pub(crate) metadata: GrammarMetadata,
    pub(crate) tagger: Tagger,
    pub(crate) rules: Vec<Rule>,
    pub(crate) rule_index: HashMap<String, usize>,
    pub(crate) nonterminals: HashMap<String, Nonterminal>,
    pub(crate) semantics: SemanticClasses,
}

impl Default for Grammar {
    fn default() -> Self {
        let metadata = GrammarMetadata::default();
        Self {
            tagger: Tagger::new(metadata.tag_scheme),
            metadata,
            rules: Vec::new(),
            rule_index: HashMap::new(),
            nonterminals: HashMap::new(),
            semantics: SemanticClasses::default(),
        }
    }
}

impl Grammar {
    /// Assembles a grammar from probability tables in any order. Structures
    /// that do not parse are dropped.
    pub fn new(
        metadata: GrammarMetadata,
        tagger: Tagger,
        rules: Vec<(String, f64)>,
        nonterminals: HashMap<String, Vec<(String, f64)>>,
        semantics: SemanticClasses,
    ) -> Self {
        let mut grammar = Self {
            metadata,
            tagger,
            semantics,
            ..Self::default()
        };
        grammar.set_tables(rules, nonterminals);
        grammar
    }

    pub(crate) fn set_tables(
        &mut self,
        rules: Vec<(String, f64)>,
        nonterminals: HashMap<String, Vec<(String, f64)>>,
    ) {
        self.rules = sorted_desc(rules)
            .into_iter()
            .filter_map(|(structure, probability)| {
                let Some(tags) = unpack(&structure) else {
                    log::warn!("Dropping malformed base structure {structure:?}");
                    return None;
                };
                let tags = tags.into_iter().map(ToOwned::to_owned).collect();
                Some(Rule {
                    structure,
                    tags,
                    probability,
                })
            })
            .collect();
        self.rule_index = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (rule.structure.clone(), i))
            .collect();
        self.nonterminals = nonterminals
            .into_iter()
            .map(|(tag, terminals)| (tag, Nonterminal::new(terminals)))
            .collect();
    }

    /// Replaces the proper noun lists used when scoring passwords
    pub fn with_proper_names(mut self, names: ProperNames) -> Self {
        self.tagger = Tagger::with_names(self.metadata.tag_scheme, names);
        self
    }

    pub fn metadata(&self) -> &GrammarMetadata {
        &self.metadata
    }

    pub fn semantics(&self) -> &SemanticClasses {
        &self.semantics
    }

    /// Rules by descending probability
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn nonterminal(&self, tag: &str) -> Option<&Nonterminal> {
        self.nonterminals.get(tag)
    }

    /// All tags with their terminals, in no particular order
    pub fn nonterminals(&self) -> impl Iterator<Item = (&str, &Nonterminal)> {
        self.nonterminals.iter().map(|(tag, nt)| (tag.as_str(), nt))
    }

    /// Probability of a base structure, zero when unknown
    pub fn structure_probability(&self, structure: &str) -> f64 {
        self.rule_index
            .get(structure)
            .map(|&i| self.rules[i].probability)
            .unwrap_or(0.0)
    }

    /// Probability of a terminal under a tag, zero when unknown
    pub fn terminal_probability(&self, tag: &str, word: &str) -> f64 {
        self.nonterminal(tag)
            .map(|nt| nt.probability(word))
            .unwrap_or(0.0)
    }

    /// Probability of an already tagged password
    pub fn tagged_probability<S: AsRef<str>>(&self, tagged: &[(S, S)]) -> f64 {
        let structure = pack(tagged.iter().map(|(tag, _)| tag));
        tagged
            .iter()
            .fold(self.structure_probability(&structure), |p, (tag, word)| {
                p * self.terminal_probability(tag.as_ref(), word.as_ref())
            })
    }

    /// Probability of a segmented password.
    ///
    /// Semantic keys go through the grammar's tree cuts first. When a key
    /// abstracts into several classes the most probable reading is kept. Any
    /// unknown structure or terminal makes the probability zero.
    pub fn probability(&self, fragments: &[Fragment]) -> f64 {
        self.semantics
            .expand(fragments)
            .iter()
            .map(|alternative| {
                let tagged = alternative
                    .iter()
                    .map(|f| {
                        let tag = self.tagger.tag(
                            &f.terminal,
                            f.pos.as_deref(),
                            f.semantic.as_deref(),
                        );
                        (tag, f.terminal.clone())
                    })
                    .collect_vec();
                self.tagged_probability(&tagged)
            })
            .fold(0.0, f64::max)
    }

    /// Number of distinct guesses the grammar can produce
    pub fn guess_space(&self) -> f64 {
        self.rules
            .iter()
            .map(|rule| {
                rule.tags
                    .iter()
                    .map(|tag| self.nonterminal(tag).map_or(0, Nonterminal::len) as f64)
                    .product::<f64>()
            })
            .sum()
    }

    /// Draws `n` passwords from the grammar.
    ///
    /// Rules are picked by their probability and each tag's terminal by its
    /// own. Rules using a tag with no terminals are never picked.
    ///
    /// ```rust
    /// use rand::{SeedableRng, rngs::StdRng};
    /// use semantic_guesser_rs::{
    ///     estimator::EstimatorKind,
    ///     grammar::{Fragment, GrammarBuilder, TagScheme, TrainingSample},
    /// };
    ///
    /// let mut builder = GrammarBuilder::new(TagScheme::Pos, EstimatorKind::Mle);
    /// builder.fit(&[TrainingSample::new(vec![Fragment::gap("123")], 1.0)]);
    /// let grammar = builder.build();
    ///
    /// let samples = grammar.sample(3, &mut StdRng::seed_from_u64(7));
    /// assert!(samples.len() == 3);
    /// assert!(samples.iter().all(|s| s.password == "123" && s.probability == 1.0));
    /// ```
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<SampledPassword> {
        let realizable = |rule: &Rule| {
            rule.tags.iter().all(|tag| {
                self.nonterminal(tag)
                    .is_some_and(|nt| nt.terminals().iter().any(|t| t.probability > 0.0))
            })
        };
        let weights = self
            .rules
            .iter()
            .map(|rule| if realizable(rule) { rule.probability } else { 0.0 });
        let rule_dist = match WeightedIndex::new(weights) {
            Ok(dist) => dist,
            Err(e) => {
                log::warn!("Grammar cannot be sampled: {e}");
                return Vec::new();
            },
        };

        let mut terminal_dists: HashMap<&str, WeightedIndex<f64>> = HashMap::new();
        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            let rule = &self.rules[rule_dist.sample(rng)];
            let mut password = String::new();
            let mut probability = rule.probability;
            for tag in &rule.tags {
                let Some(nonterminal) = self.nonterminal(tag) else {
                    continue;
                };
                if !terminal_dists.contains_key(tag.as_str()) {
                    let Ok(dist) =
                        WeightedIndex::new(nonterminal.terminals().iter().map(|t| t.probability))
                    else {
                        continue;
                    };
                    terminal_dists.insert(tag.as_str(), dist);
                }
                let dist = &terminal_dists[tag.as_str()];
                let terminal = &nonterminal.terminals()[dist.sample(rng)];
                password.push_str(&terminal.word);
                probability *= terminal.probability;
            }
            samples.push(SampledPassword {
                password,
                structure: rule.structure.clone(),
                probability,
            });
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        estimator::EstimatorKind,
        grammar::{GrammarBuilder, TagScheme, TrainingSample},
    };

    lazy_static! {
        static ref GRAMMAR: Grammar = {
            let mut builder = GrammarBuilder::new(TagScheme::Backoff, EstimatorKind::Mle);
            builder.fit(&[
                TrainingSample::new(
                    vec![Fragment::new("love", Some("vv0"), Some("love.v.01")), Fragment::gap("123")],
                    6.0,
                ),
                TrainingSample::new(
                    vec![Fragment::new("like", Some("vv0"), Some("love.v.01")), Fragment::gap("12")],
                    2.0,
                ),
                TrainingSample::new(vec![Fragment::gap("123")], 2.0),
            ]);
            builder.build()
        };
    }

    mod scoring {
        use super::*;

        #[test]
        /// The probability is the product of the rule and its terminals
        fn test_probability() {
            let p = GRAMMAR.probability(&[
                Fragment::new("love", Some("vv0"), Some("love.v.01")),
                Fragment::gap("123"),
            ]);
            assert!((p - 0.6 * 0.75 * 1.0).abs() < 1e-12, "got {p}");
        }

        #[test]
        /// Unknown structures and terminals score zero
        fn test_unknown_is_zero() {
            assert!(GRAMMAR.probability(&[Fragment::gap("!!")]) == 0.0);
            assert!(
                GRAMMAR.probability(&[
                    Fragment::new("hate", Some("vv0"), Some("love.v.01")),
                    Fragment::gap("123"),
                ]) == 0.0
            );
            assert!(GRAMMAR.probability(&[]) == 0.0);
        }

        #[test]
        /// Rules come sorted and the guess space counts every combination
        fn test_tables() {
            let rules = GRAMMAR.rules();
            assert!(rules[0].structure == "(love.v.01)(number3)");
            assert!(rules[0].tags == vec!["love.v.01", "number3"]);
            assert!(rules.windows(2).all(|w| w[0].probability >= w[1].probability));
            // 2 * 1 + 2 * 1 + 1
            assert!(GRAMMAR.guess_space() == 5.0);
        }
    }

    mod sampling {
        use super::*;

        #[test]
        /// Samples only use known structures and carry their probability
        fn test_samples_are_valid() {
            let mut rng = StdRng::seed_from_u64(42);
            for sample in GRAMMAR.sample(200, &mut rng) {
                assert!(GRAMMAR.structure_probability(&sample.structure) > 0.0);
                assert!(sample.probability > 0.0 && sample.probability <= 1.0);
            }
        }

        #[test]
        /// The same seed draws the same passwords
        fn test_seeded() {
            let first = GRAMMAR.sample(20, &mut StdRng::seed_from_u64(1));
            let second = GRAMMAR.sample(20, &mut StdRng::seed_from_u64(1));
            assert!(first == second);
        }

        #[test]
        /// An empty grammar draws nothing
        fn test_empty_grammar() {
            let grammar = Grammar::default();
            assert!(grammar.sample(5, &mut StdRng::seed_from_u64(1)).is_empty());
        }
    }
}
