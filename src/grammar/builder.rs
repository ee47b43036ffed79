//! Counting base structures and terminals out of segmented passwords.

use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    errors::GrammarError,
    estimator::{Estimator, EstimatorKind},
    grammar::{
        Count, Fragment, Grammar, GrammarMetadata, TrainingSample, pack,
        semantics::SemanticClasses,
        tagging::{ProperNames, TagScheme, Tagger},
    },
    tree::{SemanticPos, TreeCut, TreeCutModel, WeightedTree},
};

/// Raw counts gathered from a set of samples.
///
/// Tallies of disjoint partitions of a sample merge into the tally of the
/// whole sample, whatever the partitioning or merge order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    pub base_structures: HashMap<String, Count>,
    pub tag_dicts: HashMap<String, HashMap<String, Count>>,
}

impl Tally {
    /// Counts one tagged password
    pub fn add(&mut self, tagged: &[(String, &str)], weight: f64) {
        let structure = pack(tagged.iter().map(|(tag, _)| tag));
        self.base_structures.entry(structure).or_default().add(weight);
        for (tag, terminal) in tagged {
            self.tag_dicts
                .entry(tag.clone())
                .or_default()
                .entry((*terminal).to_owned())
                .or_default()
                .add(weight);
        }
    }

    pub fn merge(&mut self, other: Tally) {
        for (structure, count) in other.base_structures {
            self.base_structures.entry(structure).or_default().merge(&count);
        }
        for (tag, terminals) in other.tag_dicts {
            let counts = self.tag_dicts.entry(tag).or_default();
            for (terminal, count) in terminals {
                counts.entry(terminal).or_default().merge(&count);
            }
        }
    }

    /// Total weight of the counted passwords
    pub fn total(&self) -> f64 {
        self.base_structures.values().sum::<Count>().value()
    }

    pub fn is_empty(&self) -> bool {
        self.base_structures.is_empty() && self.tag_dicts.is_empty()
    }
}

/// Tags a password under every combination of its semantic classes and
/// counts each combination with an even share of `weight`
fn count_sample(
    tagger: &Tagger,
    semantics: &SemanticClasses,
    tally: &mut Tally,
    fragments: &[Fragment],
    weight: f64,
) -> Result<(), GrammarError> {
    if fragments.is_empty() {
        return Err(GrammarError::EmptySample);
    }
    let alternatives = semantics.expand(fragments);
    let share = weight / alternatives.len() as f64;
    for alternative in alternatives {
        let tagged = alternative
            .iter()
            .map(|f| {
                let tag = tagger.tag(&f.terminal, f.pos.as_deref(), f.semantic.as_deref());
                (tag, f.terminal.as_str())
            })
            .collect_vec();
        tally.add(&tagged, share);
    }
    Ok(())
}

/// Accumulates counts and freezes them into a [`Grammar`]
///
/// ```rust
/// use semantic_guesser_rs::{
///     estimator::EstimatorKind,
///     grammar::{Fragment, GrammarBuilder, TagScheme, TrainingSample},
/// };
///
/// let mut builder = GrammarBuilder::new(TagScheme::Backoff, EstimatorKind::Mle);
/// builder.fit(&[
///     TrainingSample::new(vec![Fragment::new("love", Some("vv0"), None), Fragment::gap("123")], 3.0),
///     TrainingSample::new(vec![Fragment::new("love", Some("vv0"), None)], 1.0),
/// ]);
///
/// let grammar = builder.build();
/// assert!(grammar.structure_probability("(vv0)(number3)") == 0.75);
/// ```
#[derive(Clone, Debug)]
pub struct GrammarBuilder {
    tagger: Tagger,
    estimator: EstimatorKind,
    specificity: Option<f64>,
    semantics: SemanticClasses,
    tally: Tally,
}

impl GrammarBuilder {
    pub fn new(scheme: TagScheme, estimator: EstimatorKind) -> Self {
        Self {
            tagger: Tagger::new(scheme),
            estimator,
            specificity: None,
            semantics: SemanticClasses::default(),
            tally: Tally::default(),
        }
    }

    pub fn with_proper_names(mut self, names: ProperNames) -> Self {
        self.tagger = Tagger::with_names(self.tagger.scheme(), names);
        self
    }

    /// Wagner factor used when fitting tree cuts
    pub fn with_specificity(mut self, specificity: Option<f64>) -> Self {
        self.specificity = specificity;
        self
    }

    /// Abstracts semantic keys through already fitted cuts
    pub fn with_treecuts(mut self, noun: Option<TreeCut>, verb: Option<TreeCut>) -> Self {
        self.semantics = SemanticClasses::new(noun, verb);
        self
    }

    /// Fits the noun and verb cuts on the semantic keys of `samples`.
    ///
    /// Must run before the samples are counted for the counts to use the
    /// abstracted classes.
    pub fn fit_treecuts(
        &mut self,
        noun_tree: Option<WeightedTree>,
        verb_tree: Option<WeightedTree>,
        samples: &[TrainingSample],
    ) {
        let observations = samples
            .iter()
            .flat_map(|sample| {
                sample
                    .fragments
                    .iter()
                    .filter_map(move |f| f.semantic.as_deref().map(|key| (key, sample.count)))
            })
            .collect_vec();

        let fit = |pos: SemanticPos, tree: Option<WeightedTree>| {
            tree.and_then(|tree| {
                let mut model = TreeCutModel::new(pos, self.estimator, self.specificity);
                model.fit(tree, observations.iter().copied());
                model.into_treecut()
            })
        };
        let noun = fit(SemanticPos::Noun, noun_tree);
        let verb = fit(SemanticPos::Verb, verb_tree);
        self.semantics = SemanticClasses::new(noun, verb);
    }

    pub fn tagger(&self) -> &Tagger {
        &self.tagger
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Counts a single password with the given weight
    pub fn fit_incremental(
        &mut self,
        fragments: &[Fragment],
        weight: f64,
    ) -> Result<(), GrammarError> {
        count_sample(&self.tagger, &self.semantics, &mut self.tally, fragments, weight)
    }

    /// Counts every sample, skipping the ones that cannot be counted.
    ///
    /// Returns the number of samples counted.
    pub fn fit<'s, I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = &'s TrainingSample>,
    {
        let (counted, tally) = self.tally_samples(samples);
        self.merge(tally);
        log::info!(
            "Counted {counted} samples into {} base structures",
            self.tally.base_structures.len()
        );
        counted
    }

    /// Counts samples into a fresh tally, leaving the builder untouched
    pub fn tally_samples<'s, I>(&self, samples: I) -> (usize, Tally)
    where
        I: IntoIterator<Item = &'s TrainingSample>,
    {
        let mut tally = Tally::default();
        let mut counted = 0;
        for (i, sample) in samples.into_iter().enumerate() {
            match count_sample(
                &self.tagger,
                &self.semantics,
                &mut tally,
                &sample.fragments,
                sample.count,
            ) {
                Ok(()) => counted += 1,
                Err(e) => log::warn!("Skipping sample {i}: {e}"),
            }
        }
        (counted, tally)
    }

    /// Adds counts gathered elsewhere, for example by another worker
    pub fn merge(&mut self, tally: Tally) {
        self.tally.merge(tally);
    }

    /// Registers words under their tag without counting them. They only gain
    /// probability through smoothing.
    pub fn add_vocabulary<I>(&mut self, vocabulary: I)
    where
        I: IntoIterator<Item = Fragment>,
    {
        for word in vocabulary {
            let tag = self
                .tagger
                .tag(&word.terminal, word.pos.as_deref(), word.semantic.as_deref());
            self.tally
                .tag_dicts
                .entry(tag)
                .or_default()
                .entry(word.terminal)
                .or_default();
        }
    }

    /// Relative frequency of every base structure, most probable first
    pub fn base_structure_probabilities(&self) -> Vec<(String, f64)> {
        let total = self.tally.total();
        if total <= 0.0 {
            return Vec::new();
        }
        sorted_desc(
            self.tally
                .base_structures
                .iter()
                .map(|(structure, count)| (structure.clone(), count.value() / total)),
        )
    }

    /// Terminal probabilities of every tag under the configured estimator,
    /// most probable first
    pub fn tag_probabilities(&self) -> HashMap<String, Vec<(String, f64)>> {
        self.tally
            .tag_dicts
            .iter()
            .map(|(tag, counts)| {
                let sample_size = counts.values().sum::<Count>().value();
                let estimator = Estimator::for_kind(self.estimator, sample_size, counts.len());
                let probabilities = sorted_desc(counts.iter().map(|(terminal, count)| {
                    (terminal.clone(), estimator.probability(count.value()))
                }));
                (tag.clone(), probabilities)
            })
            .collect()
    }

    pub fn metadata(&self) -> GrammarMetadata {
        GrammarMetadata {
            estimator: self.estimator,
            tag_scheme: self.tagger.scheme(),
            specificity: self.specificity,
        }
    }

    /// Freezes the counts into a grammar
    pub fn build(&self) -> Grammar {
        Grammar::new(
            self.metadata(),
            self.tagger.clone(),
            self.base_structure_probabilities(),
            self.tag_probabilities(),
            self.semantics.clone(),
        )
    }
}

/// Sorts by descending probability, then by name
pub(crate) fn sorted_desc<I>(entries: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = (String, f64)>,
{
    entries
        .into_iter()
        .sorted_by(|(a, p), (b, q)| q.total_cmp(p).then_with(|| a.cmp(b)))
        .collect()
}

/// Counting samples across threads with rayon
#[cfg(feature = "rayon")]
pub mod rayon {
    use rayon::{iter::ParallelIterator, slice::ParallelSlice};

    use super::{GrammarBuilder, Tally};
    use crate::grammar::TrainingSample;

    /// Splits the samples between workers and merges their tallies
    pub trait ParFit {
        /// Counts `samples` on up to `workers` threads. The result is the
        /// same as a sequential fit.
        ///
        /// Returns the number of samples counted.
        fn par_fit(&mut self, samples: &[TrainingSample], workers: usize) -> usize;
    }

    impl ParFit for GrammarBuilder {
        fn par_fit(&mut self, samples: &[TrainingSample], workers: usize) -> usize {
            let chunk_size = samples.len().div_ceil(workers.max(1)).max(1);
            let this = &*self;
            let partials: Vec<(usize, Tally)> = samples
                .par_chunks(chunk_size)
                .map(|chunk| this.tally_samples(chunk))
                .collect();

            let mut counted = 0;
            for (n, tally) in partials {
                counted += n;
                self.merge(tally);
            }
            log::info!(
                "Counted {counted} samples on {} workers into {} base structures",
                workers.max(1),
                self.tally.base_structures.len()
            );
            counted
        }
    }
}

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;

    lazy_static! {
        static ref SAMPLES: Vec<TrainingSample> = vec![
            TrainingSample::new(
                vec![
                    Fragment::new("i", Some("ppis1"), None),
                    Fragment::new("love", Some("vv0"), Some("love.v.01")),
                    Fragment::new("you", Some("ppy"), None),
                ],
                5.0,
            ),
            TrainingSample::new(
                vec![
                    Fragment::new("love", Some("vv0"), Some("love.v.01")),
                    Fragment::gap("123"),
                ],
                3.0,
            ),
            TrainingSample::new(vec![Fragment::gap("123456")], 8.0),
            TrainingSample::new(
                vec![
                    Fragment::new("monkey", Some("nn1"), Some("monkey.n.01")),
                    Fragment::gap("1"),
                ],
                4.0,
            ),
        ];
    }

    fn builder() -> GrammarBuilder {
        GrammarBuilder::new(TagScheme::PosSemantic, EstimatorKind::Mle)
    }

    mod counting {
        use super::*;

        #[test]
        /// Structures and terminals receive the sample weights
        fn test_fit_counts() {
            let mut builder = builder();
            assert!(builder.fit(SAMPLES.iter()) == 4);

            let tally = builder.tally();
            assert!(tally.base_structures["(ppis1_unkwn)(vv0_love.v.01)(ppy_unkwn)"] == 5.0);
            assert!(tally.base_structures["(number6)"] == 8.0);
            assert!(tally.tag_dicts["vv0_love.v.01"]["love"] == 8.0);
            assert!(tally.tag_dicts["number3"]["123"] == 3.0);
            assert!(tally.total() == 20.0);
        }

        #[test]
        /// Empty samples are an error on their own and skipped in bulk
        fn test_empty_sample() {
            let mut builder = builder();
            assert!(matches!(
                builder.fit_incremental(&[], 1.0),
                Err(GrammarError::EmptySample)
            ));
            let samples = [TrainingSample::new(vec![], 1.0), SAMPLES[2].clone()];
            assert!(builder.fit(&samples) == 1);
            assert!(builder.tally().total() == 8.0);
        }

        #[test]
        /// Counting in pieces gives the same tally as counting at once
        fn test_partition_independence() {
            let mut whole = builder();
            whole.fit(SAMPLES.iter());

            let mut parts = builder();
            let (_, first) = parts.tally_samples(&SAMPLES[..1]);
            let (_, second) = parts.tally_samples(&SAMPLES[1..]);
            parts.merge(second);
            parts.merge(first);

            assert!(parts.tally() == whole.tally());
        }

        #[cfg(feature = "rayon")]
        #[test]
        /// The parallel fit matches the sequential one
        fn test_par_fit() {
            use super::super::rayon::ParFit;

            let mut sequential = builder();
            sequential.fit(SAMPLES.iter());
            for workers in [1, 2, 3, 8] {
                let mut parallel = builder();
                assert!(parallel.par_fit(&SAMPLES, workers) == SAMPLES.len());
                assert!(parallel.tally() == sequential.tally(), "{workers} workers differ");
            }
        }

        #[cfg(feature = "rayon")]
        #[test]
        /// Weights without an exact binary form count the same on any number
        /// of workers
        fn test_par_fit_fractional_weights() {
            use super::super::rayon::ParFit;

            let samples = vec![TrainingSample::new(vec![Fragment::gap("123")], 0.1); 10];
            let mut sequential = builder();
            sequential.fit(&samples);
            assert!(sequential.tally().base_structures["(number3)"] == 1.0);
            assert!(sequential.tally().total() == 1.0);
            for workers in [2, 3, 7] {
                let mut parallel = builder();
                assert!(parallel.par_fit(&samples, workers) == samples.len());
                assert!(parallel.tally() == sequential.tally(), "{workers} workers differ");
            }
        }
    }

    mod probabilities {
        use super::*;

        #[test]
        /// Structure probabilities sum to one, most probable first
        fn test_base_structures_sum_to_one() {
            let mut builder = builder();
            builder.fit(SAMPLES.iter());
            let probabilities = builder.base_structure_probabilities();
            let total: f64 = probabilities.iter().map(|(_, p)| p).sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!(probabilities[0] == ("(number6)".to_owned(), 0.4));
            assert!(probabilities.windows(2).all(|w| w[0].1 >= w[1].1));
        }

        #[test]
        /// Each tag's terminals sum to one under both estimators
        fn test_tags_sum_to_one() {
            for estimator in [EstimatorKind::Mle, EstimatorKind::Laplace] {
                let mut builder = GrammarBuilder::new(TagScheme::Backoff, estimator);
                builder.fit(SAMPLES.iter());
                builder.add_vocabulary([Fragment::gap("999"), Fragment::gap("321")]);
                for (tag, terminals) in builder.tag_probabilities() {
                    let total: f64 = terminals.iter().map(|(_, p)| p).sum();
                    if estimator == EstimatorKind::Mle && tag == "number3" {
                        // unseen vocabulary has no mass without smoothing
                        assert!(terminals.iter().any(|(_, p)| *p == 0.0));
                    }
                    assert!((total - 1.0).abs() < 1e-9, "{tag} sums to {total}");
                }
            }
        }

        #[test]
        /// Vocabulary words are smoothed in but never overwrite counts
        fn test_add_vocabulary() {
            let mut builder = GrammarBuilder::new(TagScheme::Backoff, EstimatorKind::Laplace);
            builder.fit(SAMPLES.iter());
            builder.add_vocabulary([Fragment::gap("123"), Fragment::gap("999")]);

            let number3 = &builder.tally().tag_dicts["number3"];
            assert!(number3["123"] == 3.0);
            assert!(number3["999"] == 0.0);

            let probabilities = &builder.tag_probabilities()["number3"];
            assert!(probabilities[0] == ("123".to_owned(), 0.8));
            assert!(probabilities[1] == ("999".to_owned(), 0.2));
        }

        #[test]
        /// Nothing counted gives no structures
        fn test_empty_builder() {
            assert!(builder().base_structure_probabilities().is_empty());
            assert!(builder().tag_probabilities().is_empty());
        }
    }

    mod semantics {
        use super::*;

        fn verb_tree() -> WeightedTree {
            let mut tree = WeightedTree::new();
            tree.insert_class_path(&["love.v.01"], false);
            tree.insert_class_path(&["feel.v.01", "love.v.02"], false);
            tree
        }

        #[test]
        /// Fitted cuts replace raw keys with their classes
        fn test_fit_treecuts() {
            let mut builder = GrammarBuilder::new(TagScheme::Backoff, EstimatorKind::Mle);
            builder.fit_treecuts(None, Some(verb_tree()), &SAMPLES);
            builder.fit(SAMPLES.iter());

            let tally = builder.tally();
            let love: Count = tally
                .tag_dicts
                .iter()
                .filter_map(|(_, terminals)| terminals.get("love"))
                .sum();
            assert!(love == 8.0);
            // nouns have no cut and keep their key
            assert!(tally.tag_dicts["monkey.n.01"]["monkey"] == 4.0);
        }

        #[test]
        /// A key under two classes splits its weight between them
        fn test_weight_split() {
            let mut tree = WeightedTree::new();
            tree.insert(&["animal.n.01", "monkey.n.01"], 1.0, true);
            tree.insert(&["child.n.01", "monkey.n.01"], 1.0, true);
            tree.update_counts();
            let animal = tree.child(tree.root(), "animal.n.01").unwrap();
            let child = tree.child(tree.root(), "child.n.01").unwrap();
            let treecut = TreeCut::new(tree, vec![animal, child]);

            let mut builder = GrammarBuilder::new(TagScheme::Backoff, EstimatorKind::Mle)
                .with_treecuts(Some(treecut), None);
            builder.fit([&SAMPLES[3]]);

            let tally = builder.tally();
            assert!(tally.base_structures["(animal.n.01)(number1)"] == 2.0);
            assert!(tally.base_structures["(child.n.01)(number1)"] == 2.0);
            assert!(tally.tag_dicts["number1"]["1"] == 4.0);
        }

        /// Fractional samples, each monkey split between three classes
        fn three_way_split() -> (GrammarBuilder, Vec<TrainingSample>) {
            let mut tree = WeightedTree::new();
            for class in ["animal.n.01", "child.n.01", "person.n.01"] {
                tree.insert(&[class, "monkey.n.01"], 1.0, true);
            }
            tree.update_counts();
            let cut = tree.node(tree.root()).children().to_vec();
            let treecut = TreeCut::new(tree, cut);

            let builder = GrammarBuilder::new(TagScheme::Backoff, EstimatorKind::Mle)
                .with_treecuts(Some(treecut), None);
            let samples = [0.1, 0.7, 1.0, 0.3, 0.2, 0.9, 0.4]
                .into_iter()
                .map(|weight| {
                    TrainingSample::new(
                        vec![
                            Fragment::new("monkey", Some("nn1"), Some("monkey.n.01")),
                            Fragment::gap("1"),
                        ],
                        weight,
                    )
                })
                .collect();
            (builder, samples)
        }

        #[test]
        /// Split weights do not depend on the order samples arrive in
        fn test_split_order_independence() {
            let (mut forward, samples) = three_way_split();
            let mut backward = forward.clone();
            forward.fit(&samples);
            backward.fit(samples.iter().rev());

            assert!(forward.tally() == backward.tally());
            assert!(forward.tally().base_structures.len() == 3);
            assert!((forward.tally().total() - 3.6).abs() < 1e-12);
        }

        #[cfg(feature = "rayon")]
        #[test]
        /// Split weights count the same on any number of workers
        fn test_split_par_fit() {
            use super::super::rayon::ParFit;

            let (mut sequential, samples) = three_way_split();
            let fresh = sequential.clone();
            sequential.fit(&samples);
            for workers in [2, 3, 4, 7] {
                let mut parallel = fresh.clone();
                parallel.par_fit(&samples, workers);
                assert!(parallel.tally() == sequential.tally(), "{workers} workers differ");
                assert!(
                    parallel.base_structure_probabilities()
                        == sequential.base_structure_probabilities()
                );
            }
        }
    }
}
