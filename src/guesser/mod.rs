//! Enumerating a grammar's guesses from most to least probable.
//!
//! Every base structure spans a lattice of terminal combinations, one axis per
//! tag, each axis sorted by decreasing probability. A priority queue holds the
//! frontier of all lattices at once: it starts with the top corner of each
//! lattice and every popped state pushes its successors. Since a successor is
//! never more probable than its parent, the queue's maximum is always the most
//! probable guess not yet produced.
//!
//! Two successor rules are available. [`Algorithm::Next`] only advances slots
//! at or after the slot the state was created by, which makes the lattice a
//! tree. [`Algorithm::Deadbeat`] advances every slot but lets a child be
//! queued only by its least probable parent.

pub mod mangle;

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    io::{self, ErrorKind, Write},
};

use crate::grammar::{Grammar, Rule, Terminal};

/// Guesses between two progress messages
pub const PROGRESS_INTERVAL: u64 = 1_000_000;

/// How the successors of a popped state are chosen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Algorithm {
    /// Advance the slots from the pivot on
    #[default]
    Next,
    /// Advance every slot, queue through the least probable parent
    Deadbeat,
}

/// What to generate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GuesserConfig {
    /// Shorter guesses (in characters) are skipped
    pub min_length: usize,
    /// Stop after this many guesses
    pub max_guesses: Option<u64>,
    /// Also produce capitalization variants
    pub mangle: bool,
    /// States less probable than this are never queued
    pub min_probability: f64,
    pub algorithm: Algorithm,
}

impl Default for GuesserConfig {
    fn default() -> Self {
        Self {
            min_length: 0,
            max_guesses: None,
            mangle: false,
            min_probability: 0.0,
            algorithm: Algorithm::Next,
        }
    }
}

/// A generated password
#[derive(Clone, Debug, PartialEq)]
pub struct Guess<'g> {
    pub text: String,
    pub probability: f64,
    pub structure: &'g str,
}

/// The terminal lists of a rule's tags
struct Lattice<'g> {
    rule: &'g Rule,
    axes: Vec<&'g [Terminal]>,
    gaps: Vec<bool>,
}

impl Lattice<'_> {
    fn probability(&self, indices: &[usize]) -> f64 {
        indices
            .iter()
            .zip(&self.axes)
            .fold(self.rule.probability, |p, (&i, axis)| p * axis[i].probability)
    }
}

/// A point of one lattice waiting in the queue
#[derive(Clone, Debug)]
struct State {
    probability: f64,
    lattice: usize,
    indices: Vec<usize>,
    pivot: usize,
}

// Higher probability first, then the more probable rule, then the earlier
// combination.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.probability
            .total_cmp(&other.probability)
            .then_with(|| other.lattice.cmp(&self.lattice))
            .then_with(|| other.indices.cmp(&self.indices))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

/// Lazily yields the guesses of a grammar in non-increasing probability
///
/// ```rust
/// use std::collections::HashMap;
///
/// use semantic_guesser_rs::{
///     grammar::{Grammar, GrammarMetadata, SemanticClasses, Tagger},
///     guesser::{Guesser, GuesserConfig},
/// };
///
/// let grammar = Grammar::new(
///     GrammarMetadata::default(),
///     Tagger::new(Default::default()),
///     vec![("(nn1)(number1)".to_owned(), 1.0)],
///     HashMap::from([
///         ("nn1".to_owned(), vec![("dog".to_owned(), 0.75), ("cat".to_owned(), 0.25)]),
///         ("number1".to_owned(), vec![("1".to_owned(), 0.5), ("2".to_owned(), 0.5)]),
///     ]),
///     SemanticClasses::default(),
/// );
///
/// let guesses: Vec<String> = Guesser::new(&grammar, GuesserConfig::default())
///     .map(|guess| guess.text)
///     .collect();
/// assert!(guesses == vec!["dog1", "dog2", "cat1", "cat2"]);
/// ```
pub struct Guesser<'g> {
    config: GuesserConfig,
    lattices: Vec<Lattice<'g>>,
    queue: BinaryHeap<State>,
    pending: VecDeque<Guess<'g>>,
    emitted: u64,
}

impl<'g> Guesser<'g> {
    /// Seeds the queue with the most probable guess of every rule. Rules using
    /// a tag without terminals cannot produce anything and are left out.
    pub fn new(grammar: &'g Grammar, config: GuesserConfig) -> Self {
        let mut lattices = Vec::with_capacity(grammar.rules().len());
        let mut excluded = 0;
        for rule in grammar.rules() {
            let axes: Option<Vec<&[Terminal]>> = rule
                .tags
                .iter()
                .map(|tag| {
                    grammar
                        .nonterminal(tag)
                        .map(|nt| nt.terminals())
                        .filter(|terminals| !terminals.is_empty())
                })
                .collect();
            match axes {
                Some(axes) if !axes.is_empty() => lattices.push(Lattice {
                    rule,
                    axes,
                    gaps: mangle::gap_flags(&rule.tags),
                }),
                _ => excluded += 1,
            }
        }
        if excluded > 0 {
            log::warn!("{excluded} rules use tags without terminals and were left out");
        }

        let queue = lattices
            .iter()
            .enumerate()
            .filter_map(|(lattice, l)| {
                let indices = vec![0; l.axes.len()];
                let probability = l.probability(&indices);
                (probability >= config.min_probability).then_some(State {
                    probability,
                    lattice,
                    indices,
                    pivot: 0,
                })
            })
            .collect::<BinaryHeap<_>>();
        log::debug!("Seeded the queue with {} of {} rules", queue.len(), lattices.len());

        Self {
            config,
            lattices,
            queue,
            pending: VecDeque::new(),
            emitted: 0,
        }
    }

    /// Guesses handed out so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn decode(&self, state: &State) -> Vec<String> {
        let lattice = &self.lattices[state.lattice];
        let words = state
            .indices
            .iter()
            .zip(&lattice.axes)
            .map(|(&i, axis)| axis[i].word.as_str());
        if self.config.mangle {
            let fragments: Vec<(&str, bool)> = words.zip(lattice.gaps.iter().copied()).collect();
            mangle::mangle(&fragments)
        } else {
            vec![words.collect()]
        }
    }

    fn successors(&self, state: &State) -> Vec<State> {
        let lattice = &self.lattices[state.lattice];
        let first = match self.config.algorithm {
            Algorithm::Next => state.pivot,
            Algorithm::Deadbeat => 0,
        };
        (first..state.indices.len())
            .filter(|&slot| state.indices[slot] + 1 < lattice.axes[slot].len())
            .filter_map(|slot| {
                let mut indices = state.indices.clone();
                indices[slot] += 1;
                let probability = lattice.probability(&indices);
                if probability < self.config.min_probability {
                    return None;
                }
                if self.config.algorithm == Algorithm::Deadbeat
                    && !is_lowest_probability_parent(lattice, &indices, state.probability, slot)
                {
                    return None;
                }
                Some(State {
                    probability,
                    lattice: state.lattice,
                    indices,
                    pivot: slot,
                })
            })
            .collect()
    }
}

/// Whether the parent that advanced `pivot` to reach `child` is the least
/// probable of the child's parents. Equally probable parents defer to the one
/// that advanced the highest slot.
fn is_lowest_probability_parent(
    lattice: &Lattice<'_>,
    child: &[usize],
    parent_probability: f64,
    pivot: usize,
) -> bool {
    (0..child.len())
        .filter(|&slot| slot != pivot && child[slot] > 0)
        .all(|slot| {
            let mut other = child.to_vec();
            other[slot] -= 1;
            let other_probability = lattice.probability(&other);
            other_probability > parent_probability
                || (other_probability == parent_probability && slot < pivot)
        })
}

impl<'g> Iterator for Guesser<'g> {
    type Item = Guess<'g>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.config.max_guesses.is_some_and(|max| self.emitted >= max) {
                return None;
            }
            if let Some(guess) = self.pending.pop_front() {
                self.emitted += 1;
                return Some(guess);
            }

            let state = self.queue.pop()?;
            let rule: &'g Rule = self.lattices[state.lattice].rule;
            let structure = rule.structure.as_str();
            for text in self.decode(&state) {
                if text.chars().count() >= self.config.min_length {
                    self.pending.push_back(Guess {
                        text,
                        probability: state.probability,
                        structure,
                    });
                }
            }
            let successors = self.successors(&state);
            self.queue.extend(successors);
        }
    }
}

/// Writes one guess per line until the guesser is exhausted.
///
/// A closed sink ends the run early without being an error. Returns the
/// number of guesses written.
pub fn write_guesses<W: Write>(
    mut guesser: Guesser<'_>,
    sink: &mut W,
    detailed: bool,
) -> io::Result<u64> {
    let mut last = None;
    while let Some(guess) = guesser.next() {
        let written = if detailed {
            writeln!(sink, "{}\t{}\t{}", guess.text, guess.probability, guess.structure)
        } else {
            writeln!(sink, "{}", guess.text)
        };
        if let Err(e) = written {
            return closed_sink(e, guesser.emitted() - 1);
        }
        if guesser.emitted() % PROGRESS_INTERVAL == 0 {
            log::info!(
                "# of guesses: {}, queue size: {}",
                guesser.emitted(),
                guesser.queue_len()
            );
        }
        last = Some(guess);
    }
    if let Err(e) = sink.flush() {
        return closed_sink(e, guesser.emitted());
    }

    if let Some(last) = last {
        log::info!("Last guess: ({}, {})", last.text, last.probability);
    }
    log::info!("{} guesses generated", guesser.emitted());
    Ok(guesser.emitted())
}

fn closed_sink(error: io::Error, written: u64) -> io::Result<u64> {
    if error.kind() == ErrorKind::BrokenPipe {
        log::info!("Output closed after {written} guesses");
        Ok(written)
    } else {
        Err(error)
    }
}
