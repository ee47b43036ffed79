//! Deriving the grammar category (tag) of a password fragment.
//!
//! A fragment arrives with an optional syntactic tag and an optional semantic
//! class. Depending on the [`TagScheme`] the tag is built from one, both or
//! neither of them. Fragments that are not words at all always fall back to a
//! length and category bucket such as `number4` or `special2`.

use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::errors::GrammarError;

/// Syntactic tags marking proper nouns
pub const PROPER_NOUN_TAGS: [&str; 3] = ["np", "np1", "np2"];

/// Stands in for the semantic class of a word that has none
pub const UNKNOWN_SEMANTIC: &str = "unkwn";

/// Prefixes of the non-word ("gap") buckets
pub const GAP_CATEGORIES: [&str; 4] = ["number", "special", "char", "mixed"];

/// How the tag of a fragment is derived
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TagScheme {
    /// Length and category bucket only
    Word,
    /// Syntactic tag, bucket for non-words
    Pos,
    /// Semantic class, else syntactic tag, else bucket
    #[default]
    Backoff,
    /// `{syntactic}_{semantic}`, bucket for non-words
    #[value(name = "pos_semantic")]
    PosSemantic,
}

/// The fixed word lists proper nouns are matched against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProperNameKind {
    MaleName,
    FemaleName,
    City,
    Month,
    Surname,
    Country,
}

impl ProperNameKind {
    /// Lists in the order they are checked
    pub const PRECEDENCE: [ProperNameKind; 6] = [
        Self::MaleName,
        Self::FemaleName,
        Self::City,
        Self::Month,
        Self::Surname,
        Self::Country,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::MaleName => "mname",
            Self::FemaleName => "fname",
            Self::City => "city",
            Self::Month => "month",
            Self::Surname => "surname",
            Self::Country => "country",
        }
    }

    /// Name of the list file inside a word list directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::MaleName => "mnames.txt",
            Self::FemaleName => "fnames.txt",
            Self::City => "cities.txt",
            Self::Month => "months.txt",
            Self::Surname => "surnames.txt",
            Self::Country => "countries.txt",
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

/// Word lists used to classify proper nouns
#[derive(Clone, Debug, Default)]
pub struct ProperNames {
    lists: [HashSet<String>; 6],
}

impl ProperNames {
    /// No names at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Only the twelve English month names
    pub fn english_months() -> Self {
        Self::empty().with_list(
            ProperNameKind::Month,
            [
                "january",
                "february",
                "march",
                "april",
                "may",
                "june",
                "july",
                "august",
                "september",
                "october",
                "november",
                "december",
            ],
        )
    }

    /// Loads every list found in `dir`. Missing files leave their list empty.
    pub fn from_dir(dir: &Path) -> Result<Self, GrammarError> {
        let mut names = Self::empty();
        for kind in ProperNameKind::PRECEDENCE {
            let path = dir.join(kind.file_name());
            match fs::read_to_string(&path) {
                Ok(content) => {
                    names = names.with_list(kind, content.lines());
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::debug!("No {} list at {}", kind.tag(), path.display());
                },
                Err(e) => return Err(GrammarError::io(path, e)),
            }
        }
        Ok(names)
    }

    /// Adds words to one of the lists
    pub fn with_list<I, S>(mut self, kind: ProperNameKind, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lists[kind.slot()].extend(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_owned())
                .filter(|w| !w.is_empty()),
        );
        self
    }

    /// The first list containing `word`
    pub fn kind_of(&self, word: &str) -> Option<ProperNameKind> {
        ProperNameKind::PRECEDENCE
            .into_iter()
            .find(|kind| self.lists[kind.slot()].contains(word))
    }
}

/// Buckets a non-word by character category and length.
///
/// ```rust
/// use semantic_guesser_rs::grammar::tagging::nonword_tag;
///
/// assert!(nonword_tag("12345") == "number5");
/// assert!(nonword_tag("audh") == "char4");
/// assert!(nonword_tag("!!!") == "special3");
/// assert!(nonword_tag("3u4h3u4") == "mixed7");
/// ```
pub fn nonword_tag(fragment: &str) -> String {
    let category = if fragment.is_empty() {
        "mixed"
    } else if fragment.chars().all(|c| c.is_ascii_digit()) {
        "number"
    } else if fragment.chars().all(|c| !c.is_ascii_alphanumeric()) {
        "special"
    } else if fragment.chars().all(|c| c.is_ascii_alphabetic()) {
        "char"
    } else {
        "mixed"
    };
    format!("{category}{}", fragment.chars().count())
}

/// Tells whether a tag is one of the non-word buckets built by [`nonword_tag`]
pub fn is_gap_tag(tag: &str) -> bool {
    GAP_CATEGORIES.iter().any(|category| {
        tag.strip_prefix(category)
            .is_some_and(|len| !len.is_empty() && len.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Assigns tags to fragments under one [`TagScheme`]
///
/// ```rust
/// use semantic_guesser_rs::grammar::tagging::{TagScheme, Tagger};
///
/// let backoff = Tagger::new(TagScheme::Backoff);
/// assert!(backoff.tag("loved", Some("vvd"), Some("love.v.01")) == "love.v.01");
///
/// let pos_semantic = Tagger::new(TagScheme::PosSemantic);
/// assert!(pos_semantic.tag("loved", Some("vvd"), Some("love.v.01")) == "vvd_love.v.01");
/// assert!(pos_semantic.tag("3u4h3u4", None, None) == "mixed7");
/// ```
#[derive(Clone, Debug)]
pub struct Tagger {
    scheme: TagScheme,
    names: ProperNames,
}

impl Tagger {
    /// A tagger recognising English months as the only proper nouns
    pub fn new(scheme: TagScheme) -> Self {
        Self::with_names(scheme, ProperNames::english_months())
    }

    pub fn with_names(scheme: TagScheme, names: ProperNames) -> Self {
        Self { scheme, names }
    }

    pub fn scheme(&self) -> TagScheme {
        self.scheme
    }

    pub fn names(&self) -> &ProperNames {
        &self.names
    }

    pub fn tag(&self, terminal: &str, pos: Option<&str>, semantic: Option<&str>) -> String {
        match self.scheme {
            TagScheme::Word => nonword_tag(terminal),
            TagScheme::Pos => Self::syntactic(terminal, pos),
            TagScheme::Backoff => self
                .proper_name(terminal, pos)
                .or_else(|| semantic.map(ToOwned::to_owned))
                .unwrap_or_else(|| Self::syntactic(terminal, pos)),
            TagScheme::PosSemantic => match pos {
                None => nonword_tag(terminal),
                Some(pos) => self.proper_name(terminal, Some(pos)).unwrap_or_else(|| {
                    format!("{pos}_{}", semantic.unwrap_or(UNKNOWN_SEMANTIC))
                }),
            },
        }
    }

    fn syntactic(terminal: &str, pos: Option<&str>) -> String {
        match pos {
            Some(pos) => pos.to_owned(),
            None => nonword_tag(terminal),
        }
    }

    /// Word list tag of a proper noun. Anything not tagged as a proper noun
    /// never gets one.
    fn proper_name(&self, terminal: &str, pos: Option<&str>) -> Option<String> {
        pos.filter(|pos| PROPER_NOUN_TAGS.contains(pos))?;
        self.names
            .kind_of(terminal)
            .map(|kind| kind.tag().to_owned())
    }
}
