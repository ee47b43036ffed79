//! Saving a grammar to a directory and reading it back.
//!
//! The layout is
//!
//! ```text
//! <dir>/rules.txt                one "structure\tprobability" per line
//! <dir>/nonterminals/<tag>.txt   one "terminal\tprobability" per line
//! <dir>/noun-treecut             bincode encoded noun cut, when there is one
//! <dir>/verb-treecut             bincode encoded verb cut, when there is one
//! <dir>/params.json              how the grammar was trained
//! ```
//!
//! Tables are written most probable first. Probabilities are printed in their
//! shortest exact form so a reloaded grammar scores exactly like the saved one.
//! Tags are arbitrary strings, so their file names escape `%`, path
//! separators, NUL and a leading `.` as `%XX`.

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::GrammarError,
    estimator::EstimatorKind,
    grammar::{
        Grammar,
        semantics::SemanticClasses,
        tagging::{TagScheme, Tagger},
    },
    tree::TreeCut,
};

pub const RULES_FILE: &str = "rules.txt";
pub const NONTERMINALS_DIR: &str = "nonterminals";
pub const NOUN_TREECUT_FILE: &str = "noun-treecut";
pub const VERB_TREECUT_FILE: &str = "verb-treecut";
pub const METADATA_FILE: &str = "params.json";

/// How a grammar was trained
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GrammarMetadata {
    pub estimator: EstimatorKind,
    pub tag_scheme: TagScheme,
    /// Wagner factor of the tree cuts, absent for Li & Abe
    #[serde(default)]
    pub specificity: Option<f64>,
}

impl Grammar {
    /// Writes the grammar into `path`, replacing whatever was there
    pub fn write_to_disk(&self, path: &Path) -> Result<(), GrammarError> {
        match fs::remove_dir_all(path) {
            Ok(()) => log::debug!("Removed previous grammar at {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => return Err(GrammarError::io(path, e)),
        }
        let nonterminals_dir = path.join(NONTERMINALS_DIR);
        fs::create_dir_all(&nonterminals_dir).map_err(|e| GrammarError::io(path, e))?;

        write_table(
            &path.join(RULES_FILE),
            self.rules
                .iter()
                .map(|rule| (rule.structure.as_str(), rule.probability)),
        )?;

        let mut written = 0;
        for (tag, nonterminal) in self.nonterminals() {
            if tag.is_empty() {
                log::warn!("Skipping a nonterminal without a tag");
                continue;
            }
            write_table(
                &nonterminals_dir.join(format!("{}.txt", tag_file_stem(tag))),
                nonterminal
                    .terminals()
                    .iter()
                    .map(|t| (t.word.as_str(), t.probability)),
            )?;
            written += 1;
        }

        if let Some(noun) = &self.semantics.noun {
            noun.save(&path.join(NOUN_TREECUT_FILE))?;
        }
        if let Some(verb) = &self.semantics.verb {
            verb.save(&path.join(VERB_TREECUT_FILE))?;
        }

        let metadata_path = path.join(METADATA_FILE);
        let file = File::create(&metadata_path).map_err(|e| GrammarError::io(&metadata_path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.metadata)?;

        log::info!(
            "Wrote {} rules and {written} nonterminals to {}",
            self.rules.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces the tables of this grammar with the ones saved in `path`.
    ///
    /// The proper noun lists of the grammar are kept. Malformed lines are
    /// skipped with a warning, a missing `params.json` falls back to the
    /// default metadata.
    pub fn read(&mut self, path: &Path) -> Result<(), GrammarError> {
        let rules_path = path.join(RULES_FILE);
        if !rules_path.is_file() {
            return Err(GrammarError::MissingRules(path.to_path_buf()));
        }
        let rules = read_table(&rules_path)?;

        let mut nonterminals = HashMap::new();
        let nonterminals_dir = path.join(NONTERMINALS_DIR);
        match fs::read_dir(&nonterminals_dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(|e| GrammarError::io(&nonterminals_dir, e))?;
                    let file = entry.path();
                    if file.extension().is_none_or(|ext| ext != "txt") {
                        continue;
                    }
                    let tag = file
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(tag_from_file_stem);
                    let Some(tag) = tag else {
                        log::warn!("Skipping nonterminal file {}", file.display());
                        continue;
                    };
                    nonterminals.insert(tag, read_table(&file)?);
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("No nonterminals found in {}", path.display());
            },
            Err(e) => return Err(GrammarError::io(nonterminals_dir, e)),
        }

        let noun = load_treecut(&path.join(NOUN_TREECUT_FILE))?;
        let verb = load_treecut(&path.join(VERB_TREECUT_FILE))?;

        let metadata_path = path.join(METADATA_FILE);
        self.metadata = match File::open(&metadata_path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("No {METADATA_FILE} in {}, assuming defaults", path.display());
                GrammarMetadata::default()
            },
            Err(e) => return Err(GrammarError::io(metadata_path, e)),
        };
        if self.tagger.scheme() != self.metadata.tag_scheme {
            self.tagger = Tagger::with_names(self.metadata.tag_scheme, self.tagger.names().clone());
        }
        self.semantics = SemanticClasses::new(noun, verb);
        self.set_tables(rules, nonterminals);

        log::info!(
            "Read {} rules and {} nonterminals from {}",
            self.rules.len(),
            self.nonterminals.len(),
            path.display()
        );
        Ok(())
    }

    /// Loads a grammar saved with [`Grammar::write_to_disk`]
    pub fn from_files(path: &Path) -> Result<Self, GrammarError> {
        let mut grammar = Self::default();
        grammar.read(path)?;
        Ok(grammar)
    }
}

/// The file name of a tag's table, without the extension
fn tag_file_stem(tag: &str) -> String {
    let mut stem = String::with_capacity(tag.len());
    for (i, c) in tag.char_indices() {
        match c {
            '%' | '/' | '\\' | '\0' => stem.push_str(&format!("%{:02X}", c as u8)),
            '.' if i == 0 => stem.push_str("%2E"),
            c => stem.push(c),
        }
    }
    stem
}

/// Undoes [`tag_file_stem`]. Stray `%` signs are kept as they are.
fn tag_from_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut tag = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| stem.get(i + 1..i + 3))
            .flatten()
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                tag.push(byte);
                i += 3;
            },
            None => {
                tag.push(bytes[i]);
                i += 1;
            },
        }
    }
    String::from_utf8(tag).ok().filter(|tag| !tag.is_empty())
}

fn write_table<'a, I>(path: &Path, entries: I) -> Result<(), GrammarError>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let file = File::create(path).map_err(|e| GrammarError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for (key, probability) in entries {
        writeln!(writer, "{key}\t{probability}").map_err(|e| GrammarError::io(path, e))?;
    }
    writer.flush().map_err(|e| GrammarError::io(path, e))
}

fn read_table(path: &Path) -> Result<Vec<(String, f64)>, GrammarError> {
    let file = File::open(path).map_err(|e| GrammarError::io(path, e))?;
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| GrammarError::io(path, e))?;
        if line.is_empty() {
            continue;
        }
        let parsed = line
            .rsplit_once('\t')
            .and_then(|(key, p)| p.trim().parse::<f64>().ok().map(|p| (key.to_owned(), p)));
        match parsed {
            Some((key, _)) if seen.contains(&key) => {
                log::warn!(
                    "{}:{}: duplicate entry {key:?}, keeping the first",
                    path.display(),
                    number + 1
                );
            },
            Some(entry) => {
                seen.insert(entry.0.clone());
                entries.push(entry);
            },
            None => log::warn!("{}:{}: malformed line {line:?}", path.display(), number + 1),
        }
    }
    Ok(entries)
}

fn load_treecut(path: &Path) -> Result<Option<TreeCut>, GrammarError> {
    if path.is_file() {
        TreeCut::load(path).map(Some)
    } else {
        Ok(None)
    }
}
