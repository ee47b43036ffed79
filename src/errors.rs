//! Error types shared by the grammar, tree cut and persistence code.
//!
//! Only failures that stop an operation as a whole show up here. Lookup misses,
//! malformed table lines and single bad training samples are recovered from
//! where they happen and are logged instead.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while training, saving or loading a grammar
#[derive(Debug, Error)]
pub enum GrammarError {
    /// A file or directory of the grammar could not be read or written
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A serialized [`TreeCut`] could not be encoded or decoded
    ///
    /// [`TreeCut`]: crate::tree::TreeCut
    #[error("tree cut serialization failed: {0}")]
    TreeCut(#[from] bincode::Error),

    /// The `params.json` metadata record could not be encoded or decoded
    #[error("grammar metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The grammar directory has no `rules.txt`
    #[error("no rules table found in {0}")]
    MissingRules(PathBuf),

    /// A training sample had no fragments, so it has no base structure
    #[error("training sample has no fragments")]
    EmptySample,
}

impl GrammarError {
    /// Wraps an [`std::io::Error`] with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
