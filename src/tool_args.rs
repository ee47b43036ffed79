use std::path::PathBuf;

use clap::Parser;
use semantic_guesser_rs::guesser::{Algorithm, GuesserConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct ToolArgs {
    /// Directory of a trained grammar
    pub(crate) grammar_dir: PathBuf,

    /// Skips guesses shorter than this many characters
    #[arg(short, long, default_value_t = 0)]
    pub(crate) length: usize,

    /// Stops after this many guesses
    #[arg(short = 'n', long)]
    pub(crate) limit: Option<u64>,

    /// Also prints the lower, upper, camel and title cased variants of
    /// every guess
    #[arg(short, long)]
    pub(crate) mangle: bool,

    /// Skips guesses less probable than this
    #[arg(short, long, default_value_t = 0.0)]
    pub(crate) prob: f64,

    /// How the next guesses of a structure are found
    #[arg(short, long, value_enum, default_value_t = Algorithm::Next)]
    pub(crate) algorithm: Algorithm,

    /// Prints the probability and base structure next to every guess
    #[arg(short, long)]
    pub(crate) detailed: bool,

    /// Skips printing out the guesses and instead prints out the number of
    /// rules and the number of guesses the grammar can produce
    #[arg(short, long)]
    pub(crate) info: bool,

    #[command(flatten)]
    pub(crate) verbose: clap_verbosity_flag::Verbosity,
}

impl ToolArgs {
    pub(crate) fn guesser_config(&self) -> GuesserConfig {
        GuesserConfig {
            min_length: self.length,
            max_guesses: self.limit,
            mangle: self.mangle,
            min_probability: self.prob,
            algorithm: self.algorithm,
        }
    }
}
