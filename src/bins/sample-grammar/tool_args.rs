use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct ToolArgs {
    /// Number of passwords to draw
    pub(crate) count: usize,

    /// Directory of a trained grammar
    pub(crate) grammar_dir: PathBuf,

    /// Seeds the random generator so the draw can be repeated
    #[arg(short, long)]
    pub(crate) seed: Option<u64>,

    #[command(flatten)]
    pub(crate) verbose: clap_verbosity_flag::Verbosity,
}
