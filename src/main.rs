#![forbid(unsafe_code)]
use std::io::{self, BufWriter};

use clap::Parser;
use semantic_guesser_rs::{
    grammar::Grammar,
    guesser::{Guesser, write_guesses},
};
use tool_args::ToolArgs;

mod tool_args;

fn main() -> Result<(), String> {
    let parser = ToolArgs::parse();

    env_logger::builder()
        .filter_level(parser.verbose.log_level_filter())
        .init();

    let grammar = Grammar::from_files(&parser.grammar_dir)
        .map_err(|e| format!("Failed to load grammar: {e}"))?;

    if parser.info {
        println!("Grammar: {}", parser.grammar_dir.display());
        println!("Rules: {}", grammar.rules().len());
        println!("Nonterminals: {}", grammar.nonterminals().count());
        println!("# of guesses: {:e}", grammar.guess_space());
        return Ok(());
    }

    let guesser = Guesser::new(&grammar, parser.guesser_config());
    let mut stdout = BufWriter::new(io::stdout().lock());
    write_guesses(guesser, &mut stdout, parser.detailed)
        .map_err(|e| format!("Failed to write guesses: {e}"))?;

    Ok(())
}
