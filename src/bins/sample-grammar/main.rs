#![forbid(unsafe_code)]
use std::io::{self, BufWriter, ErrorKind, Write};

use clap::Parser;
use rand::{SeedableRng, rngs::StdRng};
use semantic_guesser_rs::grammar::Grammar;
use tool_args::ToolArgs;

mod tool_args;

fn main() -> Result<(), String> {
    let parser = ToolArgs::parse();

    env_logger::builder()
        .filter_level(parser.verbose.log_level_filter())
        .init();

    let grammar = Grammar::from_files(&parser.grammar_dir)
        .map_err(|e| format!("Failed to load grammar: {e}"))?;

    let mut rng = match parser.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let samples = grammar.sample(parser.count, &mut rng);
    log::info!("Drew {} passwords", samples.len());

    let mut stdout = BufWriter::new(io::stdout().lock());
    let written = samples
        .iter()
        .try_for_each(|sample| writeln!(stdout, "{}\t{}", sample.password, sample.probability))
        .and_then(|()| stdout.flush());
    match written {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            log::info!("Output closed early");
            Ok(())
        },
        Err(e) => Err(format!("Failed to write samples: {e}")),
    }
}
