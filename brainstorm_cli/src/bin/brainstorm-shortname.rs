use brainstorm_cli::{
    CommonArgs, EXIT_CONFIG_ERROR, exit_code, init_logging, noun, render_summary, run_campaign,
};
use brainstorm_core::config::Variant;
use brainstorm_core::parser::{ShortNameParser, ShortNamePattern};
use brainstorm_core::prompt::PromptBuilder;

use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

/// Guesses the full filename behind an 8.3 short name and confirms guesses with a fuzzer.
#[derive(Parser, Debug)]
#[command(
    name = "brainstorm-shortname",
    version,
    about,
    after_help = "Example: brainstorm-shortname \"ffuf -w WORDLIST -u http://target.com/FUZZ\" BENCHM~1.PDF"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// The short filename to expand, e.g. BENCHM~1.PDF
    filename: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.common.debug);
    info!("Starting brainstorm-shortname");

    let loaded = cli.common.settings(Variant::ShortName).and_then(|(settings, template)| {
        let pattern = ShortNamePattern::parse(&cli.filename)?;
        Ok((settings, template, pattern))
    });
    let (settings, template, pattern) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    info!("Expanding short filename {}", pattern.as_str());

    let prompt = PromptBuilder::new(
        template,
        settings.max_prompt_links,
        settings.shuffle_links,
        settings.rng_seed,
    )
    .with_short_name(pattern.as_str());

    match run_campaign(&settings, Box::new(ShortNameParser::new(pattern)), prompt, &[]) {
        Ok(report) => {
            print!("{}", render_summary(&report, noun(settings.variant)));
            exit_code(&report)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
