use brainstorm_cli::{
    CommonArgs, EXIT_CONFIG_ERROR, exit_code, init_logging, noun, render_summary, run_campaign,
};
use brainstorm_core::config::{Settings, Variant};
use brainstorm_core::parser::PathSuggestionParser;
use brainstorm_core::prompt::PromptBuilder;
use brainstorm_core::seed::{SeedPage, base_url, fetch_seed_page};

use clap::Parser;
use console::style;
use log::{error, info, warn};
use std::process::ExitCode;
use std::time::Duration;

const SEED_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Asks a local LLM for likely paths on a web target and confirms them with a fuzzer.
#[derive(Parser, Debug)]
#[command(
    name = "brainstorm",
    version,
    about,
    after_help = "Example: brainstorm \"ffuf -w WORDLIST -u http://target.com/FUZZ -fc 403\" --cycles 100 --model llama3"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Skip crawling the target page for initial links and headers
    #[arg(long)]
    no_seed: bool,
}

fn crawl_target(settings: &Settings) -> SeedPage {
    let Some(url) = settings.command.target_url() else {
        warn!("No -u URL in the fuzz command; starting without seed links");
        return SeedPage::default();
    };
    info!("Extracted target URL from command: {url}");
    let page_url = base_url(url, &settings.fuzz_keyword);
    match fetch_seed_page(&page_url, SEED_FETCH_TIMEOUT) {
        Ok(page) => page,
        Err(e) => {
            warn!("{e}; starting without seed links");
            SeedPage::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.common.debug);
    info!("Starting brainstorm");

    let (settings, template) = match cli.common.settings(Variant::Paths) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let seed = if cli.no_seed {
        SeedPage::default()
    } else {
        crawl_target(&settings)
    };
    if !seed.links.is_empty() {
        println!(
            "\n{}",
            style("Initial unique links extracted from website:").dim()
        );
        for link in &seed.links {
            println!("  {}", style(link).dim());
        }
    }

    let prompt = PromptBuilder::new(
        template,
        settings.max_prompt_links,
        settings.shuffle_links,
        settings.rng_seed,
    )
    .with_server_headers(seed.headers);

    match run_campaign(
        &settings,
        Box::new(PathSuggestionParser::new()),
        prompt,
        &seed.links,
    ) {
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
