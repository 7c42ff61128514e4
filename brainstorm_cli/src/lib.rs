//! Shared plumbing for the `brainstorm` and `brainstorm-shortname` binaries.

use brainstorm_core::config::{BrainstormConfig, Settings, StatusCodes, Variant};
use brainstorm_core::controller::{
    ControllerOptions, CycleComponents, CycleController, Phase, RunReport,
};
use brainstorm_core::filter::StatusFilter;
use brainstorm_core::link_store::LinkStore;
use brainstorm_core::model::OllamaClient;
use brainstorm_core::observer::CycleObserver;
use brainstorm_core::parser::SuggestionParser;
use brainstorm_core::prompt::{PromptBuilder, PromptTemplate};
use brainstorm_core::runner::{CommandFuzzRunner, CommandRunnerConfig};
use brainstorm_core::wordlist::WordlistWriter;

use anyhow::Context;
use clap::Args;
use console::style;
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status for invalid configuration detected before the first cycle.
pub const EXIT_CONFIG_ERROR: u8 = 2;

const DEFAULT_CONFIG_FILE: &str = "brainstorm.toml";

/// Options shared by both binaries. Anything left unset falls back to the
/// config file, then to built-in defaults.
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Fuzz command template, e.g. "ffuf -w WORDLIST -u https://target/FUZZ"
    pub command: String,

    /// Enable debug logging (prompts and raw model output)
    #[arg(short, long)]
    pub debug: bool,

    /// Number of cycles to run [default: 50]
    #[arg(short, long)]
    pub cycles: Option<u64>,

    /// Ollama model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output directory for the links file and fuzzer files [default: /tmp/brainstorm]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Prompt template file
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Comma-separated status codes that count as a hit [default: 200,301,302,303,307,308,403,401,500]
    #[arg(long)]
    pub status_codes: Option<String>,

    /// TOML configuration file [default: ./brainstorm.toml when present]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Inference service URL [default: $OLLAMA_HOST or http://localhost:11434]
    #[arg(long)]
    pub model_url: Option<String>,

    /// Model request timeout in seconds
    #[arg(long)]
    pub model_timeout: Option<u64>,

    /// Fuzz command timeout in seconds
    #[arg(long)]
    pub fuzz_timeout: Option<u64>,

    /// Token in the command replaced by the wordlist path [default: WORDLIST]
    #[arg(long)]
    pub placeholder: Option<String>,

    /// Stop after this many cycles in a row find nothing (0 = never)
    #[arg(long)]
    pub stop_after_idle: Option<u64>,

    /// Abort after this many failed cycles in a row (0 = never)
    #[arg(long)]
    pub max_failures: Option<u32>,

    /// Only put the newest N known entries into the prompt
    #[arg(long)]
    pub max_prompt_links: Option<usize>,

    /// Seed for shuffling prompt entries
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep the existing output file and continue from it
    #[arg(long)]
    pub resume: bool,
}

impl CommonArgs {
    /// Writes every flag that was given over the loaded configuration. The fuzz
    /// command itself only comes from the command line.
    pub fn apply(&self, config: &mut BrainstormConfig) -> anyhow::Result<()> {
        if let Some(cycles) = self.cycles {
            config.campaign.cycles = cycles;
        }
        if let Some(model) = &self.model {
            config.model.name = Some(model.clone());
        }
        if let Some(output) = &self.output {
            config.output.dir = output.clone();
        }
        if let Some(prompt_file) = &self.prompt_file {
            config.prompt.file = Some(prompt_file.clone());
        }
        if let Some(codes) = &self.status_codes {
            config.fuzz.status_codes = StatusCodes::parse(codes)?.iter().collect();
        }
        if let Some(url) = &self.model_url {
            config.model.endpoint = Some(url.clone());
        }
        if let Some(secs) = self.model_timeout {
            config.model.timeout_secs = secs;
        }
        if let Some(secs) = self.fuzz_timeout {
            config.fuzz.timeout_secs = secs;
        }
        if let Some(placeholder) = &self.placeholder {
            config.fuzz.placeholder = placeholder.clone();
        }
        if let Some(idle) = self.stop_after_idle {
            config.campaign.stop_after_idle = idle;
        }
        if let Some(max) = self.max_failures {
            config.campaign.max_consecutive_failures = max;
        }
        if let Some(max) = self.max_prompt_links {
            config.prompt.max_links = Some(max);
        }
        if let Some(seed) = self.seed {
            config.campaign.seed = Some(seed);
        }
        if self.resume {
            config.output.resume = true;
        }
        Ok(())
    }

    /// Loads the config file, applies the flags and validates the result.
    pub fn settings(&self, variant: Variant) -> anyhow::Result<(Settings, PromptTemplate)> {
        let mut config = load_config(self.config.as_ref())?;
        self.apply(&mut config)?;
        let settings = Settings::from_config(config, &self.command, variant)?;
        let template = PromptTemplate::load(&settings.prompt_file)?;
        Ok((settings, template))
    }
}

/// Explicit path, else `./brainstorm.toml` when present, else defaults.
pub fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BrainstormConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {path:?}");
            BrainstormConfig::load_from_file(path)
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                info!("Loading default configuration from {default_path:?}");
                BrainstormConfig::load_from_file(&default_path)
            } else {
                Ok(BrainstormConfig::default())
            }
        }
    }
}

pub fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// "links" for the path loop, "filenames" for the 8.3 loop.
pub fn noun(variant: Variant) -> &'static str {
    match variant {
        Variant::Paths => "links",
        Variant::ShortName => "filenames",
    }
}

/// Prints cycle progress to stdout.
pub struct ConsoleObserver {
    noun: &'static str,
}

impl ConsoleObserver {
    pub fn new(variant: Variant) -> Self {
        Self {
            noun: noun(variant),
        }
    }
}

impl CycleObserver for ConsoleObserver {
    fn on_cycle_start(&mut self, cycle: u64, cycles: u64) {
        println!("\nCycle {cycle}/{cycles}");
    }

    fn on_untested(&mut self, untested: &[String]) {
        println!(
            "\n{}",
            style(format!("New {} suggested by the model:", self.noun)).yellow()
        );
        for name in untested {
            println!("  {}", style(name).green());
        }
    }

    fn on_discovered(&mut self, links: &[String]) {
        println!(
            "\n{}",
            style(format!("New {} discovered:", self.noun)).yellow()
        );
        for link in links {
            println!("  {}", style(link).green());
        }
    }
}

/// Wires the Ollama client, the command runner and the status filter into a
/// controller and runs it to completion.
pub fn run_campaign(
    settings: &Settings,
    parser: Box<dyn SuggestionParser>,
    prompt: PromptBuilder,
    seeds: &[String],
) -> anyhow::Result<RunReport> {
    std::fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", settings.output_dir))?;

    let links_file = settings.links_file();
    let mut store = if settings.resume {
        let store = LinkStore::resume(&links_file)?;
        info!("Resumed {} entries from {links_file:?}", store.len());
        store
    } else {
        LinkStore::create(&links_file)?
    };
    let added = store.add_seeds(seeds.iter().map(String::as_str));
    if added > 0 {
        info!("Seeded prompt with {added} known entries");
    }

    let model = OllamaClient::new(&settings.model)?;
    info!(
        "Using model {} at {}",
        settings.model.name, settings.model.endpoint
    );
    let runner = CommandFuzzRunner::new(CommandRunnerConfig::new(
        settings.command.clone(),
        settings.fuzz_keyword.clone(),
        settings.fuzz_timeout,
        &settings.output_dir,
    ));

    let components = CycleComponents {
        model: Box::new(model),
        parser,
        runner: Box::new(runner),
        filter: Box::new(StatusFilter::new(settings.accepted_status.clone())),
    };
    let mut controller = CycleController::new(
        ControllerOptions::from_settings(settings),
        prompt,
        components,
        store,
        WordlistWriter::in_dir(&settings.output_dir),
    )
    .with_observer(Box::new(ConsoleObserver::new(settings.variant)));

    Ok(controller.run())
}

/// The end-of-run summary printed to stdout.
pub fn render_summary(report: &RunReport, noun: &str) -> String {
    let mut out = format!(
        "\n{}\n{} {}\n{} {}\n",
        style("=== Final Results ===").yellow(),
        style(format!("Total {noun} tested with ffuf:")).cyan(),
        report.tested,
        style(format!("Total new {noun} discovered:")).cyan(),
        report.discovered.len(),
    );
    if report.discovered.is_empty() {
        out.push_str(&format!(
            "\n{}\n",
            style(format!("No new {noun} were discovered")).yellow()
        ));
    } else {
        out.push_str(&format!(
            "\n{}\n",
            style(format!("New discovered {noun} (via ffuf):")).yellow()
        ));
        let mut sorted = report.discovered.clone();
        sorted.sort();
        for link in sorted {
            out.push_str(&format!("  {}\n", style(link).green()));
        }
    }
    if let Phase::Aborted(reason) = &report.phase {
        out.push_str(&format!("\n{} {reason}\n", style("Run aborted:").red()));
    } else if report.stopped_early {
        out.push_str(&format!(
            "\nStopped early after {} cycles without new {noun}\n",
            report.cycles_completed
        ));
    }
    out.push_str(&format!("Results saved to {:?}\n", report.links_file));
    out
}

/// 0 when the run finished, 1 when it was aborted.
pub fn exit_status(report: &RunReport) -> u8 {
    if report.is_success() { 0 } else { 1 }
}

pub fn exit_code(report: &RunReport) -> ExitCode {
    ExitCode::from(exit_status(report))
}
