use crate::config::Settings;
use crate::filter::ResultFilter;
use crate::history::CandidateHistory;
use crate::link_store::LinkStore;
use crate::model::{ModelClient, ModelError, RetryPolicy, generate_with_retries};
use crate::observer::{CycleObserver, NoOpObserver};
use crate::parser::SuggestionParser;
use crate::prompt::PromptBuilder;
use crate::runner::FuzzRunner;
use crate::wordlist::WordlistWriter;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use thiserror::Error;

/// Why a run stopped before its configured cycle count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    #[error("{0}")]
    FuzzToolMissing(String),

    #[error("{count} consecutive cycles failed; last error: {last_error}")]
    RepeatedFailures { count: u32, last_error: String },

    #[error("Output file error: {0}")]
    Storage(String),
}

/// Where the controller's state machine stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// The next cycle to run, 0-based.
    Running(u64),
    Done,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub cycles: u64,
    /// Consecutive cycles without a new link before stopping early. 0 disables.
    pub stop_after_idle: u64,
    /// Consecutive failed cycles before aborting. 0 never aborts.
    pub max_consecutive_failures: u32,
    pub retry: RetryPolicy,
}

impl ControllerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cycles: settings.cycles,
            stop_after_idle: settings.stop_after_idle,
            max_consecutive_failures: settings.max_consecutive_failures,
            retry: RetryPolicy::from_options(&settings.model),
        }
    }
}

/// The pluggable stages of a cycle.
pub struct CycleComponents<'a> {
    pub model: Box<dyn ModelClient + 'a>,
    pub parser: Box<dyn SuggestionParser + 'a>,
    pub runner: Box<dyn FuzzRunner + 'a>,
    pub filter: Box<dyn ResultFilter + 'a>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub phase: Phase,
    pub cycles_completed: u64,
    /// Distinct candidates handed to the fuzzer.
    pub tested: usize,
    /// Links confirmed during this run, in discovery order.
    pub discovered: Vec<String>,
    pub stopped_early: bool,
    pub links_file: PathBuf,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.phase == Phase::Done
    }
}

#[derive(Debug, Default)]
struct CycleOutcome {
    new_links: Vec<String>,
    failure: Option<String>,
}

impl CycleOutcome {
    fn idle() -> Self {
        Self::default()
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            new_links: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Drives prompt → model → parser → wordlist → fuzzer → filter, one cycle at a time.
///
/// Owns the link store and the candidate history for the whole run. Per-cycle
/// errors are logged and counted against `max_consecutive_failures`; a missing
/// fuzz binary or a storage error aborts at once.
pub struct CycleController<'a> {
    options: ControllerOptions,
    prompt: PromptBuilder,
    model: Box<dyn ModelClient + 'a>,
    parser: Box<dyn SuggestionParser + 'a>,
    runner: Box<dyn FuzzRunner + 'a>,
    filter: Box<dyn ResultFilter + 'a>,
    observer: Box<dyn CycleObserver + 'a>,
    wordlist: WordlistWriter,
    store: LinkStore,
    history: CandidateHistory,
    phase: Phase,
    cycles_completed: u64,
    consecutive_failures: u32,
    idle_cycles: u64,
    stopped_early: bool,
    discovered: Vec<String>,
}

impl<'a> CycleController<'a> {
    pub fn new(
        options: ControllerOptions,
        prompt: PromptBuilder,
        components: CycleComponents<'a>,
        store: LinkStore,
        wordlist: WordlistWriter,
    ) -> Self {
        let phase = if options.cycles == 0 {
            Phase::Done
        } else {
            Phase::Running(0)
        };
        Self {
            options,
            prompt,
            model: components.model,
            parser: components.parser,
            runner: components.runner,
            filter: components.filter,
            observer: Box::new(NoOpObserver),
            wordlist,
            store,
            history: CandidateHistory::new(),
            phase,
            cycles_completed: 0,
            consecutive_failures: 0,
            idle_cycles: 0,
            stopped_early: false,
            discovered: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn CycleObserver + 'a>) -> Self {
        self.observer = observer;
        self
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn store(&self) -> &LinkStore {
        &self.store
    }

    pub fn history(&self) -> &CandidateHistory {
        &self.history
    }

    /// Runs cycles until the controller leaves `Running`.
    pub fn run(&mut self) -> RunReport {
        while matches!(self.phase, Phase::Running(_)) {
            self.step();
        }
        self.report()
    }

    /// Runs one cycle if still running and returns the new phase.
    pub fn step(&mut self) -> &Phase {
        let Phase::Running(index) = self.phase else {
            return &self.phase;
        };

        let outcome = match self.run_cycle(index) {
            Ok(outcome) => outcome,
            Err(reason) => {
                error!("Aborting run: {reason}");
                self.phase = Phase::Aborted(reason);
                return &self.phase;
            }
        };
        self.cycles_completed += 1;

        match outcome.failure {
            Some(last_error) => {
                self.consecutive_failures += 1;
                let limit = self.options.max_consecutive_failures;
                if limit > 0 && self.consecutive_failures >= limit {
                    let reason = AbortReason::RepeatedFailures {
                        count: self.consecutive_failures,
                        last_error,
                    };
                    error!("Aborting run: {reason}");
                    self.phase = Phase::Aborted(reason);
                    return &self.phase;
                }
            }
            None => self.consecutive_failures = 0,
        }

        if outcome.new_links.is_empty() {
            self.idle_cycles += 1;
        } else {
            self.idle_cycles = 0;
            self.discovered.extend(outcome.new_links);
        }

        let stop_after_idle = self.options.stop_after_idle;
        self.phase = if index + 1 >= self.options.cycles {
            Phase::Done
        } else if stop_after_idle > 0 && self.idle_cycles >= stop_after_idle {
            info!(
                "No new links in {} consecutive cycles, stopping early",
                self.idle_cycles
            );
            self.stopped_early = true;
            Phase::Done
        } else {
            Phase::Running(index + 1)
        };
        &self.phase
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            phase: self.phase.clone(),
            cycles_completed: self.cycles_completed,
            tested: self.history.len(),
            discovered: self.discovered.clone(),
            stopped_early: self.stopped_early,
            links_file: self.store.path().to_path_buf(),
        }
    }

    fn run_cycle(&mut self, index: u64) -> Result<CycleOutcome, AbortReason> {
        let cycle = index + 1;
        let cycles = self.options.cycles;
        self.observer.on_cycle_start(cycle, cycles);

        let prompt = self.prompt.build(&self.store, cycle, cycles);
        debug!("Sending prompt to {}:\n{prompt}", self.model.model_name());

        let raw = match generate_with_retries(self.model.as_mut(), &prompt, self.options.retry) {
            Ok(raw) => raw,
            Err(e @ ModelError::MalformedOutput(_)) => {
                warn!("Cycle {cycle}: {e}");
                return Ok(CycleOutcome::idle());
            }
            Err(e) => {
                warn!("Cycle {cycle}: {e}");
                return Ok(CycleOutcome::failed(e.to_string()));
            }
        };
        debug!("Model response:\n{raw}");

        let candidates = self.parser.parse(&raw).unwrap_or_else(|e| {
            warn!("Cycle {cycle}: {e}");
            Vec::new()
        });
        self.observer.on_suggestions(&candidates);

        let untested = self.history.untested(candidates, &self.store);
        if untested.is_empty() {
            info!("Cycle {cycle}: no untested candidates, skipping fuzz run");
            return Ok(CycleOutcome::idle());
        }
        debug!("Cycle {cycle}: {} untested candidates", untested.len());
        self.observer.on_untested(&untested);

        self.wordlist
            .write(&untested)
            .map_err(|e| AbortReason::Storage(e.to_string()))?;

        let results = match self.runner.run(self.wordlist.path()) {
            Ok(results) => results,
            Err(e) if e.is_fatal() => return Err(AbortReason::FuzzToolMissing(e.to_string())),
            Err(e) => {
                // the batch stays untested and may be suggested again
                warn!("Cycle {cycle}: {e}");
                return Ok(CycleOutcome::failed(e.to_string()));
            }
        };
        self.history.record(&untested);
        self.observer.on_fuzz_results(&results);

        let new_links = self
            .filter
            .apply(&results, &mut self.store)
            .map_err(|e| AbortReason::Storage(e.to_string()))?;
        if !new_links.is_empty() {
            info!("Cycle {cycle}: {} new links", new_links.len());
            self.observer.on_discovered(&new_links);
        }
        Ok(CycleOutcome {
            new_links,
            failure: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusCodes;
    use crate::filter::StatusFilter;
    use crate::observer::RecordingObserver;
    use crate::parser::{PathSuggestionParser, ShortNameParser, ShortNamePattern};
    use crate::prompt::PromptTemplate;
    use crate::runner::{FuzzError, FuzzResult};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    struct ScriptedModel {
        replies: VecDeque<Result<String, ModelError>>,
        fallback: Result<String, ModelError>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl ModelClient for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn generate(&mut self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.replies
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Answers every wordlist entry from a status map (404 when absent).
    struct MapRunner {
        statuses: HashMap<String, u16>,
        wordlists: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl FuzzRunner for MapRunner {
        fn run(&mut self, wordlist: &Path) -> Result<Vec<FuzzResult>, FuzzError> {
            let words: Vec<String> = std::fs::read_to_string(wordlist)?
                .lines()
                .map(str::to_string)
                .collect();
            self.wordlists.borrow_mut().push(words.clone());
            Ok(words
                .into_iter()
                .map(|w| FuzzResult {
                    status: self.statuses.get(&w).copied().unwrap_or(404),
                    input: w,
                })
                .collect())
        }
    }

    /// Fails its first `failures` runs with a timeout, then defers to `inner`.
    struct FlakyRunner {
        failures: usize,
        inner: MapRunner,
    }

    impl FuzzRunner for FlakyRunner {
        fn run(&mut self, wordlist: &Path) -> Result<Vec<FuzzResult>, FuzzError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(FuzzError::Timeout(Duration::from_secs(1)));
            }
            self.inner.run(wordlist)
        }
    }

    struct FailingRunner {
        make_error: fn() -> FuzzError,
        calls: Rc<RefCell<usize>>,
    }

    impl FuzzRunner for FailingRunner {
        fn run(&mut self, _wordlist: &Path) -> Result<Vec<FuzzResult>, FuzzError> {
            *self.calls.borrow_mut() += 1;
            Err((self.make_error)())
        }
    }

    fn answer(paths: &[&str]) -> Result<String, ModelError> {
        Ok(format!("<new_files_dirs>\n{}\n</new_files_dirs>", paths.join("\n")))
    }

    fn unavailable() -> ModelError {
        ModelError::ServiceUnavailable {
            endpoint: "http://127.0.0.1:11434".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn options(cycles: u64) -> ControllerOptions {
        ControllerOptions {
            cycles,
            stop_after_idle: 0,
            max_consecutive_failures: 3,
            retry: RetryPolicy {
                retries: 0,
                backoff: Duration::ZERO,
            },
        }
    }

    struct Harness {
        dir: TempDir,
        prompts: Rc<RefCell<Vec<String>>>,
        wordlists: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: tempdir().unwrap(),
                prompts: Rc::default(),
                wordlists: Rc::default(),
            }
        }

        fn links_path(&self) -> PathBuf {
            self.dir.path().join("all_links.txt")
        }

        fn model(
            &self,
            replies: Vec<Result<String, ModelError>>,
            fallback: Result<String, ModelError>,
        ) -> Box<ScriptedModel> {
            Box::new(ScriptedModel {
                replies: replies.into(),
                fallback,
                prompts: Rc::clone(&self.prompts),
            })
        }

        fn map_runner(&self, statuses: &[(&str, u16)]) -> Box<MapRunner> {
            Box::new(MapRunner {
                statuses: statuses
                    .iter()
                    .map(|(w, s)| (w.to_string(), *s))
                    .collect(),
                wordlists: Rc::clone(&self.wordlists),
            })
        }

        fn controller<'a>(
            &self,
            options: ControllerOptions,
            model: Box<dyn ModelClient + 'a>,
            runner: Box<dyn FuzzRunner + 'a>,
            accepted: &str,
        ) -> CycleController<'a> {
            let prompt = PromptBuilder::new(
                PromptTemplate::new("Known:\n{{initialLinks}}"),
                None,
                false,
                Some(0),
            );
            self.controller_with(
                options,
                prompt,
                Box::new(PathSuggestionParser::new()),
                model,
                runner,
                accepted,
            )
        }

        fn controller_with<'a>(
            &self,
            options: ControllerOptions,
            prompt: PromptBuilder,
            parser: Box<dyn SuggestionParser + 'a>,
            model: Box<dyn ModelClient + 'a>,
            runner: Box<dyn FuzzRunner + 'a>,
            accepted: &str,
        ) -> CycleController<'a> {
            let store = LinkStore::create(self.links_path()).unwrap();
            CycleController::new(
                options,
                prompt,
                CycleComponents {
                    model,
                    parser,
                    runner,
                    filter: Box::new(StatusFilter::new(StatusCodes::parse(accepted).unwrap())),
                },
                store,
                WordlistWriter::in_dir(self.dir.path()),
            )
        }

        fn file_lines(&self) -> Vec<String> {
            std::fs::read_to_string(self.links_path())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn zero_cycles_does_no_fuzzing_and_leaves_empty_file() {
        let h = Harness::new();
        let mut controller = h.controller(
            options(0),
            h.model(vec![], answer(&["admin"])),
            h.map_runner(&[("admin", 200)]),
            "200",
        );
        assert_eq!(controller.phase(), &Phase::Done);

        let report = controller.run();
        assert!(report.is_success());
        assert_eq!(report.cycles_completed, 0);
        assert!(h.prompts.borrow().is_empty());
        assert!(h.wordlists.borrow().is_empty());
        assert_eq!(std::fs::read_to_string(h.links_path()).unwrap(), "");
    }

    #[test]
    fn only_accepted_status_becomes_a_link() {
        let h = Harness::new();
        let mut controller = h.controller(
            options(1),
            h.model(vec![answer(&["found", "gone"])], answer(&[])),
            h.map_runner(&[("found", 200), ("gone", 404)]),
            "200",
        );
        let report = controller.run();
        assert_eq!(report.phase, Phase::Done);
        assert_eq!(report.discovered, vec!["found"]);
        assert_eq!(h.file_lines(), vec!["found"]);
    }

    #[test]
    fn three_scripted_cycles_yield_union_of_accepted_results() {
        let h = Harness::new();
        let replies = vec![
            answer(&["admin", "login", "nothing"]),
            answer(&["admin", "backup", "api", "images"]),
            answer(&["api", "v2", "config.bak", "login"]),
        ];
        let statuses = [
            ("admin", 301),
            ("login", 200),
            ("backup", 403),
            ("api", 200),
            ("images", 404),
            ("config.bak", 200),
            ("v2", 500),
        ];
        let mut controller = h.controller(
            options(3),
            h.model(replies, answer(&[])),
            h.map_runner(&statuses),
            "200,301,403",
        );
        let report = controller.run();
        assert_eq!(report.phase, Phase::Done);
        assert_eq!(report.cycles_completed, 3);

        let expected: HashSet<String> = ["admin", "login", "backup", "api", "config.bak"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let in_store: HashSet<String> = controller.store().links().iter().cloned().collect();
        let lines = h.file_lines();
        let in_file: HashSet<String> = lines.iter().cloned().collect();
        assert_eq!(in_store, expected);
        assert_eq!(in_file, expected);
        assert_eq!(lines.len(), in_file.len(), "links file has duplicates");
    }

    #[test]
    fn tested_candidates_are_never_written_again() {
        let h = Harness::new();
        let replies = vec![
            answer(&["a", "b", "c"]),
            answer(&["a", "b", "d"]),
            answer(&["c", "d", "e", "a"]),
            answer(&["a", "b", "c", "d", "e"]),
        ];
        let mut controller = h.controller(
            options(4),
            h.model(replies, answer(&[])),
            h.map_runner(&[("a", 200)]),
            "200",
        );
        let report = controller.run();
        assert_eq!(report.tested, 5);

        let wordlists = h.wordlists.borrow();
        assert_eq!(wordlists.len(), 3, "fourth cycle has nothing new to fuzz");
        let mut seen = HashSet::new();
        for list in wordlists.iter() {
            for word in list {
                assert!(seen.insert(word.clone()), "{word} was fuzzed twice");
            }
        }
    }

    #[test]
    fn discovered_links_reach_the_next_prompt() {
        let h = Harness::new();
        let mut controller = h.controller(
            options(2),
            h.model(vec![answer(&["admin"]), answer(&["other"])], answer(&[])),
            h.map_runner(&[("admin", 200)]),
            "200",
        );
        controller.run();
        let prompts = h.prompts.borrow();
        assert_eq!(prompts[0], "Known:\n");
        assert_eq!(prompts[1], "Known:\nadmin");
    }

    #[test]
    fn empty_model_text_completes_without_new_links() {
        let h = Harness::new();
        let mut controller = h.controller(
            options(3),
            h.model(vec![], Ok(String::new())),
            h.map_runner(&[]),
            "200",
        );
        let report = controller.run();
        assert_eq!(report.phase, Phase::Done);
        assert_eq!(report.cycles_completed, 3);
        assert!(report.discovered.is_empty());
        assert!(h.wordlists.borrow().is_empty());
    }

    #[test]
    fn unreachable_model_aborts_after_consecutive_failures() {
        let h = Harness::new();
        let mut opts = options(10);
        opts.max_consecutive_failures = 2;
        let mut controller = h.controller(
            opts,
            h.model(vec![], Err(unavailable())),
            h.map_runner(&[]),
            "200",
        );
        let report = controller.run();
        match &report.phase {
            Phase::Aborted(AbortReason::RepeatedFailures { count, last_error }) => {
                assert_eq!(*count, 2);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("Expected RepeatedFailures, got {other:?}"),
        }
        assert_eq!(report.cycles_completed, 2);
        assert!(!report.is_success());
    }

    #[test]
    fn model_failures_reset_after_a_good_cycle() {
        let h = Harness::new();
        let mut opts = options(5);
        opts.max_consecutive_failures = 2;
        let replies = vec![
            Err(unavailable()),
            answer(&["x"]),
            Err(unavailable()),
            answer(&["y"]),
            Err(unavailable()),
        ];
        let mut controller = h.controller(opts, h.model(replies, answer(&[])), h.map_runner(&[]), "200");
        let report = controller.run();
        assert_eq!(report.phase, Phase::Done);
        assert_eq!(report.cycles_completed, 5);
    }

    #[test]
    fn missing_fuzz_tool_aborts_immediately() {
        let h = Harness::new();
        let calls = Rc::new(RefCell::new(0));
        let runner = Box::new(FailingRunner {
            make_error: || FuzzError::ToolMissing("ffuf".to_string()),
            calls: Rc::clone(&calls),
        });
        let mut controller = h.controller(
            options(5),
            h.model(vec![], answer(&["admin"])),
            runner,
            "200",
        );
        let report = controller.run();
        assert!(matches!(
            report.phase,
            Phase::Aborted(AbortReason::FuzzToolMissing(_))
        ));
        assert_eq!(report.cycles_completed, 0);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn repeated_fuzz_tool_failures_escalate() {
        let h = Harness::new();
        let calls = Rc::new(RefCell::new(0));
        let runner = Box::new(FailingRunner {
            make_error: || FuzzError::ToolFailed {
                status: "exit code 1".to_string(),
                stderr: "bad flag".to_string(),
            },
            calls: Rc::clone(&calls),
        });
        let replies = vec![answer(&["a"]), answer(&["b"]), answer(&["c"]), answer(&["d"])];
        let mut controller = h.controller(options(10), h.model(replies, answer(&[])), runner, "200");
        let report = controller.run();
        assert!(matches!(
            report.phase,
            Phase::Aborted(AbortReason::RepeatedFailures { count: 3, .. })
        ));
        assert_eq!(*calls.borrow(), 3);
    }

    #[test]
    fn candidates_from_a_failed_fuzz_run_are_retried() {
        let h = Harness::new();
        let runner = Box::new(FlakyRunner {
            failures: 1,
            inner: *h.map_runner(&[("admin", 200)]),
        });
        let replies = vec![answer(&["admin", "login"]), answer(&["admin", "login"])];
        let mut controller =
            h.controller(options(2), h.model(replies, answer(&[])), runner, "200");
        let report = controller.run();

        assert_eq!(report.phase, Phase::Done);
        assert_eq!(report.discovered, vec!["admin"]);
        assert_eq!(report.tested, 2);
        assert_eq!(*h.wordlists.borrow(), vec![vec!["admin", "login"]]);
        assert!(controller.history().contains("login"));
    }

    #[test]
    fn short_name_loop_confirms_full_names() {
        let h = Harness::new();
        let template = PromptTemplate::load(
            &PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../prompts/shortname.txt"),
        )
        .unwrap();
        let prompt =
            PromptBuilder::new(template, None, false, Some(0)).with_short_name("BENCHM~1.PDF");
        let pattern = ShortNamePattern::parse("BENCHM~1.PDF").unwrap();
        let reply = Ok([
            "<full_filenames>",
            "benchmar.pdf",
            "BENCHMRK.PDF",
            "BENCHM-1.PDF",
            "benchmark_results.pdf",
            "REPORT.PDF",
            "BENCHMAR.DOC",
            "</full_filenames>",
        ]
        .join("\n"));

        let mut controller = h.controller_with(
            options(1),
            prompt,
            Box::new(ShortNameParser::new(pattern)),
            h.model(vec![reply], answer(&[])),
            h.map_runner(&[("BENCHMRK.PDF", 200)]),
            "200",
        );
        let report = controller.run();

        assert!(h.prompts.borrow()[0].contains("BENCHM~1.PDF"));
        assert_eq!(
            *h.wordlists.borrow(),
            vec![vec!["BENCHMAR.PDF", "BENCHMRK.PDF", "BENCHM-1.PDF"]]
        );
        assert_eq!(report.discovered, vec!["BENCHMRK.PDF"]);
        assert_eq!(h.file_lines(), vec!["BENCHMRK.PDF"]);
    }

    #[test]
    fn idle_cycles_stop_the_run_early() {
        let h = Harness::new();
        let mut opts = options(10);
        opts.stop_after_idle = 2;
        let replies = vec![answer(&["hit"]), answer(&["miss1"]), answer(&["miss2"])];
        let mut controller = h.controller(
            opts,
            h.model(replies, answer(&["never"])),
            h.map_runner(&[("hit", 200)]),
            "200",
        );
        let report = controller.run();
        assert_eq!(report.phase, Phase::Done);
        assert!(report.stopped_early);
        assert_eq!(report.cycles_completed, 3);
        assert_eq!(report.discovered, vec!["hit"]);
    }

    #[test]
    fn without_early_stop_every_cycle_runs() {
        let h = Harness::new();
        let mut controller = h.controller(
            options(4),
            h.model(vec![], answer(&[])),
            h.map_runner(&[]),
            "200",
        );
        let report = controller.run();
        assert_eq!(report.cycles_completed, 4);
        assert!(!report.stopped_early);
    }

    #[test]
    fn step_walks_the_state_machine() {
        let h = Harness::new();
        let mut controller = h.controller(
            options(2),
            h.model(vec![], answer(&[])),
            h.map_runner(&[]),
            "200",
        );
        assert_eq!(controller.phase(), &Phase::Running(0));
        assert_eq!(controller.step(), &Phase::Running(1));
        assert_eq!(controller.step(), &Phase::Done);
        assert_eq!(controller.step(), &Phase::Done);
    }

    #[test]
    fn observer_sees_each_stage() {
        let h = Harness::new();
        let mut recorder = RecordingObserver::default();
        {
            let mut controller = h
                .controller(
                    options(1),
                    h.model(vec![answer(&["admin", "gone"])], answer(&[])),
                    h.map_runner(&[("admin", 200)]),
                    "200",
                )
                .with_observer(Box::new(&mut recorder));
            controller.run();
        }
        assert_eq!(recorder.cycles_started, vec![1]);
        assert_eq!(recorder.suggestions, vec![vec!["admin", "gone"]]);
        assert_eq!(recorder.fuzz_results[0].len(), 2);
        assert_eq!(recorder.discovered, vec![vec!["admin"]]);
    }
}
