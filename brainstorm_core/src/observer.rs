use crate::runner::FuzzResult;

/// A `CycleObserver` watches the discovery loop from the outside.
///
/// The controller calls it at fixed points of every cycle so front ends can
/// show progress without the core writing to stdout. All hooks default to
/// doing nothing.
pub trait CycleObserver {
    /// A cycle is about to build its prompt. `cycle` is 1-based.
    fn on_cycle_start(&mut self, _cycle: u64, _cycles: u64) {}

    /// The model answered; `candidates` is the parsed batch before history filtering.
    fn on_suggestions(&mut self, _candidates: &[String]) {}

    /// Candidates that will be written to the wordlist this cycle.
    fn on_untested(&mut self, _untested: &[String]) {}

    /// Raw results from the fuzz tool.
    fn on_fuzz_results(&mut self, _results: &[FuzzResult]) {}

    /// Links confirmed this cycle. Not called when nothing new was found.
    fn on_discovered(&mut self, _links: &[String]) {}
}

/// An observer that ignores every event.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoOpObserver;

impl CycleObserver for NoOpObserver {}

/// Records every event; handy for inspecting a run after the fact.
#[derive(Default, Debug, Clone)]
pub struct RecordingObserver {
    pub cycles_started: Vec<u64>,
    pub suggestions: Vec<Vec<String>>,
    pub untested: Vec<Vec<String>>,
    pub fuzz_results: Vec<Vec<FuzzResult>>,
    pub discovered: Vec<Vec<String>>,
}

impl CycleObserver for RecordingObserver {
    fn on_cycle_start(&mut self, cycle: u64, _cycles: u64) {
        self.cycles_started.push(cycle);
    }

    fn on_suggestions(&mut self, candidates: &[String]) {
        self.suggestions.push(candidates.to_vec());
    }

    fn on_untested(&mut self, untested: &[String]) {
        self.untested.push(untested.to_vec());
    }

    fn on_fuzz_results(&mut self, results: &[FuzzResult]) {
        self.fuzz_results.push(results.to_vec());
    }

    fn on_discovered(&mut self, links: &[String]) {
        self.discovered.push(links.to_vec());
    }
}

impl<T: CycleObserver + ?Sized> CycleObserver for &mut T {
    fn on_cycle_start(&mut self, cycle: u64, cycles: u64) {
        (**self).on_cycle_start(cycle, cycles);
    }

    fn on_suggestions(&mut self, candidates: &[String]) {
        (**self).on_suggestions(candidates);
    }

    fn on_untested(&mut self, untested: &[String]) {
        (**self).on_untested(untested);
    }

    fn on_fuzz_results(&mut self, results: &[FuzzResult]) {
        (**self).on_fuzz_results(results);
    }

    fn on_discovered(&mut self, links: &[String]) {
        (**self).on_discovered(links);
    }
}
