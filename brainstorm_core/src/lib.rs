pub mod command;
pub mod config;
pub mod controller;
pub mod filter;
pub mod history;
pub mod link_store;
pub mod model;
pub mod observer;
pub mod parser;
pub mod prompt;
pub mod runner;
pub mod seed;
pub mod wordlist;

pub use command::CommandTemplate;
pub use config::{BrainstormConfig, ConfigError, Settings, StatusCodes, Variant};
pub use controller::{
    AbortReason, ControllerOptions, CycleComponents, CycleController, Phase, RunReport,
};
pub use filter::{ResultFilter, StatusFilter};
pub use history::CandidateHistory;
pub use link_store::{LinkStore, StoreError};
pub use model::{ModelClient, ModelError, OllamaClient, RetryPolicy};
pub use observer::{CycleObserver, NoOpObserver, RecordingObserver};
pub use parser::{PathSuggestionParser, ShortNameParser, ShortNamePattern, SuggestionParser};
pub use prompt::{PromptBuilder, PromptTemplate};
pub use runner::{CommandFuzzRunner, CommandRunnerConfig, FuzzError, FuzzResult, FuzzRunner};
pub use seed::{SeedError, SeedPage};
pub use wordlist::WordlistWriter;
