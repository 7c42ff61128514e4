use crate::command::{CommandTemplate, DEFAULT_PLACEHOLDER};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_STATUS_CODES: &str = "200,301,302,303,307,308,403,401,500";

/// Errors detected while turning user input into [`Settings`].
///
/// Every variant is fatal: they are reported before the first cycle runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid status code list '{0}': expected comma-separated HTTP codes (100-599)")]
    InvalidStatusCodes(String),

    #[error("Fuzz command is empty")]
    EmptyCommand,

    #[error("Fuzz command has an unterminated quote: {0}")]
    UnbalancedQuote(String),

    #[error(
        "Fuzz command must contain the placeholder '{placeholder}' exactly once (found {count})"
    )]
    Placeholder { placeholder: String, count: usize },

    #[error("Invalid short filename target '{0}': expected an 8.3 name such as BENCHM~1.PDF")]
    InvalidShortName(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which discovery loop the settings are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Paths and directories, seeded from the target page.
    Paths,
    /// Full names behind a legacy 8.3 short filename.
    ShortName,
}

impl Variant {
    pub fn default_model(&self) -> &'static str {
        match self {
            Variant::Paths => "qwen3:4b-instruct",
            Variant::ShortName => "qwen3:4b",
        }
    }

    pub fn default_prompt_file(&self) -> PathBuf {
        match self {
            Variant::Paths => PathBuf::from("prompts/files.txt"),
            Variant::ShortName => PathBuf::from("prompts/shortname.txt"),
        }
    }

    pub fn links_file_name(&self) -> &'static str {
        match self {
            Variant::Paths => "all_links.txt",
            Variant::ShortName => "all_filenames.txt",
        }
    }

    /// Instruction-tuned models get `think: false`; the short-name loop leaves
    /// the server default alone.
    pub fn default_think(&self) -> Option<bool> {
        match self {
            Variant::Paths => Some(false),
            Variant::ShortName => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignSettings {
    #[serde(default = "default_cycles")]
    pub cycles: u64,
    /// Stop after this many consecutive cycles without a new link. 0 disables.
    #[serde(default)]
    pub stop_after_idle: u64,
    /// Abort after this many consecutive failed cycles. 0 never escalates.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

pub fn default_cycles() -> u64 {
    50
}

pub fn default_max_consecutive_failures() -> u32 {
    3
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            stop_after_idle: 0,
            max_consecutive_failures: default_max_consecutive_failures(),
            seed: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ModelSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_model_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub think: Option<bool>,
}

fn default_model_timeout_secs() -> u64 {
    120
}

fn default_model_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: None,
            endpoint: None,
            timeout_secs: default_model_timeout_secs(),
            retries: default_model_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            think: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzSettings {
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Key under `input` in the fuzzer's JSON records that holds the tested word.
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_fuzz_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_status_codes")]
    pub status_codes: Vec<u16>,
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_keyword() -> String {
    "FUZZ".to_string()
}

fn default_fuzz_timeout_secs() -> u64 {
    300
}

fn default_status_codes() -> Vec<u16> {
    vec![200, 301, 302, 303, 307, 308, 403, 401, 500]
}

impl Default for FuzzSettings {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            keyword: default_keyword(),
            timeout_secs: default_fuzz_timeout_secs(),
            status_codes: default_status_codes(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Load the existing links file instead of truncating it.
    #[serde(default)]
    pub resume: bool,
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/brainstorm")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            resume: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct PromptSettings {
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Cap on links embedded in the prompt; the newest are kept.
    #[serde(default)]
    pub max_links: Option<usize>,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

fn default_shuffle() -> bool {
    true
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            file: None,
            max_links: None,
            shuffle: default_shuffle(),
        }
    }
}

/// On-disk configuration, as read from TOML and patched by CLI flags.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BrainstormConfig {
    #[serde(default)]
    pub campaign: CampaignSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub fuzz: FuzzSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
}

impl BrainstormConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: BrainstormConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}

/// The set of HTTP status codes that turn a fuzz result into a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCodes(BTreeSet<u16>);

impl StatusCodes {
    /// Parses a comma-separated list such as `200,301,403`.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut codes = Vec::new();
        for part in list.split(',') {
            let code = part
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidStatusCodes(list.to_string()))?;
            codes.push(code);
        }
        Self::from_codes(&codes).map_err(|_| ConfigError::InvalidStatusCodes(list.to_string()))
    }

    pub fn from_codes(codes: &[u16]) -> Result<Self, ConfigError> {
        let rendered = || {
            codes
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        if codes.is_empty() || codes.iter().any(|c| !(100..=599).contains(c)) {
            return Err(ConfigError::InvalidStatusCodes(rendered()));
        }
        Ok(Self(codes.iter().copied().collect()))
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.contains(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub name: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub think: Option<bool>,
}

/// Validated, immutable settings shared read-only by every component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub variant: Variant,
    pub cycles: u64,
    pub stop_after_idle: u64,
    pub max_consecutive_failures: u32,
    pub rng_seed: Option<u64>,
    pub model: ModelOptions,
    pub command: CommandTemplate,
    pub fuzz_keyword: String,
    pub fuzz_timeout: Duration,
    pub accepted_status: StatusCodes,
    pub output_dir: PathBuf,
    pub resume: bool,
    pub prompt_file: PathBuf,
    pub max_prompt_links: Option<usize>,
    pub shuffle_links: bool,
}

impl Settings {
    /// `command` is the fuzz command template given on the command line.
    pub fn from_config(
        config: BrainstormConfig,
        command: &str,
        variant: Variant,
    ) -> Result<Self, ConfigError> {
        let BrainstormConfig {
            campaign,
            model,
            fuzz,
            output,
            prompt,
        } = config;

        let command = CommandTemplate::parse(command, &fuzz.placeholder)?;

        if fuzz.keyword.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fuzz.keyword",
                reason: "must not be empty".to_string(),
            });
        }
        if model.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "model.timeout-secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if fuzz.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fuzz.timeout-secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if prompt.max_links == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "prompt.max-links",
                reason: "must be at least 1 when set".to_string(),
            });
        }

        let name = model
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| variant.default_model().to_string());
        let endpoint = normalize_endpoint(
            &model
                .endpoint
                .or_else(|| std::env::var("OLLAMA_HOST").ok())
                .unwrap_or_else(|| DEFAULT_MODEL_ENDPOINT.to_string()),
        );

        Ok(Self {
            variant,
            cycles: campaign.cycles,
            stop_after_idle: campaign.stop_after_idle,
            max_consecutive_failures: campaign.max_consecutive_failures,
            rng_seed: campaign.seed,
            model: ModelOptions {
                name,
                endpoint,
                timeout: Duration::from_secs(model.timeout_secs),
                retries: model.retries,
                retry_backoff: Duration::from_millis(model.retry_backoff_ms),
                think: model.think.or(variant.default_think()),
            },
            command,
            fuzz_keyword: fuzz.keyword,
            fuzz_timeout: Duration::from_secs(fuzz.timeout_secs),
            accepted_status: StatusCodes::from_codes(&fuzz.status_codes)?,
            output_dir: output.dir,
            resume: output.resume,
            prompt_file: prompt
                .file
                .unwrap_or_else(|| variant.default_prompt_file()),
            max_prompt_links: prompt.max_links,
            shuffle_links: prompt.shuffle,
        })
    }

    pub fn links_file(&self) -> PathBuf {
        self.output_dir.join(self.variant.links_file_name())
    }
}

/// Accepts `host:port`, bare hosts and full URLs; returns a URL without a trailing slash.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let mut endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        endpoint = DEFAULT_MODEL_ENDPOINT.to_string();
    }
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        endpoint = format!("http://{endpoint}");
    }
    endpoint.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMAND: &str = "ffuf -w WORDLIST -u http://t/FUZZ";

    #[test]
    fn status_codes_parse_accepts_default_list() {
        let codes = StatusCodes::parse(DEFAULT_STATUS_CODES).unwrap();
        assert!(codes.contains(200));
        assert!(codes.contains(401));
        assert!(!codes.contains(404));
        assert_eq!(codes.iter().count(), 9);
    }

    #[test]
    fn status_codes_parse_tolerates_spaces() {
        let codes = StatusCodes::parse(" 200 , 403").unwrap();
        assert_eq!(codes.iter().collect::<Vec<_>>(), vec![200, 403]);
    }

    #[test]
    fn status_codes_parse_rejects_garbage() {
        for bad in ["", "200,abc", "200,,301", "99", "600", "-1"] {
            match StatusCodes::parse(bad) {
                Err(ConfigError::InvalidStatusCodes(list)) => assert_eq!(list, bad),
                other => panic!("Expected InvalidStatusCodes for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn settings_reject_a_blank_command() {
        let err =
            Settings::from_config(BrainstormConfig::default(), "  ", Variant::Paths).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand));
    }

    #[test]
    fn settings_apply_variant_defaults() {
        let config = BrainstormConfig::default();

        let paths = Settings::from_config(config.clone(), COMMAND, Variant::Paths).unwrap();
        assert_eq!(paths.model.name, "qwen3:4b-instruct");
        assert_eq!(paths.model.think, Some(false));
        assert_eq!(paths.prompt_file, PathBuf::from("prompts/files.txt"));
        assert_eq!(
            paths.links_file(),
            PathBuf::from("/tmp/brainstorm/all_links.txt")
        );
        assert_eq!(paths.cycles, 50);

        let short = Settings::from_config(config, COMMAND, Variant::ShortName).unwrap();
        assert_eq!(short.model.name, "qwen3:4b");
        assert_eq!(short.model.think, None);
        assert_eq!(short.prompt_file, PathBuf::from("prompts/shortname.txt"));
        assert_eq!(
            short.links_file(),
            PathBuf::from("/tmp/brainstorm/all_filenames.txt")
        );
    }

    #[test]
    fn settings_reject_empty_status_codes() {
        let mut config = BrainstormConfig::default();
        config.fuzz.status_codes.clear();
        let err = Settings::from_config(config, COMMAND, Variant::Paths).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStatusCodes(_)));
    }

    #[test]
    fn settings_reject_zero_prompt_cap() {
        let mut config = BrainstormConfig::default();
        config.prompt.max_links = Some(0);
        let err = Settings::from_config(config, COMMAND, Variant::Paths).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "prompt.max-links",
                ..
            }
        ));
    }

    #[test]
    fn explicit_endpoint_is_normalized() {
        let mut config = BrainstormConfig::default();
        config.model.endpoint = Some("127.0.0.1:11434/".to_string());
        let settings = Settings::from_config(config, COMMAND, Variant::Paths).unwrap();
        assert_eq!(settings.model.endpoint, "http://127.0.0.1:11434");
    }

    #[test]
    fn normalize_endpoint_defaults_when_blank() {
        assert_eq!(normalize_endpoint("  "), DEFAULT_MODEL_ENDPOINT);
        assert_eq!(
            normalize_endpoint("https://gpu-box:11434"),
            "https://gpu-box:11434"
        );
    }

    #[test]
    fn toml_config_parses_kebab_case_sections() {
        let text = r#"
            [campaign]
            cycles = 7
            stop-after-idle = 2

            [model]
            name = "llama3.2"
            timeout-secs = 30

            [fuzz]
            status-codes = [200, 204]

            [output]
            dir = "/var/tmp/bs"

            [prompt]
            max-links = 40
            shuffle = false
        "#;
        let config: BrainstormConfig = toml::from_str(text).unwrap();
        let settings = Settings::from_config(config, COMMAND, Variant::Paths).unwrap();
        assert_eq!(settings.cycles, 7);
        assert_eq!(settings.stop_after_idle, 2);
        assert_eq!(settings.model.name, "llama3.2");
        assert_eq!(settings.model.timeout, Duration::from_secs(30));
        assert!(settings.accepted_status.contains(204));
        assert!(!settings.accepted_status.contains(403));
        assert_eq!(settings.output_dir, PathBuf::from("/var/tmp/bs"));
        assert_eq!(settings.max_prompt_links, Some(40));
        assert!(!settings.shuffle_links);
    }

    #[test]
    fn toml_config_rejects_unknown_keys() {
        let text = r#"
            [campaign]
            cycle = 3
        "#;
        assert!(toml::from_str::<BrainstormConfig>(text).is_err());
    }

    #[test]
    fn toml_config_has_no_command_key() {
        let text = r#"
            [fuzz]
            command = "ffuf -w WORDLIST -u http://t/FUZZ"
        "#;
        assert!(toml::from_str::<BrainstormConfig>(text).is_err());
    }
}
