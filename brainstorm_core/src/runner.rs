use crate::command::CommandTemplate;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const REPORT_FILE_NAME: &str = "fuzz_report.json";

const STDERR_TAIL: usize = 2000;

/// One tested word and the status code the target answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzResult {
    pub input: String,
    pub status: u16,
}

#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("Fuzz tool '{0}' not found; make sure it is installed and on PATH")]
    ToolMissing(String),

    #[error("Fuzz tool failed ({status}): {stderr}")]
    ToolFailed { status: String, stderr: String },

    #[error("Fuzz tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed fuzz tool output: {0}")]
    MalformedOutput(String),

    #[error("Fuzz runner I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FuzzError {
    /// Errors that no later cycle can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FuzzError::ToolMissing(_))
    }
}

/// Runs the external fuzzer against a wordlist.
pub trait FuzzRunner {
    fn run(&mut self, wordlist: &Path) -> Result<Vec<FuzzResult>, FuzzError>;
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    input: HashMap<String, String>,
    status: u16,
}

#[derive(Deserialize)]
struct RawReport {
    #[serde(default)]
    results: Vec<RawRecord>,
}

fn into_result(record: RawRecord, keyword: &str) -> Option<FuzzResult> {
    let RawRecord { mut input, status } = record;
    input.remove(keyword).map(|input| FuzzResult { input, status })
}

/// Parses an ffuf-style JSON report: `{"results": [{"input": {...}, "status": 200}]}`.
pub fn parse_report(text: &str, keyword: &str) -> Result<Vec<FuzzResult>, FuzzError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let report: RawReport =
        serde_json::from_str(text).map_err(|e| FuzzError::MalformedOutput(e.to_string()))?;
    Ok(report
        .results
        .into_iter()
        .filter_map(|r| into_result(r, keyword))
        .collect())
}

/// Parses one JSON record per line. Lines not starting with `{` (banners,
/// progress) are skipped.
pub fn parse_json_lines(text: &str, keyword: &str) -> Result<Vec<FuzzResult>, FuzzError> {
    let mut results = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let record: RawRecord = serde_json::from_str(line)
            .map_err(|e| FuzzError::MalformedOutput(format!("line {}: {e}", lineno + 1)))?;
        results.extend(into_result(record, keyword));
    }
    Ok(results)
}

pub struct CommandRunnerConfig {
    pub template: CommandTemplate,
    pub keyword: String,
    pub timeout: Duration,
    /// The ffuf JSON report to read; `None` reads JSON lines from stdout.
    pub report_path: Option<PathBuf>,
}

impl CommandRunnerConfig {
    /// ffuf results are read from its JSON report: the template's own `-o`
    /// path when it sets one, otherwise a report in `output_dir`.
    pub fn new(
        template: CommandTemplate,
        keyword: impl Into<String>,
        timeout: Duration,
        output_dir: &Path,
    ) -> Self {
        let report_path = template.is_ffuf().then(|| {
            template
                .flag_value("-o")
                .map(PathBuf::from)
                .unwrap_or_else(|| output_dir.join(REPORT_FILE_NAME))
        });
        Self {
            template,
            keyword: keyword.into(),
            timeout,
            report_path,
        }
    }
}

/// Runs the fuzz command as a child process.
///
/// stdout and stderr go to anonymous temp files so a chatty tool cannot fill a
/// pipe and stall while it is being polled.
pub struct CommandFuzzRunner {
    config: CommandRunnerConfig,
}

impl CommandFuzzRunner {
    pub fn new(config: CommandRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandRunnerConfig {
        &self.config
    }

    /// The argv for one run against `wordlist`.
    pub fn command_line(&self, wordlist: &Path) -> Vec<String> {
        let mut argv = self.config.template.render(wordlist);
        if let Some(report) = &self.config.report_path {
            let template = &self.config.template;
            if template.flag_value("-o").is_none() {
                argv.push("-o".to_string());
                argv.push(report.to_string_lossy().into_owned());
            }
            if template.flag_value("-of").is_none() {
                argv.push("-of".to_string());
                argv.push("json".to_string());
            }
        }
        argv
    }

    fn wait_with_timeout(&self, mut child: Child) -> Result<ExitStatus, FuzzError> {
        let start_time = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) => return Ok(status),
                None => {
                    if start_time.elapsed() > self.config.timeout {
                        warn!("Fuzz tool timed out, killing...");
                        if let Err(e) = child.kill() {
                            warn!("Failed to kill fuzz tool: {e}");
                        }
                        let _ = child.wait();
                        return Err(FuzzError::Timeout(self.config.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

fn read_all(mut file: File) -> Result<String, FuzzError> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "exited abnormally".to_string()
}

fn tail(text: &str, max: usize) -> &str {
    let text = text.trim();
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

impl FuzzRunner for CommandFuzzRunner {
    fn run(&mut self, wordlist: &Path) -> Result<Vec<FuzzResult>, FuzzError> {
        let argv = self.command_line(wordlist);
        info!("Running fuzz command: {}", argv.join(" "));

        if let Some(report) = &self.config.report_path {
            match std::fs::remove_file(report) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stdout_file = tempfile::tempfile()?;
        let stderr_file = tempfile::tempfile()?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone()?))
            .stderr(Stdio::from(stderr_file.try_clone()?));

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FuzzError::ToolMissing(argv[0].clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let status = self.wait_with_timeout(child)?;
        let stdout = read_all(stdout_file)?;
        let stderr = read_all(stderr_file)?;

        if !status.success() {
            return Err(FuzzError::ToolFailed {
                status: describe_exit(&status),
                stderr: tail(&stderr, STDERR_TAIL).to_string(),
            });
        }

        let results = match &self.config.report_path {
            Some(report) => match std::fs::read_to_string(report) {
                Ok(text) => parse_report(&text, &self.config.keyword)?,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("Fuzz tool produced no report at {report:?}");
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            },
            None => parse_json_lines(&stdout, &self.config.keyword)?,
        };
        debug!("Fuzz tool reported {} results", results.len());
        Ok(results)
    }
}
