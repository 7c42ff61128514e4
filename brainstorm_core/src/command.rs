use crate::config::ConfigError;
use std::path::Path;

/// Token replaced by the wordlist path. `FUZZ` is ffuf's URL keyword, so the
/// wordlist gets its own marker.
pub const DEFAULT_PLACEHOLDER: &str = "WORDLIST";

/// A fuzz command line with exactly one wordlist placeholder.
///
/// Templates are split with shell-like quoting once, at configuration time.
/// Rendering is a pure substitution over the already-split arguments, so the
/// wordlist path never goes through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    args: Vec<String>,
    placeholder: String,
}

impl CommandTemplate {
    /// Splits `template` and checks that `placeholder` occurs exactly once.
    ///
    /// A command written for plain ffuf (`ffuf -w ./words.txt -u http://t/FUZZ`)
    /// carries no placeholder; its `-w` value is swapped for the placeholder
    /// before counting.
    pub fn parse(template: &str, placeholder: &str) -> Result<Self, ConfigError> {
        if placeholder.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fuzz.placeholder",
                reason: "must not be empty".to_string(),
            });
        }

        let mut args = split_command_line(template)?;
        if args.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }

        let mut count = count_occurrences(&args, placeholder);
        if count == 0 && is_ffuf(&args[0]) {
            if let Some(idx) = args.iter().position(|a| a == "-w") {
                if let Some(value) = args.get_mut(idx + 1) {
                    // keep ffuf's optional `:KEYWORD` suffix
                    *value = match value.rsplit_once(':') {
                        Some((_, keyword))
                            if !keyword.is_empty()
                                && keyword.chars().all(|c| c.is_ascii_uppercase()) =>
                        {
                            format!("{placeholder}:{keyword}")
                        }
                        _ => placeholder.to_string(),
                    };
                    count = count_occurrences(&args, placeholder);
                }
            }
        }

        if count != 1 {
            return Err(ConfigError::Placeholder {
                placeholder: placeholder.to_string(),
                count,
            });
        }

        let template = Self {
            args,
            placeholder: placeholder.to_string(),
        };
        if template.is_ffuf() {
            if let Some(format) = template.flag_value("-of") {
                if format != "json" {
                    return Err(ConfigError::InvalidValue {
                        field: "fuzz.command",
                        reason: format!(
                            "ffuf output format '{format}' cannot be read back; use -of json"
                        ),
                    });
                }
            }
        }
        Ok(template)
    }

    pub fn program(&self) -> &str {
        &self.args[0]
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn is_ffuf(&self) -> bool {
        is_ffuf(self.program())
    }

    /// Substitutes the wordlist path for the placeholder.
    pub fn render(&self, wordlist: &Path) -> Vec<String> {
        let path = wordlist.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(&self.placeholder, &path))
            .collect()
    }

    /// The value following `flag`, either as the next argument or as `flag=value`.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let mut iter = self.args[1..].iter();
        while let Some(arg) = iter.next() {
            if arg == flag {
                return iter.next().map(String::as_str);
            }
            if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
                return Some(value);
            }
        }
        None
    }

    /// The value of the command's `-u` argument, if any.
    pub fn target_url(&self) -> Option<&str> {
        self.flag_value("-u")
    }
}

fn is_ffuf(program: &str) -> bool {
    Path::new(program)
        .file_name()
        .is_some_and(|name| name == "ffuf" || name == "ffuf.exe")
}

fn count_occurrences(args: &[String], needle: &str) -> usize {
    args.iter().map(|a| a.matches(needle).count()).sum()
}

/// Splits a command line into arguments.
///
/// Single quotes are literal, double quotes honour `\"` and `\\`, and a
/// backslash outside quotes escapes the next character.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ConfigError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_arg = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(ConfigError::UnbalancedQuote(line.to_string())),
                    }
                }
            }
            '"' => {
                in_arg = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(ConfigError::UnbalancedQuote(line.to_string())),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(ConfigError::UnbalancedQuote(line.to_string())),
                    }
                }
            }
            '\\' => {
                in_arg = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                in_arg = true;
                current.push(c);
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}
