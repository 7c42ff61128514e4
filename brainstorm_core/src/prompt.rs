use crate::config::ConfigError;
use crate::link_store::LinkStore;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::path::Path;

pub const LINKS_PLACEHOLDER: &str = "{{initialLinks}}";
pub const FILENAMES_PLACEHOLDER: &str = "{{knownFilenames}}";
pub const HEADERS_PLACEHOLDER: &str = "{{serverHeaders}}";
pub const SHORT_NAME_PLACEHOLDER: &str = "{{INPUT_83_FILENAME}}";
pub const CYCLE_PLACEHOLDER: &str = "{{cycle}}";
pub const CYCLES_PLACEHOLDER: &str = "{{cycles}}";

/// A prompt template read once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fills every placeholder present in `ctx`; unknown `{{...}}` markers are left as is.
    pub fn render(&self, ctx: &PromptContext<'_>) -> String {
        let links = ctx.links.join("\n");
        let mut out = self
            .text
            .replace(LINKS_PLACEHOLDER, &links)
            .replace(FILENAMES_PLACEHOLDER, &links)
            .replace(HEADERS_PLACEHOLDER, ctx.server_headers)
            .replace(CYCLE_PLACEHOLDER, &ctx.cycle.to_string())
            .replace(CYCLES_PLACEHOLDER, &ctx.cycles.to_string());
        if let Some(short_name) = ctx.short_name {
            out = out.replace(SHORT_NAME_PLACEHOLDER, short_name);
        }
        out
    }
}

/// Values substituted into a [`PromptTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub links: &'a [String],
    pub server_headers: &'a str,
    pub short_name: Option<&'a str>,
    /// 1-based.
    pub cycle: u64,
    pub cycles: u64,
}

/// Picks the links embedded in a prompt.
///
/// `known` is ordered oldest to newest. With a cap, the newest `cap` links
/// win. Without shuffling the kept links stay oldest to newest.
pub fn select_links(
    known: &[String],
    cap: Option<usize>,
    rng: Option<&mut ChaCha8Rng>,
) -> Vec<String> {
    let start = cap.map_or(0, |cap| known.len().saturating_sub(cap));
    let mut selected = known[start..].to_vec();
    if let Some(rng) = rng {
        selected.shuffle(rng);
    }
    selected
}

/// Renders one prompt per cycle from the template and the current link store.
#[derive(Debug)]
pub struct PromptBuilder {
    template: PromptTemplate,
    max_links: Option<usize>,
    shuffle: bool,
    rng: ChaCha8Rng,
    server_headers: String,
    short_name: Option<String>,
}

impl PromptBuilder {
    /// `seed` fixes the shuffle order; `None` draws a fresh seed.
    pub fn new(
        template: PromptTemplate,
        max_links: Option<usize>,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            template,
            max_links,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
            server_headers: String::new(),
            short_name: None,
        }
    }

    pub fn with_server_headers(mut self, headers: impl Into<String>) -> Self {
        self.server_headers = headers.into();
        self
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn build(&mut self, store: &LinkStore, cycle: u64, cycles: u64) -> String {
        let known: Vec<String> = store.known().cloned().collect();
        let rng = if self.shuffle {
            Some(&mut self.rng)
        } else {
            None
        };
        let links = select_links(&known, self.max_links, rng);
        self.template.render(&PromptContext {
            links: &links,
            server_headers: &self.server_headers,
            short_name: self.short_name.as_deref(),
            cycle,
            cycles,
        })
    }
}
