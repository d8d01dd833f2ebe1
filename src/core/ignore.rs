//! Ignore Pattern Engine.
//!
//! Decides whether a project path is excluded from watching and snapshotting. Rules
//! come from a line-oriented file in the project root (see [`IGNORE_FILE_NAME`]) and
//! follow layered ignore-file semantics: patterns are evaluated in file order and the
//! last matching pattern wins, so `!` rules can re-include earlier exclusions.
//!
//! # Public API
//! - [`IgnoreEngine`]: Loads rules, answers `should_ignore` queries, caches decisions
//! - [`IgnorePattern`]: One parsed rule with its match strategy precomputed
//! - [`CacheLimits`] / [`CacheStats`]: Bounds and counters of the decision cache
//!
//! # Rule syntax
//! - `#` starts a comment, blank lines are skipped
//! - `!pattern` re-includes paths matched by earlier rules
//! - `pattern/` only matches directories (and therefore everything below them)
//! - `/pattern` only matches from the project root
//! - `*`, `?`, `[...]` glob within one path segment, `**` spans segments
//!
//! # Resource limits
//! Oversized files, lines and pattern sets are truncated or skipped with a warning;
//! they never abort engine construction.

use crate::core::error::{Result, TimeMachineError};
use glob::{MatchOptions, Pattern, PatternError};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of the project-level rules file.
pub const IGNORE_FILE_NAME: &str = ".timemachineignore";

pub const MAX_IGNORE_FILE_SIZE: u64 = 1024 * 1024;
pub const MAX_IGNORE_LINES: usize = 10_000;
pub const MAX_PATTERN_LENGTH: usize = 1024;
pub const MAX_PATTERNS: usize = 5_000;

/// Approximate per-entry bookkeeping cost of the decision cache, on top of key bytes.
const CACHE_ENTRY_OVERHEAD: usize = 64;

/// The primary store's metadata directory is never part of a snapshot.
const GIT_DIR_NAME: &str = ".git";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Glob(Pattern),
}

impl Matcher {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            Matcher::Exact(text) => text == candidate,
            Matcher::Glob(pattern) => pattern.matches_with(candidate, MATCH_OPTIONS),
        }
    }
}

/// Which slices of a path a pattern is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchScope {
    /// Single-segment, unanchored: any one path segment.
    Segment,
    /// Fixed number of segments, compared against contiguous windows of the path.
    Window(usize),
    /// Contains `**`: windows of any length.
    Recursive,
}

/// A parsed ignore rule.
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    /// Line as written in the rules file (trimmed)
    pub original: String,
    /// Match text with negation, anchoring and directory markers removed
    pub text: String,
    pub negated: bool,
    pub dir_only: bool,
    pub anchored: bool,
    /// No wildcard characters: matched by plain string comparison
    pub simple: bool,
    scope: MatchScope,
    matcher: Matcher,
}

impl IgnorePattern {
    /// Parse one rules-file line. Returns `Ok(None)` for blank lines, comments and
    /// lines that reduce to nothing (`!`, `/`).
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, PatternError> {
        let original = line.trim();
        if original.is_empty() || original.starts_with('#') {
            return Ok(None);
        }

        let mut text = original;
        let negated = text.starts_with('!');
        if negated {
            text = &text[1..];
        } else if text.starts_with("\\!") || text.starts_with("\\#") {
            text = &text[1..];
        }

        let anchored = text.starts_with('/');
        let text = text.trim_start_matches('/');
        let dir_only = text.ends_with('/');
        let text = text.trim_end_matches('/');

        let segments: Vec<&str> = text.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(None);
        }
        let text = segments.join("/");

        let simple = !text.contains(['*', '?', '[', '\\']);
        let matcher = if simple {
            Matcher::Exact(text.clone())
        } else {
            Matcher::Glob(Pattern::new(&text)?)
        };

        let scope = if text.contains("**") {
            MatchScope::Recursive
        } else if segments.len() == 1 && !anchored {
            MatchScope::Segment
        } else {
            MatchScope::Window(segments.len())
        };

        Ok(Some(Self {
            original: original.to_string(),
            text,
            negated,
            dir_only,
            anchored,
            simple,
            scope,
            matcher,
        }))
    }

    /// Whether this rule matches the path given as its segments. A match on a prefix
    /// of the path names an ancestor directory, which covers everything below it.
    pub fn matches(&self, parts: &[&str], is_dir: bool) -> bool {
        let n = parts.len();
        if n == 0 {
            return false;
        }
        let accept_end = |end: usize| end < n || !self.dir_only || is_dir;

        match self.scope {
            MatchScope::Segment => {
                (0..n).any(|i| accept_end(i + 1) && self.matcher.matches(parts[i]))
            }
            MatchScope::Window(len) => {
                if len > n {
                    return false;
                }
                let last_start = if self.anchored { 0 } else { n - len };
                (0..=last_start).any(|start| {
                    let end = start + len;
                    accept_end(end) && self.matcher.matches(&parts[start..end].join("/"))
                })
            }
            MatchScope::Recursive => {
                let last_start = if self.anchored { 0 } else { n - 1 };
                (0..=last_start).any(|start| {
                    (start + 1..=n).any(|end| {
                        accept_end(end) && self.matcher.matches(&parts[start..end].join("/"))
                    })
                })
            }
        }
    }

    /// The rule's path part in git exclude-file syntax. `floating` forces the `**/`
    /// prefix on unanchored rules that will get a trailing `/**`.
    fn git_path(&self, floating: bool) -> String {
        let mut path = String::with_capacity(self.text.len() + 4);
        if self.anchored {
            path.push('/');
        } else if (floating || self.text.contains('/')) && !self.text.starts_with("**/") {
            // git anchors any rule containing a slash; ours float to any depth
            path.push_str("**/");
        }
        path.push_str(&self.text);
        path
    }

    /// Render the rule in git exclude-file syntax with identical semantics.
    ///
    /// git never looks inside an excluded directory, so a later `!` rule could not
    /// re-include anything below it. With `descend` set, no directory stays excluded:
    /// exclusions apply to the files inside and every subdirectory is re-opened.
    pub fn to_exclude_lines(&self, descend: bool) -> Vec<String> {
        if !descend {
            let bang = if self.negated { "!" } else { "" };
            let slash = if self.dir_only { "/" } else { "" };
            return vec![format!("{bang}{}{slash}", self.git_path(false))];
        }

        let path = self.git_path(true);
        match (self.negated, self.dir_only) {
            (false, true) => vec![format!("{path}/**"), format!("!{path}/**/")],
            (false, false) => vec![
                path.clone(),
                format!("!{path}/"),
                format!("{path}/**"),
                format!("!{path}/**/"),
            ],
            (true, true) => vec![format!("!{path}/"), format!("!{path}/**")],
            (true, false) => vec![format!("!{path}"), format!("!{path}/**")],
        }
    }
}

/// Parse a rules file body, enforcing line, length and count limits.
pub fn parse_rules(content: &str) -> Vec<IgnorePattern> {
    let mut patterns = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        if index >= MAX_IGNORE_LINES {
            log::warn!("Ignore file exceeds {MAX_IGNORE_LINES} lines, remaining lines skipped");
            break;
        }
        if line.len() > MAX_PATTERN_LENGTH {
            log::warn!(
                "Ignore rule on line {line_no} exceeds {MAX_PATTERN_LENGTH} characters, skipped"
            );
            continue;
        }

        match IgnorePattern::parse(line) {
            Ok(Some(pattern)) => {
                if patterns.len() >= MAX_PATTERNS {
                    log::warn!("Ignore file exceeds {MAX_PATTERNS} patterns, remaining rules skipped");
                    break;
                }
                patterns.push(pattern);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Invalid ignore rule on line {line_no} ('{}'): {e}", line.trim()),
        }
    }

    patterns
}

fn read_rules_file(path: &Path) -> Result<Option<String>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TimeMachineError::ignore_file_read(path, e)),
    };

    let size = file
        .metadata()
        .map_err(|e| TimeMachineError::ignore_file_read(path, e))?
        .len();
    if size > MAX_IGNORE_FILE_SIZE {
        log::warn!(
            "Ignore file {} is {size} bytes, only the first {MAX_IGNORE_FILE_SIZE} bytes are read",
            path.display()
        );
    }

    let mut bytes = Vec::new();
    file.take(MAX_IGNORE_FILE_SIZE)
        .read_to_end(&mut bytes)
        .map_err(|e| TimeMachineError::ignore_file_read(path, e))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_memory_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_memory_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: usize,
}

/// Bounded path -> decision map. Evicts the oldest half when a ceiling is exceeded.
#[derive(Debug)]
struct PathDecisionCache {
    entries: HashMap<String, bool>,
    order: VecDeque<String>,
    memory_bytes: usize,
    limits: CacheLimits,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PathDecisionCache {
    fn new(limits: CacheLimits) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            memory_bytes: 0,
            limits,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn entry_cost(key: &str) -> usize {
        // key is held twice: map and insertion queue
        key.len() * 2 + CACHE_ENTRY_OVERHEAD
    }

    fn get(&self, key: &str) -> Option<bool> {
        let found = self.entries.get(key).copied();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn insert(&mut self, key: String, ignored: bool) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = ignored;
            return;
        }

        self.memory_bytes += Self::entry_cost(&key);
        self.order.push_back(key.clone());
        self.entries.insert(key, ignored);

        if self.entries.len() > self.limits.max_entries
            || self.memory_bytes > self.limits.max_memory_bytes
        {
            self.evict_half();
        }
    }

    fn evict_half(&mut self) {
        let target = (self.order.len() / 2).max(1);
        for _ in 0..target {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            self.memory_bytes = self.memory_bytes.saturating_sub(Self::entry_cost(&key));
            self.entries.remove(&key);
        }
        log::debug!(
            "Ignore cache evicted {target} entries ({} remaining, ~{} bytes)",
            self.entries.len(),
            self.memory_bytes
        );
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.memory_bytes = 0;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            memory_bytes: self.memory_bytes,
        }
    }
}

/// Rules plus decision cache for one project root.
pub struct IgnoreEngine {
    root: PathBuf,
    ignore_file: PathBuf,
    patterns: RwLock<Vec<IgnorePattern>>,
    cache: RwLock<PathDecisionCache>,
}

impl IgnoreEngine {
    /// Load rules from `<root>/.timemachineignore`. A missing or unreadable file
    /// yields an empty rule set; read failures are logged, not returned.
    pub fn new(root: impl Into<PathBuf>, limits: CacheLimits) -> Self {
        let root = root.into();
        let ignore_file = root.join(IGNORE_FILE_NAME);
        let patterns = match read_rules_file(&ignore_file) {
            Ok(Some(content)) => parse_rules(&content),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("{e}");
                Vec::new()
            }
        };
        log::debug!(
            "Loaded {} ignore rules from {}",
            patterns.len(),
            ignore_file.display()
        );

        Self {
            root,
            ignore_file,
            patterns: RwLock::new(patterns),
            cache: RwLock::new(PathDecisionCache::new(limits)),
        }
    }

    /// Build an engine from in-memory rules instead of the rules file.
    pub fn from_rules(root: impl Into<PathBuf>, rules: &str, limits: CacheLimits) -> Self {
        let root = root.into();
        Self {
            ignore_file: root.join(IGNORE_FILE_NAME),
            root,
            patterns: RwLock::new(parse_rules(rules)),
            cache: RwLock::new(PathDecisionCache::new(limits)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ignore_file(&self) -> &Path {
        &self.ignore_file
    }

    /// Re-read the rules file, replacing rules and clearing the decision cache
    /// together. Returns the number of rules loaded.
    pub fn reload_ignore_file(&self) -> Result<usize> {
        let patterns = match read_rules_file(&self.ignore_file)? {
            Some(content) => parse_rules(&content),
            None => Vec::new(),
        };
        let count = patterns.len();

        let mut rules = self.patterns.write();
        let mut cache = self.cache.write();
        *rules = patterns;
        cache.clear();
        log::info!("Reloaded {count} ignore rules");
        Ok(count)
    }

    /// Whether `path` (absolute inside the root, or root-relative) is excluded. A
    /// trailing separator marks the path as a directory; otherwise the file system
    /// is consulted.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let trailing_slash = path.as_os_str().to_string_lossy().ends_with(['/', '\\']);
        let Some(rel) = self.normalize(path) else {
            return false;
        };
        let is_dir = trailing_slash || (!rel.is_empty() && self.root.join(&rel).is_dir());
        self.decide(rel, is_dir)
    }

    /// Like [`should_ignore`](Self::should_ignore) when the caller already knows
    /// whether the path is a directory.
    pub fn should_ignore_entry(&self, path: &Path, is_dir: bool) -> bool {
        match self.normalize(path) {
            Some(rel) => self.decide(rel, is_dir),
            None => false,
        }
    }

    fn decide(&self, rel: String, is_dir: bool) -> bool {
        if rel.is_empty() {
            return false;
        }
        let mut key = rel;
        if is_dir {
            key.push('/');
        }

        if let Some(ignored) = self.cache.read().get(&key) {
            return ignored;
        }

        // rules stay read-locked through the insert so a concurrent reload cannot
        // clear the cache between evaluation and insertion
        let rules = self.patterns.read();
        let ignored = {
            let parts: Vec<&str> = key.trim_end_matches('/').split('/').collect();
            parts.contains(&GIT_DIR_NAME) || evaluate(&rules, &parts, is_dir)
        };
        self.cache.write().insert(key, ignored);
        drop(rules);
        ignored
    }

    /// Whether a directory walk must look inside `dir`. An ignored directory is still
    /// entered when a `!` rule could re-include something below it. The primary
    /// metadata directory is never entered.
    pub fn should_descend(&self, dir: &Path) -> bool {
        let Some(rel) = self.normalize(dir) else {
            return false;
        };
        if rel.split('/').any(|part| part == GIT_DIR_NAME) {
            return false;
        }
        !self.decide(rel, true) || self.has_negations()
    }

    pub fn has_negations(&self) -> bool {
        self.patterns.read().iter().any(|pattern| pattern.negated)
    }

    /// Root-relative, `/`-separated form of `path`. `None` for paths outside the root.
    fn normalize(&self, path: &Path) -> Option<String> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };

        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }

    pub fn patterns(&self) -> Vec<IgnorePattern> {
        self.patterns.read().clone()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().len()
    }

    /// All accepted rules in git exclude-file syntax, one per line.
    pub fn exclude_rules(&self) -> String {
        let rules = self.patterns.read();
        let descend = rules.iter().any(|pattern| pattern.negated);
        let mut out = String::new();
        for line in rules.iter().flat_map(|pattern| pattern.to_exclude_lines(descend)) {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.read().stats()
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

fn evaluate(rules: &[IgnorePattern], parts: &[&str], is_dir: bool) -> bool {
    let mut ignored = false;
    for pattern in rules {
        if pattern.matches(parts, is_dir) {
            ignored = !pattern.negated;
        }
    }
    ignored
}
