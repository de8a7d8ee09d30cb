//! The public [`RiveScript`] engine handle (spec §6 "External interfaces").
//!
//! The teacher exposes a pure-function `parse`/`parse_with` surface over a
//! stateless ruleset. A RiveScript brain is loaded incrementally and then
//! queried many times, so the natural equivalent here is a struct that owns
//! the loaded [`Brain`], [`SortBuffer`], and session store across calls,
//! while keeping the same `Options`-as-plain-struct configuration idiom.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ast;
use crate::engine::brain::Brain;
use crate::engine::matcher::{Matcher, Options as MatcherOptions};
use crate::engine::metrics::{FileMetrics, LoadMetrics, ReplyMetrics};
use crate::engine::parser::Parser;
use crate::engine::regexc::CompileOptions;
use crate::engine::sorter::{self, SortBuffer};
use crate::error::{ErrorKind, LoadError, ParseWarning};
use crate::macro_handler::{MacroHandler, MacroRegistry};
use crate::session::{InMemorySessionManager, SessionManager, ThawAction};

/// Configuration flags (spec §6 "Configuration options").
#[derive(Debug, Clone)]
pub struct Options {
    /// Abort loading on the first structural violation instead of skipping
    /// it with a warning (spec §4.1 "Strict-mode diagnostics").
    pub strict: bool,
    pub utf8: bool,
    /// Lowercase every trigger pattern after parsing (spec §4.1 "Case policy").
    pub force_case: bool,
    /// Bounds topic inheritance, `%Previous`/reply-redirect recursion, and
    /// BEGIN recursion (spec §4.3, §4.5, §5).
    pub depth: u32,
    /// Regex-class body used to strip punctuation when `utf8` is set
    /// (spec §4.4 "Message normalization").
    pub unicode_punctuation: String,
    /// Overrides for the literal `"ERR: ..."` reply strings of spec §7.
    pub error_messages: HashMap<ErrorKind, String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            strict: true,
            utf8: false,
            force_case: false,
            depth: 50,
            unicode_punctuation: r"[.,!?;:]".to_string(),
            error_messages: HashMap::new(),
        }
    }
}

/// A loaded, queryable RiveScript engine (spec §6).
///
/// File discovery and directory walking are explicitly not this type's job
/// (spec §1 "Out of scope" / `SPEC_FULL.md` §1): callers (the CLI, a test,
/// a host application) read source files however suits them and hand the
/// text to [`RiveScript::load_file`].
pub struct RiveScript {
    brain: Brain,
    sort: SortBuffer,
    sessions: Arc<dyn SessionManager>,
    matcher: Matcher,
    options: Options,
    warnings: Vec<ParseWarning>,
}

impl RiveScript {
    /// New engine with its own in-memory session store (spec §5).
    pub fn new(options: Options) -> Self {
        Self::with_sessions(options, InMemorySessionManager::new())
    }

    /// New engine sharing a caller-supplied session store, e.g. one backed
    /// by a database rather than `InMemorySessionManager` (spec §6 "Session
    /// manager contract").
    pub fn with_sessions(options: Options, sessions: Arc<dyn SessionManager>) -> Self {
        let macros = Arc::new(MacroRegistry::new());
        let compile = CompileOptions { utf8: options.utf8, unicode_punctuation: options.unicode_punctuation.clone() };
        let matcher_options =
            MatcherOptions { compile, depth: options.depth, error_overrides: options.error_messages.clone() };
        RiveScript {
            brain: Brain::new(macros),
            sort: SortBuffer::default(),
            sessions,
            matcher: Matcher::new(matcher_options),
            options,
            warnings: Vec::new(),
        }
    }

    /// Registers a host-language handler for `> object NAME LANG` blocks and
    /// `<call>` tags (spec §6 "Macro handler contract").
    pub fn register_macro_handler(&mut self, language: impl Into<String>, handler: Arc<dyn MacroHandler>) {
        self.brain.macros.register(language, handler);
    }

    fn parse_file(&mut self, filename: impl Into<String>, source: &str) -> Result<(ast::Root, FileMetrics), LoadError> {
        let filename = filename.into();
        let start = Instant::now();
        let lines: Vec<&str> = source.lines().collect();
        let parser = Parser::new(filename.clone(), self.options.strict, self.options.force_case);
        let output = parser.parse(&lines)?;
        let duration = start.elapsed();

        let topics_touched = output.root.topics.len();
        let triggers_parsed = output.root.topics.values().map(|t| t.triggers.len()).sum();
        let warnings = output.warnings.len();
        self.warnings.extend(output.warnings);

        Ok((output.root, FileMetrics { file: filename, duration, topics_touched, triggers_parsed, warnings }))
    }

    /// Parses `source` and merges it into the brain (spec §4.1/§4.2). Call
    /// [`RiveScript::sort_replies`] once after the last file is loaded.
    pub fn load_file(&mut self, filename: impl Into<String>, source: &str) -> Result<(), LoadError> {
        let (root, metrics) = self.parse_file(filename, source)?;
        log::debug!("loaded '{}': {} topic(s), {} trigger(s)", metrics.file, metrics.topics_touched, metrics.triggers_parsed);
        self.brain.merge(root)?;
        Ok(())
    }

    /// Like repeated [`RiveScript::load_file`] calls followed by
    /// [`RiveScript::sort_replies`], but records per-stage timing (spec
    /// `SPEC_FULL.md` §2.4's opt-in profiling surface).
    pub fn load_all_with_metrics(&mut self, files: &[(String, String)]) -> Result<LoadMetrics, LoadError> {
        let total_start = Instant::now();
        let mut parse = Vec::with_capacity(files.len());
        let mut merge = Duration::ZERO;

        for (name, source) in files {
            let (root, metrics) = self.parse_file(name.clone(), source)?;
            parse.push(metrics);
            let merge_start = Instant::now();
            self.brain.merge(root)?;
            merge += merge_start.elapsed();
        }

        let sort_start = Instant::now();
        self.sort_replies();
        let sort = sort_start.elapsed();

        Ok(LoadMetrics { total: total_start.elapsed(), parse, merge, sort })
    }

    /// Rebuilds the deterministic trigger search order from the current
    /// brain (spec §4.3). Must be called before [`RiveScript::reply`] sees
    /// any newly loaded triggers.
    pub fn sort_replies(&mut self) {
        let start = Instant::now();
        self.sort = sorter::sort_brain(&self.brain, self.options.depth);
        log::debug!("sorted brain in {:?}", start.elapsed());
    }

    /// Non-strict-mode parse warnings accumulated across every `load_file`
    /// call so far (spec §4.1).
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// `reply()` entry point (spec §4.5): always returns a `String`, with
    /// engine-surfaced failures returned as one of the literal
    /// `"ERR: ..."` strings rather than an `Err`.
    pub fn reply(&mut self, user: &str, message: &str) -> String {
        self.matcher.reply(&self.brain, &self.sort, self.sessions.as_ref(), user, message)
    }

    /// Like [`RiveScript::reply`], plus timing and redirect-count
    /// bookkeeping for profiling or the CLI's `--debug` flag.
    pub fn reply_with_metrics(&mut self, user: &str, message: &str) -> (String, ReplyMetrics) {
        self.matcher.reply_with_metrics(&self.brain, &self.sort, self.sessions.as_ref(), user, message)
    }

    pub fn set_variable(&self, user: &str, name: &str, value: impl Into<String>) {
        self.sessions.set(user, HashMap::from([(name.to_string(), value.into())]));
    }

    /// Reads a bot variable (`! var`, `<bot name>`, spec.md:136).
    pub fn get_bot_variable(&self, name: &str) -> String {
        self.brain.get_var(name)
    }

    /// Sets a bot variable from host code, the same store `<bot name=value>`
    /// mutates (spec.md:136).
    pub fn set_bot_variable(&self, name: &str, value: impl Into<String>) {
        self.brain.set_var(name, value);
    }

    /// Reads a global variable (`! global`, `<env name>`, spec.md:137).
    pub fn get_global_variable(&self, name: &str) -> String {
        self.brain.get_global(name)
    }

    /// Sets a global variable from host code, the same store `<env
    /// name=value>` mutates (spec.md:137).
    pub fn set_global_variable(&self, name: &str, value: impl Into<String>) {
        self.brain.set_global(name, value);
    }

    pub fn get_variable(&self, user: &str, name: &str) -> String {
        self.sessions.get(user, name)
    }

    pub fn get_variables(&self, user: &str) -> HashMap<String, String> {
        self.sessions.get_any(user)
    }

    pub fn clear_session(&self, user: &str) {
        self.sessions.clear(user);
    }

    pub fn clear_all_sessions(&self) {
        self.sessions.clear_all();
    }

    pub fn freeze_session(&self, user: &str) {
        self.sessions.freeze(user);
    }

    pub fn thaw_session(&self, user: &str, action: ThawAction) {
        self.sessions.thaw(user, action);
    }

    /// The underlying session store, for host applications that need to
    /// reach it directly (e.g. to swap in their own `thaw` policy).
    pub fn sessions(&self) -> &Arc<dyn SessionManager> {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_sort_reply_round_trip() {
        let mut bot = RiveScript::new(Options::default());
        bot.load_file("t.rive", "+ hello bot\n- Hello, human!").unwrap();
        bot.sort_replies();
        assert_eq!(bot.reply("u", "hello bot"), "Hello, human!");
    }

    #[test]
    fn strict_mode_parse_error_propagates() {
        let mut bot = RiveScript::new(Options::default());
        let err = bot.load_file("t.rive", "- stray reply with no trigger").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn non_strict_mode_collects_warnings_instead_of_failing() {
        let mut bot = RiveScript::new(Options { strict: false, ..Options::default() });
        bot.load_file("t.rive", "~ weird line\n+ hi\n- there").unwrap();
        assert_eq!(bot.warnings().len(), 1);
        bot.sort_replies();
        assert_eq!(bot.reply("u", "hi"), "there");
    }

    #[test]
    fn load_all_with_metrics_reports_per_file_counts() {
        let mut bot = RiveScript::new(Options::default());
        let files = vec![
            ("a.rive".to_string(), "+ hi\n- hello".to_string()),
            ("b.rive".to_string(), "+ bye\n- goodbye".to_string()),
        ];
        let metrics = bot.load_all_with_metrics(&files).unwrap();
        assert_eq!(metrics.parse.len(), 2);
        assert_eq!(metrics.parse[0].triggers_parsed, 1);
        assert_eq!(bot.reply("u", "bye"), "goodbye");
    }

    #[test]
    fn session_variables_round_trip() {
        let bot = RiveScript::new(Options::default());
        bot.set_variable("u", "mood", "happy");
        assert_eq!(bot.get_variable("u", "mood"), "happy");
        bot.clear_session("u");
        assert_eq!(bot.get_variable("u", "mood"), "undefined");
    }

    #[test]
    fn bot_and_global_variables_round_trip_and_are_visible_to_tags() {
        let mut bot = RiveScript::new(Options::default());
        bot.load_file("t.rive", "+ what is your name\n- I'm <bot name>.").unwrap();
        bot.sort_replies();
        bot.set_bot_variable("name", "Rive");
        assert_eq!(bot.get_bot_variable("name"), "Rive");
        assert_eq!(bot.reply("u", "what is your name"), "I'm Rive.");

        bot.set_global_variable("depends", "nothing");
        assert_eq!(bot.get_global_variable("depends"), "nothing");
    }
}
