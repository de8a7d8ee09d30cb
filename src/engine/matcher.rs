//! The `reply()` algorithm (spec §4.5).
//!
//! `Matcher` owns the one piece of mutable-but-derived state reply generation
//! needs beyond the brain and sort buffer: the regex cache. Everything else
//! it touches — the brain, the sort buffer, the session store — is borrowed.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::ast::{self, Trigger};
use crate::engine::brain::Brain;
use crate::engine::regexc::{self, CompileOptions, RegexCache};
use crate::engine::sorter::{weight_of, SortBuffer};
use crate::engine::tags::{self, TagContext};
use crate::error::{ErrorKind, MatchError};
use crate::session::{SessionManager, SessionView};

/// Runtime knobs for reply generation (spec §6 "Configuration options").
#[derive(Debug, Clone)]
pub struct Options {
    pub compile: CompileOptions,
    /// Bounds topic inheritance recursion, redirect recursion, and BEGIN
    /// recursion, independently, at the same limit (spec §4.5, §5).
    pub depth: u32,
    /// Overrides for the literal error strings of spec §7, keyed by kind.
    pub error_overrides: HashMap<ErrorKind, String>,
}

impl Default for Options {
    fn default() -> Self {
        Options { compile: CompileOptions::default(), depth: 50, error_overrides: HashMap::new() }
    }
}

/// Drives `reply()` against a built [`Brain`] and [`SortBuffer`] (spec §4.5).
#[derive(Debug, Default)]
pub struct Matcher {
    pub options: Options,
    cache: RegexCache,
}

impl Matcher {
    pub fn new(options: Options) -> Self {
        Matcher { options, cache: RegexCache::new() }
    }

    fn error_message(&self, kind: ErrorKind) -> String {
        self.options.error_overrides.get(&kind).cloned().unwrap_or_else(|| kind.default_message().to_string())
    }

    /// Entry point (spec §4.5): normalizes `message`, resolves a reply for
    /// `user` (through the BEGIN block if present), updates session history,
    /// and always returns a string — engine-surfaced failures come back as
    /// one of the literal `"ERR: ..."` strings, never a `Result`.
    pub fn reply(&mut self, brain: &Brain, sort: &SortBuffer, sessions: &dyn SessionManager, user: &str, message: &str) -> String {
        let mut redirects = 0;
        self.reply_inner(brain, sort, sessions, user, message, &mut redirects)
    }

    /// Like [`Matcher::reply`], plus timing and redirect-count bookkeeping
    /// for the CLI's `--debug` flag and other profiling callers.
    pub fn reply_with_metrics(
        &mut self,
        brain: &Brain,
        sort: &SortBuffer,
        sessions: &dyn SessionManager,
        user: &str,
        message: &str,
    ) -> (String, crate::engine::metrics::ReplyMetrics) {
        let start = std::time::Instant::now();
        let mut redirects_followed = 0;
        let text = self.reply_inner(brain, sort, sessions, user, message, &mut redirects_followed);
        let duration = start.elapsed();
        let matched_pattern = sessions.get_last_match(user);
        (text, crate::engine::metrics::ReplyMetrics { duration, matched_pattern, redirects_followed })
    }

    fn reply_inner(
        &mut self,
        brain: &Brain,
        sort: &SortBuffer,
        sessions: &dyn SessionManager,
        user: &str,
        message: &str,
        redirects: &mut u32,
    ) -> String {
        sessions.init(user);

        let depth = self.options.depth;
        let result = if brain.topic(ast::BEGIN_TOPIC).is_some() {
            self.resolve_begin(brain, sort, sessions, user, message, depth, redirects)
        } else {
            let topic = sessions.get(user, "topic");
            self.resolve(brain, sort, sessions, user, &topic, message, true, depth, redirects)
        };

        let final_reply = match result {
            Ok(text) => text,
            Err(err) => self.error_message(err.into()),
        };

        let normalized_input = regexc::normalize(message, brain, &sort.sub, &self.options.compile);
        sessions.add_history(user, normalized_input, final_reply.clone());
        final_reply
    }

    /// BEGIN-block handling (spec §4.5 step 2): reply to the sentinel
    /// message `request` in `__begin__`; a `{ok}` token in that result is
    /// replaced by matching the real topic against the real message.
    fn resolve_begin(
        &mut self,
        brain: &Brain,
        sort: &SortBuffer,
        sessions: &dyn SessionManager,
        user: &str,
        message: &str,
        depth: u32,
        redirects: &mut u32,
    ) -> Result<String, MatchError> {
        let begin_reply = self.resolve(brain, sort, sessions, user, ast::BEGIN_TOPIC, "request", true, depth, redirects)?;
        if begin_reply.contains("{ok}") {
            let topic = sessions.get(user, "topic");
            let actual = self.resolve(brain, sort, sessions, user, &topic, message, true, depth, redirects)?;
            Ok(begin_reply.replace("{ok}", &actual))
        } else {
            Ok(begin_reply)
        }
    }

    /// Matches `message` in `topic`, evaluates conditions, picks a weighted
    /// reply or redirect, and expands tags (spec §4.5 steps 1, 3-8). Used
    /// both for the top-level reply and for every redirect/BEGIN recursion.
    #[allow(clippy::too_many_arguments)]
    fn resolve(
        &mut self,
        brain: &Brain,
        sort: &SortBuffer,
        sessions: &dyn SessionManager,
        user: &str,
        topic: &str,
        message: &str,
        try_previous: bool,
        depth_remaining: u32,
        redirects: &mut u32,
    ) -> Result<String, MatchError> {
        let normalized = regexc::normalize(message, brain, &sort.sub, &self.options.compile);
        let (trigger, stars, botstars) = self.find_match(brain, sort, sessions, user, topic, &normalized, try_previous)?;
        sessions.set_last_match(user, trigger.pattern.clone());

        let mut reply_template = None;
        for condition in &trigger.conditions {
            if let Some(text) = self.evaluate_condition(condition, brain, sessions, user, &stars, &botstars, &sort.person) {
                reply_template = Some(text);
                break;
            }
        }

        if reply_template.is_none() {
            let pool = build_weighted_pool(&trigger);
            let Some((text, is_redirect)) = pool.choose(&mut rand::thread_rng()).cloned() else {
                return Err(MatchError::NoReplyFound);
            };
            if is_redirect {
                if depth_remaining == 0 {
                    return Err(MatchError::DeepRecursion);
                }
                if depth_remaining <= 3 {
                    log::warn!("redirect from '{}' approaching recursion limit ({depth_remaining} left)", trigger.pattern);
                }
                let target = self.expand_for_redirect(&text, brain, sessions, user, &stars, &botstars, &sort.person);
                *redirects += 1;
                return self.resolve(brain, sort, sessions, user, topic, &target, false, depth_remaining - 1, redirects);
            }
            reply_template = Some(text);
        }

        let stripped = strip_reply_weight_tag(&reply_template.unwrap());
        let view = SessionView::new(user, sessions);
        let mut ctx = TagContext {
            user,
            brain,
            session: view,
            stars: &stars,
            botstars: &botstars,
            options: &self.options.compile,
            redirect: None,
        };
        let expansion = tags::expand(&stripped, &mut ctx, &sort.person, &|name, args| brain.macros.call(name, args));

        if let Some(target) = expansion.redirect {
            if depth_remaining == 0 {
                return Err(MatchError::DeepRecursion);
            }
            if depth_remaining <= 3 {
                log::warn!("{{@}} redirect from '{}' approaching recursion limit ({depth_remaining} left)", trigger.pattern);
            }
            *redirects += 1;
            return self.resolve(brain, sort, sessions, user, topic, &target, false, depth_remaining - 1, redirects);
        }

        if expansion.text.is_empty() {
            return Err(MatchError::NoReplyFound);
        }
        Ok(expansion.text)
    }

    /// Expands tags in a redirect's *pattern* string (e.g. `@ <star> thing`)
    /// before it becomes the next message to match against.
    fn expand_for_redirect(
        &mut self,
        text: &str,
        brain: &Brain,
        sessions: &dyn SessionManager,
        user: &str,
        stars: &[String],
        botstars: &[String],
        sorted_person: &[String],
    ) -> String {
        let view = SessionView::new(user, sessions);
        let mut ctx = TagContext { user, brain, session: view, stars, botstars, options: &self.options.compile, redirect: None };
        tags::expand(text, &mut ctx, sorted_person, &|name, args| brain.macros.call(name, args)).text
    }

    /// Plain matching and `%Previous` resolution (spec §4.5 steps 3-4).
    /// `try_previous` is only set on the outermost call: redirects and the
    /// real-topic half of a BEGIN resolution never re-check `%Previous`.
    fn find_match(
        &mut self,
        brain: &Brain,
        sort: &SortBuffer,
        sessions: &dyn SessionManager,
        user: &str,
        topic: &str,
        normalized: &str,
        try_previous: bool,
    ) -> Result<(Trigger, Vec<String>, Vec<String>), MatchError> {
        let view = SessionView::new(user, sessions);

        if try_previous {
            if let Some(entries) = sort.thats.get(topic) {
                log::debug!("topic '{topic}': falling back to %Previous resolution for '{normalized}'");
                let last_reply = regexc::normalize(&view.reply_history(1), brain, &sort.sub, &self.options.compile);
                for entry in entries {
                    let Some(previous) = &entry.original_trigger.previous else { continue };
                    let previous_re = self.cache.get_or_compile(previous, brain, Some(view), &self.options.compile);
                    let Some(previous_caps) = previous_re.captures(&last_reply) else { continue };
                    let trigger_re = self.cache.get_or_compile(&entry.pattern, brain, Some(view), &self.options.compile);
                    log::trace!("trying '%{previous}' / '{}' against '{normalized}'", entry.pattern);
                    if let Some(caps) = trigger_re.captures(normalized) {
                        return Ok((entry.original_trigger.clone(), captures_to_stars(&caps), captures_to_stars(&previous_caps)));
                    }
                }
            }
        }

        if let Some(entries) = sort.topics.get(topic) {
            for entry in entries {
                let re = self.cache.get_or_compile(&entry.pattern, brain, Some(view), &self.options.compile);
                log::trace!("trying '{}' (compiled '{re}') against '{normalized}'", entry.pattern);
                if let Some(caps) = re.captures(normalized) {
                    return Ok((entry.original_trigger.clone(), captures_to_stars(&caps), Vec::new()));
                }
            }
        }

        Err(MatchError::NoReplyMatched)
    }

    /// Condition evaluation (spec §4.5 step 6): `LEFT OP RIGHT => REPLY`,
    /// both sides tag-expanded (not fully nested-resolved — conditions
    /// expand their operands individually, separately from any winning
    /// reply text).
    #[allow(clippy::too_many_arguments)]
    fn evaluate_condition(
        &self,
        condition: &str,
        brain: &Brain,
        sessions: &dyn SessionManager,
        user: &str,
        stars: &[String],
        botstars: &[String],
        sorted_person: &[String],
    ) -> Option<String> {
        static CONDITION_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(.*?)\s+(==|!=|<>|<=|>=|eq|ne|<|>)\s+(.*)$").unwrap());

        let (test, reply) = condition.split_once("=>")?;
        let reply = reply.trim();
        let caps = CONDITION_RE.captures(test.trim())?;
        let left_raw = caps.get(1)?.as_str();
        let op = caps.get(2)?.as_str();
        let right_raw = caps.get(3)?.as_str();

        let view = SessionView::new(user, sessions);
        let call_object = |name: &str, args: &[String]| brain.macros.call(name, args);
        let expand_side = |text: &str| {
            let mut ctx = TagContext { user, brain, session: view, stars, botstars, options: &self.options.compile, redirect: None };
            let text = tags::expand(text, &mut ctx, sorted_person, &call_object).text;
            if text.is_empty() {
                "undefined".to_string()
            } else {
                text
            }
        };
        let left = expand_side(left_raw);
        let right = expand_side(right_raw);

        let result = match op {
            "==" | "eq" => left == right,
            "!=" | "ne" | "<>" => left != right,
            "<" | "<=" | ">" | ">=" => match (left.parse::<i64>(), right.parse::<i64>()) {
                (Ok(l), Ok(r)) => match op {
                    "<" => l < r,
                    "<=" => l <= r,
                    ">" => l > r,
                    ">=" => l >= r,
                    _ => unreachable!(),
                },
                _ => false,
            },
            _ => false,
        };

        result.then(|| reply.to_string())
    }
}

fn captures_to_stars(caps: &regex::Captures) -> Vec<String> {
    (1..caps.len()).map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_else(|| "undefined".to_string())).collect()
}

/// Selection pool from a trigger's redirect and replies, with `{weight=K}`
/// entries inserted `K` times (spec §4.5 step 7).
fn build_weighted_pool(trigger: &Trigger) -> Vec<(String, bool)> {
    let mut pool = Vec::new();
    if let Some(redirect) = &trigger.redirect {
        push_weighted(&mut pool, redirect.clone(), true);
    }
    for reply in &trigger.replies {
        push_weighted(&mut pool, reply.clone(), false);
    }
    pool
}

fn push_weighted(pool: &mut Vec<(String, bool)>, text: String, is_redirect: bool) {
    let times = weight_of(&text).max(1) as usize;
    for _ in 0..times {
        pool.push((text.clone(), is_redirect));
    }
}

fn strip_reply_weight_tag(text: &str) -> String {
    static WEIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\{weight=\d+\}\s*").unwrap());
    WEIGHT_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::Parser;
    use crate::engine::sorter::sort_brain;
    use crate::macro_handler::MacroRegistry;
    use crate::session::InMemorySessionManager;
    use std::sync::Arc;

    fn setup(lines: &[&str]) -> (Brain, SortBuffer, Arc<InMemorySessionManager>) {
        let mut brain = Brain::new(Arc::new(MacroRegistry::new()));
        let root = Parser::new("t.rive", true, false).parse(lines).unwrap().root;
        brain.merge(root).unwrap();
        let sort = sort_brain(&brain, 50);
        (brain, sort, InMemorySessionManager::new())
    }

    #[test]
    fn simple_trigger_matches_and_replies() {
        let (brain, sort, manager) = setup(&["+ hello bot", "- Hello, human!"]);
        let mut matcher = Matcher::default();
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "hello bot"), "Hello, human!");
    }

    #[test]
    fn no_match_returns_no_reply_matched_error() {
        let (brain, sort, manager) = setup(&["+ hello bot", "- Hello, human!"]);
        let mut matcher = Matcher::default();
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "goodbye"), "ERR: No Reply Matched");
    }

    #[test]
    fn higher_weight_wins_before_random_choice() {
        let (brain, sort, manager) =
            setup(&["+ something{weight=100}", "- Weighted", "+ something", "- Unweighted"]);
        let mut matcher = Matcher::default();
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "something"), "Weighted");
    }

    #[test]
    fn knock_knock_previous_resolution() {
        let (brain, sort, manager) = setup(&[
            "+ knock knock",
            "- Who's there?",
            "+ *",
            "% who is there",
            "- <sentence> who?",
            "+ *",
            "% * who",
            "- Haha! <sentence>!",
        ]);
        let mut matcher = Matcher::default();
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "knock knock"), "Who's there?");
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "Canoe"), "Canoe who?");
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "Canoe help me"), "Haha! Canoe help me!");
    }

    #[test]
    fn condition_picks_branch_on_session_variable() {
        let (brain, sort, manager) = setup(&["+ how am i", "* <get mood> eq happy => You are happy!", "- I don't know."]);
        let mut matcher = Matcher::default();
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "how am i"), "I don't know.");
        manager.set("u", HashMap::from([("mood".to_string(), "happy".to_string())]));
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "how am i"), "You are happy!");
    }

    #[test]
    fn redirect_recursion_is_bounded() {
        let (brain, sort, manager) = setup(&["+ loop", "@ loop"]);
        let mut matcher = Matcher::new(Options { depth: 5, ..Options::default() });
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "loop"), "ERR: Deep Recursion Detected!");
    }

    #[test]
    fn begin_block_ok_token_defers_to_real_topic() {
        let (brain, sort, manager) = setup(&["> begin", "+ request", "- {ok}", "< begin", "+ hi", "- Hello!"]);
        let mut matcher = Matcher::default();
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "hi"), "Hello!");
    }

    #[test]
    fn depth_zero_still_permits_a_non_redirecting_trigger() {
        let (brain, sort, manager) = setup(&["+ hi", "- Hello!"]);
        let mut matcher = Matcher::new(Options { depth: 0, ..Options::default() });
        assert_eq!(matcher.reply(&brain, &sort, manager.as_ref(), "u", "hi"), "Hello!");
    }
}
