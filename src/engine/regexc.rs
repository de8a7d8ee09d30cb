//! Message normalization and trigger-pattern-to-regex compilation (spec
//! §4.4).
//!
//! Patterns that embed session-dependent tags (`<bot>`, `<get>`, `<input>`,
//! `<reply>`) cannot be compiled once and reused forever — their expansion
//! depends on the session doing the matching. [`RegexCache`] only caches
//! patterns free of those tags; the rest are recompiled on every match
//! attempt, which is rare in practice (most triggers are static text).

use std::collections::HashMap;

use regex::Regex;

use crate::engine::brain::Brain;
use crate::session::SessionView;

/// Runtime knobs affecting normalization and compilation (spec §6
/// "Configuration options").
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub utf8: bool,
    pub unicode_punctuation: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { utf8: false, unicode_punctuation: r"[.,!?;:]".to_string() }
    }
}

/// Lower, substitute, then strip a user message or history entry (spec
/// §4.4 "The normalized message").
pub fn normalize(message: &str, brain: &Brain, sorted_subs: &[String], options: &CompileOptions) -> String {
    let mut text = message.to_lowercase();
    text = apply_word_substitutions(&text, brain, sorted_subs);
    strip_punctuation(&text, options)
}

fn apply_word_substitutions(text: &str, brain: &Brain, sorted_keys: &[String]) -> String {
    let mut out = text.to_string();
    for key in sorted_keys {
        let Some(value) = brain.sub.get(key) else { continue };
        let pattern = format!(r"\b{}\b", regex::escape(&key.to_lowercase()));
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, value.as_str()).into_owned();
        }
    }
    out
}

fn strip_punctuation(text: &str, options: &CompileOptions) -> String {
    if !options.utf8 {
        return text.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ' ').collect();
    }
    let punctuation = Regex::new(&options.unicode_punctuation).unwrap_or_else(|_| Regex::new(r"[.,!?;:]").unwrap());
    punctuation.replace_all(text, "").into_owned()
}

/// Lowers and strips `value` the same way a normalized message would be
/// (spec §4.4: tag substitutions "lowered and stripped").
fn normalize_tag_value(value: &str, options: &CompileOptions) -> String {
    strip_punctuation(&value.to_lowercase(), options)
}

const DYNAMIC_TAGS: [&str; 4] = ["<bot", "<get", "<input", "<reply"];

fn has_dynamic_tags(pattern: &str) -> bool {
    DYNAMIC_TAGS.iter().any(|tag| pattern.contains(tag))
}

/// Compiles one trigger pattern into an anchored regex (spec §4.4
/// "Rewrites"). `session` supplies `<get>`/`<input>`/`<reply>` values;
/// pass `None` when compiling the BEGIN-block sentinel (no session yet).
pub fn compile_pattern(pattern: &str, brain: &Brain, session: Option<SessionView<'_>>, options: &CompileOptions) -> Regex {
    let mut text = pattern.to_string();

    text = strip_weight_tag(&text);
    text = expand_array_refs(&text, brain);
    text = expand_context_tags(&text, brain, session, options);
    text = rewrite_optional_groups(&text, false);
    let body = rewrite_wildcards_and_literals(&text, pattern == "*");

    Regex::new(&format!("^{body}$")).unwrap_or_else(|_| Regex::new("^$").unwrap())
}

fn strip_weight_tag(pattern: &str) -> String {
    static WEIGHT_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"\s*\{weight=\d+\}\s*").unwrap());
    WEIGHT_RE.replace_all(pattern, " ").trim().to_string()
}

fn expand_array_refs(pattern: &str, brain: &Brain) -> String {
    static ARRAY_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"@(\w+)").unwrap());
    ARRAY_RE
        .replace_all(pattern, |caps: &regex::Captures| match brain.array.get(&caps[1]) {
            Some(items) if !items.is_empty() => format!("(?:{})", items.iter().map(|i| regex::escape(i)).collect::<Vec<_>>().join("|")),
            _ => String::new(),
        })
        .into_owned()
}

fn expand_context_tags(pattern: &str, brain: &Brain, session: Option<SessionView<'_>>, options: &CompileOptions) -> String {
    static BOT_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| Regex::new(r"<bot (\w+)>").unwrap());
    static GET_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| Regex::new(r"<get (\w+)>").unwrap());
    static HIST_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"<(input|reply)(\d*)>").unwrap());

    let mut text = BOT_RE
        .replace_all(pattern, |c: &regex::Captures| normalize_tag_value(&brain.get_var(&c[1]), options))
        .into_owned();

    text = GET_RE
        .replace_all(&text, |c: &regex::Captures| {
            let value = session.map(|s| s.get_var(&c[1])).unwrap_or_else(|| "undefined".to_string());
            normalize_tag_value(&value, options)
        })
        .into_owned();

    text = HIST_RE
        .replace_all(&text, |c: &regex::Captures| {
            let index: usize = c[2].parse().unwrap_or(1);
            let raw = match (session, &c[1]) {
                (Some(s), "input") => s.input_history(index),
                (Some(s), "reply") => s.reply_history(index),
                _ => "undefined".to_string(),
            };
            normalize_tag_value(&raw, options)
        })
        .into_owned();

    text
}

/// `[a|b|c]` → a non-capturing alternation that also tolerates its absence.
/// `nested` marks recursive calls made while expanding an alternative's own
/// wildcards, which must stay non-capturing (spec §4.4: "its inner
/// wildcards become non-capturing").
fn rewrite_optional_groups(pattern: &str, _nested: bool) -> String {
    let mut out = String::new();
    let mut chars = pattern.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '[' {
            if let Some(end) = find_matching_bracket(pattern, i) {
                let inner = &pattern[i + 1..end];
                let alts: Vec<String> = inner
                    .split('|')
                    .map(|alt| rewrite_wildcards_and_literals(&rewrite_optional_groups(alt, true), false))
                    .collect();
                out.push_str("(?:(?:\\s|\\b)+");
                out.push_str(&alts.join("(?:\\s|\\b)+|"));
                out.push_str("(?:\\s|\\b)+|(?:\\b|\\s)+)");
                for _ in i..=end {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn find_matching_bracket(pattern: &str, open: usize) -> Option<usize> {
    let bytes = pattern.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Final textual pass: escape everything that isn't already one of our
/// regex constructs, translating `* # _` per spec §4.4. `bare_star` is true
/// only when the *entire original trigger* was exactly `*`.
fn rewrite_wildcards_and_literals(text: &str, bare_star: bool) -> String {
    // Anything produced by earlier passes (`(?:...)`, `(?:\s|\b)+`, etc.) is
    // already valid regex syntax and must pass through untouched; only the
    // literal RiveScript syntax characters get rewritten here. We do this by
    // walking the string and recognizing already-expanded `(?:` groups.
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' if chars.peek() == Some(&'?') => {
                // Pass an already-built non-capturing group through verbatim.
                out.push(c);
                let mut depth = 1;
                for nc in chars.by_ref() {
                    out.push(nc);
                    match nc {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            '*' => {
                if bare_star {
                    out.push_str("(.*?)");
                } else {
                    out.push_str("(.+?)");
                }
            }
            '#' => out.push_str(r"(\d+?)"),
            '\\' if chars.peek() == Some(&'_') => {
                chars.next();
                out.push_str("_");
            }
            '_' => out.push_str("([A-Za-z]+?)"),
            ' ' => out.push(' '),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

/// Caches compiled regexes for trigger patterns that don't depend on
/// per-session tag values (spec §4.4).
#[derive(Debug, Default)]
pub struct RegexCache {
    cache: HashMap<String, Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        RegexCache::default()
    }

    pub fn get_or_compile(
        &mut self,
        pattern: &str,
        brain: &Brain,
        session: Option<SessionView<'_>>,
        options: &CompileOptions,
    ) -> Regex {
        if has_dynamic_tags(pattern) {
            return compile_pattern(pattern, brain, session, options);
        }
        if let Some(re) = self.cache.get(pattern) {
            return re.clone();
        }
        let re = compile_pattern(pattern, brain, session, options);
        self.cache.insert(pattern.to_string(), re.clone());
        re
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn empty_brain() -> Brain {
        Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()))
    }

    #[test]
    fn bare_star_matches_empty() {
        let brain = empty_brain();
        let re = compile_pattern("*", &brain, None, &CompileOptions::default());
        assert!(re.is_match(""));
    }

    #[test]
    fn star_inside_pattern_requires_at_least_one_char() {
        let brain = empty_brain();
        let re = compile_pattern("hello *", &brain, None, &CompileOptions::default());
        assert!(!re.is_match("hello "));
        assert!(re.is_match("hello world"));
    }

    #[test]
    fn numeric_wildcard_matches_digits_only() {
        let brain = empty_brain();
        let re = compile_pattern("i am # years old", &brain, None, &CompileOptions::default());
        assert!(re.is_match("i am 5 years old"));
        assert!(!re.is_match("i am five years old"));
    }

    #[test]
    fn array_reference_expands_to_alternation() {
        let mut brain = empty_brain();
        brain.array.insert("greek".to_string(), vec!["alpha".to_string(), "beta".to_string()]);
        let re = compile_pattern("pick @greek", &brain, None, &CompileOptions::default());
        assert!(re.is_match("pick alpha"));
        assert!(re.is_match("pick beta"));
        assert!(!re.is_match("pick gamma"));
    }

    #[test]
    fn normalize_strips_non_ascii_word_chars() {
        let brain = empty_brain();
        let out = normalize("Hello, World!!", &brain, &[], &CompileOptions::default());
        assert_eq!(out, "hello world");
    }
}
