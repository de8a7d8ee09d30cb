//! The line-oriented, stateful RiveScript source reader (spec §4.1).
//!
//! ## Line classification
//!
//! Each non-blank, non-comment line begins with a single command character
//! (or `//`) followed by whitespace and a payload: `!` definition, `>` label
//! open, `<` label close, `+` trigger, `-` reply, `%` previous, `^`
//! continuation, `@` redirect, `*` condition. `// ...` is a single-line
//! comment; `/* ... */` spans (whole) lines.
//!
//! ## Look-ahead
//!
//! The parser is a single forward pass with one piece of look-behind state:
//! `last_line_kind`, tracking what the most recently processed line was
//! "the last thing appendable to" (a trigger pattern, a `%Previous`, a
//! specific reply/condition, a redirect, or a `!` definition in progress).
//! `^` appends to whatever `last_line_kind` points at; `%` is only accepted
//! when it points at a freshly-opened trigger pattern, matching "a following
//! non-blank `%` attaches as that trigger's previous" (spec §4.1).
//!
//! `> object NAME LANG` switches the reader into verbatim mode: body lines
//! are collected exactly as written (not reparsed as commands, not stripped
//! of comments) until a line that is exactly `< object`.

use crate::ast::{self, BEGIN_TOPIC, DEFAULT_TOPIC};
use crate::error::{ParseError, ParseWarning};

/// File-local `! local concat` option governing how `^` continuation lines
/// join onto a trigger pattern (spec §4.1 "Look-ahead rules").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concat {
    #[default]
    None,
    Space,
    Newline,
}

impl Concat {
    fn delimiter(self) -> &'static str {
        match self {
            Concat::None => "",
            Concat::Space => " ",
            Concat::Newline => "\n",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Concat::None),
            "space" => Some(Concat::Space),
            "newline" => Some(Concat::Newline),
            _ => None,
        }
    }
}

/// What a subsequent `^` continuation line (or, for definitions, the
/// identity of the in-progress `!` line) should append to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LastLine {
    None,
    TriggerPattern,
    Previous,
    Reply(usize),
    Condition(usize),
    Redirect,
    Definition,
}

#[derive(Debug, Clone)]
struct PendingDefinition {
    kind: String,
    name: String,
    /// One entry per physical line contributing to this definition: the
    /// initial `! kind name = value` line's value, then one more per `^`
    /// continuation. Kept segmented (rather than eagerly joined) so that
    /// `! array` definitions can treat each continuation line as its own
    /// element list (spec §4.1 "Definitions").
    segments: Vec<String>,
}

/// The result of a parse: the built AST plus any non-strict warnings.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub root: ast::Root,
    pub warnings: Vec<ParseWarning>,
}

/// Turns a labeled sequence of source lines into an [`ast::Root`] (spec
/// §4.1). One `Parser` is built per file and consumed by [`Parser::parse`].
pub struct Parser {
    filename: String,
    strict: bool,
    force_case: bool,
}

impl Parser {
    pub fn new(filename: impl Into<String>, strict: bool, force_case: bool) -> Self {
        Parser { filename: filename.into(), strict, force_case }
    }

    /// Parse `lines` into a `Root`. In strict mode, the first structural
    /// violation aborts the parse; otherwise it is logged and skipped and
    /// collected into `ParseOutput::warnings`.
    pub fn parse(&self, lines: &[&str]) -> Result<ParseOutput, ParseError> {
        let mut state = ParseState::new(self);
        let mut in_block_comment = false;

        for (idx, raw_line) in lines.iter().enumerate() {
            let line_no = idx + 1;

            if let Some((name, language, code)) = state.in_object.as_mut() {
                if raw_line.trim() == "< object" {
                    let macro_ = ast::Macro { name: name.clone(), language: language.clone(), code: code.clone() };
                    state.root.objects.push(macro_);
                    state.in_object = None;
                } else {
                    code.push(raw_line.to_string());
                }
                continue;
            }

            if in_block_comment {
                if raw_line.contains("*/") {
                    in_block_comment = false;
                }
                continue;
            }

            let trimmed = raw_line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            if trimmed.starts_with("/*") {
                if !trimmed.contains("*/") {
                    in_block_comment = true;
                }
                continue;
            }

            state.process_line(line_no, trimmed)?;
        }

        state.finalize_pending_definition(lines.len())?;

        if state.in_object.is_some() {
            state.diagnostic(lines.len(), "unterminated object block (missing '< object')")?;
        }

        self.apply_force_case(&mut state.root);
        self.check_balanced_brackets(&mut state)?;
        self.check_triggers_produce_output(&mut state)?;

        Ok(ParseOutput { root: state.root, warnings: state.warnings })
    }

    fn apply_force_case(&self, root: &mut ast::Root) {
        if !self.force_case {
            return;
        }
        for topic in root.topics.values_mut() {
            for trigger in &mut topic.triggers {
                trigger.pattern = trigger.pattern.to_lowercase();
            }
        }
    }

    fn check_balanced_brackets(&self, state: &mut ParseState<'_>) -> Result<(), ParseError> {
        let mut offenders = Vec::new();
        for topic in state.root.topics.values() {
            for trigger in &topic.triggers {
                let opens = trigger.pattern.matches('[').count();
                let closes = trigger.pattern.matches(']').count();
                if opens != closes {
                    offenders.push(trigger.pattern.clone());
                }
            }
        }
        for pattern in offenders {
            state.diagnostic(0, format!("unbalanced optional brackets in trigger '{pattern}'"))?;
        }
        Ok(())
    }

    /// A trigger with no replies, redirect, or conditions can never produce
    /// output; strict mode rejects it (spec §9 "Open question").
    fn check_triggers_produce_output(&self, state: &mut ParseState<'_>) -> Result<(), ParseError> {
        let offenders: Vec<String> = state
            .root
            .topics
            .values()
            .flat_map(|topic| &topic.triggers)
            .filter(|trigger| !trigger.produces_output())
            .map(|trigger| trigger.pattern.clone())
            .collect();
        for pattern in offenders {
            state.diagnostic(0, format!("trigger '{pattern}' has no replies, redirect, or conditions"))?;
        }
        Ok(())
    }
}

struct ParseState<'p> {
    parser: &'p Parser,
    root: ast::Root,
    current_topic: String,
    in_object: Option<(String, String, Vec<String>)>,
    concat: Concat,
    last_line_kind: LastLine,
    pending_def: Option<PendingDefinition>,
    warnings: Vec<ParseWarning>,
}

impl<'p> ParseState<'p> {
    fn new(parser: &'p Parser) -> Self {
        let mut root = ast::Root::default();
        root.topic_mut(DEFAULT_TOPIC);
        ParseState {
            parser,
            root,
            current_topic: DEFAULT_TOPIC.to_string(),
            in_object: None,
            concat: Concat::default(),
            last_line_kind: LastLine::None,
            pending_def: None,
            warnings: Vec::new(),
        }
    }

    /// Record a diagnostic. In strict mode this aborts the parse; otherwise
    /// it is logged and appended to `warnings`.
    fn diagnostic(&mut self, line: usize, message: impl Into<String>) -> Result<(), ParseError> {
        let message = message.into();
        if self.parser.strict {
            return Err(ParseError::new(self.parser.filename.clone(), line, message));
        }
        log::warn!("{}:{}: {}", self.parser.filename, line, message);
        self.warnings.push(ParseWarning { file: self.parser.filename.clone(), line, message });
        Ok(())
    }

    fn process_line(&mut self, line_no: usize, trimmed: &str) -> Result<(), ParseError> {
        let cmd = trimmed.chars().next().unwrap();
        let payload = trimmed[cmd.len_utf8()..].trim();

        if !matches!(cmd, '!' | '>' | '<' | '+' | '-' | '%' | '^' | '@' | '*') {
            self.diagnostic(line_no, format!("unknown command letter '{cmd}'"))?;
            return Ok(());
        }

        if payload.is_empty() && cmd != '<' {
            self.diagnostic(line_no, format!("command '{cmd}' has an empty payload"))?;
            return Ok(());
        }

        if cmd != '^' {
            self.finalize_pending_definition(line_no)?;
        }

        match cmd {
            '!' => self.handle_definition(line_no, payload),
            '>' => self.handle_label_open(line_no, payload),
            '<' => Ok(()),
            '+' => self.handle_trigger(line_no, payload),
            '-' => self.handle_reply(line_no, payload),
            '%' => self.handle_previous(line_no, payload),
            '^' => self.handle_continuation(line_no, payload),
            '@' => self.handle_redirect(line_no, payload),
            '*' => self.handle_condition(line_no, payload),
            _ => unreachable!(),
        }
    }

    fn current_trigger_mut(&mut self) -> Option<&mut ast::Trigger> {
        self.root.topics.get_mut(&self.current_topic)?.triggers.last_mut()
    }

    fn handle_trigger(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        if self.parser.strict && !self.parser.force_case && payload.chars().any(|c| c.is_ascii_uppercase()) {
            self.diagnostic(line_no, format!("trigger '{payload}' contains uppercase letters in strict mode"))?;
        }
        let topic = self.root.topic_mut(&self.current_topic.clone());
        topic.triggers.push(ast::Trigger {
            pattern: payload.to_string(),
            replies: Vec::new(),
            conditions: Vec::new(),
            redirect: None,
            previous: None,
        });
        self.last_line_kind = LastLine::TriggerPattern;
        Ok(())
    }

    fn handle_reply(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        let Some(trigger) = self.current_trigger_mut() else {
            return self.diagnostic(line_no, "reply ('-') with no preceding '+' trigger");
        };
        trigger.replies.push(payload.to_string());
        let idx = trigger.replies.len() - 1;
        self.last_line_kind = LastLine::Reply(idx);
        Ok(())
    }

    fn handle_previous(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        if self.last_line_kind != LastLine::TriggerPattern {
            return self.diagnostic(line_no, "'%Previous' must directly follow a '+' trigger");
        }
        let Some(trigger) = self.current_trigger_mut() else {
            return self.diagnostic(line_no, "'%Previous' with no preceding '+' trigger");
        };
        trigger.previous = Some(payload.to_string());
        self.last_line_kind = LastLine::Previous;
        Ok(())
    }

    fn handle_redirect(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        let Some(trigger) = self.current_trigger_mut() else {
            return self.diagnostic(line_no, "redirect ('@') with no preceding '+' trigger");
        };
        trigger.redirect = Some(payload.to_string());
        self.last_line_kind = LastLine::Redirect;
        Ok(())
    }

    fn handle_condition(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        let Some(trigger) = self.current_trigger_mut() else {
            return self.diagnostic(line_no, "condition ('*') with no preceding '+' trigger");
        };
        trigger.conditions.push(payload.to_string());
        let idx = trigger.conditions.len() - 1;
        self.last_line_kind = LastLine::Condition(idx);
        Ok(())
    }

    fn handle_continuation(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        match self.last_line_kind.clone() {
            LastLine::TriggerPattern => {
                let delim = self.concat.delimiter();
                if let Some(trigger) = self.current_trigger_mut() {
                    trigger.pattern.push_str(delim);
                    trigger.pattern.push_str(payload);
                }
                Ok(())
            }
            LastLine::Previous => {
                let delim = self.concat.delimiter();
                if let Some(trigger) = self.current_trigger_mut() {
                    if let Some(previous) = trigger.previous.as_mut() {
                        previous.push_str(delim);
                        previous.push_str(payload);
                    }
                }
                Ok(())
            }
            LastLine::Reply(i) => {
                if let Some(trigger) = self.current_trigger_mut() {
                    if let Some(reply) = trigger.replies.get_mut(i) {
                        reply.push_str(payload);
                    }
                }
                Ok(())
            }
            LastLine::Condition(i) => {
                if let Some(trigger) = self.current_trigger_mut() {
                    if let Some(cond) = trigger.conditions.get_mut(i) {
                        cond.push_str(payload);
                    }
                }
                Ok(())
            }
            LastLine::Redirect => {
                if let Some(trigger) = self.current_trigger_mut() {
                    if let Some(redirect) = trigger.redirect.as_mut() {
                        redirect.push_str(payload);
                    }
                }
                Ok(())
            }
            LastLine::Definition => {
                if let Some(def) = self.pending_def.as_mut() {
                    def.segments.push(payload.to_string());
                }
                Ok(())
            }
            LastLine::None => self.diagnostic(line_no, "'^' continuation with nothing preceding it to continue"),
        }
    }

    fn handle_label_open(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        let mut tokens = payload.split_whitespace();
        let Some(kind) = tokens.next() else {
            return self.diagnostic(line_no, "label open ('>') with no label type");
        };

        self.last_line_kind = LastLine::None;

        match kind {
            "begin" => {
                self.current_topic = BEGIN_TOPIC.to_string();
                self.root.topic_mut(BEGIN_TOPIC);
                Ok(())
            }
            "topic" => {
                let Some(name) = tokens.next() else {
                    return self.diagnostic(line_no, "'> topic' with no name");
                };
                let mut includes = Vec::new();
                let mut inherits = Vec::new();
                let mut collecting: Option<&mut Vec<String>> = None;
                for tok in tokens {
                    match tok {
                        "includes" => collecting = Some(&mut includes),
                        "inherits" => collecting = Some(&mut inherits),
                        other => {
                            if let Some(list) = collecting.as_deref_mut() {
                                list.push(other.to_string());
                            }
                        }
                    }
                }
                self.current_topic = name.to_string();
                let topic = self.root.topic_mut(name);
                topic.includes.extend(includes);
                topic.inherits.extend(inherits);
                Ok(())
            }
            "object" => {
                let Some(name) = tokens.next() else {
                    return self.diagnostic(line_no, "'> object' with no name");
                };
                let language = tokens.next().unwrap_or("").to_string();
                self.in_object = Some((name.to_string(), language, Vec::new()));
                Ok(())
            }
            other => self.diagnostic(line_no, format!("unknown label type '{other}'")),
        }
    }

    fn handle_definition(&mut self, line_no: usize, payload: &str) -> Result<(), ParseError> {
        let (left, right) = match payload.split_once('=') {
            Some((l, r)) => (l.trim(), r.trim()),
            None => (payload.trim(), ""),
        };
        let (kind, name) = match left.split_once(char::is_whitespace) {
            Some((k, n)) => (k, n.trim()),
            None => (left, ""),
        };

        match kind {
            "version" => {
                let version: f64 = right.parse().unwrap_or(0.0);
                if version > 2.0 {
                    return Err(ParseError::new(
                        self.parser.filename.clone(),
                        line_no,
                        format!("unsupported RiveScript version {right} (max supported is 2.0)"),
                    ));
                }
                self.last_line_kind = LastLine::None;
                Ok(())
            }
            "local" => {
                if name == "concat" {
                    match Concat::parse(right) {
                        Some(concat) => self.concat = concat,
                        None => return self.diagnostic(line_no, format!("unknown concat mode '{right}'")),
                    }
                } else {
                    self.diagnostic(line_no, format!("unknown local option '{name}'"))?;
                }
                self.last_line_kind = LastLine::None;
                Ok(())
            }
            "global" | "var" | "sub" | "person" | "array" => {
                self.pending_def = Some(PendingDefinition {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    segments: vec![right.to_string()],
                });
                self.last_line_kind = LastLine::Definition;
                Ok(())
            }
            other => self.diagnostic(line_no, format!("unknown definition type '{other}'")),
        }
    }

    fn finalize_pending_definition(&mut self, line_no: usize) -> Result<(), ParseError> {
        let Some(def) = self.pending_def.take() else {
            return Ok(());
        };
        self.last_line_kind = LastLine::None;

        if def.name.is_empty() {
            return self.diagnostic(line_no, format!("'! {}' with no name", def.kind));
        }

        match def.kind.as_str() {
            "array" => {
                let elements = finalize_array_segments(&def.segments);
                if elements.len() == 1 && elements[0] == "<undef>" {
                    self.root.begin.array.insert(def.name, None);
                } else {
                    self.root.begin.array.insert(def.name, Some(elements));
                }
            }
            "global" | "var" | "sub" | "person" => {
                let value = def.segments.join(" ").trim().to_string();
                let entry = if value == "<undef>" { None } else { Some(value) };
                match def.kind.as_str() {
                    "global" => self.root.begin.global.insert(def.name, entry),
                    "var" => self.root.begin.var.insert(def.name, entry),
                    "sub" => self.root.begin.sub.insert(def.name, entry),
                    "person" => self.root.begin.person.insert(def.name, entry),
                    _ => unreachable!(),
                };
            }
            _ => unreachable!("pending definitions are only created for known kinds"),
        }
        Ok(())
    }
}

fn finalize_array_segments(segments: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for seg in segments {
        if seg.contains('|') {
            out.extend(seg.split('|').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
        } else {
            out.extend(seg.split_whitespace().map(|s| s.to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> ParseOutput {
        Parser::new("test.rive", true, false).parse(lines).expect("parse should succeed")
    }

    #[test]
    fn simple_trigger_and_reply() {
        let out = parse(&["+ hello bot", "- Hello, human!"]);
        let topic = &out.root.topics[DEFAULT_TOPIC];
        assert_eq!(topic.triggers.len(), 1);
        assert_eq!(topic.triggers[0].pattern, "hello bot");
        assert_eq!(topic.triggers[0].replies, vec!["Hello, human!"]);
    }

    #[test]
    fn previous_binds_to_the_trigger_before_any_reply() {
        let out = parse(&["+ *", "% who is there", "- <sentence> who?"]);
        let trigger = &out.root.topics[DEFAULT_TOPIC].triggers[0];
        assert_eq!(trigger.previous.as_deref(), Some("who is there"));
    }

    #[test]
    fn previous_after_a_reply_is_a_strict_error() {
        let err = Parser::new("t.rive", true, false)
            .parse(&["+ *", "- reply", "% who is there"])
            .unwrap_err();
        assert!(err.message.contains("%Previous"));
    }

    #[test]
    fn continuation_appends_with_configured_concat() {
        let out = parse(&["! local concat = space", "+ hello", "^ world", "- hi"]);
        assert_eq!(out.root.topics[DEFAULT_TOPIC].triggers[0].pattern, "hello world");
    }

    #[test]
    fn continuation_default_is_no_delimiter() {
        let out = parse(&["+ hello", "^ world", "- hi"]);
        assert_eq!(out.root.topics[DEFAULT_TOPIC].triggers[0].pattern, "helloworld");
    }

    #[test]
    fn topic_includes_and_inherits() {
        let out = parse(&[
            "> topic parent",
            "+ a",
            "- b",
            "< topic",
            "> topic child includes parent inherits grandparent",
            "+ c",
            "- d",
            "< topic",
        ]);
        let child = &out.root.topics["child"];
        assert!(child.includes.contains("parent"));
        assert!(child.inherits.contains("grandparent"));
    }

    #[test]
    fn object_block_is_collected_verbatim() {
        let out = parse(&["> object greet rust", "// not a comment in here", "+ fake trigger line", "< object"]);
        assert_eq!(out.root.objects.len(), 1);
        assert_eq!(out.root.objects[0].name, "greet");
        assert_eq!(out.root.objects[0].language, "rust");
        assert_eq!(out.root.objects[0].code, vec!["// not a comment in here", "+ fake trigger line"]);
    }

    #[test]
    fn array_definition_splits_on_pipe_or_whitespace() {
        let out = parse(&["! array colors = red blue green"]);
        assert_eq!(out.root.begin.array["colors"], Some(vec!["red".into(), "blue".into(), "green".into()]));
    }

    #[test]
    fn array_definition_over_continuation_lines() {
        let out = parse(&["! array colors = red", "^ blue|green"]);
        assert_eq!(out.root.begin.array["colors"], Some(vec!["red".into(), "blue".into(), "green".into()]));
    }

    #[test]
    fn undef_deletes_a_global() {
        let out = parse(&["! global debug = 1", "! global debug = <undef>"]);
        assert_eq!(out.root.begin.global["debug"], None);
    }

    #[test]
    fn version_above_two_fails_even_non_strict() {
        let err = Parser::new("t.rive", false, false).parse(&["! version = 2.1"]).unwrap_err();
        assert!(err.message.contains("version"));
    }

    #[test]
    fn unknown_command_is_a_warning_in_non_strict_mode() {
        let out = Parser::new("t.rive", false, false).parse(&["~ weird line", "+ hi", "- there"]).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.root.topics[DEFAULT_TOPIC].triggers.len(), 1);
    }

    #[test]
    fn force_case_lowercases_patterns_after_parsing() {
        let out = Parser::new("t.rive", true, true).parse(&["+ Hello Bot", "- hi"]).unwrap();
        assert_eq!(out.root.topics[DEFAULT_TOPIC].triggers[0].pattern, "hello bot");
    }

    #[test]
    fn reply_without_trigger_is_a_strict_error() {
        let err = Parser::new("t.rive", true, false).parse(&["- stray reply"]).unwrap_err();
        assert!(err.message.contains("trigger"));
    }

    #[test]
    fn trigger_with_no_output_is_a_strict_error() {
        let err = Parser::new("t.rive", true, false).parse(&["+ hello"]).unwrap_err();
        assert!(err.message.contains("no replies"));
    }

    #[test]
    fn trigger_with_no_output_is_a_warning_in_non_strict_mode() {
        let out = Parser::new("t.rive", false, false).parse(&["+ hello"]).unwrap();
        assert_eq!(out.warnings.len(), 1);
    }
}
