//! Tag and shortcut expansion applied to a winning reply (spec §4.5 "Tag
//! expansion").
//!
//! Nesting resolves inside-out: the innermost `<…>`/`{…}` is expanded first,
//! then expansion re-scans the result, until a pass produces no further
//! change or a safety bound is hit (protects against a pathological
//! `{!…}` macro re-injecting itself forever).

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::engine::brain::Brain;
use crate::engine::regexc::CompileOptions;
use crate::session::SessionView;

const MAX_EXPANSION_PASSES: u32 = 50;

/// Everything a reply's tags might need to read or write (spec §4.5's tag
/// table). `stars`/`botstars` are 1-indexed in the table but stored 0-based
/// here; [`star`] does the translation.
pub struct TagContext<'a> {
    pub user: &'a str,
    pub brain: &'a Brain,
    pub session: SessionView<'a>,
    pub stars: &'a [String],
    pub botstars: &'a [String],
    pub options: &'a CompileOptions,
    /// Set by `{topic=NAME}`; read by the caller after expansion completes.
    pub redirect: Option<String>,
}

fn star<'a>(stars: &'a [String], index: usize) -> &'a str {
    let index = index.max(1);
    stars.get(index - 1).map(|s| s.as_str()).unwrap_or("undefined")
}

/// Shortcut rewrites applied before the main tag pass (spec §4.5 "Shortcut
/// rewrites").
fn apply_shortcuts(text: &str) -> String {
    static SHORTCUTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
        vec![
            (Regex::new(r"<person>").unwrap(), "{person}<star>{/person}"),
            (Regex::new(r"<@>").unwrap(), "{@<star>}"),
            (Regex::new(r"<formal>").unwrap(), "{formal}<star>{/formal}"),
            (Regex::new(r"<sentence>").unwrap(), "{sentence}<star>{/sentence}"),
            (Regex::new(r"<uppercase>").unwrap(), "{uppercase}<star>{/uppercase}"),
            (Regex::new(r"<lowercase>").unwrap(), "{lowercase}<star>{/lowercase}"),
        ]
    });
    let mut out = text.to_string();
    for (re, replacement) in SHORTCUTS.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn apply_formal(text: &str) -> String {
    text.split(' ').map(title_case).collect::<Vec<_>>().join(" ")
}

fn apply_sentence(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn apply_person(text: &str, brain: &Brain, sorted_person_keys: &[String]) -> String {
    let mut out = text.to_string();
    for key in sorted_person_keys {
        let Some(value) = brain.person.get(key) else { continue };
        let pattern = format!(r"\b{}\b", regex::escape(key));
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, value.as_str()).into_owned();
        }
    }
    out
}

/// Result of one [`expand`] call: the fully expanded reply text, plus any
/// `{@target}`/`<@>` inline redirect the caller must follow (spec §4.5
/// step 7/8 interplay — an inline redirect re-enters the reply engine
/// before tag expansion of the *outer* reply is considered final).
pub struct Expansion {
    pub text: String,
    pub redirect: Option<String>,
}

/// Expand all tags in `text` (spec §4.5 "Tag expansion"). `call_object` lets
/// the matcher thread `<call>` dispatch through the macro registry without
/// this module depending on it directly.
pub fn expand(text: &str, ctx: &mut TagContext<'_>, sorted_person_keys: &[String], call_object: &dyn Fn(&str, &[String]) -> String) -> Expansion {
    let mut text = apply_shortcuts(text);
    let mut redirect = None;

    for _ in 0..MAX_EXPANSION_PASSES {
        let before = text.clone();
        text = expand_once(&text, ctx, sorted_person_keys, call_object, &mut redirect);
        if text == before {
            break;
        }
    }

    Expansion { text, redirect }
}

fn expand_once(
    text: &str,
    ctx: &mut TagContext<'_>,
    sorted_person_keys: &[String],
    call_object: &dyn Fn(&str, &[String]) -> String,
    redirect: &mut Option<String>,
) -> String {
    let text = expand_braced(text, ctx, sorted_person_keys, redirect);
    expand_angled(&text, ctx, call_object)
}

static INNERMOST_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z@!][^{}]*)\}").unwrap());

fn expand_braced(text: &str, ctx: &mut TagContext<'_>, sorted_person_keys: &[String], redirect: &mut Option<String>) -> String {
    INNERMOST_BRACE
        .replace_all(text, |caps: &regex::Captures| expand_brace_tag(&caps[1], ctx, sorted_person_keys, redirect))
        .into_owned()
}

fn expand_brace_tag(inner: &str, ctx: &mut TagContext<'_>, sorted_person_keys: &[String], redirect: &mut Option<String>) -> String {
    if let Some(choices) = inner.strip_prefix("random}").and_then(|s| s.strip_suffix("{/random")) {
        return pick_random(choices);
    }
    if let Some(body) = inner.strip_prefix("formal}").and_then(|s| s.strip_suffix("{/formal")) {
        return apply_formal(body);
    }
    if let Some(body) = inner.strip_prefix("sentence}").and_then(|s| s.strip_suffix("{/sentence")) {
        return apply_sentence(body);
    }
    if let Some(body) = inner.strip_prefix("uppercase}").and_then(|s| s.strip_suffix("{/uppercase")) {
        return body.to_uppercase();
    }
    if let Some(body) = inner.strip_prefix("lowercase}").and_then(|s| s.strip_suffix("{/lowercase")) {
        return body.to_lowercase();
    }
    if let Some(body) = inner.strip_prefix("person}").and_then(|s| s.strip_suffix("{/person")) {
        return apply_person(body, ctx.brain, sorted_person_keys);
    }
    if let Some(name) = inner.strip_prefix("topic=") {
        ctx.session.set_topic(name.to_string());
        return String::new();
    }
    if let Some(target) = inner.strip_prefix('@') {
        *redirect = Some(target.to_string());
        return String::new();
    }
    if let Some(source) = inner.strip_prefix('!') {
        log::debug!("ignoring runtime script injection tag for user '{}': {source}", ctx.user);
        return String::new();
    }
    format!("{{{inner}}}")
}

fn pick_random(choices: &str) -> String {
    let options: Vec<&str> = choices.split('|').collect();
    let mut rng = rand::thread_rng();
    options.choose(&mut rng).copied().unwrap_or("").to_string()
}

static ARRAY_EXPAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(@(\w+)\)").unwrap());
static ANGLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([a-zA-Z]+)(?:\s+([^>]*))?>").unwrap());
static CALL_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<call>\s*(\S+)([^<]*)</call>").unwrap());

fn expand_angled(text: &str, ctx: &mut TagContext<'_>, call_object: &dyn Fn(&str, &[String]) -> String) -> String {
    let text = ARRAY_EXPAND
        .replace_all(text, |caps: &regex::Captures| match ctx.brain.array.get(&caps[1]) {
            Some(items) if !items.is_empty() => format!("{{random}}{}{{/random}}", items.join("|")),
            _ => caps[0].to_string(),
        })
        .into_owned();

    let text = CALL_TAG
        .replace_all(&text, |caps: &regex::Captures| {
            let name = caps[1].trim();
            let args: Vec<String> = caps[2].split_whitespace().map(|s| s.to_string()).collect();
            call_object(name, &args)
        })
        .into_owned();

    ANGLE_TAG
        .replace_all(&text, |caps: &regex::Captures| expand_angle_tag(&caps[1], caps.get(2).map(|m| m.as_str()), ctx))
        .into_owned()
}

fn expand_angle_tag(name: &str, arg: Option<&str>, ctx: &mut TagContext<'_>) -> String {
    match name {
        "star" => star(ctx.stars, 1).to_string(),
        _ if name.starts_with("star") && name[4..].chars().all(|c| c.is_ascii_digit()) && name.len() > 4 => {
            star(ctx.stars, name[4..].parse().unwrap_or(1)).to_string()
        }
        "botstar" => star(ctx.botstars, 1).to_string(),
        _ if name.starts_with("botstar") && name[7..].chars().all(|c| c.is_ascii_digit()) && name.len() > 7 => {
            star(ctx.botstars, name[7..].parse().unwrap_or(1)).to_string()
        }
        "input" => ctx.session.input_history(1),
        _ if name.starts_with("input") && name[5..].chars().all(|c| c.is_ascii_digit()) && name.len() > 5 => {
            ctx.session.input_history(name[5..].parse().unwrap_or(1))
        }
        "reply" => ctx.session.reply_history(1),
        _ if name.starts_with("reply") && name[5..].chars().all(|c| c.is_ascii_digit()) && name.len() > 5 => {
            ctx.session.reply_history(name[5..].parse().unwrap_or(1))
        }
        "id" => ctx.user.to_string(),
        "bot" => expand_kv_tag(arg, |name| ctx.brain.get_var(name), Some(|name: &str, value: &str| ctx.brain.set_var(name, value))),
        "env" => expand_kv_tag(arg, |name| ctx.brain.get_global(name), Some(|name: &str, value: &str| ctx.brain.set_global(name, value))),
        "get" => expand_kv_tag(arg, |name| ctx.session.get_var(name), Some(|name: &str, value: &str| ctx.session.set_var(name, value))),
        "set" => expand_set_tag(arg, ctx.session),
        "add" | "sub" | "mult" | "div" => expand_math_tag(name, arg, ctx.session),
        _ => {
            let arg_part = arg.map(|a| format!(" {a}")).unwrap_or_default();
            format!("<{name}{arg_part}>")
        }
    }
}

fn expand_kv_tag(arg: Option<&str>, reader: impl Fn(&str) -> String, setter: Option<impl Fn(&str, &str)>) -> String {
    let Some(arg) = arg else { return String::new() };
    if let Some((name, value)) = arg.split_once('=') {
        if let Some(setter) = setter {
            setter(name.trim(), value.trim());
        }
        String::new()
    } else {
        reader(arg.trim())
    }
}

fn expand_set_tag(arg: Option<&str>, session: SessionView<'_>) -> String {
    let Some(arg) = arg else { return String::new() };
    if let Some((name, value)) = arg.split_once('=') {
        session.set_var(name.trim(), value.trim());
    }
    String::new()
}

fn expand_math_tag(op: &str, arg: Option<&str>, session: SessionView<'_>) -> String {
    let Some(arg) = arg else { return String::new() };
    let Some((name, delta_str)) = arg.split_once('=') else { return String::new() };
    let name = name.trim();
    let delta_str = delta_str.trim();

    let Ok(delta) = delta_str.parse::<i64>() else {
        return format!("[ERR: Math can't \"{op}\" non-numeric value \"{delta_str}\"]");
    };
    let current_value = session.get_var(name);
    let current: i64 = match current_value.as_str() {
        "undefined" => 0,
        value => match value.parse() {
            Ok(v) => v,
            Err(_) => return format!("[ERR: Math can't \"{op}\" non-numeric value \"{value}\"]"),
        },
    };

    let result = match op {
        "add" => current + delta,
        "sub" => current - delta,
        "mult" => current * delta,
        "div" => {
            if delta == 0 {
                return "[ERR: Can't divide by zero!]".to_string();
            }
            current / delta
        }
        _ => unreachable!(),
    };
    session.set_var(name, result.to_string());
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionManager, SessionManager};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx<'a>(brain: &'a Brain, manager: &'a InMemorySessionManager, stars: &'a [String]) -> TagContext<'a> {
        manager.init("u");
        TagContext {
            user: "u",
            brain,
            session: SessionView::new("u", manager),
            stars,
            botstars: &[],
            options: Box::leak(Box::new(CompileOptions::default())),
            redirect: None,
        }
    }

    fn noop_call(_: &str, _: &[String]) -> String {
        "[ERR: Object Not Found]".to_string()
    }

    #[test]
    fn star_tag_reads_capture() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec!["world".to_string()];
        let mut context = ctx(&brain, &manager, &stars);
        let out = expand("hello <star>", &mut context, &[], &noop_call);
        assert_eq!(out.text, "hello world");
    }

    #[test]
    fn math_add_initializes_from_zero() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let out = expand("<add points=5>", &mut context, &[], &noop_call);
        assert_eq!(out.text, "");
        assert_eq!(context.session.get_var("points"), "5");
    }

    #[test]
    fn div_by_zero_is_an_inline_error() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        manager.init("u");
        manager.set("u", HashMap::from([("points".to_string(), "10".to_string())]));
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let out = expand("<div points=0>", &mut context, &[], &noop_call);
        assert_eq!(out.text, "[ERR: Can't divide by zero!]");
    }

    #[test]
    fn topic_tag_sets_session_topic_and_emits_nothing() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let out = expand("ok{topic=weather}", &mut context, &[], &noop_call);
        assert_eq!(out.text, "ok");
        assert_eq!(context.session.topic(), "weather");
    }

    #[test]
    fn call_tag_dispatches_through_the_provided_closure() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let out = expand("<call>greet bob</call>", &mut context, &[], &|name, args| format!("{name}:{}", args.join(",")));
        assert_eq!(out.text, "greet:bob");
    }

    #[test]
    fn unrecognized_tag_is_preserved() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let out = expand("<unknowntag>", &mut context, &[], &noop_call);
        assert_eq!(out.text, "<unknowntag>");
    }

    #[test]
    fn bot_tag_set_form_mutates_the_shared_brain_and_read_form_sees_it() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let set = expand("<bot name=Rive>", &mut context, &[], &noop_call);
        assert_eq!(set.text, "");
        assert_eq!(brain.get_var("name"), "Rive");
        let get = expand("<bot name>", &mut context, &[], &noop_call);
        assert_eq!(get.text, "Rive");
    }

    #[test]
    fn env_tag_set_form_mutates_the_shared_brain_and_read_form_sees_it() {
        let brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let manager = InMemorySessionManager::new();
        let stars = vec![];
        let mut context = ctx(&brain, &manager, &stars);
        let set = expand("<env depends=nothing>", &mut context, &[], &noop_call);
        assert_eq!(set.text, "");
        assert_eq!(brain.get_global("depends"), "nothing");
        let get = expand("<env depends>", &mut context, &[], &noop_call);
        assert_eq!(get.text, "nothing");
    }
}
