//! Deterministic trigger ordering (spec §4.3).
//!
//! The sort order is a contract the matcher depends on, not an
//! implementation detail: for a fixed brain, [`sort_brain`] must always
//! produce the same [`SortBuffer`] (spec §8 "Idempotence").
//!
//! Classification reuses the coarse feature-flag idiom used elsewhere in
//! this engine for quick pattern triage, just computed over trigger
//! patterns instead of raw input text.

use std::collections::BTreeMap;

use crate::ast::{self, Trigger};
use crate::engine::brain::Brain;

bitflags::bitflags! {
    /// Coarse lexical features of a trigger pattern, used to pick the kind
    /// bucket it sorts into (spec §4.3 "Kind classification").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PatternFeatures: u8 {
        const ALPHA_WILD   = 1 << 0; // contains `_`
        const NUMBER_WILD  = 1 << 1; // contains `#`
        const GENERIC_WILD = 1 << 2; // contains `*`
        const OPTIONAL     = 1 << 3; // contains `[`
    }
}

impl PatternFeatures {
    pub fn scan(pattern: &str) -> Self {
        let mut features = PatternFeatures::empty();
        if pattern.contains('_') {
            features |= PatternFeatures::ALPHA_WILD;
        }
        if pattern.contains('#') {
            features |= PatternFeatures::NUMBER_WILD;
        }
        if pattern.contains('*') {
            features |= PatternFeatures::GENERIC_WILD;
        }
        if pattern.contains('[') {
            features |= PatternFeatures::OPTIONAL;
        }
        features
    }
}

/// The kind bucket a trigger's pattern falls into, in the disambiguating
/// order spec §4.3 defines (first match wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Atomic,
    Option,
    Alpha,
    Number,
    Wild,
    Under,
    Pound,
    Star,
}

const KIND_EMISSION_ORDER: [Kind; 8] =
    [Kind::Atomic, Kind::Option, Kind::Alpha, Kind::Number, Kind::Wild, Kind::Under, Kind::Pound, Kind::Star];

fn classify(pattern: &str) -> Kind {
    let trimmed = pattern.trim();
    if trimmed == "_" {
        return Kind::Under;
    }
    if trimmed == "#" {
        return Kind::Pound;
    }
    if trimmed == "*" {
        return Kind::Star;
    }
    let features = PatternFeatures::scan(pattern);
    if features.contains(PatternFeatures::ALPHA_WILD) {
        Kind::Alpha
    } else if features.contains(PatternFeatures::NUMBER_WILD) {
        Kind::Number
    } else if features.contains(PatternFeatures::GENERIC_WILD) {
        Kind::Wild
    } else if features.contains(PatternFeatures::OPTIONAL) {
        Kind::Option
    } else {
        Kind::Atomic
    }
}

/// Non-whitespace tokens, excluding bare wildcard/separator symbols (spec
/// §4.3 "Within a kind").
fn word_count(pattern: &str) -> usize {
    pattern
        .split_whitespace()
        .filter(|tok| !matches!(*tok, "*" | "#" | "_" | "|" | "["))
        .count()
}

/// `{weight=N}`, default 0 (spec §4.3 "Weight bucket", §4.5 step 7).
pub(crate) fn weight_of(pattern: &str) -> i64 {
    static WEIGHT_RE: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"\{weight=(\d+)\}").unwrap());
    WEIGHT_RE.captures(pattern).and_then(|c| c[1].parse().ok()).unwrap_or(0)
}

/// One entry in a sorted search order (spec §3 "SortBuffer").
#[derive(Debug, Clone)]
pub struct SortedEntry {
    pub pattern: String,
    pub original_trigger: Trigger,
}

/// The per-topic search orders the matcher walks (spec §3 "SortBuffer",
/// §4.3 "Emission order").
#[derive(Debug, Clone, Default)]
pub struct SortBuffer {
    pub topics: BTreeMap<String, Vec<SortedEntry>>,
    pub thats: BTreeMap<String, Vec<SortedEntry>>,
    pub sub: Vec<String>,
    pub person: Vec<String>,
}

/// `band = None` is the topic's own triggers and everything reached via
/// `includes` (equal priority); `band = Some(n)` is `n` `inherits` hops deep
/// (spec §4.3 "Topic closure"). Per spec, the `None` band sorts *after*
/// every numbered band, despite otherwise reading as "ascending N first".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Band {
    Numbered(u32),
    Own,
}

struct ClosureEntry {
    trigger: Trigger,
    band: Band,
}

fn closure(
    brain: &Brain,
    topic_name: &str,
    band: Band,
    depth_remaining: u32,
    visiting: &mut Vec<String>,
    depth_exceeded: &mut bool,
) -> Vec<ClosureEntry> {
    if depth_remaining == 0 {
        *depth_exceeded = true;
        return Vec::new();
    }
    if visiting.contains(&topic_name.to_string()) {
        return Vec::new();
    }
    let Some(topic) = brain.topic(topic_name) else {
        return Vec::new();
    };
    visiting.push(topic_name.to_string());

    let mut out: Vec<ClosureEntry> = topic
        .triggers
        .iter()
        .cloned()
        .map(|trigger| ClosureEntry { trigger, band })
        .collect();

    for included in &topic.includes {
        out.extend(closure(brain, included, band, depth_remaining - 1, visiting, depth_exceeded));
    }

    let next_band = match band {
        Band::Own => Band::Numbered(0),
        Band::Numbered(n) => Band::Numbered(n + 1),
    };
    for inherited in &topic.inherits {
        out.extend(closure(brain, inherited, next_band, depth_remaining - 1, visiting, depth_exceeded));
    }

    visiting.pop();
    out
}

fn sort_kind_group(mut entries: Vec<ClosureEntry>) -> Vec<ClosureEntry> {
    entries.sort_by(|a, b| {
        let wc_a = word_count(&a.trigger.pattern);
        let wc_b = word_count(&b.trigger.pattern);
        let len_a = a.trigger.pattern.len();
        let len_b = b.trigger.pattern.len();
        wc_b.cmp(&wc_a).then(len_b.cmp(&len_a))
    });
    entries
}

/// Sort one topic's closure (either the `previous`-bearing triggers or the
/// plain ones, per `want_previous`) into emission order (spec §4.3).
fn sort_topic_pass(brain: &Brain, topic_name: &str, depth: u32, want_previous: bool) -> Vec<SortedEntry> {
    let mut visiting = Vec::new();
    let mut depth_exceeded = false;
    let all = closure(brain, topic_name, Band::Own, depth, &mut visiting, &mut depth_exceeded);
    if depth_exceeded {
        log::warn!("topic '{topic_name}': inheritance/include depth exceeded {depth}; using partial closure");
    }

    let mut by_weight_band: BTreeMap<(std::cmp::Reverse<i64>, Band), Vec<ClosureEntry>> = BTreeMap::new();
    for entry in all {
        if entry.trigger.previous.is_some() != want_previous {
            continue;
        }
        let weight = weight_of(&entry.trigger.pattern);
        by_weight_band.entry((std::cmp::Reverse(weight), entry.band)).or_default().push(entry);
    }

    let mut out = Vec::new();
    for (_, band_entries) in by_weight_band {
        let mut by_kind: BTreeMap<Kind, Vec<ClosureEntry>> = BTreeMap::new();
        for entry in band_entries {
            by_kind.entry(classify(&entry.trigger.pattern)).or_default().push(entry);
        }
        for kind in KIND_EMISSION_ORDER {
            if let Some(entries) = by_kind.remove(&kind) {
                for entry in sort_kind_group(entries) {
                    out.push(SortedEntry { pattern: entry.trigger.pattern.clone(), original_trigger: entry.trigger });
                }
            }
        }
    }
    out
}

fn sort_word_list(mut keys: Vec<String>) -> Vec<String> {
    keys.sort_by(|a, b| word_count(b).cmp(&word_count(a)).then(b.len().cmp(&a.len())));
    keys
}

/// Build a fresh [`SortBuffer`] from `brain` (spec §4.3). `depth` bounds
/// `includes`/`inherits` recursion (spec §5, default 50).
pub fn sort_brain(brain: &Brain, depth: u32) -> SortBuffer {
    let mut buffer = SortBuffer::default();
    for topic_name in brain.topics.keys() {
        if topic_name == ast::BEGIN_TOPIC {
            continue;
        }
        buffer.topics.insert(topic_name.clone(), sort_topic_pass(brain, topic_name, depth, false));
        buffer.thats.insert(topic_name.clone(), sort_topic_pass(brain, topic_name, depth, true));
    }
    // The begin topic is still matched against (spec §4.5 step 2), so it
    // needs its own sort buffer entry even though it's excluded from the
    // regular topic-sort bookkeeping above.
    if brain.topic(ast::BEGIN_TOPIC).is_some() {
        buffer.topics.insert(ast::BEGIN_TOPIC.to_string(), sort_topic_pass(brain, ast::BEGIN_TOPIC, depth, false));
        buffer.thats.insert(ast::BEGIN_TOPIC.to_string(), sort_topic_pass(brain, ast::BEGIN_TOPIC, depth, true));
    }

    buffer.sub = sort_word_list(brain.sub.keys().cloned().collect());
    buffer.person = sort_word_list(brain.person.keys().cloned().collect());
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::Parser;
    use std::sync::Arc;

    fn brain_from(lines: &[&str]) -> Brain {
        let mut brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        let root = Parser::new("t.rive", true, false).parse(lines).unwrap().root;
        brain.merge(root).unwrap();
        brain
    }

    #[test]
    fn atomic_before_wildcard() {
        let brain = brain_from(&["+ *", "- wild", "+ hello there", "- atomic"]);
        let entries = sort_brain(&brain, 50);
        let patterns: Vec<&str> = entries.topics[ast::DEFAULT_TOPIC].iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["hello there", "*"]);
    }

    #[test]
    fn higher_weight_sorts_first_within_same_kind() {
        let brain = brain_from(&["+ something{weight=100}", "- Weighted", "+ something", "- Unweighted"]);
        let entries = sort_brain(&brain, 50);
        let patterns: Vec<&str> = entries.topics[ast::DEFAULT_TOPIC].iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(patterns[0], "something{weight=100}");
    }

    #[test]
    fn word_count_breaks_ties_within_a_kind() {
        let brain = brain_from(&["+ a b c", "- 1", "+ a b", "- 2"]);
        let entries = sort_brain(&brain, 50);
        let patterns: Vec<&str> = entries.topics[ast::DEFAULT_TOPIC].iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["a b c", "a b"]);
    }

    #[test]
    fn previous_triggers_land_in_thats_not_topics() {
        let brain = brain_from(&["+ *", "% who is there", "- a", "+ plain", "- b"]);
        let entries = sort_brain(&brain, 50);
        assert_eq!(entries.topics[ast::DEFAULT_TOPIC].len(), 1);
        assert_eq!(entries.thats[ast::DEFAULT_TOPIC].len(), 1);
    }

    #[test]
    fn inherited_topic_triggers_sort_before_the_childs_own() {
        let mut brain = Brain::new(Arc::new(crate::macro_handler::MacroRegistry::new()));
        brain
            .merge(Parser::new("t.rive", true, false).parse(&["> topic parent", "+ fallback", "- p", "< topic"]).unwrap().root)
            .unwrap();
        brain
            .merge(
                Parser::new("t.rive", true, false)
                    .parse(&["> topic child inherits parent", "+ specific", "- c", "< topic"])
                    .unwrap()
                    .root,
            )
            .unwrap();
        let entries = sort_brain(&brain, 50);
        let patterns: Vec<&str> = entries.topics["child"].iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["fallback", "specific"]);
    }
}
