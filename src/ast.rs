//! Passive data types produced by the parser (spec §3 "Data Model").
//!
//! Nothing in this module does any work: `Root` is what `engine::parser`
//! builds from source lines, and what `engine::brain::Brain::merge` consumes.

use std::collections::{BTreeMap, BTreeSet};

/// A single trigger: a pattern and the behaviors that fire when it wins.
///
/// Invariants (enforced by the parser in strict mode, spec §4.1/§9):
/// - `pattern` is non-empty.
/// - at least one of `replies`, `redirect`, or `conditions` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub pattern: String,
    pub replies: Vec<String>,
    pub conditions: Vec<String>,
    pub redirect: Option<String>,
    /// `%Previous` binding: the bot-reply pattern that must match history[0]
    /// for this trigger to be eligible (spec §4.1, §4.5 step 3).
    pub previous: Option<String>,
}

impl Trigger {
    /// Returns whether this trigger can produce any output at all
    /// (spec §3 invariant, §9 "Open question").
    pub fn produces_output(&self) -> bool {
        !self.replies.is_empty() || self.redirect.is_some() || !self.conditions.is_empty()
    }
}

/// A named collection of triggers plus its topic-graph edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topic {
    pub triggers: Vec<Trigger>,
    pub includes: BTreeSet<String>,
    pub inherits: BTreeSet<String>,
}

/// Default topic name that always exists in a brain (spec §3).
pub const DEFAULT_TOPIC: &str = "random";

/// Name of the special topic opened by `> begin` (spec §4.1 "Label scope").
pub const BEGIN_TOPIC: &str = "__begin__";

/// An object-macro block: `> object NAME LANG` ... `< object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub language: String,
    pub code: Vec<String>,
}

/// `! global`/`! var`/`! sub`/`! person`/`! array` definitions collected
/// while parsing (spec §3 "Root (AST)", §4.1 "Definitions").
///
/// An entry mapped to `None` means the source used `<undef>` and the
/// definition should be deleted during brain ingestion (spec §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Begin {
    pub global: BTreeMap<String, Option<String>>,
    pub var: BTreeMap<String, Option<String>>,
    pub sub: BTreeMap<String, Option<String>>,
    pub person: BTreeMap<String, Option<String>>,
    pub array: BTreeMap<String, Option<Vec<String>>>,
}

/// The output of a single parse: one source file's worth of topics,
/// definitions, and object macros (spec §3 "Root (AST)").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Root {
    pub begin: Begin,
    pub topics: BTreeMap<String, Topic>,
    pub objects: Vec<Macro>,
}

impl Root {
    /// Returns (creating if absent) the named topic.
    pub fn topic_mut(&mut self, name: &str) -> &mut Topic {
        self.topics.entry(name.to_string()).or_default()
    }
}
