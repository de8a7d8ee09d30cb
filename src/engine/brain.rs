//! Merges parsed `Root`s into the running, queryable brain (spec §4.2).
//!
//! The brain is the validated, loaded form of one or more source files: a
//! topic graph, a `thats` index for `%Previous` lookups, substitution and
//! array tables, bot/global variables, and the object-macro registry. It
//! mutates only through [`Brain::merge`] and the explicit setter APIs; reply
//! generation never writes to it (spec §3 "Lifecycle").

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::ast::{self, DEFAULT_TOPIC};
use crate::error::LoadError;
use crate::macro_handler::MacroRegistry;

/// `topic -> trigger pattern -> previous pattern -> Trigger` (spec §3).
pub type ThatsIndex = BTreeMap<String, BTreeMap<String, BTreeMap<String, ast::Trigger>>>;

/// The loaded, validated form of one or more parsed `Root`s (spec §3 "Brain").
///
/// `global`/`var` are held behind a `Mutex` rather than the plain
/// `BTreeMap`s used for `sub`/`person`/`array`: `<bot name=value>` and
/// `<env name=value>` (spec.md:136-137) let a reply mutate bot/global
/// variables while the matcher otherwise only holds `&Brain`, the same
/// "immutable handle, interior-mutable state" shape `session.rs` uses for
/// `InMemorySessionManager`.
#[derive(Debug, Default)]
pub struct Brain {
    pub topics: BTreeMap<String, ast::Topic>,
    pub thats: ThatsIndex,
    global: Mutex<BTreeMap<String, String>>,
    var: Mutex<BTreeMap<String, String>>,
    pub sub: BTreeMap<String, String>,
    pub person: BTreeMap<String, String>,
    pub array: BTreeMap<String, Vec<String>>,
    pub macros: Arc<MacroRegistry>,
}

impl Brain {
    pub fn new(macros: Arc<MacroRegistry>) -> Self {
        let mut brain = Brain { macros, ..Brain::default() };
        brain.topics.entry(DEFAULT_TOPIC.to_string()).or_default();
        brain
    }

    /// Merge a parsed `Root` into this brain (spec §4.2).
    ///
    /// Definitions are applied add-or-delete (a `None` entry deletes the
    /// key); topics are upserted; triggers are deep-copied into the brain's
    /// topic, and any trigger carrying `previous` is additionally indexed
    /// into `thats`. Object macros are hand off to the registry, which only
    /// indexes them if their handler accepts the load.
    pub fn merge(&mut self, root: ast::Root) -> Result<(), LoadError> {
        merge_defs(&mut self.global.lock().unwrap(), root.begin.global);
        merge_defs(&mut self.var.lock().unwrap(), root.begin.var);
        merge_defs(&mut self.sub, root.begin.sub);
        merge_defs(&mut self.person, root.begin.person);
        merge_array_defs(&mut self.array, root.begin.array);

        for (name, topic) in root.topics {
            let entry = self.topics.entry(name.clone()).or_default();
            entry.includes.extend(topic.includes);
            entry.inherits.extend(topic.inherits);
            for trigger in topic.triggers {
                if let Some(previous) = trigger.previous.clone() {
                    self.thats
                        .entry(name.clone())
                        .or_default()
                        .entry(trigger.pattern.clone())
                        .or_default()
                        .insert(previous, trigger.clone());
                }
                entry.triggers.push(trigger);
            }
        }

        for object in root.objects {
            self.macros.load(&object.name, &object.language, &object.code);
        }

        Ok(())
    }

    pub fn topic(&self, name: &str) -> Option<&ast::Topic> {
        self.topics.get(name)
    }

    /// Reads a bot variable (`<bot name>`, spec.md:136).
    pub fn get_var(&self, name: &str) -> String {
        self.var.lock().unwrap().get(name).cloned().unwrap_or_else(|| "undefined".to_string())
    }

    /// Sets a bot variable (`<bot name=value>`, spec.md:136).
    pub fn set_var(&self, name: &str, value: impl Into<String>) {
        self.var.lock().unwrap().insert(name.to_string(), value.into());
    }

    /// Reads a global variable (`<env name>`, spec.md:137).
    pub fn get_global(&self, name: &str) -> String {
        self.global.lock().unwrap().get(name).cloned().unwrap_or_else(|| "undefined".to_string())
    }

    /// Sets a global variable (`<env name=value>`, spec.md:137).
    pub fn set_global(&self, name: &str, value: impl Into<String>) {
        self.global.lock().unwrap().insert(name.to_string(), value.into());
    }
}

fn merge_defs(target: &mut BTreeMap<String, String>, defs: BTreeMap<String, Option<String>>) {
    for (name, value) in defs {
        match value {
            Some(v) => {
                target.insert(name, v);
            }
            None => {
                target.remove(&name);
            }
        }
    }
}

fn merge_array_defs(target: &mut BTreeMap<String, Vec<String>>, defs: BTreeMap<String, Option<Vec<String>>>) {
    for (name, value) in defs {
        match value {
            Some(v) => {
                target.insert(name, v);
            }
            None => {
                target.remove(&name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::Parser;

    fn parse_root(lines: &[&str]) -> ast::Root {
        Parser::new("t.rive", true, false).parse(lines).unwrap().root
    }

    #[test]
    fn merge_upserts_topics_and_triggers() {
        let mut brain = Brain::new(Arc::new(MacroRegistry::new()));
        brain.merge(parse_root(&["+ hello bot", "- Hello, human!"])).unwrap();
        let topic = brain.topic(DEFAULT_TOPIC).unwrap();
        assert_eq!(topic.triggers.len(), 1);
        assert_eq!(topic.triggers[0].pattern, "hello bot");
    }

    #[test]
    fn merge_indexes_previous_triggers_into_thats() {
        let mut brain = Brain::new(Arc::new(MacroRegistry::new()));
        brain.merge(parse_root(&["+ *", "% who is there", "- <sentence> who?"])).unwrap();
        assert!(brain.thats[DEFAULT_TOPIC]["*"].contains_key("who is there"));
    }

    #[test]
    fn undef_deletes_on_merge() {
        let mut brain = Brain::new(Arc::new(MacroRegistry::new()));
        brain.merge(parse_root(&["! global debug = 1"])).unwrap();
        assert_eq!(brain.get_global("debug"), "1");
        brain.merge(parse_root(&["! global debug = <undef>"])).unwrap();
        assert_eq!(brain.get_global("debug"), "undefined");
    }

    #[test]
    fn bot_and_env_vars_are_mutable_through_a_shared_reference() {
        let brain = Brain::new(Arc::new(MacroRegistry::new()));
        brain.set_var("name", "Rive");
        assert_eq!(brain.get_var("name"), "Rive");
        brain.set_global("depends", "nothing");
        assert_eq!(brain.get_global("depends"), "nothing");
    }

    #[test]
    fn array_merge_replaces_whole_array() {
        let mut brain = Brain::new(Arc::new(MacroRegistry::new()));
        brain.merge(parse_root(&["! array greek = alpha beta gamma"])).unwrap();
        assert_eq!(brain.array["greek"], vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn later_merge_adds_triggers_to_existing_topic() {
        let mut brain = Brain::new(Arc::new(MacroRegistry::new()));
        brain.merge(parse_root(&["+ a", "- b"])).unwrap();
        brain.merge(parse_root(&["+ c", "- d"])).unwrap();
        assert_eq!(brain.topic(DEFAULT_TOPIC).unwrap().triggers.len(), 2);
    }
}
