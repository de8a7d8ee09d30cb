//! Object-macro handler contract (spec §6 "Macro handler contract", §9
//! "Object-macro extensibility").
//!
//! Registering a handler for an embedded scripting language is explicitly
//! not a core obligation — this module only defines the dispatch contract
//! the matcher calls through when it encounters `> object` blocks and
//! `<call>` tags. Host applications provide their own `MacroHandler` impls
//! (e.g. a Lua or Rhai bridge); this crate ships none.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A host-language macro handler for one `language` tag (e.g. `"rust"`,
/// `"javascript"`, `"python"`).
pub trait MacroHandler: Send + Sync {
    /// Called once per `> object NAME LANG` block at brain-merge time.
    /// Returning `false` declines the object (spec §6): it is then not
    /// indexed and `<call>`s to it resolve to `[ERR: Object Not Found]`.
    fn load(&self, name: &str, code_lines: &[String]) -> bool;

    /// Called during tag expansion for `<call>name arg1 arg2</call>`.
    /// Errors are returned as text beginning with `[ERR:` (spec §6).
    fn call(&self, name: &str, args: &[String]) -> String;
}

/// Registry of `language -> MacroHandler`, plus the `name -> language` index
/// populated on successful `load` (spec §4.2 "Brain ingestion").
#[derive(Default)]
pub struct MacroRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MacroHandler>>>,
    object_languages: RwLock<HashMap<String, String>>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, language: impl Into<String>, handler: Arc<dyn MacroHandler>) {
        self.handlers.write().unwrap().insert(language.into(), handler);
    }

    /// Hands a parsed object block to its language's handler, recording the
    /// `name -> language` mapping on success.
    pub fn load(&self, name: &str, language: &str, code: &[String]) -> bool {
        let handlers = self.handlers.read().unwrap();
        let Some(handler) = handlers.get(language) else {
            log::warn!("no macro handler registered for language '{language}' (object '{name}')");
            return false;
        };
        if handler.load(name, code) {
            self.object_languages.write().unwrap().insert(name.to_string(), language.to_string());
            true
        } else {
            log::warn!("macro handler for '{language}' declined object '{name}'");
            false
        }
    }

    /// Dispatches a `<call>` tag. Returns `[ERR: Object Not Found]` when
    /// `name` has no registered language or handler (spec §4.5 tag table).
    pub fn call(&self, name: &str, args: &[String]) -> String {
        let object_languages = self.object_languages.read().unwrap();
        let Some(language) = object_languages.get(name) else {
            return "[ERR: Object Not Found]".to_string();
        };
        let handlers = self.handlers.read().unwrap();
        match handlers.get(language) {
            Some(handler) => handler.call(name, args),
            None => "[ERR: Object Not Found]".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl MacroHandler for Echo {
        fn load(&self, _name: &str, _code: &[String]) -> bool {
            true
        }
        fn call(&self, name: &str, args: &[String]) -> String {
            format!("{name}({})", args.join(","))
        }
    }

    #[test]
    fn unregistered_language_is_declined() {
        let registry = MacroRegistry::new();
        assert!(!registry.load("greet", "lua", &[]));
        assert_eq!(registry.call("greet", &[]), "[ERR: Object Not Found]");
    }

    #[test]
    fn registered_language_loads_and_calls() {
        let registry = MacroRegistry::new();
        registry.register("rust", Arc::new(Echo));
        assert!(registry.load("greet", "rust", &["fn greet() {}".to_string()]));
        assert_eq!(registry.call("greet", &["a".to_string(), "b".to_string()]), "greet(a,b)");
    }
}
