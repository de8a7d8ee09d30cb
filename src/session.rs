//! Per-user session state (spec §3 "Session (per user)", §6 "Session
//! manager contract").
//!
//! The brain and sort buffers are shared, read-mostly state; sessions are
//! the one piece of state `reply()` actually mutates, and they must be safe
//! to touch concurrently across distinct users (spec §5). This module keeps
//! that guarantee local to `InMemorySessionManager` rather than leaning on
//! any process-wide global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Number of input/reply turns retained per user (spec §3, §8 invariant 4).
pub const HISTORY_SIZE: usize = 9;

const UNDEFINED: &str = "undefined";

/// A fixed-capacity ring buffer, oldest entry evicted first, always full.
///
/// Initialized with `HISTORY_SIZE` copies of `"undefined"` (spec §3), so
/// `<input9>`/`<reply9>` never index into an empty slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    slots: [String; HISTORY_SIZE],
}

impl Default for History {
    fn default() -> Self {
        History { slots: std::array::from_fn(|_| UNDEFINED.to_string()) }
    }
}

impl History {
    /// Push a new entry; the oldest is dropped (spec §8 invariant 4).
    pub fn push(&mut self, entry: String) {
        self.slots.rotate_left(1);
        let last = self.slots.len() - 1;
        self.slots[last] = entry;
    }

    /// `index` is 1-based as in `<input1>`..`<input9>`, where 1 is most
    /// recent. `index` 0 is treated the same as 1 (`<input>` == `<input1>`).
    pub fn get(&self, index: usize) -> &str {
        let index = index.max(1).min(HISTORY_SIZE);
        let last = self.slots.len() - 1;
        &self.slots[last - (index - 1)]
    }
}

/// Per-user mutable state (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub variables: HashMap<String, String>,
    pub last_match: String,
    pub input_history: History,
    pub reply_history: History,
}

impl Default for Session {
    fn default() -> Self {
        let mut variables = HashMap::new();
        variables.insert("topic".to_string(), crate::ast::DEFAULT_TOPIC.to_string());
        Session {
            variables,
            last_match: String::new(),
            input_history: History::default(),
            reply_history: History::default(),
        }
    }
}

impl Session {
    pub fn topic(&self) -> &str {
        self.variables.get("topic").map(|s| s.as_str()).unwrap_or(crate::ast::DEFAULT_TOPIC)
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.variables.insert("topic".to_string(), topic.into());
    }

    pub fn get_var(&self, name: &str) -> &str {
        self.variables.get(name).map(|s| s.as_str()).unwrap_or(UNDEFINED)
    }

    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_string(), value.into());
    }
}

/// `thaw(user, action)` disposition (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThawAction {
    /// Restore the snapshot and discard it.
    Thaw,
    /// Discard the snapshot, keep current state.
    Discard,
    /// Restore the snapshot and keep it for future thaws.
    Keep,
}

/// The session-manager contract of spec §6. An implementation must be safe
/// for concurrent access across distinct users; a single user's state is
/// exclusively owned for the duration of one `reply` call (spec §5).
pub trait SessionManager: Send + Sync {
    fn init(&self, user: &str);
    fn set(&self, user: &str, vars: HashMap<String, String>);
    fn get(&self, user: &str, name: &str) -> String;
    fn get_any(&self, user: &str) -> HashMap<String, String>;
    fn get_all(&self) -> HashMap<String, HashMap<String, String>>;
    fn add_history(&self, user: &str, input: String, reply: String);
    fn set_last_match(&self, user: &str, trigger: String);
    fn get_last_match(&self, user: &str) -> String;
    fn get_history(&self, user: &str) -> (History, History);
    fn clear(&self, user: &str);
    fn clear_all(&self);
    fn freeze(&self, user: &str);
    fn thaw(&self, user: &str, action: ThawAction);
}

/// Default in-memory session manager (spec §5's "in-memory session manager").
///
/// Each user's `Session` lives behind the same `Mutex`-guarded map; lock
/// scope is kept to the duration of a single accessor call, so two users'
/// `reply()` calls never block each other beyond that.
#[derive(Debug, Default)]
pub struct InMemorySessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    snapshots: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_session<R>(&self, user: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(user.to_string()).or_default();
        f(session)
    }
}

impl SessionManager for InMemorySessionManager {
    fn init(&self, user: &str) {
        self.sessions.lock().unwrap().entry(user.to_string()).or_default();
    }

    fn set(&self, user: &str, vars: HashMap<String, String>) {
        self.with_session(user, |s| s.variables.extend(vars));
    }

    fn get(&self, user: &str, name: &str) -> String {
        self.with_session(user, |s| s.get_var(name).to_string())
    }

    fn get_any(&self, user: &str) -> HashMap<String, String> {
        self.with_session(user, |s| s.variables.clone())
    }

    fn get_all(&self) -> HashMap<String, HashMap<String, String>> {
        self.sessions.lock().unwrap().iter().map(|(u, s)| (u.clone(), s.variables.clone())).collect()
    }

    fn add_history(&self, user: &str, input: String, reply: String) {
        self.with_session(user, |s| {
            s.input_history.push(input);
            s.reply_history.push(reply);
        });
    }

    fn set_last_match(&self, user: &str, trigger: String) {
        self.with_session(user, |s| s.last_match = trigger);
    }

    fn get_last_match(&self, user: &str) -> String {
        self.with_session(user, |s| s.last_match.clone())
    }

    fn get_history(&self, user: &str) -> (History, History) {
        self.with_session(user, |s| (s.input_history.clone(), s.reply_history.clone()))
    }

    fn clear(&self, user: &str) {
        self.sessions.lock().unwrap().remove(user);
        self.snapshots.lock().unwrap().remove(user);
    }

    fn clear_all(&self) {
        self.sessions.lock().unwrap().clear();
        self.snapshots.lock().unwrap().clear();
    }

    fn freeze(&self, user: &str) {
        let snapshot = self.sessions.lock().unwrap().get(user).cloned().unwrap_or_default();
        self.snapshots.lock().unwrap().insert(user.to_string(), snapshot);
    }

    fn thaw(&self, user: &str, action: ThawAction) {
        let mut snapshots = self.snapshots.lock().unwrap();
        match action {
            ThawAction::Discard => {
                snapshots.remove(user);
            }
            ThawAction::Thaw => {
                if let Some(snapshot) = snapshots.remove(user) {
                    self.sessions.lock().unwrap().insert(user.to_string(), snapshot);
                }
            }
            ThawAction::Keep => {
                if let Some(snapshot) = snapshots.get(user).cloned() {
                    self.sessions.lock().unwrap().insert(user.to_string(), snapshot);
                }
            }
        }
    }
}

/// A borrowed handle onto one user's state behind a [`SessionManager`],
/// used by the regex compiler and tag expander so neither needs to depend
/// on the concrete [`Session`] type or a locked map (spec §6 "Session
/// manager contract").
#[derive(Clone, Copy)]
pub struct SessionView<'a> {
    pub user: &'a str,
    pub manager: &'a dyn SessionManager,
}

impl<'a> SessionView<'a> {
    pub fn new(user: &'a str, manager: &'a dyn SessionManager) -> Self {
        SessionView { user, manager }
    }

    pub fn get_var(&self, name: &str) -> String {
        self.manager.get(self.user, name)
    }

    pub fn set_var(&self, name: &str, value: impl Into<String>) {
        self.manager.set(self.user, HashMap::from([(name.to_string(), value.into())]));
    }

    pub fn topic(&self) -> String {
        self.get_var("topic")
    }

    pub fn set_topic(&self, topic: impl Into<String>) {
        self.set_var("topic", topic.into());
    }

    pub fn input_history(&self, index: usize) -> String {
        self.manager.get_history(self.user).0.get(index).to_string()
    }

    pub fn reply_history(&self, index: usize) -> String {
        self.manager.get_history(self.user).1.get(index).to_string()
    }
}
