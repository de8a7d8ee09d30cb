//! A RiveScript chatbot interpreter: a line-oriented parser, a deterministic
//! trigger sorter, and a matching/reply engine, bundled behind one stateful
//! [`RiveScript`] handle.
//!
//! ```
//! use rivescript::{Options, RiveScript};
//!
//! let mut bot = RiveScript::new(Options::default());
//! bot.load_file("brain.rive", "+ hello bot\n- Hello, human!").unwrap();
//! bot.sort_replies();
//! assert_eq!(bot.reply("local-user", "hello bot"), "Hello, human!");
//! ```
//!
//! ## Modules
//!
//! - [`ast`] — the passive data types the parser produces.
//! - [`engine`] — the parser, brain, sorter, regex compiler, matcher, and
//!   tag expander; see its module doc for the pipeline.
//! - [`session`] — per-user state and the `SessionManager` contract.
//! - [`macro_handler`] — the object-macro (`<call>`) dispatch contract.
//! - [`error`] — structured parse/load errors and the overridable literal
//!   reply-error strings.

mod api;
pub mod ast;
pub mod engine;
pub mod error;
pub mod macro_handler;
pub mod session;

pub use api::{Options, RiveScript};
pub use engine::metrics::{FileMetrics, LoadMetrics, ReplyMetrics};
pub use error::{ErrorKind, LoadError, ParseError, ParseWarning};
pub use macro_handler::{MacroHandler, MacroRegistry};
pub use session::{SessionManager, ThawAction};
