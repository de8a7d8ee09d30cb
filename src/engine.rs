//! The interpreter pipeline.
//!
//! ```text
//! source lines ──▶ parser::Parser::parse          (spec §4.1)
//!                        │
//!                        ▼
//!                  ast::Root
//!                        │
//!            brain::Brain::merge                   (spec §4.2)
//!                        │
//!                        ▼
//!                    brain::Brain  ──▶ sorter::sort_brain     (spec §4.3)
//!                        │                   │
//!                        │                   ▼
//!                        │            sorter::SortBuffer
//!                        ▼                   │
//!                  matcher::reply  ◀──────────┘              (spec §4.5)
//!                        │
//!                        ▼
//!                 tags::expand (recursive, inside-out)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `parser.rs`: turns source lines into an [`ast::Root`] (spec §4.1).
//! - `brain.rs`: merges one or more `Root`s into the running [`Brain`]
//!   (spec §4.2).
//! - `sorter.rs`: produces the deterministic per-topic search order (spec
//!   §4.3) that the matcher depends on.
//! - `regexc.rs`: compiles a trigger pattern into an anchored [`regex::Regex`]
//!   (spec §4.4).
//! - `matcher.rs`: the `reply()` algorithm (spec §4.5 steps 1-7, 9-10).
//! - `tags.rs`: tag expansion (spec §4.5's tag table and shortcut rewrites).
//! - `metrics.rs`: optional per-stage timing, mirroring the profiling surface
//!   a caller may want without paying for it on every call.
//!
//! ## Debugging
//!
//! The core never prints directly; set `RUST_LOG=rivescript=trace` (or
//! `=debug`) to see trigger activation, sort decisions, and match attempts
//! via the `log` facade.

#[path = "engine/brain.rs"]
pub mod brain;
#[path = "engine/matcher.rs"]
pub mod matcher;
#[path = "engine/metrics.rs"]
pub mod metrics;
#[path = "engine/parser.rs"]
pub mod parser;
#[path = "engine/regexc.rs"]
pub mod regexc;
#[path = "engine/sorter.rs"]
pub mod sorter;
#[path = "engine/tags.rs"]
pub mod tags;

pub use brain::Brain;
pub use matcher::{Matcher, Options as MatcherOptions};
pub use parser::Parser;
pub use sorter::{PatternFeatures, SortBuffer};
