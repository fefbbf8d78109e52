//! # uoscript-core
//!
//! Core engine for the UO Steam scripting language: a small line-oriented
//! command language used to automate a game client.
//!
//! The crate provides three tightly-coupled pieces:
//!
//! - [`lexer`] - turns source text into an arena-allocated AST
//! - [`script`] - a tree-walking cursor that executes one statement per
//!   tick, with lexical scopes and control-flow unwinding
//! - [`engine`] - process-wide state: handler registries, the alias, list,
//!   and timer stores, and the cooperative driver with pause/timeout
//!
//! The engine does not know what any command does. Hosts register command,
//! expression, and alias handlers by name and drive the single active
//! script from their main loop, one tick at a time.
//!
//! ## Example
//!
//! ```
//! use uoscript_core::{lexer, Engine, Result, Script};
//!
//! let tree = lexer::lex(["msg 'Hello'"]).unwrap();
//!
//! let mut engine = Engine::new();
//! engine.register_command(
//!     "msg",
//!     |engine: &mut Engine,
//!      script: &uoscript_core::Script,
//!      name: &str,
//!      args: &[uoscript_core::Argument],
//!      _quiet: bool,
//!      _force: bool|
//!      -> Result<bool> {
//!         for arg in args {
//!             println!("{} says {}", name, arg.as_string(script, engine)?);
//!         }
//!         Ok(true)
//!     },
//! );
//!
//! engine.start(Script::new(tree)).unwrap();
//! while engine.tick().unwrap() {}
//! ```

pub mod argument;
pub mod ast;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod script;

pub use argument::{Argument, Value};
pub use ast::{Arena, Node, NodeId, NodeKind, ScriptTree};
pub use engine::{Engine, ABSENT_SERIAL};
pub use error::{Result, ScriptError};
pub use script::Script;
