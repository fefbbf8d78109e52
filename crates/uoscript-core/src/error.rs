use thiserror::Error;

use crate::ast::NodeId;

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors surfaced by the lexer, the interpreter, and the engine stores.
///
/// Runtime errors abort the current script when they propagate out of a
/// tick; aliases, lists, and timers survive. Syntax errors abort the whole
/// lex call.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The lexer rejected a source line.
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Execution failed. `node` is the offending AST node when one is known.
    #[error("runtime error: {message}")]
    Runtime {
        node: Option<NodeId>,
        message: String,
    },

    /// Reading a script file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn runtime(node: Option<NodeId>, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            node,
            message: message.into(),
        }
    }
}
