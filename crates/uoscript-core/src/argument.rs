//! Lazy typed arguments and the comparable value model.
//!
//! An [`Argument`] is a typed view over one AST leaf. Nothing is evaluated
//! until a handler asks for a concrete type, and every coercion first tries
//! to resolve the lexeme as a scoped variable of the owning script, so loop
//! variables read their current binding at call time rather than whatever
//! was on the line when it was parsed.
//!
//! [`Value`] is what expression handlers return and what binary operands
//! evaluate to. Comparing two values of different kinds follows a fixed
//! asymmetric rule: if the right side is a double the left is promoted to
//! double, else if the right side is a boolean the left is coerced to
//! boolean, otherwise the right side is coerced to the kind of the left.

use std::cmp::Ordering;
use std::fmt;

use crate::ast::{Arena, NodeId, NodeKind};
use crate::engine::{Engine, ABSENT_SERIAL};
use crate::error::{Result, ScriptError};
use crate::script::Script;

/// A comparable runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Uint(u32),
    Double(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl Value {
    pub fn to_double(&self) -> Result<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Uint(u) => Ok(*u as f64),
            Value::Double(d) => Ok(*d),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| ScriptError::runtime(None, format!("'{s}' is not a number"))),
        }
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Uint(u) => Ok(*u != 0),
            Value::Double(d) => Ok(*d != 0.0),
            Value::Str(s) => parse_bool(s),
        }
    }

    pub fn to_int(&self) -> Result<i32> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Uint(u) => i32::try_from(*u)
                .map_err(|_| ScriptError::runtime(None, format!("{u} does not fit an integer"))),
            Value::Double(d) => {
                let rounded = d.round();
                if rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
                    return Err(ScriptError::runtime(
                        None,
                        format!("{d} does not fit an integer"),
                    ));
                }
                Ok(rounded as i32)
            }
            Value::Bool(b) => Ok(i32::from(*b)),
            Value::Str(s) => parse_int(s),
        }
    }

    pub fn to_uint(&self) -> Result<u32> {
        match self {
            Value::Uint(u) => Ok(*u),
            Value::Int(i) => u32::try_from(*i).map_err(|_| {
                ScriptError::runtime(None, format!("{i} does not fit an unsigned integer"))
            }),
            Value::Double(d) => {
                let rounded = d.round();
                if rounded < 0.0 || rounded > u32::MAX as f64 {
                    return Err(ScriptError::runtime(
                        None,
                        format!("{d} does not fit an unsigned integer"),
                    ));
                }
                Ok(rounded as u32)
            }
            Value::Bool(b) => Ok(u32::from(*b)),
            Value::Str(s) => parse_uint(s),
        }
    }
}

/// Apply a comparison operator to two values, coercing kinds as needed.
pub fn compare(op: NodeKind, lhs: &Value, rhs: &Value) -> Result<bool> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Uint(a), Value::Uint(b)) => a.cmp(b),
        (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (_, Value::Double(b)) => lhs.to_double()?.total_cmp(b),
        (_, Value::Bool(b)) => lhs.to_bool()?.cmp(b),
        _ => match lhs {
            Value::Int(a) => a.cmp(&rhs.to_int()?),
            Value::Uint(a) => a.cmp(&rhs.to_uint()?),
            Value::Double(a) => a.total_cmp(&rhs.to_double()?),
            Value::Bool(a) => a.cmp(&rhs.to_bool()?),
            Value::Str(a) => a.cmp(&rhs.to_string()),
        },
    };

    let result = match op {
        NodeKind::Equal => ordering == Ordering::Equal,
        NodeKind::NotEqual => ordering != Ordering::Equal,
        NodeKind::LessThan => ordering == Ordering::Less,
        NodeKind::LessThanOrEqual => ordering != Ordering::Greater,
        NodeKind::GreaterThan => ordering == Ordering::Greater,
        NodeKind::GreaterThanOrEqual => ordering != Ordering::Less,
        other => {
            return Err(ScriptError::runtime(
                None,
                format!("{other:?} is not a comparison operator"),
            ))
        }
    };
    Ok(result)
}

/// A lazy typed view over one AST leaf.
///
/// Arguments own the leaf's tag and lexeme; the node itself never changes
/// after lexing, so the copy behaves exactly like a reference while letting
/// engine lists outlive the script that produced their elements.
#[derive(Debug, Clone)]
pub struct Argument {
    kind: NodeKind,
    lexeme: String,
}

impl PartialEq for Argument {
    // Equality is textual: two arguments match iff their lexemes match.
    fn eq(&self, other: &Self) -> bool {
        self.lexeme == other.lexeme
    }
}

impl Eq for Argument {}

impl Argument {
    pub fn new(kind: NodeKind, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
        }
    }

    pub(crate) fn from_node(arena: &Arena, id: NodeId) -> Self {
        Self {
            kind: arena.kind(id),
            lexeme: arena.lexeme(id).to_owned(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn as_int(&self, script: &Script, engine: &Engine) -> Result<i32> {
        if let Some(var) = script.lookup(&self.lexeme) {
            return var.as_int(script, engine);
        }
        parse_int(&self.lexeme)
    }

    pub fn as_uint(&self, script: &Script, engine: &Engine) -> Result<u32> {
        if let Some(var) = script.lookup(&self.lexeme) {
            return var.as_uint(script, engine);
        }
        parse_uint(&self.lexeme)
    }

    pub fn as_ushort(&self, script: &Script, engine: &Engine) -> Result<u16> {
        if let Some(var) = script.lookup(&self.lexeme) {
            return var.as_ushort(script, engine);
        }
        parse_ushort(&self.lexeme)
    }

    /// Resolve to a serial: scoped variable first, then the global alias
    /// store, then a plain unsigned parse.
    pub fn as_serial(&self, script: &Script, engine: &Engine) -> Result<u32> {
        if let Some(var) = script.lookup(&self.lexeme) {
            return var.as_serial(script, engine);
        }
        let serial = engine.get_alias(&self.lexeme);
        if serial != ABSENT_SERIAL {
            return Ok(serial);
        }
        parse_uint(&self.lexeme)
    }

    pub fn as_string(&self, script: &Script, engine: &Engine) -> Result<String> {
        if let Some(var) = script.lookup(&self.lexeme) {
            return var.as_string(script, engine);
        }
        Ok(self.lexeme.clone())
    }

    /// Booleans are literal `true`/`false` only. No variable or alias
    /// resolution happens here.
    pub fn as_bool(&self) -> Result<bool> {
        parse_bool(&self.lexeme)
    }

    pub fn as_double(&self, script: &Script, engine: &Engine) -> Result<f64> {
        if let Some(var) = script.lookup(&self.lexeme) {
            return var.as_double(script, engine);
        }
        parse_double(&self.lexeme)
    }
}

pub(crate) fn parse_int(lexeme: &str) -> Result<i32> {
    let parsed = match lexeme.strip_prefix("0x") {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => lexeme.parse(),
    };
    parsed.map_err(|_| ScriptError::runtime(None, format!("'{lexeme}' is not a valid integer")))
}

pub(crate) fn parse_uint(lexeme: &str) -> Result<u32> {
    let parsed = match lexeme.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => lexeme.parse(),
    };
    parsed.map_err(|_| {
        ScriptError::runtime(None, format!("'{lexeme}' is not a valid unsigned integer"))
    })
}

pub(crate) fn parse_ushort(lexeme: &str) -> Result<u16> {
    let parsed = match lexeme.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => lexeme.parse(),
    };
    parsed.map_err(|_| {
        ScriptError::runtime(None, format!("'{lexeme}' is not a valid unsigned short"))
    })
}

pub(crate) fn parse_double(lexeme: &str) -> Result<f64> {
    lexeme
        .parse()
        .map_err(|_| ScriptError::runtime(None, format!("'{lexeme}' is not a valid double")))
}

pub(crate) fn parse_bool(lexeme: &str) -> Result<bool> {
    match lexeme.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ScriptError::runtime(
            None,
            format!("'{lexeme}' is not a valid boolean"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn empty_script() -> Script {
        Script::new(lex(["stop"]).unwrap())
    }

    #[test]
    fn numeric_parsing_handles_hex_and_decimal() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("-7").unwrap(), -7);
        assert_eq!(parse_int("0x10").unwrap(), 16);
        assert_eq!(parse_uint("0xffffffff").unwrap(), u32::MAX);
        assert_eq!(parse_ushort("0xff").unwrap(), 255);
        assert!(parse_int("fish").is_err());
        assert!(parse_uint("-1").is_err());
    }

    #[test]
    fn bool_parsing_is_case_insensitive_and_literal() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("TRUE").unwrap());
        assert!(!parse_bool(" False ").unwrap());
        assert!(parse_bool("1").is_err());
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn argument_equality_is_textual() {
        let a = Argument::new(NodeKind::String, "dragon");
        let b = Argument::new(NodeKind::Integer, "dragon");
        let c = Argument::new(NodeKind::String, "drake");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn coercion_resolves_scoped_variables() {
        let mut script = empty_script();
        let engine = Engine::new();
        script.set_var("count".into(), Argument::new(NodeKind::Integer, "12"));
        let arg = Argument::new(NodeKind::String, "count");
        assert_eq!(arg.as_int(&script, &engine).unwrap(), 12);
        assert_eq!(arg.as_string(&script, &engine).unwrap(), "12");
    }

    #[test]
    fn bool_coercion_skips_variables() {
        let mut script = empty_script();
        script.set_var("flag".into(), Argument::new(NodeKind::String, "true"));
        let arg = Argument::new(NodeKind::String, "flag");
        // as_bool never consults the scope chain.
        assert!(arg.as_bool().is_err());
    }

    #[test]
    fn serial_resolution_order() {
        let script = empty_script();
        let mut engine = Engine::new();
        engine.set_alias("mount", 0x4321);

        let aliased = Argument::new(NodeKind::String, "mount");
        assert_eq!(aliased.as_serial(&script, &engine).unwrap(), 0x4321);

        let literal = Argument::new(NodeKind::Serial, "0x77");
        assert_eq!(literal.as_serial(&script, &engine).unwrap(), 0x77);

        let bogus = Argument::new(NodeKind::String, "nothing");
        assert!(bogus.as_serial(&script, &engine).is_err());
    }

    #[test]
    fn same_kind_comparisons() {
        assert!(compare(NodeKind::Equal, &Value::Int(3), &Value::Int(3)).unwrap());
        assert!(compare(NodeKind::LessThan, &Value::Int(-1), &Value::Int(2)).unwrap());
        assert!(compare(NodeKind::GreaterThanOrEqual, &Value::Uint(9), &Value::Uint(9)).unwrap());
        assert!(compare(
            NodeKind::NotEqual,
            &Value::Str("abc".into()),
            &Value::Str("abd".into())
        )
        .unwrap());
    }

    #[test]
    fn right_double_promotes_left() {
        assert!(compare(NodeKind::Equal, &Value::Int(2), &Value::Double(2.0)).unwrap());
        assert!(compare(NodeKind::LessThan, &Value::Str("1.5".into()), &Value::Double(2.5)).unwrap());
        assert!(compare(NodeKind::GreaterThan, &Value::Bool(true), &Value::Double(0.5)).unwrap());
    }

    #[test]
    fn right_bool_coerces_left() {
        assert!(compare(NodeKind::Equal, &Value::Int(1), &Value::Bool(true)).unwrap());
        assert!(compare(NodeKind::Equal, &Value::Int(0), &Value::Bool(false)).unwrap());
        assert!(compare(NodeKind::Equal, &Value::Str("TRUE".into()), &Value::Bool(true)).unwrap());
        assert!(compare(NodeKind::Equal, &Value::Double(0.0), &Value::Bool(false)).unwrap());
    }

    #[test]
    fn otherwise_right_coerces_to_left_kind() {
        // Left int, right string.
        assert!(compare(NodeKind::Equal, &Value::Int(7), &Value::Str("7".into())).unwrap());
        // Left string, right int: the int renders as text.
        assert!(compare(NodeKind::Equal, &Value::Str("7".into()), &Value::Int(7)).unwrap());
        // Left uint, right int.
        assert!(compare(NodeKind::Equal, &Value::Uint(5), &Value::Int(5)).unwrap());
    }

    #[test]
    fn asymmetry_of_the_coercion_rule() {
        // 1 == "1.0" fails as an int parse, while "1.0"-as-double on the
        // right would have promoted. The rule is direction-sensitive.
        assert!(compare(NodeKind::Equal, &Value::Int(1), &Value::Str("1.0".into())).is_err());
        assert!(compare(NodeKind::Equal, &Value::Int(1), &Value::Double(1.0)).unwrap());
    }

    #[test]
    fn failed_coercion_is_an_error() {
        assert!(compare(NodeKind::Equal, &Value::Int(1), &Value::Str("dragon".into())).is_err());
        assert!(compare(NodeKind::Equal, &Value::Str("x".into()), &Value::Bool(true)).is_err());
    }
}
