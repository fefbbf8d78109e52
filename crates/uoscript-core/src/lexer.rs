//! Line-oriented lexer for UO Steam scripts.
//!
//! The language has one statement per physical line. Each line is trimmed,
//! comment lines (`//` or `#`) are dropped, and the rest is tokenized with
//! quoted substrings kept atomic: the line is split on both `'` and `"`
//! (the two quote characters are interchangeable), the segments alternate
//! between outside-quotes and inside-quotes, outside segments are split on
//! whitespace, and inside segments become single lexemes verbatim.
//!
//! The first lexeme classifies the statement. Control keywords push their
//! node and hand the rest of the line to the expression parser; terminator
//! keywords (`endif`, `break`, ...) accept no trailing lexemes; anything
//! else is a command call. Commands may carry a leading `@` (quiet) and a
//! trailing `!` (force), both stripped off into marker nodes.
//!
//! There is no grouping and no arithmetic. Expressions are flat: an
//! optional `not` plus a handler call (unary), or `operand CMP operand`
//! (binary), optionally chained with `and`/`or` under a logical node.

use std::path::Path;

use crate::ast::{Arena, NodeId, NodeKind, ScriptTree};
use crate::error::{Result, ScriptError};

/// Lex an iterable of source lines into a script tree.
pub fn lex<I, S>(lines: I) -> Result<ScriptTree>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut arena = Arena::new();
    let root = arena.alloc(NodeKind::Script, "", 0);
    for (index, line) in lines.into_iter().enumerate() {
        parse_line(&mut arena, root, line.as_ref(), index + 1)?;
    }
    Ok(ScriptTree::new(arena, root))
}

/// Read a script file and lex it.
pub fn lex_file(path: impl AsRef<Path>) -> Result<ScriptTree> {
    let text = std::fs::read_to_string(path)?;
    lex(text.lines())
}

fn parse_line(arena: &mut Arena, root: NodeId, line: &str, number: usize) -> Result<()> {
    let line = line.trim();
    if line.starts_with("//") || line.starts_with('#') {
        return Ok(());
    }
    let lexemes = tokenize(line);
    if lexemes.is_empty() {
        return Ok(());
    }

    let statement = arena.push_child(root, NodeKind::Statement, "", number);
    match lexemes[0].as_str() {
        "if" => {
            let node = arena.push_child(statement, NodeKind::If, "", number);
            parse_logical_expression(arena, node, &lexemes[1..], number)
        }
        "elseif" => {
            let node = arena.push_child(statement, NodeKind::Elseif, "", number);
            parse_logical_expression(arena, node, &lexemes[1..], number)
        }
        "while" => {
            let node = arena.push_child(statement, NodeKind::While, "", number);
            parse_logical_expression(arena, node, &lexemes[1..], number)
        }
        "for" => {
            let node = arena.push_child(statement, NodeKind::For, "", number);
            // The integer-count requirement is checked at execution time.
            for lexeme in &lexemes[1..] {
                push_value(arena, node, lexeme, number);
            }
            Ok(())
        }
        "foreach" => parse_foreach(arena, statement, &lexemes, number),
        "else" => parse_marker(arena, statement, NodeKind::Else, &lexemes, number),
        "endif" => parse_marker(arena, statement, NodeKind::Endif, &lexemes, number),
        "endwhile" => parse_marker(arena, statement, NodeKind::Endwhile, &lexemes, number),
        "endfor" => parse_marker(arena, statement, NodeKind::Endfor, &lexemes, number),
        "break" => parse_marker(arena, statement, NodeKind::Break, &lexemes, number),
        "continue" => parse_marker(arena, statement, NodeKind::Continue, &lexemes, number),
        "stop" => parse_marker(arena, statement, NodeKind::Stop, &lexemes, number),
        "replay" => parse_marker(arena, statement, NodeKind::Replay, &lexemes, number),
        _ => {
            parse_command(arena, statement, &lexemes, number);
            Ok(())
        }
    }
}

/// Split a line into lexemes, keeping quoted substrings atomic.
fn tokenize(line: &str) -> Vec<String> {
    let mut lexemes = Vec::new();
    for (index, segment) in line.split(['\'', '"']).enumerate() {
        if index % 2 == 0 {
            lexemes.extend(segment.split_whitespace().map(str::to_owned));
        } else {
            lexemes.push(segment.to_owned());
        }
    }
    lexemes
}

/// Zero-argument statement heads like `endif` or `break`.
fn parse_marker(
    arena: &mut Arena,
    statement: NodeId,
    kind: NodeKind,
    lexemes: &[String],
    line: usize,
) -> Result<()> {
    if lexemes.len() > 1 {
        return Err(ScriptError::syntax(
            line,
            format!("'{}' takes no arguments", lexemes[0]),
        ));
    }
    arena.push_child(statement, kind, "", line);
    Ok(())
}

fn parse_foreach(
    arena: &mut Arena,
    statement: NodeId,
    lexemes: &[String],
    line: usize,
) -> Result<()> {
    if lexemes.len() != 4 || lexemes[2] != "in" {
        return Err(ScriptError::syntax(line, "expected 'foreach VAR in LIST'"));
    }
    let node = arena.push_child(statement, NodeKind::Foreach, "", line);
    arena.push_child(node, NodeKind::String, lexemes[1].as_str(), line);
    arena.push_child(node, NodeKind::String, lexemes[3].as_str(), line);
    Ok(())
}

/// Parse a command call: modifiers, name, then value arguments. The marker
/// nodes, the command node, and its values are all siblings under `parent`
/// so the interpreter can walk them as one flat list.
fn parse_command(arena: &mut Arena, parent: NodeId, lexemes: &[String], line: usize) {
    let mut name = lexemes[0].as_str();
    if let Some(stripped) = name.strip_prefix('@') {
        arena.push_child(parent, NodeKind::Quiet, "", line);
        name = stripped;
    }
    if let Some(stripped) = name.strip_suffix('!') {
        arena.push_child(parent, NodeKind::Force, "", line);
        name = stripped;
    }
    arena.push_child(parent, NodeKind::Command, name, line);
    for lexeme in &lexemes[1..] {
        push_value(arena, parent, lexeme, line);
    }
}

/// `0x...` is a serial, a signed decimal integer is an integer, anything
/// else is a string.
fn push_value(arena: &mut Arena, parent: NodeId, lexeme: &str, line: usize) {
    let kind = if lexeme.starts_with("0x") {
        NodeKind::Serial
    } else if lexeme.parse::<i32>().is_ok() {
        NodeKind::Integer
    } else {
        NodeKind::String
    };
    arena.push_child(parent, kind, lexeme, line);
}

fn comparison_operator(lexeme: &str) -> Option<NodeKind> {
    match lexeme {
        "==" | "=" => Some(NodeKind::Equal),
        "!=" => Some(NodeKind::NotEqual),
        "<" => Some(NodeKind::LessThan),
        "<=" => Some(NodeKind::LessThanOrEqual),
        ">" => Some(NodeKind::GreaterThan),
        ">=" => Some(NodeKind::GreaterThanOrEqual),
        _ => None,
    }
}

/// Parse the condition of an `if`/`elseif`/`while`. Scans for top-level
/// `and`/`or`; without them the single sub-expression hangs directly off
/// the control node, otherwise the pieces alternate with operator nodes
/// under one logical node.
fn parse_logical_expression(
    arena: &mut Arena,
    parent: NodeId,
    lexemes: &[String],
    line: usize,
) -> Result<()> {
    let logical = lexemes.iter().any(|l| l == "and" || l == "or");
    if !logical {
        return parse_expression(arena, parent, lexemes, line);
    }

    let expr = arena.push_child(parent, NodeKind::LogicalExpression, "", line);
    let mut start = 0;
    for (index, lexeme) in lexemes.iter().enumerate() {
        let op = match lexeme.as_str() {
            "and" => NodeKind::And,
            "or" => NodeKind::Or,
            _ => continue,
        };
        parse_expression(arena, expr, &lexemes[start..index], line)?;
        arena.push_child(expr, op, "", line);
        start = index + 1;
    }
    parse_expression(arena, expr, &lexemes[start..], line)
}

fn parse_expression(
    arena: &mut Arena,
    parent: NodeId,
    lexemes: &[String],
    line: usize,
) -> Result<()> {
    if lexemes.is_empty() {
        return Err(ScriptError::syntax(line, "expected an expression"));
    }
    let negated = lexemes.iter().any(|l| l == "not");
    let compared = lexemes.iter().any(|l| comparison_operator(l).is_some());
    if negated && compared {
        return Err(ScriptError::syntax(
            line,
            "'not' cannot be combined with a comparison operator",
        ));
    }
    if compared {
        parse_binary_expression(arena, parent, lexemes, line)
    } else {
        parse_unary_expression(arena, parent, lexemes, line)
    }
}

fn parse_unary_expression(
    arena: &mut Arena,
    parent: NodeId,
    lexemes: &[String],
    line: usize,
) -> Result<()> {
    let expr = arena.push_child(parent, NodeKind::UnaryExpression, "", line);
    let mut rest = lexemes;
    if rest[0] == "not" {
        arena.push_child(expr, NodeKind::Not, "", line);
        rest = &rest[1..];
    }
    if rest.is_empty() {
        return Err(ScriptError::syntax(line, "expected an expression after 'not'"));
    }
    parse_command(arena, expr, rest, line);
    Ok(())
}

fn parse_binary_expression(
    arena: &mut Arena,
    parent: NodeId,
    lexemes: &[String],
    line: usize,
) -> Result<()> {
    let expr = arena.push_child(parent, NodeKind::BinaryExpression, "", line);

    let after_left = parse_binary_operand(arena, expr, lexemes, 0, line)?;
    let op = lexemes
        .get(after_left)
        .and_then(|l| comparison_operator(l))
        .ok_or_else(|| ScriptError::syntax(line, "expected a comparison operator"))?;
    arena.push_child(expr, op, "", line);

    if after_left + 1 >= lexemes.len() {
        return Err(ScriptError::syntax(line, "expected an operand after the comparison"));
    }
    let after_right = parse_binary_operand(arena, expr, lexemes, after_left + 1, line)?;
    if after_right != lexemes.len() {
        return Err(ScriptError::syntax(line, "unexpected tokens after expression"));
    }
    Ok(())
}

/// One side of a binary expression: either an integer literal, or an
/// operand call whose arguments run up to the comparison operator.
/// Returns the index of the first unconsumed lexeme.
fn parse_binary_operand(
    arena: &mut Arena,
    expr: NodeId,
    lexemes: &[String],
    start: usize,
    line: usize,
) -> Result<usize> {
    let head = &lexemes[start];
    if head.parse::<i32>().is_ok() {
        arena.push_child(expr, NodeKind::Integer, head.as_str(), line);
        return Ok(start + 1);
    }

    arena.push_child(expr, NodeKind::Operand, head.as_str(), line);
    let mut index = start + 1;
    while index < lexemes.len() && comparison_operator(&lexemes[index]).is_none() {
        push_value(arena, expr, &lexemes[index], line);
        index += 1;
    }
    Ok(index)
}
