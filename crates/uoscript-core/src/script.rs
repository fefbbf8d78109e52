//! The execution cursor: one script walking its AST a statement at a time.
//!
//! A [`Script`] owns the parsed tree, a cursor pointing at the current
//! statement, and a stack of lexical scopes. Each call to
//! [`Script::execute_next`] dispatches on the first child of the current
//! statement: commands invoke their registered handler, control-flow heads
//! evaluate their condition and move the cursor, and terminators unwind by
//! scanning the sibling chain while balancing nested openers and closers.
//!
//! Scopes are anchored to the AST node that opened them. Loops use that
//! anchor to tell first entry (push a scope, seed the iterator) from
//! re-entry (bump the iterator in place). The hidden iterator is keyed by
//! the loop node's arena id, which is stable and unique per node.

use std::collections::HashMap;

use tracing::trace;

use crate::argument::{self, compare, Argument, Value};
use crate::ast::{Arena, NodeId, NodeKind, ScriptTree};
use crate::engine::Engine;
use crate::error::{Result, ScriptError};

/// One level of name bindings, anchored at the control node that opened it.
struct Scope {
    start: NodeId,
    names: HashMap<String, Argument>,
}

impl Scope {
    fn new(start: NodeId) -> Self {
        Self {
            start,
            names: HashMap::new(),
        }
    }
}

/// An executable script: AST plus cursor plus scope chain.
pub struct Script {
    arena: Arena,
    root: NodeId,
    cursor: Option<NodeId>,
    scopes: Vec<Scope>,
}

impl Script {
    /// Build a script positioned at the first statement, with a root scope
    /// anchored there.
    pub fn new(tree: ScriptTree) -> Self {
        let (arena, root) = tree.into_parts();
        let cursor = arena.first_child(root);
        let anchor = cursor.unwrap_or(root);
        Self {
            arena,
            root,
            cursor,
            scopes: vec![Scope::new(anchor)],
        }
    }

    /// Look a name up through the scope chain, innermost first.
    pub fn lookup(&self, name: &str) -> Option<&Argument> {
        self.scopes.iter().rev().find_map(|scope| scope.names.get(name))
    }

    /// Look a name up in the innermost scope only. Loop bookkeeping uses
    /// this so an outer binding of the same name cannot masquerade as the
    /// loop's own variable.
    fn local_var(&self, name: &str) -> Option<&Argument> {
        self.scopes.last().and_then(|scope| scope.names.get(name))
    }

    /// Source line of the statement under the cursor, for diagnostics.
    pub fn current_line(&self) -> Option<usize> {
        self.cursor.map(|id| self.arena.line(id))
    }

    pub(crate) fn set_var(&mut self, name: String, value: Argument) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name, value);
        }
    }

    pub(crate) fn clear_var(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.remove(name);
        }
    }

    fn push_scope(&mut self, start: NodeId) {
        self.scopes.push(Scope::new(start));
    }

    fn pop_scope(&mut self, node: NodeId, what: &str) -> Result<()> {
        if self.scopes.len() <= 1 {
            return Err(ScriptError::runtime(Some(node), format!("unexpected {what}")));
        }
        self.scopes.pop();
        Ok(())
    }

    fn current_scope_start(&self) -> NodeId {
        // The stack always holds at least the root scope.
        self.scopes.last().map(|s| s.start).unwrap_or(self.root)
    }

    /// Move the cursor one statement forward. Advancing also disarms any
    /// pending engine timeout.
    pub(crate) fn advance(&mut self, engine: &mut Engine) {
        engine.clear_timeout();
        self.cursor = self.cursor.and_then(|id| self.arena.next_sibling(id));
    }

    /// Execute one statement (or one unwinding step). Returns `false` once
    /// the cursor has run off the end of the script.
    pub fn execute_next(&mut self, engine: &mut Engine) -> Result<bool> {
        let Some(statement) = self.cursor else {
            return Ok(false);
        };
        if self.arena.kind(statement) != NodeKind::Statement {
            return Err(ScriptError::runtime(Some(statement), "malformed script tree"));
        }
        let head = self
            .arena
            .first_child(statement)
            .ok_or_else(|| ScriptError::runtime(Some(statement), "statement has no content"))?;
        trace!(line = self.arena.line(statement), head = ?self.arena.kind(head), "step");

        match self.arena.kind(head) {
            NodeKind::Command | NodeKind::Quiet | NodeKind::Force => {
                if self.execute_command(engine, head)? {
                    self.advance(engine);
                }
            }
            NodeKind::If => self.execute_if(engine, head)?,
            NodeKind::Elseif | NodeKind::Else => self.skip_to_endif(statement, head)?,
            NodeKind::Endif => {
                self.pop_scope(head, "endif")?;
                self.advance(engine);
            }
            NodeKind::While => self.execute_while(engine, head)?,
            NodeKind::Endwhile => self.rewind_to_opener(
                statement,
                head,
                &[NodeKind::While],
                &[NodeKind::Endwhile],
                "endwhile",
            )?,
            NodeKind::For => self.execute_for(engine, head)?,
            NodeKind::Foreach => self.execute_foreach(engine, head)?,
            NodeKind::Endfor => self.rewind_to_opener(
                statement,
                head,
                &[NodeKind::For, NodeKind::Foreach],
                &[NodeKind::Endfor],
                "endfor",
            )?,
            NodeKind::Break => {
                self.advance(engine);
                self.exit_loop_forward(
                    engine,
                    head,
                    &[NodeKind::While, NodeKind::For, NodeKind::Foreach],
                    &[NodeKind::Endwhile, NodeKind::Endfor],
                    "break outside of a loop",
                )?;
            }
            NodeKind::Continue => self.rewind_to_opener(
                statement,
                head,
                &[NodeKind::While, NodeKind::For, NodeKind::Foreach],
                &[NodeKind::Endwhile, NodeKind::Endfor],
                "continue outside of a loop",
            )?,
            NodeKind::Stop => {
                self.cursor = None;
            }
            NodeKind::Replay => {
                self.cursor = self.arena.first_child(self.root);
            }
            other => {
                return Err(ScriptError::runtime(
                    Some(head),
                    format!("{other:?} cannot start a statement"),
                ))
            }
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Walk leading `Quiet`/`Force`/`Not` markers. Returns the first
    /// non-marker sibling and the collected flags.
    fn evaluate_modifiers(&self, start: NodeId) -> (Option<NodeId>, bool, bool, bool) {
        let mut quiet = false;
        let mut force = false;
        let mut not = false;
        let mut node = Some(start);
        while let Some(id) = node {
            match self.arena.kind(id) {
                NodeKind::Quiet => quiet = true,
                NodeKind::Force => force = true,
                NodeKind::Not => not = true,
                _ => return (Some(id), quiet, force, not),
            }
            node = self.arena.next_sibling(id);
        }
        (None, quiet, force, not)
    }

    /// Wrap the siblings after `node` into arguments, stopping at (and not
    /// consuming) the first logical or comparison operator. The second
    /// element is that terminator, when one was hit.
    fn construct_arguments(&self, node: NodeId) -> (Vec<Argument>, Option<NodeId>) {
        let mut args = Vec::new();
        let mut current = self.arena.next_sibling(node);
        while let Some(id) = current {
            if self.arena.kind(id).ends_arguments() {
                return (args, Some(id));
            }
            args.push(Argument::from_node(&self.arena, id));
            current = self.arena.next_sibling(id);
        }
        (args, None)
    }

    /// Invoke a command handler. The handler's return value decides whether
    /// the cursor advances this tick.
    fn execute_command(&mut self, engine: &mut Engine, head: NodeId) -> Result<bool> {
        let (node, quiet, force, _) = self.evaluate_modifiers(head);
        let node = node.ok_or_else(|| {
            ScriptError::runtime(Some(head), "expected a command after its modifiers")
        })?;
        if self.arena.kind(node) != NodeKind::Command {
            return Err(ScriptError::runtime(Some(node), "expected a command"));
        }
        let name = self.arena.lexeme(node).to_owned();
        let handler = engine
            .command_handler(&name)
            .ok_or_else(|| ScriptError::runtime(Some(node), format!("unknown command '{name}'")))?;
        let (args, rest) = self.construct_arguments(node);
        let advance = handler(engine, self, &name, &args, quiet, force)?;
        if rest.is_some() {
            return Err(ScriptError::runtime(
                rest,
                "command did not consume all available arguments",
            ));
        }
        Ok(advance)
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    fn execute_if(&mut self, engine: &mut Engine, head: NodeId) -> Result<()> {
        self.push_scope(head);
        let condition = self.evaluate_expression(engine, self.arena.first_child(head), head)?;
        self.advance(engine);
        if condition {
            return Ok(());
        }

        // Condition failed: hunt for an elseif/else to enter, or land on
        // the matching endif so the next tick pops the scope.
        let mut depth = 0usize;
        let mut stmt = self.cursor;
        while let Some(s) = stmt {
            let node = self
                .arena
                .first_child(s)
                .ok_or_else(|| ScriptError::runtime(Some(s), "statement has no content"))?;
            match self.arena.kind(node) {
                NodeKind::If => depth += 1,
                NodeKind::Elseif if depth == 0 => {
                    let taken =
                        self.evaluate_expression(engine, self.arena.first_child(node), node)?;
                    if taken {
                        self.cursor = Some(s);
                        self.advance(engine);
                        return Ok(());
                    }
                }
                NodeKind::Else if depth == 0 => {
                    self.cursor = Some(s);
                    self.advance(engine);
                    return Ok(());
                }
                NodeKind::Endif => {
                    if depth == 0 {
                        self.cursor = Some(s);
                        return Ok(());
                    }
                    depth -= 1;
                }
                _ => {}
            }
            stmt = self.arena.next_sibling(s);
        }
        Err(ScriptError::runtime(Some(head), "if has no matching endif"))
    }

    /// An `elseif`/`else` reached by normal advance means the branch above
    /// it just finished; skip to the matching endif.
    fn skip_to_endif(&mut self, statement: NodeId, head: NodeId) -> Result<()> {
        let mut depth = 0usize;
        let mut stmt = self.arena.next_sibling(statement);
        while let Some(s) = stmt {
            let node = self
                .arena
                .first_child(s)
                .ok_or_else(|| ScriptError::runtime(Some(s), "statement has no content"))?;
            match self.arena.kind(node) {
                NodeKind::If => depth += 1,
                NodeKind::Endif => {
                    if depth == 0 {
                        self.cursor = Some(s);
                        return Ok(());
                    }
                    depth -= 1;
                }
                _ => {}
            }
            stmt = self.arena.next_sibling(s);
        }
        Err(ScriptError::runtime(Some(head), "if has no matching endif"))
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn execute_while(&mut self, engine: &mut Engine, head: NodeId) -> Result<()> {
        if self.current_scope_start() != head {
            self.push_scope(head);
        }
        let condition = self.evaluate_expression(engine, self.arena.first_child(head), head)?;
        self.advance(engine);
        if condition {
            return Ok(());
        }
        self.exit_loop_forward(
            engine,
            head,
            &[NodeKind::While],
            &[NodeKind::Endwhile],
            "while has no matching endwhile",
        )
    }

    fn execute_for(&mut self, engine: &mut Engine, head: NodeId) -> Result<()> {
        let count_node = self
            .arena
            .first_child(head)
            .ok_or_else(|| ScriptError::runtime(Some(head), "for expects a loop count"))?;
        if self.arena.kind(count_node) != NodeKind::Integer {
            return Err(ScriptError::runtime(
                Some(count_node),
                "for loop count must be an integer",
            ));
        }
        let iter_name = format!("__loop_{}", head.index());

        let iterator = if self.current_scope_start() != head {
            self.push_scope(head);
            let seed = Argument::new(NodeKind::Integer, "0");
            self.set_var(iter_name, seed.clone());
            seed
        } else {
            let current = self
                .local_var(&iter_name)
                .cloned()
                .ok_or_else(|| ScriptError::runtime(Some(head), "loop iterator went missing"))?;
            let next = current.as_int(self, engine)? + 1;
            let bumped = Argument::new(NodeKind::Integer, next.to_string());
            self.set_var(iter_name, bumped.clone());
            bumped
        };

        let bound = Argument::from_node(&self.arena, count_node);
        self.advance(engine);
        if iterator.as_int(self, engine)? < bound.as_int(self, engine)? {
            return Ok(());
        }
        self.exit_loop_forward(
            engine,
            head,
            &[NodeKind::For, NodeKind::Foreach],
            &[NodeKind::Endfor],
            "for has no matching endfor",
        )
    }

    fn execute_foreach(&mut self, engine: &mut Engine, head: NodeId) -> Result<()> {
        let var_node = self
            .arena
            .first_child(head)
            .ok_or_else(|| ScriptError::runtime(Some(head), "foreach expects a variable"))?;
        let list_node = self
            .arena
            .next_sibling(var_node)
            .ok_or_else(|| ScriptError::runtime(Some(head), "foreach expects a list name"))?;
        let var_name = self.arena.lexeme(var_node).to_owned();
        let list_name = self.arena.lexeme(list_node).to_owned();
        let iter_name = format!("__loop_{}", head.index());

        let index = if self.current_scope_start() != head {
            self.push_scope(head);
            0
        } else {
            let current = self
                .local_var(&iter_name)
                .cloned()
                .ok_or_else(|| ScriptError::runtime(Some(head), "loop iterator went missing"))?;
            current.as_int(self, engine)? + 1
        };
        self.set_var(iter_name, Argument::new(NodeKind::Integer, index.to_string()));

        match engine.get_list_value(&list_name, index as usize)? {
            Some(item) => self.set_var(var_name.clone(), item),
            None => self.clear_var(&var_name),
        }

        self.advance(engine);
        if self.local_var(&var_name).is_some() {
            return Ok(());
        }
        self.exit_loop_forward(
            engine,
            head,
            &[NodeKind::For, NodeKind::Foreach],
            &[NodeKind::Endfor],
            "foreach has no matching endfor",
        )
    }

    /// Forward-scan from the cursor for the matching closer, balancing
    /// nested openers; pop the loop scope and land one statement past it.
    fn exit_loop_forward(
        &mut self,
        engine: &mut Engine,
        origin: NodeId,
        openers: &[NodeKind],
        closers: &[NodeKind],
        missing: &str,
    ) -> Result<()> {
        let mut depth = 0usize;
        let mut stmt = self.cursor;
        while let Some(s) = stmt {
            let node = self
                .arena
                .first_child(s)
                .ok_or_else(|| ScriptError::runtime(Some(s), "statement has no content"))?;
            let kind = self.arena.kind(node);
            if openers.contains(&kind) {
                depth += 1;
            } else if closers.contains(&kind) {
                if depth == 0 {
                    self.pop_scope(node, "end of scope")?;
                    self.cursor = Some(s);
                    self.advance(engine);
                    return Ok(());
                }
                depth -= 1;
            }
            stmt = self.arena.next_sibling(s);
        }
        Err(ScriptError::runtime(Some(origin), missing))
    }

    /// Backward-scan from `statement` for the loop opener, balancing
    /// nested closers. The cursor lands on the opener so the next tick
    /// re-evaluates it.
    fn rewind_to_opener(
        &mut self,
        statement: NodeId,
        head: NodeId,
        openers: &[NodeKind],
        closers: &[NodeKind],
        what: &str,
    ) -> Result<()> {
        let mut depth = 0usize;
        let mut stmt = self.arena.prev_sibling(statement);
        while let Some(s) = stmt {
            let node = self
                .arena
                .first_child(s)
                .ok_or_else(|| ScriptError::runtime(Some(s), "statement has no content"))?;
            let kind = self.arena.kind(node);
            if closers.contains(&kind) {
                depth += 1;
            } else if openers.contains(&kind) {
                if depth == 0 {
                    self.cursor = Some(s);
                    return Ok(());
                }
                depth -= 1;
            }
            stmt = self.arena.prev_sibling(s);
        }
        Err(ScriptError::runtime(Some(head), format!("unexpected {what}")))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn evaluate_expression(
        &mut self,
        engine: &mut Engine,
        expr: Option<NodeId>,
        owner: NodeId,
    ) -> Result<bool> {
        let expr = expr.ok_or_else(|| {
            ScriptError::runtime(Some(owner), "control statement is missing its expression")
        })?;
        match self.arena.kind(expr) {
            NodeKind::UnaryExpression | NodeKind::BinaryExpression => {
                self.evaluate_subexpression(engine, expr)
            }
            NodeKind::LogicalExpression => {
                let first = self.arena.first_child(expr).ok_or_else(|| {
                    ScriptError::runtime(Some(expr), "empty logical expression")
                })?;
                let mut value = self.evaluate_subexpression(engine, first)?;
                let mut node = self.arena.next_sibling(first);
                while let Some(op_node) = node {
                    let op = self.arena.kind(op_node);
                    if op != NodeKind::And && op != NodeKind::Or {
                        return Err(ScriptError::runtime(
                            Some(op_node),
                            "malformed logical expression",
                        ));
                    }
                    let rhs_node = self.arena.next_sibling(op_node).ok_or_else(|| {
                        ScriptError::runtime(Some(op_node), "logical expression is missing an operand")
                    })?;
                    // Both sides always evaluate; and/or never short-circuit.
                    let rhs = self.evaluate_subexpression(engine, rhs_node)?;
                    value = if op == NodeKind::And {
                        value && rhs
                    } else {
                        value || rhs
                    };
                    node = self.arena.next_sibling(rhs_node);
                }
                Ok(value)
            }
            _ => Err(ScriptError::runtime(Some(expr), "expected an expression")),
        }
    }

    fn evaluate_subexpression(&mut self, engine: &mut Engine, expr: NodeId) -> Result<bool> {
        let first = self
            .arena
            .first_child(expr)
            .ok_or_else(|| ScriptError::runtime(Some(expr), "empty expression"))?;
        match self.arena.kind(expr) {
            NodeKind::UnaryExpression => self.evaluate_unary(engine, first),
            NodeKind::BinaryExpression => self.evaluate_binary(engine, first),
            _ => Err(ScriptError::runtime(
                Some(expr),
                "logical expressions cannot nest",
            )),
        }
    }

    /// A unary expression is a handler call whose result is compared to
    /// `true` (or `false` under `not`) with the generic comparator.
    fn evaluate_unary(&mut self, engine: &mut Engine, first: NodeId) -> Result<bool> {
        let (node, quiet, _force, not) = self.evaluate_modifiers(first);
        let node = node.ok_or_else(|| {
            ScriptError::runtime(Some(first), "expected an expression after its modifiers")
        })?;
        let name = self.arena.lexeme(node).to_owned();
        let handler = engine.expression_handler(&name).ok_or_else(|| {
            ScriptError::runtime(Some(node), format!("unknown expression '{name}'"))
        })?;
        let (args, _) = self.construct_arguments(node);
        let value = handler(engine, self, &name, &args, quiet)?;
        compare(NodeKind::Equal, &value, &Value::Bool(!not))
    }

    fn evaluate_binary(&mut self, engine: &mut Engine, first: NodeId) -> Result<bool> {
        let (lhs, after_lhs) = self.evaluate_binary_operand(engine, first)?;
        let op_node = after_lhs.ok_or_else(|| {
            ScriptError::runtime(Some(first), "binary expression is missing its operator")
        })?;
        let op = self.arena.kind(op_node);
        if !op.is_comparison() {
            return Err(ScriptError::runtime(
                Some(op_node),
                "expected a comparison operator",
            ));
        }
        let rhs_node = self.arena.next_sibling(op_node).ok_or_else(|| {
            ScriptError::runtime(Some(op_node), "binary expression is missing its right operand")
        })?;
        let (rhs, _) = self.evaluate_binary_operand(engine, rhs_node)?;
        compare(op, &lhs, &rhs)
    }

    /// Evaluate one side of a binary expression to a comparable value.
    /// Returns the value and the first sibling not consumed by it.
    fn evaluate_binary_operand(
        &mut self,
        engine: &mut Engine,
        node: NodeId,
    ) -> Result<(Value, Option<NodeId>)> {
        let lexeme = self.arena.lexeme(node).to_owned();
        let value = match self.arena.kind(node) {
            NodeKind::Integer => Value::Int(argument::parse_int(&lexeme)?),
            NodeKind::Serial => Value::Uint(argument::parse_uint(&lexeme)?),
            NodeKind::String => Value::Str(lexeme),
            NodeKind::Double => Value::Double(argument::parse_double(&lexeme)?),
            NodeKind::Operand | NodeKind::Command => {
                // A registered keyword evaluates through its handler;
                // anything else is just a string.
                return match engine.expression_handler(&lexeme) {
                    Some(handler) => {
                        let (args, rest) = self.construct_arguments(node);
                        let value = handler(engine, self, &lexeme, &args, false)?;
                        Ok((value, rest))
                    }
                    None => Ok((Value::Str(lexeme), self.arena.next_sibling(node))),
                };
            }
            other => {
                return Err(ScriptError::runtime(
                    Some(node),
                    format!("{other:?} cannot be a binary operand"),
                ))
            }
        };
        Ok((value, self.arena.next_sibling(node)))
    }
}
