//! Engine state: handler registries, alias/list/timer stores, and the
//! cooperative driver.
//!
//! The engine never knows what any particular command does. Hosts register
//! command, expression, and alias handlers by name; the interpreter looks
//! them up at their lexical point of use. One script at a time is active,
//! and [`Engine::tick`] advances it by exactly one statement (or one
//! control-flow unwinding step) before returning to the host loop.
//!
//! Everything here is single-threaded by contract. Handlers are `Rc`
//! closures so a host can capture its own state without locking.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::argument::{Argument, Value};
use crate::error::{Result, ScriptError};
use crate::script::Script;

/// Sentinel serial meaning "no such alias".
pub const ABSENT_SERIAL: u32 = u32::MAX;

/// Executes a command statement. Returning `false` stalls the script: the
/// cursor stays put and the next tick re-invokes the handler.
pub type CommandHandler =
    Rc<dyn Fn(&mut Engine, &Script, &str, &[Argument], bool, bool) -> Result<bool>>;

/// Evaluates a named expression inside a condition.
pub type ExpressionHandler =
    Rc<dyn Fn(&mut Engine, &Script, &str, &[Argument], bool) -> Result<Value>>;

/// Computes an alias serial dynamically.
pub type AliasHandler = Rc<dyn Fn(&Engine, &str) -> u32>;

/// Decides what happens when a timeout deadline passes: `true` advances the
/// script past the stalled statement, `false` stops it.
pub type TimeoutCallback = Rc<dyn Fn(&mut Engine) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionState {
    Running,
    Paused { until: Instant },
    TimingOut { until: Instant },
}

/// Process-wide scripting state and the single-script driver.
pub struct Engine {
    commands: HashMap<String, CommandHandler>,
    expressions: HashMap<String, ExpressionHandler>,
    alias_handlers: HashMap<String, AliasHandler>,
    aliases: HashMap<String, u32>,
    lists: HashMap<String, Vec<Argument>>,
    timers: HashMap<String, Instant>,
    script: Option<Script>,
    /// Stays true for the whole tick even while `script` is checked out,
    /// so `start` from inside a handler cannot steal the slot and `stop`
    /// from inside a handler is not undone by the put-back.
    active: bool,
    state: ExecutionState,
    timeout_callback: Option<TimeoutCallback>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            expressions: HashMap::new(),
            alias_handlers: HashMap::new(),
            aliases: HashMap::new(),
            lists: HashMap::new(),
            timers: HashMap::new(),
            script: None,
            active: false,
            state: ExecutionState::Running,
            timeout_callback: None,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a command handler, replacing any prior binding.
    pub fn register_command<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Engine, &Script, &str, &[Argument], bool, bool) -> Result<bool> + 'static,
    {
        let name = name.into();
        debug!(name = %name, "registered command");
        self.commands.insert(name, Rc::new(handler));
    }

    /// Register an expression handler, replacing any prior binding.
    pub fn register_expression<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Engine, &Script, &str, &[Argument], bool) -> Result<Value> + 'static,
    {
        let name = name.into();
        debug!(name = %name, "registered expression");
        self.expressions.insert(name, Rc::new(handler));
    }

    /// Register a dynamic alias handler, replacing any prior binding.
    pub fn register_alias_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Engine, &str) -> u32 + 'static,
    {
        let name = name.into();
        debug!(name = %name, "registered alias handler");
        self.alias_handlers.insert(name, Rc::new(handler));
    }

    pub fn unregister_alias_handler(&mut self, name: &str) {
        self.alias_handlers.remove(name);
    }

    pub fn command_handler(&self, name: &str) -> Option<CommandHandler> {
        self.commands.get(name).cloned()
    }

    pub fn expression_handler(&self, name: &str) -> Option<ExpressionHandler> {
        self.expressions.get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Aliases
    // ------------------------------------------------------------------

    /// Resolve an alias. Dynamic handlers win over the static map;
    /// [`ABSENT_SERIAL`] means the name is not bound at all.
    pub fn get_alias(&self, name: &str) -> u32 {
        if let Some(handler) = self.alias_handlers.get(name).cloned() {
            return handler(self, name);
        }
        self.aliases.get(name).copied().unwrap_or(ABSENT_SERIAL)
    }

    pub fn set_alias(&mut self, name: impl Into<String>, serial: u32) {
        self.aliases.insert(name.into(), serial);
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    fn list(&self, name: &str) -> Result<&Vec<Argument>> {
        self.lists
            .get(name)
            .ok_or_else(|| ScriptError::runtime(None, format!("list '{name}' does not exist")))
    }

    fn list_mut(&mut self, name: &str) -> Result<&mut Vec<Argument>> {
        self.lists
            .get_mut(name)
            .ok_or_else(|| ScriptError::runtime(None, format!("list '{name}' does not exist")))
    }

    /// Create a list. Creating a list that already exists keeps its contents.
    pub fn create_list(&mut self, name: impl Into<String>) {
        self.lists.entry(name.into()).or_default();
    }

    pub fn destroy_list(&mut self, name: &str) {
        self.lists.remove(name);
    }

    pub fn clear_list(&mut self, name: &str) -> Result<()> {
        self.list_mut(name)?.clear();
        Ok(())
    }

    pub fn list_exists(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    pub fn list_contains(&self, name: &str, value: &Argument) -> Result<bool> {
        Ok(self.list(name)?.contains(value))
    }

    pub fn list_length(&self, name: &str) -> Result<usize> {
        Ok(self.list(name)?.len())
    }

    /// Append (or prepend) a value. With `unique`, a value already present
    /// (by lexeme) leaves the list untouched.
    pub fn push_list(&mut self, name: &str, value: Argument, front: bool, unique: bool) -> Result<()> {
        let list = self.list_mut(name)?;
        if unique && list.contains(&value) {
            return Ok(());
        }
        if front {
            list.insert(0, value);
        } else {
            list.push(value);
        }
        Ok(())
    }

    /// Remove the first element equal to `value`. Returns whether anything
    /// was removed.
    pub fn pop_list_value(&mut self, name: &str, value: &Argument) -> Result<bool> {
        let list = self.list_mut(name)?;
        match list.iter().position(|item| item == value) {
            Some(index) => {
                list.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove from the front or back. `None` when the list is empty.
    pub fn pop_list_end(&mut self, name: &str, front: bool) -> Result<Option<Argument>> {
        let list = self.list_mut(name)?;
        if front {
            if list.is_empty() {
                return Ok(None);
            }
            Ok(Some(list.remove(0)))
        } else {
            Ok(list.pop())
        }
    }

    pub fn get_list_value(&self, name: &str, index: usize) -> Result<Option<Argument>> {
        Ok(self.list(name)?.get(index).cloned())
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Create (or restart) a timer stamped at the current instant.
    pub fn create_timer(&mut self, name: impl Into<String>) {
        self.timers.insert(name.into(), Instant::now());
    }

    /// Elapsed milliseconds since the timer's stamp. Negative when the
    /// timer was set into the future.
    pub fn timer_value(&self, name: &str) -> Result<i64> {
        let start = self
            .timers
            .get(name)
            .ok_or_else(|| ScriptError::runtime(None, format!("timer '{name}' does not exist")))?;
        let now = Instant::now();
        Ok(match now.checked_duration_since(*start) {
            Some(elapsed) => elapsed.as_millis() as i64,
            None => -(start.saturating_duration_since(now).as_millis() as i64),
        })
    }

    /// Force a timer's elapsed value. Always succeeds, creating the timer
    /// if needed. A negative value stamps the start in the future.
    pub fn set_timer(&mut self, name: impl Into<String>, elapsed_ms: i64) {
        let now = Instant::now();
        let start = if elapsed_ms >= 0 {
            now.checked_sub(Duration::from_millis(elapsed_ms as u64))
                .unwrap_or(now)
        } else {
            now + Duration::from_millis(elapsed_ms.unsigned_abs())
        };
        self.timers.insert(name.into(), start);
    }

    pub fn remove_timer(&mut self, name: &str) {
        self.timers.remove(name);
    }

    pub fn timer_exists(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    // ------------------------------------------------------------------
    // Execution state
    // ------------------------------------------------------------------

    /// Suspend execution for `ms` milliseconds. Ignored unless running.
    pub fn pause(&mut self, ms: u64) {
        if self.state != ExecutionState::Running {
            return;
        }
        self.state = ExecutionState::Paused {
            until: Instant::now() + Duration::from_millis(ms),
        };
        debug!(ms, "script paused");
    }

    /// Resume a paused script immediately.
    pub fn unpause(&mut self) {
        if let ExecutionState::Paused { .. } = self.state {
            self.state = ExecutionState::Running;
            debug!("script unpaused");
        }
    }

    /// Arm a timeout. The script keeps executing; if the deadline passes
    /// before the cursor advances, `callback` decides whether to skip the
    /// stalled statement or stop the script. Ignored unless running.
    pub fn timeout<F>(&mut self, ms: u64, callback: F)
    where
        F: Fn(&mut Engine) -> bool + 'static,
    {
        if self.state != ExecutionState::Running {
            return;
        }
        self.state = ExecutionState::TimingOut {
            until: Instant::now() + Duration::from_millis(ms),
        };
        self.timeout_callback = Some(Rc::new(callback));
        debug!(ms, "timeout armed");
    }

    /// Disarm a pending timeout. No-op in any other state. The interpreter
    /// calls this implicitly every time the cursor advances a statement.
    pub fn clear_timeout(&mut self) {
        if let ExecutionState::TimingOut { .. } = self.state {
            self.state = ExecutionState::Running;
            self.timeout_callback = None;
        }
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    /// Install `script` as the active script and run one tick. Returns
    /// `Ok(false)` without touching anything if a script is already active.
    pub fn start(&mut self, script: Script) -> Result<bool> {
        if self.active {
            return Ok(false);
        }
        self.active = true;
        self.state = ExecutionState::Running;
        self.timeout_callback = None;
        self.script = Some(script);
        debug!("script started");
        self.tick()?;
        Ok(true)
    }

    /// Discard the active script and reset the execution state. Safe to
    /// call from inside a command handler.
    pub fn stop(&mut self) {
        self.script = None;
        self.active = false;
        self.state = ExecutionState::Running;
        self.timeout_callback = None;
        debug!("script stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Run one tick. Returns `true` while a script is still active.
    /// Errors abort the active script; aliases, lists, and timers survive.
    pub fn tick(&mut self) -> Result<bool> {
        let Some(mut script) = self.script.take() else {
            self.active = false;
            return Ok(false);
        };

        match self.state {
            ExecutionState::Running => {}
            ExecutionState::Paused { until } => {
                if Instant::now() < until {
                    self.script = Some(script);
                    return Ok(true);
                }
                self.state = ExecutionState::Running;
                debug!("pause elapsed, resuming");
            }
            ExecutionState::TimingOut { until } => {
                if Instant::now() >= until {
                    let resumed = match self.timeout_callback.take() {
                        Some(callback) => callback(self),
                        None => false,
                    };
                    if resumed {
                        // Skip the statement the script was stuck on. The
                        // advance also disarms the timeout state.
                        script.advance(self);
                        self.state = ExecutionState::Running;
                        debug!("timeout elapsed, skipping statement");
                    } else {
                        self.active = false;
                        self.state = ExecutionState::Running;
                        debug!("timeout elapsed, stopping script");
                        return Ok(false);
                    }
                }
            }
        }

        match script.execute_next(self) {
            Ok(true) => {
                if self.active {
                    self.script = Some(script);
                    Ok(true)
                } else {
                    // A handler called stop() mid-tick.
                    Ok(false)
                }
            }
            Ok(false) => {
                self.active = false;
                debug!("script completed");
                Ok(false)
            }
            Err(error) => {
                self.active = false;
                self.state = ExecutionState::Running;
                self.timeout_callback = None;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn arg(lexeme: &str) -> Argument {
        Argument::new(NodeKind::String, lexeme)
    }

    #[test]
    fn alias_store_with_sentinel() {
        let mut engine = Engine::new();
        assert_eq!(engine.get_alias("mount"), ABSENT_SERIAL);
        engine.set_alias("mount", 0x1234);
        assert_eq!(engine.get_alias("mount"), 0x1234);
    }

    #[test]
    fn alias_handlers_win_over_the_static_map() {
        let mut engine = Engine::new();
        engine.set_alias("self", 1);
        engine.register_alias_handler("self", |_, _| 0x99);
        assert_eq!(engine.get_alias("self"), 0x99);
        engine.unregister_alias_handler("self");
        assert_eq!(engine.get_alias("self"), 1);
    }

    #[test]
    fn registration_overwrites() {
        let mut engine = Engine::new();
        engine.register_alias_handler("x", |_, _| 1);
        engine.register_alias_handler("x", |_, _| 2);
        assert_eq!(engine.get_alias("x"), 2);
    }

    #[test]
    fn list_operations_require_existence() {
        let mut engine = Engine::new();
        assert!(engine.clear_list("loot").is_err());
        assert!(engine.list_length("loot").is_err());
        assert!(engine.push_list("loot", arg("gold"), false, false).is_err());
        assert!(engine.list_contains("loot", &arg("gold")).is_err());
        // create / exists / destroy never fail.
        assert!(!engine.list_exists("loot"));
        engine.create_list("loot");
        assert!(engine.list_exists("loot"));
        engine.destroy_list("loot");
        assert!(!engine.list_exists("loot"));
    }

    #[test]
    fn list_push_pop_and_indexing() {
        let mut engine = Engine::new();
        engine.create_list("loot");
        engine.push_list("loot", arg("gold"), false, false).unwrap();
        engine.push_list("loot", arg("gem"), false, false).unwrap();
        engine.push_list("loot", arg("key"), true, false).unwrap();
        assert_eq!(engine.list_length("loot").unwrap(), 3);
        assert_eq!(
            engine.get_list_value("loot", 0).unwrap().unwrap().lexeme(),
            "key"
        );
        assert!(engine.get_list_value("loot", 9).unwrap().is_none());

        assert!(engine.pop_list_value("loot", &arg("gold")).unwrap());
        assert!(!engine.pop_list_value("loot", &arg("gold")).unwrap());

        let back = engine.pop_list_end("loot", false).unwrap().unwrap();
        assert_eq!(back.lexeme(), "gem");
        let front = engine.pop_list_end("loot", true).unwrap().unwrap();
        assert_eq!(front.lexeme(), "key");
        assert!(engine.pop_list_end("loot", true).unwrap().is_none());
    }

    #[test]
    fn unique_push_skips_duplicates() {
        let mut engine = Engine::new();
        engine.create_list("loot");
        engine.push_list("loot", arg("gold"), false, true).unwrap();
        engine.push_list("loot", arg("gold"), false, true).unwrap();
        assert_eq!(engine.list_length("loot").unwrap(), 1);
        engine.push_list("loot", arg("gold"), false, false).unwrap();
        assert_eq!(engine.list_length("loot").unwrap(), 2);
    }

    #[test]
    fn recreating_a_list_keeps_contents() {
        let mut engine = Engine::new();
        engine.create_list("loot");
        engine.push_list("loot", arg("gold"), false, false).unwrap();
        engine.create_list("loot");
        assert_eq!(engine.list_length("loot").unwrap(), 1);
    }

    #[test]
    fn timer_lifecycle() {
        let mut engine = Engine::new();
        assert!(engine.timer_value("t").is_err());
        assert!(!engine.timer_exists("t"));

        engine.create_timer("t");
        assert!(engine.timer_exists("t"));
        let elapsed = engine.timer_value("t").unwrap();
        assert!((0..1000).contains(&elapsed));

        engine.set_timer("t", 5000);
        let elapsed = engine.timer_value("t").unwrap();
        assert!(elapsed >= 5000 && elapsed < 6000);

        engine.remove_timer("t");
        assert!(engine.timer_value("t").is_err());
    }

    #[test]
    fn set_timer_accepts_negative_elapsed() {
        let mut engine = Engine::new();
        engine.set_timer("future", -5000);
        let elapsed = engine.timer_value("future").unwrap();
        assert!(elapsed <= -4000, "expected negative elapsed, got {elapsed}");
    }

    #[test]
    fn tick_without_a_script_is_false() {
        let mut engine = Engine::new();
        assert!(!engine.tick().unwrap());
        assert!(!engine.is_active());
    }
}
