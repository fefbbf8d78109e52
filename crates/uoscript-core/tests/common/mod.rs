//! Shared harness for engine integration tests.
//!
//! Builds an engine whose commands record themselves into a shared call
//! log as `cmd NAME args…`, the same shape the demo runner prints. Tests
//! assert on the log instead of capturing stdout.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use uoscript_core::{lexer, Argument, Engine, Result, Script, ScriptError};

pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Engine with recording message commands plus store-facing commands the
/// scenario scripts use.
pub fn recording_engine() -> (Engine, CallLog) {
    let mut engine = Engine::new();
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));

    for name in ["msg", "headmsg", "sysmsg"] {
        let sink = calls.clone();
        engine.register_command(
            name,
            move |engine: &mut Engine,
                  script: &Script,
                  name: &str,
                  args: &[Argument],
                  _quiet: bool,
                  _force: bool|
                  -> Result<bool> {
                sink.borrow_mut().push(render_call(engine, script, name, args)?);
                Ok(true)
            },
        );
    }

    let sink = calls.clone();
    engine.register_command(
        "createlist",
        move |engine: &mut Engine,
              script: &Script,
              name: &str,
              args: &[Argument],
              _quiet: bool,
              _force: bool|
              -> Result<bool> {
            let list = required(args, 0, "createlist")?.as_string(script, engine)?;
            sink.borrow_mut().push(render_call(engine, script, name, args)?);
            engine.create_list(list);
            Ok(true)
        },
    );

    let sink = calls.clone();
    engine.register_command(
        "pushlist",
        move |engine: &mut Engine,
              script: &Script,
              name: &str,
              args: &[Argument],
              _quiet: bool,
              _force: bool|
              -> Result<bool> {
            let list = required(args, 0, "pushlist")?.as_string(script, engine)?;
            let value = required(args, 1, "pushlist")?.clone();
            sink.borrow_mut().push(render_call(engine, script, name, args)?);
            engine.push_list(&list, value, false, false)?;
            Ok(true)
        },
    );

    (engine, calls)
}

pub fn render_call(
    engine: &Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
) -> Result<String> {
    let mut entry = format!("cmd {name}");
    for arg in args {
        entry.push(' ');
        entry.push_str(&arg.as_string(script, engine)?);
    }
    Ok(entry)
}

pub fn required<'a>(args: &'a [Argument], index: usize, name: &str) -> Result<&'a Argument> {
    args.get(index)
        .ok_or_else(|| ScriptError::runtime(None, format!("{name} is missing an argument")))
}

/// Parse and run a script to completion, bounded so a broken control-flow
/// change fails the test instead of hanging it.
pub fn run(engine: &mut Engine, lines: &[&str]) -> Result<()> {
    let tree = lexer::lex(lines.iter().copied())?;
    engine.start(Script::new(tree))?;
    for _ in 0..10_000 {
        if !engine.tick()? {
            return Ok(());
        }
    }
    panic!("script did not finish within 10000 ticks");
}

/// The recorded calls whose command name matches `name`.
pub fn calls_for(log: &CallLog, name: &str) -> Vec<String> {
    let prefix = format!("cmd {name}");
    log.borrow()
        .iter()
        .filter(|entry| {
            entry.as_str() == prefix || entry.starts_with(&format!("{prefix} "))
        })
        .cloned()
        .collect()
}
