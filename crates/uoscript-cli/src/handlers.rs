//! Demo handler catalog for the runner.
//!
//! Every command prints `cmd NAME args…` to stdout and succeeds, so a
//! script can be watched tick by tick without a game client attached. The
//! store-facing commands additionally drive the engine's alias, list, and
//! timer stores, and `pause` drives the execution-state machine, so the
//! whole host surface is exercised by plain script files.

use uoscript_core::{Argument, Engine, Result, Script, ScriptError, Value, ABSENT_SERIAL};

/// Register the whole demo catalog on `engine`.
pub fn register_all(engine: &mut Engine) {
    for name in ["msg", "headmsg", "sysmsg"] {
        engine.register_command(name, cmd_print);
    }
    engine.register_command("pause", cmd_pause);
    engine.register_command("setalias", cmd_setalias);
    engine.register_command("unsetalias", cmd_unsetalias);
    engine.register_command("createlist", cmd_createlist);
    engine.register_command("clearlist", cmd_clearlist);
    engine.register_command("removelist", cmd_removelist);
    engine.register_command("pushlist", cmd_pushlist);
    engine.register_command("poplist", cmd_poplist);
    engine.register_command("createtimer", cmd_createtimer);
    engine.register_command("settimer", cmd_settimer);
    engine.register_command("removetimer", cmd_removetimer);

    engine.register_expression("contains", expr_contains);
    engine.register_expression("listexists", expr_listexists);
    engine.register_expression("list", expr_list);
    engine.register_expression("timer", expr_timer);
    engine.register_expression("timerexists", expr_timerexists);
    engine.register_expression("findalias", expr_findalias);
}

fn render_call(engine: &Engine, script: &Script, name: &str, args: &[Argument]) -> Result<String> {
    let mut line = format!("cmd {name}");
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_string(script, engine)?);
    }
    Ok(line)
}

fn required<'a>(args: &'a [Argument], index: usize, usage: &str) -> Result<&'a Argument> {
    args.get(index)
        .ok_or_else(|| ScriptError::runtime(None, format!("usage: {usage}")))
}

fn cmd_print(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    println!("{}", render_call(engine, script, name, args)?);
    Ok(true)
}

fn cmd_pause(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let ms = required(args, 0, "pause (milliseconds)")?.as_uint(script, engine)? as u64;
    println!("{}", render_call(engine, script, name, args)?);
    engine.pause(ms);
    Ok(true)
}

fn cmd_setalias(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let alias = required(args, 0, "setalias ('name') (serial)")?.as_string(script, engine)?;
    let serial = required(args, 1, "setalias ('name') (serial)")?.as_serial(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.set_alias(alias, serial);
    Ok(true)
}

fn cmd_unsetalias(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let alias = required(args, 0, "unsetalias ('name')")?.as_string(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.set_alias(alias, ABSENT_SERIAL);
    Ok(true)
}

fn cmd_createlist(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let list = required(args, 0, "createlist ('name')")?.as_string(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.create_list(list);
    Ok(true)
}

fn cmd_clearlist(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let list = required(args, 0, "clearlist ('name')")?.as_string(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.clear_list(&list)?;
    Ok(true)
}

fn cmd_removelist(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let list = required(args, 0, "removelist ('name')")?.as_string(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.destroy_list(&list);
    Ok(true)
}

/// `pushlist ('name') ('value') ['front']`; the force modifier makes the
/// push unique.
fn cmd_pushlist(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    force: bool,
) -> Result<bool> {
    let list = required(args, 0, "pushlist ('name') ('value') ['front']")?
        .as_string(script, engine)?;
    let value = required(args, 1, "pushlist ('name') ('value') ['front']")?.clone();
    let front = args
        .get(2)
        .map(|a| a.as_string(script, engine))
        .transpose()?
        .is_some_and(|s| s == "front");
    println!("{}", render_call(engine, script, name, args)?);
    engine.push_list(&list, value, front, force)?;
    Ok(true)
}

/// `poplist ('name') ('value'|'front'|'back')`
fn cmd_poplist(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let list = required(args, 0, "poplist ('name') ('value'|'front'|'back')")?
        .as_string(script, engine)?;
    let which = required(args, 1, "poplist ('name') ('value'|'front'|'back')")?;
    println!("{}", render_call(engine, script, name, args)?);
    match which.lexeme() {
        "front" => {
            engine.pop_list_end(&list, true)?;
        }
        "back" => {
            engine.pop_list_end(&list, false)?;
        }
        _ => {
            engine.pop_list_value(&list, which)?;
        }
    }
    Ok(true)
}

fn cmd_createtimer(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let timer = required(args, 0, "createtimer ('name')")?.as_string(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.create_timer(timer);
    Ok(true)
}

fn cmd_settimer(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let timer = required(args, 0, "settimer ('name') (milliseconds)")?.as_string(script, engine)?;
    let ms = required(args, 1, "settimer ('name') (milliseconds)")?.as_int(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.set_timer(timer, i64::from(ms));
    Ok(true)
}

fn cmd_removetimer(
    engine: &mut Engine,
    script: &Script,
    name: &str,
    args: &[Argument],
    _quiet: bool,
    _force: bool,
) -> Result<bool> {
    let timer = required(args, 0, "removetimer ('name')")?.as_string(script, engine)?;
    println!("{}", render_call(engine, script, name, args)?);
    engine.remove_timer(&timer);
    Ok(true)
}

fn expr_contains(
    engine: &mut Engine,
    script: &Script,
    _name: &str,
    args: &[Argument],
    _quiet: bool,
) -> Result<Value> {
    let list = required(args, 0, "contains ('list') ('value')")?.as_string(script, engine)?;
    let value = required(args, 1, "contains ('list') ('value')")?;
    Ok(Value::Bool(engine.list_contains(&list, value)?))
}

fn expr_listexists(
    engine: &mut Engine,
    script: &Script,
    _name: &str,
    args: &[Argument],
    _quiet: bool,
) -> Result<Value> {
    let list = required(args, 0, "listexists ('list')")?.as_string(script, engine)?;
    Ok(Value::Bool(engine.list_exists(&list)))
}

fn expr_list(
    engine: &mut Engine,
    script: &Script,
    _name: &str,
    args: &[Argument],
    _quiet: bool,
) -> Result<Value> {
    let list = required(args, 0, "list ('list')")?.as_string(script, engine)?;
    let length = engine.list_length(&list)?;
    Ok(Value::Int(length.min(i32::MAX as usize) as i32))
}

fn expr_timer(
    engine: &mut Engine,
    script: &Script,
    _name: &str,
    args: &[Argument],
    _quiet: bool,
) -> Result<Value> {
    let timer = required(args, 0, "timer ('name')")?.as_string(script, engine)?;
    let elapsed = engine.timer_value(&timer)?;
    Ok(Value::Int(
        elapsed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
    ))
}

fn expr_timerexists(
    engine: &mut Engine,
    script: &Script,
    _name: &str,
    args: &[Argument],
    _quiet: bool,
) -> Result<Value> {
    let timer = required(args, 0, "timerexists ('name')")?.as_string(script, engine)?;
    Ok(Value::Bool(engine.timer_exists(&timer)))
}

fn expr_findalias(
    engine: &mut Engine,
    script: &Script,
    _name: &str,
    args: &[Argument],
    _quiet: bool,
) -> Result<Value> {
    let alias = required(args, 0, "findalias ('name')")?.as_string(script, engine)?;
    Ok(Value::Bool(engine.get_alias(&alias) != ABSENT_SERIAL))
}
