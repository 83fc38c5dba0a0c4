// objsh baseline commands
//
// The minimal command set the substrate installs into a fresh interp:
// variables, lists, control flow, procs, namespaces. The class runtime's
// commands live in builtins.rs, not here.

use crate::interp::{CmdFn, Interp, Procedure};
use crate::namespace::GLOBAL_NS;
use crate::reader;
use crate::types::{list_join, CmdResult, Exception, ResultCode, Value};

/// Install the baseline command set into an interp.
pub fn install<Ctx>(interp: &mut Interp<Ctx>) {
    let table: &[(&str, CmdFn<Ctx>)] = &[
        ("append", cmd_append),
        ("break", cmd_break),
        ("catch", cmd_catch),
        ("continue", cmd_continue),
        ("error", cmd_error),
        ("if", cmd_if),
        ("incr", cmd_incr),
        ("lappend", cmd_lappend),
        ("lindex", cmd_lindex),
        ("list", cmd_list),
        ("llength", cmd_llength),
        ("namespace", cmd_namespace),
        ("proc", cmd_proc),
        ("puts", cmd_puts),
        ("rename", cmd_rename),
        ("return", cmd_return),
        ("set", cmd_set),
        ("unset", cmd_unset),
        ("while", cmd_while),
    ];
    for &(name, func) in table {
        interp.add_command(GLOBAL_NS, name, func, 0);
    }
}

fn arity(argv: &[Value], min: usize, max: Option<usize>, usage: &str) -> Result<(), Exception> {
    let n = argv.len() - 1;
    if n < min || max.map(|m| n > m).unwrap_or(false) {
        return Err(Exception::error(format!(
            "wrong # args: should be \"{} {}\"",
            argv[0], usage
        )));
    }
    Ok(())
}

fn cmd_set<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, Some(2), "varName ?newValue?")?;
    if argv.len() == 3 {
        interp.set_var(ctx, argv[1].as_str(), argv[2].clone())?;
        Ok(argv[2].clone())
    } else {
        interp.get_var(ctx, argv[1].as_str())
    }
}

fn cmd_unset<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, None, "varName ?varName ...?")?;
    for name in &argv[1..] {
        interp.unset_var(ctx, name.as_str())?;
    }
    Ok(Value::empty())
}

fn cmd_return<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 0, Some(1), "?value?")?;
    Err(Exception::ret(argv.get(1).cloned().unwrap_or_default()))
}

fn cmd_error<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, Some(1), "message")?;
    Err(Exception::error(argv[1].clone()))
}

fn cmd_break<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 0, Some(0), "")?;
    Err(Exception::brk())
}

fn cmd_continue<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 0, Some(0), "")?;
    Err(Exception::cont())
}

fn cmd_list<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    Ok(list_join(&argv[1..]))
}

fn cmd_llength<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, Some(1), "list")?;
    let words = reader::parse_list(argv[1].as_str())
        .map_err(|e| Exception::error(e.to_string()))?;
    Ok(Value::from(words.len()))
}

fn cmd_lindex<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 2, Some(2), "list index")?;
    let words = reader::parse_list(argv[1].as_str())
        .map_err(|e| Exception::error(e.to_string()))?;
    let idx = argv[2].as_int()?;
    if idx < 0 || idx as usize >= words.len() {
        return Ok(Value::empty());
    }
    Ok(Value::from(words[idx as usize].as_str()))
}

fn cmd_lappend<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, None, "varName ?value ...?")?;
    let name = argv[1].as_str();
    let mut words: Vec<Value> = if interp.var_exists(ctx, name) {
        reader::parse_list(interp.get_var(ctx, name)?.as_str())
            .map_err(|e| Exception::error(e.to_string()))?
            .into_iter()
            .map(|w| Value::from(w.as_str()))
            .collect()
    } else {
        Vec::new()
    };
    words.extend(argv[2..].iter().cloned());
    let value = list_join(&words);
    interp.set_var(ctx, name, value.clone())?;
    Ok(value)
}

fn cmd_append<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, None, "varName ?value ...?")?;
    let name = argv[1].as_str();
    let mut text = if interp.var_exists(ctx, name) {
        interp.get_var(ctx, name)?.to_string()
    } else {
        String::new()
    };
    for v in &argv[2..] {
        text.push_str(v.as_str());
    }
    let value = Value::from(text);
    interp.set_var(ctx, name, value.clone())?;
    Ok(value)
}

fn cmd_incr<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, Some(2), "varName ?increment?")?;
    let name = argv[1].as_str();
    let amount = match argv.get(2) {
        Some(v) => v.as_int()?,
        None => 1,
    };
    let current = if interp.var_exists(ctx, name) {
        interp.get_var(ctx, name)?.as_int()?
    } else {
        0
    };
    let value = Value::from(current + amount);
    interp.set_var(ctx, name, value.clone())?;
    Ok(value)
}

fn eval_cond<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, cond: &Value) -> Result<bool, Exception> {
    interp.subst_text(ctx, cond.as_str())?.as_bool()
}

fn cmd_if<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 2, Some(4), "condition thenBody ?else elseBody?")?;
    if argv.len() == 5 && argv[3] != "else" {
        return Err(Exception::error(format!(
            "expected \"else\" but got \"{}\"",
            argv[3]
        )));
    }
    if eval_cond(interp, ctx, &argv[1])? {
        interp.eval_body(ctx, argv[2].as_str())
    } else if argv.len() == 5 {
        interp.eval_body(ctx, argv[4].as_str())
    } else {
        Ok(Value::empty())
    }
}

fn cmd_while<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 2, Some(2), "condition body")?;
    while eval_cond(interp, ctx, &argv[1])? {
        match interp.eval_body(ctx, argv[2].as_str()) {
            Ok(_) => {}
            Err(e) if e.code == ResultCode::Break => break,
            Err(e) if e.code == ResultCode::Continue => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Value::empty())
}

fn cmd_catch<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, Some(2), "script ?resultVarName?")?;
    let (code, value) = match interp.eval_body(ctx, argv[1].as_str()) {
        Ok(v) => (0i64, v),
        Err(e) => {
            let code = match e.code {
                ResultCode::Error => 1,
                ResultCode::Return => 2,
                ResultCode::Break => 3,
                ResultCode::Continue => 4,
            };
            (code, e.value)
        }
    };
    if let Some(var) = argv.get(2) {
        interp.set_var(ctx, var.as_str(), value)?;
    }
    Ok(Value::from(code))
}

fn cmd_proc<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 3, Some(3), "name params body")?;
    let _ = ctx;
    let params = crate::interp::parse_params(argv[2].as_str())?;
    let name = argv[1].as_str();

    // A qualified proc name lands in its namespace; a bare name lands in
    // the current one.
    let (ns, simple) = match crate::namespace::split_tail(name) {
        Some((quals, tail)) => {
            let ns = interp
                .find_namespace(interp.current_ns(), quals)
                .ok_or_else(|| {
                    Exception::error(format!(
                        "can't create procedure \"{}\": unknown namespace",
                        name
                    ))
                })?;
            (ns, tail.to_string())
        }
        None => (interp.current_ns(), name.to_string()),
    };

    interp.add_proc(
        ns,
        Procedure {
            name: simple,
            params,
            body: argv[3].clone(),
            ns,
        },
    );
    Ok(Value::empty())
}

fn cmd_rename<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 2, Some(2), "oldName newName")?;
    interp.rename_command(ctx, interp.current_ns(), argv[1].as_str(), argv[2].as_str())?;
    Ok(Value::empty())
}

fn cmd_namespace<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, None, "subcommand ?arg ...?")?;
    match argv[1].as_str() {
        "eval" => {
            arity(argv, 3, Some(3), "eval name script")?;
            let ns = interp.create_namespace(argv[2].as_str())?;
            interp.eval_in_ns(ctx, ns, argv[3].as_str())
        }
        "current" => {
            arity(argv, 1, Some(1), "current")?;
            Ok(Value::from(interp.ns_full_name(interp.current_ns())))
        }
        "delete" => {
            arity(argv, 2, Some(2), "delete name")?;
            if let Some(ns) = interp.find_namespace(interp.current_ns(), argv[2].as_str()) {
                interp.delete_namespace(ctx, ns);
            }
            Ok(Value::empty())
        }
        "exists" => {
            arity(argv, 2, Some(2), "exists name")?;
            Ok(Value::from(
                interp
                    .find_namespace(interp.current_ns(), argv[2].as_str())
                    .is_some(),
            ))
        }
        other => Err(Exception::error(format!(
            "unknown namespace subcommand \"{}\"",
            other
        ))),
    }
}

fn cmd_puts<Ctx>(_interp: &mut Interp<Ctx>, _ctx: &mut Ctx, _token: u64, argv: &[Value]) -> CmdResult {
    arity(argv, 1, Some(1), "string")?;
    println!("{}", argv[1]);
    Ok(Value::empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(script: &str) -> CmdResult {
        let mut interp: Interp<()> = Interp::new();
        let mut ctx = ();
        interp.eval(&mut ctx, script)
    }

    #[test]
    fn test_if_else() {
        assert_eq!(eval("if 1 {list yes} else {list no}").unwrap().as_str(), "yes");
        assert_eq!(eval("if 0 {list yes} else {list no}").unwrap().as_str(), "no");
    }

    #[test]
    fn test_if_substituted_condition() {
        let script = "set flag 0\nif {$flag} {list yes} else {list no}";
        assert_eq!(eval(script).unwrap().as_str(), "no");
    }

    #[test]
    fn test_while_break() {
        let script = "set i 0\nwhile 1 {incr i; if {$i} {break}}\nset i";
        assert_eq!(eval(script).unwrap().as_str(), "1");
    }

    #[test]
    fn test_lappend_builds_list() {
        let script = "lappend acc a\nlappend acc {b c}\nset acc";
        assert_eq!(eval(script).unwrap().as_str(), "a {b c}");
    }

    #[test]
    fn test_catch_error() {
        let script = "catch {error boom} msg";
        assert_eq!(eval(script).unwrap().as_str(), "1");
        let script = "catch {error boom} msg\nset msg";
        assert_eq!(eval(script).unwrap().as_str(), "boom");
    }

    #[test]
    fn test_incr_missing_starts_at_zero() {
        assert_eq!(eval("incr fresh 5").unwrap().as_str(), "5");
    }
}
