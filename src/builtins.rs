// objsh builtin and ensemble commands
//
// The script-level surface: the `class` definition ensemble, the per-class
// access command that creates instances, the per-object access command
// that dispatches methods, and the built-in configure/cget/info/isa/destroy
// handlers every class inherits from the root class.

use std::collections::HashSet;

use crate::class::{Builtin, ClassId, MemberKind, OptionId, Protection, VarId};
use crate::delegate;
use crate::error::OoError;
use crate::interp::{Interp, VarLocation};
use crate::methods;
use crate::object::{self, ObjectId};
use crate::runtime::{self, Oo};
use crate::symbol::NameId;
use crate::types::{list_join, CmdResult, Exception, Value};
use crate::vtable;

//--------------------------------------------------------------------------
// The `class` definition ensemble

pub fn cmd_class(interp: &mut Interp<Oo>, oo: &mut Oo, _token: u64, argv: &[Value]) -> CmdResult {
    if argv.len() < 2 {
        return Err(Exception::error(
            "wrong # args: should be \"class subcommand ?arg ...?\"",
        ));
    }
    match argv[1].as_str() {
        "create" => {
            if argv.len() < 3 {
                return Err(Exception::error(
                    "wrong # args: should be \"class create name ?base ...?\"",
                ));
            }
            let bases: Vec<String> = argv[3..].iter().map(|v| v.to_string()).collect();
            let id = runtime::create_class(interp, oo, argv[2].as_str(), &bases)?;
            Ok(Value::from(oo.reg.class_full_name(id)))
        }
        "delete" => {
            for name in &argv[2..] {
                let id = resolve_class(oo, name.as_str())?;
                runtime::delete_class(interp, oo, id)?;
            }
            Ok(Value::empty())
        }
        "exists" => {
            if argv.len() != 3 {
                return Err(Exception::error(
                    "wrong # args: should be \"class exists name\"",
                ));
            }
            Ok(Value::from(resolve_class(oo, argv[2].as_str()).is_ok()))
        }
        "inherit" => {
            if argv.len() < 4 {
                return Err(Exception::error(
                    "wrong # args: should be \"class inherit name base ?base ...?\"",
                ));
            }
            let id = resolve_class(oo, argv[2].as_str())?;
            let bases: Vec<String> = argv[3..].iter().map(|v| v.to_string()).collect();
            runtime::set_inheritance(interp, oo, id, &bases)?;
            Ok(Value::empty())
        }
        "method" | "proc" => {
            let (id, protection, rest) = class_and_protection(oo, argv, 3)?;
            if rest.len() != 3 {
                return Err(Exception::error(format!(
                    "wrong # args: should be \"class {} name ?protection? methodName params body\"",
                    argv[1]
                )));
            }
            let kind = if argv[1] == "method" {
                MemberKind::Method
            } else {
                MemberKind::Proc
            };
            runtime::create_member(
                interp,
                oo,
                id,
                protection,
                kind,
                rest[0].as_str(),
                rest[1].as_str(),
                rest[2].clone(),
                None,
            )?;
            Ok(Value::empty())
        }
        "constructor" => {
            let id = resolve_class(oo, argv.get(2).map(|v| v.as_str()).unwrap_or(""))?;
            match argv.len() {
                5 => runtime::create_constructor(
                    interp,
                    oo,
                    id,
                    argv[3].as_str(),
                    None,
                    argv[4].clone(),
                )?,
                6 => runtime::create_constructor(
                    interp,
                    oo,
                    id,
                    argv[3].as_str(),
                    Some(argv[4].clone()),
                    argv[5].clone(),
                )?,
                _ => {
                    return Err(Exception::error(
                        "wrong # args: should be \"class constructor name params ?init? body\"",
                    ))
                }
            };
            Ok(Value::empty())
        }
        "destructor" => {
            if argv.len() != 4 {
                return Err(Exception::error(
                    "wrong # args: should be \"class destructor name body\"",
                ));
            }
            let id = resolve_class(oo, argv[2].as_str())?;
            runtime::create_destructor(interp, oo, id, argv[3].clone())?;
            Ok(Value::empty())
        }
        "variable" => {
            let (id, protection, rest) = class_and_protection(oo, argv, 3)?;
            if rest.is_empty() || rest.len() > 3 {
                return Err(Exception::error(
                    "wrong # args: should be \"class variable name ?protection? varName ?default? ?configCode?\"",
                ));
            }
            runtime::create_variable(
                interp,
                oo,
                id,
                protection,
                rest[0].as_str(),
                rest.get(1).cloned(),
                rest.get(2).cloned(),
            )?;
            Ok(Value::empty())
        }
        "common" => {
            let (id, protection, rest) = class_and_protection(oo, argv, 3)?;
            if rest.is_empty() || rest.len() > 2 {
                return Err(Exception::error(
                    "wrong # args: should be \"class common name ?protection? varName ?default?\"",
                ));
            }
            runtime::create_common(
                interp,
                oo,
                id,
                protection,
                rest[0].as_str(),
                rest.get(1).cloned(),
            )?;
            Ok(Value::empty())
        }
        "option" => {
            if argv.len() < 4 || argv.len() > 6 {
                return Err(Exception::error(
                    "wrong # args: should be \"class option name -option ?default? ?configCode?\"",
                ));
            }
            let id = resolve_class(oo, argv[2].as_str())?;
            runtime::create_option(
                interp,
                oo,
                id,
                argv[3].as_str(),
                argv.get(4).cloned(),
                argv.get(5).cloned(),
            )?;
            Ok(Value::empty())
        }
        "component" => {
            if argv.len() != 4 {
                return Err(Exception::error(
                    "wrong # args: should be \"class component name varName\"",
                ));
            }
            let id = resolve_class(oo, argv[2].as_str())?;
            runtime::create_component(interp, oo, id, argv[3].as_str())?;
            Ok(Value::empty())
        }
        "methodvariable" => {
            if argv.len() < 4 || argv.len() > 5 {
                return Err(Exception::error(
                    "wrong # args: should be \"class methodvariable name varName ?default?\"",
                ));
            }
            let id = resolve_class(oo, argv[2].as_str())?;
            runtime::create_method_variable(interp, oo, id, argv[3].as_str(), argv.get(4).cloned())?;
            Ok(Value::empty())
        }
        "delegate" => cmd_class_delegate(interp, oo, argv),
        other => Err(Exception::error(format!(
            "bad subcommand \"{}\": should be create, delete, exists, inherit, method, proc, \
             constructor, destructor, variable, common, option, component, methodvariable, or delegate",
            other
        ))),
    }
}

/// `class delegate <cls> method|option <name> to <component> ?as <words>?
/// ?using <template>? ?except <names>?`
fn cmd_class_delegate(interp: &mut Interp<Oo>, oo: &mut Oo, argv: &[Value]) -> CmdResult {
    if argv.len() < 7 {
        return Err(Exception::error(
            "wrong # args: should be \"class delegate name method|option what to component ?arg ...?\"",
        ));
    }
    let id = resolve_class(oo, argv[2].as_str())?;
    let kind = argv[3].as_str().to_string();
    let name = argv[4].to_string();

    let mut component: Option<String> = None;
    let mut as_spec: Option<String> = None;
    let mut using: Option<String> = None;
    let mut except: Vec<String> = Vec::new();
    let mut i = 5;
    while i < argv.len() {
        let key = argv[i].as_str();
        let value = argv.get(i + 1).ok_or_else(|| {
            Exception::error(format!("value for \"{}\" missing", key))
        })?;
        match key {
            "to" => component = Some(value.to_string()),
            "as" => as_spec = Some(value.to_string()),
            "using" => using = Some(value.to_string()),
            "except" => {
                except = crate::reader::parse_list(value.as_str())
                    .map_err(|e| Exception::error(e.to_string()))?
            }
            other => {
                return Err(Exception::error(format!(
                    "bad delegation keyword \"{}\": should be to, as, using, or except",
                    other
                )))
            }
        }
        i += 2;
    }
    let component = component
        .ok_or_else(|| Exception::error("missing \"to\" in delegation"))?;

    match kind.as_str() {
        "method" => {
            runtime::add_delegated_method(interp, oo, id, &name, &component, as_spec, using, except)?
        }
        "option" => {
            if using.is_some() {
                return Err(Exception::error(
                    "\"using\" applies to delegated methods, not options",
                ));
            }
            runtime::add_delegated_option(interp, oo, id, &name, &component, as_spec, except)?
        }
        other => {
            return Err(Exception::error(format!(
                "bad delegation \"{}\": should be method or option",
                other
            )))
        }
    }
    Ok(Value::empty())
}

fn resolve_class(oo: &Oo, name: &str) -> Result<ClassId, Exception> {
    if name.is_empty() {
        return Err(OoError::NoClassContext("no class name given".to_string()).into());
    }
    let full = if name.starts_with("::") {
        name.to_string()
    } else {
        format!("::{}", name)
    };
    oo.reg
        .find_class(&full)
        .ok_or_else(|| OoError::UnknownClass(name.to_string()).into())
}

/// Parse "<cls> ?protection? rest..." for the member subcommands.
fn class_and_protection<'a>(
    oo: &Oo,
    argv: &'a [Value],
    start: usize,
) -> Result<(ClassId, Protection, &'a [Value]), Exception> {
    let id = resolve_class(oo, argv.get(2).map(|v| v.as_str()).unwrap_or(""))?;
    match argv.get(start).map(|v| v.as_str()) {
        Some("public") => Ok((id, Protection::Public, &argv[start + 1..])),
        Some("protected") => Ok((id, Protection::Protected, &argv[start + 1..])),
        Some("private") => Ok((id, Protection::Private, &argv[start + 1..])),
        _ => Ok((id, Protection::Public, &argv[start..])),
    }
}

//--------------------------------------------------------------------------
// Class access command: `<Class> objName ?args?` creates an instance.

pub fn class_dispatch(interp: &mut Interp<Oo>, oo: &mut Oo, token: u64, argv: &[Value]) -> CmdResult {
    let class = ClassId(token as u32);
    if oo.reg.class(class).is_none() {
        return Err(OoError::UnknownClass(argv[0].to_string()).into());
    }
    if argv.len() < 2 {
        return Err(Exception::error(format!(
            "wrong # args: should be \"{} objName ?arg ...?\"",
            argv[0]
        )));
    }
    let requested = argv[1].as_str();
    let obj_name = if requested == "#auto" {
        oo.generate_auto_name(class)
    } else {
        requested.to_string()
    };
    object::create_object(interp, oo, &obj_name, class, &argv[2..])
}

/// Delete trace for class access commands: deleting the command deletes
/// the class, cascading per the class lifecycle rules.
pub fn class_cmd_trace(interp: &mut Interp<Oo>, oo: &mut Oo, token: u64, _old: &str, new: Option<&str>) {
    if new.is_some() {
        return;
    }
    let class = ClassId(token as u32);
    if oo.reg.class(class).is_some() {
        if let Err(e) = runtime::delete_class(interp, oo, class) {
            tracing::warn!(class = token, error = %e.value, "error deleting class");
        }
    }
}

//--------------------------------------------------------------------------
// Object access command

pub fn object_dispatch(interp: &mut Interp<Oo>, oo: &mut Oo, token: u64, argv: &[Value]) -> CmdResult {
    let id = ObjectId(token as u32);
    if argv.len() < 2 {
        return Err(Exception::error(format!(
            "wrong # args: should be \"{} option ?arg ...?\"",
            argv[0]
        )));
    }
    let method = argv[1].as_str().to_string();
    let class = match oo.objects.get(id) {
        Some(o) => o.class,
        None => return Err(OoError::UnknownObject(argv[0].to_string()).into()),
    };

    // Installed delegations shadow the declared implementation.
    let forward = oo
        .objects
        .get(id)
        .and_then(|o| o.forwards.get(&method).cloned());
    if let Some(fwd) = forward {
        return delegate::invoke_forward(interp, oo, id, &fwd, &method, &argv[2..]);
    }

    let func = oo
        .reg
        .names
        .lookup(&method)
        .and_then(|n| oo.reg.class(class).and_then(|c| c.resolve_cmds.get(&n).copied()));
    match func {
        Some(f) => {
            if let Some(member) = oo.reg.func(f) {
                methods::check_protection(oo, member)?;
            }
            methods::invoke_member(interp, oo, f, Some(id), &argv[2..])
        }
        None => Err(unknown_subcommand(oo, id, class, &method)),
    }
}

/// The catch-all for unknown subcommands: report the valid method names.
fn unknown_subcommand(oo: &Oo, id: ObjectId, class: ClassId, method: &str) -> Exception {
    let mut names: Vec<String> = Vec::new();
    let mut seen: HashSet<NameId> = HashSet::new();
    for &cls in vtable::traversal_order(&oo.reg, class).iter() {
        let Some(info) = oo.reg.class(cls) else { continue };
        for (&name, &func) in &info.functions {
            if !seen.insert(name) {
                continue;
            }
            let Some(member) = oo.reg.func(func) else { continue };
            if member.protection != Protection::Public {
                continue;
            }
            if matches!(member.kind, MemberKind::Constructor | MemberKind::Destructor) {
                continue;
            }
            names.push(oo.reg.names.resolve(name).to_string());
        }
    }
    if let Some(obj) = oo.objects.get(id) {
        for name in obj.forwards.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names.sort();
    Exception::error(format!(
        "bad option \"{}\": should be one of {}",
        method,
        names.join(", ")
    ))
}

//--------------------------------------------------------------------------
// Built-in members

pub fn run_builtin(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    builtin: Builtin,
    obj: Option<ObjectId>,
    args: &[Value],
) -> CmdResult {
    let id = obj.ok_or(OoError::NoObjectContext)?;
    match builtin {
        Builtin::Configure => builtin_configure(interp, oo, id, args),
        Builtin::Cget => builtin_cget(interp, oo, id, args),
        Builtin::Info => builtin_info(interp, oo, id, args),
        Builtin::Isa => builtin_isa(oo, id, args),
        Builtin::Destroy => {
            object::destroy_object(interp, oo, id)?;
            Ok(Value::empty())
        }
    }
}

/// Where a configure/cget name leads.
enum ConfigTarget {
    Delegated(NameId),
    Option(OptionId),
    Variable(VarId),
}

fn resolve_config_target(oo: &Oo, id: ObjectId, name: &str) -> Option<ConfigTarget> {
    let class = oo.objects.get(id)?.class;

    if let Some(name_id) = oo.reg.names.lookup(name) {
        if oo
            .objects
            .get(id)
            .map(|o| o.delegated_opts.contains_key(&name_id))
            .unwrap_or(false)
        {
            return Some(ConfigTarget::Delegated(name_id));
        }
        for &cls in vtable::traversal_order(&oo.reg, class).iter() {
            if let Some(oid) = oo.reg.class(cls).and_then(|c| c.options.get(&name_id)) {
                return Some(ConfigTarget::Option(*oid));
            }
        }
    }

    // Public variables appear as options under a leading dash.
    let bare = name.strip_prefix('-')?;
    let bare_id = oo.reg.names.lookup(bare)?;
    let info = oo.reg.class(class)?;
    let lookup = info
        .resolve_vars
        .get(&bare_id)
        .map(|&idx| &info.var_lookups[idx as usize])?;
    if !lookup.accessible {
        return None;
    }
    let var = oo.reg.var(lookup.var)?;
    if var.protection != Protection::Public || var.common {
        return None;
    }
    Some(ConfigTarget::Variable(lookup.var))
}

fn option_cell(oo: &Oo, id: ObjectId, opt: OptionId) -> Option<VarLocation> {
    let ns = oo.objects.get(id)?.ns;
    let name = oo.reg.opt(opt).map(|o| oo.reg.names.resolve(o.name).to_string())?;
    Some(VarLocation { ns, name })
}

fn variable_cell(oo: &Oo, id: ObjectId, var: VarId) -> Option<VarLocation> {
    let v = oo.reg.var(var)?;
    let ns = oo.objects.get(id)?.class_ns.get(&v.class).copied()?;
    Some(VarLocation {
        ns,
        name: oo.reg.names.resolve(v.name).to_string(),
    })
}

fn delegated_read(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    id: ObjectId,
    name_id: NameId,
) -> CmdResult {
    let fwd = oo
        .objects
        .get(id)
        .and_then(|o| o.delegated_opts.get(&name_id).cloned())
        .ok_or_else(|| OoError::Internal("missing delegated option".to_string()))?;
    let comp = delegate::component_value(interp, oo, id, fwd.component)?;
    let words = [comp, Value::from("cget"), Value::from(fwd.target.as_str())];
    interp.invoke(oo, &words)
}

fn delegated_write(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    id: ObjectId,
    name_id: NameId,
    value: &Value,
) -> CmdResult {
    let fwd = oo
        .objects
        .get(id)
        .and_then(|o| o.delegated_opts.get(&name_id).cloned())
        .ok_or_else(|| OoError::Internal("missing delegated option".to_string()))?;
    let comp = delegate::component_value(interp, oo, id, fwd.component)?;
    let words = [
        comp,
        Value::from("configure"),
        Value::from(fwd.target.as_str()),
        value.clone(),
    ];
    interp.invoke(oo, &words)
}

/// `configure` with no arguments lists {-name default current} triples for
/// every public option and variable visible in the hierarchy,
/// most-specific-first. With a single -name it returns one triple. With
/// pairs it applies each in order; a failing config hook rolls back only
/// its own pair and aborts the rest.
fn builtin_configure(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId, args: &[Value]) -> CmdResult {
    match args.len() {
        0 => {
            let mut triples: Vec<Value> = Vec::new();
            for name in visible_options(oo, id) {
                triples.push(config_triple(interp, oo, id, &name)?);
            }
            Ok(list_join(&triples))
        }
        1 => config_triple(interp, oo, id, args[0].as_str()),
        _ => {
            if args.len() % 2 != 0 {
                return Err(Exception::error(format!(
                    "value for \"{}\" missing",
                    args[args.len() - 1]
                )));
            }
            for pair in args.chunks(2) {
                let name = pair[0].as_str();
                let value = &pair[1];
                match resolve_config_target(oo, id, name) {
                    Some(ConfigTarget::Delegated(nid)) => {
                        delegated_write(interp, oo, id, nid, value)?;
                    }
                    Some(ConfigTarget::Option(opt)) => {
                        let loc = option_cell(oo, id, opt)
                            .ok_or_else(|| OoError::Internal("option without cell".to_string()))?;
                        interp
                            .write_cell_traced(oo, &loc, value.clone())
                            .map_err(|e| {
                                e.add_error_info(OoError::ConfigurationError(name.to_string()).to_string())
                            })?;
                    }
                    Some(ConfigTarget::Variable(var)) => {
                        let loc = variable_cell(oo, id, var)
                            .ok_or_else(|| OoError::Internal("variable without cell".to_string()))?;
                        interp
                            .write_cell_traced(oo, &loc, value.clone())
                            .map_err(|e| {
                                e.add_error_info(OoError::ConfigurationError(name.to_string()).to_string())
                            })?;
                    }
                    None => return Err(OoError::UnknownOption(name.to_string()).into()),
                }
            }
            Ok(Value::empty())
        }
    }
}

fn builtin_cget(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId, args: &[Value]) -> CmdResult {
    if args.len() != 1 {
        return Err(OoError::WrongArgCount("cget -option".to_string()).into());
    }
    let name = args[0].as_str();
    match resolve_config_target(oo, id, name) {
        Some(ConfigTarget::Delegated(nid)) => delegated_read(interp, oo, id, nid),
        Some(ConfigTarget::Option(opt)) => {
            let loc = option_cell(oo, id, opt)
                .ok_or_else(|| OoError::Internal("option without cell".to_string()))?;
            Ok(interp.read_cell(oo, &loc)?.unwrap_or_default())
        }
        Some(ConfigTarget::Variable(var)) => {
            let loc = variable_cell(oo, id, var)
                .ok_or_else(|| OoError::Internal("variable without cell".to_string()))?;
            Ok(interp.read_cell(oo, &loc)?.unwrap_or_default())
        }
        None => Err(OoError::UnknownOption(name.to_string()).into()),
    }
}

/// Option names visible on an object, most-specific-first: declared
/// options, then public variables under a leading dash.
fn visible_options(oo: &Oo, id: ObjectId) -> Vec<String> {
    let Some(class) = oo.objects.get(id).map(|o| o.class) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for &cls in vtable::traversal_order(&oo.reg, class).iter() {
        let Some(info) = oo.reg.class(cls) else { continue };
        for &name in info.options.keys() {
            let n = oo.reg.names.resolve(name).to_string();
            if seen.insert(n.clone()) {
                names.push(n);
            }
        }
        for &vid in info.variables.values() {
            let Some(var) = oo.reg.var(vid) else { continue };
            if var.protection != Protection::Public || var.common {
                continue;
            }
            let n = format!("-{}", oo.reg.names.resolve(var.name));
            if seen.insert(n.clone()) {
                names.push(n);
            }
        }
    }
    names
}

fn config_triple(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId, name: &str) -> CmdResult {
    match resolve_config_target(oo, id, name) {
        Some(ConfigTarget::Delegated(nid)) => {
            let current = delegated_read(interp, oo, id, nid).unwrap_or_default();
            let default = oo
                .reg
                .names
                .lookup(name)
                .and_then(|n| default_of_option(oo, id, n))
                .unwrap_or_default();
            Ok(list_join(&[Value::from(name), default, current]))
        }
        Some(ConfigTarget::Option(opt)) => {
            let default = oo
                .reg
                .opt(opt)
                .and_then(|o| o.default.clone())
                .unwrap_or_default();
            let loc = option_cell(oo, id, opt)
                .ok_or_else(|| OoError::Internal("option without cell".to_string()))?;
            let current = interp.read_cell(oo, &loc)?.unwrap_or_default();
            Ok(list_join(&[Value::from(name), default, current]))
        }
        Some(ConfigTarget::Variable(var)) => {
            let default = oo
                .reg
                .var(var)
                .and_then(|v| v.default.clone())
                .unwrap_or_default();
            let loc = variable_cell(oo, id, var)
                .ok_or_else(|| OoError::Internal("variable without cell".to_string()))?;
            let current = interp.read_cell(oo, &loc)?.unwrap_or_default();
            Ok(list_join(&[Value::from(name), default, current]))
        }
        None => Err(OoError::UnknownOption(name.to_string()).into()),
    }
}

fn default_of_option(oo: &Oo, id: ObjectId, name: NameId) -> Option<Value> {
    let class = oo.objects.get(id)?.class;
    for &cls in vtable::traversal_order(&oo.reg, class).iter() {
        if let Some(oid) = oo.reg.class(cls).and_then(|c| c.options.get(&name)) {
            return oo.reg.opt(*oid).and_then(|o| o.default.clone());
        }
    }
    None
}

fn builtin_isa(oo: &mut Oo, id: ObjectId, args: &[Value]) -> CmdResult {
    if args.len() != 1 {
        return Err(OoError::WrongArgCount("isa className".to_string()).into());
    }
    let target = {
        let full = if args[0].as_str().starts_with("::") {
            args[0].to_string()
        } else {
            format!("::{}", args[0])
        };
        oo.reg
            .find_class(&full)
            .ok_or_else(|| OoError::UnknownClass(args[0].to_string()))?
    };
    let class = oo
        .objects
        .get(id)
        .map(|o| o.class)
        .ok_or(OoError::NoObjectContext)?;
    Ok(Value::from(oo.reg.is_a(class, target)))
}

fn builtin_info(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId, args: &[Value]) -> CmdResult {
    let _ = interp;
    if args.is_empty() {
        return Err(OoError::WrongArgCount("info option ?args...?".to_string()).into());
    }
    let class = oo
        .objects
        .get(id)
        .map(|o| o.class)
        .ok_or(OoError::NoObjectContext)?;
    match args[0].as_str() {
        "class" => Ok(Value::from(oo.reg.class_full_name(class))),
        "inherit" => {
            let bases: Vec<Value> = oo
                .reg
                .class(class)
                .map(|c| {
                    c.bases
                        .iter()
                        .map(|&b| Value::from(oo.reg.class_full_name(b)))
                        .collect()
                })
                .unwrap_or_default();
            Ok(list_join(&bases))
        }
        "heritage" => {
            let order: Vec<Value> = vtable::traversal_order(&oo.reg, class)
                .iter()
                .map(|&c| Value::from(oo.reg.class_full_name(c)))
                .collect();
            Ok(list_join(&order))
        }
        "function" => match args.get(1) {
            Some(name) => {
                let func = oo
                    .reg
                    .names
                    .lookup(name.as_str())
                    .and_then(|n| oo.reg.class(class).and_then(|c| c.resolve_cmds.get(&n).copied()))
                    .ok_or_else(|| OoError::UnknownMember(name.to_string()))?;
                let member = oo
                    .reg
                    .func(func)
                    .ok_or_else(|| OoError::Internal("stale member".to_string()))?;
                let prot = protection_word(member.protection);
                let kind = match member.kind {
                    MemberKind::Method => "method",
                    MemberKind::Proc => "proc",
                    MemberKind::Constructor => "constructor",
                    MemberKind::Destructor => "destructor",
                };
                Ok(list_join(&[
                    Value::from(prot),
                    Value::from(kind),
                    Value::from(member.full_name.as_str()),
                ]))
            }
            None => {
                let mut names: Vec<Value> = Vec::new();
                let mut seen: HashSet<NameId> = HashSet::new();
                for &cls in vtable::traversal_order(&oo.reg, class).iter() {
                    let Some(info) = oo.reg.class(cls) else { continue };
                    for &name in info.functions.keys() {
                        if seen.insert(name) {
                            names.push(Value::from(oo.reg.names.resolve(name)));
                        }
                    }
                }
                Ok(list_join(&names))
            }
        },
        "variable" => match args.get(1) {
            Some(name) => {
                let info = oo
                    .reg
                    .class(class)
                    .ok_or_else(|| OoError::Internal("object of dead class".to_string()))?;
                let lookup = oo
                    .reg
                    .names
                    .lookup(name.as_str())
                    .and_then(|n| info.resolve_vars.get(&n).copied())
                    .map(|idx| &info.var_lookups[idx as usize])
                    .ok_or_else(|| OoError::UnknownMember(name.to_string()))?;
                let var = oo
                    .reg
                    .var(lookup.var)
                    .ok_or_else(|| OoError::Internal("stale variable".to_string()))?;
                Ok(list_join(&[
                    Value::from(protection_word(var.protection)),
                    Value::from(var.full_name.as_str()),
                    var.default.clone().unwrap_or_default(),
                ]))
            }
            None => {
                let mut names: Vec<Value> = Vec::new();
                let mut seen: HashSet<NameId> = HashSet::new();
                for &cls in vtable::traversal_order(&oo.reg, class).iter() {
                    let Some(info) = oo.reg.class(cls) else { continue };
                    for &name in info.variables.keys() {
                        if seen.insert(name) {
                            names.push(Value::from(oo.reg.names.resolve(name)));
                        }
                    }
                }
                Ok(list_join(&names))
            }
        },
        other => Err(Exception::error(format!(
            "bad info option \"{}\": should be class, inherit, heritage, function, or variable",
            other
        ))),
    }
}

fn protection_word(p: Protection) -> &'static str {
    match p {
        Protection::Public => "public",
        Protection::Protected => "protected",
        Protection::Private => "private",
    }
}
