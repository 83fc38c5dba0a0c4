// objsh delegation
//
// Wires delegated methods and options onto an object after construction.
// A wildcard entry expands over the declared members at install time, so
// calls dispatch through a concrete forwarding record; the component's
// value is read at call time, since it can be swapped (hull installation).

use std::collections::HashSet;

use tracing::debug;

use crate::class::{ClassId, MemberKind};
use crate::error::OoError;
use crate::interp::Interp;
use crate::object::{MethodForward, ObjectId, OptionForward};
use crate::runtime::Oo;
use crate::symbol::NameId;
use crate::types::{CmdResult, Exception, Value};
use crate::vtable;

/// Check a "using" template: every % must be followed by one of the known
/// substitution characters. A bad template is a configuration error at
/// installation time, never at call time.
pub fn validate_template(template: &str) -> Result<(), OoError> {
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            continue;
        }
        match chars.next() {
            Some('c') | Some('m') | Some('n') | Some('s') | Some('t') | Some('%') => {}
            Some(other) => {
                return Err(OoError::BadDelegation {
                    verb: "delegate",
                    name: format!("%{}", other),
                    detail: "unknown substitution in \"using\" template".to_string(),
                })
            }
            None => {
                return Err(OoError::BadDelegation {
                    verb: "delegate",
                    name: "%".to_string(),
                    detail: "dangling % in \"using\" template".to_string(),
                })
            }
        }
    }
    Ok(())
}

fn component_declared(oo: &Oo, class: ClassId, component: NameId) -> bool {
    vtable::traversal_order(&oo.reg, class)
        .iter()
        .any(|&cls| {
            oo.reg
                .class(cls)
                .map(|c| c.components.contains_key(&component))
                .unwrap_or(false)
        })
}

/// Install every delegated method and option declared across the object's
/// hierarchy. Runs after construction succeeds; any error here aborts the
/// remaining installation and fails the creation.
pub fn install_for_object(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId) -> Result<(), Exception> {
    let _ = interp;
    let class = match oo.objects.get(id) {
        Some(o) => o.class,
        None => return Ok(()),
    };
    let order = vtable::traversal_order(&oo.reg, class);

    for &cls in order.iter() {
        let functions: Vec<crate::class::DelegatedFunction> = oo
            .reg
            .class(cls)
            .map(|c| c.delegated_functions.clone())
            .unwrap_or_default();
        for deleg in functions {
            if let Some(using) = &deleg.using {
                validate_template(using)?;
            }
            if !component_declared(oo, class, deleg.component) {
                let comp = oo.reg.names.resolve(deleg.component).to_string();
                return Err(OoError::BadDelegation {
                    verb: "delegate method",
                    name: deleg.name.clone(),
                    detail: format!("component \"{}\" is not declared", comp),
                }
                .into());
            }
            if deleg.name == "*" {
                install_wildcard_methods(oo, id, class, &deleg);
            } else {
                install_forward(oo, id, &deleg.name, &deleg);
            }
        }

        let options: Vec<crate::class::DelegatedOption> = oo
            .reg
            .class(cls)
            .map(|c| c.delegated_options.clone())
            .unwrap_or_default();
        for deleg in options {
            if !component_declared(oo, class, deleg.component) {
                let comp = oo.reg.names.resolve(deleg.component).to_string();
                return Err(OoError::BadDelegation {
                    verb: "delegate option",
                    name: deleg.name.clone(),
                    detail: format!("component \"{}\" is not declared", comp),
                }
                .into());
            }
            if deleg.name == "*" {
                install_wildcard_options(oo, id, class, &deleg);
            } else {
                install_option_forward(oo, id, class, &deleg)?;
            }
        }
    }

    debug!(object = id.0, "installed delegations");
    Ok(())
}

/// Expand `delegate method * to comp`: every method declared in the
/// hierarchy except constructors, destructors, commons, the root-class
/// builtins and the exception set.
fn install_wildcard_methods(oo: &mut Oo, id: ObjectId, class: ClassId, deleg: &crate::class::DelegatedFunction) {
    let except: HashSet<&str> = deleg.except.iter().map(|s| s.as_str()).collect();
    let order = vtable::traversal_order(&oo.reg, class);
    let mut names: Vec<String> = Vec::new();
    let mut seen: HashSet<NameId> = HashSet::new();
    for &cls in order.iter() {
        if cls == oo.root_class {
            continue;
        }
        let Some(info) = oo.reg.class(cls) else { continue };
        for (&name, &func) in &info.functions {
            if !seen.insert(name) {
                continue;
            }
            let kind = oo.reg.func(func).map(|f| f.kind);
            if !matches!(kind, Some(MemberKind::Method)) {
                continue;
            }
            let simple = oo.reg.names.resolve(name);
            if except.contains(simple) {
                continue;
            }
            names.push(simple.to_string());
        }
    }
    for name in names {
        install_forward(oo, id, &name, deleg);
    }
}

fn install_forward(oo: &mut Oo, id: ObjectId, name: &str, deleg: &crate::class::DelegatedFunction) {
    if let Some(obj) = oo.objects.get_mut(id) {
        if obj.forwards.contains_key(name) {
            return;
        }
        obj.forwards.insert(
            name.to_string(),
            MethodForward {
                component: deleg.component,
                as_words: deleg.as_words.clone(),
                using: deleg.using.clone(),
            },
        );
    }
}

fn install_wildcard_options(oo: &mut Oo, id: ObjectId, class: ClassId, deleg: &crate::class::DelegatedOption) {
    let except: HashSet<&str> = deleg.except.iter().map(|s| s.as_str()).collect();
    let order = vtable::traversal_order(&oo.reg, class);
    let mut installs: Vec<(NameId, String)> = Vec::new();
    let mut seen: HashSet<NameId> = HashSet::new();
    for &cls in order.iter() {
        let Some(info) = oo.reg.class(cls) else { continue };
        for &name in info.options.keys() {
            if !seen.insert(name) {
                continue;
            }
            let simple = oo.reg.names.resolve(name);
            if except.contains(simple) {
                continue;
            }
            installs.push((name, simple.to_string()));
        }
    }
    for (name, target) in installs {
        if let Some(obj) = oo.objects.get_mut(id) {
            obj.delegated_opts.entry(name).or_insert(OptionForward {
                component: deleg.component,
                target,
            });
        }
    }
}

/// Link a single named delegated option to its concrete option definition.
/// Referencing an undeclared option is an installation-time error.
fn install_option_forward(
    oo: &mut Oo,
    id: ObjectId,
    class: ClassId,
    deleg: &crate::class::DelegatedOption,
) -> Result<(), Exception> {
    let Some(name) = oo.reg.names.lookup(&deleg.name) else {
        return Err(OoError::BadDelegation {
            verb: "delegate option",
            name: deleg.name.clone(),
            detail: "option is not declared in the class".to_string(),
        }
        .into());
    };
    let declared = vtable::traversal_order(&oo.reg, class).iter().any(|&cls| {
        oo.reg
            .class(cls)
            .map(|c| c.options.contains_key(&name))
            .unwrap_or(false)
    });
    if !declared {
        return Err(OoError::BadDelegation {
            verb: "delegate option",
            name: deleg.name.clone(),
            detail: "option is not declared in the class".to_string(),
        }
        .into());
    }
    let target = deleg.as_name.clone().unwrap_or_else(|| deleg.name.clone());
    if let Some(obj) = oo.objects.get_mut(id) {
        obj.delegated_opts.entry(name).or_insert(OptionForward {
            component: deleg.component,
            target,
        });
    }
    Ok(())
}

/// Current value of a component variable: the name of the command the
/// delegation forwards to.
pub fn component_value(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    id: ObjectId,
    component: NameId,
) -> Result<Value, Exception> {
    let class = oo
        .objects
        .get(id)
        .map(|o| o.class)
        .ok_or_else(|| OoError::Internal("component read on dead object".to_string()))?;
    let info = oo
        .reg
        .class(class)
        .ok_or_else(|| OoError::Internal("object of dead class".to_string()))?;
    let lookup = info
        .resolve_vars
        .get(&component)
        .map(|&idx| info.var_lookups[idx as usize].var);
    let comp_name = oo.reg.names.resolve(component).to_string();
    let var = lookup.ok_or_else(|| {
        Exception::error(format!("component \"{}\" is undefined", comp_name))
    })?;
    let owner = oo
        .reg
        .var(var)
        .map(|v| v.class)
        .ok_or_else(|| OoError::Internal("stale component variable".to_string()))?;
    let ns = oo
        .objects
        .get(id)
        .and_then(|o| o.class_ns.get(&owner).copied())
        .ok_or_else(|| OoError::Internal("object without variable scope".to_string()))?;
    let loc = crate::interp::VarLocation {
        ns,
        name: comp_name.clone(),
    };
    let value = interp.read_cell(oo, &loc)?;
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Exception::error(format!(
            "component \"{}\" is undefined in object",
            comp_name
        ))),
    }
}

/// Invoke a delegated method: expand the "using" template or prepend the
/// component value and replacement words, then invoke the result.
pub fn invoke_forward(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    id: ObjectId,
    forward: &MethodForward,
    method: &str,
    args: &[Value],
) -> CmdResult {
    let comp = component_value(interp, oo, id, forward.component)?;
    let mut words: Vec<Value> = Vec::new();
    match &forward.using {
        Some(template) => {
            let expanded = expand_template(oo, id, template, &comp, method)?;
            words.extend(expanded);
        }
        None => {
            words.push(comp);
            if forward.as_words.is_empty() {
                words.push(Value::from(method));
            } else {
                words.extend(forward.as_words.iter().map(|w| Value::from(w.as_str())));
            }
        }
    }
    words.extend(args.iter().cloned());
    interp.invoke(oo, &words)
}

/// Expand a "using" template word list. %c component value, %m method
/// name, %n class simple name, %s object name, %t class qualified name,
/// %% literal percent.
fn expand_template(
    oo: &Oo,
    id: ObjectId,
    template: &str,
    comp: &Value,
    method: &str,
) -> Result<Vec<Value>, Exception> {
    let (obj_name, class) = match oo.objects.get(id) {
        Some(o) => (o.name.clone(), o.class),
        None => return Err(OoError::Internal("template on dead object".to_string()).into()),
    };
    let class_full = oo.reg.class_full_name(class).to_string();
    let class_simple = oo
        .reg
        .class(class)
        .map(|c| c.simple_name().to_string())
        .unwrap_or_default();

    let raw_words =
        crate::reader::parse_list(template).map_err(|e| Exception::error(e.to_string()))?;
    let mut words = Vec::with_capacity(raw_words.len());
    for raw in raw_words {
        let mut out = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('c') => out.push_str(comp.as_str()),
                Some('m') => out.push_str(method),
                Some('n') => out.push_str(&class_simple),
                Some('s') => out.push_str(&obj_name),
                Some('t') => out.push_str(&class_full),
                Some('%') => out.push('%'),
                other => {
                    let shown = other.map(|c| c.to_string()).unwrap_or_default();
                    return Err(OoError::Internal(format!(
                        "unvalidated template token %{}",
                        shown
                    ))
                    .into());
                }
            }
        }
        words.push(Value::from(out));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_template() {
        assert!(validate_template("%c configure %m").is_ok());
        assert!(validate_template("100%%").is_ok());
        assert!(validate_template("%x").is_err());
        assert!(validate_template("trailing %").is_err());
    }
}
