// objsh member invocation engine
//
// Pre-call validation, body evaluation in the declaring class's namespace,
// and constructor chaining. Every invocation runs inside a call context
// pushed before the body and popped on all exit paths.

use tracing::trace;

use crate::class::{ClassId, FuncId, MemberFunction, MemberImpl, MemberKind, Protection};
use crate::context;
use crate::error::OoError;
use crate::interp::{bind_params, Interp, VarLocation};
use crate::object::ObjectId;
use crate::runtime::Oo;
use crate::types::{CmdResult, Exception, ResultCode, Value};

/// The command record target the name resolver hands back for member
/// functions: token is the FuncId, the object comes from the active call
/// context.
pub fn member_trampoline(interp: &mut Interp<Oo>, oo: &mut Oo, token: u64, argv: &[Value]) -> CmdResult {
    let func = FuncId(token as u32);
    let obj = oo.ctxs.current().and_then(|c| c.object);
    if let Some(member) = oo.reg.func(func) {
        check_protection(oo, member)?;
    }
    invoke_member(interp, oo, func, obj, &argv[1..])
}

/// May the caller, identified by the active call context, invoke this
/// member? Public is always allowed; protected needs the caller's class to
/// derive from the member's class; private needs an exact match.
pub fn check_protection(oo: &Oo, member: &MemberFunction) -> Result<(), Exception> {
    let caller = oo.ctxs.current().map(|c| c.class);
    let allowed = match member.protection {
        Protection::Public => true,
        Protection::Protected => caller
            .map(|c| oo.reg.is_a(c, member.class))
            .unwrap_or(false),
        Protection::Private => caller.map(|c| c == member.class).unwrap_or(false),
    };
    if allowed {
        Ok(())
    } else {
        Err(Exception::error(format!(
            "can't access \"{}\": {} function",
            member.full_name,
            match member.protection {
                Protection::Protected => "protected",
                _ => "private",
            }
        )))
    }
}

/// Invoke a member function on an optional object.
pub fn invoke_member(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    func: FuncId,
    obj: Option<ObjectId>,
    args: &[Value],
) -> CmdResult {
    let mut member = match oo.reg.func(func) {
        Some(m) => m.clone(),
        None => return Err(OoError::Internal(format!("stale member id {}", func.0)).into()),
    };

    if member.needs_object() && obj.is_none() {
        return Err(OoError::NoObjectContext.into());
    }

    // One autoload pass for declared-but-unloaded members.
    if matches!(member.body, MemberImpl::Declared { .. }) {
        let full = member.full_name.clone();
        if let Some(hook) = oo.autoload {
            let _ = hook(interp, oo, &full);
        }
        member = match oo.reg.func(func) {
            Some(m) => m.clone(),
            None => return Err(OoError::Internal(format!("stale member id {}", func.0)).into()),
        };
        if matches!(member.body, MemberImpl::Declared { .. }) {
            return Err(OoError::MemberNotImplemented(member.full_name.clone()).into());
        }
    }

    if args.len() < member.min_args
        || member.max_args.map(|m| args.len() > m).unwrap_or(false)
    {
        let usage = match obj.and_then(|o| oo.objects.get(o)) {
            Some(o) => format!("{} {}", o.simple_name(), member.usage),
            None => member.usage.clone(),
        };
        return Err(OoError::WrongArgCount(usage).into());
    }

    let class_ns = oo
        .reg
        .class(member.class)
        .map(|c| c.ns)
        .ok_or_else(|| OoError::Internal("member without class".to_string()))?;

    trace!(member = %member.full_name, "invoke member");
    context::push_context(oo, obj, member.class, func, class_ns);
    let result = run_body(interp, oo, &member, func, obj, args, class_ns);
    let result = finish_call(oo, &member, obj, result);
    context::pop_context(interp, oo);
    result
}

fn run_body(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    member: &MemberFunction,
    _func: FuncId,
    obj: Option<ObjectId>,
    args: &[Value],
    class_ns: crate::namespace::NamespaceId,
) -> CmdResult {
    let chaining = member.kind == MemberKind::Constructor
        && obj
            .and_then(|o| oo.objects.get(o))
            .map(|o| o.constructed.is_some())
            .unwrap_or(false);

    match &member.body {
        MemberImpl::Builtin(b) => {
            // Built-ins short-circuit to their handler; the generic body
            // machinery is skipped entirely.
            crate::builtins::run_builtin(interp, oo, *b, obj, args)
        }
        MemberImpl::Native(f) => {
            if chaining {
                let obj_id = obj.ok_or(OoError::NoObjectContext)?;
                if let Some(init) = &member.init_code {
                    interp.eval_in_ns(oo, class_ns, init.as_str())?;
                }
                construct_bases(interp, oo, obj_id, member.class)?;
            }
            f(interp, oo, 0, args)
        }
        MemberImpl::Accessor(var) => {
            let obj_id = obj.ok_or(OoError::NoObjectContext)?;
            let (owner, name) = match oo.reg.var(*var) {
                Some(v) => (v.class, oo.reg.names.resolve(v.name).to_string()),
                None => return Err(OoError::Internal("stale method variable".to_string()).into()),
            };
            let ns = oo
                .objects
                .get(obj_id)
                .and_then(|o| o.class_ns.get(&owner).copied())
                .ok_or_else(|| OoError::Internal("object without variable scope".to_string()))?;
            let loc = VarLocation { ns, name };
            match args.first() {
                Some(value) => {
                    interp.write_cell_traced(oo, &loc, value.clone())?;
                    Ok(value.clone())
                }
                None => Ok(interp.read_cell(oo, &loc)?.unwrap_or_default()),
            }
        }
        MemberImpl::Script { params, body } => {
            let bindings = bind_params(params, args).ok_or_else(|| {
                Exception::from(OoError::WrongArgCount(member.usage.clone()))
            })?;
            let body = body.clone();
            let init_code = member.init_code.clone();

            interp.push_frame(class_ns, true);
            for (name, value) in bindings {
                interp.set_local(&name, value);
            }
            interp.set_frame_args(args.to_vec());

            // Constructors run their init fragment first (so constructor
            // arguments can customize base construction), then chain every
            // not-yet-constructed base, then the body. `chaining` implies
            // an object is present.
            let chain_obj = if chaining { obj } else { None };
            let mut result = Ok(Value::empty());
            if let Some(obj_id) = chain_obj {
                if let Some(init) = init_code {
                    result = interp.eval_body(oo, init.as_str());
                }
                if result.is_ok() {
                    result = construct_bases(interp, oo, obj_id, member.class)
                        .map(|_| Value::empty());
                }
            }
            if result.is_ok() {
                result = interp.eval_body(oo, body.as_str());
            }
            interp.pop_frame();

            match result {
                Err(e) if e.code == ResultCode::Return => Ok(e.value),
                Err(e) if e.code == ResultCode::Break || e.code == ResultCode::Continue => {
                    Err(Exception::error("invoked \"break\" outside of a loop"))
                }
                other => other,
            }
        }
        MemberImpl::Declared { .. } => {
            Err(OoError::MemberNotImplemented(member.full_name.clone()).into())
        }
    }
}

/// Post-call bookkeeping: record constructor/destructor completion and
/// augment the error trace.
fn finish_call(
    oo: &mut Oo,
    member: &MemberFunction,
    obj: Option<ObjectId>,
    result: CmdResult,
) -> CmdResult {
    match member.kind {
        MemberKind::Constructor => {
            if result.is_ok() {
                if let Some(set) = obj
                    .and_then(|o| oo.objects.get_mut(o))
                    .and_then(|o| o.constructed.as_mut())
                {
                    set.insert(member.class);
                }
            }
        }
        MemberKind::Destructor => {
            if result.is_ok() {
                if let Some(set) = obj
                    .and_then(|o| oo.objects.get_mut(o))
                    .and_then(|o| o.destructed.as_mut())
                {
                    set.insert(member.class);
                }
            }
        }
        _ => {}
    }

    match result {
        Err(e) if e.is_error() => {
            let frame = match member.kind {
                MemberKind::Constructor => obj
                    .and_then(|o| oo.objects.get(o))
                    .map(|o| format!("while constructing object \"{}\" in {}", o.name, member.full_name)),
                MemberKind::Destructor => obj
                    .and_then(|o| oo.objects.get(o))
                    .map(|o| format!("while deleting object \"{}\" in {}", o.name, member.full_name)),
                _ => Some(format!("(in \"{}\" body)", member.full_name)),
            };
            match frame {
                Some(f) => Err(e.add_error_info(f)),
                None => Err(e),
            }
        }
        other => other,
    }
}

/// Ensure every not-yet-constructed base of `class` has run its
/// constructor. Bases are walked in reverse declaration order; a base
/// without a constructor is marked constructed and its own bases chained.
pub fn construct_bases(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    obj: ObjectId,
    class: ClassId,
) -> Result<(), Exception> {
    let bases: Vec<ClassId> = oo
        .reg
        .class(class)
        .map(|c| c.bases.clone())
        .unwrap_or_default();
    for &base in bases.iter().rev() {
        let done = oo
            .objects
            .get(obj)
            .and_then(|o| o.constructed.as_ref())
            .map(|set| set.contains(&base))
            .unwrap_or(true);
        if done {
            continue;
        }
        match oo.reg.constructor_of(base) {
            // Inherited constructors run with no arguments.
            Some(ctor) => {
                invoke_member(interp, oo, ctor, Some(obj), &[])?;
            }
            None => {
                if let Some(set) = oo
                    .objects
                    .get_mut(obj)
                    .and_then(|o| o.constructed.as_mut())
                {
                    set.insert(base);
                }
                construct_bases(interp, oo, obj, base)?;
            }
        }
    }
    Ok(())
}
