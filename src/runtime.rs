// objsh runtime
//
// The Oo struct aggregates the entity tables, the object table, the call
// context arena, and the construction state. It is the client-data value
// threaded through every command, so several independent runtimes can
// coexist in one process; nothing here is a global.

use tracing::debug;

use crate::builtins;
use crate::class::{
    Builtin, ClassId, ClassInfo, ClassRegistry, Component, DelegatedFunction, DelegatedOption,
    FuncId, MemberFunction, MemberImpl, MemberKind, OptionDef, OptionId, Protection, VarId,
    Variable,
};
use crate::context::ContextArena;
use crate::delegate;
use crate::error::OoError;
use crate::interp::{arg_bounds, parse_params, usage_string, Interp, VarLocation};
use crate::namespace::{self, GLOBAL_NS};
use crate::object::{ObjectId, ObjectTable};
use crate::resolver;
use crate::types::{Exception, Value};
use crate::vtable;

/// Autoload hook: given a member's fully qualified name, try to supply its
/// implementation. Returns true when something was loaded.
pub type AutoloadFn = fn(&mut Interp<Oo>, &mut Oo, &str) -> bool;

/// Construction state for one in-progress object creation. Kept on an
/// explicit save/restore stack so a constructor creating another object
/// nests cleanly.
#[derive(Debug, Clone, Copy)]
pub struct BuildFrame {
    pub obj: ObjectId,
    pub building_hull: bool,
}

pub struct Oo {
    pub reg: ClassRegistry,
    pub objects: ObjectTable,
    pub ctxs: ContextArena,
    /// Stack of in-progress constructions, innermost last.
    pub build: Vec<BuildFrame>,
    pub autoload: Option<AutoloadFn>,
    pub root_class: ClassId,
    auto_counter: u64,
}

impl Oo {
    /// Build the runtime and install its command surface into the interp.
    pub fn new(interp: &mut Interp<Oo>) -> Self {
        let mut reg = ClassRegistry::new();

        // Internal namespaces. Objects' variable scopes live under
        // ::objsh::objects, keyed by object id.
        let _ = interp.create_namespace("::objsh::objects");

        // The synthetic root class carrying the built-in members every
        // class inherits.
        let root_ns = interp
            .create_namespace("::objsh::Object")
            .expect("root namespace creation cannot fail");
        let root_name = reg.names.intern("Object");
        let info = ClassInfo::new(root_name, "::objsh::Object".to_string(), root_ns);
        let root = reg.add_class(info);

        add_builtin(&mut reg, root, "configure", Builtin::Configure, 0, None,
            "configure ?-option? ?value -option value...?");
        add_builtin(&mut reg, root, "cget", Builtin::Cget, 1, Some(1), "cget -option");
        add_builtin(&mut reg, root, "info", Builtin::Info, 1, None, "info option ?args...?");
        add_builtin(&mut reg, root, "isa", Builtin::Isa, 1, Some(1), "isa className");
        add_builtin(&mut reg, root, "destroy", Builtin::Destroy, 0, Some(0), "destroy");

        // Every object carries `this`; it is declared once on the root
        // class so the resolver reaches it from any method body.
        let this_name = reg.names.intern("this");
        reg.add_variable(
            root,
            Variable {
                name: this_name,
                full_name: "::objsh::Object::this".to_string(),
                class: root,
                protection: Protection::Protected,
                default: None,
                config_code: None,
                common: false,
            },
        )
        .expect("this registration cannot collide");
        vtable::rebuild(&mut reg, root);

        interp.set_resolver(root_ns, resolver::hooks());
        interp.add_command(GLOBAL_NS, "class", builtins::cmd_class, 0);

        Self {
            reg,
            objects: ObjectTable::new(),
            ctxs: ContextArena::new(),
            build: Vec::new(),
            autoload: None,
            root_class: root,
            auto_counter: 0,
        }
    }

    /// The object of the innermost active call context.
    pub fn current_object(&self) -> Option<ObjectId> {
        self.ctxs.current().and_then(|c| c.object)
    }

    /// The class of the innermost active call context.
    pub fn current_class(&self) -> Option<ClassId> {
        self.ctxs.current().map(|c| c.class)
    }

    /// The active (class, object) pair, for collaborators that need to know
    /// where execution currently stands.
    pub fn get_context(&self) -> Option<(ClassId, Option<ObjectId>)> {
        self.ctxs.current().map(|c| (c.class, c.object))
    }

    /// Generate a `#auto` object name: the class's simple name, lowercased,
    /// plus a counter.
    pub fn generate_auto_name(&mut self, class: ClassId) -> String {
        let stem = self
            .reg
            .class(class)
            .map(|c| c.simple_name().to_lowercase())
            .unwrap_or_else(|| "obj".to_string());
        loop {
            self.auto_counter += 1;
            let name = format!("{}{}", stem, self.auto_counter);
            if self.objects.find(&format!("::{}", name)).is_none() {
                return name;
            }
        }
    }
}

fn add_builtin(
    reg: &mut ClassRegistry,
    class: ClassId,
    name: &str,
    builtin: Builtin,
    min: usize,
    max: Option<usize>,
    usage: &str,
) {
    let name_id = reg.names.intern(name);
    let full = format!("{}::{}", reg.class_full_name(class), name);
    let member = MemberFunction {
        name: name_id,
        full_name: full,
        class,
        protection: Protection::Public,
        kind: MemberKind::Method,
        body: MemberImpl::Builtin(builtin),
        init_code: None,
        min_args: min,
        max_args: max,
        usage: usage.to_string(),
    };
    reg.add_function(class, member)
        .expect("builtin registration cannot collide");
}

/// A fresh interpreter with the class runtime installed.
pub fn new_shell() -> (Interp<Oo>, Oo) {
    let mut interp = Interp::new();
    let oo = Oo::new(&mut interp);
    (interp, oo)
}

fn normalize(name: &str) -> String {
    if name.starts_with("::") {
        name.to_string()
    } else {
        format!("::{}", name)
    }
}

//--------------------------------------------------------------------------
// Class lifecycle

pub fn create_class(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    name: &str,
    bases: &[String],
) -> Result<ClassId, Exception> {
    let full = normalize(name);
    if oo.reg.find_class(&full).is_some() {
        return Err(Exception::error(format!(
            "class \"{}\" already exists",
            name
        )));
    }

    let mut base_ids = Vec::with_capacity(bases.len().max(1));
    for base in bases {
        let base_full = normalize(base);
        let id = oo
            .reg
            .find_class(&base_full)
            .ok_or_else(|| OoError::UnknownClass(base.clone()))?;
        base_ids.push(id);
    }
    if base_ids.is_empty() {
        base_ids.push(oo.root_class);
    }

    let ns = interp.create_namespace(&full)?;
    let (quals, simple) = namespace::split_tail(&full)
        .ok_or_else(|| OoError::Internal("unqualified class path".to_string()))?;
    let parent_ns = interp
        .find_namespace(GLOBAL_NS, quals)
        .ok_or_else(|| OoError::Internal("class parent namespace missing".to_string()))?;
    if interp.has_command(parent_ns, simple) {
        return Err(Exception::error(format!(
            "command \"{}\" already exists",
            name
        )));
    }

    let name_id = oo.reg.names.intern(simple);
    let mut info = ClassInfo::new(name_id, full.clone(), ns);
    info.bases = base_ids.clone();
    let id = oo.reg.add_class(info);
    for &base in &base_ids {
        if let Some(b) = oo.reg.class_mut(base) {
            b.derived.push(id);
        }
    }
    oo.reg.compute_heritage(id);

    interp.set_resolver(ns, resolver::hooks());
    interp.add_command_with_trace(
        parent_ns,
        simple,
        builtins::class_dispatch,
        id.0 as u64,
        Some(builtins::class_cmd_trace),
    );
    vtable::rebuild(&mut oo.reg, id);

    debug!(class = %full, bases = bases.len(), "created class");
    Ok(id)
}

/// Finalize a class's inheritance list. Only legal while no instance of
/// the class (or of a class derived from it) exists.
pub fn set_inheritance(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    bases: &[String],
) -> Result<(), Exception> {
    let _ = interp;
    let class_name = oo.reg.class_full_name(class).to_string();

    for id in oo.objects.live_ids() {
        let obj_class = oo.objects.get(id).map(|o| o.class);
        if let Some(oc) = obj_class {
            if oo.reg.is_a(oc, class) {
                return Err(Exception::error(format!(
                    "can't change inheritance of \"{}\": class has objects",
                    class_name
                )));
            }
        }
    }

    let mut base_ids = Vec::with_capacity(bases.len());
    for base in bases {
        let base_full = normalize(base);
        let id = oo
            .reg
            .find_class(&base_full)
            .ok_or_else(|| OoError::UnknownClass(base.clone()))?;
        if oo.reg.is_a(id, class) {
            return Err(Exception::error(format!(
                "inheritance cycle: \"{}\" already inherits from \"{}\"",
                base, class_name
            )));
        }
        base_ids.push(id);
    }

    let old_bases = oo
        .reg
        .class(class)
        .map(|c| c.bases.clone())
        .unwrap_or_default();
    for base in old_bases {
        if let Some(b) = oo.reg.class_mut(base) {
            b.derived.retain(|&d| d != class);
        }
    }
    if let Some(info) = oo.reg.class_mut(class) {
        info.bases = base_ids.clone();
    }
    for &base in &base_ids {
        if let Some(b) = oo.reg.class_mut(base) {
            b.derived.push(class);
        }
    }

    recompute_heritage_tree(oo, class);
    vtable::rebuild_hierarchy(&mut oo.reg, class);
    Ok(())
}

fn recompute_heritage_tree(oo: &mut Oo, class: ClassId) {
    oo.reg.compute_heritage(class);
    let derived = oo
        .reg
        .class(class)
        .map(|c| c.derived.clone())
        .unwrap_or_default();
    for d in derived {
        recompute_heritage_tree(oo, d);
    }
}

/// Delete a class: derived classes first, then every live instance of
/// exactly this class, then the namespace and the class record. Deletion
/// is transactional per subtree; on the first failure the remaining work
/// is abandoned and already-deleted derived classes stay deleted.
pub fn delete_class(interp: &mut Interp<Oo>, oo: &mut Oo, class: ClassId) -> Result<(), Exception> {
    let full = oo.reg.class_full_name(class).to_string();
    debug!(class = %full, "deleting class");

    let derived = oo
        .reg
        .class(class)
        .map(|c| c.derived.clone())
        .unwrap_or_default();
    for d in derived {
        if oo.reg.class(d).is_some() {
            delete_class(interp, oo, d)?;
        }
    }

    // The instance scan restarts from the top after each deletion: a
    // cascading destructor may have deleted other objects meanwhile.
    while let Some(obj) = oo.objects.first_instance_of(class) {
        crate::object::destroy_object(interp, oo, obj)?;
    }

    let (ns, bases) = match oo.reg.class(class) {
        Some(info) => (info.ns, info.bases.clone()),
        None => return Ok(()),
    };
    for base in bases {
        if let Some(b) = oo.reg.class_mut(base) {
            b.derived.retain(|&d| d != class);
        }
    }
    interp.delete_namespace(oo, ns);
    oo.reg.remove_class(class);

    // Drop the access command last; its delete trace finds the class gone
    // and does not re-enter.
    let (quals, simple) = match namespace::split_tail(&full) {
        Some(parts) => parts,
        None => return Ok(()),
    };
    if let Some(parent_ns) = interp.find_namespace(GLOBAL_NS, quals) {
        interp.remove_command(oo, parent_ns, simple);
    }
    Ok(())
}

//--------------------------------------------------------------------------
// Member definition

#[allow(clippy::too_many_arguments)]
pub fn create_member(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    protection: Protection,
    kind: MemberKind,
    name: &str,
    params_spec: &str,
    body: Value,
    init_code: Option<Value>,
) -> Result<FuncId, Exception> {
    let _ = interp;
    let params = parse_params(params_spec)?;
    let (min_args, max_args) = arg_bounds(&params);
    let usage = usage_string(name, &params);
    let name_id = oo.reg.names.intern(name);
    let full = format!("{}::{}", oo.reg.class_full_name(class), name);

    let member = MemberFunction {
        name: name_id,
        full_name: full,
        class,
        protection,
        kind,
        body: MemberImpl::Script { params, body },
        init_code,
        min_args,
        max_args,
        usage,
    };
    let id = oo.reg.add_function(class, member).map_err(Exception::from)?;
    vtable::rebuild_hierarchy(&mut oo.reg, class);
    Ok(id)
}

pub fn create_constructor(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    params_spec: &str,
    init_code: Option<Value>,
    body: Value,
) -> Result<FuncId, Exception> {
    create_member(
        interp,
        oo,
        class,
        Protection::Public,
        MemberKind::Constructor,
        "constructor",
        params_spec,
        body,
        init_code,
    )
}

pub fn create_destructor(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    body: Value,
) -> Result<FuncId, Exception> {
    create_member(
        interp,
        oo,
        class,
        Protection::Public,
        MemberKind::Destructor,
        "destructor",
        "",
        body,
        None,
    )
}

pub fn create_variable(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    protection: Protection,
    name: &str,
    default: Option<Value>,
    config_code: Option<Value>,
) -> Result<VarId, Exception> {
    let _ = interp;
    if config_code.is_some() && protection != Protection::Public {
        return Err(Exception::error(format!(
            "option \"{}\": config code requires a public variable",
            name
        )));
    }
    let name_id = oo.reg.names.intern(name);
    let full = format!("{}::{}", oo.reg.class_full_name(class), name);
    let var = Variable {
        name: name_id,
        full_name: full,
        class,
        protection,
        default,
        config_code,
        common: false,
    };
    let id = oo.reg.add_variable(class, var).map_err(Exception::from)?;
    vtable::rebuild_hierarchy(&mut oo.reg, class);
    Ok(id)
}

/// A common: one shared storage cell in the class namespace, created at
/// definition time.
pub fn create_common(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    protection: Protection,
    name: &str,
    default: Option<Value>,
) -> Result<VarId, Exception> {
    let name_id = oo.reg.names.intern(name);
    let (full, ns) = {
        let info = oo
            .reg
            .class(class)
            .ok_or_else(|| OoError::Internal("common on dead class".to_string()))?;
        (format!("{}::{}", info.full_name, name), info.ns)
    };
    let var = Variable {
        name: name_id,
        full_name: full,
        class,
        protection,
        default: default.clone(),
        config_code: None,
        common: true,
    };
    let id = oo.reg.add_variable(class, var).map_err(Exception::from)?;

    let loc = VarLocation {
        ns,
        name: name.to_string(),
    };
    let cell = interp.make_cell(&loc);
    cell.value = default;

    vtable::rebuild_hierarchy(&mut oo.reg, class);
    Ok(id)
}

pub fn create_option(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    name: &str,
    default: Option<Value>,
    config_code: Option<Value>,
) -> Result<OptionId, Exception> {
    let _ = interp;
    if !name.starts_with('-') {
        return Err(Exception::error(format!(
            "bad option name \"{}\": options begin with -",
            name
        )));
    }
    let name_id = oo.reg.names.intern(name);
    let full = format!("{}::{}", oo.reg.class_full_name(class), name);
    let opt = OptionDef {
        name: name_id,
        full_name: full,
        class,
        default,
        config_code,
    };
    oo.reg.add_option(class, opt).map_err(Exception::from)
}

/// A component: a protected instance variable that names the sub-command
/// delegation forwards to.
pub fn create_component(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    name: &str,
) -> Result<VarId, Exception> {
    let var = create_variable(interp, oo, class, Protection::Protected, name, None, None)?;
    let name_id = oo.reg.names.intern(name);
    if let Some(info) = oo.reg.class_mut(class) {
        info.components.insert(name_id, Component { name: name_id, var });
    }
    Ok(var)
}

/// A method variable: a protected instance variable plus a same-named
/// public accessor method (no argument reads, one argument writes).
pub fn create_method_variable(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    name: &str,
    default: Option<Value>,
) -> Result<VarId, Exception> {
    let var = create_variable(interp, oo, class, Protection::Protected, name, default, None)?;
    let name_id = oo.reg.names.intern(name);
    let full = format!("{}::{}", oo.reg.class_full_name(class), name);
    let member = MemberFunction {
        name: name_id,
        full_name: full,
        class,
        protection: Protection::Public,
        kind: MemberKind::Method,
        body: MemberImpl::Accessor(var),
        init_code: None,
        min_args: 0,
        max_args: Some(1),
        usage: format!("{} ?value?", name),
    };
    oo.reg.add_function(class, member).map_err(Exception::from)?;
    if let Some(info) = oo.reg.class_mut(class) {
        info.method_variables.insert(name_id, var);
    }
    vtable::rebuild_hierarchy(&mut oo.reg, class);
    Ok(var)
}

#[allow(clippy::too_many_arguments)]
pub fn add_delegated_method(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    name: &str,
    component: &str,
    as_spec: Option<String>,
    using: Option<String>,
    except: Vec<String>,
) -> Result<(), Exception> {
    let _ = interp;
    if let Some(template) = &using {
        delegate::validate_template(template)?;
    }
    let as_words = match as_spec {
        Some(spec) => {
            crate::reader::parse_list(&spec).map_err(|e| Exception::error(e.to_string()))?
        }
        None => Vec::new(),
    };
    let component = oo.reg.names.intern(component);
    if let Some(info) = oo.reg.class_mut(class) {
        info.delegated_functions.push(DelegatedFunction {
            name: name.to_string(),
            component,
            as_words,
            using,
            except,
        });
    }
    Ok(())
}

pub fn add_delegated_option(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    class: ClassId,
    name: &str,
    component: &str,
    as_name: Option<String>,
    except: Vec<String>,
) -> Result<(), Exception> {
    let _ = interp;
    if name != "*" && !name.starts_with('-') {
        return Err(Exception::error(format!(
            "bad delegated option \"{}\": should be -option or *",
            name
        )));
    }
    let component = oo.reg.names.intern(component);
    if let Some(info) = oo.reg.class_mut(class) {
        info.delegated_options.push(DelegatedOption {
            name: name.to_string(),
            component,
            as_name,
            except,
        });
    }
    Ok(())
}

/// Declare a member without an implementation. Invoking it triggers one
/// autoload pass; if nothing supplies a body the call fails with a
/// not-implemented error.
pub fn declare_member(
    oo: &mut Oo,
    class: ClassId,
    protection: Protection,
    kind: MemberKind,
    name: &str,
    params_spec: &str,
) -> Result<FuncId, Exception> {
    let params = parse_params(params_spec)?;
    let (min_args, max_args) = arg_bounds(&params);
    let usage = usage_string(name, &params);
    let name_id = oo.reg.names.intern(name);
    let full = format!("{}::{}", oo.reg.class_full_name(class), name);
    let member = MemberFunction {
        name: name_id,
        full_name: full,
        class,
        protection,
        kind,
        body: MemberImpl::Declared { params },
        init_code: None,
        min_args,
        max_args,
        usage,
    };
    let id = oo.reg.add_function(class, member).map_err(Exception::from)?;
    vtable::rebuild_hierarchy(&mut oo.reg, class);
    Ok(id)
}

/// Supply the implementation of a declared member. Autoload hooks call
/// this once they have located the body.
pub fn define_member_body(
    oo: &mut Oo,
    class: ClassId,
    name: &str,
    params_spec: &str,
    body: Value,
) -> Result<(), Exception> {
    let params = parse_params(params_spec)?;
    let (min_args, max_args) = arg_bounds(&params);
    let name_id = oo
        .reg
        .names
        .lookup(name)
        .ok_or_else(|| OoError::UnknownMember(name.to_string()))?;
    let func = oo
        .reg
        .class(class)
        .and_then(|c| c.functions.get(&name_id).copied())
        .ok_or_else(|| OoError::UnknownMember(name.to_string()))?;
    if let Some(member) = oo.reg.func_mut(func) {
        member.body = MemberImpl::Script { params, body };
        member.min_args = min_args;
        member.max_args = max_args;
    }
    Ok(())
}

//--------------------------------------------------------------------------
// Hull substitution

/// Substitute a foreign "hull" command into the object currently under
/// construction, before its option initialization completes. Only legal
/// while a construction is in progress; the gate is the construction
/// stack, not a process-wide flag.
pub fn install_hull(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    component: &str,
    command: &str,
) -> Result<(), Exception> {
    let frame = oo
        .build
        .last()
        .copied()
        .ok_or_else(|| Exception::error("no object is being constructed"))?;

    if let Some(top) = oo.build.last_mut() {
        top.building_hull = true;
    }

    let result = (|| {
        let name_id = oo
            .reg
            .names
            .lookup(component)
            .ok_or_else(|| Exception::error(format!("component \"{}\" is undefined", component)))?;
        let class = oo
            .objects
            .get(frame.obj)
            .map(|o| o.class)
            .ok_or_else(|| OoError::Internal("construction of dead object".to_string()))?;
        let info = oo
            .reg
            .class(class)
            .ok_or_else(|| OoError::Internal("object of dead class".to_string()))?;
        let var = info
            .resolve_vars
            .get(&name_id)
            .map(|&idx| info.var_lookups[idx as usize].var)
            .ok_or_else(|| Exception::error(format!("component \"{}\" is undefined", component)))?;
        let owner = oo
            .reg
            .var(var)
            .map(|v| v.class)
            .ok_or_else(|| OoError::Internal("stale component variable".to_string()))?;
        let ns = oo
            .objects
            .get(frame.obj)
            .and_then(|o| o.class_ns.get(&owner).copied())
            .ok_or_else(|| OoError::Internal("object without variable scope".to_string()))?;
        let loc = VarLocation {
            ns,
            name: component.to_string(),
        };
        // System write: bypasses traces on purpose.
        interp.make_cell(&loc).value = Some(Value::from(command));
        Ok(())
    })();

    if let Some(top) = oo.build.last_mut() {
        top.building_hull = false;
    }
    result
}
