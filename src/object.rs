// objsh object lifecycle
//
// Object creation builds the per-instance variable namespace (one sub-scope
// per ancestor class), binds instance variables and options with their
// traces, installs the access command, and chains constructors. Destruction
// chains destructors most-specific-first and tears the namespace down,
// deferring the teardown while calls are still in flight on the object.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::class::{ClassId, OptionId, Protection, VarId};
use crate::context::ContextId;
use crate::error::OoError;
use crate::interp::{Interp, TraceOp, VarLocation, VarTrace};
use crate::namespace::{self, NamespaceId, GLOBAL_NS};
use crate::runtime::Oo;
use crate::symbol::NameId;
use crate::types::{CmdResult, Exception, Value};
use crate::vtable;

/// Unique identifier for a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

pub const OBJ_CONSTRUCTING: u32 = 0x1;
pub const OBJ_DESTRUCTING: u32 = 0x2;

/// A delegated method installed on an object.
#[derive(Debug, Clone)]
pub struct MethodForward {
    pub component: NameId,
    /// Words substituted for the method name ("as"), empty for the default.
    pub as_words: Vec<String>,
    /// "using" template; expanded at call time against the component's
    /// current value.
    pub using: Option<String>,
}

/// A delegated option installed on an object.
#[derive(Debug, Clone)]
pub struct OptionForward {
    pub component: NameId,
    /// Option name used on the component.
    pub target: String,
}

pub struct Object {
    /// Fully qualified access-command name; tracks renames.
    pub name: String,
    /// Most specific class.
    pub class: ClassId,
    /// Root of the per-instance variable namespace.
    pub ns: NamespaceId,
    /// Sub-scope per ancestor class.
    pub class_ns: HashMap<ClassId, NamespaceId>,
    /// Namespace and simple name of the access command; None once deleted.
    pub access_cmd: Option<(NamespaceId, String)>,
    /// Present only while construction is in progress; tracks which
    /// ancestor constructors have already run.
    pub constructed: Option<HashSet<ClassId>>,
    /// Present only while destruction is in progress.
    pub destructed: Option<HashSet<ClassId>>,
    pub context_cache: HashMap<crate::class::FuncId, ContextId>,
    pub call_refcount: u32,
    pub teardown_deferred: bool,
    pub being_deleted: bool,
    /// Installed delegated methods, keyed by the visible method name.
    pub forwards: IndexMap<String, MethodForward>,
    /// Installed delegated options, keyed by the visible option name.
    pub delegated_opts: IndexMap<NameId, OptionForward>,
}

impl Object {
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.constructed.is_some() {
            flags |= OBJ_CONSTRUCTING;
        }
        if self.destructed.is_some() {
            flags |= OBJ_DESTRUCTING;
        }
        flags
    }

    pub fn simple_name(&self) -> &str {
        namespace::split_tail(&self.name)
            .map(|(_, tail)| tail)
            .unwrap_or(&self.name)
    }
}

/// The global object table: a free-listed slab plus the name index.
#[derive(Default)]
pub struct ObjectTable {
    slots: Vec<Option<Object>>,
    free: Vec<u32>,
    by_name: HashMap<String, ObjectId>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, obj: Object) -> ObjectId {
        let name = obj.name.clone();
        let id = if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(obj);
            ObjectId(slot)
        } else {
            let id = ObjectId(self.slots.len() as u32);
            self.slots.push(Some(obj));
            id
        };
        self.by_name.insert(name, id);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.slots.get(id.0 as usize).and_then(|o| o.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.slots.get_mut(id.0 as usize).and_then(|o| o.as_mut())
    }

    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.by_name.get(name).copied()
    }

    pub fn unregister_name(&mut self, name: &str) {
        self.by_name.remove(name);
    }

    pub fn rename(&mut self, id: ObjectId, new_full: String) {
        if let Some(obj) = self.get_mut(id) {
            let old = std::mem::replace(&mut obj.name, new_full.clone());
            self.by_name.remove(&old);
            self.by_name.insert(new_full, id);
        }
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        let obj = self.slots.get_mut(id.0 as usize).and_then(|o| o.take())?;
        self.free.push(id.0);
        self.by_name.remove(&obj.name);
        Some(obj)
    }

    /// First live instance of exactly this class, scanning from the start
    /// of the table. Cascade deletion re-runs this scan after every
    /// deletion because destroying one object may destroy others.
    pub fn first_instance_of(&self, class: ClassId) -> Option<ObjectId> {
        self.slots.iter().enumerate().find_map(|(i, slot)| {
            slot.as_ref()
                .filter(|o| o.class == class && !o.being_deleted)
                .map(|_| ObjectId(i as u32))
        })
    }

    pub fn live_ids(&self) -> Vec<ObjectId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ObjectId(i as u32)))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

//--------------------------------------------------------------------------
// Creation

/// Create an object of `class` named `name`, run its constructor chain,
/// and install its delegations. Returns the fully qualified object name.
pub fn create_object(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    name: &str,
    class: ClassId,
    args: &[Value],
) -> CmdResult {
    let full_name = if name.starts_with("::") {
        name.to_string()
    } else {
        format!("::{}", name)
    };
    let (cmd_ns, simple) = match namespace::split_tail(&full_name) {
        Some((quals, tail)) => {
            let ns = interp
                .find_namespace(GLOBAL_NS, quals)
                .ok_or_else(|| Exception::error(format!("unknown namespace in \"{}\"", name)))?;
            (ns, tail.to_string())
        }
        None => (GLOBAL_NS, full_name.clone()),
    };
    if interp.has_command(cmd_ns, &simple) {
        return Err(Exception::error(format!(
            "command \"{}\" already exists",
            name
        )));
    }

    // Allocate first so namespace paths can be keyed by the object id,
    // which survives renames.
    let id = oo.objects.alloc(Object {
        name: full_name.clone(),
        class,
        ns: GLOBAL_NS,
        class_ns: HashMap::new(),
        access_cmd: None,
        constructed: None,
        destructed: None,
        context_cache: HashMap::new(),
        call_refcount: 0,
        teardown_deferred: false,
        being_deleted: false,
        forwards: IndexMap::new(),
        delegated_opts: IndexMap::new(),
    });

    let obj_ns_path = format!("::objsh::objects::o{}", id.0);
    let obj_ns = interp.create_namespace(&obj_ns_path)?;
    if let Some(obj) = oo.objects.get_mut(id) {
        obj.ns = obj_ns;
    }

    bind_instance_variables(interp, oo, id, class, &obj_ns_path)?;
    bind_this(interp, oo, id, &full_name);
    init_options(interp, oo, id, class, obj_ns);

    // The access command, with a rename/delete trace that triggers
    // destruction when the command goes away without a rename.
    interp.add_command_with_trace(
        cmd_ns,
        &simple,
        crate::builtins::object_dispatch,
        id.0 as u64,
        Some(object_cmd_trace),
    );
    if let Some(obj) = oo.objects.get_mut(id) {
        obj.access_cmd = Some((cmd_ns, simple.clone()));
    }

    debug!(object = %full_name, class = %oo.reg.class_full_name(class), "created object");

    // The object is registered (and `this` readable) before the
    // constructor runs, so constructor bodies can already introspect it.
    if let Some(obj) = oo.objects.get_mut(id) {
        obj.constructed = Some(HashSet::new());
    }
    oo.build.push(crate::runtime::BuildFrame {
        obj: id,
        building_hull: false,
    });

    let ctor = oo.reg.constructor_of(class);
    let ctor_result = match ctor {
        Some(func) => crate::methods::invoke_member(interp, oo, func, Some(id), args),
        None => {
            if !args.is_empty() {
                let class_name = oo.reg.class_full_name(class).to_string();
                Err(OoError::WrongArgCount(format!(
                    "{} {}",
                    class_name.trim_start_matches("::"),
                    simple
                ))
                .into())
            } else {
                if let Some(set) = oo.objects.get_mut(id).and_then(|o| o.constructed.as_mut()) {
                    set.insert(class);
                }
                crate::methods::construct_bases(interp, oo, id, class).map(|_| Value::empty())
            }
        }
    };

    oo.build.pop();
    if let Some(obj) = oo.objects.get_mut(id) {
        obj.constructed = None;
    }

    let install_result = match ctor_result {
        Ok(_) => crate::delegate::install_for_object(interp, oo, id),
        Err(e) => Err(e),
    };

    if let Err(e) = install_result {
        // Deleting the access command unwinds through the destroy path.
        if let Some((ns, cname)) = oo.objects.get_mut(id).and_then(|o| o.access_cmd.take()) {
            interp.remove_command(oo, ns, &cname);
        }
        return Err(e.add_error_info(OoError::ConstructionFailure(full_name).to_string()));
    }

    Ok(Value::from(full_name))
}

fn bind_instance_variables(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    id: ObjectId,
    class: ClassId,
    obj_ns_path: &str,
) -> Result<(), Exception> {
    let order = vtable::traversal_order(&oo.reg, class);
    for &cls in &order {
        let Some(info) = oo.reg.class(cls) else { continue };
        let sub_path = format!("{}{}", obj_ns_path, info.full_name);
        let vars: Vec<(VarId, String, Option<Value>, bool)> = info
            .variables
            .values()
            .filter_map(|&vid| oo.reg.var(vid).map(|v| (vid, v)))
            .filter(|(_, v)| !v.common)
            .map(|(vid, v)| {
                (
                    vid,
                    oo.reg.names.resolve(v.name).to_string(),
                    v.default.clone(),
                    v.config_code.is_some() && v.protection == Protection::Public,
                )
            })
            .collect();

        let sub_ns = interp.create_namespace(&sub_path)?;
        if let Some(obj) = oo.objects.get_mut(id) {
            obj.class_ns.insert(cls, sub_ns);
        }

        for (vid, vname, default, traced) in vars {
            let loc = VarLocation {
                ns: sub_ns,
                name: vname,
            };
            let cell = interp.make_cell(&loc);
            cell.value = default;
            if traced {
                interp.add_var_trace(
                    &loc,
                    VarTrace {
                        on_read: false,
                        on_write: true,
                        on_unset: false,
                        func: var_config_trace,
                        data: (id.0 as u64, vid.0 as u64),
                    },
                );
            }
        }
    }
    Ok(())
}

/// Bind `this` in the root-class sub-scope, where the declared root-class
/// variable resolves. The read trace keeps it correct across renames.
fn bind_this(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId, full: &str) {
    let Some(ns) = oo
        .objects
        .get(id)
        .and_then(|o| o.class_ns.get(&oo.root_class).copied())
    else {
        return;
    };
    let loc = VarLocation {
        ns,
        name: "this".to_string(),
    };
    let cell = interp.make_cell(&loc);
    cell.value = Some(Value::from(full));
    interp.add_var_trace(
        &loc,
        VarTrace {
            on_read: true,
            on_write: true,
            on_unset: false,
            func: this_trace,
            data: (id.0 as u64, 0),
        },
    );
}

fn init_options(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId, class: ClassId, obj_ns: NamespaceId) {
    let order = vtable::traversal_order(&oo.reg, class);
    let mut seen: HashSet<NameId> = HashSet::new();
    let mut cells: Vec<(OptionId, String, Option<Value>)> = Vec::new();
    for &cls in &order {
        let Some(info) = oo.reg.class(cls) else { continue };
        for (&name, &oid) in &info.options {
            if !seen.insert(name) {
                continue;
            }
            if let Some(opt) = oo.reg.opt(oid) {
                cells.push((
                    oid,
                    oo.reg.names.resolve(name).to_string(),
                    opt.default.clone(),
                ));
            }
        }
    }
    for (oid, oname, default) in cells {
        let loc = VarLocation {
            ns: obj_ns,
            name: oname,
        };
        let cell = interp.make_cell(&loc);
        cell.value = Some(default.unwrap_or_default());
        interp.add_var_trace(
            &loc,
            VarTrace {
                on_read: false,
                on_write: true,
                on_unset: false,
                func: option_config_trace,
                data: (id.0 as u64, oid.0 as u64),
            },
        );
    }
}

//--------------------------------------------------------------------------
// Traces

/// `this` recomputes the object's current fully qualified access-command
/// name on every read, so it stays correct across renames. Writes are
/// rejected outside the construction/destruction phases.
fn this_trace(
    _interp: &mut Interp<Oo>,
    oo: &mut Oo,
    _ns: NamespaceId,
    _name: &str,
    op: TraceOp,
    data: (u64, u64),
) -> Result<Option<Value>, Exception> {
    let id = ObjectId(data.0 as u32);
    match op {
        TraceOp::Read => Ok(oo
            .objects
            .get(id)
            .map(|o| Value::from(o.name.as_str()))),
        TraceOp::Write => {
            let flags = oo.objects.get(id).map(|o| o.flags()).unwrap_or(0);
            if flags & (OBJ_CONSTRUCTING | OBJ_DESTRUCTING) != 0 {
                Ok(None)
            } else {
                Err(Exception::error("variable \"this\" cannot be modified"))
            }
        }
        TraceOp::Unset => Ok(None),
    }
}

/// Write trace on a public variable carrying config code: evaluate the
/// code in the declaring class's namespace. An error propagates and the
/// interpreter rolls the cell back.
fn var_config_trace(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    _ns: NamespaceId,
    name: &str,
    op: TraceOp,
    data: (u64, u64),
) -> Result<Option<Value>, Exception> {
    if op != TraceOp::Write {
        return Ok(None);
    }
    let vid = VarId(data.1 as u32);
    let (code, class_ns) = match oo.reg.var(vid) {
        Some(var) => (
            var.config_code.clone(),
            oo.reg.class(var.class).map(|c| c.ns),
        ),
        None => (None, None),
    };
    if let (Some(code), Some(ns)) = (code, class_ns) {
        match interp.eval_in_ns(oo, ns, code.as_str()) {
            Ok(_) => {}
            Err(e) if e.code == crate::types::ResultCode::Return => {}
            Err(e) => {
                return Err(e.add_error_info(format!("(error in configuration of \"{}\")", name)))
            }
        }
    }
    Ok(None)
}

/// Write trace on an option cell: evaluate its config code, if declared,
/// in the declaring class's namespace.
fn option_config_trace(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    _ns: NamespaceId,
    name: &str,
    op: TraceOp,
    data: (u64, u64),
) -> Result<Option<Value>, Exception> {
    if op != TraceOp::Write {
        return Ok(None);
    }
    let oid = OptionId(data.1 as u32);
    let (code, class_ns) = match oo.reg.opt(oid) {
        Some(opt) => (
            opt.config_code.clone(),
            oo.reg.class(opt.class).map(|c| c.ns),
        ),
        None => (None, None),
    };
    if let (Some(code), Some(ns)) = (code, class_ns) {
        match interp.eval_in_ns(oo, ns, code.as_str()) {
            Ok(_) => {}
            Err(e) if e.code == crate::types::ResultCode::Return => {}
            Err(e) => {
                return Err(e.add_error_info(format!("(error in configuration of \"{}\")", name)))
            }
        }
    }
    Ok(None)
}

/// Rename/delete trace on the access command. Deletion without a rename
/// triggers destruction; repeat deletion is a no-op.
fn object_cmd_trace(interp: &mut Interp<Oo>, oo: &mut Oo, token: u64, _old: &str, new: Option<&str>) {
    let id = ObjectId(token as u32);
    match new {
        Some(new_name) => {
            let cmd_ns = oo.objects.get(id).and_then(|o| o.access_cmd.as_ref().map(|c| c.0));
            let parent = cmd_ns.map(|ns| interp.ns_full_name(ns).to_string());
            let full = match parent.as_deref() {
                Some(p) => namespace::join(p, new_name),
                None => format!("::{}", new_name),
            };
            oo.objects.rename(id, full);
            if let Some(obj) = oo.objects.get_mut(id) {
                if let Some(cmd) = obj.access_cmd.as_mut() {
                    cmd.1 = new_name.to_string();
                }
            }
        }
        None => {
            let live = oo
                .objects
                .get_mut(id)
                .filter(|o| !o.being_deleted)
                .map(|o| {
                    o.access_cmd = None;
                    true
                })
                .unwrap_or(false);
            if live {
                if let Err(e) = destroy_object(interp, oo, id) {
                    warn!(object = id.0, error = %e.value, "error destroying object");
                }
            }
        }
    }
}

//--------------------------------------------------------------------------
// Destruction

/// Destroy an object: chain destructors most-specific-first, tear down the
/// per-instance namespace (deferred while calls are in flight), and remove
/// the object from the global table. Repeat destruction is a no-op.
pub fn destroy_object(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId) -> Result<(), Exception> {
    let (class, name) = match oo.objects.get_mut(id) {
        Some(obj) => {
            if obj.being_deleted {
                return Ok(());
            }
            obj.being_deleted = true;
            obj.destructed = Some(HashSet::new());
            (obj.class, obj.name.clone())
        }
        None => return Ok(()),
    };

    debug!(object = %name, "destroying object");

    if let Err(e) = destruct_class_chain(interp, oo, id, class) {
        // The phase aborts; clear the in-progress markers so a later
        // attempt can run the remaining destructors.
        if let Some(obj) = oo.objects.get_mut(id) {
            obj.being_deleted = false;
            obj.destructed = None;
        }
        return Err(e.add_error_info(OoError::DestructionFailure(name).to_string()));
    }

    if let Some(obj) = oo.objects.get_mut(id) {
        obj.destructed = None;
    }

    // Null the access-command handle and drop the command; the delete
    // trace sees being_deleted and does not re-enter.
    if let Some((ns, cname)) = oo.objects.get_mut(id).and_then(|o| o.access_cmd.take()) {
        interp.remove_command(oo, ns, &cname);
    }

    let defer = oo
        .objects
        .get(id)
        .map(|o| o.call_refcount > 0)
        .unwrap_or(false);
    if defer {
        let name = match oo.objects.get_mut(id) {
            Some(obj) => {
                obj.teardown_deferred = true;
                obj.name.clone()
            }
            None => return Ok(()),
        };
        oo.objects.unregister_name(&name);
    } else {
        complete_deferred_teardown(interp, oo, id);
    }
    Ok(())
}

/// Run destructors for `class` and then its bases in declared order,
/// pre-order, each exactly once.
fn destruct_class_chain(
    interp: &mut Interp<Oo>,
    oo: &mut Oo,
    id: ObjectId,
    class: ClassId,
) -> Result<(), Exception> {
    let already = oo
        .objects
        .get(id)
        .and_then(|o| o.destructed.as_ref())
        .map(|set| set.contains(&class))
        .unwrap_or(true);
    if already {
        return Ok(());
    }

    if let Some(dtor) = oo.reg.destructor_of(class) {
        crate::methods::invoke_member(interp, oo, dtor, Some(id), &[])?;
    } else if let Some(set) = oo.objects.get_mut(id).and_then(|o| o.destructed.as_mut()) {
        set.insert(class);
    }

    let bases: Vec<ClassId> = oo
        .reg
        .class(class)
        .map(|c| c.bases.clone())
        .unwrap_or_default();
    for base in bases {
        destruct_class_chain(interp, oo, id, base)?;
    }
    Ok(())
}

/// Final teardown: delete the per-instance namespace, release cached call
/// contexts, and free the object slot. Runs immediately when no calls are
/// in flight, or from the last context pop otherwise.
pub fn complete_deferred_teardown(interp: &mut Interp<Oo>, oo: &mut Oo, id: ObjectId) {
    let ns = oo.objects.get(id).map(|o| o.ns);
    if let Some(ns) = ns {
        interp.delete_namespace(oo, ns);
    }
    let cached: Vec<ContextId> = oo
        .objects
        .get(id)
        .map(|o| o.context_cache.values().copied().collect())
        .unwrap_or_default();
    for cid in cached {
        let idle = oo.ctxs.get(cid).map(|c| c.refcount == 0).unwrap_or(false);
        if idle {
            oo.ctxs.release(cid);
        }
    }
    oo.objects.remove(id);
}
