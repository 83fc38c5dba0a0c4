// objsh interpreter substrate
//
// A minimal command-language interpreter: namespaced commands, variables
// with read/write/unset traces, call frames, and two-level script/word
// evaluation. The class runtime is layered on top of this through the
// client-data generic Ctx, which is threaded to every command untouched.
//
// Commands and traces are plain fn pointers plus client-data words, so the
// interpreter never borrows from the tables it is mutating while a command
// runs.

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::namespace::{self, Namespace, NamespaceId, GLOBAL_NS};
use crate::reader::{self, Fragment, RawWord};
use crate::types::{list_join, CmdResult, Exception, ResultCode, Value};

/// A command implementation. The u64 is the command's client-data token,
/// carried verbatim from registration to every invocation.
pub type CmdFn<Ctx> = fn(&mut Interp<Ctx>, &mut Ctx, u64, &[Value]) -> CmdResult;

/// Fired when a command is renamed (`new_name` set) or deleted (None).
pub type CmdTraceFn<Ctx> = fn(&mut Interp<Ctx>, &mut Ctx, u64, &str, Option<&str>);

/// Which variable access fired a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Read,
    Write,
    Unset,
}

/// Fired on traced variable access. A read trace may substitute the value
/// by returning Some; a write trace may veto the write by returning Err,
/// in which case the caller rolls the cell back.
pub type VarTraceFn<Ctx> =
    fn(&mut Interp<Ctx>, &mut Ctx, NamespaceId, &str, TraceOp, (u64, u64)) -> Result<Option<Value>, Exception>;

pub struct CommandRecord<Ctx> {
    pub func: CmdFn<Ctx>,
    pub token: u64,
    pub delete_trace: Option<CmdTraceFn<Ctx>>,
}

impl<Ctx> Clone for CommandRecord<Ctx> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Ctx> Copy for CommandRecord<Ctx> {}

pub struct VarTrace<Ctx> {
    pub on_read: bool,
    pub on_write: bool,
    pub on_unset: bool,
    pub func: VarTraceFn<Ctx>,
    pub data: (u64, u64),
}

impl<Ctx> Clone for VarTrace<Ctx> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Ctx> Copy for VarTrace<Ctx> {}

/// A variable storage cell. `value` of None means declared but unset.
pub struct VarCell<Ctx> {
    pub value: Option<Value>,
    pub traces: SmallVec<[VarTrace<Ctx>; 1]>,
}

impl<Ctx> VarCell<Ctx> {
    pub fn new() -> Self {
        Self {
            value: None,
            traces: SmallVec::new(),
        }
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            traces: SmallVec::new(),
        }
    }
}

impl<Ctx> Default for VarCell<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// A concrete storage location: a named cell in a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarLocation {
    pub ns: NamespaceId,
    pub name: String,
}

/// Per-namespace custom resolution, consulted for names referenced while
/// code executes inside the namespace. Both hooks must be side-effect-free.
pub struct ResolverHooks<Ctx> {
    pub command: fn(&Interp<Ctx>, &Ctx, NamespaceId, &str) -> Option<CommandRecord<Ctx>>,
    pub variable: fn(&Interp<Ctx>, &Ctx, NamespaceId, &str) -> Option<VarLocation>,
}

impl<Ctx> Clone for ResolverHooks<Ctx> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Ctx> Copy for ResolverHooks<Ctx> {}

/// One formal parameter of a proc or member function.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// A script-level procedure registered with `proc`.
#[derive(Clone)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Value,
    pub ns: NamespaceId,
}

/// An active call frame. Proc frames resolve bare variables in their
/// locals; namespace-eval frames resolve them in the frame namespace.
pub struct CallFrame {
    pub ns: NamespaceId,
    pub proc_frame: bool,
    pub locals: IndexMap<String, Value>,
    pub args: Vec<Value>,
}

enum VarResolution {
    Local,
    Cell(VarLocation),
}

pub struct Interp<Ctx = ()> {
    namespaces: Vec<Option<Namespace<Ctx>>>,
    ns_free: Vec<u32>,
    frames: Vec<CallFrame>,
    procs: Vec<Option<Procedure>>,
    recursion_limit: usize,
    num_levels: usize,
}

impl<Ctx> Interp<Ctx> {
    /// An interpreter with only the root namespace and no commands.
    pub fn empty() -> Self {
        Self {
            namespaces: vec![Some(Namespace::new("", "::".to_string(), None))],
            ns_free: Vec::new(),
            frames: Vec::new(),
            procs: Vec::new(),
            recursion_limit: 1000,
            num_levels: 0,
        }
    }

    /// An interpreter with the baseline command set installed.
    pub fn new() -> Self {
        let mut interp = Self::empty();
        crate::commands::install(&mut interp);
        interp
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    //----------------------------------------------------------------------
    // Namespaces

    pub fn ns(&self, id: NamespaceId) -> Option<&Namespace<Ctx>> {
        self.namespaces.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    pub fn ns_mut(&mut self, id: NamespaceId) -> Option<&mut Namespace<Ctx>> {
        self.namespaces.get_mut(id.0 as usize).and_then(|n| n.as_mut())
    }

    pub fn ns_full_name(&self, id: NamespaceId) -> &str {
        self.ns(id).map(|n| n.full.as_str()).unwrap_or("::")
    }

    /// Find a namespace by path, relative to `from` unless absolute.
    pub fn find_namespace(&self, from: NamespaceId, path: &str) -> Option<NamespaceId> {
        let (absolute, segments) = namespace::split_path(path);
        let mut current = if absolute { GLOBAL_NS } else { from };
        for seg in segments {
            current = *self.ns(current)?.children.get(seg)?;
        }
        Some(current)
    }

    /// Create a namespace (and any missing ancestors) for an absolute or
    /// root-relative path.
    pub fn create_namespace(&mut self, path: &str) -> Result<NamespaceId, Exception> {
        let (_, segments) = namespace::split_path(path);
        let mut current = GLOBAL_NS;
        for seg in segments {
            if let Some(child) = self.ns(current).and_then(|n| n.children.get(seg).copied()) {
                current = child;
                continue;
            }
            let full = namespace::join(self.ns_full_name(current), seg);
            let id = self.alloc_ns(Namespace::new(seg, full, Some(current)));
            if let Some(parent) = self.ns_mut(current) {
                parent.children.insert(seg.to_string(), id);
            }
            current = id;
        }
        Ok(current)
    }

    fn alloc_ns(&mut self, ns: Namespace<Ctx>) -> NamespaceId {
        if let Some(slot) = self.ns_free.pop() {
            self.namespaces[slot as usize] = Some(ns);
            NamespaceId(slot)
        } else {
            let id = NamespaceId(self.namespaces.len() as u32);
            self.namespaces.push(Some(ns));
            id
        }
    }

    /// Delete a namespace, its variables, its commands (firing their delete
    /// traces) and all child namespaces. The root cannot be deleted.
    pub fn delete_namespace(&mut self, ctx: &mut Ctx, id: NamespaceId) {
        if id == GLOBAL_NS {
            return;
        }
        let Some(ns) = self.ns(id) else { return };
        let children: Vec<NamespaceId> = ns.children.values().copied().collect();
        let parent = ns.parent;
        let name = ns.name.clone();
        for child in children {
            self.delete_namespace(ctx, child);
        }

        // Unset traces fire for each variable; teardown ignores their errors.
        let var_names: Vec<String> = self
            .ns(id)
            .map(|n| n.vars.keys().cloned().collect())
            .unwrap_or_default();
        for vname in var_names {
            let loc = VarLocation {
                ns: id,
                name: vname,
            };
            let _ = self.unset_cell(ctx, &loc);
        }

        let cmds: Vec<(String, CommandRecord<Ctx>)> = self
            .ns_mut(id)
            .map(|n| n.commands.drain(..).collect())
            .unwrap_or_default();
        for (cname, record) in cmds {
            if let Some(trace) = record.delete_trace {
                trace(self, ctx, record.token, &cname, None);
            }
        }

        if let Some(pid) = parent {
            if let Some(pns) = self.ns_mut(pid) {
                pns.children.shift_remove(&name);
            }
        }
        self.namespaces[id.0 as usize] = None;
        self.ns_free.push(id.0);
    }

    pub fn set_resolver(&mut self, id: NamespaceId, hooks: ResolverHooks<Ctx>) {
        if let Some(ns) = self.ns_mut(id) {
            ns.resolver = Some(hooks);
        }
    }

    //----------------------------------------------------------------------
    // Commands

    pub fn add_command(&mut self, ns: NamespaceId, name: &str, func: CmdFn<Ctx>, token: u64) {
        self.add_command_with_trace(ns, name, func, token, None);
    }

    pub fn add_command_with_trace(
        &mut self,
        ns: NamespaceId,
        name: &str,
        func: CmdFn<Ctx>,
        token: u64,
        delete_trace: Option<CmdTraceFn<Ctx>>,
    ) {
        if let Some(nsp) = self.ns_mut(ns) {
            nsp.commands.insert(
                name.to_string(),
                CommandRecord {
                    func,
                    token,
                    delete_trace,
                },
            );
        }
    }

    pub fn has_command(&self, ns: NamespaceId, name: &str) -> bool {
        self.ns(ns).map(|n| n.commands.contains_key(name)).unwrap_or(false)
    }

    /// Remove a command, firing its delete trace after it is out of the
    /// table so the trace can safely re-enter the interpreter.
    pub fn remove_command(&mut self, ctx: &mut Ctx, ns: NamespaceId, name: &str) -> bool {
        let record = match self.ns_mut(ns).and_then(|n| n.commands.shift_remove(name)) {
            Some(r) => r,
            None => return false,
        };
        if let Some(trace) = record.delete_trace {
            trace(self, ctx, record.token, name, None);
        }
        true
    }

    /// Rename a command within its namespace. An empty new name deletes it.
    pub fn rename_command(
        &mut self,
        ctx: &mut Ctx,
        ns: NamespaceId,
        old: &str,
        new: &str,
    ) -> Result<(), Exception> {
        if new.is_empty() {
            if !self.remove_command(ctx, ns, old) {
                return Err(Exception::error(format!(
                    "can't rename \"{}\": command doesn't exist",
                    old
                )));
            }
            return Ok(());
        }
        let record = match self.ns_mut(ns).and_then(|n| n.commands.shift_remove(old)) {
            Some(r) => r,
            None => {
                return Err(Exception::error(format!(
                    "can't rename \"{}\": command doesn't exist",
                    old
                )))
            }
        };
        if let Some(nsp) = self.ns_mut(ns) {
            nsp.commands.insert(new.to_string(), record);
        }
        if let Some(trace) = record.delete_trace {
            trace(self, ctx, record.token, old, Some(new));
        }
        Ok(())
    }

    /// Resolve a command name as seen from `from`. Resolver hooks are
    /// consulted for both bare and qualified names; bare names fall back to
    /// the root table.
    pub fn find_command(
        &self,
        ctx: &Ctx,
        from: NamespaceId,
        name: &str,
    ) -> Option<CommandRecord<Ctx>> {
        if let Some((quals, tail)) = namespace::split_tail(name) {
            if let Some(hooks) = self.ns(from).and_then(|n| n.resolver) {
                if let Some(record) = (hooks.command)(self, ctx, from, name) {
                    return Some(record);
                }
            }
            let target = self
                .find_namespace(from, quals)
                .or_else(|| self.find_namespace(GLOBAL_NS, quals))?;
            if let Some(record) = self.ns(target)?.commands.get(tail) {
                return Some(*record);
            }
            if let Some(hooks) = self.ns(target).and_then(|n| n.resolver) {
                return (hooks.command)(self, ctx, target, tail);
            }
            return None;
        }

        if let Some(record) = self.ns(from)?.commands.get(name) {
            return Some(*record);
        }
        if let Some(hooks) = self.ns(from).and_then(|n| n.resolver) {
            if let Some(record) = (hooks.command)(self, ctx, from, name) {
                return Some(record);
            }
        }
        if from != GLOBAL_NS {
            if let Some(record) = self.ns(GLOBAL_NS)?.commands.get(name) {
                return Some(*record);
            }
        }
        None
    }

    //----------------------------------------------------------------------
    // Call frames

    pub fn current_ns(&self) -> NamespaceId {
        self.frames.last().map(|f| f.ns).unwrap_or(GLOBAL_NS)
    }

    pub fn push_frame(&mut self, ns: NamespaceId, proc_frame: bool) {
        self.frames.push(CallFrame {
            ns,
            proc_frame,
            locals: IndexMap::new(),
            args: Vec::new(),
        });
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn set_local(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.locals.insert(name.to_string(), value);
        }
    }

    pub fn set_frame_args(&mut self, args: Vec<Value>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.args = args;
        }
    }

    //----------------------------------------------------------------------
    // Variables

    fn resolve_var(&self, ctx: &Ctx, name: &str) -> Result<VarResolution, Exception> {
        let frame = self.frames.last();
        let in_proc = frame.map(|f| f.proc_frame).unwrap_or(false);
        let current = self.current_ns();

        if let Some((quals, tail)) = namespace::split_tail(name) {
            if let Some(hooks) = self.ns(current).and_then(|n| n.resolver) {
                if let Some(loc) = (hooks.variable)(self, ctx, current, name) {
                    return Ok(VarResolution::Cell(loc));
                }
            }
            let target = self
                .find_namespace(current, quals)
                .or_else(|| self.find_namespace(GLOBAL_NS, quals))
                .ok_or_else(|| {
                    Exception::error(format!(
                        "can't access \"{}\": parent namespace doesn't exist",
                        name
                    ))
                })?;
            return Ok(VarResolution::Cell(VarLocation {
                ns: target,
                name: tail.to_string(),
            }));
        }

        // Bare name: existing locals win, then the namespace resolver, then
        // (outside proc frames) the namespace's own table.
        if in_proc && frame.map(|f| f.locals.contains_key(name)).unwrap_or(false) {
            return Ok(VarResolution::Local);
        }
        if let Some(hooks) = self.ns(current).and_then(|n| n.resolver) {
            if let Some(loc) = (hooks.variable)(self, ctx, current, name) {
                return Ok(VarResolution::Cell(loc));
            }
        }
        if in_proc {
            Ok(VarResolution::Local)
        } else {
            Ok(VarResolution::Cell(VarLocation {
                ns: current,
                name: name.to_string(),
            }))
        }
    }

    pub fn get_var(&mut self, ctx: &mut Ctx, name: &str) -> CmdResult {
        match self.resolve_var(ctx, name)? {
            VarResolution::Local => self
                .frames
                .last()
                .and_then(|f| f.locals.get(name).cloned())
                .ok_or_else(|| {
                    Exception::error(format!("can't read \"{}\": no such variable", name))
                }),
            VarResolution::Cell(loc) => {
                let value = self.read_cell(ctx, &loc)?;
                value.ok_or_else(|| {
                    Exception::error(format!("can't read \"{}\": no such variable", name))
                })
            }
        }
    }

    pub fn set_var(&mut self, ctx: &mut Ctx, name: &str, value: Value) -> Result<(), Exception> {
        match self.resolve_var(ctx, name)? {
            VarResolution::Local => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.locals.insert(name.to_string(), value);
                }
                Ok(())
            }
            VarResolution::Cell(loc) => self.write_cell_traced(ctx, &loc, value),
        }
    }

    pub fn unset_var(&mut self, ctx: &mut Ctx, name: &str) -> Result<(), Exception> {
        match self.resolve_var(ctx, name)? {
            VarResolution::Local => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.locals.shift_remove(name);
                }
                Ok(())
            }
            VarResolution::Cell(loc) => {
                self.unset_cell(ctx, &loc);
                Ok(())
            }
        }
    }

    pub fn var_exists(&mut self, ctx: &mut Ctx, name: &str) -> bool {
        match self.resolve_var(ctx, name) {
            Err(_) => false,
            Ok(VarResolution::Local) => self
                .frames
                .last()
                .map(|f| f.locals.contains_key(name))
                .unwrap_or(false),
            Ok(VarResolution::Cell(loc)) => self
                .ns(loc.ns)
                .and_then(|n| n.vars.get(&loc.name))
                .map(|c| c.value.is_some())
                .unwrap_or(false),
        }
    }

    /// Read a cell, firing read traces. A trace may substitute the value;
    /// the substituted value is stored back into the cell.
    pub fn read_cell(
        &mut self,
        ctx: &mut Ctx,
        loc: &VarLocation,
    ) -> Result<Option<Value>, Exception> {
        let (mut value, traces) = match self.ns(loc.ns).and_then(|n| n.vars.get(&loc.name)) {
            Some(cell) => (cell.value.clone(), cell.traces.clone()),
            None => (None, SmallVec::new()),
        };
        for t in traces.iter().filter(|t| t.on_read) {
            if let Some(subst) = (t.func)(self, ctx, loc.ns, &loc.name, TraceOp::Read, t.data)? {
                value = Some(subst.clone());
                if let Some(cell) = self.cell_mut(loc) {
                    cell.value = Some(subst);
                }
            }
        }
        Ok(value)
    }

    /// Write a cell, firing write traces. If a trace fails the cell is
    /// rolled back to its previous value and the error propagates.
    pub fn write_cell_traced(
        &mut self,
        ctx: &mut Ctx,
        loc: &VarLocation,
        value: Value,
    ) -> Result<(), Exception> {
        let old = self.cell_value(loc);
        let cell = self.make_cell(loc);
        cell.value = Some(value);
        let traces = self
            .ns(loc.ns)
            .and_then(|n| n.vars.get(&loc.name))
            .map(|c| c.traces.clone())
            .unwrap_or_default();
        for t in traces.iter().filter(|t| t.on_write) {
            if let Err(e) = (t.func)(self, ctx, loc.ns, &loc.name, TraceOp::Write, t.data) {
                if let Some(cell) = self.cell_mut(loc) {
                    cell.value = old;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove a cell, firing unset traces. Teardown ignores trace errors.
    pub fn unset_cell(&mut self, ctx: &mut Ctx, loc: &VarLocation) {
        let traces = self
            .ns(loc.ns)
            .and_then(|n| n.vars.get(&loc.name))
            .map(|c| c.traces.clone())
            .unwrap_or_default();
        for t in traces.iter().filter(|t| t.on_unset) {
            let _ = (t.func)(self, ctx, loc.ns, &loc.name, TraceOp::Unset, t.data);
        }
        if let Some(ns) = self.ns_mut(loc.ns) {
            ns.vars.shift_remove(&loc.name);
        }
    }

    pub fn cell_value(&self, loc: &VarLocation) -> Option<Value> {
        self.ns(loc.ns)
            .and_then(|n| n.vars.get(&loc.name))
            .and_then(|c| c.value.clone())
    }

    pub fn cell_mut(&mut self, loc: &VarLocation) -> Option<&mut VarCell<Ctx>> {
        self.ns_mut(loc.ns).and_then(|n| n.vars.get_mut(&loc.name))
    }

    /// Get or create the cell at a location.
    pub fn make_cell(&mut self, loc: &VarLocation) -> &mut VarCell<Ctx> {
        let ns = self
            .ns_mut(loc.ns)
            .expect("variable cell in dead namespace");
        ns.vars.entry(loc.name.clone()).or_default()
    }

    pub fn add_var_trace(&mut self, loc: &VarLocation, trace: VarTrace<Ctx>) {
        self.make_cell(loc).traces.push(trace);
    }

    //----------------------------------------------------------------------
    // Evaluation

    /// Evaluate a script with top-level semantics: `return` yields its
    /// value, `break`/`continue` become errors.
    pub fn eval(&mut self, ctx: &mut Ctx, script: &str) -> CmdResult {
        match self.eval_body(ctx, script) {
            Err(e) if e.code == ResultCode::Return => Ok(e.value),
            Err(e) if e.code == ResultCode::Break => {
                Err(Exception::error("invoked \"break\" outside of a loop"))
            }
            Err(e) if e.code == ResultCode::Continue => {
                Err(Exception::error("invoked \"continue\" outside of a loop"))
            }
            other => other,
        }
    }

    /// Evaluate a script, propagating control-flow exceptions untouched.
    pub fn eval_body(&mut self, ctx: &mut Ctx, script: &str) -> CmdResult {
        let commands = reader::parse_script(script)
            .map_err(|e| Exception::error(e.to_string()))?;
        let mut result = Value::empty();
        for command in &commands {
            let mut words: SmallVec<[Value; 8]> = SmallVec::with_capacity(command.words.len());
            for raw in &command.words {
                words.push(self.subst_word(ctx, raw)?);
            }
            result = self.invoke(ctx, &words)?;
        }
        Ok(result)
    }

    /// Evaluate a script inside a namespace-eval frame on `ns`.
    pub fn eval_in_ns(&mut self, ctx: &mut Ctx, ns: NamespaceId, script: &str) -> CmdResult {
        self.push_frame(ns, false);
        let result = self.eval_body(ctx, script);
        self.pop_frame();
        result
    }

    /// Substitute one word: variables, nested commands, escapes.
    pub fn subst_word(&mut self, ctx: &mut Ctx, raw: &RawWord) -> CmdResult {
        if let Some(lit) = raw.as_literal() {
            return Ok(Value::from(lit));
        }
        let mut out = String::new();
        for part in &raw.parts {
            match part {
                Fragment::Lit(s) => out.push_str(s),
                Fragment::Var(name) => out.push_str(self.get_var(ctx, name)?.as_str()),
                Fragment::Cmd(script) => out.push_str(self.eval_body(ctx, script)?.as_str()),
            }
        }
        Ok(Value::from(out))
    }

    /// Substitute variables and nested commands across a whole string.
    /// Used by the minimal `if` condition evaluation.
    pub fn subst_text(&mut self, ctx: &mut Ctx, text: &str) -> CmdResult {
        let raw = reader::parse_subst(text).map_err(|e| Exception::error(e.to_string()))?;
        self.subst_word(ctx, &raw)
    }

    /// Invoke a fully substituted word vector as a command.
    pub fn invoke(&mut self, ctx: &mut Ctx, words: &[Value]) -> CmdResult {
        let Some(name) = words.first() else {
            return Ok(Value::empty());
        };
        self.num_levels += 1;
        if self.num_levels > self.recursion_limit {
            self.num_levels -= 1;
            return Err(Exception::error(
                "too many nested evaluations (infinite loop?)",
            ));
        }
        trace!(command = %name, "invoke");
        let result = match self.find_command(ctx, self.current_ns(), name.as_str()) {
            Some(record) => (record.func)(self, ctx, record.token, words),
            None => Err(Exception::error(format!(
                "invalid command name \"{}\"",
                name
            ))),
        };
        self.num_levels -= 1;
        result
    }

    //----------------------------------------------------------------------
    // Procedures

    pub fn add_proc(&mut self, ns: NamespaceId, proc: Procedure) {
        let name = proc.name.clone();
        let idx = self.procs.len() as u64;
        self.procs.push(Some(proc));
        self.add_command(ns, &name, run_proc, idx);
    }

    pub fn proc_by_token(&self, token: u64) -> Option<&Procedure> {
        self.procs.get(token as usize).and_then(|p| p.as_ref())
    }
}

impl Default for Interp<()> {
    fn default() -> Self {
        Self::new()
    }
}

fn run_proc<Ctx>(interp: &mut Interp<Ctx>, ctx: &mut Ctx, token: u64, argv: &[Value]) -> CmdResult {
    let proc = match interp.proc_by_token(token) {
        Some(p) => p.clone(),
        None => return Err(Exception::error(format!("invalid proc \"{}\"", argv[0]))),
    };

    let usage = usage_string(argv[0].as_str(), &proc.params);
    let bindings = bind_params(&proc.params, &argv[1..])
        .ok_or_else(|| Exception::error(format!("wrong # args: should be \"{}\"", usage)))?;

    interp.push_frame(proc.ns, true);
    for (name, value) in bindings {
        interp.set_local(&name, value);
    }
    interp.set_frame_args(argv[1..].to_vec());
    let result = interp.eval_body(ctx, proc.body.as_str());
    interp.pop_frame();

    match result {
        Err(e) if e.code == ResultCode::Return => Ok(e.value),
        Err(e) if e.code == ResultCode::Break || e.code == ResultCode::Continue => Err(
            Exception::error("invoked \"break\" outside of a loop"),
        ),
        Err(e) => Err(e.add_error_info(format!("(procedure \"{}\" body)", proc.name))),
        Ok(v) => Ok(v),
    }
}

/// Parse a formal parameter list: each word is a name or {name default};
/// a trailing `args` parameter collects the variadic tail.
pub fn parse_params(spec: &str) -> Result<Vec<Param>, Exception> {
    let words = reader::parse_list(spec).map_err(|e| Exception::error(e.to_string()))?;
    let mut params = Vec::with_capacity(words.len());
    for word in &words {
        let parts = reader::parse_list(word).map_err(|e| Exception::error(e.to_string()))?;
        match parts.len() {
            1 => params.push(Param {
                name: parts[0].clone(),
                default: None,
            }),
            2 => params.push(Param {
                name: parts[0].clone(),
                default: Some(Value::from(parts[1].as_str())),
            }),
            _ => {
                return Err(Exception::error(format!(
                    "too many fields in argument specifier \"{}\"",
                    word
                )))
            }
        }
    }
    Ok(params)
}

/// Minimum and maximum argument counts for a parameter list. None means
/// unbounded (trailing `args`).
pub fn arg_bounds(params: &[Param]) -> (usize, Option<usize>) {
    let variadic = params.last().map(|p| p.name == "args").unwrap_or(false);
    let fixed = if variadic {
        &params[..params.len() - 1]
    } else {
        params
    };
    let min = fixed.iter().filter(|p| p.default.is_none()).count();
    let max = if variadic { None } else { Some(fixed.len()) };
    (min, max)
}

/// Bind actual arguments to formals. None signals an argument-count
/// mismatch; the caller composes the usage message.
pub fn bind_params(params: &[Param], args: &[Value]) -> Option<Vec<(String, Value)>> {
    let (min, max) = arg_bounds(params);
    if args.len() < min || max.map(|m| args.len() > m).unwrap_or(false) {
        return None;
    }
    let variadic = params.last().map(|p| p.name == "args").unwrap_or(false);
    let fixed = if variadic {
        &params[..params.len() - 1]
    } else {
        params
    };

    let mut bindings = Vec::with_capacity(params.len());
    for (i, p) in fixed.iter().enumerate() {
        let value = match args.get(i) {
            Some(v) => v.clone(),
            None => p.default.clone().unwrap_or_default(),
        };
        bindings.push((p.name.clone(), value));
    }
    if variadic {
        let rest = if args.len() > fixed.len() {
            list_join(&args[fixed.len()..])
        } else {
            Value::empty()
        };
        bindings.push(("args".to_string(), rest));
    }
    Some(bindings)
}

/// Render "name p1 ?p2? ?arg ...?" for argument-count errors.
pub fn usage_string(name: &str, params: &[Param]) -> String {
    let mut out = String::from(name);
    for p in params {
        out.push(' ');
        if p.name == "args" {
            out.push_str("?arg ...?");
        } else if p.default.is_some() {
            out.push('?');
            out.push_str(&p.name);
            out.push('?');
        } else {
            out.push_str(&p.name);
        }
    }
    out
}
