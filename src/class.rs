// objsh entity tables
//
// The class data model: classes, member functions, data members, options,
// components and delegation records, held in id-keyed slabs inside the
// ClassRegistry. Everything here is pure data; lifecycle orchestration
// against the interpreter lives in runtime.rs.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::OoError;
use crate::interp::{CmdFn, Param};
use crate::namespace::NamespaceId;
use crate::runtime::Oo;
use crate::symbol::{NameId, NameTable};
use crate::types::Value;
use crate::vtable::VarLookup;

/// Unique identifier for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Unique identifier for a member function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Unique identifier for a data member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

/// Unique identifier for an option definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    /// A common proc: callable without an object context.
    Proc,
    Constructor,
    Destructor,
}

/// The built-in member functions every class inherits from the root class.
/// Resolved once at installation time; never re-derived from name strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Configure,
    Cget,
    Info,
    Isa,
    Destroy,
}

/// A member function implementation.
#[derive(Clone)]
pub enum MemberImpl {
    /// A body in the command language, evaluated in the declaring class's
    /// namespace.
    Script { params: Vec<Param>, body: Value },
    /// A native implementation.
    Native(CmdFn<Oo>),
    /// Auto-generated get/set accessor for a method variable.
    Accessor(VarId),
    Builtin(Builtin),
    /// Declared but not yet loaded; the invocation engine runs one autoload
    /// pass before giving up.
    Declared { params: Vec<Param> },
}

/// A method or proc belonging to a class.
#[derive(Clone)]
pub struct MemberFunction {
    pub name: NameId,
    pub full_name: String,
    pub class: ClassId,
    pub protection: Protection,
    pub kind: MemberKind,
    pub body: MemberImpl,
    /// Constructor-only fragment run before base construction.
    pub init_code: Option<Value>,
    pub min_args: usize,
    pub max_args: Option<usize>,
    /// Parameter part of the usage string, e.g. "x ?y? ?arg ...?".
    pub usage: String,
}

impl MemberFunction {
    pub fn needs_object(&self) -> bool {
        !matches!(self.kind, MemberKind::Proc)
    }
}

/// An instance or common data member.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: NameId,
    pub full_name: String,
    pub class: ClassId,
    pub protection: Protection,
    pub default: Option<Value>,
    /// Script evaluated after each write; only honored on public members.
    pub config_code: Option<Value>,
    /// Commons share one storage cell in the class namespace; instance
    /// variables get one cell per object.
    pub common: bool,
}

/// A public configuration option.
#[derive(Debug, Clone)]
pub struct OptionDef {
    /// Includes the leading dash.
    pub name: NameId,
    pub full_name: String,
    pub class: ClassId,
    pub default: Option<Value>,
    pub config_code: Option<Value>,
}

/// A component: an instance variable holding the name of another command,
/// typically a contained object, that delegation forwards to.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: NameId,
    pub var: VarId,
}

/// A method delegated to a component. The name "*" delegates every declared
/// method except constructors, destructors, commons and the exception set.
#[derive(Debug, Clone)]
pub struct DelegatedFunction {
    pub name: String,
    pub component: NameId,
    /// Replacement command words ("as"), in place of the method name.
    pub as_words: Vec<String>,
    /// Argument template ("using") with %-substitutions.
    pub using: Option<String>,
    pub except: Vec<String>,
}

/// An option delegated to a component.
#[derive(Debug, Clone)]
pub struct DelegatedOption {
    pub name: String,
    pub component: NameId,
    /// Option name to use on the component, when renamed ("as").
    pub as_name: Option<String>,
    pub except: Vec<String>,
}

/// One class definition.
pub struct ClassInfo {
    pub name: NameId,
    pub full_name: String,
    pub ns: NamespaceId,
    /// Direct bases, in declaration order.
    pub bases: Vec<ClassId>,
    /// Direct derived classes (back-references).
    pub derived: Vec<ClassId>,
    /// Transitive ancestor closure, always containing the class itself.
    pub heritage: HashSet<ClassId>,
    pub functions: IndexMap<NameId, FuncId>,
    pub variables: IndexMap<NameId, VarId>,
    pub options: IndexMap<NameId, OptionId>,
    pub components: IndexMap<NameId, Component>,
    pub delegated_functions: Vec<DelegatedFunction>,
    pub delegated_options: Vec<DelegatedOption>,
    pub method_variables: IndexMap<NameId, VarId>,
    /// Derived resolution tables, rebuilt wholesale by the vtable builder.
    pub resolve_cmds: HashMap<NameId, FuncId>,
    pub resolve_vars: HashMap<NameId, u32>,
    pub var_lookups: Vec<VarLookup>,
    /// In-flight member invocations on this class.
    pub call_refcount: u32,
}

impl ClassInfo {
    pub fn new(name: NameId, full_name: String, ns: NamespaceId) -> Self {
        Self {
            name,
            full_name,
            ns,
            bases: Vec::new(),
            derived: Vec::new(),
            heritage: HashSet::new(),
            functions: IndexMap::new(),
            variables: IndexMap::new(),
            options: IndexMap::new(),
            components: IndexMap::new(),
            delegated_functions: Vec::new(),
            delegated_options: Vec::new(),
            method_variables: IndexMap::new(),
            resolve_cmds: HashMap::new(),
            resolve_vars: HashMap::new(),
            var_lookups: Vec::new(),
            call_refcount: 0,
        }
    }

    /// Simple name of the class (tail of the fully qualified name).
    pub fn simple_name(&self) -> &str {
        crate::namespace::split_tail(&self.full_name)
            .map(|(_, tail)| tail)
            .unwrap_or(&self.full_name)
    }
}

/// The entity tables: slabs for classes, member functions, data members and
/// options, plus the name maps that index them.
pub struct ClassRegistry {
    pub names: NameTable,
    classes: Vec<Option<ClassInfo>>,
    class_free: Vec<u32>,
    functions: Vec<Option<MemberFunction>>,
    func_free: Vec<u32>,
    variables: Vec<Option<Variable>>,
    var_free: Vec<u32>,
    options: Vec<Option<OptionDef>>,
    opt_free: Vec<u32>,
    by_full: HashMap<String, ClassId>,
    by_ns: HashMap<NamespaceId, ClassId>,
    pub ctor_name: NameId,
    pub dtor_name: NameId,
}

impl ClassRegistry {
    pub fn new() -> Self {
        let mut names = NameTable::new();
        let ctor_name = names.intern("constructor");
        let dtor_name = names.intern("destructor");
        Self {
            names,
            classes: Vec::new(),
            class_free: Vec::new(),
            functions: Vec::new(),
            func_free: Vec::new(),
            variables: Vec::new(),
            var_free: Vec::new(),
            options: Vec::new(),
            opt_free: Vec::new(),
            by_full: HashMap::new(),
            by_ns: HashMap::new(),
            ctor_name,
            dtor_name,
        }
    }

    //----------------------------------------------------------------------
    // Classes

    pub fn add_class(&mut self, info: ClassInfo) -> ClassId {
        let full = info.full_name.clone();
        let ns = info.ns;
        let id = if let Some(slot) = self.class_free.pop() {
            self.classes[slot as usize] = Some(info);
            ClassId(slot)
        } else {
            let id = ClassId(self.classes.len() as u32);
            self.classes.push(Some(info));
            id
        };
        if let Some(class) = self.class_mut(id) {
            class.heritage.insert(id);
        }
        self.by_full.insert(full, id);
        self.by_ns.insert(ns, id);
        id
    }

    /// Drop a class record and every member it owns. The caller has already
    /// unlinked it from the hierarchy and torn down its namespace.
    pub fn remove_class(&mut self, id: ClassId) {
        let Some(info) = self.classes.get_mut(id.0 as usize).and_then(|c| c.take()) else {
            return;
        };
        self.class_free.push(id.0);
        self.by_full.remove(&info.full_name);
        self.by_ns.remove(&info.ns);
        for (_, func) in &info.functions {
            self.functions[func.0 as usize] = None;
            self.func_free.push(func.0);
        }
        for (_, var) in &info.variables {
            self.variables[var.0 as usize] = None;
            self.var_free.push(var.0);
        }
        for (_, opt) in &info.options {
            self.options[opt.0 as usize] = None;
            self.opt_free.push(opt.0);
        }
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.0 as usize).and_then(|c| c.as_ref())
    }

    pub fn class_mut(&mut self, id: ClassId) -> Option<&mut ClassInfo> {
        self.classes.get_mut(id.0 as usize).and_then(|c| c.as_mut())
    }

    pub fn find_class(&self, full_name: &str) -> Option<ClassId> {
        self.by_full.get(full_name).copied()
    }

    pub fn class_for_ns(&self, ns: NamespaceId) -> Option<ClassId> {
        self.by_ns.get(&ns).copied()
    }

    pub fn class_full_name(&self, id: ClassId) -> &str {
        self.class(id).map(|c| c.full_name.as_str()).unwrap_or("?")
    }

    /// O(1) is-a test through the heritage closure.
    pub fn is_a(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.class(class)
            .map(|c| c.heritage.contains(&ancestor))
            .unwrap_or(false)
    }

    //----------------------------------------------------------------------
    // Members

    pub fn func(&self, id: FuncId) -> Option<&MemberFunction> {
        self.functions.get(id.0 as usize).and_then(|f| f.as_ref())
    }

    pub fn func_mut(&mut self, id: FuncId) -> Option<&mut MemberFunction> {
        self.functions.get_mut(id.0 as usize).and_then(|f| f.as_mut())
    }

    pub fn var(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0 as usize).and_then(|v| v.as_ref())
    }

    pub fn opt(&self, id: OptionId) -> Option<&OptionDef> {
        self.options.get(id.0 as usize).and_then(|o| o.as_ref())
    }

    /// Register a member function in its class's table. Redefining a name
    /// already present in the same class is an error; shadowing a base is
    /// not.
    pub fn add_function(&mut self, class: ClassId, func: MemberFunction) -> Result<FuncId, OoError> {
        let name = func.name;
        let class_name = self.class_full_name(class).to_string();
        let info = self
            .class(class)
            .ok_or_else(|| OoError::Internal(format!("no class record for id {}", class.0)))?;
        if info.functions.contains_key(&name) {
            return Err(OoError::DuplicateDefinition {
                name: self.names.resolve(name).to_string(),
                class: class_name,
            });
        }
        let id = if let Some(slot) = self.func_free.pop() {
            self.functions[slot as usize] = Some(func);
            FuncId(slot)
        } else {
            let id = FuncId(self.functions.len() as u32);
            self.functions.push(Some(func));
            id
        };
        if let Some(info) = self.class_mut(class) {
            info.functions.insert(name, id);
        }
        Ok(id)
    }

    pub fn add_variable(&mut self, class: ClassId, var: Variable) -> Result<VarId, OoError> {
        let name = var.name;
        let class_name = self.class_full_name(class).to_string();
        let info = self
            .class(class)
            .ok_or_else(|| OoError::Internal(format!("no class record for id {}", class.0)))?;
        if info.variables.contains_key(&name) {
            return Err(OoError::DuplicateDefinition {
                name: self.names.resolve(name).to_string(),
                class: class_name,
            });
        }
        let id = if let Some(slot) = self.var_free.pop() {
            self.variables[slot as usize] = Some(var);
            VarId(slot)
        } else {
            let id = VarId(self.variables.len() as u32);
            self.variables.push(Some(var));
            id
        };
        if let Some(info) = self.class_mut(class) {
            info.variables.insert(name, id);
        }
        Ok(id)
    }

    pub fn add_option(&mut self, class: ClassId, opt: OptionDef) -> Result<OptionId, OoError> {
        let name = opt.name;
        let class_name = self.class_full_name(class).to_string();
        let info = self
            .class(class)
            .ok_or_else(|| OoError::Internal(format!("no class record for id {}", class.0)))?;
        if info.options.contains_key(&name) {
            return Err(OoError::DuplicateDefinition {
                name: self.names.resolve(name).to_string(),
                class: class_name,
            });
        }
        let id = if let Some(slot) = self.opt_free.pop() {
            self.options[slot as usize] = Some(opt);
            OptionId(slot)
        } else {
            let id = OptionId(self.options.len() as u32);
            self.options.push(Some(opt));
            id
        };
        if let Some(info) = self.class_mut(class) {
            info.options.insert(name, id);
        }
        Ok(id)
    }

    /// The constructor declared by exactly this class, if any.
    pub fn constructor_of(&self, class: ClassId) -> Option<FuncId> {
        self.class(class)?.functions.get(&self.ctor_name).copied()
    }

    pub fn destructor_of(&self, class: ClassId) -> Option<FuncId> {
        self.class(class)?.functions.get(&self.dtor_name).copied()
    }

    //----------------------------------------------------------------------
    // Heritage

    /// Recompute a class's heritage closure from its base list. The walk
    /// registers ancestors depth-first in declaration order and stops
    /// descending at any ancestor already present, so a diamond resolves
    /// through its leftmost path and each ancestor appears once.
    pub fn compute_heritage(&mut self, class: ClassId) {
        let mut heritage = HashSet::new();
        self.heritage_walk(class, &mut heritage);
        if let Some(info) = self.class_mut(class) {
            info.heritage = heritage;
        }
    }

    fn heritage_walk(&self, class: ClassId, heritage: &mut HashSet<ClassId>) {
        if !heritage.insert(class) {
            return;
        }
        let Some(info) = self.class(class) else { return };
        for &base in &info.bases {
            self.heritage_walk(base, heritage);
        }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceId;

    fn class(reg: &mut ClassRegistry, name: &str, ns: u32) -> ClassId {
        let id = reg.names.intern(name);
        reg.add_class(ClassInfo::new(id, format!("::{}", name), NamespaceId(ns)))
    }

    #[test]
    fn test_heritage_includes_self() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        assert!(reg.is_a(a, a));
    }

    #[test]
    fn test_heritage_transitive() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let b = class(&mut reg, "B", 2);
        let c = class(&mut reg, "C", 3);
        reg.class_mut(b).unwrap().bases.push(a);
        reg.compute_heritage(b);
        reg.class_mut(c).unwrap().bases.push(b);
        reg.compute_heritage(c);

        assert!(reg.is_a(c, a));
        assert!(reg.is_a(c, b));
        assert!(!reg.is_a(a, c));
    }

    #[test]
    fn test_heritage_diamond_registers_once() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let b = class(&mut reg, "B", 2);
        let c = class(&mut reg, "C", 3);
        let d = class(&mut reg, "D", 4);
        reg.class_mut(b).unwrap().bases.push(a);
        reg.compute_heritage(b);
        reg.class_mut(c).unwrap().bases.push(a);
        reg.compute_heritage(c);
        reg.class_mut(d).unwrap().bases.extend([b, c]);
        reg.compute_heritage(d);

        let heritage = &reg.class(d).unwrap().heritage;
        assert_eq!(heritage.len(), 4);
        assert!(reg.is_a(d, a));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let m = reg.names.intern("m");
        let make = |name| MemberFunction {
            name,
            full_name: "::A::m".to_string(),
            class: a,
            protection: Protection::Public,
            kind: MemberKind::Method,
            body: MemberImpl::Declared { params: Vec::new() },
            init_code: None,
            min_args: 0,
            max_args: Some(0),
            usage: "m".to_string(),
        };
        reg.add_function(a, make(m)).unwrap();
        let err = reg.add_function(a, make(m)).unwrap_err();
        assert!(matches!(err, OoError::DuplicateDefinition { .. }));
    }

    #[test]
    fn test_remove_class_frees_members() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let x = reg.names.intern("x");
        let var = reg
            .add_variable(
                a,
                Variable {
                    name: x,
                    full_name: "::A::x".to_string(),
                    class: a,
                    protection: Protection::Public,
                    default: None,
                    config_code: None,
                    common: false,
                },
            )
            .unwrap();
        reg.remove_class(a);
        assert!(reg.class(a).is_none());
        assert!(reg.var(var).is_none());
        assert!(reg.find_class("::A").is_none());
    }
}
