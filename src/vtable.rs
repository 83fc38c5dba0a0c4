// objsh virtual table builder
//
// Flattens a class hierarchy into the per-class resolution tables the name
// resolver consults. A rebuild always replaces the destination tables
// wholesale; patching them incrementally could leave a stale shadowing
// order behind after the hierarchy changes.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use tracing::debug;

use crate::class::{ClassId, ClassRegistry, FuncId, Protection, VarId};

/// One resolvable variable name. Several qualifying names can share a
/// lookup; `usage` counts them and `least_qualified` is the shortest, used
/// when reporting configuration options.
#[derive(Debug, Clone)]
pub struct VarLookup {
    pub var: VarId,
    /// False when the variable is private and owned by a different class
    /// than the one this table belongs to.
    pub accessible: bool,
    pub least_qualified: String,
    pub usage: u32,
}

/// The deterministic most-specific-first hierarchy traversal: the class
/// itself, then each direct base's own recursively-computed order,
/// pre-order, never visiting a base twice. Direct bases are pushed in
/// reverse so pop order is declaration order.
pub fn traversal_order(reg: &ClassRegistry, class: ClassId) -> SmallVec<[ClassId; 8]> {
    let mut order: SmallVec<[ClassId; 8]> = SmallVec::new();
    let mut visited: HashSet<ClassId> = HashSet::new();
    let mut stack: SmallVec<[ClassId; 8]> = SmallVec::new();
    stack.push(class);
    while let Some(cls) = stack.pop() {
        if !visited.insert(cls) {
            continue;
        }
        order.push(cls);
        if let Some(info) = reg.class(cls) {
            for &base in info.bases.iter().rev() {
                stack.push(base);
            }
        }
    }
    order
}

/// Every name under which a member of `class_full` can be written, least
/// qualified first: "m", "B::m", "A::B::m", "::A::B::m".
fn name_variants(class_full: &str, member: &str) -> SmallVec<[String; 4]> {
    let mut variants: SmallVec<[String; 4]> = SmallVec::new();
    variants.push(member.to_string());
    let segments: Vec<&str> = class_full.split("::").filter(|s| !s.is_empty()).collect();
    for start in (0..segments.len()).rev() {
        variants.push(format!("{}::{}", segments[start..].join("::"), member));
    }
    variants.push(format!("::{}::{}", segments.join("::"), member));
    variants
}

/// Regenerate a class's resolution tables from scratch.
///
/// For each class in traversal order, every declared function and variable
/// is entered under all of its qualifying names, first writer wins: the
/// most specific class's member shadows all same-named ancestors, while the
/// ancestor's qualified names still reach the ancestor's member.
pub fn rebuild(reg: &mut ClassRegistry, class: ClassId) {
    let order = traversal_order(reg, class);

    let mut cmd_items: Vec<(String, String, FuncId)> = Vec::new();
    let mut var_items: Vec<(String, String, VarId, Protection, ClassId)> = Vec::new();
    for &cls in &order {
        let Some(info) = reg.class(cls) else { continue };
        for (&name, &func) in &info.functions {
            cmd_items.push((
                info.full_name.clone(),
                reg.names.resolve(name).to_string(),
                func,
            ));
        }
        for (&name, &var) in &info.variables {
            let protection = reg
                .var(var)
                .map(|v| v.protection)
                .unwrap_or(Protection::Public);
            var_items.push((
                info.full_name.clone(),
                reg.names.resolve(name).to_string(),
                var,
                protection,
                cls,
            ));
        }
    }

    let mut resolve_cmds: HashMap<crate::symbol::NameId, FuncId> = HashMap::new();
    for (class_full, member, func) in &cmd_items {
        for variant in name_variants(class_full, member) {
            let nid = reg.names.intern(&variant);
            resolve_cmds.entry(nid).or_insert(*func);
        }
    }

    let mut resolve_vars: HashMap<crate::symbol::NameId, u32> = HashMap::new();
    let mut var_lookups: Vec<VarLookup> = Vec::new();
    let mut lookup_for: HashMap<VarId, u32> = HashMap::new();
    for (class_full, member, var, protection, owner) in &var_items {
        for variant in name_variants(class_full, member) {
            let nid = reg.names.intern(&variant);
            if resolve_vars.contains_key(&nid) {
                continue;
            }
            let idx = *lookup_for.entry(*var).or_insert_with(|| {
                let idx = var_lookups.len() as u32;
                var_lookups.push(VarLookup {
                    var: *var,
                    accessible: *protection != Protection::Private || *owner == class,
                    least_qualified: variant.clone(),
                    usage: 0,
                });
                idx
            });
            var_lookups[idx as usize].usage += 1;
            resolve_vars.insert(nid, idx);
        }
    }

    if let Some(info) = reg.class_mut(class) {
        debug!(
            class = %info.full_name,
            commands = resolve_cmds.len(),
            variables = resolve_vars.len(),
            "rebuilt resolution tables"
        );
        info.resolve_cmds = resolve_cmds;
        info.resolve_vars = resolve_vars;
        info.var_lookups = var_lookups;
    }
}

/// Rebuild a class and every class derived from it. Required after any
/// structural change: class creation, inheritance finalization, or member
/// addition.
pub fn rebuild_hierarchy(reg: &mut ClassRegistry, class: ClassId) {
    let mut pending: SmallVec<[ClassId; 8]> = SmallVec::new();
    let mut visited: HashSet<ClassId> = HashSet::new();
    pending.push(class);
    while let Some(cls) = pending.pop() {
        if !visited.insert(cls) {
            continue;
        }
        rebuild(reg, cls);
        if let Some(info) = reg.class(cls) {
            pending.extend(info.derived.iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassInfo, MemberFunction, MemberImpl, MemberKind, Variable};
    use crate::namespace::NamespaceId;

    fn class(reg: &mut ClassRegistry, name: &str, ns: u32) -> ClassId {
        let id = reg.names.intern(name);
        reg.add_class(ClassInfo::new(id, format!("::{}", name), NamespaceId(ns)))
    }

    fn method(reg: &mut ClassRegistry, class: ClassId, name: &str) -> FuncId {
        let nid = reg.names.intern(name);
        let full = format!("{}::{}", reg.class_full_name(class), name);
        reg.add_function(
            class,
            MemberFunction {
                name: nid,
                full_name: full,
                class,
                protection: Protection::Public,
                kind: MemberKind::Method,
                body: MemberImpl::Declared { params: Vec::new() },
                init_code: None,
                min_args: 0,
                max_args: Some(0),
                usage: name.to_string(),
            },
        )
        .unwrap()
    }

    fn variable(reg: &mut ClassRegistry, class: ClassId, name: &str, protection: Protection) -> VarId {
        let nid = reg.names.intern(name);
        let full = format!("{}::{}", reg.class_full_name(class), name);
        reg.add_variable(
            class,
            Variable {
                name: nid,
                full_name: full,
                class,
                protection,
                default: None,
                config_code: None,
                common: false,
            },
        )
        .unwrap()
    }

    fn inherit(reg: &mut ClassRegistry, derived: ClassId, base: ClassId) {
        reg.class_mut(derived).unwrap().bases.push(base);
        reg.class_mut(base).unwrap().derived.push(derived);
        reg.compute_heritage(derived);
    }

    #[test]
    fn test_traversal_is_declaration_order() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let b = class(&mut reg, "B", 2);
        let c = class(&mut reg, "C", 3);
        inherit(&mut reg, c, a);
        inherit(&mut reg, c, b);

        let order = traversal_order(&reg, c);
        assert_eq!(order.as_slice(), &[c, a, b]);
    }

    #[test]
    fn test_traversal_diamond_visits_once() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let b = class(&mut reg, "B", 2);
        let c = class(&mut reg, "C", 3);
        let d = class(&mut reg, "D", 4);
        inherit(&mut reg, b, a);
        inherit(&mut reg, c, a);
        inherit(&mut reg, d, b);
        inherit(&mut reg, d, c);

        let order = traversal_order(&reg, d);
        assert_eq!(order.as_slice(), &[d, b, a, c]);
    }

    #[test]
    fn test_derived_method_shadows_base() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let b = class(&mut reg, "B", 2);
        inherit(&mut reg, b, a);
        let fa = method(&mut reg, a, "m");
        let fb = method(&mut reg, b, "m");
        rebuild(&mut reg, b);
        rebuild(&mut reg, a);

        let m = reg.names.lookup("m").unwrap();
        let am = reg.names.lookup("A::m").unwrap();
        let bm = reg.names.lookup("B::m").unwrap();

        let binfo = reg.class(b).unwrap();
        assert_eq!(binfo.resolve_cmds.get(&m), Some(&fb));
        assert_eq!(binfo.resolve_cmds.get(&am), Some(&fa));
        assert_eq!(binfo.resolve_cmds.get(&bm), Some(&fb));

        let ainfo = reg.class(a).unwrap();
        assert_eq!(ainfo.resolve_cmds.get(&m), Some(&fa));
    }

    #[test]
    fn test_private_variable_not_accessible_from_derived() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        let b = class(&mut reg, "B", 2);
        inherit(&mut reg, b, a);
        let xa = variable(&mut reg, a, "x", Protection::Private);
        let xb = variable(&mut reg, b, "x", Protection::Public);
        rebuild(&mut reg, a);
        rebuild(&mut reg, b);

        let x = reg.names.lookup("x").unwrap();
        let ax = reg.names.lookup("A::x").unwrap();

        // Within A, the bare name reaches A's private x.
        let ainfo = reg.class(a).unwrap();
        let lookup = &ainfo.var_lookups[ainfo.resolve_vars[&x] as usize];
        assert_eq!(lookup.var, xa);
        assert!(lookup.accessible);

        // Within B, the bare name reaches B's x; A's x is shadowed but its
        // qualified alias remains, marked inaccessible.
        let binfo = reg.class(b).unwrap();
        let lookup = &binfo.var_lookups[binfo.resolve_vars[&x] as usize];
        assert_eq!(lookup.var, xb);
        assert!(lookup.accessible);
        let lookup = &binfo.var_lookups[binfo.resolve_vars[&ax] as usize];
        assert_eq!(lookup.var, xa);
        assert!(!lookup.accessible);
    }

    #[test]
    fn test_least_qualified_and_usage() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        variable(&mut reg, a, "x", Protection::Public);
        rebuild(&mut reg, a);

        let info = reg.class(a).unwrap();
        let x = reg.names.lookup("x").unwrap();
        let lookup = &info.var_lookups[info.resolve_vars[&x] as usize];
        assert_eq!(lookup.least_qualified, "x");
        // "x", "A::x", "::A::x" all reach the same lookup.
        assert_eq!(lookup.usage, 3);
    }

    #[test]
    fn test_rebuild_replaces_tables_wholesale() {
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, "A", 1);
        method(&mut reg, a, "m");
        rebuild(&mut reg, a);
        let before = reg.class(a).unwrap().resolve_cmds.len();
        method(&mut reg, a, "n");
        rebuild(&mut reg, a);
        let after = reg.class(a).unwrap().resolve_cmds.len();
        assert!(after > before);
    }
}
