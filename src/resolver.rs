// objsh name resolution
//
// The hook pair installed on every class namespace. When code executing in
// a class scope references a bare (or partially qualified) name, these
// route it through the class's precomputed resolution tables. Both are
// side-effect-free map probes; absent or inaccessible entries fall through
// to the interpreter's normal lookup, which fails in the ordinary way.

use crate::interp::{CommandRecord, Interp, ResolverHooks, VarLocation};
use crate::namespace::NamespaceId;
use crate::runtime::Oo;

pub fn hooks() -> ResolverHooks<Oo> {
    ResolverHooks {
        command: resolve_command,
        variable: resolve_variable,
    }
}

/// Resolve a member-function name inside a class namespace. The returned
/// record carries the member id as its token; the object is supplied by
/// the active call context at invocation time.
fn resolve_command(
    _interp: &Interp<Oo>,
    oo: &Oo,
    ns: NamespaceId,
    name: &str,
) -> Option<CommandRecord<Oo>> {
    let class = oo.reg.class_for_ns(ns)?;
    let name_id = oo.reg.names.lookup(name)?;
    let func = oo.reg.class(class)?.resolve_cmds.get(&name_id).copied()?;
    Some(CommandRecord {
        func: crate::methods::member_trampoline,
        token: func.0 as u64,
        delete_trace: None,
    })
}

/// Resolve a data-member name inside a class namespace to its storage
/// cell: the shared class-namespace cell for commons, the per-object cell
/// in the object's class sub-scope otherwise.
fn resolve_variable(
    _interp: &Interp<Oo>,
    oo: &Oo,
    ns: NamespaceId,
    name: &str,
) -> Option<VarLocation> {
    let class = oo.reg.class_for_ns(ns)?;
    let info = oo.reg.class(class)?;
    let name_id = oo.reg.names.lookup(name)?;
    let lookup = info
        .resolve_vars
        .get(&name_id)
        .map(|&idx| &info.var_lookups[idx as usize])?;
    if !lookup.accessible {
        return None;
    }
    let var = oo.reg.var(lookup.var)?;
    let simple = oo.reg.names.resolve(var.name).to_string();

    if var.common {
        let owner_ns = oo.reg.class(var.class)?.ns;
        return Some(VarLocation {
            ns: owner_ns,
            name: simple,
        });
    }

    let obj = oo.current_object()?;
    let obj_rec = oo.objects.get(obj)?;
    let cell_ns = obj_rec.class_ns.get(&var.class).copied()?;
    Some(VarLocation {
        ns: cell_ns,
        name: simple,
    })
}
