// objsh namespaces
//
// A namespace is a container for commands, variables and child namespaces,
// addressed by ::-separated paths from the root. A namespace may carry a
// resolver hook pair that intercepts name lookups made while code executes
// inside it; the class runtime installs its virtual-table resolvers there.

use indexmap::IndexMap;

use crate::interp::{CommandRecord, ResolverHooks, VarCell};

/// Unique identifier for a namespace (index into the interp's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(pub u32);

/// The root namespace, created with the interp.
pub const GLOBAL_NS: NamespaceId = NamespaceId(0);

pub struct Namespace<Ctx> {
    /// Simple name; empty for the root.
    pub name: String,
    /// Fully qualified name; "::" for the root.
    pub full: String,
    pub parent: Option<NamespaceId>,
    pub children: IndexMap<String, NamespaceId>,
    pub commands: IndexMap<String, CommandRecord<Ctx>>,
    pub vars: IndexMap<String, VarCell<Ctx>>,
    pub resolver: Option<ResolverHooks<Ctx>>,
}

impl<Ctx> Namespace<Ctx> {
    pub fn new(name: &str, full: String, parent: Option<NamespaceId>) -> Self {
        Self {
            name: name.to_string(),
            full,
            parent,
            children: IndexMap::new(),
            commands: IndexMap::new(),
            vars: IndexMap::new(),
            resolver: None,
        }
    }
}

/// Split a path into (absolute, segments). Empty segments from repeated
/// separators are dropped.
pub fn split_path(path: &str) -> (bool, Vec<&str>) {
    let absolute = path.starts_with("::");
    let segments = path.split("::").filter(|s| !s.is_empty()).collect();
    (absolute, segments)
}

/// Split a name into its namespace qualifiers and tail: "a::b::c" becomes
/// ("a::b", "c"); "::c" becomes ("::", "c"). Names without qualifiers
/// return None.
pub fn split_tail(name: &str) -> Option<(&str, &str)> {
    let idx = name.rfind("::")?;
    let quals = if idx == 0 { "::" } else { &name[..idx] };
    Some((quals, &name[idx + 2..]))
}

/// Append a simple name to a fully qualified namespace name.
pub fn join(parent_full: &str, name: &str) -> String {
    if parent_full == "::" {
        format!("::{}", name)
    } else {
        format!("{}::{}", parent_full, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("::a::b"), (true, vec!["a", "b"]));
        assert_eq!(split_path("a::b"), (false, vec!["a", "b"]));
        assert_eq!(split_path("::"), (true, vec![]));
    }

    #[test]
    fn test_split_tail() {
        assert_eq!(split_tail("a::b::c"), Some(("a::b", "c")));
        assert_eq!(split_tail("::c"), Some(("::", "c")));
        assert_eq!(split_tail("c"), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("::", "a"), "::a");
        assert_eq!(join("::a", "b"), "::a::b");
    }
}
