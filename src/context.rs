// objsh call contexts
//
// The active (object, member-function) pair for each in-flight invocation.
// Contexts live in a free-listed arena with stable indices and are stacked
// LIFO, matching the nested-call structure of the interpreter. A context is
// cached per object keyed by member function and reused across repeated
// invocations while the object's flags and namespace stay unchanged.

use tracing::trace;

use crate::class::{ClassId, FuncId};
use crate::interp::Interp;
use crate::namespace::NamespaceId;
use crate::object::ObjectId;
use crate::runtime::Oo;

/// Unique identifier for an allocated call context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

pub struct CallContext {
    pub object: Option<ObjectId>,
    /// The member's declaring class.
    pub class: ClassId,
    pub func: FuncId,
    /// Snapshot of the object's flags at push time.
    pub obj_flags: u32,
    pub ns: NamespaceId,
    pub refcount: u32,
    /// True when the context lives in its object's cache table and must be
    /// retained across pops.
    pub cached: bool,
}

#[derive(Default)]
pub struct ContextArena {
    slots: Vec<Option<CallContext>>,
    free: Vec<u32>,
    stack: Vec<ContextId>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, ctx: CallContext) -> ContextId {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(ctx);
            ContextId(slot)
        } else {
            let id = ContextId(self.slots.len() as u32);
            self.slots.push(Some(ctx));
            id
        }
    }

    pub fn release(&mut self, id: ContextId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            if slot.take().is_some() {
                self.free.push(id.0);
            }
        }
    }

    pub fn get(&self, id: ContextId) -> Option<&CallContext> {
        self.slots.get(id.0 as usize).and_then(|c| c.as_ref())
    }

    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut CallContext> {
        self.slots.get_mut(id.0 as usize).and_then(|c| c.as_mut())
    }

    pub fn top(&self) -> Option<ContextId> {
        self.stack.last().copied()
    }

    pub fn current(&self) -> Option<&CallContext> {
        self.top().and_then(|id| self.get(id))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn push_stack(&mut self, id: ContextId) {
        self.stack.push(id);
    }

    fn pop_stack(&mut self) -> Option<ContextId> {
        self.stack.pop()
    }
}

/// Enter a member invocation: reuse or allocate a context for the
/// (object, member) pair and push it.
pub fn push_context(
    oo: &mut Oo,
    object: Option<ObjectId>,
    class: ClassId,
    func: FuncId,
    ns: NamespaceId,
) -> ContextId {
    let obj_flags = object
        .and_then(|o| oo.objects.get(o))
        .map(|o| o.flags())
        .unwrap_or(0);

    let id = match object {
        Some(obj) => {
            let cached_id = oo
                .objects
                .get(obj)
                .and_then(|o| o.context_cache.get(&func).copied());
            match cached_id {
                Some(cid) => {
                    let reuse = {
                        let ctx = oo.ctxs.get(cid);
                        match ctx {
                            Some(c) if c.refcount == 0 => Reuse::Reinit,
                            Some(c) if c.obj_flags == obj_flags && c.ns == ns => Reuse::Share,
                            Some(_) => Reuse::Fresh,
                            None => Reuse::Fresh,
                        }
                    };
                    match reuse {
                        Reuse::Reinit => {
                            if let Some(c) = oo.ctxs.get_mut(cid) {
                                c.obj_flags = obj_flags;
                                c.ns = ns;
                                c.refcount = 1;
                            }
                            cid
                        }
                        Reuse::Share => {
                            if let Some(c) = oo.ctxs.get_mut(cid) {
                                c.refcount += 1;
                            }
                            cid
                        }
                        Reuse::Fresh => oo.ctxs.alloc(CallContext {
                            object,
                            class,
                            func,
                            obj_flags,
                            ns,
                            refcount: 1,
                            cached: false,
                        }),
                    }
                }
                None => {
                    let cid = oo.ctxs.alloc(CallContext {
                        object,
                        class,
                        func,
                        obj_flags,
                        ns,
                        refcount: 1,
                        cached: true,
                    });
                    if let Some(o) = oo.objects.get_mut(obj) {
                        o.context_cache.insert(func, cid);
                    }
                    cid
                }
            }
        }
        // Common procs carry no object; their contexts are never cached.
        None => oo.ctxs.alloc(CallContext {
            object,
            class,
            func,
            obj_flags,
            ns,
            refcount: 1,
            cached: false,
        }),
    };

    oo.ctxs.push_stack(id);
    if let Some(obj) = object {
        if let Some(o) = oo.objects.get_mut(obj) {
            o.call_refcount += 1;
        }
    }
    if let Some(c) = oo.reg.class_mut(class) {
        c.call_refcount += 1;
    }
    trace!(context = id.0, depth = oo.ctxs.depth(), "push context");
    id
}

enum Reuse {
    Reinit,
    Share,
    Fresh,
}

/// Leave a member invocation: pop the top context and release it unless it
/// is still cached by its object. If the popped call was the object's last
/// in-flight call and its namespace teardown was deferred, perform that
/// teardown now.
pub fn pop_context(interp: &mut Interp<Oo>, oo: &mut Oo) {
    let Some(id) = oo.ctxs.pop_stack() else { return };
    let (object, class, func) = match oo.ctxs.get_mut(id) {
        Some(c) => {
            c.refcount = c.refcount.saturating_sub(1);
            (c.object, c.class, c.func)
        }
        None => return,
    };

    if let Some(c) = oo.reg.class_mut(class) {
        c.call_refcount = c.call_refcount.saturating_sub(1);
    }

    let refcount = oo.ctxs.get(id).map(|c| c.refcount).unwrap_or(0);
    if refcount == 0 {
        let still_cached = object
            .and_then(|o| oo.objects.get(o))
            .map(|o| o.context_cache.get(&func) == Some(&id))
            .unwrap_or(false);
        if !still_cached {
            oo.ctxs.release(id);
        }
    }

    if let Some(obj) = object {
        let last_call = match oo.objects.get_mut(obj) {
            Some(o) => {
                o.call_refcount = o.call_refcount.saturating_sub(1);
                o.call_refcount == 0 && o.teardown_deferred
            }
            None => false,
        };
        if last_call {
            trace!(object = obj.0, "performing deferred teardown");
            crate::object::complete_deferred_teardown(interp, oo, obj);
        }
    }
    trace!(context = id.0, depth = oo.ctxs.depth(), "pop context");
}
