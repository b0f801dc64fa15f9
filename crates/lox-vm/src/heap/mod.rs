// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap and garbage collector for Lox objects.
//!
//! The heap owns every runtime object in a flat slot vector; [`ObjRef`]
//! handles are slot indices and all other references in the system are
//! non-owning. Reclamation is a precise tri-colour mark-and-sweep:
//! roots are greyed, the grey worklist is drained by blackening each
//! object's children, the string intern set drops entries whose key did
//! not survive marking, and sweep frees everything left white.
//!
//! Collection runs inside [`Heap::alloc`], before the new object is
//! installed, whenever `bytes_allocated` exceeds the growth threshold or
//! stress mode is on. Callers therefore pass a [`GcRoots`] view of the
//! VM at every allocation site; an object that must survive *further*
//! allocations before becoming reachable has to be rooted (the VM parks
//! such temporaries on the operand stack).


use core::cell::Cell;

use tracing::{debug, trace};

use crate::table::Table;
use crate::value::{LoxString, ObjRef, Object, Upvalue, Value};
use crate::vm::CallFrame;

/// Heap growth factor applied after each collection.
const HEAP_GROW_FACTOR: usize = 2;

/// Initial collection threshold (1 MiB).
const INITIAL_NEXT_GC: usize = 1024 * 1024;

/// One heap slot: the mark flag, the recorded allocation size and the
/// object itself (`None` once freed).
///
/// The mark flag is a `Cell` so tracing can grey children while the
/// object store is only borrowed shared; the VM is single-threaded.
#[derive(Debug)]
struct Slot {
    marked: Cell<bool>,
    size: usize,
    object: Option<Object>,
}

/// The slot vector and its free list.
///
/// Separate from [`Heap`] so the intern table and the grey worklist can
/// be borrowed alongside the objects during collection.
#[derive(Debug, Default)]
pub struct ObjectStore {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
}

impl ObjectStore {
    /// Access an object. The reference must be live.
    #[must_use]
    pub fn object(&self, reference: ObjRef) -> &Object {
        self.slots[reference.index()]
            .object
            .as_ref()
            .expect("dangling object reference")
    }

    /// Mutably access an object. The reference must be live.
    pub fn object_mut(&mut self, reference: ObjRef) -> &mut Object {
        self.slots[reference.index()]
            .object
            .as_mut()
            .expect("dangling object reference")
    }

    /// Access a string object. The reference must be a live string.
    #[must_use]
    pub fn string(&self, reference: ObjRef) -> &LoxString {
        match self.object(reference) {
            Object::String(s) => s,
            _ => unreachable!("reference is not a string"),
        }
    }

    /// Check whether an object survived the current mark phase.
    ///
    /// Outside a collection cycle this is always `false`.
    #[must_use]
    pub fn is_marked(&self, reference: ObjRef) -> bool {
        self.slots[reference.index()].marked.get()
    }

    /// Mark an object grey. Returns `true` if it was newly marked.
    fn mark(&self, reference: ObjRef) -> bool {
        let marked = &self.slots[reference.index()].marked;
        if marked.get() {
            return false;
        }
        marked.set(true);
        true
    }
}

/// Root set handed to the heap at allocation and collection time.
///
/// Borrows the VM's reachable state; the compiler supplies its
/// in-progress function chain through `compiler_functions`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcRoots<'a> {
    /// Every value on the operand stack.
    pub stack: &'a [Value],
    /// Active call frames (their closures are roots).
    pub frames: &'a [CallFrame],
    /// Open upvalues.
    pub open_upvalues: &'a [ObjRef],
    /// The globals table.
    pub globals: Option<&'a Table>,
    /// The interned `"init"` string.
    pub init_string: Option<ObjRef>,
    /// Functions currently being compiled.
    pub compiler_functions: &'a [ObjRef],
}

/// The object heap: allocation, interning and garbage collection.
#[derive(Debug)]
pub struct Heap {
    store: ObjectStore,
    /// Intern set: every live string, keyed by itself (weak — entries
    /// whose key dies are removed between trace and sweep).
    strings: Table,
    /// Grey worklist, allocated outside the object store.
    grey: Vec<ObjRef>,
    bytes_allocated: usize,
    next_gc: usize,
    /// Collect on every allocation (test/debug aid).
    stress: bool,
}

impl Heap {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: ObjectStore::default(),
            strings: Table::new(),
            grey: Vec::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            stress: false,
        }
    }

    /// Toggle stress collection (collect on every allocation).
    pub fn set_stress(&mut self, stress: bool) {
        self.stress = stress;
    }

    /// Bytes currently attributed to live objects.
    #[must_use]
    pub const fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of live objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.store
            .slots
            .iter()
            .filter(|slot| slot.object.is_some())
            .count()
    }

    /// The object store (for table operations that inspect keys).
    #[must_use]
    pub const fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// The string intern set.
    #[must_use]
    pub const fn strings(&self) -> &Table {
        &self.strings
    }

    /// Allocate an object, collecting first if the threshold (or stress
    /// mode) demands it. The single allocation entry point.
    pub fn alloc(&mut self, object: Object, roots: &GcRoots<'_>) -> ObjRef {
        if self.stress || self.bytes_allocated > self.next_gc {
            self.collect(roots);
        }

        let size = object.size_estimate();
        self.bytes_allocated += size;
        trace!(target: "gc", kind = object.type_name(), size, "allocate");

        let slot = Slot {
            marked: Cell::new(false),
            size,
            object: Some(object),
        };
        match self.store.free_slots.pop() {
            Some(index) => {
                self.store.slots[index as usize] = slot;
                ObjRef::new(index)
            }
            None => {
                let index = self.store.slots.len() as u32;
                self.store.slots.push(slot);
                ObjRef::new(index)
            }
        }
    }

    /// Intern a string from borrowed bytes.
    ///
    /// Returns the existing reference if an equal string is interned.
    pub fn copy_string(&mut self, chars: &str, roots: &GcRoots<'_>) -> ObjRef {
        let string = LoxString::new(chars.to_owned());
        if let Some(existing) = self
            .strings
            .find_string(&self.store, &string.chars, string.hash)
        {
            return existing;
        }
        self.intern(string, roots)
    }

    /// Intern a string, taking ownership of an already-built buffer.
    ///
    /// If an equal string is interned the buffer is dropped and the
    /// interned reference returned.
    pub fn take_string(&mut self, chars: String, roots: &GcRoots<'_>) -> ObjRef {
        let string = LoxString::new(chars);
        if let Some(existing) = self
            .strings
            .find_string(&self.store, &string.chars, string.hash)
        {
            return existing;
        }
        self.intern(string, roots)
    }

    fn intern(&mut self, string: LoxString, roots: &GcRoots<'_>) -> ObjRef {
        let hash = string.hash;
        let reference = self.alloc(Object::String(string), roots);
        // The fresh string becomes reachable through the intern set
        // before any further allocation can occur.
        self.strings.set(reference, hash, Value::Nil);
        reference
    }

    /// Run a full collection cycle: mark roots, trace, weaken the intern
    /// set, sweep, and raise the growth threshold.
    pub fn collect(&mut self, roots: &GcRoots<'_>) {
        let before = self.bytes_allocated;
        debug!(target: "gc", bytes_allocated = before, "collection begin");

        self.mark_roots(roots);
        self.trace_references();
        // Interned strings are weak: drop entries whose key is about to
        // be swept, before sweep frees them.
        self.strings.remove_white(&self.store);
        self.sweep();

        self.next_gc = self.bytes_allocated * HEAP_GROW_FACTOR;
        debug!(
            target: "gc",
            freed = before - self.bytes_allocated,
            bytes_allocated = self.bytes_allocated,
            next_gc = self.next_gc,
            "collection end"
        );
    }

    fn mark_roots(&mut self, roots: &GcRoots<'_>) {
        for &value in roots.stack {
            Self::mark_value(&self.store, &mut self.grey, value);
        }
        for frame in roots.frames {
            Self::mark_object(&self.store, &mut self.grey, frame.closure);
        }
        for &upvalue in roots.open_upvalues {
            Self::mark_object(&self.store, &mut self.grey, upvalue);
        }
        if let Some(globals) = roots.globals {
            Self::mark_table(&self.store, &mut self.grey, globals);
        }
        if let Some(init_string) = roots.init_string {
            Self::mark_object(&self.store, &mut self.grey, init_string);
        }
        for &function in roots.compiler_functions {
            Self::mark_object(&self.store, &mut self.grey, function);
        }
    }

    fn trace_references(&mut self) {
        while let Some(reference) = self.grey.pop() {
            Self::blacken(&self.store, &mut self.grey, reference);
        }
    }

    /// Mark an object's children grey.
    fn blacken(store: &ObjectStore, grey: &mut Vec<ObjRef>, reference: ObjRef) {
        trace!(target: "gc", object = store.object(reference).type_name(), "blacken");

        match store.object(reference) {
            Object::String(_) | Object::Native(_) => {}
            Object::Upvalue(upvalue) => {
                if let Upvalue::Closed(value) = upvalue {
                    Self::mark_value(store, grey, *value);
                }
            }
            Object::Function(function) => {
                if let Some(name) = function.name {
                    Self::mark_object(store, grey, name);
                }
                for &constant in &function.chunk.constants {
                    Self::mark_value(store, grey, constant);
                }
            }
            Object::Closure(closure) => {
                Self::mark_object(store, grey, closure.function);
                // The slot array may still be partially built while the
                // CLOSURE instruction runs.
                for &upvalue in &closure.upvalues {
                    Self::mark_object(store, grey, upvalue);
                }
            }
            Object::Class(class) => {
                Self::mark_object(store, grey, class.name);
                Self::mark_table(store, grey, &class.methods);
            }
            Object::Instance(instance) => {
                Self::mark_object(store, grey, instance.class);
                Self::mark_table(store, grey, &instance.fields);
            }
            Object::BoundMethod(bound) => {
                Self::mark_value(store, grey, bound.receiver);
                Self::mark_object(store, grey, bound.method);
            }
        }
    }

    fn mark_value(store: &ObjectStore, grey: &mut Vec<ObjRef>, value: Value) {
        if let Value::Object(reference) = value {
            Self::mark_object(store, grey, reference);
        }
    }

    fn mark_object(store: &ObjectStore, grey: &mut Vec<ObjRef>, reference: ObjRef) {
        if store.mark(reference) {
            grey.push(reference);
        }
    }

    fn mark_table(store: &ObjectStore, grey: &mut Vec<ObjRef>, table: &Table) {
        for (key, value) in table.iter() {
            Self::mark_object(store, grey, key);
            Self::mark_value(store, grey, value);
        }
    }

    /// Free every unmarked object and clear the surviving marks.
    fn sweep(&mut self) {
        let ObjectStore { slots, free_slots } = &mut self.store;
        let mut freed = 0usize;

        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.object.is_none() {
                continue;
            }
            if slot.marked.get() {
                slot.marked.set(false);
                continue;
            }

            if let Some(object) = slot.object.take() {
                trace!(target: "gc", kind = object.type_name(), size = slot.size, "free");
                freed += slot.size;
            }
            free_slots.push(index as u32);
        }

        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
    }

    // ------------------------------------------------------------------
    // Typed accessors (delegating to the store). Callers hold references
    // whose variant is a bytecode invariant.
    // ------------------------------------------------------------------

    /// Access an object.
    #[must_use]
    pub fn object(&self, reference: ObjRef) -> &Object {
        self.store.object(reference)
    }

    /// Access a string object.
    #[must_use]
    pub fn string(&self, reference: ObjRef) -> &LoxString {
        self.store.string(reference)
    }

    /// Access a function object.
    #[must_use]
    pub fn function(&self, reference: ObjRef) -> &crate::value::Function {
        match self.store.object(reference) {
            Object::Function(f) => f,
            _ => unreachable!("reference is not a function"),
        }
    }

    /// Mutably access a function object.
    pub fn function_mut(&mut self, reference: ObjRef) -> &mut crate::value::Function {
        match self.store.object_mut(reference) {
            Object::Function(f) => f,
            _ => unreachable!("reference is not a function"),
        }
    }

    /// Access a closure object.
    #[must_use]
    pub fn closure(&self, reference: ObjRef) -> &crate::value::Closure {
        match self.store.object(reference) {
            Object::Closure(c) => c,
            _ => unreachable!("reference is not a closure"),
        }
    }

    /// Mutably access a closure object.
    pub fn closure_mut(&mut self, reference: ObjRef) -> &mut crate::value::Closure {
        match self.store.object_mut(reference) {
            Object::Closure(c) => c,
            _ => unreachable!("reference is not a closure"),
        }
    }

    /// Access an upvalue object.
    #[must_use]
    pub fn upvalue(&self, reference: ObjRef) -> &Upvalue {
        match self.store.object(reference) {
            Object::Upvalue(u) => u,
            _ => unreachable!("reference is not an upvalue"),
        }
    }

    /// Mutably access an upvalue object.
    pub fn upvalue_mut(&mut self, reference: ObjRef) -> &mut Upvalue {
        match self.store.object_mut(reference) {
            Object::Upvalue(u) => u,
            _ => unreachable!("reference is not an upvalue"),
        }
    }

    /// Access a class object.
    #[must_use]
    pub fn class(&self, reference: ObjRef) -> &crate::value::Class {
        match self.store.object(reference) {
            Object::Class(c) => c,
            _ => unreachable!("reference is not a class"),
        }
    }

    /// Mutably access a class object.
    pub fn class_mut(&mut self, reference: ObjRef) -> &mut crate::value::Class {
        match self.store.object_mut(reference) {
            Object::Class(c) => c,
            _ => unreachable!("reference is not a class"),
        }
    }

    /// Access an instance object.
    #[must_use]
    pub fn instance(&self, reference: ObjRef) -> &crate::value::Instance {
        match self.store.object(reference) {
            Object::Instance(i) => i,
            _ => unreachable!("reference is not an instance"),
        }
    }

    /// Mutably access an instance object.
    pub fn instance_mut(&mut self, reference: ObjRef) -> &mut crate::value::Instance {
        match self.store.object_mut(reference) {
            Object::Instance(i) => i,
            _ => unreachable!("reference is not an instance"),
        }
    }

    /// Read a value as a string slice, if it is one.
    #[must_use]
    pub fn read_string(&self, value: Value) -> Option<&str> {
        match value {
            Value::Object(reference) => match self.store.object(reference) {
                Object::String(s) => Some(&s.chars),
                _ => None,
            },
            _ => None,
        }
    }

    /// Upvalue count of a function value (0 for anything else).
    ///
    /// Disassembler helper for the `CLOSURE` operand stream.
    #[must_use]
    pub fn function_upvalue_count(&self, value: Value) -> usize {
        match value {
            Value::Object(reference) => match self.store.object(reference) {
                Object::Function(f) => f.upvalue_count as usize,
                _ => 0,
            },
            _ => 0,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
