//! Scoped, deterministic resource teardown
//!
//! A [`ResourceScope`] owns every GPU/OS object of a session (or of any other
//! lifetime) and releases them in strict reverse acquisition order, each
//! exactly once. Release happens on every exit path: an explicit
//! [`ResourceScope::unwind`], the scope going out of scope on normal return,
//! an early `?` return, or a panic unwinding through the owner.
//!
//! Resources are owned values whose `Drop` releases the underlying handle;
//! the scope only decides *when* that drop runs. Callers keep a typed
//! [`Handle`] to look them up again.
//!
//! ```
//! use kludge_engine::kludge::ResourceScope;
//!
//! let mut scope = ResourceScope::new("demo");
//! let first = scope.register("first", String::from("a")).unwrap();
//! let second = scope.register("second", vec![1u32, 2, 3]).unwrap();
//! assert_eq!(scope.get(first).unwrap(), "a");
//! assert_eq!(scope.get(second).unwrap().len(), 3);
//! assert_eq!(scope.unwind(), 2); // drops `second`, then `first`
//! assert_eq!(scope.unwind(), 0);
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use slotmap::{new_key_type, SlotMap};

use crate::error::{Error, Result};
use crate::{engine_debug, engine_trace, engine_violation};

new_key_type! {
    /// Slot of one registered resource
    pub struct ResourceKey;
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Typed reference to a resource owned by a [`ResourceScope`]
pub struct Handle<T> {
    key: ResourceKey,
    scope: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.scope == other.scope
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({:?} in scope {})", std::any::type_name::<T>(), self.key, self.scope)
    }
}

enum Release {
    /// Dropping the box releases the resource
    Owned(Box<dyn Any>),
    /// Explicit release operation for something the scope does not own
    Deferred(Box<dyn FnOnce()>),
}

struct Entry {
    label: String,
    order: u64,
    release: Release,
}

/// Reverse-order release stack
pub struct ResourceScope {
    id: u64,
    name: String,
    entries: SlotMap<ResourceKey, Entry>,
    stack: Vec<ResourceKey>,
    next_order: u64,
    unwound: bool,
}

impl ResourceScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            entries: SlotMap::with_key(),
            stack: Vec::new(),
            next_order: 0,
            unwound: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of resources currently owned
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// True once `unwind` ran; the scope then refuses new registrations
    pub fn is_unwound(&self) -> bool {
        self.unwound
    }

    /// Labels in acquisition order
    pub fn labels(&self) -> Vec<&str> {
        self.stack
            .iter()
            .filter_map(|key| self.entries.get(*key))
            .map(|entry| entry.label.as_str())
            .collect()
    }

    /// Take ownership of `value`; it is dropped when the scope unwinds
    ///
    /// Registering into an unwound scope is a contract violation; the value
    /// is released immediately instead of leaking.
    pub fn register<T: 'static>(&mut self, label: impl Into<String>, value: T) -> Result<Handle<T>> {
        let label = label.into();
        if self.unwound {
            return Err(engine_violation!(
                "kludge::scope",
                "register '{}' into unwound scope '{}'",
                label,
                self.name
            ));
        }
        let key = self.push(label, Release::Owned(Box::new(value)));
        Ok(Handle {
            key,
            scope: self.id,
            _marker: PhantomData,
        })
    }

    /// Register each value of `values`, labelled `label[i]`
    pub fn register_all<T: 'static>(
        &mut self,
        label: &str,
        values: impl IntoIterator<Item = T>,
    ) -> Result<Vec<Handle<T>>> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| self.register(format!("{}[{}]", label, i), value))
            .collect()
    }

    /// Register a release operation for something owned elsewhere
    pub fn defer(&mut self, label: impl Into<String>, release: impl FnOnce() + 'static) -> Result<()> {
        let label = label.into();
        if self.unwound {
            release();
            return Err(engine_violation!(
                "kludge::scope",
                "defer '{}' into unwound scope '{}'",
                label,
                self.name
            ));
        }
        self.push(label, Release::Deferred(Box::new(release)));
        Ok(())
    }

    pub fn contains<T: 'static>(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_ok()
    }

    pub fn get<T: 'static>(&self, handle: Handle<T>) -> Result<&T> {
        self.check_handle(handle)?;
        match self.entries.get(handle.key).map(|entry| &entry.release) {
            Some(Release::Owned(value)) => value.downcast_ref::<T>().ok_or_else(|| self.type_mismatch(handle)),
            _ => Err(self.released(handle)),
        }
    }

    pub fn get_mut<T: 'static>(&mut self, handle: Handle<T>) -> Result<&mut T> {
        self.check_handle(handle)?;
        if !matches!(
            self.entries.get(handle.key).map(|entry| &entry.release),
            Some(Release::Owned(value)) if value.is::<T>()
        ) {
            return Err(match self.entries.get(handle.key) {
                Some(_) => self.type_mismatch(handle),
                None => self.released(handle),
            });
        }
        match self.entries.get_mut(handle.key).map(|entry| &mut entry.release) {
            Some(Release::Owned(value)) => value
                .downcast_mut::<T>()
                .ok_or_else(|| Error::ContractViolation("resource type changed".to_string())),
            _ => Err(Error::ContractViolation("resource vanished".to_string())),
        }
    }

    /// Replace the resource behind `old` with one built from it
    ///
    /// `build` reads the old resource (hand-off hint) while it is still
    /// alive. The new resource takes the old one's place in the release
    /// order, then the old one is released. If `build` fails the old
    /// resource is left untouched and the error is returned.
    pub fn replace<T: 'static>(
        &mut self,
        old: Handle<T>,
        build: impl FnOnce(&T) -> Result<T>,
    ) -> Result<Handle<T>> {
        let position = self
            .stack
            .iter()
            .position(|key| *key == old.key)
            .filter(|_| old.scope == self.id)
            .ok_or_else(|| self.released(old))?;

        let replacement = build(self.get(old)?)?;

        let label = self.entries.get(old.key).map(|e| e.label.clone()).unwrap_or_default();
        let order = self.next_order;
        self.next_order += 1;
        let key = self.entries.insert(Entry {
            label,
            order,
            release: Release::Owned(Box::new(replacement)),
        });
        self.stack[position] = key;

        if let Some(entry) = self.entries.remove(old.key) {
            engine_debug!(
                "kludge::scope",
                "[{}] replaced '{}' (#{} -> #{})",
                self.name,
                entry.label,
                entry.order,
                order
            );
            Self::release(entry);
        }

        Ok(Handle {
            key,
            scope: self.id,
            _marker: PhantomData,
        })
    }

    /// Release every resource in reverse acquisition order
    ///
    /// Returns how many resources were released. Calling it again is a no-op.
    pub fn unwind(&mut self) -> usize {
        self.unwound = true;
        let mut released = 0;
        while let Some(key) = self.stack.pop() {
            if let Some(entry) = self.entries.remove(key) {
                engine_trace!("kludge::scope", "[{}] release '{}' (#{})", self.name, entry.label, entry.order);
                Self::release(entry);
                released += 1;
            }
        }
        if released > 0 {
            engine_debug!("kludge::scope", "[{}] unwound {} resources", self.name, released);
        }
        released
    }

    // ===== INTERNALS =====

    fn push(&mut self, label: String, release: Release) -> ResourceKey {
        let order = self.next_order;
        self.next_order += 1;
        engine_trace!("kludge::scope", "[{}] acquire '{}' (#{})", self.name, label, order);
        let key = self.entries.insert(Entry { label, order, release });
        self.stack.push(key);
        key
    }

    fn release(entry: Entry) {
        match entry.release {
            Release::Owned(value) => drop(value),
            Release::Deferred(release) => release(),
        }
    }

    fn check_handle<T>(&self, handle: Handle<T>) -> Result<()> {
        if handle.scope != self.id {
            return Err(engine_violation!(
                "kludge::scope",
                "handle from scope {} used with scope '{}'",
                handle.scope,
                self.name
            ));
        }
        Ok(())
    }

    fn released<T>(&self, handle: Handle<T>) -> Error {
        engine_violation!(
            "kludge::scope",
            "[{}] {:?} refers to a released resource",
            self.name,
            handle
        )
    }

    fn type_mismatch<T>(&self, handle: Handle<T>) -> Error {
        engine_violation!("kludge::scope", "[{}] {:?} has a different type", self.name, handle)
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        self.unwind();
    }
}

impl fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceScope")
            .field("name", &self.name)
            .field("resources", &self.labels())
            .field("unwound", &self.unwound)
            .finish()
    }
}

#[cfg(test)]
#[path = "resource_scope_tests.rs"]
mod tests;
